use std::path::{Path, PathBuf};
use std::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The image presented for `path` changed.
    Modified { path: PathBuf, version: u64 },
    /// Tabs or the active image changed.
    Recompose { version: u64 },
    Busy(bool),
    Status(Status),
}

/// Observable state the UI redraws from. Counters only ever grow, so a
/// reader compares against the value it last rendered.
#[derive(Debug, Default)]
pub struct UiSignals {
    modified: u64,
    recompose: u64,
    busy: bool,
    status: Option<Status>,
    subscribers: Vec<mpsc::Sender<Signal>>,
}

impl UiSignals {
    pub fn modified_version(&self) -> u64 {
        self.modified
    }

    pub fn recompose_version(&self) -> u64 {
        self.recompose
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn subscribe(&mut self) -> mpsc::Receiver<Signal> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn mark_modified(&mut self, path: &Path) {
        self.modified += 1;
        self.publish(Signal::Modified {
            path: path.to_path_buf(),
            version: self.modified,
        });
    }

    pub(crate) fn recompose(&mut self) {
        self.recompose += 1;
        self.publish(Signal::Recompose {
            version: self.recompose,
        });
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        if self.busy == busy {
            return;
        }
        self.busy = busy;
        self.publish(Signal::Busy(busy));
    }

    pub(crate) fn info(&mut self, message: impl Into<String>) {
        self.set_status(StatusLevel::Info, message.into());
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.set_status(StatusLevel::Error, message.into());
    }

    fn set_status(&mut self, level: StatusLevel, message: String) {
        let status = Status { level, message };
        self.status = Some(status.clone());
        self.publish(Signal::Status(status));
    }

    fn publish(&mut self, signal: Signal) {
        self.subscribers
            .retain(|subscriber| subscriber.send(signal.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_only_publishes_transitions() {
        let mut signals = UiSignals::default();
        let rx = signals.subscribe();
        signals.set_busy(true);
        signals.set_busy(true);
        signals.set_busy(false);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received, vec![Signal::Busy(true), Signal::Busy(false)]);
    }

    #[test]
    fn versions_are_monotonic() {
        let mut signals = UiSignals::default();
        let seen = signals.modified_version();
        signals.mark_modified(Path::new("/img/a.png"));
        signals.mark_modified(Path::new("/img/a.png"));
        assert_eq!(signals.modified_version(), seen + 2);
        signals.recompose();
        assert_eq!(signals.recompose_version(), 1);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut signals = UiSignals::default();
        let kept = signals.subscribe();
        drop(signals.subscribe());
        signals.error("decode failed");

        assert_eq!(signals.subscribers.len(), 1);
        assert_eq!(
            kept.try_recv().expect("status"),
            Signal::Status(Status {
                level: StatusLevel::Error,
                message: "decode failed".to_string(),
            })
        );
        assert_eq!(
            signals.status().map(|status| status.level),
            Some(StatusLevel::Error)
        );
    }
}

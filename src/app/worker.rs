use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub(super) const ACTION_RESULT_POLL_INTERVAL: Duration = Duration::from_millis(24);

/// Runs `work` on a named one-shot thread and sends its result back to
/// the UI loop.
pub(super) fn spawn_worker_action<T, W>(name: &str, work: W, results: mpsc::Sender<T>) -> io::Result<()>
where
    T: Send + 'static,
    W: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = work();
            let _ = results.send(result);
        })?;
    Ok(())
}

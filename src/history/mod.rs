use crate::operation::{AdjustmentKind, AdjustmentValues, Operation};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub sequence: u64,
    pub operation: Operation,
}

impl HistoryEntry {
    pub const fn trivial_undo(&self) -> bool {
        self.operation.trivial_undo()
    }
}

/// Result of asking the history to record an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryResponse {
    Recorded,
    /// Nothing was appended because the operation was skipped.
    Dummy,
}

#[derive(Debug, Default)]
pub struct HistoryStack {
    entries: Vec<HistoryEntry>,
    next_sequence: u64,
    skipped: u64,
}

impl HistoryStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_history(&mut self, operation: Operation) -> HistoryResponse {
        self.next_sequence += 1;
        self.entries.push(HistoryEntry {
            sequence: self.next_sequence,
            operation,
        });
        HistoryResponse::Recorded
    }

    pub fn add_dummy(&mut self) -> HistoryResponse {
        self.skipped += 1;
        HistoryResponse::Dummy
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    /// Puts back an entry taken by [`HistoryStack::pop`] whose undo failed.
    pub fn restore(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.skipped = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Operations skipped since the last reset.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Entries that needed a snapshot when they were applied.
    pub fn snapshot_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.trivial_undo())
            .count()
    }

    pub fn last_value(&self, kind: AdjustmentKind) -> Option<f32> {
        self.entries.iter().rev().find_map(|entry| match entry.operation {
            Operation::Adjust {
                kind: recorded,
                value,
            } if recorded == kind => Some(value),
            _ => None,
        })
    }

    /// Current adjustment values implied by the recorded history.
    pub fn adjustment_values(&self) -> AdjustmentValues {
        let mut values = AdjustmentValues::default();
        for kind in AdjustmentKind::ALL {
            if let Some(value) = self.last_value(kind) {
                values.set(kind, value);
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{KernelKind, TransformKind};

    fn contrast(value: f32) -> Operation {
        Operation::Adjust {
            kind: AdjustmentKind::Contrast,
            value,
        }
    }

    #[test]
    fn add_history_appends_in_order() {
        let mut history = HistoryStack::new();
        assert_eq!(history.add_history(contrast(0.1)), HistoryResponse::Recorded);
        assert_eq!(
            history.add_history(Operation::Transform(TransformKind::Flip)),
            HistoryResponse::Recorded
        );
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].sequence, 1);
        assert_eq!(history.entries()[1].sequence, 2);
        assert!(!history.last().expect("last").trivial_undo());
    }

    #[test]
    fn dummy_responses_do_not_append() {
        let mut history = HistoryStack::new();
        assert_eq!(history.add_dummy(), HistoryResponse::Dummy);
        assert!(history.is_empty());
        assert_eq!(history.skipped(), 1);
    }

    #[test]
    fn last_value_finds_most_recent_entry_of_kind() {
        let mut history = HistoryStack::new();
        history.add_history(contrast(0.1));
        history.add_history(Operation::Kernel {
            kind: KernelKind::BoxBlur,
            radius: 2,
        });
        history.add_history(contrast(0.3));

        assert_eq!(history.last_value(AdjustmentKind::Contrast), Some(0.3));
        assert_eq!(history.last_value(AdjustmentKind::Exposure), None);
        history.pop();
        assert_eq!(history.adjustment_values().get(AdjustmentKind::Contrast), 0.1);
    }

    #[test]
    fn snapshot_count_tracks_non_trivial_entries() {
        let mut history = HistoryStack::new();
        history.add_history(contrast(0.1));
        history.add_history(Operation::Kernel {
            kind: KernelKind::MedianBlur,
            radius: 1,
        });
        history.add_history(Operation::Transform(TransformKind::Transpose));
        assert_eq!(history.snapshot_count(), 2);
    }

    #[test]
    fn reset_clears_entries_but_keeps_sequence_monotonic() {
        let mut history = HistoryStack::new();
        history.add_history(contrast(0.1));
        history.add_dummy();
        history.reset();
        assert!(history.is_empty());
        assert_eq!(history.skipped(), 0);

        history.add_history(contrast(0.2));
        assert_eq!(history.entries()[0].sequence, 2);
    }
}

use crate::conversion::ConversionStep;
use crate::fsa::Fsa;

/// A single performed step: the automaton as it looked *before* the step was
/// applied, together with the descriptor of what the step did. The snapshot
/// is a full structural copy; automata here are small enough that a
/// diff-based log would buy nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// The DFA before the step ran, `None` for the initialization step.
    pub snapshot_before: Option<Fsa>,
    /// What the step did, with enough payload to invert it.
    pub step: ConversionStep,
}

/// Append-only log of performed conversion steps. Entries are only ever
/// pushed by `step_forward` and popped by `step_backward`, which makes exact
/// backward replay possible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepHistory {
    entries: Vec<HistoryEntry>,
}

impl StepHistory {
    /// Appends an entry.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Removes and returns the most recent entry.
    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop()
    }

    /// The most recent entry, if any.
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no step has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the recorded steps, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn history_is_last_in_first_out() {
        let mut history = StepHistory::default();
        assert!(history.is_empty());
        assert_eq!(history.pop(), None);

        history.push(HistoryEntry {
            snapshot_before: None,
            step: ConversionStep::Initialize,
        });
        history.push(HistoryEntry {
            snapshot_before: None,
            step: ConversionStep::DeleteState {
                state: "1".to_string(),
                removed: Default::default(),
            },
        });

        assert_eq!(history.len(), 2);
        assert!(matches!(
            history.last().map(|e| &e.step),
            Some(ConversionStep::DeleteState { .. })
        ));
        assert!(matches!(
            history.pop().map(|e| e.step),
            Some(ConversionStep::DeleteState { .. })
        ));
        assert_eq!(
            history.pop().map(|e| e.step),
            Some(ConversionStep::Initialize)
        );
        assert!(history.is_empty());
    }
}

//! The phased subset-construction state machine.
//!
//! A [`ConversionEngine`] consumes a read-only NFA and incrementally builds
//! an equivalent DFA, one unit of work per [`ConversionEngine::step_forward`]
//! call. The engine is a manually-stepped coroutine: it holds no timers,
//! tasks or locks, and all suspension is caller-driven. Every performed step
//! is recorded in a [`StepHistory`] so that
//! [`ConversionEngine::step_backward`] can rewind the conversion exactly.

use std::collections::VecDeque;
use std::fmt;

use tracing::trace;

use crate::fsa::{
    composite_label, target_label, AutomatonError, Fsa, RemovedTransitions, EMPTY_SET,
};
use crate::history::{HistoryEntry, StepHistory};
use crate::math::{Map, Set};
use crate::minimization::{find_equivalent_pair, merge_pair};

/// The phases the conversion moves through, in order. The current phase is
/// derived from the cursors and pending queues rather than stored, so
/// rewinding a step automatically rewinds the phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No step has been performed, the DFA does not exist yet.
    Uninitialized,
    /// The (state × symbol) transition table is being filled in.
    GeneratingTransitions,
    /// States without incoming transitions are being deleted.
    PruningUnreachable,
    /// Equivalent state pairs are being merged.
    MergingRedundant,
    /// Nothing is left to do; `step_forward` returns the done sentinel.
    Done,
}

/// Descriptor of a single performed conversion step. Each variant carries
/// enough payload to invert the step without recomputing the forward
/// algorithm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversionStep {
    /// The DFA skeleton was created from the powerset of the NFA states.
    Initialize,
    /// One (state, symbol) transition was resolved.
    AddTransition {
        /// Origin DFA state.
        from: String,
        /// Destination DFA state label.
        to: String,
        /// The alphabet symbol the transition is taken on.
        symbol: char,
        /// State cursor at the time the step ran, for undo.
        prev_state_index: usize,
        /// Symbol cursor at the time the step ran, for undo.
        prev_symbol_index: usize,
    },
    /// One unreachable state was deleted.
    DeleteState {
        /// The deleted state.
        state: String,
        /// Everything the deletion removed from the transition table.
        removed: RemovedTransitions,
    },
    /// One pair of equivalent states was merged.
    MergeStates {
        /// The merged pair, in state order.
        states: [String; 2],
        /// Label of the replacement state.
        merged: String,
        /// The outgoing transition entries of the two removed states.
        removed: [Map<char, Vec<String>>; 2],
        /// The (state, symbol) locations redirected to the merged state.
        retargeted: Vec<(String, char)>,
    },
}

impl fmt::Display for ConversionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionStep::Initialize => write!(f, "initialize DFA"),
            ConversionStep::AddTransition {
                from, to, symbol, ..
            } => {
                write!(f, "add transition from {from} on input {symbol} to {to}")
            }
            ConversionStep::DeleteState { state, .. } => write!(f, "delete state {state}"),
            ConversionStep::MergeStates { states, merged, .. } => {
                write!(f, "merge states {} and {} into {merged}", states[0], states[1])
            }
        }
    }
}

/// Incrementally converts an NFA into an equivalent DFA via subset
/// construction, exposing every algorithmic step as a discrete, replayable,
/// undoable event.
///
/// # Example
///
/// ```
/// use nfa2dfa::prelude::*;
///
/// let nfa = Fsa::builder()
///     .states(["1", "2"])
///     .symbols(['a'])
///     .transition("1", 'a', ["1", "2"])
///     .start("1")
///     .accept(["2"])
///     .build()
///     .unwrap();
///
/// let mut engine = ConversionEngine::new(nfa);
/// let steps = engine.complete().unwrap();
/// assert!(matches!(steps[0].1, ConversionStep::Initialize));
/// assert_eq!(engine.phase(), Phase::Done);
/// ```
#[derive(Clone, Debug)]
pub struct ConversionEngine {
    /// The source automaton. Read-only for the lifetime of the conversion.
    nfa: Fsa,
    /// The automaton under construction, `None` before the first step.
    dfa: Option<Fsa>,
    /// Index into `dfa.states` of the state whose transitions are being
    /// generated.
    state_index: usize,
    /// Index into `dfa.alphabet` of the symbol the next step resolves.
    symbol_index: usize,
    /// States scheduled for deletion. Derived lazily when transition
    /// generation finishes and re-derived whenever the batch drains, so
    /// deletion cascades are picked up; consumed front to back.
    pending_unreachable: Option<VecDeque<String>>,
    /// Pairs scheduled for merging. Only ever populated by undoing a merge;
    /// forward steps rescan the automaton from scratch instead.
    pending_redundant: Option<VecDeque<(String, String)>>,
    /// Log of performed steps for backward replay.
    history: StepHistory,
}

impl ConversionEngine {
    /// Creates an engine for converting `nfa`. No work happens until the
    /// first [`ConversionEngine::step_forward`] call.
    pub fn new(nfa: Fsa) -> Self {
        Self {
            nfa,
            dfa: None,
            state_index: 0,
            symbol_index: 0,
            pending_unreachable: None,
            pending_redundant: None,
            history: StepHistory::default(),
        }
    }

    /// The source NFA.
    pub fn nfa(&self) -> &Fsa {
        &self.nfa
    }

    /// The DFA built so far, `None` before the first step.
    pub fn dfa(&self) -> Option<&Fsa> {
        self.dfa.as_ref()
    }

    /// The log of performed steps.
    pub fn history(&self) -> &StepHistory {
        &self.history
    }

    /// The phase the next `step_forward` call will work in.
    pub fn phase(&self) -> Phase {
        let Some(dfa) = self.dfa.as_ref() else {
            return Phase::Uninitialized;
        };
        if self.generation_cursor(dfa).is_some() {
            return Phase::GeneratingTransitions;
        }
        let deletion_queued = self
            .pending_unreachable
            .as_ref()
            .is_some_and(|queue| !queue.is_empty());
        if deletion_queued || !self.collect_unreachable(dfa).is_empty() {
            return Phase::PruningUnreachable;
        }
        let pair_queued = self
            .pending_redundant
            .as_ref()
            .is_some_and(|queue| !queue.is_empty());
        if pair_queued || find_equivalent_pair(dfa).is_some() {
            Phase::MergingRedundant
        } else {
            Phase::Done
        }
    }

    /// Performs exactly one unit of work and returns the new DFA snapshot
    /// together with the step descriptor, or `Ok(None)` once the conversion
    /// is done. A step either fully commits (mutating the DFA and appending
    /// to the history) or the call fails with nothing committed; after an
    /// error the in-progress DFA must be considered invalid and discarded.
    pub fn step_forward(&mut self) -> Result<Option<(Fsa, ConversionStep)>, AutomatonError> {
        let Some(dfa) = self.dfa.as_ref() else {
            return self.initialize().map(Some);
        };

        if let Some((state_index, symbol_index)) = self.generation_cursor(dfa) {
            return self.generate_transition(state_index, symbol_index).map(Some);
        }

        let needs_scan = self
            .pending_unreachable
            .as_ref()
            .map_or(true, |queue| queue.is_empty());
        if needs_scan {
            self.pending_unreachable = Some(self.collect_unreachable(dfa));
        }
        if self
            .pending_unreachable
            .as_ref()
            .is_some_and(|queue| !queue.is_empty())
        {
            return self.delete_unreachable().map(Some);
        }

        let pair = match self
            .pending_redundant
            .as_ref()
            .and_then(|queue| queue.front().cloned())
        {
            Some(pair) => Some(pair),
            None => find_equivalent_pair(dfa),
        };
        if let Some((s1, s2)) = pair {
            return self.merge_redundant(s1, s2).map(Some);
        }

        trace!("nothing more to do");
        Ok(None)
    }

    /// Inverts the most recent step using only its descriptor and the
    /// recorded snapshot, without recomputing the forward algorithm. Returns
    /// the restored DFA (which is `None` when the initialization step itself
    /// was reverted) and the descriptor of the undone step, or `None` when
    /// no step has been performed.
    pub fn step_backward(&mut self) -> Option<(Option<Fsa>, ConversionStep)> {
        let entry = self.history.pop()?;
        trace!("revert step: {}", entry.step);
        self.dfa = entry.snapshot_before;

        match &entry.step {
            ConversionStep::Initialize => {
                self.state_index = 0;
                self.symbol_index = 0;
                self.pending_unreachable = None;
                self.pending_redundant = None;
            }
            ConversionStep::AddTransition {
                prev_state_index,
                prev_symbol_index,
                ..
            } => {
                self.state_index = *prev_state_index;
                self.symbol_index = *prev_symbol_index;
                // queues belong to later phases and were not yet computed
                self.pending_unreachable = None;
                self.pending_redundant = None;
            }
            ConversionStep::DeleteState { state, .. } => {
                self.pending_unreachable
                    .get_or_insert_with(VecDeque::new)
                    .push_front(state.clone());
                self.pending_redundant = None;
            }
            ConversionStep::MergeStates { states, .. } => {
                self.pending_redundant
                    .get_or_insert_with(VecDeque::new)
                    .push_front((states[0].clone(), states[1].clone()));
            }
        }

        Some((self.dfa.clone(), entry.step))
    }

    /// Performs `n` forward steps and returns the DFA after the last one.
    /// Steps past the done sentinel are no-ops.
    pub fn step(&mut self, n: usize) -> Result<Option<Fsa>, AutomatonError> {
        for _ in 0..n {
            self.step_forward()?;
        }
        Ok(self.dfa.clone())
    }

    /// Drains `step_forward` until the conversion is done, collecting every
    /// intermediate (snapshot, descriptor) pair in order.
    pub fn complete(&mut self) -> Result<Vec<(Fsa, ConversionStep)>, AutomatonError> {
        let mut steps = Vec::new();
        while let Some(pair) = self.step_forward()? {
            steps.push(pair);
        }
        Ok(steps)
    }

    /// The effective (state, symbol) cursor for the next transition-generation
    /// step, rolling over to the next state once a row is complete. `None`
    /// once every row has been generated.
    fn generation_cursor(&self, dfa: &Fsa) -> Option<(usize, usize)> {
        if dfa.alphabet().is_empty() {
            return None;
        }
        let (mut state_index, mut symbol_index) = (self.state_index, self.symbol_index);
        if symbol_index == dfa.alphabet().len() {
            state_index += 1;
            symbol_index = 0;
        }
        (state_index < dfa.states().len()).then_some((state_index, symbol_index))
    }

    /// Phase 1: builds the DFA skeleton. States are the powerset of the NFA
    /// states (sink `Ø` first), transitions start out undefined, the start
    /// state is the canonically labeled ε-closure of the NFA start state and
    /// accept states are all powerset members intersecting the NFA accept
    /// states.
    fn initialize(&mut self) -> Result<(Fsa, ConversionStep), AutomatonError> {
        let start = self
            .nfa
            .start_state()
            .ok_or(AutomatonError::MissingStartState)?;

        let powerset = self.nfa.powerset_of_states()?;
        let states: Vec<String> = powerset.iter().map(|subset| target_label(subset)).collect();

        let mut transitions: Map<String, Map<char, Vec<String>>> = Map::default();
        for state in &states {
            transitions.insert(state.clone(), Map::default());
        }

        let start_label = composite_label(&self.nfa.epsilon_closure(start)?);
        let accept_states: Vec<String> = powerset
            .iter()
            .filter(|subset| {
                subset
                    .iter()
                    .any(|member| self.nfa.accept_states().contains(member))
            })
            .map(|subset| target_label(subset))
            .collect();

        if !states.contains(&start_label) {
            return Err(AutomatonError::InternalInconsistency(format!(
                "start state {start_label} is not a member of the state powerset"
            )));
        }

        let dfa = Fsa::new(
            states,
            self.nfa.alphabet().to_vec(),
            transitions,
            Some(start_label),
            accept_states,
        )?;

        trace!("initialize DFA");
        let step = ConversionStep::Initialize;
        self.dfa = Some(dfa.clone());
        self.history.push(HistoryEntry {
            snapshot_before: None,
            step: step.clone(),
        });
        Ok((dfa, step))
    }

    /// Phase 2: resolves the transition for one (state, symbol) pair. The
    /// sink state loops back to itself; composite states take the union of
    /// the reachable states of their constituents, dropping the sink when
    /// any real destination exists.
    fn generate_transition(
        &mut self,
        state_index: usize,
        symbol_index: usize,
    ) -> Result<(Fsa, ConversionStep), AutomatonError> {
        let dfa = self
            .dfa
            .as_ref()
            .expect("transition generation requires an initialized DFA");
        let state = dfa.states()[state_index].clone();
        let symbol = dfa.alphabet()[symbol_index];

        let targets = if state_index == 0 {
            // the sink is absorbing
            vec![EMPTY_SET.to_string()]
        } else {
            let mut union: Vec<String> = Vec::new();
            for constituent in state.split(',') {
                union.extend(self.nfa.reachable_states(constituent, symbol)?);
            }
            union.sort();
            union.dedup();
            if union.iter().any(|t| t != EMPTY_SET) {
                union.retain(|t| t != EMPTY_SET);
            }
            union
        };
        let to = target_label(&targets);
        trace!("add transition from {state} on input {symbol} to {to}");

        let snapshot = dfa.clone();
        let step = ConversionStep::AddTransition {
            from: state.clone(),
            to: to.clone(),
            symbol,
            prev_state_index: state_index,
            prev_symbol_index: symbol_index,
        };

        let dfa = self
            .dfa
            .as_mut()
            .expect("transition generation requires an initialized DFA");
        // the DFA stores the single canonical destination label
        dfa.insert_transition(&state, symbol, vec![to])?;
        self.state_index = state_index;
        self.symbol_index = symbol_index + 1;
        self.history.push(HistoryEntry {
            snapshot_before: Some(snapshot),
            step: step.clone(),
        });
        Ok((dfa.clone(), step))
    }

    /// Computes the states scheduled for deletion: everything without an
    /// incoming transition from another state (self-loops do not count) that
    /// is not the start state. Runs when the pruning phase is entered and
    /// again whenever the previous batch has been consumed, since a deletion
    /// can strip another state of its last incoming edge.
    fn collect_unreachable(&self, dfa: &Fsa) -> VecDeque<String> {
        let mut incoming: Set<String> = Set::default();
        for state in dfa.states() {
            for &symbol in dfa.alphabet() {
                let Some(targets) = dfa.transition(state, symbol) else {
                    continue;
                };
                let target = target_label(targets);
                if &target != state {
                    incoming.insert(target);
                }
            }
        }

        dfa.states()
            .iter()
            .filter(|state| !incoming.contains(*state) && dfa.start_state() != Some(state.as_str()))
            .cloned()
            .collect()
    }

    /// Phase 3: deletes the next scheduled unreachable state.
    fn delete_unreachable(&mut self) -> Result<(Fsa, ConversionStep), AutomatonError> {
        let state = self
            .pending_unreachable
            .as_ref()
            .and_then(|queue| queue.front().cloned())
            .expect("pruning requires a scheduled unreachable state");
        let dfa = self
            .dfa
            .as_mut()
            .expect("pruning requires an initialized DFA");

        let snapshot = dfa.clone();
        let removed = dfa.remove_state(&state)?;
        if let Some(queue) = self.pending_unreachable.as_mut() {
            queue.pop_front();
        }

        trace!("delete state {state}");
        let step = ConversionStep::DeleteState { state, removed };
        self.history.push(HistoryEntry {
            snapshot_before: Some(snapshot),
            step: step.clone(),
        });
        Ok((dfa.clone(), step))
    }

    /// Phase 4: merges one pair of equivalent states.
    fn merge_redundant(
        &mut self,
        s1: String,
        s2: String,
    ) -> Result<(Fsa, ConversionStep), AutomatonError> {
        let dfa = self
            .dfa
            .as_mut()
            .expect("merging requires an initialized DFA");

        let snapshot = dfa.clone();
        let outcome = merge_pair(dfa, &s1, &s2)?;
        if let Some(queue) = self.pending_redundant.as_mut() {
            if queue.front() == Some(&(s1.clone(), s2.clone())) {
                queue.pop_front();
            }
        }

        let step = ConversionStep::MergeStates {
            states: [s1, s2],
            merged: outcome.merged,
            removed: outcome.removed,
            retargeted: outcome.retargeted,
        };
        self.history.push(HistoryEntry {
            snapshot_before: Some(snapshot),
            step: step.clone(),
        });
        Ok((dfa.clone(), step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsa::EPSILON;

    /// The NFA from Sipser's subset-construction example: states {1,2,3},
    /// alphabet {a,b}, 1 →b→ 2, 1 →ε→ 3, 2 →a→ {2,3}, 2 →b→ 3, 3 →a→ 1,
    /// start 1, accept {1}.
    fn nfa_one() -> Fsa {
        Fsa::builder()
            .states(["1", "2", "3"])
            .symbols(['a', 'b'])
            .transition("1", 'b', ["2"])
            .transition("1", EPSILON, ["3"])
            .transition("2", 'a', ["2", "3"])
            .transition("2", 'b', ["3"])
            .transition("3", 'a', ["1"])
            .start("1")
            .accept(["1"])
            .build()
            .unwrap()
    }

    fn nfa_two() -> Fsa {
        Fsa::builder()
            .states(["q1", "q2", "q3"])
            .symbols(['0', '1'])
            .transition("q1", '0', ["q3"])
            .transition("q1", '1', ["q2", "q3"])
            .transition("q2", '0', ["q2"])
            .transition("q2", '1', ["q2"])
            .transition("q2", EPSILON, ["q3"])
            .transition("q3", '0', ["q2"])
            .transition("q3", '1', ["q1", "q2"])
            .start("q1")
            .accept(["q1", "q3"])
            .build()
            .unwrap()
    }

    fn nfa_three() -> Fsa {
        Fsa::builder()
            .states(["1", "2", "3"])
            .symbols(['a', 'b'])
            .transition("1", 'b', ["2"])
            .transition("1", EPSILON, ["3"])
            .transition("2", 'a', ["1"])
            .transition("2", 'b', ["2"])
            .transition("3", 'a', ["2", "3"])
            .transition("3", 'b', ["3"])
            .start("1")
            .accept(["2"])
            .build()
            .unwrap()
    }

    fn assert_targets(dfa: &Fsa, state: &str, symbol: char, expected: &str) {
        assert_eq!(
            dfa.transition(state, symbol),
            Some(&vec![expected.to_string()]),
            "transition from {state} on {symbol}"
        );
    }

    #[test_log::test]
    fn conversion_one_initializes_the_dfa() {
        let mut engine = ConversionEngine::new(nfa_one());
        assert_eq!(engine.phase(), Phase::Uninitialized);

        let (dfa, step) = engine.step_forward().unwrap().unwrap();
        assert_eq!(step, ConversionStep::Initialize);
        assert_eq!(engine.phase(), Phase::GeneratingTransitions);

        assert_eq!(
            dfa.states(),
            ["Ø", "1", "2", "1,2", "3", "1,3", "2,3", "1,2,3"]
        );
        assert_eq!(dfa.alphabet(), ['a', 'b']);
        assert_eq!(dfa.start_state(), Some("1,3"));
        assert_eq!(dfa.accept_states(), ["1", "1,2", "1,3", "1,2,3"]);
        for state in dfa.states() {
            for &symbol in dfa.alphabet() {
                assert_eq!(dfa.transition(state, symbol), None);
            }
        }
    }

    #[test_log::test]
    fn conversion_one_generates_transitions() {
        let mut engine = ConversionEngine::new(nfa_one());
        engine.step_forward().unwrap();
        let dfa = engine.step(16).unwrap().unwrap();

        assert_targets(&dfa, "Ø", 'a', "Ø");
        assert_targets(&dfa, "Ø", 'b', "Ø");
        assert_targets(&dfa, "1", 'a', "Ø");
        assert_targets(&dfa, "1", 'b', "2");
        assert_targets(&dfa, "2", 'a', "2,3");
        assert_targets(&dfa, "2", 'b', "3");
        assert_targets(&dfa, "1,2", 'a', "2,3");
        assert_targets(&dfa, "1,2", 'b', "2,3");
        assert_targets(&dfa, "3", 'a', "1,3");
        assert_targets(&dfa, "3", 'b', "Ø");
        assert_targets(&dfa, "1,3", 'a', "1,3");
        assert_targets(&dfa, "1,3", 'b', "2");
        assert_targets(&dfa, "2,3", 'a', "1,2,3");
        assert_targets(&dfa, "2,3", 'b', "3");
        assert_targets(&dfa, "1,2,3", 'a', "1,2,3");
        assert_targets(&dfa, "1,2,3", 'b', "2,3");

        assert_eq!(engine.phase(), Phase::PruningUnreachable);
    }

    #[test_log::test]
    fn conversion_one_prunes_unreachable_states() {
        let mut engine = ConversionEngine::new(nfa_one());
        engine.step(17).unwrap();
        let dfa = engine.step(2).unwrap().unwrap();

        assert_eq!(dfa.states(), ["Ø", "2", "3", "1,3", "2,3", "1,2,3"]);
        assert_eq!(dfa.start_state(), Some("1,3"));
        assert_eq!(dfa.accept_states(), ["1,3", "1,2,3"]);
        assert!(dfa.transitions().get("1").is_none());
        assert!(dfa.transitions().get("1,2").is_none());

        // no equivalent pairs here, so the conversion is done
        assert_eq!(engine.step_forward().unwrap(), None);
        assert_eq!(engine.phase(), Phase::Done);
    }

    #[test_log::test]
    fn conversion_two_runs_to_completion() {
        let mut engine = ConversionEngine::new(nfa_two());

        let (dfa, _) = engine.step_forward().unwrap().unwrap();
        assert_eq!(
            dfa.states(),
            ["Ø", "q1", "q2", "q1,q2", "q3", "q1,q3", "q2,q3", "q1,q2,q3"]
        );
        assert_eq!(dfa.start_state(), Some("q1"));
        assert_eq!(
            dfa.accept_states(),
            ["q1", "q1,q2", "q3", "q1,q3", "q2,q3", "q1,q2,q3"]
        );

        let dfa = engine.step(16).unwrap().unwrap();
        assert_targets(&dfa, "q1", '0', "q3");
        assert_targets(&dfa, "q1", '1', "q2,q3");
        assert_targets(&dfa, "q2", '0', "q2,q3");
        assert_targets(&dfa, "q2", '1', "q2,q3");
        assert_targets(&dfa, "q1,q2", '0', "q2,q3");
        assert_targets(&dfa, "q1,q2", '1', "q2,q3");
        assert_targets(&dfa, "q3", '0', "q2,q3");
        assert_targets(&dfa, "q3", '1', "q1,q2,q3");
        assert_targets(&dfa, "q1,q3", '0', "q2,q3");
        assert_targets(&dfa, "q1,q3", '1', "q1,q2,q3");
        assert_targets(&dfa, "q2,q3", '0', "q2,q3");
        assert_targets(&dfa, "q2,q3", '1', "q1,q2,q3");
        assert_targets(&dfa, "q1,q2,q3", '0', "q2,q3");
        assert_targets(&dfa, "q1,q2,q3", '1', "q1,q2,q3");

        // Ø, q2, "q1,q2" and "q1,q3" have no incoming transitions
        let dfa = engine.step(4).unwrap().unwrap();
        assert_eq!(dfa.states(), ["q1", "q3", "q2,q3", "q1,q2,q3"]);
        assert_eq!(dfa.accept_states(), ["q1", "q3", "q2,q3", "q1,q2,q3"]);

        // every state accepts, so the pairwise criterion collapses the whole
        // automaton one merge at a time
        let (dfa, _) = engine.step_forward().unwrap().unwrap();
        assert_eq!(dfa.states(), ["q1", "q3", "q2,q3+q1,q2,q3"]);
        let (dfa, _) = engine.step_forward().unwrap().unwrap();
        assert_eq!(dfa.states(), ["q1", "q3+q2,q3+q1,q2,q3"]);
        let (dfa, _) = engine.step_forward().unwrap().unwrap();
        assert_eq!(dfa.states(), ["q1+q3+q2,q3+q1,q2,q3"]);
        assert_eq!(dfa.start_state(), Some("q1+q3+q2,q3+q1,q2,q3"));
        assert_eq!(dfa.accept_states(), ["q1+q3+q2,q3+q1,q2,q3"]);

        assert_eq!(engine.step_forward().unwrap(), None);
    }

    #[test_log::test]
    fn conversion_three_merges_redundant_states() {
        let mut engine = ConversionEngine::new(nfa_three());

        let (dfa, _) = engine.step_forward().unwrap().unwrap();
        assert_eq!(dfa.start_state(), Some("1,3"));
        assert_eq!(dfa.accept_states(), ["2", "1,2", "2,3", "1,2,3"]);

        let dfa = engine.step(16).unwrap().unwrap();
        assert_targets(&dfa, "1", 'a', "Ø");
        assert_targets(&dfa, "1", 'b', "2");
        assert_targets(&dfa, "2", 'a', "1,3");
        assert_targets(&dfa, "2", 'b', "2");
        assert_targets(&dfa, "1,2", 'a', "1,3");
        assert_targets(&dfa, "1,2", 'b', "2");
        assert_targets(&dfa, "3", 'a', "2,3");
        assert_targets(&dfa, "3", 'b', "3");
        assert_targets(&dfa, "1,3", 'a', "2,3");
        assert_targets(&dfa, "1,3", 'b', "2,3");
        assert_targets(&dfa, "2,3", 'a', "1,2,3");
        assert_targets(&dfa, "2,3", 'b', "2,3");
        assert_targets(&dfa, "1,2,3", 'a', "1,2,3");
        assert_targets(&dfa, "1,2,3", 'b', "2,3");

        // the first scan schedules 1, "1,2" and 3 for deletion
        let dfa = engine.step(3).unwrap().unwrap();
        assert_eq!(dfa.states(), ["Ø", "2", "1,3", "2,3", "1,2,3"]);
        assert_eq!(engine.phase(), Phase::PruningUnreachable);

        // deleting 1 and "1,2" stripped Ø and 2 of their last incoming
        // edges, so the rescan deletes them as well
        let dfa = engine.step(2).unwrap().unwrap();
        assert_eq!(dfa.states(), ["1,3", "2,3", "1,2,3"]);
        assert_eq!(dfa.accept_states(), ["2,3", "1,2,3"]);
        assert_eq!(engine.phase(), Phase::MergingRedundant);

        // "2,3" and "1,2,3" both accept and only move within the pair
        let (dfa, step) = engine.step_forward().unwrap().unwrap();
        assert!(matches!(
            &step,
            ConversionStep::MergeStates { states, .. }
                if states == &["2,3".to_string(), "1,2,3".to_string()]
        ));
        assert_eq!(dfa.states(), ["1,3", "2,3+1,2,3"]);
        assert_eq!(dfa.accept_states(), ["2,3+1,2,3"]);
        assert_eq!(dfa.start_state(), Some("1,3"));
        assert_targets(&dfa, "1,3", 'a', "2,3+1,2,3");
        assert_targets(&dfa, "1,3", 'b', "2,3+1,2,3");
        assert_targets(&dfa, "2,3+1,2,3", 'a', "2,3+1,2,3");
        assert_targets(&dfa, "2,3+1,2,3", 'b', "2,3+1,2,3");

        assert_eq!(engine.step_forward().unwrap(), None);
        assert_eq!(engine.phase(), Phase::Done);
    }

    #[test_log::test]
    fn every_surviving_state_is_reachable_after_completion() {
        for nfa in [nfa_one(), nfa_two(), nfa_three()] {
            let mut engine = ConversionEngine::new(nfa);
            engine.complete().unwrap();
            let dfa = engine.dfa().unwrap();

            let start = dfa.start_state().unwrap().to_string();
            let mut visited: Set<String> = Set::default();
            visited.insert(start.clone());
            let mut queue = VecDeque::from([start]);
            while let Some(state) = queue.pop_front() {
                for &symbol in dfa.alphabet() {
                    let Some(targets) = dfa.transition(&state, symbol) else {
                        continue;
                    };
                    let target = target_label(targets);
                    if visited.insert(target.clone()) {
                        queue.push_back(target);
                    }
                }
            }
            for state in dfa.states() {
                assert!(
                    visited.contains(state),
                    "state {state} is not reachable from the start state"
                );
            }
        }
    }

    #[test_log::test]
    fn phase_skips_pruning_when_no_state_is_unreachable() {
        // the DFA here is [Ø, 1] with Ø fed by 1, so nothing is unreachable
        // and no pair is equivalent
        let nfa = Fsa::builder()
            .states(["1"])
            .symbols(['a'])
            .start("1")
            .accept(["1"])
            .build()
            .unwrap();
        let mut engine = ConversionEngine::new(nfa);
        engine.step(3).unwrap();

        assert_eq!(engine.phase(), Phase::Done);
        assert_eq!(engine.step_forward().unwrap(), None);
    }

    #[test_log::test]
    fn step_backward_restores_the_previous_snapshot() {
        let mut engine = ConversionEngine::new(nfa_one());
        engine.step(5).unwrap();

        let before = engine.dfa().cloned();
        let (_, step) = engine.step_forward().unwrap().unwrap();

        let (restored, undone) = engine.step_backward().unwrap();
        assert_eq!(undone, step);
        assert_eq!(restored, before);
        assert_eq!(engine.dfa().cloned(), before);

        // replaying produces the identical descriptor
        let (_, replayed) = engine.step_forward().unwrap().unwrap();
        assert_eq!(replayed, step);
    }

    #[test_log::test]
    fn step_backward_reverts_deletions_and_merges() {
        let mut engine = ConversionEngine::new(nfa_three());
        engine.step(17).unwrap();

        // undo and replay a deletion
        let before = engine.dfa().cloned();
        let (_, deletion) = engine.step_forward().unwrap().unwrap();
        assert!(matches!(deletion, ConversionStep::DeleteState { .. }));
        let (restored, _) = engine.step_backward().unwrap();
        assert_eq!(restored, before);
        let (_, replayed) = engine.step_forward().unwrap().unwrap();
        assert_eq!(replayed, deletion);

        // undo and replay the merge
        engine.step(4).unwrap();
        let before = engine.dfa().cloned();
        let (_, merge) = engine.step_forward().unwrap().unwrap();
        assert!(matches!(merge, ConversionStep::MergeStates { .. }));
        let (restored, _) = engine.step_backward().unwrap();
        assert_eq!(restored, before);
        assert_eq!(engine.phase(), Phase::MergingRedundant);
        let (_, replayed) = engine.step_forward().unwrap().unwrap();
        assert_eq!(replayed, merge);
    }

    #[test_log::test]
    fn reverting_past_initialize_resets_the_engine() {
        let mut engine = ConversionEngine::new(nfa_one());
        engine.step(3).unwrap();

        engine.step_backward().unwrap();
        engine.step_backward().unwrap();
        let (restored, step) = engine.step_backward().unwrap();
        assert_eq!(step, ConversionStep::Initialize);
        assert_eq!(restored, None);
        assert_eq!(engine.phase(), Phase::Uninitialized);
        assert!(engine.dfa().is_none());
        assert_eq!(engine.step_backward(), None);
    }

    #[test_log::test]
    fn full_rewind_and_replay_reproduces_every_step() {
        let mut engine = ConversionEngine::new(nfa_three());
        let first_run: Vec<ConversionStep> = engine
            .complete()
            .unwrap()
            .into_iter()
            .map(|(_, step)| step)
            .collect();
        assert!(!first_run.is_empty());

        let mut rewound = 0;
        while engine.step_backward().is_some() {
            rewound += 1;
        }
        assert_eq!(rewound, first_run.len());
        assert_eq!(engine.phase(), Phase::Uninitialized);

        let second_run: Vec<ConversionStep> = engine
            .complete()
            .unwrap()
            .into_iter()
            .map(|(_, step)| step)
            .collect();
        assert_eq!(second_run, first_run);
    }

    #[test_log::test]
    fn complete_collects_every_step_in_order() {
        let mut engine = ConversionEngine::new(nfa_one());
        let steps = engine.complete().unwrap();

        // 1 initialization + 16 transitions + 2 deletions
        assert_eq!(steps.len(), 19);
        assert_eq!(steps[0].1, ConversionStep::Initialize);
        assert!(steps[1..17]
            .iter()
            .all(|(_, step)| matches!(step, ConversionStep::AddTransition { .. })));
        assert!(steps[17..]
            .iter()
            .all(|(_, step)| matches!(step, ConversionStep::DeleteState { .. })));
        assert_eq!(engine.history().len(), 19);

        // completing again is a no-op
        assert_eq!(engine.complete().unwrap(), vec![]);
    }

    #[test_log::test]
    fn conversion_without_start_state_fails() {
        let nfa = Fsa::builder()
            .states(["1"])
            .symbols(['a'])
            .transition("1", 'a', ["1"])
            .build()
            .unwrap();
        let mut engine = ConversionEngine::new(nfa);
        assert_eq!(
            engine.step_forward(),
            Err(AutomatonError::MissingStartState)
        );
        // nothing was committed
        assert!(engine.dfa().is_none());
        assert!(engine.history().is_empty());
    }

    #[test_log::test]
    fn step_descriptions_match_the_performed_work() {
        let mut engine = ConversionEngine::new(nfa_one());
        let (_, init) = engine.step_forward().unwrap().unwrap();
        assert_eq!(init.to_string(), "initialize DFA");

        let (_, transition) = engine.step_forward().unwrap().unwrap();
        assert_eq!(
            transition.to_string(),
            "add transition from Ø on input a to Ø"
        );

        engine.step(16).unwrap();
        let last = engine.history().last().unwrap().step.clone();
        assert_eq!(last.to_string(), "delete state 1");
    }
}

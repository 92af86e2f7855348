use std::collections::VecDeque;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{Map, Set};

/// The reserved symbol for empty-input transitions. It is never part of an
/// automaton's alphabet, but transition entries may be keyed by it.
pub const EPSILON: char = 'ε';

/// Label of the sink state, i.e. the explicit representation of the empty
/// subset of states. During subset construction it absorbs every transition
/// for which no actual destination exists.
pub const EMPTY_SET: &str = "Ø";

/// Upper bound on the number of worklist iterations performed when chasing
/// ε-transitions. The visited set already guarantees termination, so hitting
/// this bound signals a malformed automaton rather than a long computation.
pub const CLOSURE_ITERATION_LIMIT: usize = 10_000;

/// The ways in which operations on a [`Fsa`] can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutomatonError {
    /// A state label was used that does not exist in the automaton.
    #[error("state {0} does not exist")]
    UnknownState(String),
    /// A symbol outside of `alphabet ∪ {ε}` was used in a transition query.
    #[error("alphabet does not contain symbol {0}")]
    UnknownSymbol(char),
    /// Chasing ε-transitions exceeded [`CLOSURE_ITERATION_LIMIT`] iterations.
    #[error("ε-closure exceeded {0} iterations, the automaton is malformed")]
    InfiniteLoop(usize),
    /// The powerset of the states is too large to enumerate.
    #[error("powerset of {0} states cannot be enumerated")]
    TooManyStates(usize),
    /// A conversion was started from an automaton without a start state.
    #[error("automaton has no start state")]
    MissingStartState,
    /// An invariant that should hold by construction was violated. This is a
    /// bug in the conversion, not bad input, and the session that produced it
    /// must be discarded.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

/// Produces the canonical label of a composite state from its member labels:
/// members are sorted and joined with a comma. Every place that synthesizes a
/// composite label (initialization, transition generation, merging) goes
/// through this function so that labels compare equal by string identity.
pub fn composite_label<S: AsRef<str>>(members: &[S]) -> String {
    members.iter().map(|m| m.as_ref()).sorted().join(",")
}

/// Label of an already-sorted target set, as stored in a transition entry.
pub fn target_label<S: AsRef<str>>(targets: &[S]) -> String {
    targets.iter().map(|t| t.as_ref()).join(",")
}

/// A finite state automaton, either an NFA or a DFA.
///
/// States are identified purely by their string labels; transition entries
/// refer to other states by label only, never by reference. The insertion
/// order of `states` is significant: it drives the iteration order of
/// transition generation and pruning during conversion, and therefore the
/// order in which steps are emitted.
///
/// The JSON representation (via serde) uses camelCase field names and is the
/// interchange shape consumed by drivers:
/// `{"states": [...], "alphabet": [...], "transitions": {...},
///   "startState": ..., "acceptStates": [...]}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fsa {
    /// Unique state labels in insertion order.
    pub(crate) states: Vec<String>,
    /// Input symbols, sorted and deduplicated, ε excluded.
    pub(crate) alphabet: Vec<char>,
    /// Per-state transition entries. A missing entry means "no transition
    /// defined"; present entries always hold a sorted, non-empty target list.
    pub(crate) transitions: Map<String, Map<char, Vec<String>>>,
    /// The start state, if one has been designated.
    pub(crate) start_state: Option<String>,
    /// Accepting states, a subset of `states`.
    pub(crate) accept_states: Vec<String>,
}

/// What [`Fsa::remove_state`] actually removed, captured so that a step
/// descriptor can carry enough information to invert the removal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemovedTransitions {
    /// The outgoing transition entries of the removed state.
    pub outgoing: Map<char, Vec<String>>,
    /// The (state, symbol) locations from whose targets the label was
    /// stripped, in state-order then symbol-order.
    pub incoming: Vec<(String, char)>,
}

impl Fsa {
    /// Creates a new automaton, validating the referential invariants: every
    /// label appearing in `transitions`, `start_state` and `accept_states`
    /// must exist in `states`, and transition symbols must be drawn from
    /// `alphabet ∪ {ε}`. The alphabet is sorted and deduplicated; ε may not
    /// be a member of it.
    pub fn new(
        states: Vec<String>,
        alphabet: Vec<char>,
        transitions: Map<String, Map<char, Vec<String>>>,
        start_state: Option<String>,
        accept_states: Vec<String>,
    ) -> Result<Self, AutomatonError> {
        let mut seen = Set::default();
        for state in &states {
            if !seen.insert(state.clone()) {
                return Err(AutomatonError::InternalInconsistency(format!(
                    "duplicate state label {state}"
                )));
            }
        }

        if alphabet.contains(&EPSILON) {
            return Err(AutomatonError::UnknownSymbol(EPSILON));
        }
        let alphabet: Vec<char> = alphabet.into_iter().sorted().dedup().collect();

        let mut normalized: Map<String, Map<char, Vec<String>>> = Map::default();
        for (from, row) in transitions {
            if !seen.contains(&from) {
                return Err(AutomatonError::UnknownState(from));
            }
            let mut normalized_row: Map<char, Vec<String>> = Map::default();
            for (symbol, targets) in row {
                if symbol != EPSILON && !alphabet.contains(&symbol) {
                    return Err(AutomatonError::UnknownSymbol(symbol));
                }
                for target in &targets {
                    if !seen.contains(target) {
                        return Err(AutomatonError::UnknownState(target.clone()));
                    }
                }
                let targets: Vec<String> = targets.into_iter().sorted().dedup().collect();
                if !targets.is_empty() {
                    normalized_row.insert(symbol, targets);
                }
            }
            normalized.insert(from, normalized_row);
        }

        if let Some(start) = &start_state {
            if !seen.contains(start) {
                return Err(AutomatonError::UnknownState(start.clone()));
            }
        }
        for accept in &accept_states {
            if !seen.contains(accept) {
                return Err(AutomatonError::UnknownState(accept.clone()));
            }
        }

        Ok(Self {
            states,
            alphabet,
            transitions: normalized,
            start_state,
            accept_states,
        })
    }

    /// Returns a builder for assembling an automaton state by state and
    /// transition by transition.
    pub fn builder() -> FsaBuilder {
        FsaBuilder::default()
    }

    /// The state labels, in insertion order.
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// The alphabet, sorted, without ε.
    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    /// All transition entries.
    pub fn transitions(&self) -> &Map<String, Map<char, Vec<String>>> {
        &self.transitions
    }

    /// The targets of the transition from `state` on `symbol`, or `None` if
    /// no such transition is defined.
    pub fn transition(&self, state: &str, symbol: char) -> Option<&Vec<String>> {
        self.transitions.get(state).and_then(|row| row.get(&symbol))
    }

    /// The designated start state, if any.
    pub fn start_state(&self) -> Option<&str> {
        self.start_state.as_deref()
    }

    /// The accepting states.
    pub fn accept_states(&self) -> &[String] {
        &self.accept_states
    }

    /// Whether `state` is an accepting state.
    pub fn is_accept(&self, state: &str) -> bool {
        self.accept_states.iter().any(|s| s == state)
    }

    fn ensure_state(&self, state: &str) -> Result<(), AutomatonError> {
        if self.states.iter().any(|s| s == state) {
            Ok(())
        } else {
            Err(AutomatonError::UnknownState(state.to_string()))
        }
    }

    fn ensure_symbol(&self, symbol: char) -> Result<(), AutomatonError> {
        if symbol == EPSILON || self.alphabet.contains(&symbol) {
            Ok(())
        } else {
            Err(AutomatonError::UnknownSymbol(symbol))
        }
    }

    /// Inserts (or replaces) the transition entry from `from` on `symbol`.
    /// Both endpoints must be existing states and the symbol must be in
    /// `alphabet ∪ {ε}`. Targets are sorted and deduplicated; an empty target
    /// list removes the entry instead of leaving an empty one behind.
    pub fn insert_transition(
        &mut self,
        from: &str,
        symbol: char,
        targets: Vec<String>,
    ) -> Result<(), AutomatonError> {
        self.ensure_state(from)?;
        self.ensure_symbol(symbol)?;
        for target in &targets {
            self.ensure_state(target)?;
        }
        let targets: Vec<String> = targets.into_iter().sorted().dedup().collect();
        let row = self.transitions.entry(from.to_string()).or_default();
        if targets.is_empty() {
            row.remove(&symbol);
        } else {
            row.insert(symbol, targets);
        }
        Ok(())
    }

    /// Computes the ε-closure of `state`: the set containing `state` itself
    /// plus every state reachable by following zero or more ε-transitions.
    /// The result is sorted. Traversal is breadth-first over the ε-subgraph
    /// with a visited set, and bails out with
    /// [`AutomatonError::InfiniteLoop`] if it somehow exceeds
    /// [`CLOSURE_ITERATION_LIMIT`] iterations.
    pub fn epsilon_closure(&self, state: &str) -> Result<Vec<String>, AutomatonError> {
        self.ensure_state(state)?;

        let mut visited: Set<String> = Set::default();
        visited.insert(state.to_string());
        let mut queue: VecDeque<String> = VecDeque::from([state.to_string()]);
        self.chase_epsilon(&mut visited, &mut queue)?;

        Ok(visited.into_iter().sorted().collect())
    }

    /// Computes the set of states reachable from `state` on `symbol`: the
    /// ε-closure of the union of the direct `symbol` transitions. If no
    /// direct transition is defined the result is the singleton sink `Ø` for
    /// alphabet symbols and the empty set for ε. This distinction is what
    /// routes undefined transitions to the absorbing sink state during
    /// subset construction.
    pub fn reachable_states(&self, state: &str, symbol: char) -> Result<Vec<String>, AutomatonError> {
        self.ensure_state(state)?;
        self.ensure_symbol(symbol)?;

        let Some(direct) = self.transition(state, symbol) else {
            return Ok(if symbol == EPSILON {
                vec![]
            } else {
                vec![EMPTY_SET.to_string()]
            });
        };

        let mut visited: Set<String> = Set::default();
        let mut queue: VecDeque<String> = VecDeque::new();
        for target in direct {
            if visited.insert(target.clone()) {
                queue.push_back(target.clone());
            }
        }
        self.chase_epsilon(&mut visited, &mut queue)?;

        Ok(visited.into_iter().sorted().collect())
    }

    /// Follows ε-transitions from every queued state, growing `visited` until
    /// a fixpoint is reached.
    fn chase_epsilon(
        &self,
        visited: &mut Set<String>,
        queue: &mut VecDeque<String>,
    ) -> Result<(), AutomatonError> {
        let mut iterations = 0;
        while let Some(state) = queue.pop_front() {
            iterations += 1;
            if iterations > CLOSURE_ITERATION_LIMIT {
                return Err(AutomatonError::InfiniteLoop(CLOSURE_ITERATION_LIMIT));
            }
            let Some(targets) = self.transition(&state, EPSILON) else {
                continue;
            };
            for target in targets {
                if visited.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }
        Ok(())
    }

    /// Enumerates all `2^n` subsets of the states. Each subset is sorted, the
    /// empty subset is represented by the sink `["Ø"]` and always comes
    /// first; the remaining subsets follow in ascending bit-mask order with
    /// bit `j` standing for `states[j]`. Automata whose subset masks do not
    /// fit in a `usize` are refused with
    /// [`AutomatonError::TooManyStates`].
    pub fn powerset_of_states(&self) -> Result<Vec<Vec<String>>, AutomatonError> {
        if self.states.len() >= usize::BITS as usize {
            return Err(AutomatonError::TooManyStates(self.states.len()));
        }

        let mut result = Vec::with_capacity(1 << self.states.len());
        result.push(vec![EMPTY_SET.to_string()]);

        for mask in 1..(1usize << self.states.len()) {
            let mut subset: Vec<String> = (0..self.states.len())
                .filter(|j| mask & (1 << j) != 0)
                .map(|j| self.states[j].clone())
                .collect();
            subset.sort();
            result.push(subset);
        }

        Ok(result)
    }

    /// Removes a state: it disappears from `states` and `accept_states`, the
    /// start state is cleared if it matched, its outgoing transition entries
    /// are dropped, and the label is stripped from every other state's
    /// targets. Target lists that become empty are removed entirely rather
    /// than left as empty entries.
    pub fn remove_state(&mut self, label: &str) -> Result<RemovedTransitions, AutomatonError> {
        self.ensure_state(label)?;

        self.states.retain(|s| s != label);
        self.accept_states.retain(|s| s != label);
        if self.start_state.as_deref() == Some(label) {
            self.start_state = None;
        }
        let outgoing = self.transitions.remove(label).unwrap_or_default();

        let mut incoming = Vec::new();
        let remaining = self.states.clone();
        let mut symbols = self.alphabet.clone();
        symbols.push(EPSILON);
        for state in &remaining {
            let Some(row) = self.transitions.get_mut(state) else {
                continue;
            };
            for &symbol in &symbols {
                let Some(targets) = row.get_mut(&symbol) else {
                    continue;
                };
                if targets.iter().any(|t| t == label) {
                    targets.retain(|t| t != label);
                    incoming.push((state.clone(), symbol));
                    if targets.is_empty() {
                        row.remove(&symbol);
                    }
                }
            }
        }

        Ok(RemovedTransitions { outgoing, incoming })
    }
}

/// Helper for assembling an [`Fsa`] piece by piece. Validation happens once,
/// in [`FsaBuilder::build`].
///
/// # Example
///
/// ```
/// use nfa2dfa::prelude::*;
///
/// let nfa = Fsa::builder()
///     .states(["1", "2", "3"])
///     .symbols(['a', 'b'])
///     .transition("1", 'b', ["2"])
///     .transition("1", EPSILON, ["3"])
///     .transition("2", 'a', ["2", "3"])
///     .transition("2", 'b', ["3"])
///     .transition("3", 'a', ["1"])
///     .start("1")
///     .accept(["1"])
///     .build()
///     .unwrap();
/// assert_eq!(nfa.states().len(), 3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct FsaBuilder {
    states: Vec<String>,
    symbols: Vec<char>,
    transitions: Vec<(String, char, Vec<String>)>,
    start: Option<String>,
    accept: Vec<String>,
}

impl FsaBuilder {
    /// Adds the given states, in order.
    pub fn states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states.extend(states.into_iter().map(Into::into));
        self
    }

    /// Adds the given alphabet symbols.
    pub fn symbols<I: IntoIterator<Item = char>>(mut self, symbols: I) -> Self {
        self.symbols.extend(symbols);
        self
    }

    /// Adds a transition from `from` on `symbol` to the given targets. The
    /// symbol may be [`EPSILON`].
    pub fn transition<S, I, T>(mut self, from: S, symbol: char, to: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.transitions
            .push((from.into(), symbol, to.into_iter().map(Into::into).collect()));
        self
    }

    /// Designates the start state.
    pub fn start<S: Into<String>>(mut self, state: S) -> Self {
        self.start = Some(state.into());
        self
    }

    /// Marks the given states as accepting.
    pub fn accept<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accept.extend(states.into_iter().map(Into::into));
        self
    }

    /// Assembles and validates the automaton.
    pub fn build(self) -> Result<Fsa, AutomatonError> {
        let mut transitions: Map<String, Map<char, Vec<String>>> = Map::default();
        for (from, symbol, targets) in self.transitions {
            transitions
                .entry(from)
                .or_default()
                .entry(symbol)
                .or_default()
                .extend(targets);
        }
        Fsa::new(self.states, self.symbols, transitions, self.start, self.accept)
    }
}

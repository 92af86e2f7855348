//! Redundant-state detection and merging for a fully built DFA.
//!
//! Two states are considered equivalent when they agree on acceptance and
//! every transition of either state stays within the pair. This pairwise
//! criterion is deliberately narrower than textbook Myhill–Nerode partition
//! refinement: two states that transition to some *other* common class are
//! not merged. The conversion engine reruns the detection from scratch after
//! every merge, since a merge can expose new equivalent pairs.

use tracing::trace;

use crate::fsa::{target_label, AutomatonError, Fsa};
use crate::math::Map;

/// What a merge did to the automaton, captured for the step descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Label of the newly created merged state, `{s1}+{s2}`.
    pub merged: String,
    /// The outgoing transition entries of the two removed states, in pair
    /// order.
    pub removed: [Map<char, Vec<String>>; 2],
    /// The (state, symbol) locations whose targets were redirected to the
    /// merged state, in state-order then symbol-order.
    pub retargeted: Vec<(String, char)>,
}

/// Finds the first pair of equivalent states in state order, scanning pairs
/// `(states[i], states[j])` with `i < j`.
pub fn find_equivalent_pair(dfa: &Fsa) -> Option<(String, String)> {
    let states = dfa.states();
    for i in 0..states.len() {
        for j in (i + 1)..states.len() {
            if equivalent(dfa, &states[i], &states[j]) {
                return Some((states[i].clone(), states[j].clone()));
            }
        }
    }
    None
}

/// Whether `s1` and `s2` agree on acceptance and both loop back into the
/// pair on every alphabet symbol.
fn equivalent(dfa: &Fsa, s1: &str, s2: &str) -> bool {
    if dfa.is_accept(s1) != dfa.is_accept(s2) {
        return false;
    }
    dfa.alphabet()
        .iter()
        .all(|&symbol| stays_in_pair(dfa, s1, symbol, s1, s2) && stays_in_pair(dfa, s2, symbol, s1, s2))
}

fn stays_in_pair(dfa: &Fsa, from: &str, symbol: char, s1: &str, s2: &str) -> bool {
    match dfa.transition(from, symbol) {
        Some(targets) => {
            let label = target_label(targets);
            label == s1 || label == s2
        }
        None => false,
    }
}

/// Merges `s1` and `s2` into a single state labeled `{s1}+{s2}`. The merged
/// state inherits acceptance and start status if either constituent had it,
/// loops back to itself on every symbol, and receives every external
/// incoming transition that targeted either constituent. `s1` and `s2` are
/// removed; the merged state is appended at the end of the state order.
pub fn merge_pair(dfa: &mut Fsa, s1: &str, s2: &str) -> Result<MergeOutcome, AutomatonError> {
    for state in [s1, s2] {
        if !dfa.states.iter().any(|s| s == state) {
            return Err(AutomatonError::UnknownState(state.to_string()));
        }
    }

    let merged = format!("{s1}+{s2}");
    trace!("merge states {s1} and {s2} into {merged}");

    let removed = [
        dfa.transitions.get(s1).cloned().unwrap_or_default(),
        dfa.transitions.get(s2).cloned().unwrap_or_default(),
    ];
    let was_accept = dfa.is_accept(s1) || dfa.is_accept(s2);
    let was_start = matches!(dfa.start_state(), Some(s) if s == s1 || s == s2);

    // redirect external incoming transitions before the pair disappears
    let mut retargeted = Vec::new();
    let alphabet = dfa.alphabet.clone();
    let others: Vec<String> = dfa
        .states
        .iter()
        .filter(|s| *s != s1 && *s != s2)
        .cloned()
        .collect();
    for state in &others {
        let Some(row) = dfa.transitions.get_mut(state) else {
            continue;
        };
        for &symbol in &alphabet {
            let Some(targets) = row.get_mut(&symbol) else {
                continue;
            };
            let label = target_label(targets);
            if label == s1 || label == s2 {
                *targets = vec![merged.clone()];
                retargeted.push((state.clone(), symbol));
            }
        }
    }

    dfa.remove_state(s1)?;
    dfa.remove_state(s2)?;

    dfa.states.push(merged.clone());
    if was_accept {
        dfa.accept_states.push(merged.clone());
    }
    if was_start {
        dfa.start_state = Some(merged.clone());
    }
    let mut row: Map<char, Vec<String>> = Map::default();
    for &symbol in &alphabet {
        row.insert(symbol, vec![merged.clone()]);
    }
    dfa.transitions.insert(merged.clone(), row);

    Ok(MergeOutcome {
        merged,
        removed,
        retargeted,
    })
}

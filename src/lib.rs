//! Incremental subset construction for finite automata.
//!
//! The crate converts a nondeterministic finite automaton (NFA, with
//! ε-transitions) into an equivalent deterministic finite automaton (DFA),
//! exposing every algorithmic step as a discrete, replayable, undoable event.
//! A conversion is driven through a [`conversion::ConversionEngine`], which
//! advances exactly one unit of work per `step_forward` call: first the DFA
//! skeleton is built from the powerset of the NFA states, then one
//! (state × symbol) transition is derived per step, then unreachable states
//! are pruned one per step, and finally equivalent state pairs are merged one
//! per step. Each step appends to a [`history::StepHistory`] so that
//! `step_backward` can rewind the conversion to any earlier point, including
//! all the way back to the uninitialized engine.
//!
//! The data model is a plain [`fsa::Fsa`]: states are string labels in
//! significant insertion order, transitions map (state, symbol) pairs to sets
//! of destination labels, and composite DFA states are canonically labeled by
//! sorting their members and joining them with commas. The empty subset is
//! the explicit, absorbing sink state `Ø`. An `Fsa` serializes to a JSON
//! shape that round-trips losslessly, which is the only interchange format
//! the engine produces.
//!
//! The engine is single-threaded and cooperative: it holds no timers or
//! background tasks, suspension is entirely caller-driven, and cancellation
//! is simply the caller not calling again. Errors are surfaced as typed
//! [`fsa::AutomatonError`] values; a driver that receives an error from
//! `step_forward` or `complete` must treat the in-progress DFA as invalid
//! and discard the engine.
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The prelude is supposed to make using this package easier. Including
/// everything, i.e. `use nfa2dfa::prelude::*;` should be enough to use the
/// package.
pub mod prelude {
    pub use super::{
        conversion::{ConversionEngine, ConversionStep, Phase},
        fsa::{
            composite_label, target_label, AutomatonError, Fsa, FsaBuilder, RemovedTransitions,
            CLOSURE_ITERATION_LIMIT, EMPTY_SET, EPSILON,
        },
        history::{HistoryEntry, StepHistory},
        math,
        minimization::{find_equivalent_pair, merge_pair, MergeOutcome},
    };
}

/// This module contains type aliases for the hash-based collections used
/// throughout the crate.
pub mod math;

/// The finite automaton data model and its pure queries: ε-closure,
/// reachable states, powerset enumeration and state removal.
pub mod fsa;

/// The append-only log of performed steps that enables exact backward replay.
pub mod history;

pub mod conversion;

pub mod minimization;

pub use conversion::ConversionEngine;
pub use fsa::Fsa;

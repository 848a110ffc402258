//! Epoch-based memory reclamation for FASTER
//!
//! This module implements the LightEpoch mechanism for safe memory reclamation
//! in lock-free data structures. It provides a lightweight epoch protection
//! framework that allows threads to safely access shared data, a drain list of
//! deferred actions, and the phase barrier used by checkpointing.

mod action;
mod light_epoch;
mod phase;

pub use light_epoch::{
    EpochConfig, EpochGuard, LightEpoch, ReentrantEpochGuard, INVALID_SLOT, UNPROTECTED,
};
pub use phase::Phase;

pub(crate) use light_epoch::verify_layout;

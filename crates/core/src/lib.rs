//! Domain types and pure helpers for the prompt relay.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! prompt sources, the action surface, the scheduler, and the worker
//! binary alike.

pub mod error;
pub mod polling;
pub mod prompt;
pub mod seed;
pub mod types;
pub mod worker_limit;

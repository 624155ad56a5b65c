//! Library half of the `relay-worker` binary: environment configuration
//! and the operator console. Kept out of `main.rs` so both can be tested.

pub mod config;
pub mod console;

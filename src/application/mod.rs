//! Application layer - Use cases that coordinate the registry, strategies and
//! the deletion executor.
//!
//! This layer owns the run flow and stays free of CLI and environment
//! concerns; the command layer builds its inputs and publishes its output.

mod cleanup;

pub use cleanup::{CleanupOptions, CleanupOutcome, CleanupUseCase};

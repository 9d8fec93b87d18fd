//! Variable-order Markov chain generation library.
//!
//! This crate builds a statistical model over an arbitrary sequence of
//! symbols and generates new sequences from it, including:
//! - States of variable length (runs of 1 or more symbols)
//! - Weighted random walks with pluggable seeding strategies
//! - An injectable randomness source for reproducible generation
//! - A versioned, optionally compressed model file format
//!
//! Only the high-level API is exposed publicly. Low-level components
//! are kept internal to ensure consistency and prevent misuse.

/// Core model types and generation logic.
///
/// This module exposes the high-level model interface while keeping
/// internal registry and codec representations private.
pub mod model;

/// Error taxonomy shared by every fallible operation.
pub mod error;

/// Settings file lookup (default model directory, path placeholders).
pub mod settings;

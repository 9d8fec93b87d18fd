//! Top-level module for the Markov chain engine.
//!
//! This module provides a variable-order Markov chain system, including:
//! - The user-facing model type (`MarkovModel`)
//! - Seed-selection strategies for generation (`Seed`)
//! - Symbol traits over which models are generic (`Symbol`, `TextSymbol`)
//! - An internal state registry and a versioned persistence codec

/// High-level interface for building models and generating chains.
///
/// Exposes source assignment, index building, chain generation and
/// document save/load.
pub mod markov_model;

/// Seed-selection strategies and the random-walk step logic.
pub mod chain;

/// Marker and capability traits for the symbols a model ranges over.
pub mod symbol;

/// Internal state registry: dense-id records, value lookup and the
/// per-offset position index.
///
/// This module is not exposed publicly.
pub(crate) mod state_index;

/// Internal versioned document codec (JSON, optionally gzip-compressed),
/// including the migration from the historical parallel-array format.
///
/// This module is not exposed publicly.
pub(crate) mod persist;

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Beweiswerk.
//
// Per-unit parse failures are deliberately NOT represented here: a unit that
// cannot be normalized is reported as `types::ParseFailure` data alongside
// the successfully parsed messages, and never aborts an ingestion stream.

use thiserror::Error;

/// Top-level error type for all Beweiswerk operations.
#[derive(Debug, Error)]
pub enum BeweisError {
    // -- Custody chain errors --
    #[error("chain for party {party}: position {position} is already linked; append-only chains cannot be re-linked")]
    ChainMutation { party: String, position: u64 },

    #[error("chain for party {party}: genesis value does not match the configured constant")]
    GenesisMismatch { party: String },

    #[error("hash algorithm mismatch: chain was built with {chain}, engine is configured for {configured}")]
    AlgorithmMismatch { chain: String, configured: String },

    #[error("unknown hash algorithm identifier: {0}")]
    UnknownAlgorithm(String),

    // -- Evidence assembly errors --
    #[error("unknown party tag: {0}")]
    UnknownParty(String),

    #[error("evidence {0} does not exist in this chain")]
    EvidenceNotFound(String),

    #[error("evidence {0} is a tombstone and cannot be tombstoned again")]
    AlreadyTombstoned(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("stored record for party {party}, sequence {sequence} is corrupt: {detail}")]
    CorruptRecord {
        party: String,
        sequence: u64,
        detail: String,
    },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BeweisError>;

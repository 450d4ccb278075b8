// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// beweiswerk-evidence — Evidence numbering, custody chains, and verification.
//
// Turns normalized messages into numbered court exhibits (갑 제N호증 /
// 을 제N호증), links them into per-party append-only hash chains, persists
// the chains in an append-only SQLite layout, and re-verifies stored chains
// against original bytes with exact divergence reporting.

pub mod assembler;
pub mod chain;
pub mod engine;
pub mod store;
pub mod verify;

// Re-export the primary entry points so callers can use
// `beweiswerk_evidence::EvidenceEngine` etc.
pub use assembler::SequenceCounter;
pub use chain::{CustodyChain, PendingEvidence};
pub use engine::EvidenceEngine;
pub use store::EvidenceStore;
pub use verify::{ByteSource, verify_chain};

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// beweiswerk-mail — Mailbox ingestion for the Beweiswerk evidence engine.
//
// Provides the streaming mbox/eml archive reader (bounded memory, resumable
// by byte offset), the MIME message normalizer (charset decoding, multipart
// reconciliation, attachment enumeration), and the canonical content hasher
// whose digests are stable across machines and decoder implementations.

pub mod archive;
pub mod hash;
pub mod mbox;
pub mod normalize;

// Re-export the primary entry points so callers can use
// `beweiswerk_mail::ArchiveReader` etc.
pub use archive::{ArchiveFormat, ArchiveReader, ArchiveStats, detect_format};
pub use mbox::MboxReader;
pub use normalize::normalize;

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Beweiswerk evidence engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Litigation party an evidence chain belongs to.
///
/// Korean civil procedure numbers exhibits per party: 갑 (claimant) and
/// 을 (respondent). Each party owns an independent custody chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    /// 갑 — claimant's exhibits.
    #[serde(rename = "갑")]
    Gap,
    /// 을 — respondent's exhibits.
    #[serde(rename = "을")]
    Eul,
}

impl Party {
    /// Korean exhibit label as it appears on court documents.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Gap => "갑",
            Self::Eul => "을",
        }
    }

    /// ASCII slug used as a storage key.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Gap => "gap",
            Self::Eul => "eul",
        }
    }

    /// Resolve a storage tag back to a party.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "gap" => Some(Self::Gap),
            "eul" => Some(Self::Eul),
            _ => None,
        }
    }

    /// Both parties, in exhibit-label order.
    pub fn all() -> [Party; 2] {
        [Self::Gap, Self::Eul]
    }
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Party {
    type Err = crate::error::BeweisError;

    /// Accepts both the storage tag ("gap"/"eul") and the Korean label
    /// ("갑"/"을") — the forms the consumer layer passes around.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gap" | "갑" => Ok(Self::Gap),
            "eul" | "을" => Ok(Self::Eul),
            other => Err(crate::error::BeweisError::UnknownParty(other.to_owned())),
        }
    }
}

/// Stable message identifier derived from message content.
///
/// Derived from (sender, sent_at, subject, body digest), so re-parsing the
/// same raw bytes always yields the same id regardless of which machine or
/// decoder produced it. Not the RFC 5322 `Message-ID` header — that value is
/// kept separately on [`NormalizedMessage`] because mail clients forge,
/// duplicate, or omit it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Court exhibit number, e.g. "갑 제3호증".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceNumber {
    pub party: Party,
    pub sequence: u64,
}

impl EvidenceNumber {
    pub fn new(party: Party, sequence: u64) -> Self {
        Self { party, sequence }
    }
}

impl std::fmt::Display for EvidenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} 제{}호증", self.party, self.sequence)
    }
}

/// One raw mail unit cut out of an archive.
///
/// Owned transiently by the archive reader; destroyed once normalized. The
/// offset points at the unit's separator line (for mbox) or byte 0 (for
/// eml), which is also the offset ingestion can be resumed from.
#[derive(Debug, Clone)]
pub struct RawMailUnit {
    pub bytes: Vec<u8>,
    pub offset: u64,
}

impl RawMailUnit {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Metadata for one attachment of a normalized message.
///
/// Duplicate filenames within one message are legal (mail clients produce
/// them); `index` is the stable disambiguator. The filename itself is never
/// rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub filename: String,
    /// Zero-based position within the message's attachment list.
    pub index: u32,
    /// Decoded payload length in bytes.
    pub length: u64,
    /// Hex digest of the exact decoded payload bytes.
    pub content_hash: String,
    pub mime_type: String,
}

/// A mail message in canonical form, independent of source-client quirks.
///
/// Immutable after creation. `content_hash` covers the semantic fields only
/// (sender, recipients, sent_at, subject, bodies, attachment digests) —
/// never MIME framing, boundary markers, or transfer encodings, so that an
/// independent re-parse of the same source bytes reproduces it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub message_id: MessageId,
    pub subject: String,
    pub sender: String,
    /// Recipient addresses, To before Cc, source order preserved.
    pub recipients: Vec<String>,
    /// Timezone-normalized to UTC. `None` when the Date header was missing
    /// or unparsable; such messages still hash and can become evidence but
    /// are excluded from timeline ordering by downstream consumers.
    pub sent_at: Option<DateTime<Utc>>,
    pub timestamp_unreliable: bool,
    pub body_text: String,
    pub body_html: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    /// Hex digest of the canonical serialization of the fields above.
    pub content_hash: String,
    /// Raw `Message-ID` header, if the message carried one.
    pub header_message_id: Option<String>,
    /// Threading metadata for the external timeline collaborator.
    /// Not part of the content hash.
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    /// Byte offset of the unit within its source archive.
    pub source_offset: u64,
}

impl NormalizedMessage {
    /// Attachment digests in attachment order, as referenced by evidence
    /// records and chain hashes.
    pub fn attachment_hashes(&self) -> Vec<String> {
        self.attachments
            .iter()
            .map(|a| a.content_hash.clone())
            .collect()
    }
}

/// Why a single raw unit failed normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseFailureKind {
    /// The unit's bytes are not a recognizable mail message.
    Syntax,
    /// The underlying source failed while the unit was being read.
    /// Terminates the stream; `Syntax` failures do not.
    Io,
}

/// One unit that could not be normalized.
///
/// Reported alongside successfully parsed messages; never fatal to the
/// stream (skip-and-continue).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("unit at offset {offset} ({length} bytes) could not be parsed: {detail}")]
pub struct ParseFailure {
    pub offset: u64,
    pub length: u64,
    pub kind: ParseFailureKind,
    pub detail: String,
}

/// One link of a party's custody chain.
///
/// Created once, never mutated, never deleted. `chain_hash` is a pure
/// function of (content_hash, attachment_hashes, previous chain hash,
/// evidence_number, created_at) and is only ever computed by the chain
/// builder — it cannot be set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub evidence_number: EvidenceNumber,
    pub message_id: MessageId,
    pub content_hash: String,
    /// Mirrors the message's attachment order.
    pub attachment_hashes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub chain_hash: String,
    /// Set when this record logically deletes an earlier one. Tombstones
    /// are ordinary chain links; nothing is ever physically removed.
    pub tombstone_of: Option<EvidenceNumber>,
}

impl EvidenceRecord {
    pub fn is_tombstone(&self) -> bool {
        self.tombstone_of.is_some()
    }
}

/// Per-record outcome of a verification walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Content and chain linkage both recomputed to the stored values.
    Verified,
    /// Recomputed hash diverged from the stored value at this record.
    Tampered,
    /// Downstream of a tampered record; not independently re-checked.
    Unreachable,
    /// Original bytes unavailable; linkage checked on stored values only.
    Unverifiable,
}

/// Which comparison diverged first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DivergenceKind {
    /// Recomputed content hash differs from the stored content hash.
    ContentMismatch,
    /// Recomputed chain hash differs from the stored chain hash.
    ChainMismatch,
}

/// Audit detail for one record in a [`VerificationReport`].
///
/// Both the expected (stored) and recomputed values are reported so the
/// divergence can be cited exactly. Recomputed values are `None` when the
/// record was not reached or its bytes were unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCheck {
    pub evidence_number: EvidenceNumber,
    pub status: RecordStatus,
    pub expected_content_hash: String,
    pub recomputed_content_hash: Option<String>,
    pub expected_chain_hash: String,
    pub recomputed_chain_hash: Option<String>,
}

/// Result of verifying one party's chain against original bytes.
///
/// Transient output of the verifier; persistence and rendering (the
/// downloadable court certificate) belong to external collaborators, which
/// is why every field serializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub party: Party,
    /// Identifier of the hash algorithm the chain records.
    pub algorithm: String,
    /// True only when every record in the snapshot is `Verified`.
    pub verified: bool,
    /// Number of records actually examined (divergence stops the walk).
    pub checked_count: usize,
    /// Chain length captured when verification started. Records appended
    /// afterwards are not covered by this report.
    pub snapshot_len: usize,
    pub first_divergence_index: Option<usize>,
    pub divergence_kind: Option<DivergenceKind>,
    pub records: Vec<RecordCheck>,
    pub verified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_number_formats_korean_label() {
        let number = EvidenceNumber::new(Party::Gap, 3);
        assert_eq!(number.to_string(), "갑 제3호증");

        let number = EvidenceNumber::new(Party::Eul, 12);
        assert_eq!(number.to_string(), "을 제12호증");
    }

    #[test]
    fn party_tag_round_trip() {
        for party in Party::all() {
            assert_eq!(Party::from_tag(party.tag()), Some(party));
        }
        assert_eq!(Party::from_tag("byeong"), None);
    }

    #[test]
    fn party_parses_tag_and_label() {
        assert_eq!("gap".parse::<Party>().unwrap(), Party::Gap);
        assert_eq!("을".parse::<Party>().unwrap(), Party::Eul);
        assert!(matches!(
            "병".parse::<Party>(),
            Err(crate::error::BeweisError::UnknownParty(_))
        ));
    }

    #[test]
    fn parse_failure_displays_offset() {
        let failure = ParseFailure {
            offset: 1024,
            length: 80,
            kind: ParseFailureKind::Syntax,
            detail: "data before first separator".into(),
        };
        let rendered = failure.to_string();
        assert!(rendered.contains("1024"));
        assert!(rendered.contains("data before first separator"));
    }
}

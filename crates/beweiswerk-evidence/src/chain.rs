// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Custody chain — append-only, tamper-evident linkage of evidence records.
//
// Each record's chain hash binds its content hash, attachment hashes,
// evidence number, creation time, and the previous record's chain hash. The
// first record links against a fixed, published genesis constant, so two
// independent builds over the same ordered inputs produce byte-identical
// chain hashes and can cross-verify without shared state.

use chrono::{DateTime, SecondsFormat, Utc};

use beweiswerk_core::error::{BeweisError, Result};
use beweiswerk_core::{EvidenceNumber, EvidenceRecord, HashAlgorithm, MessageId, Party};
use beweiswerk_mail::hash::FieldHasher;

/// Domain tag for chain-link digests.
const CHAIN_DOMAIN: &str = "beweiswerk.chain.v1";

/// Domain tag for tombstone content digests.
const TOMBSTONE_DOMAIN: &str = "beweiswerk.tombstone.v1";

/// Chain hash of one link.
///
/// Pure function of its inputs; this is the only place chain hashes are
/// computed, so a record's chain hash can never be set independently.
pub fn chain_hash(
    algorithm: HashAlgorithm,
    content_hash: &str,
    attachment_hashes: &[String],
    previous: &str,
    evidence_number: EvidenceNumber,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = FieldHasher::new(algorithm, CHAIN_DOMAIN);
    hasher.field("content_hash", content_hash.as_bytes());
    hasher.field(
        "attachment_count",
        &(attachment_hashes.len() as u64).to_le_bytes(),
    );
    for attachment_hash in attachment_hashes {
        hasher.field("attachment", attachment_hash.as_bytes());
    }
    hasher.field("previous", previous.as_bytes());
    hasher.field(
        "evidence_number",
        evidence_number.to_string().as_bytes(),
    );
    hasher.field(
        "created_at",
        created_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .as_bytes(),
    );
    hasher.finish()
}

/// Content hash of a tombstone record.
///
/// Tombstones carry no message content; their digest covers the revoked
/// evidence number, so the revocation itself is tamper-evident and can be
/// recomputed without any byte source.
pub fn tombstone_content_hash(algorithm: HashAlgorithm, revoked: EvidenceNumber) -> String {
    let mut hasher = FieldHasher::new(algorithm, TOMBSTONE_DOMAIN);
    hasher.field("revokes", revoked.to_string().as_bytes());
    hasher.finish()
}

/// An evidence record assembled but not yet linked into a chain.
///
/// Everything except the chain hash; only [`CustodyChain`] can turn this
/// into an [`EvidenceRecord`].
#[derive(Debug, Clone)]
pub struct PendingEvidence {
    pub evidence_number: EvidenceNumber,
    pub message_id: MessageId,
    pub content_hash: String,
    pub attachment_hashes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub tombstone_of: Option<EvidenceNumber>,
}

/// One party's chain of evidence records.
///
/// Append-only: existing links are never reordered or mutated, and any
/// attempt to write a position that already has a successor fails with
/// `ChainMutation`. Logical deletion appends a tombstone; nothing is
/// removed.
#[derive(Debug)]
pub struct CustodyChain {
    party: Party,
    algorithm: HashAlgorithm,
    genesis: String,
    records: Vec<EvidenceRecord>,
}

impl CustodyChain {
    /// Empty chain for `party`, linking its first record to `genesis`.
    pub fn new(party: Party, algorithm: HashAlgorithm, genesis: &str) -> Self {
        Self {
            party,
            algorithm,
            genesis: genesis.to_owned(),
            records: Vec::new(),
        }
    }

    /// Rebuild a chain from records loaded out of the store.
    ///
    /// Validates ownership and ordering (hash validity is the verifier's
    /// job, not an open-time gate — a tampered chain must still load so it
    /// can be reported).
    pub fn from_records(
        party: Party,
        algorithm: HashAlgorithm,
        genesis: &str,
        records: Vec<EvidenceRecord>,
    ) -> Result<Self> {
        let mut last_sequence = 0u64;
        for record in &records {
            if record.evidence_number.party != party {
                return Err(BeweisError::CorruptRecord {
                    party: party.tag().to_owned(),
                    sequence: record.evidence_number.sequence,
                    detail: "record belongs to a different party's chain".to_owned(),
                });
            }
            if record.evidence_number.sequence <= last_sequence {
                return Err(BeweisError::CorruptRecord {
                    party: party.tag().to_owned(),
                    sequence: record.evidence_number.sequence,
                    detail: "sequence numbers are not strictly increasing".to_owned(),
                });
            }
            last_sequence = record.evidence_number.sequence;
        }
        Ok(Self {
            party,
            algorithm,
            genesis: genesis.to_owned(),
            records,
        })
    }

    pub fn party(&self) -> Party {
        self.party
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    /// Chain hash the next link will be computed against.
    pub fn tip_hash(&self) -> &str {
        self.records
            .last()
            .map(|record| record.chain_hash.as_str())
            .unwrap_or(&self.genesis)
    }

    /// Compute the sealed record that appending `pending` would produce,
    /// without mutating the chain. Callers persist the sealed record first
    /// and then commit it with [`CustodyChain::extend_sealed`].
    pub fn seal(&self, pending: PendingEvidence) -> Result<EvidenceRecord> {
        self.check_extends_tail(pending.evidence_number)?;
        let chain_hash = chain_hash(
            self.algorithm,
            &pending.content_hash,
            &pending.attachment_hashes,
            self.tip_hash(),
            pending.evidence_number,
            pending.created_at,
        );
        Ok(EvidenceRecord {
            evidence_number: pending.evidence_number,
            message_id: pending.message_id,
            content_hash: pending.content_hash,
            attachment_hashes: pending.attachment_hashes,
            created_at: pending.created_at,
            chain_hash,
            tombstone_of: pending.tombstone_of,
        })
    }

    /// Commit a record previously produced by [`CustodyChain::seal`].
    ///
    /// Refuses a record that does not extend the current tail: the chain
    /// hash must recompute against the tip, and the sequence must advance.
    pub fn extend_sealed(&mut self, record: EvidenceRecord) -> Result<()> {
        self.check_extends_tail(record.evidence_number)?;
        let expected = chain_hash(
            self.algorithm,
            &record.content_hash,
            &record.attachment_hashes,
            self.tip_hash(),
            record.evidence_number,
            record.created_at,
        );
        if expected != record.chain_hash {
            return Err(BeweisError::ChainMutation {
                party: self.party.tag().to_owned(),
                position: record.evidence_number.sequence,
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Seal and commit in one step.
    pub fn append(&mut self, pending: PendingEvidence) -> Result<&EvidenceRecord> {
        let record = self.seal(pending)?;
        self.extend_sealed(record)?;
        Ok(self.records.last().expect("chain cannot be empty after append"))
    }

    /// A link may only be written past the current tail. Anything at or
    /// before the tail already has (or is) a successor.
    fn check_extends_tail(&self, number: EvidenceNumber) -> Result<()> {
        if number.party != self.party {
            return Err(BeweisError::CorruptRecord {
                party: self.party.tag().to_owned(),
                sequence: number.sequence,
                detail: "record belongs to a different party's chain".to_owned(),
            });
        }
        let last = self
            .records
            .last()
            .map(|record| record.evidence_number.sequence)
            .unwrap_or(0);
        if number.sequence <= last {
            return Err(BeweisError::ChainMutation {
                party: self.party.tag().to_owned(),
                position: number.sequence,
            });
        }
        Ok(())
    }
}

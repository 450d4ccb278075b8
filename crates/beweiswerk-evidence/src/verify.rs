// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Chain verification — recompute every hash from genesis and report the
// first divergence with exact expected/recomputed values.
//
// Failure semantics, in order of precedence per record:
//   - divergence (content or chain linkage) marks the record Tampered, every
//     later record Unreachable, and stops the walk — one tamper point
//     invalidates everything downstream;
//   - unavailable original bytes mark the record Unverifiable, but its
//     stored chain hash still links its neighbours, so the walk continues;
//   - otherwise the record is Verified.
// Nothing is ever repaired here: verification is read-only and the report
// carries both hash values at the divergence for the audit trail.

use chrono::Utc;
use tracing::{debug, instrument, warn};

use beweiswerk_core::{
    DivergenceKind, EvidenceRecord, HashAlgorithm, MessageId, Party, RawMailUnit, RecordCheck,
    RecordStatus, VerificationReport,
};
use beweiswerk_mail::normalize;

use crate::chain::{chain_hash, tombstone_content_hash};

/// Resolver for original message bytes, provided by the storage
/// collaborator. Returns `None` when the bytes are no longer available;
/// such records degrade to `Unverifiable` rather than `Tampered`.
pub trait ByteSource {
    fn raw_message(&self, message_id: &MessageId) -> Option<Vec<u8>>;
}

/// Outcome of recomputing one record's content hash.
enum ContentCheck {
    Match(String),
    Mismatch(Option<String>),
    Unavailable,
}

/// Verify a snapshot of one party's chain against original bytes.
///
/// `records` is the snapshot captured at verification start; appends that
/// happen while this runs are simply not covered by the report.
#[instrument(skip_all, fields(party = %party, records = records.len()))]
pub fn verify_chain(
    party: Party,
    algorithm: HashAlgorithm,
    genesis: &str,
    records: &[EvidenceRecord],
    source: &dyn ByteSource,
) -> VerificationReport {
    let mut checks = Vec::with_capacity(records.len());
    let mut previous = genesis;
    let mut first_divergence_index = None;
    let mut divergence_kind = None;
    let mut checked_count = 0usize;

    for (index, record) in records.iter().enumerate() {
        if first_divergence_index.is_some() {
            checks.push(RecordCheck {
                evidence_number: record.evidence_number,
                status: RecordStatus::Unreachable,
                expected_content_hash: record.content_hash.clone(),
                recomputed_content_hash: None,
                expected_chain_hash: record.chain_hash.clone(),
                recomputed_chain_hash: None,
            });
            continue;
        }
        checked_count += 1;

        // Linkage always recomputes from stored values, so an unverifiable
        // record still links its neighbours.
        let recomputed_chain = chain_hash(
            algorithm,
            &record.content_hash,
            &record.attachment_hashes,
            previous,
            record.evidence_number,
            record.created_at,
        );
        let chain_ok = recomputed_chain == record.chain_hash;

        let content = check_content(record, algorithm, source);

        let (status, recomputed_content) = match (&content, chain_ok) {
            (ContentCheck::Mismatch(recomputed), _) => {
                (RecordStatus::Tampered, recomputed.clone())
            }
            (_, false) => {
                let recomputed = match &content {
                    ContentCheck::Match(hash) => Some(hash.clone()),
                    _ => None,
                };
                (RecordStatus::Tampered, recomputed)
            }
            (ContentCheck::Unavailable, true) => (RecordStatus::Unverifiable, None),
            (ContentCheck::Match(hash), true) => {
                (RecordStatus::Verified, Some(hash.clone()))
            }
        };

        if status == RecordStatus::Tampered {
            first_divergence_index = Some(index);
            divergence_kind = Some(if matches!(content, ContentCheck::Mismatch(_)) {
                DivergenceKind::ContentMismatch
            } else {
                DivergenceKind::ChainMismatch
            });
            warn!(
                index,
                evidence_number = %record.evidence_number,
                "chain divergence detected"
            );
        }

        checks.push(RecordCheck {
            evidence_number: record.evidence_number,
            status,
            expected_content_hash: record.content_hash.clone(),
            recomputed_content_hash: recomputed_content,
            expected_chain_hash: record.chain_hash.clone(),
            recomputed_chain_hash: Some(recomputed_chain),
        });

        // Downstream links are checked against the stored hash, not the
        // recomputed one.
        previous = &record.chain_hash;
    }

    let verified = checks
        .iter()
        .all(|check| check.status == RecordStatus::Verified);
    debug!(verified, checked_count, "verification walk complete");

    VerificationReport {
        party,
        algorithm: algorithm.id().to_owned(),
        verified,
        checked_count,
        snapshot_len: records.len(),
        first_divergence_index,
        divergence_kind,
        records: checks,
        verified_at: Utc::now(),
    }
}

/// Recompute a record's content hash from original bytes.
///
/// Tombstones recompute from the revoked number alone. For ordinary records
/// the original bytes are re-normalized through the same pipeline that
/// produced the record; bytes that no longer parse cannot be the original
/// bytes, so they count as a mismatch, not as unavailable.
fn check_content(
    record: &EvidenceRecord,
    algorithm: HashAlgorithm,
    source: &dyn ByteSource,
) -> ContentCheck {
    if let Some(revoked) = record.tombstone_of {
        let recomputed = tombstone_content_hash(algorithm, revoked);
        return if recomputed == record.content_hash {
            ContentCheck::Match(recomputed)
        } else {
            ContentCheck::Mismatch(Some(recomputed))
        };
    }

    let Some(bytes) = source.raw_message(&record.message_id) else {
        return ContentCheck::Unavailable;
    };
    let unit = RawMailUnit { bytes, offset: 0 };
    match normalize(&unit, algorithm) {
        Err(_) => ContentCheck::Mismatch(None),
        Ok(message) => {
            if message.content_hash == record.content_hash
                && message.attachment_hashes() == record.attachment_hashes
            {
                ContentCheck::Match(message.content_hash)
            } else {
                ContentCheck::Mismatch(Some(message.content_hash))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use beweiswerk_core::config::GENESIS_GAP;
    use beweiswerk_core::EvidenceNumber;

    use crate::assembler::{self, SequenceCounter};
    use crate::chain::CustodyChain;

    /// Change a digest's first character to a different hex digit.
    fn flip_first_hex_char(digest: &str) -> String {
        let replacement = if digest.starts_with('0') { '1' } else { '0' };
        format!("{replacement}{}", &digest[1..])
    }

    struct MapSource(HashMap<MessageId, Vec<u8>>);

    impl ByteSource for MapSource {
        fn raw_message(&self, message_id: &MessageId) -> Option<Vec<u8>> {
            self.0.get(message_id).cloned()
        }
    }

    fn raw_message(subject: &str) -> Vec<u8> {
        format!(
            "From: kim@example.com\r\nTo: lee@example.com\r\nDate: Tue, 2 Apr 2024 10:00:00 +0900\r\nSubject: {subject}\r\n\r\nbody of {subject}\r\n"
        )
        .into_bytes()
    }

    /// Build a valid N-record chain plus a byte source resolving each
    /// record's original bytes.
    fn valid_chain(n: usize) -> (CustodyChain, MapSource) {
        let counter = SequenceCounter::new();
        let mut chain = CustodyChain::new(Party::Gap, HashAlgorithm::Sha256, GENESIS_GAP);
        let mut bytes_by_id = HashMap::new();

        for i in 0..n {
            let raw = raw_message(&format!("message {i}"));
            let unit = RawMailUnit {
                bytes: raw.clone(),
                offset: 0,
            };
            let message = normalize(&unit, HashAlgorithm::Sha256).unwrap();
            bytes_by_id.insert(message.message_id.clone(), raw);
            let pending = assembler::assemble(&counter, Party::Gap, &message);
            chain.append(pending).unwrap();
        }
        (chain, MapSource(bytes_by_id))
    }

    #[test]
    fn valid_chain_verifies_end_to_end() {
        let (chain, source) = valid_chain(4);
        let report = verify_chain(
            Party::Gap,
            HashAlgorithm::Sha256,
            GENESIS_GAP,
            chain.records(),
            &source,
        );

        assert!(report.verified);
        assert_eq!(report.checked_count, 4);
        assert_eq!(report.snapshot_len, 4);
        assert_eq!(report.first_divergence_index, None);
        assert!(report
            .records
            .iter()
            .all(|check| check.status == RecordStatus::Verified));
    }

    #[test]
    fn mutated_content_hash_is_tampered_and_downstream_unreachable() {
        let (chain, source) = valid_chain(5);
        let mut records = chain.records().to_vec();
        let k = 2;
        records[k].content_hash = flip_first_hex_char(&records[k].content_hash);

        let report = verify_chain(
            Party::Gap,
            HashAlgorithm::Sha256,
            GENESIS_GAP,
            &records,
            &source,
        );

        assert!(!report.verified);
        assert_eq!(report.first_divergence_index, Some(k));
        assert_eq!(report.checked_count, k + 1);
        for (index, check) in report.records.iter().enumerate() {
            let expected = if index < k {
                RecordStatus::Verified
            } else if index == k {
                RecordStatus::Tampered
            } else {
                RecordStatus::Unreachable
            };
            assert_eq!(check.status, expected, "index {index}");
        }

        // The divergent record reports both hash values for the audit.
        let divergent = &report.records[k];
        assert!(divergent.recomputed_chain_hash.is_some());
        assert_ne!(
            divergent.recomputed_chain_hash.as_deref(),
            Some(divergent.expected_chain_hash.as_str())
        );
    }

    #[test]
    fn swapped_source_bytes_are_a_content_mismatch() {
        let (chain, source) = valid_chain(3);
        let mut bytes_by_id = source.0;
        // Replace record 1's bytes with a different (parseable) message.
        let victim = chain.records()[1].message_id.clone();
        bytes_by_id.insert(victim, raw_message("forged replacement"));

        let report = verify_chain(
            Party::Gap,
            HashAlgorithm::Sha256,
            GENESIS_GAP,
            chain.records(),
            &MapSource(bytes_by_id),
        );

        assert!(!report.verified);
        assert_eq!(report.first_divergence_index, Some(1));
        assert_eq!(report.divergence_kind, Some(DivergenceKind::ContentMismatch));
        assert_eq!(report.records[2].status, RecordStatus::Unreachable);
    }

    #[test]
    fn missing_bytes_degrade_to_unverifiable_without_breaking_downstream() {
        let (chain, source) = valid_chain(4);
        let mut bytes_by_id = source.0;
        bytes_by_id.remove(&chain.records()[1].message_id);

        let report = verify_chain(
            Party::Gap,
            HashAlgorithm::Sha256,
            GENESIS_GAP,
            chain.records(),
            &MapSource(bytes_by_id),
        );

        // No divergence, but the chain cannot be claimed fully verified.
        assert!(!report.verified);
        assert_eq!(report.first_divergence_index, None);
        assert_eq!(report.checked_count, 4);
        assert_eq!(report.records[1].status, RecordStatus::Unverifiable);
        assert_eq!(report.records[2].status, RecordStatus::Verified);
        assert_eq!(report.records[3].status, RecordStatus::Verified);
    }

    #[test]
    fn tombstone_records_verify_without_a_byte_source() {
        let counter = SequenceCounter::new();
        let (mut chain, source) = valid_chain(2);
        counter.restore(Party::Gap, 2);

        let target = chain.records()[0].clone();
        let pending = assembler::assemble_tombstone(
            &counter,
            HashAlgorithm::Sha256,
            Party::Gap,
            &target,
        );
        chain.append(pending).unwrap();

        let report = verify_chain(
            Party::Gap,
            HashAlgorithm::Sha256,
            GENESIS_GAP,
            chain.records(),
            &source,
        );

        assert!(report.verified);
        assert_eq!(report.records[2].status, RecordStatus::Verified);
        assert_eq!(
            chain.records()[2].tombstone_of,
            Some(EvidenceNumber::new(Party::Gap, 1))
        );
    }

    #[test]
    fn empty_snapshot_is_vacuously_verified() {
        let source = MapSource(HashMap::new());
        let report = verify_chain(
            Party::Gap,
            HashAlgorithm::Sha256,
            GENESIS_GAP,
            &[],
            &source,
        );
        assert!(report.verified);
        assert_eq!(report.checked_count, 0);
        assert_eq!(report.snapshot_len, 0);
    }
}

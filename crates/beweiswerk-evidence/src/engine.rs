// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central engine facade — the surface the (external) web/CLI layer calls.
//
// Wires the store, sequence counter, and per-party chains together.  The
// rusqlite-backed store is `Send` but not `Sync`, so it sits behind a
// mutex; each party's chain has its own mutex, which is the at-most-one-
// concurrent-append-per-party serialization point.  Appends to different
// parties' chains proceed in parallel.  Lock order is always chain before
// store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use tracing::{info, instrument, warn};

use beweiswerk_core::error::{BeweisError, Result};
use beweiswerk_core::{
    EngineConfig, EvidenceNumber, EvidenceRecord, NormalizedMessage, Party, VerificationReport,
};
use beweiswerk_mail::archive::ArchiveReader;

use crate::assembler::{self, SequenceCounter};
use crate::chain::CustodyChain;
use crate::store::EvidenceStore;
use crate::verify::{ByteSource, verify_chain};

/// Evidence engine over one evidence database.
///
/// All methods take `&self`; the engine is shared across threads directly
/// (or behind an `Arc`) by the consumer layer.
#[derive(Debug)]
pub struct EvidenceEngine {
    config: EngineConfig,
    store: Mutex<EvidenceStore>,
    counters: SequenceCounter,
    chains: HashMap<Party, Mutex<CustodyChain>>,
}

impl EvidenceEngine {
    /// Open (or create) the engine state at `path`.
    ///
    /// Loads both parties' chains, restores the sequence counters from the
    /// persisted tail, and refuses to open a chain whose recorded algorithm
    /// or genesis does not match the configuration — mixing algorithms
    /// within one chain is not permitted.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let store = EvidenceStore::open(path)?;
        Self::init(store, config)
    }

    /// Engine over an in-memory database (useful for tests).
    pub fn open_in_memory(config: EngineConfig) -> Result<Self> {
        let store = EvidenceStore::open_in_memory()?;
        Self::init(store, config)
    }

    fn init(store: EvidenceStore, config: EngineConfig) -> Result<Self> {
        let counters = SequenceCounter::new();
        let mut chains = HashMap::new();

        for party in Party::all() {
            match store.chain_meta(party)? {
                None => {
                    store.init_chain(party, config.algorithm.id(), config.genesis(party))?;
                }
                Some(meta) => {
                    if meta.algorithm != config.algorithm.id() {
                        return Err(BeweisError::AlgorithmMismatch {
                            chain: meta.algorithm,
                            configured: config.algorithm.id().to_owned(),
                        });
                    }
                    if meta.genesis != config.genesis(party) {
                        return Err(BeweisError::GenesisMismatch {
                            party: party.tag().to_owned(),
                        });
                    }
                }
            }

            let records = store.load_chain(party)?;
            counters.restore(
                party,
                records
                    .last()
                    .map(|record| record.evidence_number.sequence)
                    .unwrap_or(0),
            );
            let chain =
                CustodyChain::from_records(party, config.algorithm, config.genesis(party), records)?;
            info!(party = party.tag(), records = chain.len(), "chain loaded");
            chains.insert(party, Mutex::new(chain));
        }

        Ok(Self {
            config,
            store: Mutex::new(store),
            counters,
            chains,
        })
    }

    /// Open an archive for streaming ingestion (the OpenArchive surface).
    pub fn open_archive(&self, path: impl AsRef<Path>) -> Result<ArchiveReader> {
        ArchiveReader::open(path, self.config.algorithm)
    }

    /// Resume archive ingestion from a previously recorded byte offset.
    pub fn resume_archive(&self, path: impl AsRef<Path>, offset: u64) -> Result<ArchiveReader> {
        ArchiveReader::resume(path, offset, self.config.algorithm)
    }

    /// Assign the next evidence number for `party` to a message and link
    /// the record into the party's chain.
    ///
    /// Re-selecting an already-evidenced message is a no-op that returns
    /// the existing record — one evidence number per message per party.
    #[instrument(skip(self, message), fields(party = %party, message_id = %message.message_id))]
    pub fn assign_evidence(
        &self,
        party: Party,
        message: &NormalizedMessage,
    ) -> Result<EvidenceRecord> {
        let mut chain = self.chain(party).lock().expect("chain lock poisoned");

        if let Some(existing) = self
            .store
            .lock()
            .expect("store lock poisoned")
            .find_by_message(party, &message.message_id)?
        {
            info!(evidence_number = %existing.evidence_number, "message already evidenced");
            return Ok(existing);
        }

        let pending = assembler::assemble(&self.counters, party, message);
        let record = chain.seal(pending)?;

        // Persist first, then commit in memory; a failed insert leaves the
        // chain tail untouched (the consumed sequence number is never
        // reused — a gap, not a duplicate).
        self.store
            .lock()
            .expect("store lock poisoned")
            .append(&record)?;
        chain.extend_sealed(record.clone())?;

        info!(evidence_number = %record.evidence_number, "evidence assigned");
        Ok(record)
    }

    /// Append a tombstone revoking `target`.
    ///
    /// The revoked record keeps its number and its place in the chain;
    /// the tombstone is a new link referencing it.
    #[instrument(skip(self), fields(party = %party, target = %target))]
    pub fn assign_tombstone(
        &self,
        party: Party,
        target: EvidenceNumber,
    ) -> Result<EvidenceRecord> {
        let mut chain = self.chain(party).lock().expect("chain lock poisoned");

        let revoked = chain
            .records()
            .iter()
            .find(|record| record.evidence_number == target)
            .cloned()
            .ok_or_else(|| BeweisError::EvidenceNotFound(target.to_string()))?;
        if revoked.is_tombstone() {
            return Err(BeweisError::AlreadyTombstoned(target.to_string()));
        }

        let pending =
            assembler::assemble_tombstone(&self.counters, self.config.algorithm, party, &revoked);
        let record = chain.seal(pending)?;

        self.store
            .lock()
            .expect("store lock poisoned")
            .append(&record)?;
        chain.extend_sealed(record.clone())?;

        warn!(evidence_number = %record.evidence_number, "evidence tombstoned");
        Ok(record)
    }

    /// Snapshot of a party's chain, in sequence order.
    pub fn chain_records(&self, party: Party) -> Vec<EvidenceRecord> {
        self.chain(party)
            .lock()
            .expect("chain lock poisoned")
            .records()
            .to_vec()
    }

    /// Verify a party's chain against original bytes (the VerifyChain
    /// surface).
    ///
    /// Operates on a snapshot captured at call time; the walk itself runs
    /// without holding the chain lock, so verification can overlap new
    /// appends — records appended after the snapshot are simply not covered
    /// by this report.
    pub fn verify_chain(&self, party: Party, source: &dyn ByteSource) -> VerificationReport {
        let snapshot = self.chain_records(party);
        verify_chain(
            party,
            self.config.algorithm,
            self.config.genesis(party),
            &snapshot,
            source,
        )
    }

    fn chain(&self, party: Party) -> &Mutex<CustodyChain> {
        self.chains
            .get(&party)
            .expect("both party chains are created at open")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;

    use beweiswerk_core::{HashAlgorithm, MessageId, RawMailUnit, RecordStatus};
    use beweiswerk_mail::mbox::MboxReader;
    use beweiswerk_mail::normalize;

    struct MapSource(StdHashMap<MessageId, Vec<u8>>);

    impl ByteSource for MapSource {
        fn raw_message(&self, message_id: &MessageId) -> Option<Vec<u8>> {
            self.0.get(message_id).cloned()
        }
    }

    fn engine() -> EvidenceEngine {
        EvidenceEngine::open_in_memory(EngineConfig::default()).unwrap()
    }

    fn raw_message(subject: &str) -> Vec<u8> {
        format!(
            "From: kim@example.com\r\nTo: lee@example.com\r\nDate: Tue, 2 Apr 2024 10:00:00 +0900\r\nSubject: {subject}\r\n\r\nbody of {subject}\r\n"
        )
        .into_bytes()
    }

    fn message(subject: &str) -> NormalizedMessage {
        let unit = RawMailUnit {
            bytes: raw_message(subject),
            offset: 0,
        };
        normalize(&unit, HashAlgorithm::Sha256).unwrap()
    }

    /// The end-to-end scenario: an archive with a valid message A, a
    /// malformed unit B, and a valid message C; evidence assigned to A and
    /// C; the two-record chain verifies.
    #[test]
    fn archive_to_verified_chain() {
        let mut data = Vec::new();
        data.extend_from_slice(b"From kim@example.com Tue Apr  2 10:00:00 2024\n");
        data.extend_from_slice(b"From: kim@example.com\n");
        data.extend_from_slice(b"Date: Tue, 2 Apr 2024 10:00:00 +0900\n");
        data.extend_from_slice(b"Subject: A\n\nfirst body\n\n");
        data.extend_from_slice(b"From corrupt Tue Apr  2 10:05:00 2024\n");
        data.extend_from_slice(b"%%%% truncated transport dump %%%%\n\n");
        data.extend_from_slice(b"From lee@example.com Wed Apr  3 09:30:00 2024\n");
        data.extend_from_slice(b"From: lee@example.com\n");
        data.extend_from_slice(b"Date: Wed, 3 Apr 2024 09:30:00 +0900\n");
        data.extend_from_slice(b"Subject: C\n\nthird body\n");

        let mut file = tempfile::Builder::new().suffix(".mbox").tempfile().unwrap();
        file.write_all(&data).unwrap();

        let engine = engine();
        let items: Vec<_> = engine.open_archive(file.path()).unwrap().collect();
        assert_eq!(items.len(), 3);
        let a = items[0].as_ref().unwrap().clone();
        assert!(items[1].is_err());
        let c = items[2].as_ref().unwrap().clone();

        let record_a = engine.assign_evidence(Party::Gap, &a).unwrap();
        let record_c = engine.assign_evidence(Party::Gap, &c).unwrap();
        assert_eq!(record_a.evidence_number.to_string(), "갑 제1호증");
        assert_eq!(record_c.evidence_number.to_string(), "갑 제2호증");

        // Resolve original bytes by re-reading the archive.
        let mut bytes_by_id = StdHashMap::new();
        for unit in MboxReader::open(file.path()).unwrap().flatten() {
            if let Ok(parsed) = normalize(&unit, HashAlgorithm::Sha256) {
                bytes_by_id.insert(parsed.message_id, unit.bytes);
            }
        }

        let report = engine.verify_chain(Party::Gap, &MapSource(bytes_by_id));
        assert!(report.verified);
        assert_eq!(report.checked_count, 2);
        assert_eq!(report.snapshot_len, 2);
    }

    #[test]
    fn reassignment_is_idempotent() {
        let engine = engine();
        let msg = message("contract");

        let first = engine.assign_evidence(Party::Gap, &msg).unwrap();
        let second = engine.assign_evidence(Party::Gap, &msg).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.chain_records(Party::Gap).len(), 1);

        // The same message may be evidenced once per party, though.
        let eul = engine.assign_evidence(Party::Eul, &msg).unwrap();
        assert_eq!(eul.evidence_number.to_string(), "을 제1호증");
    }

    #[test]
    fn party_chains_are_independent() {
        let engine = engine();
        engine.assign_evidence(Party::Gap, &message("a")).unwrap();
        engine.assign_evidence(Party::Eul, &message("b")).unwrap();
        engine.assign_evidence(Party::Gap, &message("c")).unwrap();

        let gap: Vec<String> = engine
            .chain_records(Party::Gap)
            .iter()
            .map(|record| record.evidence_number.to_string())
            .collect();
        assert_eq!(gap, vec!["갑 제1호증", "갑 제2호증"]);

        let eul: Vec<String> = engine
            .chain_records(Party::Eul)
            .iter()
            .map(|record| record.evidence_number.to_string())
            .collect();
        assert_eq!(eul, vec!["을 제1호증"]);
    }

    #[test]
    fn concurrent_assignment_yields_contiguous_numbers() {
        let engine = Arc::new(engine());
        let threads = 8;
        let per_thread = 5;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    (0..per_thread)
                        .map(|i| {
                            engine
                                .assign_evidence(Party::Gap, &message(&format!("t{t}-m{i}")))
                                .unwrap()
                                .evidence_number
                                .sequence
                        })
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut sequences: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("assignment thread panicked"))
            .collect();
        sequences.sort_unstable();

        let expected: Vec<u64> = (1..=(threads * per_thread) as u64).collect();
        assert_eq!(sequences, expected, "no gaps, no duplicates");
    }

    #[test]
    fn tombstone_revokes_without_removal() {
        let engine = engine();
        let record = engine.assign_evidence(Party::Gap, &message("to delete")).unwrap();
        engine.assign_evidence(Party::Gap, &message("keeper")).unwrap();

        let tombstone = engine
            .assign_tombstone(Party::Gap, record.evidence_number)
            .unwrap();
        assert_eq!(tombstone.evidence_number.sequence, 3);
        assert_eq!(tombstone.tombstone_of, Some(record.evidence_number));

        // Nothing removed; the chain grew.
        let records = engine.chain_records(Party::Gap);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], record);

        // Revoking twice is refused.
        let err = engine
            .assign_tombstone(Party::Gap, record.evidence_number)
            .unwrap_err();
        assert!(matches!(err, BeweisError::AlreadyTombstoned(_)));

        // Sequence numbers are never reused after a tombstone.
        let next = engine.assign_evidence(Party::Gap, &message("after")).unwrap();
        assert_eq!(next.evidence_number.sequence, 4);
    }

    #[test]
    fn tombstoning_unknown_evidence_fails() {
        let engine = engine();
        let err = engine
            .assign_tombstone(Party::Gap, EvidenceNumber::new(Party::Gap, 9))
            .unwrap_err();
        assert!(matches!(err, BeweisError::EvidenceNotFound(_)));
    }

    #[test]
    fn persisted_chain_reloads_with_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.db");

        let record = {
            let engine = EvidenceEngine::open(&path, EngineConfig::default()).unwrap();
            engine.assign_evidence(Party::Gap, &message("persisted")).unwrap()
        };

        let engine = EvidenceEngine::open(&path, EngineConfig::default()).unwrap();
        let records = engine.chain_records(Party::Gap);
        assert_eq!(records, vec![record]);

        // Counter resumes past the persisted tail.
        let next = engine.assign_evidence(Party::Gap, &message("fresh")).unwrap();
        assert_eq!(next.evidence_number.sequence, 2);
    }

    #[test]
    fn reopening_with_a_different_genesis_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.db");
        {
            EvidenceEngine::open(&path, EngineConfig::default()).unwrap();
        }

        let mut config = EngineConfig::default();
        config.genesis_gap = "some-other-genesis".to_owned();
        let err = EvidenceEngine::open(&path, config).unwrap_err();
        assert!(matches!(err, BeweisError::GenesisMismatch { .. }));
    }

    #[test]
    fn verification_report_serializes_for_the_certificate_layer() {
        let engine = engine();
        let msg = message("exported");
        engine.assign_evidence(Party::Gap, &msg).unwrap();

        let mut bytes_by_id = StdHashMap::new();
        bytes_by_id.insert(msg.message_id.clone(), raw_message("exported"));
        let report = engine.verify_chain(Party::Gap, &MapSource(bytes_by_id));
        assert!(report.verified);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"갑\""));
        assert!(json.contains("sha-256"));
        let parsed: beweiswerk_core::VerificationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.records[0].status, RecordStatus::Verified);
    }
}

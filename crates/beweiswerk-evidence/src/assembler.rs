// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Evidence assembly — sequential, party-scoped exhibit numbering.
//
// The sequence counter is an explicit, injectable service with a single
// serialization point (one mutex), not module state: callers pass it in,
// tests run with fresh counters. Numbers are strictly increasing and never
// reused, even after a record is tombstoned.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, SubsecRound, Utc};

use beweiswerk_core::{EvidenceNumber, EvidenceRecord, HashAlgorithm, NormalizedMessage, Party};

use crate::chain::{PendingEvidence, tombstone_content_hash};

/// Per-party evidence sequence counter.
///
/// The mutex is the single point of mutation that preserves the
/// strict-increase invariant under concurrent evidence assembly.
#[derive(Debug)]
pub struct SequenceCounter {
    last_issued: Mutex<HashMap<Party, u64>>,
}

impl SequenceCounter {
    /// Fresh counter with no numbers issued for either party.
    pub fn new() -> Self {
        Self {
            last_issued: Mutex::new(HashMap::new()),
        }
    }

    /// Raise a party's counter to at least `last`, used when reopening a
    /// persisted chain. Never lowers an already-issued counter.
    pub fn restore(&self, party: Party, last: u64) {
        let mut issued = self.last_issued.lock().expect("counter lock poisoned");
        let entry = issued.entry(party).or_insert(0);
        if last > *entry {
            *entry = last;
        }
    }

    /// Issue the next sequence number for `party`.
    pub fn next(&self, party: Party) -> u64 {
        let mut issued = self.last_issued.lock().expect("counter lock poisoned");
        let entry = issued.entry(party).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Highest number issued so far for `party` (0 if none).
    pub fn last(&self, party: Party) -> u64 {
        let issued = self.last_issued.lock().expect("counter lock poisoned");
        issued.get(&party).copied().unwrap_or(0)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Record timestamps are hashed and persisted as RFC 3339 at whole-second
/// precision; truncating here keeps the hashed text identical across the
/// persist/reload round trip.
fn record_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Assemble the next evidence record for `party` from a normalized message.
///
/// The result is unlinked; the custody chain computes its chain hash.
pub fn assemble(
    counter: &SequenceCounter,
    party: Party,
    message: &NormalizedMessage,
) -> PendingEvidence {
    let sequence = counter.next(party);
    PendingEvidence {
        evidence_number: EvidenceNumber::new(party, sequence),
        message_id: message.message_id.clone(),
        content_hash: message.content_hash.clone(),
        attachment_hashes: message.attachment_hashes(),
        created_at: record_timestamp(),
        tombstone_of: None,
    }
}

/// Assemble a tombstone revoking `target`.
///
/// Consumes a fresh sequence number like any other record; the revoked
/// record keeps its number and its place in the chain.
pub fn assemble_tombstone(
    counter: &SequenceCounter,
    algorithm: HashAlgorithm,
    party: Party,
    target: &EvidenceRecord,
) -> PendingEvidence {
    let sequence = counter.next(party);
    PendingEvidence {
        evidence_number: EvidenceNumber::new(party, sequence),
        message_id: target.message_id.clone(),
        content_hash: tombstone_content_hash(algorithm, target.evidence_number),
        attachment_hashes: Vec::new(),
        created_at: record_timestamp(),
        tombstone_of: Some(target.evidence_number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counters_are_independent_per_party() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(Party::Gap), 1);
        assert_eq!(counter.next(Party::Gap), 2);
        assert_eq!(counter.next(Party::Eul), 1);
        assert_eq!(counter.next(Party::Gap), 3);
        assert_eq!(counter.last(Party::Eul), 1);
    }

    #[test]
    fn restore_never_lowers_the_counter() {
        let counter = SequenceCounter::new();
        counter.restore(Party::Gap, 5);
        assert_eq!(counter.next(Party::Gap), 6);
        counter.restore(Party::Gap, 3);
        assert_eq!(counter.next(Party::Gap), 7);
    }

    #[test]
    fn concurrent_issuance_is_gapless_and_duplicate_free() {
        let counter = Arc::new(SequenceCounter::new());
        let threads = 8;
        let per_thread = 100;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    (0..per_thread)
                        .map(|_| counter.next(Party::Gap))
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut issued: Vec<u64> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("counter thread panicked"))
            .collect();
        issued.sort_unstable();

        let expected: Vec<u64> = (1..=(threads * per_thread) as u64).collect();
        assert_eq!(issued, expected);
    }
}

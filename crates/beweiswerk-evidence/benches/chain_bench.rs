// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for chain-hash computation, chain appends, and
// store inserts in the beweiswerk-evidence crate.

use chrono::TimeZone;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use beweiswerk_core::config::GENESIS_GAP;
use beweiswerk_core::{EvidenceNumber, EvidenceRecord, HashAlgorithm, MessageId, Party};
use beweiswerk_evidence::chain::{self, CustodyChain, PendingEvidence};
use beweiswerk_evidence::store::EvidenceStore;

fn pending(sequence: u64) -> PendingEvidence {
    PendingEvidence {
        evidence_number: EvidenceNumber::new(Party::Gap, sequence),
        message_id: MessageId(format!("bench-message-{sequence}")),
        content_hash: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
            .to_owned(),
        attachment_hashes: vec![
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_owned(),
        ],
        created_at: chrono::Utc.with_ymd_and_hms(2024, 4, 2, 1, 0, 0).unwrap(),
        tombstone_of: None,
    }
}

/// Benchmark a single chain-hash computation with one attachment digest.
fn bench_chain_hash(c: &mut Criterion) {
    let p = pending(1);

    c.bench_function("chain_hash (1 attachment)", |b| {
        b.iter(|| {
            let hash = chain::chain_hash(
                HashAlgorithm::Sha256,
                black_box(&p.content_hash),
                black_box(&p.attachment_hashes),
                black_box(GENESIS_GAP),
                p.evidence_number,
                p.created_at,
            );
            black_box(hash);
        });
    });
}

/// Benchmark building a 100-record chain from genesis.
fn bench_chain_build(c: &mut Criterion) {
    c.bench_function("chain_build (100 records)", |b| {
        b.iter(|| {
            let mut chain = CustodyChain::new(Party::Gap, HashAlgorithm::Sha256, GENESIS_GAP);
            for sequence in 1..=100 {
                chain.append(pending(sequence)).expect("append failed");
            }
            assert_eq!(chain.len(), 100);
            black_box(chain.tip_hash().to_owned());
        });
    });
}

/// Benchmark inserting a sealed record into an in-memory SQLite store.
///
/// The database is created once outside the hot loop so this measures
/// steady-state insertion, not schema creation.
fn bench_store_append(c: &mut Criterion) {
    c.bench_function("store_append (in-memory SQLite)", |b| {
        let store = EvidenceStore::open_in_memory().expect("open in-memory store");
        let mut sequence = 0u64;

        b.iter(|| {
            sequence += 1;
            let record = EvidenceRecord {
                evidence_number: EvidenceNumber::new(Party::Gap, sequence),
                message_id: MessageId(format!("bench-message-{sequence}")),
                content_hash: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
                    .to_owned(),
                attachment_hashes: Vec::new(),
                created_at: chrono::Utc.with_ymd_and_hms(2024, 4, 2, 1, 0, 0).unwrap(),
                chain_hash: format!("{sequence:064x}"),
                tombstone_of: None,
            };
            store.append(black_box(&record)).expect("append failed");
        });
    });
}

criterion_group!(benches, bench_chain_hash, bench_chain_build, bench_store_append);
criterion_main!(benches);

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Append-only evidence store backed by SQLite.
//
// Schema:
//   chain_meta(
//     party      TEXT PRIMARY KEY,  -- "gap" / "eul"
//     algorithm  TEXT NOT NULL,     -- e.g. "sha-256"
//     genesis    TEXT NOT NULL      -- published genesis constant
//   )
//   evidence(
//     party             TEXT    NOT NULL,
//     seq               INTEGER NOT NULL,
//     evidence_number   TEXT    NOT NULL,  -- display form, e.g. "갑 제3호증"
//     message_id        TEXT    NOT NULL,
//     content_hash      TEXT    NOT NULL,
//     attachment_hashes TEXT    NOT NULL,  -- JSON array, attachment order
//     created_at        TEXT    NOT NULL,  -- RFC 3339, whole seconds
//     chain_hash        TEXT    NOT NULL,
//     tombstone_party   TEXT,
//     tombstone_seq     INTEGER,
//     PRIMARY KEY (party, seq)
//   )
//
// The contract is append-only: rows are inserted, never updated or
// deleted. Logical deletion is a tombstone row.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use beweiswerk_core::error::{BeweisError, Result};
use beweiswerk_core::{EvidenceNumber, EvidenceRecord, MessageId, Party};

/// SQLite schema, created on open.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS chain_meta (
        party      TEXT PRIMARY KEY,
        algorithm  TEXT NOT NULL,
        genesis    TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS evidence (
        party             TEXT    NOT NULL,
        seq               INTEGER NOT NULL,
        evidence_number   TEXT    NOT NULL,
        message_id        TEXT    NOT NULL,
        content_hash      TEXT    NOT NULL,
        attachment_hashes TEXT    NOT NULL,
        created_at        TEXT    NOT NULL,
        chain_hash        TEXT    NOT NULL,
        tombstone_party   TEXT,
        tombstone_seq     INTEGER,
        PRIMARY KEY (party, seq)
    );
    CREATE INDEX IF NOT EXISTS idx_evidence_message
        ON evidence (party, message_id);
"#;

/// Per-party chain metadata row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMeta {
    pub algorithm: String,
    pub genesis: String,
}

/// Append-only evidence store.
///
/// Fixed-field rows keyed by (party, sequence); in-place updates are not
/// part of the API. The connection is `Send` but not `Sync` — callers wrap
/// the store in a mutex for sharing, as the engine does.
#[derive(Debug)]
pub struct EvidenceStore {
    conn: Connection,
}

impl EvidenceStore {
    /// Open (or create) the evidence database at `path`.
    ///
    /// Creates the schema if missing. WAL mode is enabled for better
    /// concurrent-read performance.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| BeweisError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| BeweisError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| BeweisError::Database(format!("create tables: {e}")))?;

        info!("evidence database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BeweisError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| BeweisError::Database(format!("create tables: {e}")))?;

        debug!("in-memory evidence database opened");
        Ok(Self { conn })
    }

    /// Record a party's chain metadata if no row exists yet.
    ///
    /// An existing row is left untouched — callers compare it against their
    /// configuration and refuse to proceed on mismatch.
    pub fn init_chain(&self, party: Party, algorithm: &str, genesis: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO chain_meta (party, algorithm, genesis)
                 VALUES (?1, ?2, ?3)",
                params![party.tag(), algorithm, genesis],
            )
            .map_err(|e| BeweisError::Database(format!("init chain meta: {e}")))?;
        Ok(())
    }

    /// Chain metadata for `party`, if the chain has been initialised.
    pub fn chain_meta(&self, party: Party) -> Result<Option<ChainMeta>> {
        self.conn
            .query_row(
                "SELECT algorithm, genesis FROM chain_meta WHERE party = ?1",
                params![party.tag()],
                |row| {
                    Ok(ChainMeta {
                        algorithm: row.get(0)?,
                        genesis: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| BeweisError::Database(format!("chain meta: {e}")))
    }

    /// Append one sealed record.
    ///
    /// Fails if the (party, seq) key already exists — the store never
    /// overwrites, by contract.
    #[instrument(skip(self, record), fields(evidence_number = %record.evidence_number))]
    pub fn append(&self, record: &EvidenceRecord) -> Result<()> {
        let attachment_hashes = serde_json::to_string(&record.attachment_hashes)?;
        let (tombstone_party, tombstone_seq) = match record.tombstone_of {
            Some(number) => (Some(number.party.tag()), Some(number.sequence as i64)),
            None => (None, None),
        };

        self.conn
            .execute(
                "INSERT INTO evidence (party, seq, evidence_number, message_id, content_hash,
                                       attachment_hashes, created_at, chain_hash,
                                       tombstone_party, tombstone_seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.evidence_number.party.tag(),
                    record.evidence_number.sequence as i64,
                    record.evidence_number.to_string(),
                    record.message_id.as_str(),
                    record.content_hash,
                    attachment_hashes,
                    record.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    record.chain_hash,
                    tombstone_party,
                    tombstone_seq,
                ],
            )
            .map_err(|e| BeweisError::Database(format!("append evidence: {e}")))?;

        debug!("evidence record appended");
        Ok(())
    }

    /// Load a party's full chain, ordered by sequence.
    pub fn load_chain(&self, party: Party) -> Result<Vec<EvidenceRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT party, seq, message_id, content_hash, attachment_hashes,
                        created_at, chain_hash, tombstone_party, tombstone_seq
                 FROM evidence
                 WHERE party = ?1
                 ORDER BY seq ASC",
            )
            .map_err(|e| BeweisError::Database(format!("load chain: {e}")))?;

        let rows = stmt
            .query_map(params![party.tag()], row_to_stored)
            .map_err(|e| BeweisError::Database(format!("load chain: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            let stored = row.map_err(|e| BeweisError::Database(format!("load chain: {e}")))?;
            records.push(stored.into_record()?);
        }
        Ok(records)
    }

    /// Earliest non-tombstone record referencing `message_id` in the
    /// party's chain, if any — the idempotency lookup for re-selection.
    pub fn find_by_message(
        &self,
        party: Party,
        message_id: &MessageId,
    ) -> Result<Option<EvidenceRecord>> {
        let stored = self
            .conn
            .query_row(
                "SELECT party, seq, message_id, content_hash, attachment_hashes,
                        created_at, chain_hash, tombstone_party, tombstone_seq
                 FROM evidence
                 WHERE party = ?1 AND message_id = ?2 AND tombstone_seq IS NULL
                 ORDER BY seq ASC
                 LIMIT 1",
                params![party.tag(), message_id.as_str()],
                row_to_stored,
            )
            .optional()
            .map_err(|e| BeweisError::Database(format!("find by message: {e}")))?;

        stored.map(StoredRow::into_record).transpose()
    }

    /// Highest sequence number persisted for `party` (0 if none).
    pub fn last_sequence(&self, party: Party) -> Result<u64> {
        let max: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(seq) FROM evidence WHERE party = ?1",
                params![party.tag()],
                |row| row.get(0),
            )
            .map_err(|e| BeweisError::Database(format!("last sequence: {e}")))?;
        Ok(max.unwrap_or(0) as u64)
    }

    /// Number of records persisted for `party`.
    pub fn count(&self, party: Party) -> Result<u64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM evidence WHERE party = ?1",
                params![party.tag()],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count as u64)
            .map_err(|e| BeweisError::Database(format!("count: {e}")))
    }
}

/// Raw column values of one evidence row; converted to an
/// [`EvidenceRecord`] outside the rusqlite closure so parse errors map to
/// `CorruptRecord` rather than panicking the row mapper.
struct StoredRow {
    party: String,
    seq: i64,
    message_id: String,
    content_hash: String,
    attachment_hashes: String,
    created_at: String,
    chain_hash: String,
    tombstone_party: Option<String>,
    tombstone_seq: Option<i64>,
}

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        party: row.get(0)?,
        seq: row.get(1)?,
        message_id: row.get(2)?,
        content_hash: row.get(3)?,
        attachment_hashes: row.get(4)?,
        created_at: row.get(5)?,
        chain_hash: row.get(6)?,
        tombstone_party: row.get(7)?,
        tombstone_seq: row.get(8)?,
    })
}

impl StoredRow {
    fn into_record(self) -> Result<EvidenceRecord> {
        let corrupt = |detail: String| BeweisError::CorruptRecord {
            party: self.party.clone(),
            sequence: self.seq as u64,
            detail,
        };

        let party = Party::from_tag(&self.party)
            .ok_or_else(|| corrupt(format!("unknown party tag {:?}", self.party)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("bad created_at: {e}")))?;
        let attachment_hashes: Vec<String> = serde_json::from_str(&self.attachment_hashes)
            .map_err(|e| corrupt(format!("bad attachment hashes: {e}")))?;
        let tombstone_of = match (&self.tombstone_party, self.tombstone_seq) {
            (Some(tag), Some(seq)) => {
                let tombstone_party = Party::from_tag(tag)
                    .ok_or_else(|| corrupt(format!("unknown tombstone party tag {tag:?}")))?;
                Some(EvidenceNumber::new(tombstone_party, seq as u64))
            }
            (None, None) => None,
            _ => return Err(corrupt("half-populated tombstone reference".to_owned())),
        };

        Ok(EvidenceRecord {
            evidence_number: EvidenceNumber::new(party, self.seq as u64),
            message_id: MessageId(self.message_id),
            content_hash: self.content_hash,
            attachment_hashes,
            created_at,
            chain_hash: self.chain_hash,
            tombstone_of,
        })
    }
}

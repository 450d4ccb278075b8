// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Archive opening — the OpenArchive surface consumed by the upload and
// selection layer.
//
// A source is either an mbox container or a single eml message. The reader
// is a strict pipeline: unit i+1 is not read until unit i has been
// normalized and hashed, so memory stays at one unit in flight no matter
// how large the archive is.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{debug, instrument};
use uuid::Uuid;

use beweiswerk_core::error::Result;
use beweiswerk_core::{HashAlgorithm, NormalizedMessage, ParseFailure, RawMailUnit};

use crate::mbox::MboxReader;
use crate::normalize::normalize;

/// Container format of an archive source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Mbox,
    Eml,
}

/// Decide the container format of a source file.
///
/// An `.mbox`/`.eml` extension is trusted; anything else is sniffed by its
/// leading bytes (an mbox container starts with a `From ` separator).
pub fn detect_format(path: impl AsRef<Path>) -> Result<ArchiveFormat> {
    let path = path.as_ref();
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("mbox") => return Ok(ArchiveFormat::Mbox),
        Some("eml") => return Ok(ArchiveFormat::Eml),
        _ => {}
    }

    let mut file = File::open(path)?;
    let mut prefix = [0u8; 5];
    let mut filled = 0;
    while filled < prefix.len() {
        let read = file.read(&mut prefix[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    if &prefix[..filled] == b"From " {
        Ok(ArchiveFormat::Mbox)
    } else {
        Ok(ArchiveFormat::Eml)
    }
}

/// Counters accumulated while an archive streams through normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Identifier of this ingest run, for log correlation.
    pub run_id: Uuid,
    pub messages: u64,
    pub failures: u64,
    pub attachments: u64,
}

impl ArchiveStats {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            messages: 0,
            failures: 0,
            attachments: 0,
        }
    }
}

enum UnitSource {
    Mbox(MboxReader<BufReader<File>>),
    Eml(Option<RawMailUnit>),
}

/// Lazy sequence of normalized-message-or-parse-failure over one source.
///
/// Parse failures are items, not errors: one bad unit never aborts the
/// stream. The selection layer consumes both and presents failures to the
/// operator alongside the messages.
pub struct ArchiveReader {
    units: UnitSource,
    algorithm: HashAlgorithm,
    stats: ArchiveStats,
}

impl ArchiveReader {
    /// Open an archive and position it at its first unit.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> Result<Self> {
        let format = detect_format(path.as_ref())?;
        debug!(?format, "archive opened");
        let units = match format {
            ArchiveFormat::Mbox => UnitSource::Mbox(MboxReader::open(path.as_ref())?),
            ArchiveFormat::Eml => UnitSource::Eml(Some(read_eml(path.as_ref())?)),
        };
        Ok(Self {
            units,
            algorithm,
            stats: ArchiveStats::new(),
        })
    }

    /// Reopen an mbox archive at a previously recorded unit offset,
    /// resuming an interrupted ingest. For an eml source (a single unit)
    /// any nonzero offset means the unit was already ingested.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), offset))]
    pub fn resume(path: impl AsRef<Path>, offset: u64, algorithm: HashAlgorithm) -> Result<Self> {
        let format = detect_format(path.as_ref())?;
        let units = match format {
            ArchiveFormat::Mbox => UnitSource::Mbox(MboxReader::resume(path.as_ref(), offset)?),
            ArchiveFormat::Eml if offset == 0 => UnitSource::Eml(Some(read_eml(path.as_ref())?)),
            ArchiveFormat::Eml => UnitSource::Eml(None),
        };
        Ok(Self {
            units,
            algorithm,
            stats: ArchiveStats::new(),
        })
    }

    /// Counters for the units consumed so far.
    pub fn stats(&self) -> &ArchiveStats {
        &self.stats
    }

    /// Byte offset ingestion can be resumed from after a restart.
    pub fn position(&self) -> u64 {
        match &self.units {
            UnitSource::Mbox(reader) => reader.position(),
            UnitSource::Eml(Some(unit)) => unit.offset,
            UnitSource::Eml(None) => 0,
        }
    }
}

impl Iterator for ArchiveReader {
    type Item = std::result::Result<NormalizedMessage, ParseFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        let unit = match &mut self.units {
            UnitSource::Mbox(reader) => reader.next()?,
            UnitSource::Eml(slot) => Ok(slot.take()?),
        };

        let item = match unit {
            Ok(unit) => normalize(&unit, self.algorithm),
            Err(failure) => Err(failure),
        };

        match &item {
            Ok(message) => {
                self.stats.messages += 1;
                self.stats.attachments += message.attachments.len() as u64;
            }
            Err(failure) => {
                debug!(offset = failure.offset, detail = %failure.detail, "unit failed to parse");
                self.stats.failures += 1;
            }
        }
        Some(item)
    }
}

/// Read a single-message eml source as one raw unit.
fn read_eml(path: &Path) -> Result<RawMailUnit> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    Ok(RawMailUnit { bytes, offset: 0 })
}

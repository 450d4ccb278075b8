// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Streaming mbox reader — cuts an archive into raw mail units without ever
// materializing the whole file.
//
// Memory bound: one unit's bytes plus a single lookahead line, regardless
// of archive size. A unit that is not preceded by a recognizable `From `
// separator is reported as a per-unit parse failure and the scanner
// resynchronizes at the next separator; one bad unit never aborts the
// stream.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, instrument, warn};

use beweiswerk_core::error::Result;
use beweiswerk_core::{ParseFailure, ParseFailureKind, RawMailUnit};

/// mbox message separator prefix.
const SEPARATOR: &[u8] = b"From ";

/// One line pulled from the source, remembered with its absolute offset.
struct Line {
    offset: u64,
    bytes: Vec<u8>,
}

/// Lazy iterator of [`RawMailUnit`]s over an mbox byte stream.
///
/// Yields `Ok(unit)` per message and `Err(failure)` for stretches of bytes
/// that do not belong to any recognizable message. The iterator is
/// restartable: [`MboxReader::position`] after pulling unit *i* is the byte
/// offset of unit *i+1*, which can be fed to [`MboxReader::resume`] after a
/// process restart.
pub struct MboxReader<R> {
    reader: R,
    /// Absolute offset of the next byte the underlying reader will produce.
    offset: u64,
    /// Separator line already read past while scanning the previous unit.
    lookahead: Option<Line>,
    finished: bool,
}

impl MboxReader<BufReader<File>> {
    /// Open an mbox file and position the scanner at its first byte.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("mbox opened");
        Ok(Self::from_reader(BufReader::new(file)))
    }

    /// Reopen an mbox file at a previously recorded unit offset.
    ///
    /// `offset` must point at a separator line, i.e. a value previously
    /// returned by [`MboxReader::position`].
    #[instrument(skip_all, fields(path = %path.as_ref().display(), offset))]
    pub fn resume(path: impl AsRef<Path>, offset: u64) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;
        file.seek(SeekFrom::Start(offset))?;
        debug!("mbox resumed");
        Ok(Self::from_reader_at(BufReader::new(file), offset))
    }
}

impl<R: BufRead> MboxReader<R> {
    /// Scan a byte stream positioned at the start of an mbox container.
    pub fn from_reader(reader: R) -> Self {
        Self::from_reader_at(reader, 0)
    }

    /// Scan a byte stream whose first byte sits at `offset` in the archive.
    pub fn from_reader_at(reader: R, offset: u64) -> Self {
        Self {
            reader,
            offset,
            lookahead: None,
            finished: false,
        }
    }

    /// Byte offset ingestion can be resumed from.
    ///
    /// After a unit has been yielded this is the offset of the next unit's
    /// separator line (or end of file).
    pub fn position(&self) -> u64 {
        match &self.lookahead {
            Some(line) => line.offset,
            None => self.offset,
        }
    }

    /// Pull the next line, consuming the lookahead first if present.
    /// Returns `None` at end of file. Lines include their terminator.
    fn next_line(&mut self) -> io::Result<Option<Line>> {
        if let Some(line) = self.lookahead.take() {
            return Ok(Some(line));
        }
        let mut bytes = Vec::new();
        let read = self.reader.read_until(b'\n', &mut bytes)?;
        if read == 0 {
            return Ok(None);
        }
        let line = Line {
            offset: self.offset,
            bytes,
        };
        self.offset += read as u64;
        Ok(Some(line))
    }

    /// Collect body lines until the next separator (left in the lookahead)
    /// or end of file. Returns the accumulated unit bytes.
    fn collect_until_separator(&mut self, bytes: &mut Vec<u8>) -> io::Result<()> {
        loop {
            match self.next_line()? {
                None => return Ok(()),
                Some(line) if is_separator(&line.bytes) => {
                    self.lookahead = Some(line);
                    return Ok(());
                }
                Some(line) => {
                    // mboxrd quoting: a body line that was `From ` at
                    // delivery time is stored with one extra `>`.
                    if is_stuffed_from(&line.bytes) {
                        bytes.extend_from_slice(&line.bytes[1..]);
                    } else {
                        bytes.extend_from_slice(&line.bytes);
                    }
                }
            }
        }
    }

    fn io_failure(&mut self, offset: u64, error: io::Error) -> ParseFailure {
        self.finished = true;
        warn!(offset, %error, "mbox read failed; terminating stream");
        ParseFailure {
            offset,
            length: 0,
            kind: ParseFailureKind::Io,
            detail: error.to_string(),
        }
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = std::result::Result<RawMailUnit, ParseFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let first = match self.next_line() {
            Err(e) => {
                let offset = self.offset;
                return Some(Err(self.io_failure(offset, e)));
            }
            Ok(None) => {
                self.finished = true;
                return None;
            }
            Ok(Some(line)) => line,
        };

        if is_separator(&first.bytes) {
            // The separator line itself carries only envelope metadata and
            // is not part of the RFC 5322 message bytes.
            let unit_offset = first.offset;
            let mut bytes = Vec::new();
            if let Err(e) = self.collect_until_separator(&mut bytes) {
                return Some(Err(self.io_failure(unit_offset, e)));
            }
            Some(Ok(RawMailUnit {
                bytes,
                offset: unit_offset,
            }))
        } else {
            // No leading separator: swallow everything up to the next
            // recognizable boundary and report it as one failed unit.
            let start = first.offset;
            let mut garbage = first.bytes;
            if let Err(e) = self.collect_until_separator(&mut garbage) {
                return Some(Err(self.io_failure(start, e)));
            }
            warn!(offset = start, length = garbage.len(), "resynchronized after malformed separator");
            Some(Err(ParseFailure {
                offset: start,
                length: garbage.len() as u64,
                kind: ParseFailureKind::Syntax,
                detail: "data without a leading mbox separator".to_owned(),
            }))
        }
    }
}

/// Whether a line is an mbox message separator.
fn is_separator(line: &[u8]) -> bool {
    line.starts_with(SEPARATOR)
}

/// Whether a line is a `>From `-quoted body line (any number of `>`).
fn is_stuffed_from(line: &[u8]) -> bool {
    let quoted = line.iter().take_while(|&&b| b == b'>').count();
    quoted > 0 && line[quoted..].starts_with(SEPARATOR)
}

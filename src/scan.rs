// Copyright 2023 The tsbs-datalayers Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sequential reader over a serialized point stream

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};

use snafu::ResultExt;
use tracing::warn;

use crate::batch::Unit;
use crate::error::{self, Result};
use crate::point::Point;
use crate::serializer;

const READ_BUFFER_SIZE: usize = 4 << 20;

/// An undecoded wire line, decoded by the worker that processes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine(pub String);

impl RawLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Unit for RawLine {
    fn measurement(&self) -> &str {
        self.0.split_ascii_whitespace().next().unwrap_or_default()
    }

    fn into_point(self) -> Result<Option<Point>> {
        let point = serializer::decode(&self.0)?;
        Ok((!point.is_empty()).then_some(point))
    }
}

/// Counters kept while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub lines: u64,
    pub dropped: u64,
}

/// Forward-only source of units read from a buffered reader.
///
/// Reading is lazy and never rewinds. End of input is `Ok(None)`.
pub struct DataSource<R> {
    reader: R,
    buf: Vec<u8>,
    line: String,
    stats: ScanStats,
}

impl DataSource<BufReader<Box<dyn Read + Send>>> {
    /// Open `path` for scanning; `-` reads from stdin.
    pub fn open(path: &str) -> Result<Self> {
        let inner: Box<dyn Read + Send> = if path == "-" {
            Box::new(io::stdin())
        } else {
            Box::new(File::open(path).context(error::IoSnafu { path })?)
        };
        Ok(Self::new(BufReader::with_capacity(READ_BUFFER_SIZE, inner)))
    }
}

impl<R: BufRead> DataSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(1024),
            line: String::with_capacity(1024),
            stats: ScanStats::default(),
        }
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Advance to the next non-blank line. Lines that are not valid UTF-8
    /// are dropped; read failures are fatal.
    fn advance(&mut self) -> Result<bool> {
        loop {
            self.buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .context(error::ScanIoSnafu {
                    line: self.stats.lines,
                })?;
            if n == 0 {
                return Ok(false);
            }
            self.stats.lines += 1;
            match std::str::from_utf8(&self.buf) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => {
                    self.line.clear();
                    self.line.push_str(text);
                    return Ok(true);
                }
                Err(e) => {
                    warn!(line = self.stats.lines, error = %e, "Dropping line with invalid UTF-8");
                    self.stats.dropped += 1;
                }
            }
        }
    }

    fn current(&self) -> &str {
        self.line.trim_end_matches(['\n', '\r'])
    }

    /// Next raw line, left undecoded.
    pub fn next_line(&mut self) -> Result<Option<RawLine>> {
        if !self.advance()? {
            return Ok(None);
        }
        Ok(Some(RawLine(self.current().to_string())))
    }

    /// Next decoded point. Malformed lines and points without columns are
    /// skipped; only read failures surface as errors.
    pub fn next_point(&mut self) -> Result<Option<Point>> {
        while self.advance()? {
            match serializer::decode(self.current()) {
                Ok(point) if point.is_empty() => continue,
                Ok(point) => return Ok(Some(point)),
                Err(e) => {
                    warn!(line = self.stats.lines, error = %e, "Dropping malformed line");
                    self.stats.dropped += 1;
                }
            }
        }
        Ok(None)
    }
}

/// Source of units for the loader, in either scan mode.
pub trait UnitSource<U> {
    fn next_unit(&mut self) -> Result<Option<U>>;

    fn scan_stats(&self) -> ScanStats;
}

impl<R: BufRead> UnitSource<Point> for DataSource<R> {
    fn next_unit(&mut self) -> Result<Option<Point>> {
        self.next_point()
    }

    fn scan_stats(&self) -> ScanStats {
        self.stats()
    }
}

impl<R: BufRead> UnitSource<RawLine> for DataSource<R> {
    fn next_unit(&mut self) -> Result<Option<RawLine>> {
        self.next_line()
    }

    fn scan_stats(&self) -> ScanStats {
        self.stats()
    }
}

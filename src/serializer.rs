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

//! Line codec for serialized points
//!
//! A point is written as one line:
//!
//! ```text
//! measurement timestamp key=value key=value ... t0,t1,...
//! ```
//!
//! where the trailing list holds one integer type tag per key=value pair.

use std::fmt::Write as _;
use std::io::{self, Write};

use snafu::ensure;

use crate::error::{self, Result};
use crate::point::{Field, FieldType, Point, NULL_SENTINEL};

/// Encode a point into a single line without the trailing newline.
///
/// Returns `None` for a point without tags and fields; such a point must not
/// produce a line at all.
pub fn encode(point: &Point) -> Option<String> {
    let mut line = String::with_capacity(256);
    encode_into(point, &mut line).then_some(line)
}

/// Encode a point into `buf`, replacing its contents.
///
/// Returns `false` and leaves `buf` empty when the point has no columns.
pub fn encode_into(point: &Point, buf: &mut String) -> bool {
    buf.clear();
    if point.is_empty() {
        return false;
    }

    buf.push_str(&point.measurement);
    buf.push(' ');
    buf.push_str(&point.timestamp);
    for field in point.columns() {
        buf.push(' ');
        buf.push_str(&field.name);
        buf.push('=');
        buf.push_str(field.wire_value());
    }
    buf.push(' ');
    for (i, field) in point.columns().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        // Writing into a String cannot fail.
        let _ = write!(buf, "{}", field.data_type.tag());
    }
    true
}

/// Decode one line into a point. All columns land in `fields`.
pub fn decode(line: &str) -> Result<Point> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    ensure!(
        tokens.len() >= 3,
        error::MalformedLineSnafu {
            reason: format!("expected at least 3 tokens, found {}", tokens.len()),
        }
    );

    let (measurement, timestamp) = (tokens[0], tokens[1]);
    let pairs = &tokens[2..tokens.len() - 1];
    let types = tokens[tokens.len() - 1]
        .split(',')
        .map(str::parse::<FieldType>)
        .collect::<Result<Vec<_>>>()?;
    ensure!(
        types.len() == pairs.len(),
        error::TypeTagMismatchSnafu {
            tags: types.len(),
            pairs: pairs.len(),
        }
    );

    let mut fields = Vec::with_capacity(pairs.len());
    for (pair, data_type) in pairs.iter().zip(types) {
        let Some((name, value)) = pair.split_once('=') else {
            return error::MalformedLineSnafu {
                reason: format!("token {pair:?} is not a key=value pair"),
            }
            .fail();
        };
        let value = (value != NULL_SENTINEL).then(|| value.to_string());
        fields.push(Field {
            name: name.to_string(),
            data_type,
            value,
        });
    }

    Ok(Point {
        measurement: measurement.to_string(),
        timestamp: timestamp.to_string(),
        tags: Vec::new(),
        fields,
    })
}

/// Writes points as newline terminated lines, reusing one line buffer.
#[derive(Debug, Default)]
pub struct Serializer {
    buf: String,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize a point to `w`. Points without columns are skipped.
    pub fn serialize<W: Write>(&mut self, point: &Point, w: &mut W) -> io::Result<()> {
        if !encode_into(point, &mut self.buf) {
            return Ok(());
        }
        self.buf.push('\n');
        w.write_all(self.buf.as_bytes())
    }
}

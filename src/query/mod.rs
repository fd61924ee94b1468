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

//! Deterministic benchmark query generation and execution

mod devops;
mod runner;

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt};

pub use self::devops::{Devops, QueryType, CPU_METRICS};
pub use self::runner::{LabelStats, QueryRunner, QueryStat, QueryStats};
use crate::error::{self, Result};

/// Target name every label starts with.
pub const TARGET_NAME: &str = "Datalayers";

/// A generated query, as handed from the generator to the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkQuery {
    pub human_label: String,
    pub human_description: String,
    pub sql: String,
}

impl BenchmarkQuery {
    pub fn new(label: String, description: String, sql: String) -> Self {
        Self {
            human_label: label,
            human_description: description,
            sql,
        }
    }
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        ensure!(
            start < end,
            error::InvalidQueryParamsSnafu {
                msg: format!("interval start {start} is not before end {end}"),
            }
        );
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }

    /// Uniformly draw a sub-interval of length `window` lying inside this one.
    pub fn rand_window<R: Rng>(&self, rng: &mut R, window: Duration) -> Result<TimeInterval> {
        let window = chrono::Duration::from_std(window)
            .ok()
            .context(error::InvalidQueryParamsSnafu {
                msg: format!("window {window:?} is out of range"),
            })?;
        let lower = nanos(self.start)?;
        let upper = nanos(self.end - window)?;
        ensure!(
            upper > lower,
            error::InvalidQueryParamsSnafu {
                msg: "random window equal to or bigger than interval",
            }
        );

        let start = DateTime::from_timestamp_nanos(lower + rng.random_range(0..upper - lower));
        Ok(TimeInterval {
            start,
            end: start + window,
        })
    }

    /// Start as an RFC 3339 timestamp with second precision.
    pub fn start_string(&self) -> String {
        rfc3339(self.start)
    }

    pub fn end_string(&self) -> String {
        rfc3339(self.end)
    }
}

fn nanos(t: DateTime<Utc>) -> Result<i64> {
    t.timestamp_nanos_opt()
        .context(error::InvalidQueryParamsSnafu {
            msg: format!("{t} is outside the nanosecond range"),
        })
}

pub fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render a duration the way labels have always shown them: `1s`, `1m0s`,
/// `12h0m0s`, `500ms`.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_nanos();
    if total == 0 {
        return "0s".to_string();
    }
    if total < 1_000 {
        return format!("{total}ns");
    }
    if total < 1_000_000 {
        return with_fraction(total, 1_000, "µs");
    }
    if total < 1_000_000_000 {
        return with_fraction(total, 1_000_000, "ms");
    }

    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let frac = fraction(u128::from(d.subsec_nanos()), 1_000_000_000);
    let _ = write!(out, "{seconds}{frac}s");
    out
}

fn with_fraction(total: u128, unit: u128, suffix: &str) -> String {
    format!("{}{}{}", total / unit, fraction(total % unit, unit), suffix)
}

/// Decimal fraction `rem / unit` without trailing zeros, empty when zero.
fn fraction(rem: u128, unit: u128) -> String {
    if rem == 0 {
        return String::new();
    }
    let width = unit.ilog10() as usize;
    let digits = format!("{rem:0width$}");
    format!(".{}", digits.trim_end_matches('0'))
}

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

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow_cast::pretty::pretty_format_batches;
use tracing::{debug, warn};

use super::BenchmarkQuery;
use crate::error::Result;
use crate::transport::Transport;

/// Timing of one executed query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStat {
    pub label: String,
    pub elapsed: Duration,
    pub rows: usize,
}

impl QueryStat {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

pub struct QueryRunner<T: Transport> {
    transport: Arc<T>,
    print_responses: bool,
}

impl<T: Transport> QueryRunner<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            print_responses: false,
        }
    }

    /// Print every result set to stdout.
    pub fn print_responses(mut self, print: bool) -> Self {
        self.print_responses = print;
        self
    }

    /// Execute `query`, draining its whole result.
    pub async fn run(&self, query: &BenchmarkQuery) -> Result<QueryStat> {
        let start = Instant::now();
        let batches = self.transport.execute(&query.sql).await?;
        let elapsed = start.elapsed();
        let rows = batches.iter().map(|b| b.num_rows()).sum();
        debug!(
            label = %query.human_label,
            rows,
            elapsed_ms = elapsed.as_millis() as u64,
            "Query finished"
        );

        if self.print_responses {
            println!("{}", query.human_description);
            match pretty_format_batches(&batches) {
                Ok(table) => println!("{table}"),
                Err(e) => warn!(error = %e, "Failed to format query response"),
            }
        }

        Ok(QueryStat {
            label: query.human_label.clone(),
            elapsed,
            rows,
        })
    }

    /// Run every query in order. A failed query is logged, counted and
    /// skipped.
    pub async fn run_all<I>(&self, queries: I) -> QueryStats
    where
        I: IntoIterator<Item = BenchmarkQuery>,
    {
        let mut stats = QueryStats::default();
        for query in queries {
            match self.run(&query).await {
                Ok(stat) => stats.record(&stat),
                Err(e) => {
                    warn!(label = %query.human_label, error = %e, "Query failed");
                    stats.record_failure();
                }
            }
        }
        stats
    }
}

/// Aggregate of the timings of one label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStats {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub sum_ms: f64,
}

impl LabelStats {
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms / self.count as f64
        }
    }
}

/// Per-label query timings.
#[derive(Debug, Clone, Default)]
pub struct QueryStats {
    labels: BTreeMap<String, LabelStats>,
    failures: u64,
}

impl QueryStats {
    pub fn record(&mut self, stat: &QueryStat) {
        let ms = stat.elapsed_ms();
        self.labels
            .entry(stat.label.clone())
            .and_modify(|s| {
                s.count += 1;
                s.min_ms = s.min_ms.min(ms);
                s.max_ms = s.max_ms.max(ms);
                s.sum_ms += ms;
            })
            .or_insert(LabelStats {
                count: 1,
                min_ms: ms,
                max_ms: ms,
                sum_ms: ms,
            });
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Fold the stats of another worker into these.
    pub fn merge(&mut self, other: QueryStats) {
        for (label, theirs) in other.labels {
            self.labels
                .entry(label)
                .and_modify(|s| {
                    s.count += theirs.count;
                    s.min_ms = s.min_ms.min(theirs.min_ms);
                    s.max_ms = s.max_ms.max(theirs.max_ms);
                    s.sum_ms += theirs.sum_ms;
                })
                .or_insert(theirs);
        }
        self.failures += other.failures;
    }

    pub fn get(&self, label: &str) -> Option<&LabelStats> {
        self.labels.get(label)
    }

    /// Number of successful queries.
    pub fn count(&self) -> u64 {
        self.labels.values().map(|s| s.count).sum()
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl fmt::Display for QueryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, s) in &self.labels {
            writeln!(f, "{label}:")?;
            writeln!(
                f,
                "min: {:8.2}ms, mean: {:8.2}ms, max: {:8.2}ms, count: {}",
                s.min_ms,
                s.mean_ms(),
                s.max_ms,
                s.count
            )?;
        }
        write!(
            f,
            "Run complete after {} queries, {} failed",
            self.count() + self.failures,
            self.failures
        )
    }
}

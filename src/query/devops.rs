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

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use snafu::ensure;

use super::{format_duration, BenchmarkQuery, TimeInterval, TARGET_NAME};
use crate::error::{self, Error, Result};

/// Metrics of the `cpu` table, in column order.
pub const CPU_METRICS: [&str; 10] = [
    "usage_user",
    "usage_system",
    "usage_idle",
    "usage_nice",
    "usage_iowait",
    "usage_irq",
    "usage_softirq",
    "usage_steal",
    "usage_guest",
    "usage_guest_nice",
];

const HOUR: Duration = Duration::from_secs(3600);
const DOUBLE_GROUP_BY_DURATION: Duration = Duration::from_secs(12 * 3600);
const HIGH_CPU_DURATION: Duration = Duration::from_secs(12 * 3600);
const MAX_ALL_DURATION: Duration = Duration::from_secs(8 * 3600);
const HIGH_CPU_THRESHOLD: &str = "90.0";

/// The standard devops query catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    SingleGroupBy {
        metrics: usize,
        hosts: usize,
        hours: u64,
    },
    CpuMaxAll {
        hosts: usize,
    },
    DoubleGroupBy {
        metrics: usize,
    },
    HighCpu {
        hosts: usize,
    },
    LastPoint,
    GroupByOrderByLimit,
}

const CATALOGUE: [(&str, QueryType); 15] = [
    ("single-groupby-1-1-1", QueryType::SingleGroupBy { metrics: 1, hosts: 1, hours: 1 }),
    ("single-groupby-1-1-12", QueryType::SingleGroupBy { metrics: 1, hosts: 1, hours: 12 }),
    ("single-groupby-1-8-1", QueryType::SingleGroupBy { metrics: 1, hosts: 8, hours: 1 }),
    ("single-groupby-5-1-1", QueryType::SingleGroupBy { metrics: 5, hosts: 1, hours: 1 }),
    ("single-groupby-5-1-12", QueryType::SingleGroupBy { metrics: 5, hosts: 1, hours: 12 }),
    ("single-groupby-5-8-1", QueryType::SingleGroupBy { metrics: 5, hosts: 8, hours: 1 }),
    ("cpu-max-all-1", QueryType::CpuMaxAll { hosts: 1 }),
    ("cpu-max-all-8", QueryType::CpuMaxAll { hosts: 8 }),
    ("double-groupby-1", QueryType::DoubleGroupBy { metrics: 1 }),
    ("double-groupby-5", QueryType::DoubleGroupBy { metrics: 5 }),
    ("double-groupby-all", QueryType::DoubleGroupBy { metrics: CPU_METRICS.len() }),
    ("high-cpu-all", QueryType::HighCpu { hosts: 0 }),
    ("high-cpu-1", QueryType::HighCpu { hosts: 1 }),
    ("lastpoint", QueryType::LastPoint),
    ("groupby-orderby-limit", QueryType::GroupByOrderByLimit),
];

impl QueryType {
    /// Every catalogue name.
    pub fn names() -> impl Iterator<Item = &'static str> {
        CATALOGUE.iter().map(|(name, _)| *name)
    }
}

impl FromStr for QueryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CATALOGUE
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, query_type)| *query_type)
            .ok_or_else(|| {
                error::InvalidQueryParamsSnafu {
                    msg: format!("unknown query type {s:?}"),
                }
                .build()
            })
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match CATALOGUE.iter().find(|(_, query_type)| query_type == self) {
            Some((name, _)) => write!(f, "{name}"),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Generator of devops queries over the `cpu` table.
///
/// All randomness comes from one seeded stream, so the same seed and the same
/// sequence of calls always produce the same queries.
pub struct Devops {
    interval: TimeInterval,
    scale: usize,
    rng: StdRng,
}

impl Devops {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, scale: usize, seed: u64) -> Result<Self> {
        ensure!(
            scale > 0,
            error::InvalidQueryParamsSnafu {
                msg: "scale must be at least 1",
            }
        );
        Ok(Self {
            interval: TimeInterval::new(start, end)?,
            scale,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn interval(&self) -> &TimeInterval {
        &self.interval
    }

    pub fn generate(&mut self, query_type: QueryType) -> Result<BenchmarkQuery> {
        match query_type {
            QueryType::SingleGroupBy {
                metrics,
                hosts,
                hours,
            } => self.group_by_time(hosts, metrics, HOUR * hours as u32),
            QueryType::CpuMaxAll { hosts } => self.max_all_cpu(hosts, MAX_ALL_DURATION),
            QueryType::DoubleGroupBy { metrics } => self.group_by_time_and_primary_tag(metrics),
            QueryType::HighCpu { hosts } => self.high_cpu_for_hosts(hosts),
            QueryType::LastPoint => self.last_point_per_host(),
            QueryType::GroupByOrderByLimit => self.group_by_order_by_limit(),
        }
    }

    /// Minute-bucketed maximum of `n_metrics` cpu metrics for `n_hosts`
    /// random hosts over a random window of `time_range`.
    pub fn group_by_time(
        &mut self,
        n_hosts: usize,
        n_metrics: usize,
        time_range: Duration,
    ) -> Result<BenchmarkQuery> {
        let window = self.interval.rand_window(&mut self.rng, time_range)?;
        let metrics = cpu_metrics(n_metrics)?;
        let hosts = self.host_filter(n_hosts)?;

        let sql = format!(
            "SELECT date_trunc('minute', ts) AS minute, {} FROM cpu \
             WHERE {} AND ts >= '{}' AND ts < '{}' \
             GROUP BY minute ORDER BY minute",
            aggregate("max", metrics),
            hosts,
            window.start_string(),
            window.end_string()
        );
        let label = format!(
            "{TARGET_NAME} {} cpu metric(s), random {:4} hosts, random {} by 1m",
            n_metrics,
            n_hosts,
            format_duration(time_range)
        );
        let description = format!("{label}: {}", window.start_string());
        Ok(BenchmarkQuery::new(label, description, sql))
    }

    /// Maximum cpu usage of the last five minutes before a random end.
    pub fn group_by_order_by_limit(&mut self) -> Result<BenchmarkQuery> {
        let window = self.interval.rand_window(&mut self.rng, HOUR)?;
        let sql = format!(
            "SELECT date_trunc('minute', ts) AS minute, max(usage_user) FROM cpu \
             WHERE ts < '{}' \
             GROUP BY minute ORDER BY minute DESC LIMIT 5",
            window.end_string()
        );
        let label = format!("{TARGET_NAME} max cpu over last 5 min-intervals (random end)");
        let description = format!("{label}: {}", window.end_string());
        Ok(BenchmarkQuery::new(label, description, sql))
    }

    /// Hourly mean of `n_metrics` cpu metrics per host, all hosts.
    pub fn group_by_time_and_primary_tag(&mut self, n_metrics: usize) -> Result<BenchmarkQuery> {
        let metrics = cpu_metrics(n_metrics)?;
        let window = self
            .interval
            .rand_window(&mut self.rng, DOUBLE_GROUP_BY_DURATION)?;

        let sql = format!(
            "SELECT date_trunc('hour', ts) AS hour, hostname, {} FROM cpu \
             WHERE ts >= '{}' AND ts < '{}' \
             GROUP BY hour, hostname ORDER BY hour, hostname",
            aggregate("avg", metrics),
            window.start_string(),
            window.end_string()
        );
        let label = format!(
            "{TARGET_NAME} mean of {} metrics, all hosts, random {} by 1h",
            n_metrics,
            format_duration(DOUBLE_GROUP_BY_DURATION)
        );
        let description = format!("{label}: {}", window.start_string());
        Ok(BenchmarkQuery::new(label, description, sql))
    }

    /// Hourly maximum of every cpu metric for `n_hosts` random hosts.
    pub fn max_all_cpu(&mut self, n_hosts: usize, time_range: Duration) -> Result<BenchmarkQuery> {
        let window = self.interval.rand_window(&mut self.rng, time_range)?;
        let hosts = self.host_filter(n_hosts)?;

        let sql = format!(
            "SELECT date_trunc('hour', ts) AS hour, {} FROM cpu \
             WHERE {} AND ts >= '{}' AND ts < '{}' \
             GROUP BY hour ORDER BY hour",
            aggregate("max", &CPU_METRICS),
            hosts,
            window.start_string(),
            window.end_string()
        );
        let label = format!(
            "{TARGET_NAME} max of all CPU metrics, random {:4} hosts, random {} by 1h",
            n_hosts,
            format_duration(time_range)
        );
        let description = format!("{label}: {}", window.start_string());
        Ok(BenchmarkQuery::new(label, description, sql))
    }

    /// Most recent row of every host.
    pub fn last_point_per_host(&mut self) -> Result<BenchmarkQuery> {
        let sql = "WITH ranked_cpu AS (\
                   SELECT *, ROW_NUMBER() OVER (PARTITION BY hostname ORDER BY ts DESC) AS row_num \
                   FROM cpu) \
                   SELECT * FROM ranked_cpu WHERE row_num = 1"
            .to_string();
        let label = format!("{TARGET_NAME} last row per host");
        let description = label.clone();
        Ok(BenchmarkQuery::new(label, description, sql))
    }

    /// Rows above the usage threshold for `n_hosts` random hosts, or for all
    /// hosts when `n_hosts` is zero.
    pub fn high_cpu_for_hosts(&mut self, n_hosts: usize) -> Result<BenchmarkQuery> {
        let window = self.interval.rand_window(&mut self.rng, HIGH_CPU_DURATION)?;
        let mut sql = format!(
            "SELECT * FROM cpu WHERE usage_user > {HIGH_CPU_THRESHOLD} AND ts >= '{}' AND ts < '{}'",
            window.start_string(),
            window.end_string()
        );
        let label = if n_hosts == 0 {
            format!("{TARGET_NAME} CPU over threshold, all hosts")
        } else {
            sql.push_str(" AND ");
            sql.push_str(&self.host_filter(n_hosts)?);
            format!("{TARGET_NAME} CPU over threshold, {n_hosts} host(s)")
        };
        let description = format!("{label}: {}", window.start_string());
        Ok(BenchmarkQuery::new(label, description, sql))
    }

    /// Draw `n` distinct hosts from `[0, scale)`.
    fn random_hosts(&mut self, n: usize) -> Result<Vec<String>> {
        ensure!(
            n > 0,
            error::InvalidQueryParamsSnafu {
                msg: "number of hosts cannot be < 1",
            }
        );
        ensure!(
            n <= self.scale,
            error::InvalidQueryParamsSnafu {
                msg: format!(
                    "number of hosts ({n}) larger than total hosts ({})",
                    self.scale
                ),
            }
        );
        Ok(index::sample(&mut self.rng, self.scale, n)
            .into_iter()
            .map(|i| format!("host_{i}"))
            .collect())
    }

    fn host_filter(&mut self, n: usize) -> Result<String> {
        let hosts = self.random_hosts(n)?;
        let quoted: Vec<String> = hosts.iter().map(|h| format!("'{h}'")).collect();
        Ok(format!("hostname IN ({})", quoted.join(", ")))
    }
}

fn cpu_metrics(n: usize) -> Result<&'static [&'static str]> {
    ensure!(
        (1..=CPU_METRICS.len()).contains(&n),
        error::InvalidQueryParamsSnafu {
            msg: format!(
                "number of metrics must be between 1 and {}, got {n}",
                CPU_METRICS.len()
            ),
        }
    );
    Ok(&CPU_METRICS[..n])
}

fn aggregate(func: &str, metrics: &[&str]) -> String {
    metrics
        .iter()
        .map(|m| format!("{func}({m})"))
        .collect::<Vec<_>>()
        .join(", ")
}

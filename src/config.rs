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

//! Loader configuration

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use derive_builder::Builder;
use snafu::ensure;

use crate::error::{self, Error, Result};
use crate::router::RoutingPolicy;

pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:8360";
pub const DEFAULT_DATABASE: &str = "benchmark";
pub const DEFAULT_BATCH_SIZE: usize = 1250;
pub const DEFAULT_WORKERS: usize = 32;
pub const DEFAULT_TABLE_PARTITIONS: usize = 8;

/// Whether the scanner decodes lines or hands them to workers undecoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    #[default]
    Points,
    Lines,
}

impl FromStr for ScanMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "points" => Ok(Self::Points),
            "lines" => Ok(Self::Lines),
            _ => error::InvalidConfigSnafu {
                msg: format!("unknown scan mode {s:?}, expected points or lines"),
            }
            .fail(),
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Points => write!(f, "points"),
            Self::Lines => write!(f, "lines"),
        }
    }
}

/// Hash partition columns per table, parsed from `table:col,col` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionBy {
    tables: HashMap<String, Vec<String>>,
}

impl PartitionBy {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut tables = HashMap::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let Some((table, columns)) = entry.split_once(':') else {
                return error::InvalidConfigSnafu {
                    msg: format!("partition spec {entry:?} is not table:col,col"),
                }
                .fail();
            };
            let columns: Vec<String> = columns
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
            ensure!(
                !table.trim().is_empty() && !columns.is_empty(),
                error::InvalidConfigSnafu {
                    msg: format!("partition spec {entry:?} needs a table and at least one column"),
                }
            );
            tables.insert(table.trim().to_string(), columns);
        }
        Ok(Self { tables })
    }

    pub fn columns(&self, table: &str) -> &[String] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Physical layout of the tables created by the write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub partition_by: PartitionBy,
    pub partitions: usize,
    /// Rows the column builders of a table are pre-sized for.
    pub row_capacity: usize,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            partition_by: PartitionBy::default(),
            partitions: DEFAULT_TABLE_PARTITIONS,
            row_capacity: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Options of a load run
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct LoaderConfig {
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub batch_size: usize,
    /// Number of workers, which is also the number of partitions.
    #[builder(default = "DEFAULT_WORKERS")]
    pub workers: usize,
    #[builder(default)]
    pub routing: RoutingPolicy,
    #[builder(default)]
    pub scan_mode: ScanMode,
    #[builder(default)]
    pub partition_by: PartitionBy,
    #[builder(default = "DEFAULT_TABLE_PARTITIONS")]
    pub table_partitions: usize,
    /// When false the data is encoded but nothing is sent.
    #[builder(default = "true")]
    pub do_load: bool,
    /// Full batches a worker may have queued before the producer waits.
    #[builder(default = "4")]
    pub channel_capacity: usize,
}

impl LoaderConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.batch_size == Some(0) {
            return Err("batch size must be at least 1".to_string());
        }
        if self.workers == Some(0) {
            return Err("worker count must be at least 1".to_string());
        }
        if self.channel_capacity == Some(0) {
            return Err("channel capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

impl LoaderConfig {
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    pub fn table_layout(&self) -> TableLayout {
        TableLayout {
            partition_by: self.partition_by.clone(),
            partitions: self.table_partitions,
            row_capacity: self.batch_size,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            routing: RoutingPolicy::default(),
            scan_mode: ScanMode::default(),
            partition_by: PartitionBy::default(),
            table_partitions: DEFAULT_TABLE_PARTITIONS,
            do_load: true,
            channel_capacity: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partition_by() {
        let by = PartitionBy::parse(&["cpu:hostname", "disk: hostname, device ", ""]).unwrap();
        assert_eq!(by.columns("cpu"), ["hostname"]);
        assert_eq!(by.columns("disk"), ["hostname", "device"]);
        assert!(by.columns("mem").is_empty());

        assert!(PartitionBy::parse(&["cpu"]).is_err());
        assert!(PartitionBy::parse(&["cpu:"]).is_err());
        assert!(PartitionBy::parse(&[":hostname"]).is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let config = LoaderConfig::builder()
            .workers(4usize)
            .build()
            .expect("Failed to build config");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.workers, 4);
        assert_eq!(config.routing, RoutingPolicy::MeasurementHash);
        assert!(config.do_load);

        let layout = config.table_layout();
        assert_eq!(layout.partitions, DEFAULT_TABLE_PARTITIONS);
        assert_eq!(layout.row_capacity, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_builder_rejects_zero_sizes() {
        assert!(LoaderConfig::builder().batch_size(0usize).build().is_err());
        assert!(LoaderConfig::builder().workers(0usize).build().is_err());
    }

    #[test]
    fn test_parse_scan_mode() {
        assert_eq!("lines".parse::<ScanMode>().unwrap(), ScanMode::Lines);
        assert!("bytes".parse::<ScanMode>().is_err());
    }
}

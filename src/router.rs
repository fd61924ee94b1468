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

//! Assignment of units to workers

use std::fmt;
use std::str::FromStr;

use snafu::ensure;

use crate::batch::Unit;
use crate::error::{self, Error, Result};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// How units are spread over workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// Cycle through workers regardless of content. Write contexts are
    /// shared between workers.
    RoundRobin,
    /// Hash the measurement name. Every table is owned by exactly one worker.
    #[default]
    MeasurementHash,
}

impl FromStr for RoutingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "round-robin" => Ok(Self::RoundRobin),
            "hash" | "measurement-hash" => Ok(Self::MeasurementHash),
            _ => error::InvalidConfigSnafu {
                msg: format!("unknown routing policy {s:?}, expected round-robin or hash"),
            }
            .fail(),
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round-robin"),
            Self::MeasurementHash => write!(f, "hash"),
        }
    }
}

/// 32-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Debug, Clone)]
pub struct PartitionRouter {
    policy: RoutingPolicy,
    partitions: usize,
    cursor: usize,
}

impl PartitionRouter {
    pub fn new(policy: RoutingPolicy, partitions: usize) -> Result<Self> {
        ensure!(
            partitions > 0,
            error::InvalidConfigSnafu {
                msg: "partition count must be at least 1",
            }
        );
        Ok(Self {
            policy,
            partitions,
            cursor: 0,
        })
    }

    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Worker index in `[0, partitions)` for `unit`.
    pub fn route<U: Unit>(&mut self, unit: &U) -> usize {
        match self.policy {
            RoutingPolicy::RoundRobin => {
                let idx = self.cursor;
                self.cursor = (self.cursor + 1) % self.partitions;
                idx
            }
            RoutingPolicy::MeasurementHash => {
                fnv1a(unit.measurement().as_bytes()) as usize % self.partitions
            }
        }
    }
}

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

//! Datalayers target of the time-series benchmark suite: a wire line codec,
//! a partitioned columnar load pipeline over Flight SQL, and a deterministic
//! devops query generator.

pub mod batch;
pub mod client;
pub mod column;
pub mod config;
pub mod creator;
pub mod error;
pub mod loader;
pub mod point;
pub mod processor;
pub mod query;
pub mod router;
pub mod scan;
pub mod serializer;
pub mod transport;
pub mod write_context;

pub use self::client::{ClientOptions, FlightSqlClient};
pub use self::config::{LoaderConfig, LoaderConfigBuilder, PartitionBy, ScanMode};
pub use self::creator::DbCreator;
pub use self::error::{Error, Result};
pub use self::loader::{LoadSummary, Loader};
pub use self::point::{Field, FieldType, Point};
pub use self::query::{BenchmarkQuery, Devops, QueryRunner, QueryStats, QueryType};
pub use self::router::{PartitionRouter, RoutingPolicy};
pub use self::scan::DataSource;
pub use self::serializer::{decode, encode, Serializer};
pub use self::transport::Transport;

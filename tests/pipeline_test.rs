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

// End to end tests of the load pipeline and the query path against an
// in-memory transport

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::ArrowError;
use chrono::{TimeZone, Utc};
use derive_new::new;
use parking_lot::Mutex;
use snafu::IntoError;
use tsbs_datalayers::error::FlightSqlSnafu;
use tsbs_datalayers::{
    DataSource, Devops, FieldType, Loader, LoaderConfig, Point, QueryRunner, QueryType, Result,
    RoutingPolicy, ScanMode, Serializer, Transport,
};

#[derive(Default)]
struct MemoryTransport {
    executed: Mutex<Vec<String>>,
    prepared: Mutex<Vec<String>>,
    inserted_rows: Mutex<Vec<usize>>,
    closed: Mutex<Vec<usize>>,
    fail_inserts: AtomicBool,
}

impl Transport for MemoryTransport {
    type Prepared = usize;

    async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        self.executed.lock().push(sql.to_string());
        Ok(Vec::new())
    }

    async fn prepare(&self, sql: &str) -> Result<usize> {
        let mut prepared = self.prepared.lock();
        prepared.push(sql.to_string());
        Ok(prepared.len() - 1)
    }

    async fn execute_prepared(&self, _prepared: &usize, record: RecordBatch) -> Result<u64> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(FlightSqlSnafu { stage: "insert" }
                .into_error(ArrowError::ComputeError("broken pipe".to_string())));
        }
        self.inserted_rows.lock().push(record.num_rows());
        Ok(record.num_rows() as u64)
    }

    async fn close(&self, prepared: usize) -> Result<()> {
        self.closed.lock().push(prepared);
        Ok(())
    }
}

#[derive(new)]
struct Sample {
    ts: i64,
    host: usize,
    #[new(value = "58.1")]
    usage_user: f64,
}

impl Sample {
    fn cpu(&self) -> Point {
        Point::new("cpu", self.ts)
            .add_tag("hostname", FieldType::String, Some(format!("host_{}", self.host)))
            .add_tag("region", FieldType::String, Some("eu-west-1"))
            .add_field("usage_user", FieldType::Float64, Some(self.usage_user.to_string()))
            .add_field("usage_system", FieldType::Float64, Some("2.5"))
    }

    fn disk(&self) -> Point {
        Point::new("disk", self.ts)
            .add_tag("hostname", FieldType::String, Some(format!("host_{}", self.host)))
            .add_field("used", FieldType::Int64, Some("1024"))
            .add_field("inodes_free", FieldType::Int64, None::<&str>)
    }
}

fn dataset(hosts: usize, steps: i64) -> String {
    let mut serializer = Serializer::new();
    let mut out = Vec::new();
    for step in 0..steps {
        let ts = 1_451_606_400_000_000_000 + step * 10_000_000_000;
        for host in 0..hosts {
            let sample = Sample::new(ts, host);
            serializer.serialize(&sample.cpu(), &mut out).unwrap();
            serializer.serialize(&sample.disk(), &mut out).unwrap();
        }
    }
    String::from_utf8(out).unwrap()
}

fn loader(
    transport: Arc<MemoryTransport>,
    routing: RoutingPolicy,
    scan_mode: ScanMode,
) -> Loader<MemoryTransport> {
    let config = LoaderConfig::builder()
        .workers(4usize)
        .batch_size(10usize)
        .routing(routing)
        .scan_mode(scan_mode)
        .build()
        .unwrap();
    Loader::new(config, transport)
}

#[tokio::test]
async fn test_load_creates_tables_and_inserts_every_row() {
    for routing in [RoutingPolicy::MeasurementHash, RoutingPolicy::RoundRobin] {
        let transport = Arc::new(MemoryTransport::default());
        let summary = loader(transport.clone(), routing, ScanMode::Points)
            .run(DataSource::new(Cursor::new(dataset(10, 6))))
            .await
            .unwrap();

        assert_eq!(summary.rows, 120, "{routing}");
        assert_eq!(summary.scan.lines, 120);
        assert_eq!(summary.transmit_errors, 0);
        assert_eq!(transport.inserted_rows.lock().iter().sum::<usize>(), 120);

        let mut created: Vec<String> = transport
            .executed
            .lock()
            .iter()
            .filter(|sql| sql.starts_with("CREATE TABLE"))
            .cloned()
            .collect();
        created.sort();
        created.dedup();
        assert_eq!(created.len(), 2);
        assert!(created[0].starts_with("CREATE TABLE IF NOT EXISTS cpu (ts TIMESTAMP(9) NOT NULL"));
        assert!(created[1].starts_with("CREATE TABLE IF NOT EXISTS disk ("));

        assert_eq!(transport.prepared.lock().len(), transport.closed.lock().len());
    }
}

#[tokio::test]
async fn test_malformed_lines_are_skipped_in_both_scan_modes() {
    for scan_mode in [ScanMode::Points, ScanMode::Lines] {
        let mut input = dataset(2, 2);
        input.push_str("cpu 99\n");
        input.push_str("cpu 100 hostname=host_0 9\n");
        input.push_str(&dataset(2, 1));

        let transport = Arc::new(MemoryTransport::default());
        let summary = loader(transport, RoutingPolicy::MeasurementHash, scan_mode)
            .run(DataSource::new(Cursor::new(input)))
            .await
            .unwrap();

        assert_eq!(summary.rows, 12, "{scan_mode}");
        assert_eq!(summary.scan.dropped + summary.dropped_units, 2, "{scan_mode}");
    }
}

#[tokio::test]
async fn test_invalid_utf8_lines_are_skipped_in_both_scan_modes() {
    for scan_mode in [ScanMode::Points, ScanMode::Lines] {
        let mut input = dataset(2, 2).into_bytes();
        input.extend_from_slice(b"cpu 99 hostname=\xc3\x28 9\n");
        input.extend_from_slice(dataset(2, 1).as_bytes());

        let transport = Arc::new(MemoryTransport::default());
        let summary = loader(transport, RoutingPolicy::MeasurementHash, scan_mode)
            .run(DataSource::new(Cursor::new(input)))
            .await
            .unwrap();

        assert_eq!(summary.rows, 12, "{scan_mode}");
        assert_eq!(summary.scan.dropped, 1, "{scan_mode}");
        assert_eq!(summary.dropped_units, 0, "{scan_mode}");
    }
}

#[tokio::test]
async fn test_transmit_failures_do_not_stop_the_load() {
    let transport = Arc::new(MemoryTransport::default());
    transport.fail_inserts.store(true, Ordering::SeqCst);

    let summary = loader(transport.clone(), RoutingPolicy::MeasurementHash, ScanMode::Points)
        .run(DataSource::new(Cursor::new(dataset(5, 4))))
        .await
        .unwrap();

    assert_eq!(summary.rows, 40);
    assert!(summary.transmit_errors > 0);
    assert!(transport.inserted_rows.lock().is_empty());
}

#[tokio::test]
async fn test_generated_queries_run_through_the_transport() {
    let start = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2016, 1, 2, 0, 0, 0).unwrap();
    let mut devops = Devops::new(start, end, 10, 7).unwrap();
    let queries: Vec<_> = QueryType::names()
        .map(|name| devops.generate(name.parse().unwrap()).unwrap())
        .collect();

    let transport = Arc::new(MemoryTransport::default());
    let stats = QueryRunner::new(transport.clone()).run_all(queries.clone()).await;

    assert_eq!(stats.count(), 15);
    assert_eq!(stats.failures(), 0);
    let executed = transport.executed.lock().clone();
    assert_eq!(executed.len(), 15);
    for (sql, query) in executed.iter().zip(&queries) {
        assert_eq!(sql, &query.sql);
        assert!(stats.get(&query.human_label).is_some());
    }
}

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

// Integration tests against a Datalayers server
// These tests require a running Datalayers instance:
//   cargo test --test integration -- --ignored

use std::io::Cursor;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};
use tsbs_datalayers::{
    BenchmarkQuery, ClientOptions, DataSource, DbCreator, Devops, FieldType, FlightSqlClient,
    Loader, LoaderConfig, PartitionBy, Point, QueryRunner, QueryType, Result, Serializer,
};

// Test configuration
struct TestConfig {
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

impl TestConfig {
    fn new() -> Self {
        Self {
            endpoint: std::env::var("DATALAYERS_TEST_ENDPOINT")
                .unwrap_or_else(|_| "127.0.0.1:8360".to_string()),
            username: Some(
                std::env::var("DATALAYERS_TEST_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            ),
            password: Some(
                std::env::var("DATALAYERS_TEST_PASSWORD").unwrap_or_else(|_| "public".to_string()),
            ),
        }
    }

    async fn connect(&self) -> Result<FlightSqlClient> {
        FlightSqlClient::connect(&ClientOptions {
            endpoint: self.endpoint.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ..Default::default()
        })
        .await
    }
}

// Test helper to create unique database names
fn unique_database(prefix: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    format!("{prefix}_{timestamp}")
}

fn cpu_points(hosts: usize, steps: i64) -> String {
    let mut serializer = Serializer::new();
    let mut out = Vec::new();
    for step in 0..steps {
        let ts = 1_451_606_400_000_000_000 + step * 10_000_000_000;
        for host in 0..hosts {
            let point = Point::new("cpu", ts)
                .add_tag("hostname", FieldType::String, Some(format!("host_{host}")))
                .add_field("usage_user", FieldType::Float64, Some(format!("{}", 50 + step)))
                .add_field("usage_system", FieldType::Float64, Some("3.5"));
            serializer.serialize(&point, &mut out).unwrap();
        }
    }
    String::from_utf8(out).unwrap()
}

async fn count_rows(client: &FlightSqlClient, table: &str) -> Result<usize> {
    let runner = QueryRunner::new(Arc::new(client.clone()));
    let stat = runner
        .run(&BenchmarkQuery::new(
            "count".to_string(),
            "count".to_string(),
            format!("SELECT * FROM {table}"),
        ))
        .await?;
    Ok(stat.rows)
}

#[tokio::test]
#[ignore = "requires a running Datalayers server"]
async fn test_create_database_twice() -> Result<()> {
    let config = TestConfig::new();
    let client = config.connect().await?;
    let creator = DbCreator::new(Arc::new(client));

    let database = unique_database("tsbs_create");
    creator.create_database(&database).await?;
    // A second create is answered with "already exists" and tolerated.
    creator.create_database(&database).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Datalayers server"]
async fn test_load_and_read_back() -> Result<()> {
    let config = TestConfig::new();
    let client = config.connect().await?;
    let database = unique_database("tsbs_load");
    DbCreator::new(Arc::new(client.clone()))
        .create_database(&database)
        .await?;

    let client = client.with_database(&database);
    let loader_config = LoaderConfig::builder()
        .workers(2usize)
        .batch_size(16usize)
        .partition_by(PartitionBy::parse(&["cpu:hostname"])?)
        .build()
        .unwrap();
    let loader = Loader::new(loader_config, Arc::new(client.clone()));
    let summary = loader
        .run(DataSource::new(Cursor::new(cpu_points(4, 25))))
        .await?;

    assert_eq!(summary.rows, 100);
    assert_eq!(summary.transmit_errors, 0);
    assert_eq!(count_rows(&client, "cpu").await?, 100);
    println!("{summary}");
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Datalayers server"]
async fn test_generated_queries_execute() -> Result<()> {
    let config = TestConfig::new();
    let client = config.connect().await?;
    let database = unique_database("tsbs_query");
    DbCreator::new(Arc::new(client.clone()))
        .create_database(&database)
        .await?;
    let client = client.with_database(&database);

    let loader = Loader::new(LoaderConfig::default(), Arc::new(client.clone()));
    loader
        .run(DataSource::new(Cursor::new(cpu_points(2, 10))))
        .await?;

    let start = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2016, 1, 2, 0, 0, 0).unwrap();
    let mut devops = Devops::new(start, end, 2, 42)?;
    // Shapes that only read usage_user.
    let runner = QueryRunner::new(Arc::new(client));
    for query_type in [
        QueryType::LastPoint,
        QueryType::HighCpu { hosts: 0 },
        QueryType::HighCpu { hosts: 1 },
        QueryType::GroupByOrderByLimit,
    ] {
        let query = devops.generate(query_type)?;
        let stat = runner.run(&query).await?;
        println!("{}: {} rows in {:.2}ms", query_type, stat.rows, stat.elapsed_ms());
    }
    Ok(())
}

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

//! Run generated queries against Datalayers and report their latencies
//!
//! Usage:
//!   tsbs_run_queries_datalayers --file queries.json --workers 4

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use snafu::ResultExt;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use tsbs_datalayers::config::{DEFAULT_DATABASE, DEFAULT_ENDPOINT};
use tsbs_datalayers::error::{InvalidConfigSnafu, IoSnafu, JoinSnafu, SerdeJsonSnafu};
use tsbs_datalayers::{
    BenchmarkQuery, ClientOptions, FlightSqlClient, QueryRunner, QueryStats, Result,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log verbosity: error, warn, info, debug or trace
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// Arrow Flight SQL endpoint of the Datalayers server
    #[arg(long, env = "DATALAYERS_SQL_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    sql_endpoint: String,

    #[arg(long, env = "DATALAYERS_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "DATALAYERS_PASSWORD")]
    password: Option<String>,

    #[arg(long, default_value = DEFAULT_DATABASE)]
    db_name: String,

    /// Query file of JSON lines, `-` reads stdin
    #[arg(long, default_value = "-")]
    file: String,

    /// Number of concurrent query workers
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Stop after this many queries, 0 runs all of them
    #[arg(long, default_value_t = 0)]
    max_queries: usize,

    /// Print every query response
    #[arg(long)]
    print_responses: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Query run failed");
            ExitCode::FAILURE
        }
    }
}

fn read_queries(path: &str, limit: usize) -> Result<Vec<BenchmarkQuery>> {
    let reader: Box<dyn Read> = if path == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(path).context(IoSnafu { path })?)
    };
    let stream = serde_json::Deserializer::from_reader(BufReader::new(reader))
        .into_iter::<BenchmarkQuery>();
    let limit = if limit == 0 { usize::MAX } else { limit };
    stream
        .take(limit)
        .map(|q| q.context(SerdeJsonSnafu))
        .collect()
}

async fn run(args: Args) -> Result<()> {
    if args.workers == 0 {
        return InvalidConfigSnafu {
            msg: "worker count must be at least 1",
        }
        .fail();
    }
    let queries = read_queries(&args.file, args.max_queries)?;
    info!(queries = queries.len(), workers = args.workers, "Running queries");

    let options = ClientOptions {
        endpoint: args.sql_endpoint,
        username: args.username,
        password: args.password,
        ..Default::default()
    };
    let client = FlightSqlClient::connect(&options)
        .await?
        .with_database(&args.db_name);
    let runner = Arc::new(QueryRunner::new(Arc::new(client)).print_responses(args.print_responses));

    let mut shards: Vec<Vec<BenchmarkQuery>> = vec![Vec::new(); args.workers];
    for (i, query) in queries.into_iter().enumerate() {
        shards[i % args.workers].push(query);
    }

    let start = Instant::now();
    let handles: Vec<_> = shards
        .into_iter()
        .map(|shard| {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run_all(shard).await })
        })
        .collect();
    let mut stats = QueryStats::default();
    for handle in handles {
        stats.merge(handle.await.context(JoinSnafu)?);
    }

    println!("{stats}");
    println!("Wall clock time: {:.6}sec", start.elapsed().as_secs_f64());
    Ok(())
}

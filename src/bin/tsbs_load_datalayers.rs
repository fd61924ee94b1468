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

//! Load a serialized point stream into Datalayers
//!
//! Usage:
//!   tsbs_load_datalayers --file data.txt --workers 8 --batch-size 1250

use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use tsbs_datalayers::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_DATABASE, DEFAULT_ENDPOINT, DEFAULT_TABLE_PARTITIONS,
    DEFAULT_WORKERS,
};
use tsbs_datalayers::error::InvalidConfigSnafu;
use tsbs_datalayers::{
    ClientOptions, DataSource, DbCreator, FlightSqlClient, Loader, LoaderConfig, PartitionBy,
    Result, RoutingPolicy, ScanMode,
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

    /// Database the points are loaded into
    #[arg(long, default_value = DEFAULT_DATABASE)]
    db_name: String,

    /// Input file, `-` reads stdin
    #[arg(long, default_value = "-")]
    file: String,

    /// Rows sent to the server in one insert
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Number of workers
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// `hash` keeps every table on one worker, `round-robin` spreads points evenly
    #[arg(long, default_value = "hash")]
    routing: RoutingPolicy,

    /// `points` decodes on the reader, `lines` decodes on the workers
    #[arg(long, default_value = "points")]
    scan_mode: ScanMode,

    /// Hash partition columns, `table:col,col`; separate tables with `;`
    #[arg(long, value_delimiter = ';')]
    partition_by: Vec<String>,

    #[arg(long, default_value_t = DEFAULT_TABLE_PARTITIONS)]
    table_partitions: usize,

    /// Batches a worker may have queued before reading pauses
    #[arg(long, default_value_t = 4)]
    channel_capacity: usize,

    /// Send the data; when false points are only encoded
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    do_load: bool,

    /// Create the database before loading
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    do_create_db: bool,
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
            error!(error = %e, "Load failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = LoaderConfig::builder()
        .batch_size(args.batch_size)
        .workers(args.workers)
        .routing(args.routing)
        .scan_mode(args.scan_mode)
        .partition_by(PartitionBy::parse(&args.partition_by)?)
        .table_partitions(args.table_partitions)
        .channel_capacity(args.channel_capacity)
        .do_load(args.do_load)
        .build()
        .map_err(|e| InvalidConfigSnafu { msg: e.to_string() }.build())?;

    let options = ClientOptions {
        endpoint: args.sql_endpoint,
        username: args.username,
        password: args.password,
        ..Default::default()
    };
    let client = if args.do_load {
        FlightSqlClient::connect(&options).await?
    } else {
        FlightSqlClient::connect_lazy(&options)?
    };

    if args.do_load && args.do_create_db {
        DbCreator::new(Arc::new(client.clone()))
            .create_database(&args.db_name)
            .await?;
    }

    let source = DataSource::open(&args.file)?;
    let loader = Loader::new(config, Arc::new(client.with_database(&args.db_name)));
    let summary = loader.run(source).await?;
    info!(database = %args.db_name, "Load complete");
    println!("{summary}");
    Ok(())
}

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

//! Generate devops benchmark queries as JSON lines
//!
//! Usage:
//!   tsbs_generate_queries_datalayers --query-type single-groupby-1-1-1 --queries 1000

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use snafu::{OptionExt, ResultExt};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use tsbs_datalayers::error::{InvalidQueryParamsSnafu, IoSnafu, SerdeJsonSnafu};
use tsbs_datalayers::{Devops, QueryType, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log verbosity: error, warn, info, debug or trace
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// One of the devops query types, for example `single-groupby-1-1-1`
    #[arg(long, required_unless_present = "list")]
    query_type: Option<QueryType>,

    /// Number of queries to generate
    #[arg(long, default_value_t = 1000)]
    queries: u64,

    /// Number of hosts the data was generated for
    #[arg(long, default_value_t = 1)]
    scale: usize,

    #[arg(long, default_value_t = 123)]
    seed: u64,

    /// Start of the loaded data, RFC 3339
    #[arg(long, default_value = "2016-01-01T00:00:00Z", value_parser = parse_timestamp)]
    timestamp_start: DateTime<Utc>,

    /// End of the loaded data, RFC 3339
    #[arg(long, default_value = "2016-01-02T00:00:00Z", value_parser = parse_timestamp)]
    timestamp_end: DateTime<Utc>,

    /// Output file, `-` writes stdout
    #[arg(long, default_value = "-")]
    file: String,

    /// List the query types and exit
    #[arg(long)]
    list: bool,
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

fn main() -> ExitCode {
    let args = Args::parse();
    FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    if args.list {
        for name in QueryType::names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Query generation failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let query_type = args.query_type.context(InvalidQueryParamsSnafu {
        msg: "a query type is required",
    })?;
    let mut devops = Devops::new(args.timestamp_start, args.timestamp_end, args.scale, args.seed)?;
    let out: Box<dyn Write> = if args.file == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(File::create(&args.file).context(IoSnafu { path: &args.file })?)
    };
    let mut out = BufWriter::new(out);

    for _ in 0..args.queries {
        let query = devops.generate(query_type)?;
        serde_json::to_writer(&mut out, &query).context(SerdeJsonSnafu)?;
        out.write_all(b"\n").context(IoSnafu { path: &args.file })?;
    }
    out.flush().context(IoSnafu { path: &args.file })?;
    info!(
        query_type = %query_type,
        queries = args.queries,
        "Generated queries"
    );
    Ok(())
}

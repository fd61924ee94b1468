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

//! Load pipeline: one scanning producer feeding a fixed pool of workers

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;
use std::time::{Duration, Instant};

use snafu::{OptionExt, ResultExt};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::batch::{Batch, BatchPool, Unit};
use crate::config::{LoaderConfig, ScanMode};
use crate::error::{self, Result};
use crate::point::Point;
use crate::processor::{BatchStats, Processor};
use crate::router::{PartitionRouter, RoutingPolicy};
use crate::scan::{DataSource, RawLine, ScanStats, UnitSource};
use crate::transport::Transport;
use crate::write_context::SharedContexts;

/// Outcome of a load run
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub rows: u64,
    pub metrics: u64,
    pub elapsed: Duration,
    pub workers: usize,
    pub scan: ScanStats,
    pub dropped_units: u64,
    pub dropped_rows: u64,
    pub transmit_errors: u64,
}

impl LoadSummary {
    pub fn rows_per_sec(&self) -> f64 {
        rate(self.rows, self.elapsed)
    }

    pub fn metrics_per_sec(&self) -> f64 {
        rate(self.metrics, self.elapsed)
    }

    fn absorb(&mut self, stats: BatchStats) {
        self.rows += stats.row_count;
        self.metrics += stats.metric_count;
        self.dropped_units += stats.dropped_units;
        self.dropped_rows += stats.dropped_rows;
        self.transmit_errors += stats.transmit_errors;
    }
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "loaded {} metrics in {:.3}sec with {} workers (mean rate {:.2} metrics/sec)",
            self.metrics,
            self.elapsed.as_secs_f64(),
            self.workers,
            self.metrics_per_sec()
        )?;
        writeln!(
            f,
            "loaded {} rows in {:.3}sec with {} workers (mean rate {:.2} rows/sec)",
            self.rows,
            self.elapsed.as_secs_f64(),
            self.workers,
            self.rows_per_sec()
        )?;
        write!(
            f,
            "scanned {} lines, dropped {} lines, {} units, {} rows, {} failed transmissions",
            self.scan.lines,
            self.scan.dropped,
            self.dropped_units,
            self.dropped_rows,
            self.transmit_errors
        )
    }
}

pub struct Loader<T: Transport> {
    config: LoaderConfig,
    transport: Arc<T>,
}

type WorkerHandle<T> = tokio::task::JoinHandle<Result<(Processor<T>, BatchStats)>>;

impl<T: Transport> Loader<T> {
    pub fn new(config: LoaderConfig, transport: Arc<T>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load everything `source` yields and return the aggregated counters.
    pub async fn run<R>(&self, source: DataSource<R>) -> Result<LoadSummary>
    where
        R: BufRead + Send + 'static,
    {
        match self.config.scan_mode {
            ScanMode::Points => self.run_units::<Point, _>(source).await,
            ScanMode::Lines => self.run_units::<RawLine, _>(source).await,
        }
    }

    async fn run_units<U, S>(&self, mut source: S) -> Result<LoadSummary>
    where
        U: Unit,
        S: UnitSource<U> + Send + 'static,
    {
        let start = Instant::now();
        let workers = self.config.workers;
        let batch_size = self.config.batch_size;
        let layout = Arc::new(self.config.table_layout());
        let pool = Arc::new(BatchPool::<U>::new(batch_size, workers * 2));
        let shared = match self.config.routing {
            RoutingPolicy::RoundRobin => Some(Arc::new(SharedContexts::new(layout.clone()))),
            RoutingPolicy::MeasurementHash => None,
        };
        let mut router = PartitionRouter::new(self.config.routing, workers)?;
        info!(
            workers,
            batch_size,
            routing = %self.config.routing,
            scan_mode = %self.config.scan_mode,
            do_load = self.config.do_load,
            "Starting load"
        );

        let mut senders = Vec::with_capacity(workers);
        let mut handles: Vec<WorkerHandle<T>> = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, rx) = mpsc::channel(self.config.channel_capacity);
            let processor = match &shared {
                Some(shared) => Processor::with_shared(
                    worker,
                    self.transport.clone(),
                    layout.clone(),
                    shared.clone(),
                ),
                None => Processor::new(worker, self.transport.clone(), layout.clone()),
            };
            handles.push(tokio::spawn(run_worker(
                processor,
                rx,
                pool.clone(),
                self.config.do_load,
            )));
            senders.push(tx);
        }

        let producer_pool = pool.clone();
        let producer = tokio::task::spawn_blocking(move || -> Result<ScanStats> {
            let mut pending: Vec<Batch<U>> = (0..senders.len())
                .map(|_| producer_pool.acquire())
                .collect();
            while let Some(unit) = source.next_unit()? {
                let worker = router.route(&unit);
                pending[worker].push(unit);
                if pending[worker].len() >= batch_size {
                    let full = std::mem::replace(&mut pending[worker], producer_pool.acquire());
                    senders[worker]
                        .blocking_send(full)
                        .ok()
                        .context(error::WorkerStoppedSnafu { worker })?;
                }
            }
            for (worker, batch) in pending.into_iter().enumerate() {
                if batch.is_empty() {
                    producer_pool.release(batch);
                    continue;
                }
                senders[worker]
                    .blocking_send(batch)
                    .ok()
                    .context(error::WorkerStoppedSnafu { worker })?;
            }
            Ok(source.scan_stats())
        });

        let produced = producer.await.context(error::JoinSnafu)?;

        let mut summary = LoadSummary {
            workers,
            ..Default::default()
        };
        let mut processors = Vec::with_capacity(workers);
        let mut worker_error = None;
        for handle in handles {
            match handle.await.context(error::JoinSnafu)? {
                Ok((processor, stats)) => {
                    summary.absorb(stats);
                    processors.push(processor);
                }
                Err(e) => {
                    error!(error = %e, "Worker failed");
                    worker_error.get_or_insert(e);
                }
            }
        }

        let mut close_error = None;
        for mut processor in processors {
            if let Err(e) = processor.close().await {
                close_error.get_or_insert(e);
            }
        }
        if let Some(shared) = shared {
            if let Err(e) = shared.close(self.transport.as_ref()).await {
                close_error.get_or_insert(e);
            }
        }

        if let Some(e) = worker_error {
            return Err(e);
        }
        summary.scan = produced?;
        if let Some(e) = close_error {
            return Err(e);
        }
        summary.elapsed = start.elapsed();
        info!(
            rows = summary.rows,
            metrics = summary.metrics,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Load finished"
        );
        Ok(summary)
    }
}

async fn run_worker<T: Transport, U: Unit>(
    mut processor: Processor<T>,
    mut rx: mpsc::Receiver<Batch<U>>,
    pool: Arc<BatchPool<U>>,
    do_load: bool,
) -> Result<(Processor<T>, BatchStats)> {
    let mut stats = BatchStats::default();
    while let Some(mut batch) = rx.recv().await {
        let result = processor.process_batch(&mut batch, do_load).await;
        pool.release(batch);
        match result {
            Ok(batch_stats) => stats += batch_stats,
            Err(e) => {
                if let Err(close_err) = processor.close().await {
                    error!(worker = processor.worker(), error = %close_err, "Failed to close processor");
                }
                return Err(e);
            }
        }
    }
    Ok((processor, stats))
}

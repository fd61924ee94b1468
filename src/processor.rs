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

//! Per-worker batch processing: decode, group by table, encode, transmit

use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::batch::{Batch, Unit};
use crate::config::TableLayout;
use crate::point::Point;
use crate::transport::Transport;
use crate::write_context::{SharedContexts, WriteContext};
use crate::Result;

/// Counters produced by processing batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Rows encoded, summed over every flushed table.
    pub row_count: u64,
    /// Rows times columns, timestamp included.
    pub metric_count: u64,
    /// Units that failed to decode.
    pub dropped_units: u64,
    /// Rows rejected because a value did not convert to its column type.
    pub dropped_rows: u64,
    /// Table flushes whose transmission failed.
    pub transmit_errors: u64,
}

impl AddAssign for BatchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.row_count += rhs.row_count;
        self.metric_count += rhs.metric_count;
        self.dropped_units += rhs.dropped_units;
        self.dropped_rows += rhs.dropped_rows;
        self.transmit_errors += rhs.transmit_errors;
    }
}

enum Contexts<T: Transport> {
    /// Owned by this worker alone.
    Private(HashMap<String, WriteContext<T>>),
    Shared(Arc<SharedContexts<T>>),
}

/// Turns batches of units into columnar records, one worker's worth.
pub struct Processor<T: Transport> {
    worker: usize,
    transport: Arc<T>,
    contexts: Contexts<T>,
    layout: Arc<TableLayout>,
}

impl<T: Transport> Processor<T> {
    /// Processor owning the write contexts of its tables.
    pub fn new(worker: usize, transport: Arc<T>, layout: Arc<TableLayout>) -> Self {
        Self {
            worker,
            transport,
            contexts: Contexts::Private(HashMap::new()),
            layout,
        }
    }

    /// Processor writing through contexts shared with other workers.
    pub fn with_shared(
        worker: usize,
        transport: Arc<T>,
        layout: Arc<TableLayout>,
        shared: Arc<SharedContexts<T>>,
    ) -> Self {
        Self {
            worker,
            transport,
            contexts: Contexts::Shared(shared),
            layout,
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Process every unit of `batch`, leaving it empty.
    ///
    /// Points are grouped per table in first-seen order and each touched
    /// table is flushed exactly once. With `do_transmit` unset no remote
    /// call is made at all. Transmission failures are logged and counted;
    /// only schema arity errors abort.
    pub async fn process_batch<U: Unit>(
        &mut self,
        batch: &mut Batch<U>,
        do_transmit: bool,
    ) -> Result<BatchStats> {
        let mut stats = BatchStats::default();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Vec<Point>> = Vec::new();

        for unit in batch.drain() {
            let point = match unit.into_point() {
                Ok(Some(point)) => point,
                Ok(None) => continue,
                Err(e) => {
                    warn!(worker = self.worker, error = %e, "Dropping undecodable unit");
                    stats.dropped_units += 1;
                    continue;
                }
            };
            let slot = match index.get(&point.measurement) {
                Some(slot) => *slot,
                None => {
                    index.insert(point.measurement.clone(), groups.len());
                    groups.push(Vec::new());
                    groups.len() - 1
                }
            };
            groups[slot].push(point);
        }

        let transport = self.transport.as_ref();
        let layout = self.layout.as_ref();
        for points in groups {
            let Some(sample) = points.first() else {
                continue;
            };
            match &mut self.contexts {
                Contexts::Private(map) => {
                    let context = map
                        .entry(sample.measurement.clone())
                        .or_insert_with(|| WriteContext::new(&sample.measurement, sample, layout));
                    write_table(context, &points, transport, do_transmit, &mut stats).await?;
                }
                Contexts::Shared(shared) => {
                    let context = shared.get_or_create(sample);
                    let mut context = context.lock().await;
                    write_table(&mut context, &points, transport, do_transmit, &mut stats)
                        .await?;
                }
            }
        }

        Ok(stats)
    }

    /// Close every write context this processor owns. Shared contexts are
    /// closed by their owner through [`SharedContexts::close`].
    pub async fn close(&mut self) -> Result<()> {
        let Contexts::Private(map) = &mut self.contexts else {
            return Ok(());
        };
        let mut result = Ok(());
        for (table, context) in map.iter_mut() {
            if let Err(e) = context.close(&self.transport).await {
                error!(worker = self.worker, table = %table, error = %e, "Failed to close write context");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        map.clear();
        result
    }

    /// Tables this processor has private write contexts for.
    pub fn tables(&self) -> Vec<String> {
        match &self.contexts {
            Contexts::Private(map) => map.keys().cloned().collect(),
            Contexts::Shared(_) => Vec::new(),
        }
    }
}

async fn write_table<T: Transport>(
    context: &mut WriteContext<T>,
    points: &[Point],
    transport: &T,
    do_transmit: bool,
    stats: &mut BatchStats,
) -> Result<()> {
    for point in points {
        match context.append(point) {
            Ok(()) => {}
            Err(e) if e.is_value_error() => {
                warn!(error = %e, "Dropping row");
                stats.dropped_rows += 1;
            }
            Err(e) => return Err(e),
        }
    }

    let Some(record) = context.flush()? else {
        return Ok(());
    };
    let rows = record.num_rows() as u64;
    stats.row_count += rows;
    stats.metric_count += rows * record.num_columns() as u64;

    if do_transmit {
        match context.transmit(transport, record).await {
            Ok(affected) => debug!(table = %context.table(), rows, affected, "Transmitted record"),
            Err(e) => {
                error!(table = %context.table(), rows, error = %e, "Failed to transmit record");
                stats.transmit_errors += 1;
            }
        }
    }
    Ok(())
}

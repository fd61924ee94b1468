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

//! Per-table columnar encoding and the statement that inserts it

use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{Schema, SchemaRef};
use dashmap::DashMap;
use snafu::{ensure, OptionExt, ResultExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::column::{ColumnAppend, ColumnBuilder, ColumnSchema, ColumnType, Scalar};
use crate::config::TableLayout;
use crate::creator::execute_idempotent;
use crate::error::{self, Result};
use crate::point::Point;
use crate::transport::Transport;

/// Name of the time index column every table starts with.
pub const TIMESTAMP_COLUMN: &str = "ts";

/// Builder state of one table.
///
/// The schema is fixed by the first point seen for the table: the timestamp
/// column first, then every column of that point in order. The insert
/// statement is prepared on first transmission and closed by [`Self::close`].
pub struct WriteContext<T: Transport> {
    table: String,
    columns: Vec<ColumnSchema>,
    schema: SchemaRef,
    builders: Vec<ColumnBuilder>,
    rows: usize,
    row_capacity: usize,
    partition_columns: Vec<String>,
    partitions: usize,
    prepared: Option<T::Prepared>,
    closed: bool,
}

fn parse_value<'a>(table: &str, column: &ColumnSchema, text: &'a str) -> Result<Scalar<'a>> {
    column
        .column_type
        .parse(text)
        .context(error::ParseValueSnafu {
            table,
            column: &column.name,
            value: text,
            data_type: column.column_type.sql_type(),
        })
}

impl<T: Transport> WriteContext<T> {
    pub fn new(table: &str, sample: &Point, layout: &TableLayout) -> Self {
        let mut columns = Vec::with_capacity(sample.column_count() + 1);
        columns.push(ColumnSchema::new(
            TIMESTAMP_COLUMN,
            ColumnType::TimestampNanosecond,
            false,
        ));
        columns.extend(
            sample
                .columns()
                .map(|f| ColumnSchema::new(&f.name, f.data_type.into(), true)),
        );

        let schema = Arc::new(Schema::new(
            columns
                .iter()
                .map(ColumnSchema::to_arrow_field)
                .collect::<Vec<_>>(),
        ));
        let builders = columns
            .iter()
            .map(|c| c.column_type.builder(layout.row_capacity))
            .collect();

        Self {
            table: table.to_string(),
            columns,
            schema,
            builders,
            rows: 0,
            row_capacity: layout.row_capacity,
            partition_columns: layout.partition_by.columns(table).to_vec(),
            partitions: layout.partitions,
            prepared: None,
            closed: false,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Rows appended since the last flush.
    pub fn buffered_rows(&self) -> usize {
        self.rows
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn create_table_sql(&self) -> String {
        let mut defs = Vec::with_capacity(self.columns.len() + 1);
        for column in &self.columns {
            if column.name == TIMESTAMP_COLUMN {
                defs.push(format!(
                    "{} {} NOT NULL DEFAULT CURRENT_TIMESTAMP",
                    column.name,
                    column.column_type.sql_type()
                ));
            } else {
                defs.push(format!("{} {}", column.name, column.column_type.sql_type()));
            }
        }
        defs.push(format!("timestamp key({TIMESTAMP_COLUMN})"));

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            defs.join(", ")
        );
        if !self.partition_columns.is_empty() {
            sql.push_str(&format!(
                " PARTITION BY HASH({}) PARTITIONS {}",
                self.partition_columns.join(", "),
                self.partitions
            ));
        }
        sql.push_str(" ENGINE=TimeSeries");
        sql
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let params = vec!["?"; self.columns.len()];
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            names.join(", "),
            params.join(", ")
        )
    }

    /// Append one point as a row.
    ///
    /// Every value is converted before anything is appended, so a value that
    /// fails to convert leaves the builders untouched. A point whose column
    /// count differs from the schema is rejected with a fatal error.
    pub fn append(&mut self, point: &Point) -> Result<()> {
        ensure!(
            !self.closed,
            error::IllegalClientStateSnafu {
                err_msg: format!("write context of table {} is closed", self.table),
            }
        );
        ensure!(
            point.column_count() + 1 == self.columns.len(),
            error::SchemaAritySnafu {
                table: &self.table,
                expected: self.columns.len(),
                actual: point.column_count() + 1,
            }
        );

        let mut values = Vec::with_capacity(self.columns.len());
        values.push(Some(parse_value(
            &self.table,
            &self.columns[0],
            &point.timestamp,
        )?));
        for (column, field) in self.columns[1..].iter().zip(point.columns()) {
            let value = match field.value.as_deref() {
                Some(text) => Some(parse_value(&self.table, column, text)?),
                None => None,
            };
            values.push(value);
        }

        for (builder, value) in self.builders.iter_mut().zip(values) {
            builder.append_scalar(value);
        }
        self.rows += 1;
        Ok(())
    }

    /// Finish the buffered rows into one record and reset the builders.
    /// Returns `None` when nothing is buffered.
    pub fn flush(&mut self) -> Result<Option<RecordBatch>> {
        if self.rows == 0 {
            return Ok(None);
        }
        let arrays: Vec<ArrayRef> = self
            .builders
            .iter_mut()
            .map(ColumnAppend::finish_column)
            .collect();
        self.rows = 0;
        RecordBatch::try_new(self.schema.clone(), arrays)
            .context(error::CreateRecordBatchSnafu)
            .map(Some)
    }

    /// Create the table and prepare the insert statement, once.
    pub async fn ensure_remote(&mut self, transport: &T) -> Result<()> {
        if self.prepared.is_some() {
            return Ok(());
        }
        execute_idempotent(transport, &self.create_table_sql()).await?;

        let sql = self.insert_sql();
        let prepared = transport.prepare(&sql).await?;
        info!(table = %self.table, sql = %sql, "Prepared insert statement");
        self.prepared = Some(prepared);
        Ok(())
    }

    /// Send a flushed record through the prepared insert statement.
    pub async fn transmit(&mut self, transport: &T, record: RecordBatch) -> Result<u64> {
        self.ensure_remote(transport).await?;
        let prepared = self
            .prepared
            .as_ref()
            .context(error::IllegalClientStateSnafu {
                err_msg: format!("no prepared statement for table {}", self.table),
            })?;
        transport.execute_prepared(prepared, record).await
    }

    /// Release builder memory and close the prepared statement. Closing
    /// twice is a no-op.
    pub async fn close(&mut self, transport: &T) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.rows > 0 {
            debug!(table = %self.table, rows = self.rows, "Discarding unflushed rows on close");
        }
        self.rows = 0;
        self.builders = Vec::new();
        if let Some(prepared) = self.prepared.take() {
            transport.close(prepared).await?;
        }
        debug!(table = %self.table, "Closed write context");
        Ok(())
    }

    pub fn row_capacity(&self) -> usize {
        self.row_capacity
    }
}

/// Write contexts shared by every worker, used when routing does not pin a
/// table to a single worker.
///
/// Creation is atomic per table; remote setup and transmission run under the
/// per-table lock.
pub struct SharedContexts<T: Transport> {
    contexts: DashMap<String, Arc<Mutex<WriteContext<T>>>>,
    layout: Arc<TableLayout>,
}

impl<T: Transport> SharedContexts<T> {
    pub fn new(layout: Arc<TableLayout>) -> Self {
        Self {
            contexts: DashMap::new(),
            layout,
        }
    }

    /// Context of the sample's table, created from the sample on first sight.
    pub fn get_or_create(&self, sample: &Point) -> Arc<Mutex<WriteContext<T>>> {
        let entry = self
            .contexts
            .entry(sample.measurement.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(WriteContext::new(
                    &sample.measurement,
                    sample,
                    &self.layout,
                )))
            });
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Close and forget every context. Every context is attempted; the first
    /// failure is returned.
    pub async fn close(&self, transport: &T) -> Result<()> {
        let contexts: Vec<_> = self
            .contexts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.contexts.clear();

        let mut result = Ok(());
        for context in contexts {
            let mut context = context.lock().await;
            if let Err(e) = context.close(transport).await {
                error!(table = %context.table(), error = %e, "Failed to close write context");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

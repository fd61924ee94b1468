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

use std::future::Future;

use arrow_array::RecordBatch;

use crate::Result;

/// Remote columnar query service the write path and the query runner talk to.
///
/// Every call is a suspension point. Implementations are shared by all
/// workers, so they must be usable through `&self`.
pub trait Transport: Send + Sync + 'static {
    /// Statement bound to positional parameters.
    type Prepared: Send + Sync;

    /// Execute a statement and drain its whole result.
    fn execute(&self, sql: &str) -> impl Future<Output = Result<Vec<RecordBatch>>> + Send;

    fn prepare(&self, sql: &str) -> impl Future<Output = Result<Self::Prepared>> + Send;

    /// Bind `record` as the parameters of `prepared` and execute it. Returns
    /// the affected row count.
    fn execute_prepared(
        &self,
        prepared: &Self::Prepared,
        record: RecordBatch,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn close(&self, prepared: Self::Prepared) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicBool, Ordering};

    use arrow_schema::ArrowError;
    use parking_lot::Mutex;
    use snafu::IntoError;

    use super::*;
    use crate::error;

    /// Calls observed by [`RecordingTransport`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Execute(String),
        Prepare(String),
        ExecutePrepared { statement: usize, rows: usize },
        Close(usize),
    }

    /// In-memory transport recording every call.
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        calls: Mutex<Vec<Call>>,
        statements: Mutex<Vec<String>>,
        results: Mutex<Vec<RecordBatch>>,
        fail_inserts: AtomicBool,
        fail_queries: AtomicBool,
        table_exists: AtomicBool,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_inserts(&self, fail: bool) {
            self.fail_inserts.store(fail, Ordering::SeqCst);
        }

        pub fn fail_queries(&self, fail: bool) {
            self.fail_queries.store(fail, Ordering::SeqCst);
        }

        /// Batches returned by every `SELECT`.
        pub fn respond_with(&self, batches: Vec<RecordBatch>) {
            *self.results.lock() = batches;
        }

        /// Answer `CREATE` statements with an "already exists" error.
        pub fn tables_exist(&self, exists: bool) {
            self.table_exists.store(exists, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub fn statement(&self, id: usize) -> String {
            self.statements.lock()[id].clone()
        }

        pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.lock().iter().filter(|c| pred(c)).count()
        }
    }

    impl Transport for RecordingTransport {
        type Prepared = usize;

        async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>> {
            self.calls.lock().push(Call::Execute(sql.to_string()));
            if sql.starts_with("CREATE") && self.table_exists.load(Ordering::SeqCst) {
                return Err(error::FlightSqlSnafu { stage: "execute" }.into_error(
                    ArrowError::ExternalError("object already exists".to_string().into()),
                ));
            }
            if sql.starts_with("SELECT") || sql.starts_with("WITH") {
                if self.fail_queries.load(Ordering::SeqCst) {
                    return Err(error::FlightSqlSnafu { stage: "execute" }
                        .into_error(ArrowError::ComputeError("query timed out".to_string())));
                }
                return Ok(self.results.lock().clone());
            }
            Ok(Vec::new())
        }

        async fn prepare(&self, sql: &str) -> Result<usize> {
            self.calls.lock().push(Call::Prepare(sql.to_string()));
            let mut statements = self.statements.lock();
            statements.push(sql.to_string());
            Ok(statements.len() - 1)
        }

        async fn execute_prepared(&self, prepared: &usize, record: RecordBatch) -> Result<u64> {
            self.calls.lock().push(Call::ExecutePrepared {
                statement: *prepared,
                rows: record.num_rows(),
            });
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(error::FlightSqlSnafu { stage: "insert" }
                    .into_error(ArrowError::ComputeError("connection reset".to_string())));
            }
            Ok(record.num_rows() as u64)
        }

        async fn close(&self, prepared: usize) -> Result<()> {
            self.calls.lock().push(Call::Close(prepared));
            Ok(())
        }
    }
}

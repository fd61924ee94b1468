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

use std::sync::Arc;

use tracing::info;

use crate::transport::Transport;
use crate::Result;

/// Execute a DDL statement, treating "already exists" as success.
pub async fn execute_idempotent<T: Transport>(transport: &T, sql: &str) -> Result<()> {
    match transport.execute(sql).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => {
            info!(statement = sql, "Object already exists, skipping");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Creates the benchmark database before loading.
pub struct DbCreator<T> {
    transport: Arc<T>,
}

impl<T: Transport> DbCreator<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub async fn create_database(&self, name: &str) -> Result<()> {
        execute_idempotent(self.transport.as_ref(), &format!("CREATE DATABASE {name}")).await?;
        info!(database = name, "Database is ready");
        Ok(())
    }
}

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
use std::time::Duration;

use arrow_array::RecordBatch;
use arrow_flight::sql::client::{FlightSqlServiceClient, PreparedStatement};
use futures::TryStreamExt;
use snafu::ResultExt;
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::error;
use crate::transport::Transport;
use crate::Result;

const DATABASE_HEADER: &str = "database";

/// Connection options of a Datalayers Flight SQL endpoint.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// `host:port`, or a full `http://` / `https://` url.
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: crate::config::DEFAULT_ENDPOINT.to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientOptions {
    fn url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// Prepared statement handle shared by the clones of a client.
pub type PreparedHandle = Arc<Mutex<PreparedStatement<Channel>>>;

/// Flight SQL client. Cloning is cheap and clones share the channel.
#[derive(Debug, Clone)]
pub struct FlightSqlClient {
    inner: FlightSqlServiceClient<Channel>,
    database: Option<String>,
}

impl FlightSqlClient {
    /// Connect and, when credentials are given, authenticate with a basic handshake.
    pub async fn connect(options: &ClientOptions) -> Result<Self> {
        let url = options.url();
        let endpoint = Endpoint::from_shared(url.clone())
            .context(error::InvalidEndpointSnafu { endpoint: &url })?
            .connect_timeout(options.connect_timeout);
        let channel = endpoint.connect().await.context(error::CreateChannelSnafu)?;
        let mut inner = FlightSqlServiceClient::new(channel);

        if let (Some(username), Some(password)) = (&options.username, &options.password) {
            inner
                .handshake(username, password)
                .await
                .context(error::HandshakeSnafu { username })?;
        }
        debug!(endpoint = %url, "Connected to Flight SQL endpoint");

        Ok(Self {
            inner,
            database: None,
        })
    }

    /// A client that only dials the endpoint on its first call. No handshake
    /// is made.
    pub fn connect_lazy(options: &ClientOptions) -> Result<Self> {
        let url = options.url();
        let channel = Endpoint::from_shared(url.clone())
            .context(error::InvalidEndpointSnafu { endpoint: &url })?
            .connect_timeout(options.connect_timeout)
            .connect_lazy();
        Ok(Self {
            inner: FlightSqlServiceClient::new(channel),
            database: None,
        })
    }

    /// A client whose statements run against `database`.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        let database = database.into();
        let mut inner = self.inner.clone();
        inner.set_header(DATABASE_HEADER, &database);
        Self {
            inner,
            database: Some(database),
        }
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl Transport for FlightSqlClient {
    type Prepared = PreparedHandle;

    async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let mut client = self.inner.clone();
        let info = client
            .execute(sql.to_string(), None)
            .await
            .context(error::FlightSqlSnafu { stage: "execute" })?;

        let mut batches = Vec::new();
        for endpoint in info.endpoint {
            let Some(ticket) = endpoint.ticket else {
                continue;
            };
            let stream = client
                .do_get(ticket)
                .await
                .context(error::FlightSqlSnafu { stage: "fetch" })?;
            let mut fetched: Vec<RecordBatch> = stream
                .try_collect()
                .await
                .context(error::FlightStreamSnafu)?;
            batches.append(&mut fetched);
        }
        Ok(batches)
    }

    async fn prepare(&self, sql: &str) -> Result<PreparedHandle> {
        let mut client = self.inner.clone();
        let prepared = client
            .prepare(sql.to_string(), None)
            .await
            .context(error::FlightSqlSnafu { stage: "prepare" })?;
        Ok(Arc::new(Mutex::new(prepared)))
    }

    async fn execute_prepared(&self, prepared: &PreparedHandle, record: RecordBatch) -> Result<u64> {
        let mut prepared = prepared.lock().await;
        prepared
            .set_parameters(record)
            .context(error::FlightSqlSnafu { stage: "bind" })?;
        let affected = prepared
            .execute_update()
            .await
            .context(error::FlightSqlSnafu { stage: "insert" })?;
        Ok(affected.max(0) as u64)
    }

    async fn close(&self, prepared: PreparedHandle) -> Result<()> {
        let prepared = Arc::try_unwrap(prepared).map_err(|_| {
            error::IllegalClientStateSnafu {
                err_msg: "prepared statement is still in use",
            }
            .build()
        })?;
        prepared
            .into_inner()
            .close()
            .await
            .context(error::FlightSqlSnafu { stage: "close" })
    }
}

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

use std::io;

use arrow_flight::error::FlightError;
use arrow_schema::ArrowError;
use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid config, {}", msg))]
    InvalidConfig {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Malformed line: {}", reason))]
    MalformedLine {
        reason: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Type tag count mismatch: {} type tags for {} key=value pairs",
        tags,
        pairs
    ))]
    TypeTagMismatch {
        tags: usize,
        pairs: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Unknown type tag: {:?}", tag))]
    UnknownTypeTag {
        tag: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to scan input after line {}", line))]
    ScanIo {
        line: u64,
        source: io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Failed to encode point for table {}: schema has {} columns, point has {}",
        table,
        expected,
        actual
    ))]
    SchemaArity {
        table: String,
        expected: usize,
        actual: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Failed to encode value {:?} of column {}.{} as {}",
        value,
        table,
        column,
        data_type
    ))]
    ParseValue {
        table: String,
        column: String,
        value: String,
        data_type: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to create Arrow RecordBatch"))]
    CreateRecordBatch {
        #[snafu(source)]
        error: ArrowError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid endpoint: {}", endpoint))]
    InvalidEndpoint {
        endpoint: String,
        source: tonic::transport::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to create gRPC channel"))]
    CreateChannel {
        #[snafu(implicit)]
        location: Location,
        source: tonic::transport::Error,
    },

    #[snafu(display("Failed to authenticate as {}", username))]
    Handshake {
        username: String,
        #[snafu(source)]
        error: ArrowError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to transmit {}: {}", stage, error))]
    FlightSql {
        stage: String,
        #[snafu(source)]
        error: ArrowError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to read flight stream: {}", error))]
    FlightStream {
        #[snafu(source)]
        error: FlightError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Illegal client state: {}", err_msg))]
    IllegalClientState {
        err_msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Worker {} stopped before input was exhausted", worker))]
    WorkerStopped {
        worker: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Pipeline task failed"))]
    Join {
        source: tokio::task::JoinError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid query parameters, {}", msg))]
    InvalidQueryParams {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("IO error on {}", path))]
    Io {
        path: String,
        source: io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to serde Json"))]
    SerdeJson {
        #[snafu(source)]
        error: serde_json::error::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

const ALREADY_EXISTS: &str = "already exists";

impl Error {
    /// Whether the error comes from a malformed wire line. Such lines are
    /// dropped and scanning continues.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedLine { .. } | Self::TypeTagMismatch { .. } | Self::UnknownTypeTag { .. }
        )
    }

    /// Whether the error is a value that could not be converted to its column type.
    pub fn is_value_error(&self) -> bool {
        matches!(self, Self::ParseValue { .. })
    }

    /// Indicate if the error must abort the whole load.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ScanIo { .. } | Self::SchemaArity { .. } | Self::InvalidConfig { .. }
        )
    }

    /// Whether the server rejected a DDL statement because the object exists.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::FlightSql { error, .. } => error.to_string().contains(ALREADY_EXISTS),
            Self::FlightStream { error, .. } => error.to_string().contains(ALREADY_EXISTS),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use snafu::IntoError;

    use super::*;

    #[test]
    fn test_already_exists_is_matched_on_flight_errors() {
        let exists = FlightSqlSnafu {
            stage: "create table cpu",
        }
        .into_error(ArrowError::ExternalError(
            "table cpu already exists".to_string().into(),
        ));
        assert!(exists.is_already_exists());
        assert!(!exists.is_fatal());

        let other = FlightSqlSnafu { stage: "prepare" }
            .into_error(ArrowError::ComputeError("connection reset".to_string()));
        assert!(!other.is_already_exists());
    }

    #[test]
    fn test_error_classes() {
        let format = TypeTagMismatchSnafu { tags: 2usize, pairs: 3usize }.build();
        assert!(format.is_format_error());
        assert!(!format.is_fatal());

        let arity = SchemaAritySnafu {
            table: "cpu",
            expected: 3usize,
            actual: 2usize,
        }
        .build();
        assert!(arity.is_fatal());
        assert!(arity.to_string().contains("table cpu"));
    }
}

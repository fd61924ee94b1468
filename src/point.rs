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

//! Point data model shared by the wire codec, the scanner and the write path

use std::fmt;
use std::str::FromStr;

use snafu::OptionExt;

use crate::error::{self, Error};

/// Textual marker for a null value on the wire.
pub const NULL_SENTINEL: &str = "nil";

/// Type tag attached to every key=value pair of a wire line.
///
/// The discriminants are the integers written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Null = 0,
    Bool = 1,
    Int32 = 2,
    Int64 = 3,
    Float32 = 4,
    Float64 = 5,
    Binary = 6,
    String = 7,
}

impl FieldType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Null,
            1 => Self::Bool,
            2 => Self::Int32,
            3 => Self::Int64,
            4 => Self::Float32,
            5 => Self::Float64,
            6 => Self::Binary,
            7 => Self::String,
            _ => return None,
        })
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u8>()
            .ok()
            .and_then(Self::from_tag)
            .context(error::UnknownTypeTagSnafu { tag: s })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One named, typed column value of a point. `None` is the null value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub data_type: FieldType,
    pub value: Option<String>,
}

impl Field {
    pub fn new<N, V>(name: N, data_type: FieldType, value: Option<V>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            data_type,
            value: value.map(Into::into),
        }
    }

    /// The value as written on the wire.
    pub fn wire_value(&self) -> &str {
        self.value.as_deref().unwrap_or(NULL_SENTINEL)
    }
}

/// A single observation of a measurement.
///
/// Tags and fields are both plain ordered columns; tags come first. Points
/// decoded from the wire carry all columns in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Point {
    pub measurement: String,
    /// Nanoseconds since the epoch, kept as text until it reaches a column builder.
    pub timestamp: String,
    pub tags: Vec<Field>,
    pub fields: Vec<Field>,
}

impl Point {
    pub fn new<M: Into<String>>(measurement: M, timestamp: i64) -> Self {
        Self {
            measurement: measurement.into(),
            timestamp: timestamp.to_string(),
            ..Default::default()
        }
    }

    /// Add a tag column
    pub fn add_tag<N: Into<String>, V: Into<String>>(
        mut self,
        name: N,
        data_type: FieldType,
        value: Option<V>,
    ) -> Self {
        self.tags.push(Field::new(name, data_type, value));
        self
    }

    /// Add a field column
    pub fn add_field<N: Into<String>, V: Into<String>>(
        mut self,
        name: N,
        data_type: FieldType,
        value: Option<V>,
    ) -> Self {
        self.fields.push(Field::new(name, data_type, value));
        self
    }

    /// All columns in wire order, tags first.
    pub fn columns(&self) -> impl Iterator<Item = &Field> {
        self.tags.iter().chain(self.fields.iter())
    }

    pub fn column_count(&self) -> usize {
        self.tags.len() + self.fields.len()
    }

    /// A point without tags and fields carries no data and is never written.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.fields.is_empty()
    }
}

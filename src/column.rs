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

//! Column types and the Arrow builders behind them
//!
//! The type of every column is resolved once, when a table schema is derived
//! from its first point. Appending then goes through [`ColumnBuilder`], whose
//! variants are dispatched statically with `enum_dispatch`.

use std::sync::Arc;

use arrow_array::builder::{
    ArrayBuilder, BinaryBuilder, BooleanBuilder, Float32Builder, Float64Builder, Int32Builder,
    Int64Builder, StringBuilder, TimestampNanosecondBuilder,
};
use arrow_array::ArrayRef;
use arrow_schema::{DataType, Field as ArrowField, TimeUnit};
use enum_dispatch::enum_dispatch;

use crate::point::FieldType;

/// Column types a table can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Null,
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Binary,
    String,
    TimestampNanosecond,
}

impl From<FieldType> for ColumnType {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Null => Self::Null,
            FieldType::Bool => Self::Boolean,
            FieldType::Int32 => Self::Int32,
            FieldType::Int64 => Self::Int64,
            FieldType::Float32 => Self::Float32,
            FieldType::Float64 => Self::Float64,
            FieldType::Binary => Self::Binary,
            FieldType::String => Self::String,
        }
    }
}

/// A parsed value ready to be appended to a builder of the same type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Binary(&'a [u8]),
    String(&'a str),
    Timestamp(i64),
}

impl ColumnType {
    pub fn arrow_type(self) -> DataType {
        match self {
            Self::Boolean => DataType::Boolean,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
            Self::Binary => DataType::Binary,
            Self::Null | Self::String => DataType::Utf8,
            Self::TimestampNanosecond => DataType::Timestamp(TimeUnit::Nanosecond, None),
        }
    }

    /// Type name used in `CREATE TABLE`.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Null | Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Float32 => "FLOAT32",
            Self::Float64 => "FLOAT64",
            Self::Binary => "BINARY",
            Self::TimestampNanosecond => "TIMESTAMP(9)",
        }
    }

    /// Convert wire text into a scalar of this type. `None` when the text is
    /// not a valid value of the type.
    pub fn parse(self, text: &str) -> Option<Scalar<'_>> {
        Some(match self {
            Self::Null => Scalar::Null,
            Self::Boolean => Scalar::Boolean(text == "true"),
            Self::Int32 => Scalar::Int32(text.parse().ok()?),
            Self::Int64 => Scalar::Int64(text.parse().ok()?),
            Self::Float32 => Scalar::Float32(text.parse().ok()?),
            Self::Float64 => Scalar::Float64(text.parse().ok()?),
            Self::Binary => Scalar::Binary(text.as_bytes()),
            Self::String => Scalar::String(text),
            Self::TimestampNanosecond => Scalar::Timestamp(text.parse().ok()?),
        })
    }

    /// Create a builder for this type with room for `capacity` rows.
    pub fn builder(self, capacity: usize) -> ColumnBuilder {
        match self {
            Self::Boolean => BooleanBuilder::with_capacity(capacity).into(),
            Self::Int32 => Int32Builder::with_capacity(capacity).into(),
            Self::Int64 => Int64Builder::with_capacity(capacity).into(),
            Self::Float32 => Float32Builder::with_capacity(capacity).into(),
            Self::Float64 => Float64Builder::with_capacity(capacity).into(),
            Self::Binary => BinaryBuilder::with_capacity(capacity, capacity * 64).into(),
            Self::Null => StringBuilder::new().into(),
            Self::String => StringBuilder::with_capacity(capacity, capacity * 64).into(),
            Self::TimestampNanosecond => TimestampNanosecondBuilder::with_capacity(capacity).into(),
        }
    }
}

/// Column definition of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new<N: Into<String>>(name: N, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }

    pub fn to_arrow_field(&self) -> ArrowField {
        ArrowField::new(&self.name, self.column_type.arrow_type(), self.nullable)
    }
}

/// Appending side of a column builder
#[enum_dispatch]
pub trait ColumnAppend {
    /// Append a value produced by [`ColumnType::parse`] of the same type, or a
    /// null for `None`.
    fn append_scalar(&mut self, value: Option<Scalar<'_>>);

    /// Finish the accumulated values into an array and reset the builder.
    fn finish_column(&mut self) -> ArrayRef;

    fn rows(&self) -> usize;
}

#[enum_dispatch(ColumnAppend)]
pub enum ColumnBuilder {
    BooleanBuilder,
    Int32Builder,
    Int64Builder,
    Float32Builder,
    Float64Builder,
    BinaryBuilder,
    StringBuilder,
    TimestampNanosecondBuilder,
}

// Generate ColumnAppend implementations for builders taking a copied value
macro_rules! impl_column_append {
    ($builder_type:ty, $variant:ident) => {
        impl ColumnAppend for $builder_type {
            fn append_scalar(&mut self, value: Option<Scalar<'_>>) {
                match value {
                    Some(Scalar::$variant(v)) => self.append_value(v),
                    _ => self.append_null(),
                }
            }

            fn finish_column(&mut self) -> ArrayRef {
                Arc::new(self.finish())
            }

            fn rows(&self) -> usize {
                ArrayBuilder::len(self)
            }
        }
    };
}

impl_column_append!(BooleanBuilder, Boolean);
impl_column_append!(Int32Builder, Int32);
impl_column_append!(Int64Builder, Int64);
impl_column_append!(Float32Builder, Float32);
impl_column_append!(Float64Builder, Float64);
impl_column_append!(BinaryBuilder, Binary);
impl_column_append!(StringBuilder, String);
impl_column_append!(TimestampNanosecondBuilder, Timestamp);

#[cfg(test)]
mod tests {
    use arrow_array::{Array, BooleanArray, Int64Array, StringArray, TimestampNanosecondArray};

    use super::*;

    #[test]
    fn test_parse_conversions() {
        assert_eq!(ColumnType::Int64.parse("58"), Some(Scalar::Int64(58)));
        assert_eq!(ColumnType::Int32.parse("-3"), Some(Scalar::Int32(-3)));
        assert_eq!(ColumnType::Float64.parse("2.5"), Some(Scalar::Float64(2.5)));
        assert_eq!(ColumnType::Boolean.parse("true"), Some(Scalar::Boolean(true)));
        assert_eq!(ColumnType::Boolean.parse("TRUE"), Some(Scalar::Boolean(false)));
        assert_eq!(ColumnType::Binary.parse("ab"), Some(Scalar::Binary(b"ab")));
        assert_eq!(
            ColumnType::TimestampNanosecond.parse("1451606400000000000"),
            Some(Scalar::Timestamp(1451606400000000000))
        );
        assert_eq!(ColumnType::Int64.parse("1.5"), None);
        assert_eq!(ColumnType::Int32.parse("99999999999"), None);
        assert_eq!(ColumnType::Float32.parse("abc"), None);
        assert_eq!(ColumnType::TimestampNanosecond.parse("now"), None);
    }

    #[test]
    fn test_builders_finish_and_reset() {
        let mut ints = ColumnType::Int64.builder(4);
        ints.append_scalar(ColumnType::Int64.parse("1"));
        ints.append_scalar(None);
        ints.append_scalar(ColumnType::Int64.parse("3"));
        assert_eq!(ints.rows(), 3);

        let array = ints.finish_column();
        let array = array.as_any().downcast_ref::<Int64Array>().expect("int64 array");
        assert_eq!(array.len(), 3);
        assert!(array.is_null(1));
        assert_eq!(array.value(2), 3);
        assert_eq!(ints.rows(), 0);

        let mut strings = ColumnType::String.builder(2);
        strings.append_scalar(ColumnType::String.parse("host_0"));
        let array = strings.finish_column();
        let array = array.as_any().downcast_ref::<StringArray>().expect("string array");
        assert_eq!(array.value(0), "host_0");

        let mut flags = ColumnType::Boolean.builder(1);
        flags.append_scalar(ColumnType::Boolean.parse("true"));
        let array = flags.finish_column();
        let array = array.as_any().downcast_ref::<BooleanArray>().expect("boolean array");
        assert!(array.value(0));

        let mut ts = ColumnType::TimestampNanosecond.builder(1);
        ts.append_scalar(ColumnType::TimestampNanosecond.parse("7"));
        let array = ts.finish_column();
        let array = array
            .as_any()
            .downcast_ref::<TimestampNanosecondArray>()
            .expect("timestamp array");
        assert_eq!(array.value(0), 7);
    }

    #[test]
    fn test_null_column() {
        let mut nulls = ColumnType::Null.builder(2);
        nulls.append_scalar(ColumnType::Null.parse("anything"));
        nulls.append_scalar(None);
        let array = nulls.finish_column();
        assert_eq!(array.len(), 2);
        assert_eq!(array.null_count(), 2);
        // Same type the DDL declares.
        assert_eq!(ColumnType::Null.sql_type(), "STRING");
        assert_eq!(array.data_type(), &DataType::Utf8);
        assert_eq!(ColumnType::Null.arrow_type(), DataType::Utf8);
    }

    #[test]
    fn test_field_type_mapping() {
        assert_eq!(ColumnType::from(FieldType::Bool), ColumnType::Boolean);
        assert_eq!(ColumnType::from(FieldType::String).arrow_type(), DataType::Utf8);
        assert_eq!(ColumnType::from(FieldType::Float32).sql_type(), "FLOAT32");
    }
}

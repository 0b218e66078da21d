//! Typed access to Arrow columns of the indexer's artifact tables.
//!
//! Artifacts are written by different indexer versions, so readers accept
//! every physical encoding a logical value has been stored as: identifiers
//! as strings or integers, levels as integers or floats, lists as any of the
//! three Arrow list layouts.

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_schema::DataType;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A table is the ordered list of batches it was read as.
pub type Table = Vec<RecordBatch>;

pub fn num_rows(table: &[RecordBatch]) -> usize {
    table.iter().map(RecordBatch::num_rows).sum()
}

/// Column lookup scoped to one batch of a named table.
pub struct Columns<'a> {
    table: &'a str,
    batch: &'a RecordBatch,
}

impl<'a> Columns<'a> {
    pub fn new(table: &'a str, batch: &'a RecordBatch) -> Self {
        Self { table, batch }
    }

    pub fn required(&self, name: &'a str) -> Result<Column<'a>> {
        self.optional(name).ok_or_else(|| {
            Error::validation(format!(
                "table '{}' is missing required column '{}'",
                self.table, name
            ))
        })
    }

    pub fn optional(&self, name: &'a str) -> Option<Column<'a>> {
        self.batch
            .column_by_name(name)
            .map(|array| Column { table: self.table, name, array: array.as_ref() })
    }

    /// Every column of the batch, in schema order.
    pub fn all(&self) -> Vec<Column<'a>> {
        self.batch
            .schema_ref()
            .fields()
            .iter()
            .zip(self.batch.columns())
            .map(|(field, array)| Column { table: self.table, name: field.name(), array: array.as_ref() })
            .collect()
    }
}

#[derive(Clone, Copy)]
pub struct Column<'a> {
    table: &'a str,
    name: &'a str,
    array: &'a dyn Array,
}

impl<'a> Column<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.array.is_null(row)
    }

    fn unsupported(&self) -> Error {
        Error::validation(format!(
            "column '{}' in table '{}' has unsupported type {}",
            self.name,
            self.table,
            self.array.data_type()
        ))
    }

    fn bad_value(&self, row: usize, what: &str) -> Error {
        Error::validation(format!(
            "column '{}' in table '{}' row {}: {}",
            self.name, self.table, row, what
        ))
    }

    fn child<'b>(&self, array: &'b dyn Array) -> Column<'b>
    where
        'a: 'b,
    {
        Column { table: self.table, name: self.name, array }
    }

    fn raw_str(&self, row: usize) -> Option<&'a str> {
        match self.array.data_type() {
            DataType::Utf8 => Some(self.array.as_string::<i32>().value(row)),
            DataType::LargeUtf8 => Some(self.array.as_string::<i64>().value(row)),
            DataType::Utf8View => Some(self.array.as_string_view().value(row)),
            _ => None,
        }
    }

    pub fn string(&self, row: usize) -> Result<Option<String>> {
        if self.array.is_null(row) {
            return Ok(None);
        }
        if let Some(s) = self.raw_str(row) {
            return Ok(Some(s.to_string()));
        }
        if self.array.data_type().is_integer() {
            return Ok(self.integer(row)?.map(|v| v.to_string()));
        }
        Err(self.unsupported())
    }

    pub fn required_string(&self, row: usize) -> Result<String> {
        self.string(row)?.ok_or_else(|| self.bad_value(row, "unexpected null"))
    }

    pub fn integer(&self, row: usize) -> Result<Option<i64>> {
        if self.array.is_null(row) {
            return Ok(None);
        }
        let a = self.array;
        let value = match a.data_type() {
            DataType::Int8 => i64::from(a.as_primitive::<Int8Type>().value(row)),
            DataType::Int16 => i64::from(a.as_primitive::<Int16Type>().value(row)),
            DataType::Int32 => i64::from(a.as_primitive::<Int32Type>().value(row)),
            DataType::Int64 => a.as_primitive::<Int64Type>().value(row),
            DataType::UInt8 => i64::from(a.as_primitive::<UInt8Type>().value(row)),
            DataType::UInt16 => i64::from(a.as_primitive::<UInt16Type>().value(row)),
            DataType::UInt32 => i64::from(a.as_primitive::<UInt32Type>().value(row)),
            DataType::UInt64 => i64::try_from(a.as_primitive::<UInt64Type>().value(row))
                .map_err(|_| self.bad_value(row, "integer out of range"))?,
            DataType::Float32 | DataType::Float64 => {
                let Some(v) = self.float(row)? else { return Ok(None) };
                // pandas writes nullable integer columns as floats with NaN holes
                if v.is_nan() {
                    return Ok(None);
                }
                if v.fract() != 0.0 || !v.is_finite() {
                    return Err(self.bad_value(row, "expected an integral value"));
                }
                v as i64
            }
            _ => match self.raw_str(row) {
                Some(s) => s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| self.bad_value(row, "expected an integer"))?,
                None => return Err(self.unsupported()),
            },
        };
        Ok(Some(value))
    }

    pub fn required_integer(&self, row: usize) -> Result<i64> {
        self.integer(row)?.ok_or_else(|| self.bad_value(row, "unexpected null"))
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn float(&self, row: usize) -> Result<Option<f64>> {
        if self.array.is_null(row) {
            return Ok(None);
        }
        let a = self.array;
        let value = match a.data_type() {
            DataType::Float32 => f64::from(a.as_primitive::<Float32Type>().value(row)),
            DataType::Float64 => a.as_primitive::<Float64Type>().value(row),
            dt if dt.is_integer() => match self.integer(row)? {
                Some(v) => v as f64,
                None => return Ok(None),
            },
            _ => match self.raw_str(row) {
                Some(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| self.bad_value(row, "expected a number"))?,
                None => return Err(self.unsupported()),
            },
        };
        Ok(Some(value))
    }

    fn list_items(&self, row: usize) -> Result<Option<ArrayRef>> {
        if self.array.is_null(row) {
            return Ok(None);
        }
        let items = match self.array.data_type() {
            DataType::List(_) => self.array.as_list::<i32>().value(row),
            DataType::LargeList(_) => self.array.as_list::<i64>().value(row),
            DataType::FixedSizeList(_, _) => self.array.as_fixed_size_list().value(row),
            _ => return Err(self.unsupported()),
        };
        Ok(Some(items))
    }

    /// A list of identifiers. A plain string cell is read as a one-element list.
    pub fn strings(&self, row: usize) -> Result<Vec<String>> {
        if self.array.is_null(row) {
            return Ok(Vec::new());
        }
        if let Some(s) = self.raw_str(row) {
            return Ok(vec![s.to_string()]);
        }
        let Some(items) = self.list_items(row)? else { return Ok(Vec::new()) };
        let inner = self.child(items.as_ref());
        let mut out = Vec::with_capacity(items.len());
        for i in 0..items.len() {
            if let Some(s) = inner.string(i)? {
                out.push(s);
            }
        }
        Ok(out)
    }

    /// An embedding vector; null cells are `None`, null elements are rejected.
    #[allow(clippy::cast_possible_truncation)]
    pub fn floats(&self, row: usize) -> Result<Option<Vec<f32>>> {
        let Some(items) = self.list_items(row)? else { return Ok(None) };
        let inner = self.child(items.as_ref());
        let mut out = Vec::with_capacity(items.len());
        for i in 0..items.len() {
            let v = inner
                .float(i)?
                .ok_or_else(|| self.bad_value(row, "null element in vector"))?;
            out.push(v as f32);
        }
        Ok(Some(out))
    }

    /// The cell as a JSON scalar, array or object.
    pub fn value(&self, row: usize) -> Result<Value> {
        let a = self.array;
        if a.is_null(row) {
            return Ok(Value::Null);
        }
        let value = match a.data_type() {
            DataType::Null => Value::Null,
            DataType::Boolean => Value::Bool(a.as_boolean().value(row)),
            DataType::UInt64 => Value::from(a.as_primitive::<UInt64Type>().value(row)),
            dt if dt.is_integer() => self.integer(row)?.map_or(Value::Null, Value::from),
            DataType::Float32 | DataType::Float64 => self
                .float(row)?
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
                self.raw_str(row).map_or(Value::Null, |s| Value::String(s.to_string()))
            }
            DataType::List(_) | DataType::LargeList(_) | DataType::FixedSizeList(_, _) => {
                let Some(items) = self.list_items(row)? else { return Ok(Value::Null) };
                let inner = self.child(items.as_ref());
                let values = (0..items.len()).map(|i| inner.value(i)).collect::<Result<Vec<_>>>()?;
                Value::Array(values)
            }
            DataType::Struct(fields) => {
                let s = a.as_struct();
                let mut map = Map::new();
                for (field, child) in fields.iter().zip(s.columns()) {
                    map.insert(field.name().clone(), self.child(child.as_ref()).value(row)?);
                }
                Value::Object(map)
            }
            _ => return Err(self.unsupported()),
        };
        Ok(value)
    }
}

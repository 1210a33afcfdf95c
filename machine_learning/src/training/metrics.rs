use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{
    Serialize, Serializer,
    ser::{SerializeMap, SerializeSeq},
};

/// A single metric cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Time(SystemTime),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Time(t) => write!(f, "{:.6}", seconds_since_epoch(t)),
        }
    }
}

fn seconds_since_epoch(t: &SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Times are written as fractional seconds since the unix epoch.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Time(t) => serializer.serialize_f64(seconds_since_epoch(t)),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<SystemTime> for Value {
    fn from(value: SystemTime) -> Self {
        Self::Time(value)
    }
}

/// An ordered set of named metric values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Vec<(String, Value)>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing its value if it was already set.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();

        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }

        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Accumulates metric records in emission order.
#[derive(Debug, Clone, Default)]
pub struct MetricLog {
    records: Vec<Record>,
}

impl MetricLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Builds a table out of the logged records, leaving the log untouched.
    pub fn to_table(&self) -> Table {
        Table::from_records(self.records.iter())
    }

    pub fn into_table(self) -> Table {
        self.to_table()
    }
}

/// A rectangular view of metric records.
///
/// The columns are the union of every record's fields in first seen order and
/// each row holds `None` wherever its record lacked a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<Value>>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut table = Self::new();

        for record in records {
            let mut row = vec![None; table.columns.len()];
            for (key, value) in record.iter() {
                let col = table.column_index_or_insert(key);
                if col == row.len() {
                    row.push(None);
                }
                row[col] = Some(value.clone());
            }
            table.rows.push(row);
        }

        table.pad_rows();
        table
    }

    /// Returns the index of `name`, adding it as the last column if it's new.
    /// Rows are not padded.
    fn column_index_or_insert(&mut self, name: &str) -> usize {
        match self.columns.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                self.columns.push(name.to_string());
                self.columns.len() - 1
            }
        }
    }

    fn pad_rows(&mut self) {
        let width = self.columns.len();
        self.rows.iter_mut().for_each(|row| row.resize(width, None));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    /// Returns every cell of a column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&Value>>> {
        let col = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[col].as_ref()).collect())
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == name)?;
        self.rows.get(row)?[col].as_ref()
    }

    /// Sets `name` to `value` on every row, adding the column if needed.
    pub fn with_constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let col = self.column_index_or_insert(name);
        self.pad_rows();

        for row in &mut self.rows {
            row[col] = Some(value.clone());
        }

        self
    }

    /// Stacks tables on top of each other, joining their columns.
    pub fn concat<I: IntoIterator<Item = Table>>(tables: I) -> Self {
        let mut out = Self::new();

        for table in tables {
            let mapping: Vec<_> = table
                .columns
                .iter()
                .map(|c| out.column_index_or_insert(c))
                .collect();
            out.pad_rows();

            for row in table.rows {
                let mut new_row = vec![None; out.columns.len()];
                for (cell, &col) in row.into_iter().zip(&mapping) {
                    new_row[col] = cell;
                }
                out.rows.push(new_row);
            }
        }

        out
    }

    /// Renders the table as a JSON list of records.
    ///
    /// # Errors
    /// Returns a `serde_json` error if a float can't be represented.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

struct RowRef<'a> {
    columns: &'a [String],
    row: &'a [Option<Value>],
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let present = self.row.iter().filter(|c| c.is_some()).count();
        let mut map = serializer.serialize_map(Some(present))?;

        for (name, cell) in self.columns.iter().zip(self.row) {
            if let Some(value) = cell {
                map.serialize_entry(name, value)?;
            }
        }

        map.end()
    }
}

/// Serialized as a list of records, omitting empty cells.
impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;

        for row in &self.rows {
            seq.serialize_element(&RowRef {
                columns: &self.columns,
                row,
            })?;
        }

        seq.end()
    }
}

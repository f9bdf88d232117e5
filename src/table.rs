//! Columnar table with Parquet persistence.
//!
//! Every pipeline stage exchanges data through [`Table`], a thin columnar
//! container backed by Arrow on disk. Columns are nullable and typed as
//! 64-bit integers, 64-bit floats, or UTF-8 text; narrower Parquet types
//! are widened on read.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::errors::PipelineError;

/// Column payload. All variants store one `Option` per row, `None` marking
/// a missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Int(v) => v.len(),
            Values::Float(v) => v.len(),
            Values::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Values::Int(_) => "int",
            Values::Float(_) => "float",
            Values::Text(_) => "text",
        }
    }

    fn select(&self, indices: &[usize]) -> Values {
        match self {
            Values::Int(v) => Values::Int(indices.iter().map(|&i| v[i]).collect()),
            Values::Float(v) => Values::Float(indices.iter().map(|&i| v[i]).collect()),
            Values::Text(v) => Values::Text(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Gather rows through an optional index, yielding `None` where the
    /// index is absent. Used by the left join for unmatched rows.
    fn take_rows(&self, rows: &[Option<usize>]) -> Values {
        match self {
            Values::Int(v) => Values::Int(rows.iter().map(|r| r.and_then(|i| v[i])).collect()),
            Values::Float(v) => Values::Float(rows.iter().map(|r| r.and_then(|i| v[i])).collect()),
            Values::Text(v) => {
                Values::Text(rows.iter().map(|r| r.and_then(|i| v[i].clone())).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Values,
}

impl Column {
    pub fn int(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self {
            name: name.into(),
            values: Values::Int(values),
        }
    }

    pub fn float(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: Values::Float(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: Values::Text(values),
        }
    }
}

/// In-memory columnar table. Column order is preserved and significant:
/// it drives the Parquet schema and the feature ordering downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, PipelineError> {
        let num_rows = columns.first().map_or(0, |c| c.values.len());
        for column in &columns {
            if column.values.len() != num_rows {
                return Err(PipelineError::Schema(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    num_rows
                )));
            }
        }
        Ok(Self { columns, num_rows })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), PipelineError> {
        if !self.columns.is_empty() && column.values.len() != self.num_rows {
            return Err(PipelineError::Schema(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.values.len(),
                self.num_rows
            )));
        }
        if self.has_column(&column.name) {
            return Err(PipelineError::Schema(format!(
                "column '{}' already exists",
                column.name
            )));
        }
        if self.columns.is_empty() {
            self.num_rows = column.values.len();
        }
        self.columns.push(column);
        Ok(())
    }

    /// Remove a column by name. Returns whether the column existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        self.columns.len() != before
    }

    /// Swap a column for a replacement of the same length, keeping its
    /// position. The replacement may carry a different name and type.
    pub fn replace_column(&mut self, name: &str, replacement: Column) -> Result<(), PipelineError> {
        if replacement.values.len() != self.num_rows {
            return Err(PipelineError::Schema(format!(
                "replacement for '{}' has {} rows, expected {}",
                name,
                replacement.values.len(),
                self.num_rows
            )));
        }
        let position = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| PipelineError::Schema(format!("column '{name}' not found")))?;
        self.columns[position] = replacement;
        Ok(())
    }

    pub fn int_column(&self, name: &str) -> Result<&[Option<i64>], PipelineError> {
        match self.column(name) {
            Some(Column {
                values: Values::Int(v),
                ..
            }) => Ok(v),
            Some(column) => Err(PipelineError::Schema(format!(
                "column '{}' is {}, expected int",
                name,
                column.values.type_name()
            ))),
            None => Err(PipelineError::Schema(format!("column '{name}' not found"))),
        }
    }

    pub fn float_column(&self, name: &str) -> Result<&[Option<f64>], PipelineError> {
        match self.column(name) {
            Some(Column {
                values: Values::Float(v),
                ..
            }) => Ok(v),
            Some(column) => Err(PipelineError::Schema(format!(
                "column '{}' is {}, expected float",
                name,
                column.values.type_name()
            ))),
            None => Err(PipelineError::Schema(format!("column '{name}' not found"))),
        }
    }

    /// Read a column as floats, widening integers. Text columns are a
    /// schema error.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>, PipelineError> {
        match self.column(name) {
            Some(Column {
                values: Values::Float(v),
                ..
            }) => Ok(v.clone()),
            Some(Column {
                values: Values::Int(v),
                ..
            }) => Ok(v.iter().map(|x| x.map(|x| x as f64)).collect()),
            Some(Column {
                values: Values::Text(_),
                ..
            }) => Err(PipelineError::Schema(format!(
                "column '{name}' is text, expected numeric"
            ))),
            None => Err(PipelineError::Schema(format!("column '{name}' not found"))),
        }
    }

    /// Names of int and float columns in table order.
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !matches!(c.values, Values::Text(_)))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Replace missing values in a float column with a constant.
    pub fn fill_null_floats(&mut self, name: &str, fill: f64) -> Result<(), PipelineError> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| PipelineError::Schema(format!("column '{name}' not found")))?;
        match &mut column.values {
            Values::Float(v) => {
                for value in v.iter_mut() {
                    if value.is_none() {
                        *value = Some(fill);
                    }
                }
                Ok(())
            }
            other => Err(PipelineError::Schema(format!(
                "column '{}' is {}, expected float",
                name,
                other.type_name()
            ))),
        }
    }

    /// Build a new table containing the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c.values.select(indices),
            })
            .collect();
        Table {
            columns,
            num_rows: indices.len(),
        }
    }

    /// Left join on an integer key column. Every left row is kept; rows
    /// without a match carry nulls in the joined columns. Keys on the
    /// right side must be unique.
    pub fn left_join(&self, right: &Table, key: &str) -> Result<Table, PipelineError> {
        let left_keys = self.int_column(key)?;
        let right_keys = right.int_column(key)?;

        let mut index: HashMap<i64, usize> = HashMap::with_capacity(right_keys.len());
        for (row, id) in right_keys.iter().enumerate() {
            if let Some(id) = id {
                if index.insert(*id, row).is_some() {
                    return Err(PipelineError::Schema(format!(
                        "duplicate key {id} in join column '{key}'"
                    )));
                }
            }
        }

        let matches: Vec<Option<usize>> = left_keys
            .iter()
            .map(|id| id.and_then(|id| index.get(&id).copied()))
            .collect();

        let mut columns = self.columns.clone();
        for column in &right.columns {
            if column.name == key {
                continue;
            }
            if self.has_column(&column.name) {
                return Err(PipelineError::Schema(format!(
                    "column '{}' exists on both sides of the join",
                    column.name
                )));
            }
            columns.push(Column {
                name: column.name.clone(),
                values: column.values.take_rows(&matches),
            });
        }
        Table::from_columns(columns)
    }

    /// Load a table from a Parquet file, widening Int32/Float32 columns
    /// to their 64-bit counterparts.
    pub fn read_parquet(path: &Path) -> Result<Table, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let reader = builder.build()?;

        let mut table = Table::with_schema(&schema)?;
        for batch in reader {
            table.append_batch(&batch?)?;
        }
        Ok(table)
    }

    /// Write the table to a Parquet file. The write is atomic: data goes
    /// to a temporary sibling first and is renamed into place, so readers
    /// never observe a half-written file.
    pub fn write_parquet(&self, path: &Path) -> Result<(), PipelineError> {
        if self.columns.is_empty() {
            return Err(PipelineError::Schema(
                "cannot write a table with no columns".to_string(),
            ));
        }
        let batch = self.to_record_batch()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("parquet.tmp");
        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn with_schema(schema: &Schema) -> Result<Table, PipelineError> {
        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let values = match field.data_type() {
                DataType::Int32 | DataType::Int64 => Values::Int(Vec::new()),
                DataType::Float32 | DataType::Float64 => Values::Float(Vec::new()),
                DataType::Utf8 => Values::Text(Vec::new()),
                other => {
                    return Err(PipelineError::Schema(format!(
                        "column '{}' has unsupported type {other}",
                        field.name()
                    )));
                }
            };
            columns.push(Column {
                name: field.name().clone(),
                values,
            });
        }
        Ok(Table {
            columns,
            num_rows: 0,
        })
    }

    fn append_batch(&mut self, batch: &RecordBatch) -> Result<(), PipelineError> {
        for (idx, column) in self.columns.iter_mut().enumerate() {
            let array = batch.column(idx);
            match &mut column.values {
                Values::Int(values) => match array.data_type() {
                    DataType::Int64 => {
                        let array = downcast::<Int64Array>(array, &column.name)?;
                        for i in 0..array.len() {
                            values.push((!array.is_null(i)).then(|| array.value(i)));
                        }
                    }
                    DataType::Int32 => {
                        let array = downcast::<Int32Array>(array, &column.name)?;
                        for i in 0..array.len() {
                            values.push((!array.is_null(i)).then(|| array.value(i) as i64));
                        }
                    }
                    other => {
                        return Err(PipelineError::Schema(format!(
                            "column '{}' changed type to {other} mid-file",
                            column.name
                        )));
                    }
                },
                Values::Float(values) => match array.data_type() {
                    DataType::Float64 => {
                        let array = downcast::<Float64Array>(array, &column.name)?;
                        for i in 0..array.len() {
                            values.push((!array.is_null(i)).then(|| array.value(i)));
                        }
                    }
                    DataType::Float32 => {
                        let array = downcast::<Float32Array>(array, &column.name)?;
                        for i in 0..array.len() {
                            values.push((!array.is_null(i)).then(|| array.value(i) as f64));
                        }
                    }
                    other => {
                        return Err(PipelineError::Schema(format!(
                            "column '{}' changed type to {other} mid-file",
                            column.name
                        )));
                    }
                },
                Values::Text(values) => {
                    let array = downcast::<StringArray>(array, &column.name)?;
                    for i in 0..array.len() {
                        values.push((!array.is_null(i)).then(|| array.value(i).to_string()));
                    }
                }
            }
        }
        self.num_rows += batch.num_rows();
        Ok(())
    }

    fn to_record_batch(&self) -> Result<RecordBatch, PipelineError> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            match &column.values {
                Values::Int(v) => {
                    fields.push(Field::new(&column.name, DataType::Int64, true));
                    arrays.push(Arc::new(Int64Array::from(v.clone())));
                }
                Values::Float(v) => {
                    fields.push(Field::new(&column.name, DataType::Float64, true));
                    arrays.push(Arc::new(Float64Array::from(v.clone())));
                }
                Values::Text(v) => {
                    fields.push(Field::new(&column.name, DataType::Utf8, true));
                    arrays.push(Arc::new(StringArray::from(v.clone())));
                }
            }
        }
        let schema = Arc::new(Schema::new(fields));
        Ok(RecordBatch::try_new(schema, arrays)?)
    }
}

fn downcast<'a, T: 'static>(
    array: &'a dyn Array,
    name: &str,
) -> Result<&'a T, PipelineError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| PipelineError::Schema(format!("column '{name}' has unexpected array type")))
}

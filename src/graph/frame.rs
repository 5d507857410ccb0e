use std::collections::HashMap;

use candle_core::{Result, Tensor};

use crate::error::GraphError;

/// Named tensors sharing a leading dimension of `num_rows`.
#[derive(Debug, Clone)]
pub struct Frame {
    num_rows: usize,
    columns: HashMap<String, Tensor>,
}
impl Frame {
    pub fn new(num_rows: usize) -> Self {
        Self {
            num_rows,
            columns: HashMap::new(),
        }
    }
    pub fn len(&self) -> usize {
        self.columns.len()
    }
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Inserts (or replaces) a column, returning the previous value.
    pub fn insert(&mut self, name: &str, value: Tensor) -> Result<Option<Tensor>> {
        let rows = value.dims().first().copied().unwrap_or(0);
        if rows != self.num_rows {
            return Err(GraphError::RowMismatch {
                name: name.to_owned(),
                expected: self.num_rows,
                actual: rows,
            }
            .into());
        }
        Ok(self.columns.insert(name.to_owned(), value))
    }
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.columns
            .get(name)
            .ok_or_else(|| GraphError::MissingField(name.to_owned()).into())
    }
    pub fn remove(&mut self, name: &str) -> Result<Tensor> {
        self.columns
            .remove(name)
            .ok_or_else(|| GraphError::MissingField(name.to_owned()).into())
    }
}

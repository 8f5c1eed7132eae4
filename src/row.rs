use std::collections::HashMap;
use std::sync::Arc;

use crate::column::Column;
use crate::decode::FromValue;
use crate::error::{Error, Result};
use crate::value::Value;

/// One row of a result set.
///
/// Values can be addressed by ordinal or by column name. When a result set
/// carries duplicate column names, later occurrences are addressable with a
/// numeric suffix: `x`, `x1`, `x2`, ...
#[derive(Debug, Clone)]
pub struct Row {
    pub(crate) columns: Arc<Vec<Column>>,
    pub(crate) column_names: Arc<HashMap<String, usize>>,
    pub(crate) values: Vec<Value>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The value at `ordinal`, or `None` when out of bounds.
    pub fn get_index(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }

    pub fn try_get_index(&self, ordinal: usize) -> Result<&Value> {
        self.values
            .get(ordinal)
            .ok_or(Error::ColumnIndexOutOfBounds {
                index: ordinal,
                len: self.values.len(),
            })
    }

    /// The value under `name` (with duplicate-name suffixing applied), or
    /// `None` when the result set has no such column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.column_names
            .get(name)
            .and_then(|&ordinal| self.values.get(ordinal))
    }

    pub fn try_get(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| Error::ColumnNotFound(name.into()))
    }

    /// Iterate over `(name, value)` pairs in column order. Names are the
    /// disambiguated names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().zip(&self.values).map(move |(column, value)| {
            let name = self
                .column_names
                .iter()
                .find(|(_, &ordinal)| ordinal == column.ordinal)
                .map(|(name, _)| name.as_str())
                .unwrap_or_else(|| column.name());

            (name, value)
        })
    }

    /// The value under `name`, converted via [`FromValue`].
    ///
    /// ```no_run
    /// # fn demo(row: &myna::Row) -> myna::Result<()> {
    /// let id: u64 = row.get_as("id")?;
    /// let note: Option<String> = row.get_as("note")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_as<T>(&self, name: &str) -> Result<T>
    where
        T: FromValue,
    {
        T::from_value(self.try_get(name)?)
    }

    /// The value at `ordinal`, converted via [`FromValue`].
    pub fn get_index_as<T>(&self, ordinal: usize) -> Result<T>
    where
        T: FromValue,
    {
        T::from_value(self.try_get_index(ordinal)?)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Build the name lookup table for a column list, suffixing duplicates with
/// `1`, `2`, ... in order of appearance.
pub(crate) fn disambiguated_names(columns: &[Column]) -> HashMap<String, usize> {
    let mut names: HashMap<String, usize> = HashMap::with_capacity(columns.len());

    for column in columns {
        let name = column.name();

        if !names.contains_key(name) {
            names.insert(name.to_owned(), column.ordinal);
            continue;
        }

        let mut suffix = 1_usize;
        loop {
            let candidate = format!("{}{}", name, suffix);
            if !names.contains_key(&candidate) {
                names.insert(candidate, column.ordinal);
                break;
            }
            suffix += 1;
        }
    }

    names
}

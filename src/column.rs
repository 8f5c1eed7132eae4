use crate::protocol::text::{ColumnDefinition, ColumnFlags, ColumnType};

/// The character set id MySQL uses for raw binary data.
pub(crate) const BINARY_COLLATION: u16 = 63;

/// Metadata for one column of a result set.
#[derive(Debug, Clone)]
pub struct Column {
    pub(crate) ordinal: usize,
    pub(crate) name: String,
    pub(crate) org_name: String,
    pub(crate) table: String,
    pub(crate) org_table: String,
    pub(crate) schema: String,
    pub(crate) catalog: String,
    pub(crate) char_set: u16,
    pub(crate) max_size: u32,
    pub(crate) r#type: ColumnType,
    pub(crate) flags: ColumnFlags,
    pub(crate) decimals: u8,
}

impl Column {
    pub(crate) fn from_definition(ordinal: usize, def: ColumnDefinition) -> Self {
        Self {
            ordinal,
            name: def.display_name().to_owned(),
            org_name: def.name,
            table: def.table_alias,
            org_table: def.table,
            schema: def.schema,
            catalog: def.catalog,
            char_set: def.char_set,
            max_size: def.max_size,
            r#type: def.r#type,
            flags: def.flags,
            decimals: def.decimals,
        }
    }

    /// Position of the column in the result set, starting at 0.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The column name or alias as it appears in the result set.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the column before aliasing.
    pub fn origin_name(&self) -> &str {
        &self.org_name
    }

    /// The table name or alias, empty for computed columns.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The schema (database) name, empty for computed columns.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn type_info(&self) -> ColumnType {
        self.r#type
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED)
    }

    pub fn is_nullable(&self) -> bool {
        !self.flags.contains(ColumnFlags::NOT_NULL)
    }

    /// True when the column holds raw bytes rather than text.
    pub fn is_binary(&self) -> bool {
        self.char_set == BINARY_COLLATION
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        ordinal: usize,
        name: &str,
        r#type: ColumnType,
        flags: ColumnFlags,
    ) -> Self {
        Self {
            ordinal,
            name: name.to_owned(),
            org_name: name.to_owned(),
            table: String::new(),
            org_table: String::new(),
            schema: String::new(),
            catalog: "def".to_owned(),
            char_set: if matches!(
                r#type,
                ColumnType::TinyBlob | ColumnType::MediumBlob | ColumnType::LongBlob | ColumnType::Blob
            ) {
                BINARY_COLLATION
            } else {
                45
            },
            max_size: 0,
            r#type,
            flags,
            decimals: 0,
        }
    }
}

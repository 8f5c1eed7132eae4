use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, Decode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/group__group__cs__column__definition__flags.html
// https://mariadb.com/kb/en/result-set-packets/#field-details-flag
bitflags::bitflags! {
    pub struct ColumnFlags: u16 {
        /// Field can't be NULL.
        const NOT_NULL = 1;

        /// Field is part of a primary key.
        const PRIMARY_KEY = 2;

        /// Field is part of a unique key.
        const UNIQUE_KEY = 4;

        /// Field is part of a nonunique key.
        const MULTIPLE_KEY = 8;

        /// Field is a blob.
        const BLOB = 16;

        /// Field is unsigned.
        const UNSIGNED = 32;

        /// Field is zerofill.
        const ZEROFILL = 64;

        /// Field is binary.
        const BINARY = 128;

        /// Field is an enumeration.
        const ENUM = 256;

        /// Field is an auto-increment field.
        const AUTO_INCREMENT = 512;

        /// Field is a timestamp.
        const TIMESTAMP = 1024;

        /// Field is a set.
        const SET = 2048;

        /// Field does not have a default value.
        const NO_DEFAULT_VALUE = 4096;

        /// Field is set to NOW on UPDATE.
        const ON_UPDATE_NOW = 8192;

        /// Field is a number.
        const NUM = 32768;
    }
}

/// Type code of a column, as used in both result-set metadata and the binary
/// protocol.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/field__types_8h.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0a,
    Time = 0x0b,
    Datetime = 0x0c,
    Year = 0x0d,
    VarChar = 0x0f,
    Bit = 0x10,
    Json = 0xf5,
    NewDecimal = 0xf6,
    Enum = 0xf7,
    Set = 0xf8,
    TinyBlob = 0xf9,
    MediumBlob = 0xfa,
    LongBlob = 0xfb,
    Blob = 0xfc,
    VarString = 0xfd,
    String = 0xfe,
    Geometry = 0xff,
}

impl ColumnType {
    pub(crate) fn try_from_u16(id: u16) -> Result<Self> {
        Ok(match id {
            0x00 => ColumnType::Decimal,
            0x01 => ColumnType::Tiny,
            0x02 => ColumnType::Short,
            0x03 => ColumnType::Long,
            0x04 => ColumnType::Float,
            0x05 => ColumnType::Double,
            0x06 => ColumnType::Null,
            0x07 => ColumnType::Timestamp,
            0x08 => ColumnType::LongLong,
            0x09 => ColumnType::Int24,
            0x0a => ColumnType::Date,
            0x0b => ColumnType::Time,
            0x0c => ColumnType::Datetime,
            0x0d => ColumnType::Year,

            // not a real column type; 0x0e (newdate) and 0x0f only appear
            // in the binary log, but we map 0x0f anyway
            0x0f => ColumnType::VarChar,

            0x10 => ColumnType::Bit,
            0xf5 => ColumnType::Json,
            0xf6 => ColumnType::NewDecimal,
            0xf7 => ColumnType::Enum,
            0xf8 => ColumnType::Set,
            0xf9 => ColumnType::TinyBlob,
            0xfa => ColumnType::MediumBlob,
            0xfb => ColumnType::LongBlob,
            0xfc => ColumnType::Blob,
            0xfd => ColumnType::VarString,
            0xfe => ColumnType::String,
            0xff => ColumnType::Geometry,

            _ => {
                return Err(err_protocol!("unknown column type 0x{:02X}", id));
            }
        })
    }

    /// Name as it would appear in `information_schema`.
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Decimal | ColumnType::NewDecimal => "DECIMAL",
            ColumnType::Tiny => "TINYINT",
            ColumnType::Short => "SMALLINT",
            ColumnType::Long => "INT",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Null => "NULL",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::LongLong => "BIGINT",
            ColumnType::Int24 => "MEDIUMINT",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::Datetime => "DATETIME",
            ColumnType::Year => "YEAR",
            ColumnType::VarChar | ColumnType::VarString => "VARCHAR",
            ColumnType::Bit => "BIT",
            ColumnType::Json => "JSON",
            ColumnType::Enum => "ENUM",
            ColumnType::Set => "SET",
            ColumnType::TinyBlob => "TINYBLOB",
            ColumnType::MediumBlob => "MEDIUMBLOB",
            ColumnType::LongBlob => "LONGBLOB",
            ColumnType::Blob => "BLOB",
            ColumnType::String => "CHAR",
            ColumnType::Geometry => "GEOMETRY",
        }
    }
}

/// Column metadata as sent on the wire ahead of a result set (and for the
/// parameters of a prepared statement).
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query_response_text_resultset_column_definition.html>
#[derive(Debug, Clone)]
pub(crate) struct ColumnDefinition {
    pub(crate) catalog: String,
    pub(crate) schema: String,
    pub(crate) table_alias: String,
    pub(crate) table: String,
    pub(crate) alias: String,
    pub(crate) name: String,
    pub(crate) char_set: u16,
    pub(crate) max_size: u32,
    pub(crate) r#type: ColumnType,
    pub(crate) flags: ColumnFlags,
    pub(crate) decimals: u8,
}

impl ColumnDefinition {
    /// The name to report for this column: the alias when one is set,
    /// otherwise the origin column name.
    pub(crate) fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}

impl Decode<'_> for ColumnDefinition {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        // catalog : string<lenenc> (always "def")
        let catalog = buf.get_str_lenenc()?;

        let schema = buf.get_str_lenenc()?;
        let table_alias = buf.get_str_lenenc()?;
        let table = buf.get_str_lenenc()?;
        let alias = buf.get_str_lenenc()?;
        let name = buf.get_str_lenenc()?;

        // length of fixed fields : int<lenenc> (always 0x0C)
        let fixed_len = buf.get_uint_lenenc()?;
        if fixed_len != 0x0c {
            return Err(err_protocol!(
                "expected 0x0C for the fixed-length field count of a column definition; got 0x{:02X}",
                fixed_len
            ));
        }

        let char_set = buf.get_u16_le();
        let max_size = buf.get_u32_le();
        let type_id = buf.get_u8();
        let flags = ColumnFlags::from_bits_truncate(buf.get_u16_le());
        let decimals = buf.get_u8();

        Ok(Self {
            catalog,
            schema,
            table_alias,
            table,
            alias,
            name,
            char_set,
            max_size,
            r#type: ColumnType::try_from_u16(type_id.into())?,
            flags,
            decimals,
        })
    }
}

use bytes::{Buf, Bytes};

use crate::column::Column;
use crate::error::Result;
use crate::io::{BufExt, Decode};

/// One row of a text-protocol result set: per column, either the NULL marker
/// (`0xFB`) or a length-encoded string.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query_response_text_resultset_row.html>
#[derive(Debug)]
pub(crate) struct TextRow(pub(crate) Vec<Option<Bytes>>);

impl<'de> Decode<'de, &'de [Column]> for TextRow {
    fn decode_with(mut buf: Bytes, columns: &'de [Column]) -> Result<Self> {
        let mut values = Vec::with_capacity(columns.len());

        for _ in columns {
            if buf.first() == Some(&0xfb) {
                buf.advance(1);
                values.push(None);
            } else {
                values.push(Some(buf.get_bytes_lenenc()?));
            }
        }

        Ok(Self(values))
    }
}

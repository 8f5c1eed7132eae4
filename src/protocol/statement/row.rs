use bytes::{Buf, Bytes};

use crate::column::Column;
use crate::error::{err_protocol, Result};
use crate::io::{BufExt, Decode};
use crate::protocol::text::ColumnType;

/// One row of a binary-protocol result set.
///
/// The header byte is `0x00`, followed by a NULL bitmap with a 2-bit offset,
/// followed by the non-NULL values in column order. Fixed-width values carry
/// no length; date/time values carry a 1-byte length; everything else is
/// length-encoded.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_binary_resultset.html#sect_protocol_binary_resultset_row>
#[derive(Debug)]
pub(crate) struct BinaryRow(pub(crate) Vec<Option<Bytes>>);

impl<'de> Decode<'de, &'de [Column]> for BinaryRow {
    fn decode_with(mut buf: Bytes, columns: &'de [Column]) -> Result<Self> {
        let header = buf.get_u8();
        if header != 0x00 {
            return Err(err_protocol!(
                "expected 0x00 (binary row) but found 0x{:02X}",
                header
            ));
        }

        // NULL bitmap : byte<(column_count + 7 + 2) / 8>
        let null_bitmap = buf.get_bytes((columns.len() + 9) / 8)?;

        let mut values = Vec::with_capacity(columns.len());

        for (i, column) in columns.iter().enumerate() {
            // the first two bits of the bitmap are reserved
            let bit = i + 2;

            if null_bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
                values.push(None);
                continue;
            }

            let value = match column.type_info() {
                ColumnType::Null => Bytes::new(),

                ColumnType::Tiny => buf.get_bytes(1)?,
                ColumnType::Short | ColumnType::Year => buf.get_bytes(2)?,
                ColumnType::Long | ColumnType::Int24 | ColumnType::Float => buf.get_bytes(4)?,
                ColumnType::LongLong | ColumnType::Double => buf.get_bytes(8)?,

                // a 1-byte length followed by that many bytes; the length
                // alone carries meaning (0 = zero date, 4 = date only, ...)
                // so we keep only the contents and let the decoder key off
                // the content length
                ColumnType::Date
                | ColumnType::Time
                | ColumnType::Datetime
                | ColumnType::Timestamp => {
                    let len = usize::from(buf.get_u8());
                    buf.get_bytes(len)?
                }

                _ => buf.get_bytes_lenenc()?,
            };

            values.push(Some(value));
        }

        Ok(Self(values))
    }
}

#[cfg(test)]
mod tests {
    use super::BinaryRow;
    use crate::column::Column;
    use crate::io::Decode;
    use crate::protocol::text::{ColumnFlags, ColumnType};
    use bytes::Bytes;

    #[test]
    fn it_decodes_fixed_and_lenenc_values() {
        let columns = vec![
            Column::for_test(0, "a", ColumnType::Long, ColumnFlags::empty()),
            Column::for_test(1, "b", ColumnType::VarString, ColumnFlags::empty()),
            Column::for_test(2, "c", ColumnType::Tiny, ColumnFlags::empty()),
        ];

        // header, bitmap (bit 3 => column 1 is NULL), LONG 5, TINY 1
        let mut payload = vec![0x00_u8, 0b0000_1000];
        payload.extend_from_slice(&5_u32.to_le_bytes());
        payload.push(1);

        let row = BinaryRow::decode_with(Bytes::from(payload), &columns).unwrap();

        assert_eq!(row.0[0].as_deref(), Some(&5_u32.to_le_bytes()[..]));
        assert_eq!(row.0[1], None);
        assert_eq!(row.0[2].as_deref(), Some(&[1_u8][..]));
    }

    #[test]
    fn it_decodes_datetime_lengths() {
        let columns = vec![
            Column::for_test(0, "d", ColumnType::Datetime, ColumnFlags::empty()),
            Column::for_test(1, "z", ColumnType::Date, ColumnFlags::empty()),
        ];

        // DATETIME with the 4-byte (date-only) form, DATE with the zero form
        let mut payload = vec![0x00_u8, 0b0000_0000, 4];
        payload.extend_from_slice(&2024_u16.to_le_bytes());
        payload.extend_from_slice(&[2, 29]);
        payload.push(0);

        let row = BinaryRow::decode_with(Bytes::from(payload), &columns).unwrap();

        assert_eq!(row.0[0].as_deref(), Some(&[232, 7, 2, 29][..]));
        assert_eq!(row.0[1].as_deref(), Some(&[][..]));
    }
}

use bytes::BufMut;

use crate::io::Encode;
use crate::protocol::Capabilities;
use crate::value::Value;

/// Execute a prepared statement with a set of bound parameters.
///
/// We always send the parameter types (`new_params_bound_flag = 1`); the
/// extra handful of bytes is not worth tracking whether the server has seen
/// the types for this statement id before.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_execute.html>
#[derive(Debug)]
pub(crate) struct ComStmtExecute<'a> {
    pub(crate) statement_id: u32,
    pub(crate) params: &'a [Value],
}

impl Encode<'_, Capabilities> for ComStmtExecute<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.push(0x17); // COM_STMT_EXECUTE

        // statement_id : int<4>
        buf.put_u32_le(self.statement_id);

        // flags (no cursor) : int<1>
        buf.push(0x00);

        // iteration count (always 1) : int<4>
        buf.put_u32_le(1);

        if !self.params.is_empty() {
            // NULL bitmap : byte<(param_count + 7) / 8>
            let mut null_bitmap = vec![0_u8; (self.params.len() + 7) / 8];

            for (i, param) in self.params.iter().enumerate() {
                if param.is_null() {
                    null_bitmap[i / 8] |= 1 << (i % 8);
                }
            }

            buf.extend_from_slice(&null_bitmap);

            // new_params_bound_flag : int<1>
            buf.push(0x01);

            // parameter types : (int<1> type, int<1> flags) per parameter
            for param in self.params {
                let (ty, unsigned) = param.param_type();

                buf.push(ty as u8);
                buf.push(if unsigned { 0x80 } else { 0x00 });
            }

            // parameter values, binary-encoded, NULLs absent
            for param in self.params {
                param.encode_binary(buf);
            }
        }
    }
}

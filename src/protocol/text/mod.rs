mod column;
mod init_db;
mod ping;
mod query;
mod quit;
mod reset;
mod row;

pub(crate) use column::ColumnDefinition;
pub(crate) use init_db::ComInitDb;
pub(crate) use ping::ComPing;
pub(crate) use query::ComQuery;
pub(crate) use quit::ComQuit;
pub(crate) use reset::ComResetConnection;
pub(crate) use row::TextRow;

pub use column::{ColumnFlags, ColumnType};

//! Error and Result types.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::io;

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxDynError = Box<dyn StdError + Send + Sync + 'static>;

/// Represents all the ways a method can fail within this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error in the configuration or the connection URL.
    #[error("error with configuration: {0}")]
    Configuration(#[source] BoxDynError),

    /// Error communicating with the server.
    #[error("error communicating with the server: {0}")]
    Io(#[from] io::Error),

    /// Error occurred while attempting to establish a TLS connection.
    #[error("error during TLS upgrade: {0}")]
    Tls(#[source] BoxDynError),

    /// Error occurred while attempting to establish the connection. Wraps the
    /// underlying cause; [`Error::code`] exposes the server error code when
    /// the server rejected the connection itself (e.g. `1040`, `1045`).
    #[error("error connecting to the server: {0}")]
    Connect(#[source] BoxDynError),

    /// Unexpected or invalid data encountered while communicating with the
    /// server. This would indicate a bug in this crate or in the server.
    #[error("encountered unexpected or invalid data: {0}")]
    Protocol(String),

    /// An error was returned by the server during the authentication exchange.
    #[error("error during authentication: {0}")]
    Auth(#[source] Box<ServerError>),

    /// An error was returned by the server while executing a command.
    #[error(transparent)]
    Server(#[from] Box<ServerError>),

    /// No idle connection was available and the waiter cap was reached.
    #[error("pool exhausted: too many pending acquires")]
    PoolExhausted,

    /// The configured acquire timeout elapsed while waiting for a connection.
    #[error("timed out while waiting for an open connection")]
    PoolTimedOut,

    /// [`Pool::close`][crate::Pool::close] was called while the operation was
    /// waiting, or the operation was attempted after close.
    #[error("attempted to acquire a connection on a closed pool")]
    PoolClosed,

    /// An operation was attempted on a transaction handle after
    /// `commit` or `rollback`.
    #[error("transaction is closed (already committed or rolled back)")]
    TransactionClosed,

    /// An operation was attempted on a prepared statement after `close`.
    #[error("prepared statement is closed")]
    StatementClosed,

    /// No rows were returned by a query expected to return at least one row.
    #[error("no rows returned by a query that expected to return at least one row")]
    RowNotFound,

    /// Column was not found by name in a [`Row`][crate::Row].
    #[error("no column found for name: {0}")]
    ColumnNotFound(Box<str>),

    /// Column index was out of bounds.
    #[error("column index out of bounds: the len is {len}, but the index is {index}")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// Error decoding a value from the server.
    #[error("error decoding a value: {0}")]
    Decode(#[source] BoxDynError),

    /// The operation was cancelled before it could complete.
    #[error("operation was cancelled")]
    Cancelled,
}

impl Error {
    #[inline]
    pub(crate) fn config(err: impl StdError + Send + Sync + 'static) -> Self {
        Error::Configuration(err.into())
    }

    #[inline]
    pub(crate) fn tls(err: impl Into<BoxDynError>) -> Self {
        Error::Tls(err.into())
    }

    #[inline]
    pub(crate) fn connect(err: impl Into<BoxDynError>) -> Self {
        Error::Connect(err.into())
    }

    #[inline]
    pub(crate) fn protocol(err: impl Display) -> Self {
        Error::Protocol(err.to_string())
    }

    #[inline]
    pub(crate) fn decode(err: impl Into<BoxDynError>) -> Self {
        Error::Decode(err.into())
    }

    /// The error returned by the server, if this error originated from one.
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(error) | Error::Auth(error) => Some(error.as_ref()),

            Error::Connect(source) => source.downcast_ref(),

            _ => None,
        }
    }

    /// The MySQL error code, or `0` if this error did not come from the server.
    pub fn code(&self) -> u16 {
        self.as_server_error().map_or(0, ServerError::code)
    }

    /// The five-character SQLSTATE, or `""` if this error did not come from
    /// the server.
    pub fn sql_state(&self) -> &str {
        self.as_server_error().map_or("", ServerError::sql_state)
    }

    /// Returns `true` if the error is a server-reported constraint violation
    /// (duplicate key, foreign key, `NOT NULL`, `CHECK`).
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.as_server_error().map(ServerError::kind),
            Some(ErrorKind::ConstraintViolation)
        )
    }
}

/// A rough classification of a [`ServerError`] by its error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// `1045` — access denied for the user/host/password triple.
    AccessDenied,

    /// `1133`, `1862` — the password must be reset before queries can run.
    PasswordExpired,

    /// `1040` — the server has reached `max_connections`.
    TooManyConnections,

    /// `1317` — the statement was interrupted by `KILL QUERY`.
    QueryInterrupted,

    /// Duplicate key, foreign key, `NOT NULL` or `CHECK` failure
    /// (`1062`, `1451`, `1452`, `1048`, `1216`, `1217`, `1364`, `3819`).
    ConstraintViolation,

    /// Anything else.
    Other,
}

/// An error returned from the server as an `ERR` packet.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub(crate) code: u16,
    pub(crate) sql_state: String,
    pub(crate) message: String,
}

impl ServerError {
    pub(crate) fn new(code: u16, sql_state: String, message: String) -> Self {
        Self {
            code,
            sql_state,
            message,
        }
    }

    /// The MySQL error code, e.g. `1062`.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The five-character ANSI SQLSTATE, e.g. `"23000"`.
    pub fn sql_state(&self) -> &str {
        &self.sql_state
    }

    /// The primary, human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code {
            error_codes::ER_ACCESS_DENIED_ERROR => ErrorKind::AccessDenied,

            error_codes::ER_MUST_CHANGE_PASSWORD | error_codes::ER_MUST_CHANGE_PASSWORD_LOGIN => {
                ErrorKind::PasswordExpired
            }

            error_codes::ER_CON_COUNT_ERROR => ErrorKind::TooManyConnections,

            error_codes::ER_QUERY_INTERRUPTED => ErrorKind::QueryInterrupted,

            error_codes::ER_DUP_ENTRY
            | error_codes::ER_ROW_IS_REFERENCED_2
            | error_codes::ER_NO_REFERENCED_ROW_2
            | error_codes::ER_BAD_NULL_ERROR
            | error_codes::ER_ROW_IS_REFERENCED
            | error_codes::ER_NO_REFERENCED_ROW
            | error_codes::ER_NO_DEFAULT_FOR_FIELD
            | error_codes::ER_CHECK_CONSTRAINT_VIOLATED => ErrorKind::ConstraintViolation,

            _ => ErrorKind::Other,
        }
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.sql_state.is_empty() {
            write!(f, "{} ({})", self.message, self.code)
        } else {
            write!(f, "{} ({} {})", self.message, self.code, self.sql_state)
        }
    }
}

impl StdError for ServerError {}

impl From<ServerError> for Error {
    fn from(error: ServerError) -> Self {
        Error::Server(Box::new(error))
    }
}

/// Server error codes this crate gives special treatment to.
pub(crate) mod error_codes {
    pub const ER_CON_COUNT_ERROR: u16 = 1040;
    pub const ER_ACCESS_DENIED_ERROR: u16 = 1045;
    pub const ER_DUP_ENTRY: u16 = 1062;
    pub const ER_NO_REFERENCED_ROW: u16 = 1216;
    pub const ER_ROW_IS_REFERENCED: u16 = 1217;
    pub const ER_BAD_NULL_ERROR: u16 = 1048;
    pub const ER_QUERY_INTERRUPTED: u16 = 1317;
    pub const ER_NO_DEFAULT_FOR_FIELD: u16 = 1364;
    pub const ER_MUST_CHANGE_PASSWORD_LOGIN: u16 = 1862;
    pub const ER_MUST_CHANGE_PASSWORD: u16 = 1133;
    pub const ER_ROW_IS_REFERENCED_2: u16 = 1451;
    pub const ER_NO_REFERENCED_ROW_2: u16 = 1452;
    pub const ER_CHECK_CONSTRAINT_VIOLATED: u16 = 3819;
}

macro_rules! err_protocol {
    ($($args:tt)*) => {
        $crate::error::Error::Protocol(format!($($args)*))
    };
}

pub(crate) use err_protocol;

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ServerError};

    #[test]
    fn classifies_constraint_violations() {
        for code in [1062, 1451, 1452, 1048, 1216, 1217, 1364, 3819] {
            let error = ServerError::new(code, "23000".into(), "nope".into());
            assert_eq!(error.kind(), ErrorKind::ConstraintViolation, "{}", code);
        }
    }

    #[test]
    fn classifies_interrupt_and_auth() {
        assert_eq!(
            ServerError::new(1317, "70100".into(), "Query execution was interrupted".into())
                .kind(),
            ErrorKind::QueryInterrupted
        );

        assert_eq!(
            ServerError::new(1045, "28000".into(), "Access denied".into()).kind(),
            ErrorKind::AccessDenied
        );

        assert_eq!(
            ServerError::new(2013, String::new(), "Lost connection".into()).kind(),
            ErrorKind::Other
        );
    }
}

//! `postern` error types.
use std::{backtrace::Backtrace, fmt, io};

/// A specialized [`Result`] type for `postern` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from the `postern` library.
pub struct Error {
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// All possible error kind from the `postern` library.
pub enum ErrorKind {
    Config(ConfigError),
    Connect(ConnectError),
    Io(io::Error),
    Tls(native_tls::Error),
    Protocol(ProtocolError),
    Database(ErrorResponse),
    Transaction(TransactionError),
    Encode(EncodeError),
    Decode(DecodeError),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ConfigError>e => ErrorKind::Config(e));
from!(<ConnectError>e => ErrorKind::Connect(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<native_tls::Error>e => ErrorKind::Tls(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<ErrorResponse>e => ErrorKind::Database(e));
from!(<TransactionError>e => ErrorKind::Transaction(e));
from!(<EncodeError>e => ErrorKind::Encode(e));
from!(<DecodeError>e => ErrorKind::Decode(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Connect(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Tls(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Transaction(e) => e.fmt(f),
            Self::Encode(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Error when parsing a connection string or merging configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid connection protocol: {0}")]
    InvalidProtocol(String),
    #[error("invalid option: {0:?}")]
    InvalidOption(String),
    #[error("setting {0} not supported")]
    UnsupportedSetting(String),
    #[error("client_encoding must be absent or 'UTF8'")]
    ClientEncoding,
    #[error("setting datestyle must be absent or 'ISO, MDY'; got {0:?}")]
    DateStyle(String),
    #[error("invalid port: {0:?}")]
    InvalidPort(String),
    #[error(r#"unsupported sslmode {0:?}; only "require" (default), "verify-full", and "disable" supported"#)]
    SslMode(String),
    #[error("user not set and no operating system user available")]
    MissingUser,
}

/// Error while establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("SSL is not enabled on the server")]
    SslNotSupported,
    #[error("unknown authentication response: {0}")]
    UnsupportedAuth(i32),
    #[error("unix domain sockets are not supported on this platform")]
    UnixSocketUnsupported,
}

/// The backend sent something the driver cannot make sense of.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProtocolError {
    message: Box<str>,
}

impl ProtocolError {
    pub(crate) fn new(message: impl Into<Box<str>>) -> Self {
        Self { message: message.into() }
    }
}

macro_rules! protocol {
    ($($tt:tt)*) => {
        $crate::error::ProtocolError::new(format!($($tt)*))
    };
}

pub(crate) use protocol;

/// A structured error reported by the backend in an `ErrorResponse` message.
///
/// Field meanings follow the error and notice message fields of the
/// protocol; `code` is the SQLSTATE code.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug, Default, thiserror::Error)]
#[error("{severity}: {message} ({code})")]
pub struct ErrorResponse {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<String>,
    pub where_: Option<String>,
    pub file: Option<String>,
    pub line: Option<String>,
    pub routine: Option<String>,
}

/// Error from transaction sequencing.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("could not complete operation in a failed transaction")]
    InFailedTransaction,
    #[error("unexpected command tag {got:?}; expected {want}")]
    UnexpectedTag { got: String, want: &'static str },
    #[error("unexpected transaction status {0:?}")]
    UnexpectedStatus(char),
}

/// Error when encoding a parameter value.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encode: unknown type for {0}")]
    UnknownType(&'static str),
    #[error("got {got} parameters but the statement requires {want}")]
    ParameterCount { got: usize, want: usize },
}

/// Error when decoding a value received from the backend.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("non UTF-8 string: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("expected number; got {0:?}")]
    Int(String),
    #[error("expected float; got {0:?}")]
    Float(String),
    #[error("malformed boolean value")]
    Bool,
    #[error("invalid bytea sequence")]
    Bytea,
    #[error("malformed array: {0}")]
    Array(String),
    #[error("malformed timestamp: {0}")]
    Timestamp(String),
    #[error("value out of range for array element type")]
    OutOfRange,
}

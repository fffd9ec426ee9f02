use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Broad category of an error.
///
/// Callers mostly just surface the message, but tests and the session cleanup
/// paths need to tell apart "the query was wrong" from "we have a bug".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbErrorKind {
    /// Malformed input, mismatched shapes, unknown names.
    Validation,
    /// Row or column index outside of the frame.
    Bounds,
    /// Operation not supported by the target (e.g. writing into a view).
    Unsupported,
    /// A remote task failed.
    Distributed,
    /// Internal bookkeeping is inconsistent.
    Invariant,
    /// Everything else.
    Internal,
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Bounds => "bounds",
            Self::Unsupported => "unsupported",
            Self::Distributed => "distributed",
            Self::Invariant => "invariant",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

#[derive(Debug)]
struct DbErrorInner {
    msg: String,
    kind: DbErrorKind,
    source: Option<Box<dyn Error + Send + Sync>>,
    fields: Vec<(Cow<'static, str>, String)>,
    backtrace: Backtrace,
}

impl DbError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::new_with_kind(DbErrorKind::Internal, msg)
    }

    pub fn new_with_kind(kind: DbErrorKind, msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                msg: msg.into(),
                kind,
                source: None,
                fields: Vec::new(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new_with_kind(DbErrorKind::Validation, msg)
    }

    pub fn bounds(msg: impl Into<String>) -> Self {
        Self::new_with_kind(DbErrorKind::Bounds, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new_with_kind(DbErrorKind::Unsupported, msg)
    }

    pub fn distributed(msg: impl Into<String>) -> Self {
        Self::new_with_kind(DbErrorKind::Distributed, msg)
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::new_with_kind(DbErrorKind::Invariant, msg)
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    /// Attach a key/value pair to the error.
    ///
    /// Fields are printed after the message, in insertion order.
    pub fn with_field(mut self, key: impl Into<Cow<'static, str>>, value: impl fmt::Display) -> Self {
        self.inner.fields.push((key.into(), value.to_string()));
        self
    }

    /// Override the kind of this error.
    pub fn with_kind(mut self, kind: DbErrorKind) -> Self {
        self.inner.kind = kind;
        self
    }

    pub fn kind(&self) -> DbErrorKind {
        self.inner.kind
    }

    pub fn get_msg(&self) -> &str {
        &self.inner.msg
    }

    /// Get the value for a field if it exists.
    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.inner.backtrace.status() {
            BacktraceStatus::Captured => Some(&self.inner.backtrace),
            _ => None,
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;

        if !self.inner.fields.is_empty() {
            write!(f, " (")?;
            for (idx, (key, value)) in self.inner.fields.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}: {value}")?;
            }
            write!(f, ")")?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::with_source("IO error", Box::new(value))
    }
}

impl From<std::fmt::Error> for DbError {
    fn from(value: std::fmt::Error) -> Self {
        Self::with_source("Format error", Box::new(value))
    }
}

/// Extension for wrapping foreign errors with a message.
pub trait ResultExt<T, E> {
    fn context(self, msg: &'static str) -> Result<T>;
    fn context_fn<F: Fn() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| DbError::with_source(msg, Box::new(e)))
    }

    fn context_fn<F: Fn() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| DbError::with_source(f(), Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Return an error with the given message if the value is None.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        self.ok_or_else(|| DbError::new(msg))
    }
}

#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {
        return Err($crate::DbError::unsupported(format!("Not yet implemented: {}", format!($($arg)*))))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_fields() {
        let err = DbError::validation("Column not found")
            .with_field("column", "c1")
            .with_field("num_columns", 3);

        assert_eq!("Column not found (column: c1, num_columns: 3)", err.to_string());
        assert_eq!(DbErrorKind::Validation, err.kind());
        assert_eq!(Some("c1"), err.get_field("column"));
    }

    #[test]
    fn context_wraps_source() {
        let res: std::result::Result<(), std::fmt::Error> = Err(std::fmt::Error);
        let err = res.context("Failed to format").unwrap_err();

        assert!(err.to_string().starts_with("Failed to format: "));
        assert!(err.source().is_some());
    }

    #[test]
    fn not_implemented_is_unsupported() {
        fn inner() -> Result<()> {
            not_implemented!("multi-row frame assign for {}", "strings")
        }

        let err = inner().unwrap_err();
        assert_eq!(DbErrorKind::Unsupported, err.kind());
    }
}

use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::{atomic, Atomic};

/// Error kinds for docket operations.
///
/// Each kind describes one category of failure so callers can match on
/// [DocketError::kind] instead of parsing messages.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::errors::{DocketError, ErrorKind, DocketResult};
///
/// fn example() -> DocketResult<()> {
///     Err(DocketError::new("No key for entity", ErrorKind::IdentityError))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Identity map errors
    /// A key could not be determined for an untracked entity
    IdentityError,
    /// Two distinct entities claim the same document key
    UniquenessError,
    /// The entity handle is not associated with the session
    NotTracked,
    /// A delete was requested for a read-only entity
    ReadOnlyViolation,
    /// An identifier-only delete was requested for a locally modified entity
    AmbiguousDeletion,

    // Server state errors
    /// The server rejected a write or delete because of an etag mismatch
    StaleData,
    /// The fetched document reflects an uncommitted transaction
    NonAuthoritativeData,
    /// The requested document was not found
    NotFound,
    /// A read trigger on the server vetoed the document
    ReadVetoed,

    // Conversion errors
    /// Error mapping an entity to or from a document
    ObjectMappingError,
    /// Invalid data type for the operation
    InvalidDataType,

    // Session errors
    /// The operation is not valid in the current context
    InvalidOperation,
    /// The session issued more remote calls than allowed
    RequestLimitExceeded,
    /// The transport collaborator failed
    TransportError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::IdentityError => write!(f, "Identity error"),
            ErrorKind::UniquenessError => write!(f, "Uniqueness error"),
            ErrorKind::NotTracked => write!(f, "Not tracked"),
            ErrorKind::ReadOnlyViolation => write!(f, "Read-only violation"),
            ErrorKind::AmbiguousDeletion => write!(f, "Ambiguous deletion"),
            ErrorKind::StaleData => write!(f, "Stale data"),
            ErrorKind::NonAuthoritativeData => write!(f, "Non-authoritative data"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::ReadVetoed => write!(f, "Read vetoed"),
            ErrorKind::ObjectMappingError => write!(f, "Object mapping error"),
            ErrorKind::InvalidDataType => write!(f, "Invalid data type"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::RequestLimitExceeded => write!(f, "Request limit exceeded"),
            ErrorKind::TransportError => write!(f, "Transport error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom docket error type.
///
/// `DocketError` carries a message, an [ErrorKind], an optional cause and the
/// backtrace captured at construction.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::errors::{DocketError, ErrorKind};
///
/// let cause = DocketError::new("connection reset", ErrorKind::TransportError);
/// let err = DocketError::new_with_cause("Save failed", ErrorKind::TransportError, cause);
/// ```
#[derive(Clone)]
pub struct DocketError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DocketError>>,
    backtrace: Atomic<Backtrace>,
}

impl DocketError {
    /// Creates a new `DocketError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DocketError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `DocketError` with a cause error.
    ///
    /// The cause is preserved and exposed through [Error::source].
    pub fn new_with_cause(message: &str, error_type: ErrorKind, cause: DocketError) -> Self {
        DocketError {
            message: message.to_string(),
            error_kind: error_type,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DocketError> {
        self.cause.as_deref()
    }
}

impl Display for DocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for DocketError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for docket operations.
pub type DocketResult<T> = Result<T, DocketError>;

#[cfg(feature = "serde")]
impl serde::de::Error for DocketError {
    fn custom<T: Display>(msg: T) -> Self {
        DocketError::new(&msg.to_string(), ErrorKind::ObjectMappingError)
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Error for DocketError {
    fn custom<T: Display>(msg: T) -> Self {
        DocketError::new(&msg.to_string(), ErrorKind::ObjectMappingError)
    }
}

impl From<std::fmt::Error> for DocketError {
    fn from(err: std::fmt::Error) -> Self {
        DocketError::new(
            &format!("Formatting error: {}", err),
            ErrorKind::InternalError,
        )
    }
}

impl From<std::num::ParseIntError> for DocketError {
    fn from(err: std::num::ParseIntError) -> Self {
        DocketError::new(
            &format!("Integer parsing error: {}", err),
            ErrorKind::InvalidDataType,
        )
    }
}

impl From<std::num::ParseFloatError> for DocketError {
    fn from(err: std::num::ParseFloatError) -> Self {
        DocketError::new(
            &format!("Float parsing error: {}", err),
            ErrorKind::InvalidDataType,
        )
    }
}

impl From<String> for DocketError {
    fn from(msg: String) -> Self {
        DocketError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DocketError {
    fn from(msg: &str) -> Self {
        DocketError::new(msg, ErrorKind::InternalError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docket_error_new_creates_error() {
        let error = DocketError::new("An error occurred", ErrorKind::TransportError);
        assert_eq!(error.message, "An error occurred");
        assert_eq!(error.error_kind, ErrorKind::TransportError);
        assert!(error.cause.is_none());
    }

    #[test]
    fn docket_error_new_with_cause_creates_error() {
        let error = DocketError::new_with_cause(
            "Save failed",
            ErrorKind::StaleData,
            DocketError::new("etag mismatch on users/1", ErrorKind::StaleData),
        );
        assert_eq!(error.message(), "Save failed");
        assert_eq!(error.kind(), &ErrorKind::StaleData);
        assert_eq!(error.cause().map(|c| c.message()), Some("etag mismatch on users/1"));
    }

    #[test]
    fn docket_error_display_formats_message_only() {
        let error = DocketError::new("Key collision", ErrorKind::UniquenessError);
        assert_eq!(format!("{}", error), "Key collision");
    }

    #[test]
    fn docket_error_debug_formats_with_cause() {
        let error = DocketError::new_with_cause(
            "outer",
            ErrorKind::TransportError,
            DocketError::new("inner", ErrorKind::TransportError),
        );
        let formatted = format!("{:?}", error);
        assert!(formatted.contains("outer"));
        assert!(formatted.contains("Caused by:"));
        assert!(formatted.contains("inner"));
    }

    #[test]
    fn docket_error_source_follows_cause() {
        let plain = DocketError::new("plain", ErrorKind::InternalError);
        assert!(plain.source().is_none());

        let chained = DocketError::new_with_cause("outer", ErrorKind::InternalError, plain);
        assert!(chained.source().is_some());
    }

    #[test]
    fn error_kind_display_names() {
        assert_eq!(ErrorKind::AmbiguousDeletion.to_string(), "Ambiguous deletion");
        assert_eq!(ErrorKind::ReadOnlyViolation.to_string(), "Read-only violation");
        assert_eq!(ErrorKind::NonAuthoritativeData.to_string(), "Non-authoritative data");
    }

    #[test]
    fn from_string_is_internal_error() {
        let error: DocketError = "boom".into();
        assert_eq!(error.kind(), &ErrorKind::InternalError);

        let parse: DocketError = "x".parse::<i64>().unwrap_err().into();
        assert_eq!(parse.kind(), &ErrorKind::InvalidDataType);
    }
}

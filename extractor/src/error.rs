//! Error types and result definitions for extractor operations.
//!
//! Provides a single rich error type with classification and captured callsite
//! metadata. [`ExtractError`] carries an [`ErrorKind`] used by the orchestrator
//! to decide between cycle-abort, batch-partial, and record-partial handling.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for extractor operations using [`ExtractError`].
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Specific categories of errors that can occur during an extraction cycle.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Remote MarcOut protocol
    TransportFailed,
    ProtocolError,
    MissingProtocolField,
    MalformedEnvelope,

    // Record data
    InvalidRecord,
    ConversionError,

    // Local state
    RecordStoreIo,
    StateStoreFailed,
    HoldsRebuildFailed,

    // Wiring
    ConfigError,
    IoError,
    SerializationError,

    Unknown,
}

/// Main error type for extractor operations.
///
/// Each error captures its kind, a static description, optional dynamic
/// detail, an optional source error, and the callsite that produced it.
#[derive(Debug, Clone)]
pub struct ExtractError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

impl ExtractError {
    /// Creates an [`ExtractError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ExtractError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Attaches an originating [`error::Error`] and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = self.detail.as_deref() {
            write!(f, "\n  Detail: {detail}")?;
        }

        let rendered_backtrace = format!("{}", self.backtrace);
        if !rendered_backtrace.trim().is_empty() {
            write!(f, "\n  Backtrace:")?;
            for line in rendered_backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates an [`ExtractError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ExtractError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ExtractError {
        ExtractError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`ExtractError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ExtractError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ExtractError {
        ExtractError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`std::io::Error`] to [`ExtractError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for ExtractError {
    #[track_caller]
    fn from(err: std::io::Error) -> ExtractError {
        let detail = err.to_string();
        ExtractError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`reqwest::Error`] to [`ExtractError`] with [`ErrorKind::TransportFailed`].
impl From<reqwest::Error> for ExtractError {
    #[track_caller]
    fn from(err: reqwest::Error) -> ExtractError {
        let detail = err.to_string();
        ExtractError::from_components(
            ErrorKind::TransportFailed,
            Cow::Borrowed("MarcOut HTTP request failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`quick_xml::Error`] to [`ExtractError`] with [`ErrorKind::MalformedEnvelope`].
impl From<quick_xml::Error> for ExtractError {
    #[track_caller]
    fn from(err: quick_xml::Error) -> ExtractError {
        let detail = err.to_string();
        ExtractError::from_components(
            ErrorKind::MalformedEnvelope,
            Cow::Borrowed("XML envelope parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] to [`ExtractError`] with [`ErrorKind::StateStoreFailed`].
impl From<sqlx::Error> for ExtractError {
    #[track_caller]
    fn from(err: sqlx::Error) -> ExtractError {
        let detail = err.to_string();
        ExtractError::from_components(
            ErrorKind::StateStoreFailed,
            Cow::Borrowed("Database operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`chrono::ParseError`] to [`ExtractError`] with [`ErrorKind::ConversionError`].
impl From<chrono::ParseError> for ExtractError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> ExtractError {
        let detail = err.to_string();
        ExtractError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Datetime parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`serde_json::Error`] to [`ExtractError`] with [`ErrorKind::SerializationError`].
impl From<serde_json::Error> for ExtractError {
    #[track_caller]
    fn from(err: serde_json::Error) -> ExtractError {
        let detail = err.to_string();
        ExtractError::from_components(
            ErrorKind::SerializationError,
            Cow::Borrowed("JSON serialization failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`std::num::ParseIntError`] to [`ExtractError`] with [`ErrorKind::ConversionError`].
impl From<std::num::ParseIntError> for ExtractError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> ExtractError {
        let detail = err.to_string();
        ExtractError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`std::str::Utf8Error`] to [`ExtractError`] with [`ErrorKind::ConversionError`].
impl From<std::str::Utf8Error> for ExtractError {
    #[track_caller]
    fn from(err: std::str::Utf8Error) -> ExtractError {
        let detail = err.to_string();
        ExtractError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("UTF-8 conversion failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

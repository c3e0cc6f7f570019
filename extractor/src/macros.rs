//! Macros for extractor error handling.
//!
//! Convenience macros for creating and returning [`crate::error::ExtractError`]
//! instances with reduced boilerplate.

/// Creates an [`crate::error::ExtractError`] from error kind and description.
///
/// Accepts an optional dynamic detail and an optional source error.
#[macro_export]
macro_rules! extract_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ExtractError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::ExtractError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ExtractError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::ExtractError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Creates and returns an [`crate::error::ExtractError`] from the current function.
///
/// Combines error creation with early return for conditions that should
/// immediately terminate execution. Supports the same arguments as
/// [`extract_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::extract_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::extract_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::extract_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::extract_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}

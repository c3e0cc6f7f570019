//! Concurrency helpers.

pub mod shutdown;

//! Local persistence: the per-bib MARC record store and watermark state.

pub mod records;
pub mod state;

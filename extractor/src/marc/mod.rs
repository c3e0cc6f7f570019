//! MARC record model and binary codec.
//!
//! [`Record`] is the structured catalog record the connector synthesizes and
//! persists: a leader, ordered control fields, and ordered data fields whose
//! subfield codes are not required to be unique within a field. The codec
//! reads and writes the ISO 2709 binary exchange format used both for the
//! per-bib record store and for bulk export files dropped by the ILS.

mod codec;
mod record;

pub use codec::{RecordReader, read_record, write_record};
pub use record::{ControlField, DataField, Record, Subfield};

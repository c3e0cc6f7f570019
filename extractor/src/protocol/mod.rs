//! MarcOut wire protocol support.
//!
//! The remote API speaks an XML-RPC-style envelope over HTTP POST with no
//! schema on the wire. Requests are built from fixed templates; responses are
//! decoded into a tag-indexed element tree before any field is read, so a
//! missing field surfaces as an explicit protocol error instead of a
//! positional misread.

pub mod batch;
pub mod client;
pub mod envelope;
pub mod xml;

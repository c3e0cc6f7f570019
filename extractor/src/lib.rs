pub mod bulk;
pub mod changes;
pub mod collaborators;
pub mod concurrency;
pub mod error;
pub mod holds;
mod macros;
pub mod marc;
pub mod mode;
pub mod orchestrator;
pub mod protocol;
pub mod state;
pub mod store;
pub mod synthesis;

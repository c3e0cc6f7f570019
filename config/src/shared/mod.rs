mod connection;
mod connector;
mod ils;
mod profile;

pub use connection::*;
pub use connector::*;
pub use ils::*;
pub use profile::*;

//! Common types, protocol definitions, and errors shared across the key
//! negotiation crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::ResponseEnvelope;

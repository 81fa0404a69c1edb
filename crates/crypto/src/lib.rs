//! Transport key negotiation and local text encryption.
//!
//! Layers, leaves first:
//!
//! - [`symmetric`]: stateless AES (CBC, ECB, GCM-SIV) over byte slices.
//! - [`keypair`]: key-pair persistence (memory, file, SQLite).
//! - [`asymmetric`]: EC P-256 / RSA engine on top of a key-pair cache.
//! - [`negotiation`]: ECDH key exchange between an initiator and a responder.
//! - [`local`]: at-rest text encryption with mark-header routing.
//! - [`transport`]: per-request payload encryption over a negotiated session.
//!
//! All fallible operations return typed errors that convert into
//! [`CryptoError`], which in turn maps onto [`common::ServiceError`].

pub mod asymmetric;
pub mod error;
pub mod keypair;
pub mod local;
pub mod negotiation;
pub mod symmetric;
pub mod transport;

pub use error::CryptoError;

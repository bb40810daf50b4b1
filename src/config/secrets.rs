//! Secret handling re-exports.
//!
//! The store URL can carry credentials, so it is held as a `SecretString` and
//! only exposed at the point of connecting.

pub use secrecy::{ExposeSecret, SecretString};

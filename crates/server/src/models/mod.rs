//! Request-scoped models.

pub mod session;

pub use session::{Actor, keys as session_keys};

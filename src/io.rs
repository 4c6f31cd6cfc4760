//! External-service contracts and their in-memory fakes.
//!
//! The pipeline consumes object storage, the message bus, the status store,
//! and the durable engine's liveness channel exclusively through the traits
//! in [`traits`]; nothing else in the crate talks to the outside world. The
//! [`fake`] module provides in-memory implementations for tests.

pub mod fake;
pub mod traits;

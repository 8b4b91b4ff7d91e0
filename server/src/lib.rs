//! Session-pooled chess engine service.
//!
//! Stateless request handlers rebuild each game from a compact cache record,
//! borrow that session's engine from the [`pool::EnginePool`], and write the
//! result back. A background [`reaper::StaleSessionReaper`] closes sessions
//! that stopped receiving requests.

pub mod config;
pub mod console;
pub mod error;
pub mod persistence;
pub mod pool;
pub mod reaper;
pub mod service;
pub mod session;
#[cfg(test)]
mod testing;

pub use error::ServiceError;

//! State management with actor pattern
//!
//! StateManager owns the store and processes messages via channels,
//! providing thread-safe access to persistent state. The orchestration core
//! only sees it through the [`Persistence`] trait.

mod manager;
mod messages;
mod persistence;

#[cfg(test)]
pub mod mock;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
pub use persistence::Persistence;

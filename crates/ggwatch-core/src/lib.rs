//! ggwatch-core: domain model for the island-watch bot.
//!
//! Everything here is pure (no async, no I/O) so the subscription state
//! machine and the UI session model can be tested without a runtime.

pub mod error;
pub mod ident;
pub mod session;
pub mod threshold;
pub mod types;

pub use error::CoreError;

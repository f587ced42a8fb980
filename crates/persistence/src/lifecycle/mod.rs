//! The save lifecycle: validation, hooks and writes for models.
//!
//! - [`SaveLifecycle`] sequences the phases of a save and runs them inside
//!   a transaction created by the [`TransactionFactory`](crate::core::TransactionFactory).
//! - [`SaveHook`] and [`HookOutcome`] are how property configurations take
//!   part in a save.
//! - [`SaveUnit`] and [`LazySaveUnit`] schedule saves as units of work next
//!   to other units.

mod hooks;
mod save;
mod state;
mod units;

pub use hooks::{HookOutcome, SaveHook};
pub use save::SaveLifecycle;
pub use state::SaveState;
pub use units::{LazySaveUnit, SaveUnit};

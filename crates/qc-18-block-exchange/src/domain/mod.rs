//! # Domain Layer for Block Exchange
//!
//! Pure state and rules, no I/O. This is the innermost layer of the
//! hexagonal architecture.
//!
//! ## Contents
//!
//! - **entities**: `WantEntry`, `Ledger`, `Receipt`, `ServeTask`, `StatSnapshot`
//! - **wantlist**: ordered, duplicate-free wantlist of one owner
//! - **task_queue**: per-peer serve queue with retry and cancel bookkeeping
//! - **ledger**: sharded `LedgerStore`
//! - **provide_buffer**: bounded queue of newly available keys
//! - **value_objects**: `ExchangeConfig`, `FairnessPolicy`
//! - **invariants**: accounting and scheduling invariant checks

mod entities;
mod invariants;
mod ledger;
mod provide_buffer;
mod task_queue;
mod value_objects;
mod wantlist;

pub use entities::*;
pub use invariants::*;
pub use ledger::*;
pub use provide_buffer::*;
pub use task_queue::*;
pub use value_objects::*;
pub use wantlist::*;

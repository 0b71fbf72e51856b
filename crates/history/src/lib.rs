//! Edit history: every mutation of the document is a reversible [`Command`]
//! recorded by the [`HistoryEngine`].
//!
//! # Invariants
//! - The undo and redo logs are disjoint and every logged command has a
//!   distinct id; ids in the undo log strictly increase oldest to newest.
//! - Executing a new command discards the redo log (history is linear).
//! - A composite command is one log entry; its children undo in reverse.
//! - Every externally visible operation publishes exactly one
//!   [`HistoryEvent`]; suspended executes publish nothing.
//! - Nothing below the persistence floor is ever serialized.

pub mod clock;
pub mod command;
pub mod composite;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, CommandId, CommandRecord, CommandSummary, fields_of};
pub use composite::CompositeCommand;
pub use config::HistoryConfig;
pub use engine::{EntryState, HistoryEngine, HistoryEntry, HistoryRecord, Suspended};
pub use error::{CommandError, HistoryError, LoadError};
pub use events::{EventBus, HistoryEvent, LoadReport, Operation, SkippedRecord};
pub use gate::PersistenceGate;
pub use registry::{LoadContext, Registry, RehydrateFn};

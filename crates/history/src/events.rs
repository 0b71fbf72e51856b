use crate::command::{CommandId, CommandSummary};
use crate::error::LoadError;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

/// Public engine operation, named in rejection events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Execute,
    Undo,
    Redo,
    GoToState,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Execute => "execute",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::GoToState => "go-to-state",
        };
        f.write_str(name)
    }
}

/// A record that was left out while loading a saved history.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub id: Option<CommandId>,
    pub type_tag: String,
    pub reason: LoadError,
}

/// Outcome of loading a saved history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub restored: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// "History changed" notification. Exactly one is published per externally
/// visible engine operation.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    /// A new entry was appended.
    Executed(CommandSummary),
    /// A command was folded into the existing entry described here.
    Merged(CommandSummary),
    Undone(CommandSummary),
    Redone(CommandSummary),
    /// Point-in-time navigation finished; `current` is the newest applied
    /// entry, `None` when everything is undone.
    Navigated { current: Option<CommandId> },
    /// An operation was refused or failed; the logs are consistent.
    Rejected { operation: Operation, reason: String },
    Loaded(LoadReport),
    Cleared,
    SerializationEnabled { floor: CommandId },
}

/// Publish/subscribe channel for history notifications.
///
/// Subscribers get a `Receiver` and poll it from the host's event loop.
/// Dropped receivers are pruned on the next publish.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<HistoryEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<HistoryEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&mut self, event: HistoryEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

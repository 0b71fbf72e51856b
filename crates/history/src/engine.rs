use crate::clock::{Clock, SystemClock};
use crate::command::{Command, CommandId, CommandRecord, CommandSummary};
use crate::composite::CompositeCommand;
use crate::config::HistoryConfig;
use crate::error::{HistoryError, LoadError};
use crate::events::{EventBus, HistoryEvent, LoadReport, Operation, SkippedRecord};
use crate::gate::PersistenceGate;
use crate::registry::Registry;
use scenedit_common::{EntityId, EntityLookup};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::mpsc::Receiver;
use std::time::Instant;

/// Saved form of the history: both logs, persistable entries only.
///
/// `undo_log` is oldest first. `redo_log` is in stack order: the last
/// element is the next command `redo` would apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(default)]
    pub undo_log: Vec<CommandRecord>,
    #[serde(default)]
    pub redo_log: Vec<CommandRecord>,
}

impl HistoryRecord {
    pub fn len(&self) -> usize {
        self.undo_log.len() + self.redo_log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_log.is_empty() && self.redo_log.is_empty()
    }
}

/// Same layout as [`HistoryRecord`] but with entries left unparsed, so one
/// bad entry does not sink the whole load.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHistory {
    #[serde(default)]
    undo_log: Vec<Value>,
    #[serde(default)]
    redo_log: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Applied,
    Undone,
}

/// One row of the history list.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub summary: CommandSummary,
    pub state: EntryState,
    /// Whether the entry would be written by `to_record`.
    pub persistent: bool,
}

struct Entry<D> {
    id: CommandId,
    label: Option<String>,
    command: Box<dyn Command<D>>,
}

impl<D> Entry<D> {
    fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.command.label())
    }

    fn summary(&self) -> CommandSummary {
        CommandSummary {
            id: self.id,
            type_tag: self.command.type_tag().to_owned(),
            label: self.label(),
        }
    }
}

/// Owns the undo and redo logs of one document.
///
/// The engine never touches the document itself: it hands `&mut D` to the
/// commands it runs. All state changes go through `execute`, `undo`, `redo`,
/// `go_to_state`, `clear` and `load_record`/`from_json`, and each of those
/// publishes exactly one [`HistoryEvent`] when it changes anything visible.
pub struct HistoryEngine<D> {
    undo_log: VecDeque<Entry<D>>,
    redo_log: Vec<Entry<D>>,
    last_execution: Option<Instant>,
    next_id: u64,
    suspended: bool,
    locked: bool,
    gate: PersistenceGate,
    config: HistoryConfig,
    registry: Registry<D>,
    clock: Box<dyn Clock>,
    bus: EventBus,
}

impl<D: 'static> HistoryEngine<D> {
    pub fn new(config: HistoryConfig, registry: Registry<D>) -> Self {
        let gate = if config.persistence_enabled {
            PersistenceGate::enabled_from(CommandId::FIRST)
        } else {
            PersistenceGate::disabled()
        };
        Self {
            undo_log: VecDeque::new(),
            redo_log: Vec::new(),
            last_execution: None,
            next_id: CommandId::FIRST.0,
            suspended: false,
            locked: false,
            gate,
            config,
            registry,
            clock: Box::new(SystemClock),
            bus: EventBus::new(),
        }
    }

    /// Replace the clock used for merge-window decisions.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Receive a copy of every history notification from now on.
    pub fn subscribe(&mut self) -> Receiver<HistoryEvent> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<D> {
        &self.registry
    }

    // ---------------------------------------------------------------------
    // Execute
    // ---------------------------------------------------------------------

    /// Apply `command` to `doc` and record it.
    ///
    /// Returns the id of the log entry now holding the edit: the command's own
    /// id, or the id of the entry it was merged into. A failing command leaves
    /// both logs untouched.
    pub fn execute(
        &mut self,
        doc: &mut D,
        command: Box<dyn Command<D>>,
    ) -> Result<CommandId, HistoryError> {
        self.execute_inner(doc, command, None)
    }

    /// Like [`execute`](Self::execute) with a caller-chosen history label.
    pub fn execute_named(
        &mut self,
        doc: &mut D,
        command: Box<dyn Command<D>>,
        label: impl Into<String>,
    ) -> Result<CommandId, HistoryError> {
        self.execute_inner(doc, command, Some(label.into()))
    }

    /// Run `children` as one composite entry.
    pub fn execute_group(
        &mut self,
        doc: &mut D,
        label: impl Into<String>,
        children: Vec<Box<dyn Command<D>>>,
    ) -> Result<CommandId, HistoryError> {
        let composite = CompositeCommand::with_children(label, children);
        self.execute_inner(doc, Box::new(composite), None)
    }

    fn execute_inner(
        &mut self,
        doc: &mut D,
        mut command: Box<dyn Command<D>>,
        label: Option<String>,
    ) -> Result<CommandId, HistoryError> {
        let id = CommandId(self.next_id);
        self.next_id += 1;

        if let Err(source) = command.execute(doc) {
            let label = label.unwrap_or_else(|| command.label());
            let err = HistoryError::Command { label, source };
            return Err(self.reject(Operation::Execute, err));
        }

        if !self.redo_log.is_empty() {
            tracing::debug!(discarded = self.redo_log.len(), "new edit discards redo log");
            self.redo_log.clear();
        }

        if self.suspended {
            tracing::trace!(%id, type_tag = command.type_tag(), "suspended execute, not recorded");
            return Ok(id);
        }

        let now = self.clock.now();
        if let Some(merged) = self.try_merge(command.as_ref(), now) {
            tracing::debug!(into = %merged.id, type_tag = %merged.type_tag, "merged into previous entry");
            self.last_execution = Some(now);
            let into = merged.id;
            self.publish(HistoryEvent::Merged(merged));
            return Ok(into);
        }

        let entry = Entry {
            id,
            label,
            command,
        };
        let summary = entry.summary();
        tracing::debug!(%id, label = %summary.label, "executed");
        self.undo_log.push_back(entry);
        self.trim_undo_log();
        self.last_execution = Some(now);
        self.publish(HistoryEvent::Executed(summary));
        Ok(id)
    }

    /// Fold `command` into the newest undo entry if the merge rules allow it.
    fn try_merge(&mut self, command: &dyn Command<D>, now: Instant) -> Option<CommandSummary> {
        let last = self.last_execution?;
        if now.saturating_duration_since(last) >= self.config.merge_window() {
            return None;
        }
        let prev = self.undo_log.back_mut()?;
        if !prev.command.mergeable()
            || !command.mergeable()
            || prev.command.type_tag() != command.type_tag()
        {
            return None;
        }
        if self.config.merge_requires_same_target && prev.command.targets() != command.targets() {
            return None;
        }
        if !prev.command.update(command) {
            return None;
        }
        Some(prev.summary())
    }

    fn trim_undo_log(&mut self) {
        let Some(max) = self.config.max_undo_entries else {
            return;
        };
        while self.undo_log.len() > max.max(1) {
            if let Some(dropped) = self.undo_log.pop_front() {
                tracing::debug!(id = %dropped.id, "undo log full, dropping oldest entry");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------------

    /// Reverse the newest applied entry. `Ok(None)` when there is nothing to
    /// undo.
    pub fn undo(&mut self, doc: &mut D) -> Result<Option<CommandSummary>, HistoryError> {
        if self.locked {
            return Err(self.reject(Operation::Undo, HistoryError::Locked));
        }
        match self.undo_step(doc) {
            Ok(Some(summary)) => {
                tracing::debug!(id = %summary.id, "undone");
                self.publish(HistoryEvent::Undone(summary.clone()));
                Ok(Some(summary))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.reject(Operation::Undo, e)),
        }
    }

    /// Re-apply the most recently undone entry. `Ok(None)` when there is
    /// nothing to redo.
    pub fn redo(&mut self, doc: &mut D) -> Result<Option<CommandSummary>, HistoryError> {
        if self.locked {
            return Err(self.reject(Operation::Redo, HistoryError::Locked));
        }
        match self.redo_step(doc) {
            Ok(Some(summary)) => {
                tracing::debug!(id = %summary.id, "redone");
                self.publish(HistoryEvent::Redone(summary.clone()));
                Ok(Some(summary))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(self.reject(Operation::Redo, e)),
        }
    }

    fn undo_step(&mut self, doc: &mut D) -> Result<Option<CommandSummary>, HistoryError> {
        let Some(mut entry) = self.undo_log.pop_back() else {
            return Ok(None);
        };
        if let Err(source) = entry.command.undo(doc) {
            let label = entry.label();
            self.undo_log.push_back(entry);
            return Err(HistoryError::Command { label, source });
        }
        let summary = entry.summary();
        self.redo_log.push(entry);
        self.last_execution = None;
        Ok(Some(summary))
    }

    fn redo_step(&mut self, doc: &mut D) -> Result<Option<CommandSummary>, HistoryError> {
        let Some(mut entry) = self.redo_log.pop() else {
            return Ok(None);
        };
        if let Err(source) = entry.command.execute(doc) {
            let label = entry.label();
            self.redo_log.push(entry);
            return Err(HistoryError::Command { label, source });
        }
        let summary = entry.summary();
        self.undo_log.push_back(entry);
        self.last_execution = None;
        Ok(Some(summary))
    }

    // ---------------------------------------------------------------------
    // Point-in-time navigation
    // ---------------------------------------------------------------------

    /// Move the document to the state right after entry `target`, or to the
    /// state before the first entry when `target` is `None`.
    ///
    /// Walks there one real undo/redo at a time. An id found in neither log
    /// is rejected and nothing changes. Publishes a single `Navigated` event.
    pub fn go_to_state(&mut self, doc: &mut D, target: Option<CommandId>) -> Result<(), HistoryError> {
        if self.locked {
            return Err(self.reject(Operation::GoToState, HistoryError::Locked));
        }
        if let Some(id) = target {
            if !self.contains(id) {
                return Err(self.reject(Operation::GoToState, HistoryError::UnknownTarget(id)));
            }
        }

        let _span = tracing::info_span!("go_to_state", target = ?target).entered();
        let mut steps = 0usize;
        let outcome = loop {
            let current = self.current_id();
            if current == target {
                break Ok(());
            }
            // `None` orders below every id, so it doubles as the
            // before-the-first-command sentinel.
            let step = if current > target {
                self.undo_step(doc)
            } else {
                self.redo_step(doc)
            };
            match step {
                Ok(Some(_)) => steps += 1,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(steps, current = ?self.current_id(), "navigated");
                let current = self.current_id();
                self.publish(HistoryEvent::Navigated { current });
                Ok(())
            }
            Err(e) => Err(self.reject(Operation::GoToState, e)),
        }
    }

    fn contains(&self, id: CommandId) -> bool {
        self.undo_log.iter().any(|e| e.id == id) || self.redo_log.iter().any(|e| e.id == id)
    }

    // ---------------------------------------------------------------------
    // Suspension, lock, reset
    // ---------------------------------------------------------------------

    /// Stop recording until the returned guard is dropped.
    ///
    /// While suspended, `execute` still applies commands and consumes ids but
    /// records and publishes nothing. The previous state is restored on every
    /// exit path, unwinding included, so guards nest.
    pub fn suspend(&mut self) -> Suspended<'_, D> {
        let previous = std::mem::replace(&mut self.suspended, true);
        Suspended {
            engine: self,
            previous,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Refuse undo, redo and navigation (e.g. while the scene is playing).
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Forget both logs. The document is left as is, and ids keep counting
    /// so the persistence floor still admits later edits.
    pub fn clear(&mut self) {
        self.undo_log.clear();
        self.redo_log.clear();
        self.last_execution = None;
        tracing::info!("history cleared");
        self.publish(HistoryEvent::Cleared);
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Turn on serialization for entries with id `>= floor`. Entries below
    /// it stay in memory only.
    pub fn enable_serialization(&mut self, floor: CommandId) {
        self.gate.enable(floor);
        tracing::info!(%floor, "history serialization enabled");
        self.publish(HistoryEvent::SerializationEnabled { floor });
    }

    pub fn persistence_gate(&self) -> PersistenceGate {
        self.gate
    }

    /// Lowest persisted id, or `None` while serialization is off.
    pub fn persistence_floor(&self) -> Option<CommandId> {
        self.gate.is_enabled().then(|| self.gate.floor())
    }

    /// Capture every entry the persistence gate allows.
    pub fn to_record(&self) -> HistoryRecord {
        HistoryRecord {
            undo_log: self.capture(self.undo_log.iter()),
            redo_log: self.capture(self.redo_log.iter()),
        }
    }

    /// [`to_record`](Self::to_record) as a JSON value.
    pub fn to_json(&self) -> Result<Value, HistoryError> {
        serde_json::to_value(self.to_record()).map_err(|e| HistoryError::Record(e.to_string()))
    }

    fn capture<'a>(&self, entries: impl Iterator<Item = &'a Entry<D>>) -> Vec<CommandRecord> {
        entries
            .filter(|e| self.gate.allows(e.id))
            .filter_map(|e| {
                match CommandRecord::capture(Some(e.id), &e.label(), e.command.as_ref()) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        tracing::warn!(id = %e.id, error = %err, "entry left out of saved history");
                        None
                    }
                }
            })
            .collect()
    }

    /// Replace both logs with the commands in `record`.
    ///
    /// Records that cannot be rebuilt (unknown type, unresolvable target,
    /// malformed or out-of-order) are skipped and listed in the report. The
    /// document is not touched: it is expected to already be in the state the
    /// history was saved against.
    pub fn load_record(&mut self, record: &HistoryRecord, lookup: &dyn EntityLookup) -> LoadReport {
        let undo = record.undo_log.iter().cloned().map(Ok).collect();
        let redo = record.redo_log.iter().cloned().map(Ok).collect();
        self.load_logs(undo, redo, lookup)
    }

    /// [`load_record`](Self::load_record) from a JSON value. Fails only when
    /// the value is not a history object at all.
    pub fn from_json(
        &mut self,
        value: &Value,
        lookup: &dyn EntityLookup,
    ) -> Result<LoadReport, HistoryError> {
        let raw: RawHistory = serde_json::from_value(value.clone())
            .map_err(|e| HistoryError::Record(e.to_string()))?;
        let parse = |v: Value| {
            let type_tag = v
                .get("typeTag")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_owned();
            let id = v.get("id").and_then(Value::as_u64).map(CommandId);
            serde_json::from_value::<CommandRecord>(v).map_err(|e| SkippedRecord {
                id,
                type_tag: type_tag.clone(),
                reason: LoadError::Malformed {
                    type_tag,
                    reason: e.to_string(),
                },
            })
        };
        let undo = raw.undo_log.into_iter().map(parse).collect();
        let redo = raw.redo_log.into_iter().map(parse).collect();
        Ok(self.load_logs(undo, redo, lookup))
    }

    fn load_logs(
        &mut self,
        undo: Vec<Result<CommandRecord, SkippedRecord>>,
        redo: Vec<Result<CommandRecord, SkippedRecord>>,
        lookup: &dyn EntityLookup,
    ) -> LoadReport {
        let _span = tracing::info_span!("load_history", undo = undo.len(), redo = redo.len()).entered();

        // Entities carried whole by some record (created or removed objects)
        // resolve even when the document does not hold them right now.
        let declared: HashSet<EntityId> = undo
            .iter()
            .chain(redo.iter())
            .filter_map(|r| r.as_ref().ok())
            .filter_map(|r| self.registry.rehydrate(r, &AnyEntity).ok())
            .flat_map(|c| c.declared_entities())
            .collect();
        let resolver = WithDeclared {
            host: lookup,
            declared: &declared,
        };

        let mut report = LoadReport::default();
        let mut seen = HashSet::new();
        let undo_entries = self.rehydrate_log(undo, &resolver, &mut seen, &mut report, Order::Ascending);
        let floor_for_redo = undo_entries.last().map(|e: &Entry<D>| e.id);
        let redo_entries = self.rehydrate_log(
            redo,
            &resolver,
            &mut seen,
            &mut report,
            Order::Descending {
                above: floor_for_redo,
            },
        );

        let ids = undo_entries.iter().chain(redo_entries.iter()).map(|e| e.id);
        let max_id = ids.clone().max();
        let min_id = ids.min();

        self.undo_log = undo_entries.into();
        self.redo_log = redo_entries;
        self.next_id = max_id.map_or(CommandId::FIRST.0, |id| id.0 + 1);
        self.last_execution = None;
        self.gate = PersistenceGate::enabled_from(min_id.unwrap_or(CommandId::FIRST));

        for skipped in &report.skipped {
            tracing::warn!(id = ?skipped.id, type_tag = %skipped.type_tag, reason = %skipped.reason, "history record skipped");
        }
        tracing::info!(restored = report.restored, skipped = report.skipped.len(), "history loaded");
        self.publish(HistoryEvent::Loaded(report.clone()));
        report
    }

    fn rehydrate_log(
        &self,
        records: Vec<Result<CommandRecord, SkippedRecord>>,
        resolver: &dyn EntityLookup,
        seen: &mut HashSet<CommandId>,
        report: &mut LoadReport,
        order: Order,
    ) -> Vec<Entry<D>> {
        let mut entries: Vec<Entry<D>> = Vec::new();
        for record in records {
            let record = match record {
                Ok(record) => record,
                Err(skipped) => {
                    report.skipped.push(skipped);
                    continue;
                }
            };
            let previous = entries.last().map(|e| e.id);
            match self.rehydrate_entry(&record, resolver, seen, previous, order) {
                Ok(entry) => {
                    seen.insert(entry.id);
                    report.restored += 1;
                    entries.push(entry);
                }
                Err(reason) => report.skipped.push(SkippedRecord {
                    id: record.id,
                    type_tag: record.type_tag.clone(),
                    reason,
                }),
            }
        }
        entries
    }

    fn rehydrate_entry(
        &self,
        record: &CommandRecord,
        resolver: &dyn EntityLookup,
        seen: &HashSet<CommandId>,
        previous: Option<CommandId>,
        order: Order,
    ) -> Result<Entry<D>, LoadError> {
        let malformed = |reason: String| LoadError::Malformed {
            type_tag: record.type_tag.clone(),
            reason,
        };
        let id = record
            .id
            .ok_or_else(|| malformed("log entry without an id".into()))?;
        if seen.contains(&id) {
            return Err(malformed(format!("duplicate id {id}")));
        }
        // Undo ids rise oldest to newest; redo ids fall toward the top of the
        // stack and all sit above the newest undo id.
        let in_order = match order {
            Order::Ascending => previous.map_or(true, |p| p < id),
            Order::Descending { above } => {
                previous.map_or(true, |p| p > id) && above.map_or(true, |a| a < id)
            }
        };
        if !in_order {
            return Err(malformed(format!("id {id} out of order")));
        }

        let command = self.registry.rehydrate(record, resolver)?;
        let label = (!record.label.is_empty() && record.label != command.label())
            .then(|| record.label.clone());
        Ok(Entry { id, label, command })
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub fn undo_count(&self) -> usize {
        self.undo_log.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_log.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_log.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_log.is_empty()
    }

    /// Id of the newest applied entry; `None` before the first one.
    pub fn current_id(&self) -> Option<CommandId> {
        self.undo_log.back().map(|e| e.id)
    }

    /// Id the next executed command will get.
    pub fn next_id(&self) -> CommandId {
        CommandId(self.next_id)
    }

    /// Undo log ids, oldest first.
    pub fn undo_ids(&self) -> Vec<CommandId> {
        self.undo_log.iter().map(|e| e.id).collect()
    }

    /// Redo log ids in stack order (last is the next redo).
    pub fn redo_ids(&self) -> Vec<CommandId> {
        self.redo_log.iter().map(|e| e.id).collect()
    }

    /// Rows for a history list: applied entries oldest first, then undone
    /// entries in the order redo would bring them back.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        let applied = self.undo_log.iter().map(|e| (e, EntryState::Applied));
        let undone = self.redo_log.iter().rev().map(|e| (e, EntryState::Undone));
        applied
            .chain(undone)
            .map(|(e, state)| HistoryEntry {
                summary: e.summary(),
                state,
                persistent: self.gate.allows(e.id),
            })
            .collect()
    }

    // ---------------------------------------------------------------------

    fn publish(&mut self, event: HistoryEvent) {
        if !self.suspended {
            self.bus.publish(event);
        }
    }

    fn reject(&mut self, operation: Operation, err: HistoryError) -> HistoryError {
        tracing::warn!(%operation, error = %err, "history operation rejected");
        self.publish(HistoryEvent::Rejected {
            operation,
            reason: err.to_string(),
        });
        err
    }
}

impl<D> fmt::Debug for HistoryEngine<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryEngine")
            .field("undo", &self.undo_log.len())
            .field("redo", &self.redo_log.len())
            .field("next_id", &self.next_id)
            .field("suspended", &self.suspended)
            .field("locked", &self.locked)
            .field("gate", &self.gate)
            .finish()
    }
}

/// Recording fence returned by [`HistoryEngine::suspend`].
pub struct Suspended<'a, D> {
    engine: &'a mut HistoryEngine<D>,
    previous: bool,
}

impl<D> Deref for Suspended<'_, D> {
    type Target = HistoryEngine<D>;

    fn deref(&self) -> &Self::Target {
        self.engine
    }
}

impl<D> DerefMut for Suspended<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine
    }
}

impl<D> Drop for Suspended<'_, D> {
    fn drop(&mut self) {
        self.engine.suspended = self.previous;
    }
}

#[derive(Clone, Copy)]
enum Order {
    Ascending,
    Descending { above: Option<CommandId> },
}

/// Lookup that accepts every id; used to discover declared entities.
struct AnyEntity;

impl EntityLookup for AnyEntity {
    fn contains_entity(&self, _id: EntityId) -> bool {
        true
    }
}

struct WithDeclared<'a> {
    host: &'a dyn EntityLookup,
    declared: &'a HashSet<EntityId>,
}

impl EntityLookup for WithDeclared<'_> {
    fn contains_entity(&self, id: EntityId) -> bool {
        self.host.contains_entity(id) || self.declared.contains(&id)
    }
}

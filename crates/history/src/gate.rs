use crate::command::CommandId;

/// Decides which log entries may be written to durable storage.
///
/// Off by default. Once enabled at a floor, entries with an id below the
/// floor stay in memory only; everything at or above it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceGate {
    enabled: bool,
    floor: CommandId,
}

impl PersistenceGate {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            floor: CommandId::FIRST,
        }
    }

    pub fn enabled_from(floor: CommandId) -> Self {
        Self {
            enabled: true,
            floor,
        }
    }

    pub fn enable(&mut self, floor: CommandId) {
        *self = Self::enabled_from(floor);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn floor(&self) -> CommandId {
        self.floor
    }

    pub fn allows(&self, id: CommandId) -> bool {
        self.enabled && id >= self.floor
    }
}

impl Default for PersistenceGate {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_gate_allows_nothing() {
        let gate = PersistenceGate::disabled();
        assert!(!gate.allows(CommandId(1)));
        assert!(!gate.allows(CommandId(1000)));
    }

    #[test]
    fn floor_is_inclusive() {
        let mut gate = PersistenceGate::default();
        gate.enable(CommandId(5));
        assert!(!gate.allows(CommandId(4)));
        assert!(gate.allows(CommandId(5)));
        assert!(gate.allows(CommandId(6)));
        assert_eq!(gate.floor(), CommandId(5));
    }
}

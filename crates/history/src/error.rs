use crate::command::CommandId;
use scenedit_common::EntityId;

/// Failure of a single command while applying, reversing or serializing it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
    #[error("entity {0} already exists")]
    EntityExists(EntityId),
    #[error("cannot attach {child} under {parent:?}")]
    InvalidParent {
        child: EntityId,
        parent: Option<EntityId>,
    },
    #[error("command was never executed")]
    NotExecuted,
    #[error("serialization failed: {0}")]
    Serialize(String),
    #[error("child {index} of composite failed: {source}")]
    Child {
        index: usize,
        #[source]
        source: Box<CommandError>,
    },
}

/// Why one saved record could not be turned back into a command.
///
/// Load failures are local: the record is skipped and loading continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("unknown command type `{0}`")]
    UnknownTypeTag(String),
    #[error("`{type_tag}` references entity {entity} which is not in the document")]
    UnresolvableReference { type_tag: String, entity: EntityId },
    #[error("malformed `{type_tag}` record: {reason}")]
    Malformed { type_tag: String, reason: String },
}

/// Failure of a public engine operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistoryError {
    #[error("no history entry with id {0}")]
    UnknownTarget(CommandId),
    #[error("history is locked")]
    Locked,
    #[error("command `{label}` failed: {source}")]
    Command {
        label: String,
        #[source]
        source: CommandError,
    },
    #[error("malformed history record: {0}")]
    Record(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_error_names_index_and_cause() {
        let id = EntityId::new();
        let err = CommandError::Child {
            index: 2,
            source: Box::new(CommandError::EntityNotFound(id)),
        };
        let text = err.to_string();
        assert!(text.contains("child 2"));
        assert!(text.contains(&id.to_string()));
    }

    #[test]
    fn history_error_display() {
        assert_eq!(
            HistoryError::UnknownTarget(CommandId(7)).to_string(),
            "no history entry with id #7"
        );
        assert_eq!(HistoryError::Locked.to_string(), "history is locked");
    }
}

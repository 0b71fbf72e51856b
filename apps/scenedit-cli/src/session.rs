//! The scripted editing session shared by `demo` and `save`.

use glam::Vec3;
use scenedit_author::{Editor, SetName, SetParent};
use scenedit_common::Transform;
use scenedit_history::{Command, CommandId, EntryState, HistoryConfig, HistoryEngine, ManualClock};
use scenedit_scene::{Scene, SceneObject};
use std::time::Duration;

/// Time between two drag frames.
const FRAME: Duration = Duration::from_millis(16);

pub struct SessionOptions {
    pub entities: usize,
    pub drag_steps: usize,
}

/// Play a short editing session: spawn objects, drag one of them, regroup
/// the rest under it, then step back and forth through the history.
///
/// Runs on a hand-driven clock so drags always merge the same way.
pub fn run(config: HistoryConfig, opts: &SessionOptions) -> anyhow::Result<Editor> {
    let clock = ManualClock::new();
    let pause = config.merge_window() + FRAME;
    let mut editor = Editor::new(config).with_clock(clock.clone());
    let events = editor.subscribe();

    editor.populate([SceneObject::new("Ground", Transform::default())])?;

    let mut cubes = Vec::with_capacity(opts.entities);
    for i in 0..opts.entities.max(1) {
        let at = Transform::from_position(Vec3::new(i as f32 * 2.0, 0.0, 0.0));
        cubes.push(editor.spawn(format!("Cube {i}"), at)?);
        clock.advance(pause);
    }
    let after_spawns = editor.history().current_id();

    let hero = cubes[0];
    for step in 1..=opts.drag_steps {
        clock.advance(FRAME);
        editor.set_position(hero, Vec3::new(0.0, step as f32 * 0.25, 0.0))?;
    }
    clock.advance(pause);

    let mut regroup: Vec<Box<dyn Command<Scene>>> = vec![SetName::new(hero, "Cube 0", "Hero")];
    for cube in &cubes[1..] {
        regroup.push(SetParent::new(*cube, None, Some(hero)));
    }
    editor.group("Group under hero", regroup)?;
    clock.advance(pause);

    editor.undo()?;
    editor.redo()?;
    let latest = editor.history().current_id();
    editor.go_to_state(after_spawns)?;
    tracing::info!(summary = %editor.scene().summary(), "rewound to last spawn");
    editor.go_to_state(latest)?;

    let published = events.try_iter().count();
    tracing::info!(published, "history events published during session");
    Ok(editor)
}

/// Print the history list, newest applied entry marked with `>`.
pub fn print_history(history: &HistoryEngine<Scene>) {
    let current = history.current_id();
    println!(
        "History: {} applied, {} undone, next id {}",
        history.undo_count(),
        history.redo_count(),
        history.next_id()
    );
    for entry in history.entries() {
        let marker = match entry.state {
            EntryState::Applied if Some(entry.summary.id) == current => ">",
            EntryState::Applied => " ",
            EntryState::Undone => "~",
        };
        let saved = if entry.persistent { "" } else { " (memory only)" };
        println!(
            "  {marker} {:<5} {:<14} {}{saved}",
            entry.summary.id.to_string(),
            entry.summary.type_tag,
            entry.summary.label
        );
    }
}

/// `0` on the command line means "before the first command".
pub fn target_from_arg(id: u64) -> Option<CommandId> {
    (id > 0).then_some(CommandId(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_is_one_entry_and_session_ends_at_latest() {
        let opts = SessionOptions {
            entities: 3,
            drag_steps: 12,
        };
        let editor = run(HistoryConfig::default(), &opts).unwrap();
        // Three spawns, one merged drag, one group.
        assert_eq!(editor.history().undo_count(), 5);
        assert!(!editor.history().can_redo());
        // Ground was populated without history.
        assert_eq!(editor.scene().entity_count(), 4);
        assert!(
            editor
                .scene()
                .entities()
                .values()
                .any(|o| o.name == "Hero" && o.transform.position.y == 3.0)
        );
    }

    #[test]
    fn zero_means_before_first_command() {
        assert_eq!(target_from_arg(0), None);
        assert_eq!(target_from_arg(4), Some(CommandId(4)));
    }
}

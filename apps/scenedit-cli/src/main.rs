mod session;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scenedit_author::{Editor, scene_registry};
use scenedit_history::{CommandId, HistoryConfig};
use scenedit_persist::{HISTORY_SCHEMA_VERSION, ProjectStore, SCENE_SCHEMA_VERSION};
use session::{SessionOptions, print_history, target_from_arg};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scenedit-cli", about = "Scene editor history tool")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// History settings (YAML). Defaults apply to anything left out.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print versions, known command types and the effective config
    Info,
    /// Run a scripted editing session and print its history
    Demo {
        /// Number of objects to spawn
        #[arg(short, long, default_value = "5")]
        entities: usize,
        /// Frames in the simulated drag
        #[arg(short, long, default_value = "30")]
        drag_steps: usize,
    },
    /// Run the scripted session and save scene + history to a project
    Save {
        /// Project directory
        #[arg(short, long)]
        dir: PathBuf,
        /// Number of objects to spawn
        #[arg(short, long, default_value = "5")]
        entities: usize,
        /// Lowest command id written to disk
        #[arg(short, long, default_value = "1")]
        floor: u64,
    },
    /// Load a project and list its history
    Inspect {
        /// Project directory
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Load a project and jump to the state after a command (0: before all)
    Goto {
        /// Project directory
        #[arg(short, long)]
        dir: PathBuf,
        /// Target command id
        #[arg(short, long)]
        id: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("scenedit-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "store schema: scene v{SCENE_SCHEMA_VERSION}, history v{HISTORY_SCHEMA_VERSION}"
            );
            println!("command types: {}", scene_registry().type_tags().join(", "));
            print!("config:\n{}", serde_yaml::to_string(&config)?);
        }
        Commands::Demo {
            entities,
            drag_steps,
        } => {
            let opts = SessionOptions {
                entities,
                drag_steps,
            };
            let editor = session::run(config, &opts)?;
            println!("{}", editor.scene().summary());
            print_history(editor.history());
        }
        Commands::Save {
            dir,
            entities,
            floor,
        } => {
            let opts = SessionOptions {
                entities,
                drag_steps: 30,
            };
            let mut editor = session::run(config, &opts)?;
            editor
                .history_mut()
                .enable_serialization(CommandId(floor.max(1)));
            let record = editor.save_history();

            let mut store = ProjectStore::open(&dir)
                .with_context(|| format!("opening project at {}", dir.display()))?;
            let revision = store.save(editor.scene(), &record)?;
            store.verify_integrity()?;
            println!(
                "Saved revision {revision} to {}: {} entities, {} of {} commands",
                dir.display(),
                editor.scene().entity_count(),
                record.len(),
                editor.history().entries().len()
            );
        }
        Commands::Inspect { dir } => {
            let editor = open_project(&dir, config)?;
            println!("{}", editor.scene().summary());
            print_history(editor.history());
        }
        Commands::Goto { dir, id } => {
            let mut editor = open_project(&dir, config)?;
            let target = target_from_arg(id);
            editor.go_to_state(target)?;
            println!("At {}", target.map_or("start".to_string(), |id| id.to_string()));
            println!("{}", editor.scene().summary());
            print_history(editor.history());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HistoryConfig> {
    let Some(path) = path else {
        return Ok(HistoryConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: HistoryConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::debug!(?config, "config loaded");
    Ok(config)
}

/// Open the store, verify it and rebuild an editor from its newest revision.
fn open_project(dir: &Path, config: HistoryConfig) -> anyhow::Result<Editor> {
    let store = ProjectStore::open(dir)
        .with_context(|| format!("opening project at {}", dir.display()))?;
    store.verify_integrity()?;
    let revision = store.load_latest()?;

    let mut editor = Editor::with_scene(revision.scene, config);
    let report = editor.load_history(&revision.history);
    println!(
        "Revision {}: restored {} commands, skipped {}",
        revision.number,
        report.restored,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        let id = skipped.id.map_or("?".to_string(), |id| id.to_string());
        println!("  skipped {id} {}: {}", skipped.type_tag, skipped.reason);
    }
    Ok(editor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_config_after_subcommand() {
        let cli = Cli::try_parse_from([
            "scenedit-cli",
            "goto",
            "--dir",
            "proj",
            "--id",
            "3",
            "--config",
            "history.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("history.yaml")));
        assert!(matches!(cli.command, Commands::Goto { id: 3, .. }));
    }

    #[test]
    fn partial_yaml_config_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.yaml");
        std::fs::write(&path, "merge_window_ms: 250\nmax_undo_entries: 100\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.merge_window_ms, 250);
        assert_eq!(config.max_undo_entries, Some(100));
        assert!(config.merge_requires_same_target);
    }

    #[test]
    fn saved_session_reopens_and_navigates() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("proj");
        let opts = SessionOptions {
            entities: 2,
            drag_steps: 4,
        };
        let mut editor = session::run(HistoryConfig::default(), &opts).unwrap();
        editor.history_mut().enable_serialization(CommandId(1));
        let hash = editor.scene().state_hash();
        let mut store = ProjectStore::open(&dir).unwrap();
        store.save(editor.scene(), &editor.save_history()).unwrap();

        let mut reopened = open_project(&dir, HistoryConfig::default()).unwrap();
        assert_eq!(reopened.scene().state_hash(), hash);
        assert_eq!(reopened.history().undo_count(), editor.history().undo_count());

        reopened.go_to_state(None).unwrap();
        assert_eq!(reopened.scene().entity_count(), 1);
    }
}

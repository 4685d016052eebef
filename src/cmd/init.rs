//! Board initialization: `agency-board init`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use agency_board::board::{
    BoardController, BoardKind, BoardState, ControllerOptions, NewGroup, SqliteStore,
};
use agency_board::board_config::{BoardConfig, CONFIG_FILE};

use super::confirm;

/// Columns or stages created by `init --seed`.
fn default_groups(kind: BoardKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        BoardKind::TaskBoard => &[
            ("To Do", "#94a3b8"),
            ("In Progress", "#3b82f6"),
            ("Review", "#f59e0b"),
            ("Done", "#22c55e"),
        ],
        BoardKind::Pipeline => &[
            ("Lead", "#94a3b8"),
            ("Qualified", "#3b82f6"),
            ("Proposal", "#a855f7"),
            ("Negotiation", "#f59e0b"),
            ("Won", "#22c55e"),
        ],
    }
}

pub async fn cmd_init(
    board_dir: &Path,
    kind: BoardKind,
    title: Option<String>,
    actor: Option<String>,
    seed: bool,
) -> Result<()> {
    let config_path = board_dir.join(CONFIG_FILE);
    if config_path.exists() {
        println!("Board already initialized at {}", config_path.display());
        return Ok(());
    }

    let mut config = BoardConfig::default();
    config.board.kind = kind;
    config.board.title = title.unwrap_or_else(|| match kind {
        BoardKind::TaskBoard => "Tasks".to_string(),
        BoardKind::Pipeline => "Sales pipeline".to_string(),
    });
    config.board.actor = actor;

    std::fs::create_dir_all(board_dir)
        .with_context(|| format!("Failed to create {}", board_dir.display()))?;
    let db_path = config.store_path(board_dir);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to create board store: {}", db_path.display()))?;
    config.save(&config_path)?;

    let mut created = 0;
    if seed {
        let controller =
            BoardController::new(Arc::new(store), BoardState::new(), ControllerOptions::from(&config));
        for (title, color) in default_groups(kind) {
            let (_, pending) = controller.create_group(NewGroup {
                title: title.to_string(),
                accent_color: Some(color.to_string()),
            })?;
            confirm(pending).await?;
            created += 1;
        }
    }

    println!(
        "Initialized {} board '{}' at {}",
        kind.as_str(),
        config.board.title,
        board_dir.display()
    );
    println!("  config: {}", config_path.display());
    println!("  store:  {}", db_path.display());
    if created > 0 {
        println!("  seeded {} {}s", created, kind.group_noun());
    }
    Ok(())
}

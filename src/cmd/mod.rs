//! CLI command implementations.
//!
//! | Module  | Commands handled                                               |
//! |---------|----------------------------------------------------------------|
//! | `init`  | `Init`                                                         |
//! | `board` | `Show`, `Check`                                                |
//! | `edit`  | `AddGroup`, `AddItem`, `Move`, `Duplicate`, `DeleteItem`, `DeleteGroup` |

pub mod board;
pub mod edit;
pub mod init;

pub use board::{cmd_check, cmd_show};
pub use edit::{
    MoveTarget, cmd_add_group, cmd_add_item, cmd_delete_group, cmd_delete_item, cmd_duplicate,
    cmd_move,
};
pub use init::cmd_init;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use agency_board::board::{BoardController, ControllerOptions, PendingWrite, SqliteStore, SyncOutcome};
use agency_board::board_config::{BoardConfig, CONFIG_FILE};

/// Open the configured SQLite store.
pub fn open_store(board_dir: &Path, config: &BoardConfig) -> Result<Arc<SqliteStore>> {
    let db_path = config.store_path(board_dir);
    if !db_path.exists() {
        anyhow::bail!(
            "No board found at {} (looked for {}). Run `agency-board init` first.",
            db_path.display(),
            board_dir.join(CONFIG_FILE).display()
        );
    }
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open board store: {}", db_path.display()))?;
    Ok(Arc::new(store))
}

/// Load the board from the configured store.
pub async fn open_board(board_dir: &Path, config: &BoardConfig) -> Result<BoardController> {
    let store = open_store(board_dir, config)?;
    let controller = BoardController::load(store, ControllerOptions::from(config))
        .await
        .context("Failed to load board")?;
    Ok(controller)
}

/// Wait for the store to confirm a write. A rollback is an error.
pub async fn confirm(pending: PendingWrite) -> Result<()> {
    let op = pending.op();
    match pending.settled().await {
        SyncOutcome::Confirmed => Ok(()),
        SyncOutcome::RolledBack(err) => {
            anyhow::bail!("Could not {}: {}. The change was undone.", op.as_str(), err)
        }
        SyncOutcome::Aborted(reason) => anyhow::bail!("Write for {} aborted: {}", op.as_str(), reason),
    }
}

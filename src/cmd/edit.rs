//! Mutating board commands.
//!
//! Each command loads the board, runs one controller operation, and waits
//! for the store to confirm before printing.

use std::path::Path;

use anyhow::Result;
use console::style;

use agency_board::board::{DropTarget, ItemFields, MovePlan, NewGroup};
use agency_board::board_config::BoardConfig;

use super::{confirm, open_board};

/// Where `move` drops the item.
#[derive(Debug, Clone)]
pub enum MoveTarget {
    /// Group id, id prefix, or title; the item goes to the end.
    Group(String),
    /// Item id or prefix; the moved item takes its place.
    Item(String),
}

pub async fn cmd_add_group(
    board_dir: &Path,
    config: &BoardConfig,
    title: &str,
    color: Option<String>,
) -> Result<()> {
    let controller = open_board(board_dir, config).await?;
    let (id, pending) = controller.create_group(NewGroup {
        title: title.to_string(),
        accent_color: color,
    })?;
    confirm(pending).await?;
    println!(
        "Added {} {} {}",
        controller.kind().group_noun(),
        style(title).bold(),
        style(id.short()).dim()
    );
    Ok(())
}

pub async fn cmd_add_item(
    board_dir: &Path,
    config: &BoardConfig,
    group: &str,
    fields: ItemFields,
) -> Result<()> {
    let controller = open_board(board_dir, config).await?;
    let group_id = controller.resolve_group(group)?;
    let title = fields.title.clone();
    let (id, pending) = controller.create_item(&group_id, fields)?;
    confirm(pending).await?;
    println!("Added {} {}", style(title).bold(), style(id.short()).dim());
    Ok(())
}

pub async fn cmd_move(
    board_dir: &Path,
    config: &BoardConfig,
    item: &str,
    target: MoveTarget,
) -> Result<()> {
    let controller = open_board(board_dir, config).await?;
    let item_id = controller.resolve_item(item)?;
    let target = match target {
        MoveTarget::Group(group) => DropTarget::Group {
            group_id: controller.resolve_group(&group)?,
        },
        MoveTarget::Item(other) => DropTarget::Item {
            item_id: controller.resolve_item(&other)?,
        },
    };

    let (plan, pending) = controller.move_item(&item_id, &target)?;
    confirm(pending).await?;
    match plan {
        MovePlan::Move {
            to_group, position, ..
        } => {
            let group_title = controller
                .snapshot()
                .group(&to_group)
                .map(|g| g.title.clone())
                .unwrap_or_else(|| to_group.to_string());
            println!(
                "Moved {} to {} at position {}",
                style(item_id.short()).bold(),
                style(group_title).bold(),
                position
            );
        }
        MovePlan::NoOp { .. } => println!("Nothing to move: item is already there"),
        MovePlan::TargetGone { .. } => println!("Drop target no longer exists"),
    }
    Ok(())
}

pub async fn cmd_duplicate(board_dir: &Path, config: &BoardConfig, item: &str) -> Result<()> {
    let controller = open_board(board_dir, config).await?;
    let item_id = controller.resolve_item(item)?;
    let (copy_id, pending) = controller.duplicate_item(&item_id)?;
    confirm(pending).await?;
    let title = controller
        .snapshot()
        .item(&copy_id)
        .map(|i| i.title().to_string())
        .unwrap_or_default();
    println!("Created {} {}", style(title).bold(), style(copy_id.short()).dim());
    Ok(())
}

pub async fn cmd_delete_item(board_dir: &Path, config: &BoardConfig, item: &str) -> Result<()> {
    let mut controller = open_board(board_dir, config).await?;
    let item_id = controller.resolve_item(item)?;
    confirm(controller.delete_item(&item_id)?).await?;
    println!("Deleted item {}", style(item_id.short()).dim());
    Ok(())
}

pub async fn cmd_delete_group(board_dir: &Path, config: &BoardConfig, group: &str) -> Result<()> {
    let mut controller = open_board(board_dir, config).await?;
    let group_id = controller.resolve_group(group)?;
    let removed = controller.get_items_for_group(&group_id)?.len();
    confirm(controller.delete_group(&group_id)?).await?;
    println!(
        "Deleted {} {} and {} item(s)",
        controller.kind().group_noun(),
        style(group_id.short()).dim(),
        removed
    );
    Ok(())
}

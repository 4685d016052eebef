//! Read-only board commands: `agency-board show` and `agency-board check`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use agency_board::board::{BoardKind, BoardState, BoardStore, FilterSet, GroupView, Item};
use agency_board::board_config::BoardConfig;

use super::{open_board, open_store};

pub async fn cmd_show(
    board_dir: &Path,
    config: &BoardConfig,
    filters: FilterSet,
    json: bool,
) -> Result<()> {
    let mut controller = open_board(board_dir, config).await?;
    let filtered = filters.is_active();
    controller.set_filters(filters);
    let views = controller.groups_view();

    if json {
        let out = serde_json::to_string_pretty(&views).context("Failed to serialize board")?;
        println!("{}", out);
        return Ok(());
    }

    println!("{}", style(&config.board.title).bold().cyan());
    if views.is_empty() {
        println!(
            "No {}s yet. Add one with `agency-board add-group <title>`.",
            controller.kind().group_noun()
        );
        return Ok(());
    }
    for view in &views {
        print_group(view, controller.kind(), filtered);
    }
    Ok(())
}

fn print_group(view: &GroupView, kind: BoardKind, filtered: bool) {
    println!();
    let count = if filtered {
        format!("{}/{}", view.visible, view.total)
    } else {
        view.total.to_string()
    };
    let mut header = format!(
        "{} {}",
        style(&view.group.title).bold(),
        style(format!("({})", count)).dim()
    );
    if kind == BoardKind::Pipeline {
        let total: i64 = view.items.iter().filter_map(|i| i.fields.value).sum();
        header.push_str(&format!("  {}", style(format_money(total)).green()));
    }
    println!("{}  {}", header, style(view.group.id.short()).dim());
    for item in &view.items {
        println!("  {}", item_line(item));
    }
}

fn item_line(item: &Item) -> String {
    let fields = &item.fields;
    let mut line = format!("{} {}", style(item.id.short()).dim(), fields.title);
    if let Some(priority) = fields.priority {
        line.push_str(&format!(" [{}]", style(priority.as_str()).yellow()));
    }
    if let Some(assignee) = &fields.assignee {
        line.push_str(&format!(" @{}", assignee));
    }
    if let Some(value) = fields.value {
        line.push_str(&format!(" {}", format_money(value)));
    }
    if let Some(due) = fields.due_date {
        line.push_str(&format!(" due {}", due));
    }
    if let Some(related) = &fields.related_name {
        line.push_str(&format!(" ({})", related));
    }
    if !fields.tags.is_empty() {
        line.push_str(&format!(" {}", style(format!("#{}", fields.tags.join(" #"))).dim()));
    }
    line
}

/// Minor units to a two-decimal amount.
fn format_money(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub async fn cmd_check(board_dir: &Path, config: &BoardConfig) -> Result<()> {
    for warning in config.validate() {
        println!("{} {}", style("warning:").yellow(), warning);
    }

    let store = open_store(board_dir, config)?;
    let groups = store.list_groups().await?;
    let items = store.list_items().await?;
    let (group_count, item_count) = (groups.len(), items.len());
    let violations = BoardState::audit_records(groups, items);

    if violations.is_empty() {
        println!(
            "{} {} groups, {} items, no invariant violations",
            style("ok:").green().bold(),
            group_count,
            item_count
        );
        return Ok(());
    }
    for violation in &violations {
        println!("{} {}", style("violation:").red().bold(), violation);
    }
    anyhow::bail!("{} invariant violation(s) found", violations.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_money_handles_cents_and_sign() {
        assert_eq!(format_money(0), "0.00");
        assert_eq!(format_money(1_250_000), "12500.00");
        assert_eq!(format_money(-5), "-0.05");
    }
}

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use agency_board::board::{BoardKind, Priority};
use agency_board::board_config::BoardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "agency-board")]
#[command(version, about = "Task boards and sales pipelines with optimistic sync")]
pub struct Cli {
    /// Log at debug level (overrides board.toml, not RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding board.toml (defaults to the current directory)
    #[arg(long, global = true)]
    pub board_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum KindArg {
    Tasks,
    Pipeline,
}

impl From<KindArg> for BoardKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Tasks => BoardKind::TaskBoard,
            KindArg::Pipeline => BoardKind::Pipeline,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create board.toml and an empty store
    Init {
        #[arg(long, value_enum, default_value = "tasks")]
        kind: KindArg,
        #[arg(long)]
        title: Option<String>,
        /// Acting user for the "mine only" filter
        #[arg(long)]
        actor: Option<String>,
        /// Seed the default columns or stages for this kind of board
        #[arg(long)]
        seed: bool,
    },
    /// Print the board, optionally filtered
    Show {
        /// Text search over title, tags and related name
        #[arg(short, long)]
        query: Option<String>,
        /// Only items owned by the configured actor
        #[arg(long)]
        mine: bool,
        #[arg(long)]
        priority: Option<Priority>,
        /// Minimum value, in minor currency units
        #[arg(long)]
        min_value: Option<i64>,
        /// Print the board as JSON
        #[arg(long)]
        json: bool,
    },
    /// Append a group (column or stage)
    AddGroup {
        title: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// Append an item to a group
    AddItem {
        /// Group id, id prefix, or title
        group: String,
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        assignee: Option<String>,
        /// Due date as YYYY-MM-DD
        #[arg(long)]
        due: Option<chrono::NaiveDate>,
        #[arg(long)]
        value: Option<i64>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Related client or company
        #[arg(long)]
        related: Option<String>,
    },
    /// Move an item to the end of a group, or onto another item
    #[command(group(ArgGroup::new("target").required(true).args(["to_group", "onto"])))]
    Move {
        /// Item id or id prefix
        item: String,
        #[arg(long)]
        to_group: Option<String>,
        #[arg(long)]
        onto: Option<String>,
    },
    /// Copy an item to the end of its group
    Duplicate { item: String },
    /// Delete an item
    DeleteItem { item: String },
    /// Delete a group and every item in it
    DeleteGroup { group: String },
    /// Report invariant violations in the stored board
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let board_dir = match cli.board_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let mut config = BoardConfig::load_or_default(&board_dir)?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    agency_board::logging::init(&config.logging);

    match &cli.command {
        Commands::Init {
            kind,
            title,
            actor,
            seed,
        } => {
            cmd::cmd_init(&board_dir, (*kind).into(), title.clone(), actor.clone(), *seed).await?;
        }
        Commands::Show {
            query,
            mine,
            priority,
            min_value,
            json,
        } => {
            let filters = agency_board::board::FilterSet {
                query: query.clone(),
                mine_only: *mine,
                priority: *priority,
                min_value: *min_value,
            };
            cmd::cmd_show(&board_dir, &config, filters, *json).await?;
        }
        Commands::AddGroup { title, color } => {
            cmd::cmd_add_group(&board_dir, &config, title, color.clone()).await?;
        }
        Commands::AddItem {
            group,
            title,
            description,
            priority,
            assignee,
            due,
            value,
            tags,
            related,
        } => {
            let fields = agency_board::board::ItemFields {
                title: title.clone(),
                description: description.clone().unwrap_or_default(),
                priority: *priority,
                due_date: *due,
                assignee: assignee.clone(),
                tags: tags.clone(),
                value: *value,
                related_name: related.clone(),
            };
            cmd::cmd_add_item(&board_dir, &config, group, fields).await?;
        }
        Commands::Move {
            item,
            to_group,
            onto,
        } => {
            let target = match (to_group, onto) {
                (Some(group), _) => cmd::MoveTarget::Group(group.clone()),
                (None, Some(item)) => cmd::MoveTarget::Item(item.clone()),
                (None, None) => anyhow::bail!("Either --to-group or --onto is required"),
            };
            cmd::cmd_move(&board_dir, &config, item, target).await?;
        }
        Commands::Duplicate { item } => cmd::cmd_duplicate(&board_dir, &config, item).await?,
        Commands::DeleteItem { item } => cmd::cmd_delete_item(&board_dir, &config, item).await?,
        Commands::DeleteGroup { group } => {
            cmd::cmd_delete_group(&board_dir, &config, group).await?
        }
        Commands::Check => cmd::cmd_check(&board_dir, &config).await?,
    }

    Ok(())
}

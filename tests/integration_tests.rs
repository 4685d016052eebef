//! Integration tests for the agency-board CLI.
//!
//! Each test runs the binary against a fresh board in a temporary directory.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create an agency-board Command
fn board() -> Command {
    cargo_bin_cmd!("agency-board")
}

/// Helper to run a command inside `dir` and return its stdout.
fn run_ok(dir: &TempDir, args: &[&str]) -> String {
    let output = board()
        .current_dir(dir.path())
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output).unwrap()
}

/// Board JSON as printed by `show --json`.
fn show_json(dir: &TempDir) -> serde_json::Value {
    serde_json::from_str(&run_ok(dir, &["show", "--json"])).unwrap()
}

fn item_ids(view: &serde_json::Value, group_index: usize) -> Vec<String> {
    view[group_index]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

/// A pipeline with stages Lead / Qualified and three deals.
fn pipeline(dir: &TempDir) {
    run_ok(dir, &["init", "--kind", "pipeline", "--actor", "dana"]);
    run_ok(dir, &["add-group", "Lead"]);
    run_ok(dir, &["add-group", "Qualified"]);
    run_ok(
        dir,
        &["add-item", "Lead", "Acme renewal", "--assignee", "dana", "--value", "500000"],
    );
    run_ok(dir, &["add-item", "Lead", "Globex pilot", "--priority", "high"]);
    run_ok(dir, &["add-item", "Qualified", "Initech audit", "--tag", "audit"]);
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        board().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        board().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_config_and_store() {
        let dir = TempDir::new().unwrap();
        board()
            .current_dir(dir.path())
            .args(["init", "--kind", "pipeline", "--title", "Deals"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized pipeline board 'Deals'"));

        let config = fs::read_to_string(dir.path().join("board.toml")).unwrap();
        assert!(config.contains("kind = \"pipeline\""));
        assert!(dir.path().join(".board/board.db").exists());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let dir = TempDir::new().unwrap();
        run_ok(&dir, &["init"]);
        board()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_commands_require_init() {
        let dir = TempDir::new().unwrap();
        board()
            .current_dir(dir.path())
            .arg("show")
            .assert()
            .failure()
            .stderr(predicate::str::contains("agency-board init"));
    }

    #[test]
    fn test_seeded_task_board() {
        let dir = TempDir::new().unwrap();
        run_ok(&dir, &["init", "--seed"]);
        let view = show_json(&dir);
        let titles: Vec<&str> = view
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["group"]["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["To Do", "In Progress", "Review", "Done"]);
    }
}

// =============================================================================
// Board Editing Tests
// =============================================================================

mod editing {
    use super::*;

    #[test]
    fn test_show_lists_groups_and_items() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        board()
            .current_dir(dir.path())
            .arg("show")
            .assert()
            .success()
            .stdout(predicate::str::contains("Lead"))
            .stdout(predicate::str::contains("Acme renewal"))
            .stdout(predicate::str::contains("Initech audit"));
    }

    #[test]
    fn test_move_onto_item_in_other_group() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        let view = show_json(&dir);
        let acme = item_ids(&view, 0)[0].clone();
        let initech = item_ids(&view, 1)[0].clone();

        run_ok(&dir, &["move", &acme, "--onto", &initech]);

        let view = show_json(&dir);
        assert_eq!(item_ids(&view, 1), vec![acme.clone(), initech.clone()]);
        assert_eq!(item_ids(&view, 0).len(), 1);
        assert_eq!(view[0]["items"][0]["position"], 0);
        assert_eq!(view[1]["items"][1]["position"], 1);
    }

    #[test]
    fn test_move_to_group_by_title() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        let view = show_json(&dir);
        let globex = item_ids(&view, 0)[1].clone();

        board()
            .current_dir(dir.path())
            .args(["move", &globex[..8], "--to-group", "qualified"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Moved"));

        let view = show_json(&dir);
        assert_eq!(item_ids(&view, 1).last(), Some(&globex));
    }

    #[test]
    fn test_move_requires_a_target() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        board()
            .current_dir(dir.path())
            .args(["move", "abc"])
            .assert()
            .failure();
    }

    #[test]
    fn test_duplicate_appends_copy() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        let view = show_json(&dir);
        let acme = item_ids(&view, 0)[0].clone();

        board()
            .current_dir(dir.path())
            .args(["duplicate", &acme])
            .assert()
            .success()
            .stdout(predicate::str::contains("Acme renewal (copy)"));

        let view = show_json(&dir);
        let lead = view[0]["items"].as_array().unwrap();
        assert_eq!(lead.len(), 3);
        assert_eq!(lead[2]["title"], "Acme renewal (copy)");
        assert_eq!(lead[2]["value"], 500000);
        assert_ne!(lead[2]["id"], lead[0]["id"]);
    }

    #[test]
    fn test_delete_group_cascades() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        run_ok(&dir, &["delete-group", "Lead"]);

        let view = show_json(&dir);
        assert_eq!(view.as_array().unwrap().len(), 1);
        assert_eq!(view[0]["group"]["title"], "Qualified");
        assert_eq!(view[0]["total"], 1);
        run_ok(&dir, &["check"]);
    }

    #[test]
    fn test_delete_item_renumbers() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        let view = show_json(&dir);
        let acme = item_ids(&view, 0)[0].clone();
        run_ok(&dir, &["delete-item", &acme]);

        let view = show_json(&dir);
        assert_eq!(view[0]["items"][0]["title"], "Globex pilot");
        assert_eq!(view[0]["items"][0]["position"], 0);
    }

    #[test]
    fn test_add_item_to_unknown_group_fails() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        board()
            .current_dir(dir.path())
            .args(["add-item", "Closed", "Nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_add_item_rejects_blank_title() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        board()
            .current_dir(dir.path())
            .args(["add-item", "Lead", "   "])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Title must not be empty"));
    }
}

// =============================================================================
// Filtering Tests
// =============================================================================

mod filtering {
    use super::*;

    #[test]
    fn test_show_query_filters_items_not_groups() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        let out = run_ok(&dir, &["show", "--json", "--query", "acme"]);
        let view: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(view.as_array().unwrap().len(), 2);
        assert_eq!(view[0]["visible"], 1);
        assert_eq!(view[0]["total"], 2);
        assert_eq!(view[1]["visible"], 0);
    }

    #[test]
    fn test_show_mine_uses_configured_actor() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        board()
            .current_dir(dir.path())
            .args(["show", "--mine"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Acme renewal"))
            .stdout(predicate::str::contains("Globex pilot").not());
    }

    #[test]
    fn test_show_min_value_excludes_unvalued() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        let out = run_ok(&dir, &["show", "--json", "--min-value", "1"]);
        let view: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(view[0]["visible"], 1);
        assert_eq!(view[1]["visible"], 0);
    }

    #[test]
    fn test_show_priority_filter() {
        let dir = TempDir::new().unwrap();
        pipeline(&dir);
        let out = run_ok(&dir, &["show", "--json", "--priority", "high"]);
        let view: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(view[0]["items"][0]["title"], "Globex pilot");
        assert_eq!(view[0]["visible"], 1);
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_custom_store_path() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("board.toml"),
            "[store]\npath = \"data/pipeline.db\"\n",
        )
        .unwrap();
        // init keeps an existing config, so create the store by hand first.
        fs::create_dir_all(dir.path().join("data")).unwrap();
        let db = agency_board::board::db::BoardDb::new(&dir.path().join("data/pipeline.db"));
        assert!(db.is_ok());

        run_ok(&dir, &["add-group", "Lead"]);
        let view = show_json(&dir);
        assert_eq!(view[0]["group"]["title"], "Lead");
    }

    #[test]
    fn test_invalid_config_reports_parse_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("board.toml"), "[board\nkind = ").unwrap();
        board()
            .current_dir(dir.path())
            .arg("show")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse board.toml"));
    }
}

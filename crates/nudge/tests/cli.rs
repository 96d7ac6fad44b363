use assert_cmd::prelude::*;
use assert_fs::prelude::*;

use predicates::prelude::*;
use predicates::str::contains;
use std::process::Command;

const CATALOG: &str = "\
food,category,fodmap,fiber,allergy_tag
white rice,rice,low,low,none
rice porridge,porridge,low,low,none
clear broth,soup,low,low,none
spinach,side-dish,low,high,none
rice noodles,noodle,low,low,none
chicken breast,protein-main,low,low,none
udon,noodle,high,low,gluten allergy
";

const RECORDS: &str = r#"{
  "users": [
    {
      "id": "alice",
      "profile": {"allergies": {"gluten": true}},
      "sleep": [{"date": "2025-03-10", "minutes": 420}],
      "food": [{"date": "2025-03-10", "meal": "lunch", "name": "udon"}],
      "exercise": [
        {"date": "2025-03-09", "steps": 5200},
        {"date": "2025-03-10", "steps": 6100}
      ]
    },
    {
      "id": "bob",
      "sleep": [{"date": "2025-03-10", "minutes": 300}]
    }
  ]
}"#;

/// Command for the `nudge` binary with every path pointed into `temp`.
fn nudge_cmd(temp: &assert_fs::TempDir) -> Command {
  let mut cmd = Command::cargo_bin("nudge").expect("binary exists");
  cmd
    .current_dir(temp.path())
    .arg("--config")
    .arg(temp.child("nudge.yaml").path())
    .env("NUDGE_DATA", temp.child("records.json").path())
    .env("NUDGE_CATALOG", temp.child("catalog.csv").path())
    .env("NUDGE_ARTIFACTS", temp.child("artifacts").path())
    .env_remove("NUDGE_LLM_URL")
    .env_remove("RUST_LOG");
  cmd
}

fn setup() -> assert_fs::TempDir {
  let temp = assert_fs::TempDir::new().unwrap();
  temp.child("nudge.yaml").write_str("rag:\n  enabled: false\nrules:\n  diet_seed: 3\n").unwrap();
  temp.child("catalog.csv").write_str(CATALOG).unwrap();
  temp.child("records.json").write_str(RECORDS).unwrap();
  temp
}

#[test]
fn test_batch_then_show() {
  let temp = setup();

  nudge_cmd(&temp)
    .args(["batch", "--date", "2025-03-10", "--json"])
    .assert()
    .success()
    .stdout(contains("\"processed\": 1").and(contains("\"user\": \"bob\"")));

  temp.child("artifacts/alice/2025-03-10-all.json").assert(predicate::path::exists());

  nudge_cmd(&temp)
    .args(["show", "--user", "alice", "--date", "2025-03-10"])
    .assert()
    .success()
    .stdout(contains("\"model\": \"RULE\"").and(contains("\"target_date\": \"2025-03-11\"")));

  nudge_cmd(&temp)
    .args(["show", "--user", "alice"])
    .assert()
    .success()
    .stdout(contains("2025-03-10"));

  temp.close().unwrap();
}

#[test]
fn test_target_date_for_sleep_flavor() {
  let temp = setup();

  nudge_cmd(&temp)
    .args(["batch", "--flavor", "sleep", "--target-date", "2025-03-11"])
    .assert()
    .success()
    .stdout(contains("processed: 2"));

  temp.child("artifacts/bob/2025-03-10-sleep.json").assert(predicate::path::exists());
  temp.close().unwrap();
}

#[test]
fn test_unknown_user_fails() {
  let temp = setup();

  nudge_cmd(&temp)
    .args(["batch", "--date", "2025-03-10", "--user", "mallory"])
    .assert()
    .failure()
    .stderr(contains("Unknown user: mallory"));

  temp.close().unwrap();
}

#[test]
fn test_date_and_target_date_conflict() {
  let temp = setup();

  nudge_cmd(&temp)
    .args(["batch", "--date", "2025-03-10", "--target-date", "2025-03-11"])
    .assert()
    .failure();

  temp.close().unwrap();
}

#[test]
fn test_recommend_dry_run() {
  let temp = setup();
  temp
    .child("input.json")
    .write_str(
      r#"{"window": {"sleep_hours": 5.5, "weekly_step_counts": [6000, 6000, 6000, 6000, 6000, 6000, 6000]},
          "allergies": ["gluten"]}"#,
    )
    .unwrap();

  nudge_cmd(&temp)
    .args(["recommend", "input.json"])
    .assert()
    .success()
    .stdout(contains("\"Target\": 6500").and(contains("udon").not()));

  temp.child("artifacts").assert(predicate::path::missing());
  temp.close().unwrap();
}

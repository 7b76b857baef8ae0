use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_outcomes_report() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("tests/fixtures/webhooks.jsonl")
        .arg("--collections")
        .arg("tests/fixtures/collections.csv")
        .arg("--workers")
        .arg("1");

    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with(
            "event_id,event_key,applied,reason,final_status\n",
        ))
        .stdout(predicate::str::contains(",evt_1,true,applied,SUCCESS"))
        .stdout(predicate::str::contains(",evt_1,false,duplicate,SUCCESS"))
        .stdout(predicate::str::contains(",evt_2,true,applied,FAILED"))
        .stdout(predicate::str::contains(",evt_3,false,regression_blocked,SUCCESS"))
        .stdout(predicate::str::contains(",evt_4,false,collection_not_found,"))
        .stderr(predicate::str::contains("processing without distributed locks"));

    Ok(())
}

#[test]
fn test_cli_collections_report() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("tests/fixtures/webhooks.jsonl")
        .arg("--collections")
        .arg("tests/fixtures/collections.csv")
        .arg("--report")
        .arg("collections");

    cmd.assert().success().stdout(predicate::str::diff(
        "request_ref,provider_ref,status,amount_total,currency\n\
         req_1,,SUCCESS,1000.00,NGN\n\
         req_2,prov_2,FAILED,250.50,NGN\n\
         req_3,,SUCCESS,75.00,NGN\n",
    ));

    Ok(())
}

#[test]
fn test_cli_events_report_counts_one_row_per_event() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("tests/fixtures/webhooks.jsonl")
        .arg("--collections")
        .arg("tests/fixtures/collections.csv")
        .arg("--workers")
        .arg("1")
        .arg("--report")
        .arg("events");

    let output = cmd.output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 5);
    assert!(stdout.contains(",evt_1,req_1,PROCESSED,applied,1,"));
    assert!(stdout.contains(",evt_4,req_404,FAILED,collection_not_found,0,"));

    Ok(())
}

#[test]
fn test_cli_skips_unreadable_lines() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("webhooks.jsonl");
    std::fs::write(
        &input,
        "{not json}\n\
         {\"event_id\": \"evt_1\", \"request_ref\": \"req_1\", \"status\": \"SUCCESS\"}\n",
    )?;

    let mut cmd = Command::new(cargo_bin!());
    cmd.arg(&input);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",evt_1,false,collection_not_found,"))
        .stderr(predicate::str::contains("skipping unreadable webhook payload"));

    Ok(())
}

#[test]
fn test_cli_missing_input_fails() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("tests/fixtures/does_not_exist.jsonl");
    cmd.assert().failure();
}

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn mediparse() -> Command {
    Command::cargo_bin("mediparse").unwrap()
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const LEGACY_RULES: &str = r#"{
    "columnMappings": {"positionNumberColumn": 0, "descriptionColumn": 1, "priceColumn": 3},
    "transformationRules": {},
    "multiPriceConfig": {"hasMultiplePrices": false, "priceColumns": []},
    "contractMetadata": {"healthInsuranceName": "AOK Bayern", "defaultTax": "REDUCED"},
    "validationRules": {"positionNumberPattern": "\\d{2}\\.\\d{2}\\.\\d{2}", "validityDateRules": {}},
    "conditionalRules": [{
        "name": "KV",
        "enabled": true,
        "condition": {"type": "COLUMN_CONTAINS", "columnIndex": 2, "value": "kv", "caseSensitive": false},
        "actions": [{"type": "SET_FIELD", "fieldName": "costEstimateRequired", "value": "YES", "scope": "POSITION"}]
    }]
}"#;

const TABLE: &str = "Pos.-Nr.;Bezeichnung;Hinweis;Preis
31.03.01;Rollstuhl;;1.234,56
;;;
Fußnote;;;
31.03.02;Rollator;KV;125,50
";

#[test]
fn test_migrate_legacy_document() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "rules.json", LEGACY_RULES);

    mediparse()
        .arg("migrate")
        .arg(&rules)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""tableTypeId": "default""#))
        .stdout(predicate::str::contains(r#""tableName": "Haupttabelle""#))
        .stdout(predicate::str::contains("Spalte 3"));
}

#[test]
fn test_migrate_null_document() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "null.json", "null");

    mediparse()
        .arg("migrate")
        .arg(&rules)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""tableTypeId": "default""#));
}

#[test]
fn test_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    let good = write(&dir, "good.json", LEGACY_RULES);
    let bad = write(
        &dir,
        "bad.json",
        r#"{"tableTypes": [{"tableTypeId": "t1", "tableName": "Preise",
            "validationRules": {"positionNumberPattern": "(31"}}]}"#,
    );

    mediparse().arg("validate").arg(&good).assert().success();

    mediparse()
        .arg("validate")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid positionNumberPattern"));
}

#[test]
fn test_edit_skips_rejected_operations() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "rules.json", LEGACY_RULES);
    let out = dir.path().join("out.json");

    mediparse()
        .arg("edit")
        .arg(&rules)
        .arg("--op")
        .arg(r#"{"op": "deleteTableType", "typeIndex": 0}"#)
        .arg("--op")
        .arg(r#"{"op": "addTableType", "tableName": "Zuschläge"}"#)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("last table type"))
        .stderr(predicate::str::contains("Applied 1 of 2 operations"));

    let written = fs::read_to_string(&out).unwrap();
    assert!(written.contains("Zuschläge"));
    assert!(written.contains("Haupttabelle"));
}

#[test]
fn test_edit_strict_fails_on_rejection() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "rules.json", LEGACY_RULES);

    mediparse()
        .arg("edit")
        .arg(&rules)
        .arg("--strict")
        .arg("--op")
        .arg(r#"{"op": "removeAction", "typeIndex": 0, "ruleIndex": 0, "actionIndex": 0}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Operation 1 rejected"));
}

#[test]
fn test_evaluate_table() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "rules.json", LEGACY_RULES);
    let table = write(&dir, "table.csv", TABLE);

    mediparse()
        .arg("evaluate")
        .arg(&rules)
        .arg(&table)
        .arg("--format")
        .arg("text")
        .assert()
        .success()
        .stdout(predicate::str::contains("Positions: 2"))
        .stdout(predicate::str::contains("1.234,56 EUR"))
        .stdout(predicate::str::contains("rules: KV"));

    mediparse()
        .arg("evaluate")
        .arg(&rules)
        .arg(&table)
        .arg("--format")
        .arg("csv")
        .assert()
        .success()
        .stdout(predicate::str::contains("4,31.03.02,Rollator,,REDUCED,YES,,,\"125,50\""));
}

#[test]
fn test_evaluate_csv_header() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "rules.json", LEGACY_RULES);
    let table = write(&dir, "table.csv", TABLE);

    mediparse()
        .arg("evaluate")
        .arg(&rules)
        .arg(&table)
        .arg("--format")
        .arg("csv")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "copaymentAdult,copaymentChild,copaymentUniversal,appliedRules",
        ));
}

#[test]
fn test_evaluate_unknown_table_type() {
    let dir = TempDir::new().unwrap();
    let rules = write(&dir, "rules.json", LEGACY_RULES);
    let table = write(&dir, "table.csv", TABLE);

    mediparse()
        .arg("evaluate")
        .arg(&rules)
        .arg(&table)
        .arg("--table-type")
        .arg("missing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown table type: missing"));
}

#[test]
fn test_config_path() {
    mediparse()
        .arg("config")
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::contains("mediparse"));
}

#[test]
fn test_config_honours_config_flag() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("c.json");

    mediparse()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::contains("c.json"))
        .stdout(predicate::str::contains("not created"));

    mediparse()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .arg("set")
        .arg("api.base_url")
        .arg("\"https://rules.example.org\"")
        .assert()
        .success();
    assert!(config.exists());

    mediparse()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .arg("get")
        .arg("api.base_url")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://rules.example.org"));
}

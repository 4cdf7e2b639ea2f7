// End-to-end tests for the xwalk binary over CSV-directory workbooks.
//
// Run with: cargo test -p crosswalk-cli --test cli_tests -- --nocapture

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn xwalk(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xwalk"))
        .args(args)
        .current_dir(dir)
        .env_remove("XWALK_LOG")
        .output()
        .expect("spawn xwalk")
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

const CONFIG: &str = r#"
name = "Q2 close"

[source]
file = "source"
sheets = ["Key Metrics"]
header_row = 1

[destination]
file = "dest"
sheets = ["Reported"]
header_row = 1
target_column = 3

[destination.periods]
"2024_Q1" = 2

[periods]
target = "2024_Q2"
historical = "2024_Q1"

[cache]
file = "mapping_cache.csv"
"#;

/// Config plus source and destination workbooks as CSV directories.
fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("source")).unwrap();
    fs::create_dir(root.join("dest")).unwrap();
    fs::write(
        root.join("source/Key Metrics.csv"),
        "Line item,1Q24,2Q24\nRevenue by region,,\nGermany,12000,13500\nChina,8000,9100\n",
    )
    .unwrap();
    fs::write(
        root.join("dest/Reported.csv"),
        "Line item,2024_Q1\nRegion breakdown,\nGermany,12000\nChina,8000\n",
    )
    .unwrap();
    fs::write(root.join("recon.toml"), CONFIG).unwrap();
    dir
}

#[test]
fn run_populates_destination_and_writes_audit() {
    let dir = fixture();
    let out = xwalk(&["run", "recon.toml", "--audit", "audit.csv"], dir.path());
    assert!(out.status.success(), "exit: {:?}\nstderr: {}", out.status, stderr(&out));

    let populated = fs::read_to_string(dir.path().join("populated_dest/Reported.csv")).unwrap();
    assert!(populated.contains("Germany,12000,13500,source|Key Metrics|3|3"), "{populated}");
    assert!(populated.contains("China,8000,9100,source|Key Metrics|4|3"), "{populated}");

    let audit = fs::read_to_string(dir.path().join("audit.csv")).unwrap();
    assert_eq!(audit.matches("HISTORICAL_VERIFICATION").count(), 2, "{audit}");
    assert!(stderr(&out).contains("2 populated"), "{}", stderr(&out));

    // The input template is left untouched.
    let template = fs::read_to_string(dir.path().join("dest/Reported.csv")).unwrap();
    assert!(!template.contains("13500"));

    let cache = fs::read_to_string(dir.path().join("mapping_cache.csv")).unwrap();
    assert!(cache.contains("Reported,3,Key Metrics,3,HISTORICAL_VERIFICATION"), "{cache}");
}

#[test]
fn json_output_is_a_single_document() {
    let dir = fixture();
    let out = xwalk(&["run", "recon.toml", "--dry-run", "--json"], dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let val: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(val["meta"]["config_name"], "Q2 close");
    assert_eq!(val["meta"]["dry_run"], true);
    assert_eq!(val["summary"]["populated"], 2);
    assert!(val["meta"]["audit_sha256"].as_str().unwrap().starts_with("sha256:"));

    // Dry runs write neither the destination nor the cache.
    assert!(!dir.path().join("populated_dest").exists());
    assert!(!dir.path().join("mapping_cache.csv").exists());
}

#[test]
fn missing_sheet_exits_4() {
    let dir = fixture();
    let config = CONFIG.replace(r#"sheets = ["Key Metrics"]"#, r#"sheets = ["Key Metrics", "Cash Flows"]"#);
    fs::write(dir.path().join("bad.toml"), config).unwrap();

    let out = xwalk(&["run", "bad.toml"], dir.path());
    assert_eq!(out.status.code(), Some(4), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("Cash Flows"));
    assert!(!dir.path().join("populated_dest").exists());
}

#[test]
fn invalid_config_exits_3() {
    let dir = fixture();
    fs::write(dir.path().join("bad.toml"), CONFIG.replace("target_column = 3", "target_column = 1")).unwrap();

    let out = xwalk(&["validate", "bad.toml"], dir.path());
    assert_eq!(out.status.code(), Some(3), "stderr: {}", stderr(&out));

    let out = xwalk(&["validate", "recon.toml"], dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("valid"));
}

#[test]
fn unreadable_workbook_exits_5() {
    let dir = fixture();
    fs::remove_dir_all(dir.path().join("source")).unwrap();
    let out = xwalk(&["run", "recon.toml"], dir.path());
    assert_eq!(out.status.code(), Some(5), "stderr: {}", stderr(&out));
}

#[test]
fn scope_prints_entities_as_csv() {
    let dir = fixture();
    let out = xwalk(&["scope", "source", "--header-row", "1"], dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let stdout = String::from_utf8_lossy(&out.stdout);
    let mut lines = stdout.lines();
    assert_eq!(
        lines.next(),
        Some("sheet,row,label,normalized_name,scope_path,percentage,2024_Q1,2024_Q2")
    );
    assert!(lines.next().unwrap().starts_with("Key Metrics,3,Germany,"));
    assert!(lines.next().unwrap().ends_with(",8000,9100"));

    let out = xwalk(&["scope", "source", "--sheet", "Nope"], dir.path());
    assert_eq!(out.status.code(), Some(4));
    assert!(stderr(&out).contains("available sheets: Key Metrics"));
}

#[test]
fn long_version_names_engine_and_target() {
    let dir = tempfile::tempdir().unwrap();
    let out = xwalk(&["--version"], dir.path());
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.starts_with("xwalk "), "{text}");
    assert!(text.contains("engine:  crosswalk-recon"), "{text}");
    assert!(text.contains("target:  "), "{text}");

    let out = xwalk(&["-V"], dir.path());
    assert!(!String::from_utf8_lossy(&out.stdout).contains("engine:"));
}

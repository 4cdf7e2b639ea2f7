// Build metadata for `xwalk --version`.

use std::env;
use std::process::Command;

/// Commit of the tree being built. `XWALK_BUILD_COMMIT` wins, for source
/// tarballs that ship without a .git directory.
fn commit() -> String {
    if let Ok(pinned) = env::var("XWALK_BUILD_COMMIT") {
        if !pinned.trim().is_empty() {
            return pinned.trim().to_string();
        }
    }
    Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=9"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rerun-if-env-changed=XWALK_BUILD_COMMIT");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");

    println!("cargo:rustc-env=XWALK_COMMIT={}", commit());
    for (key, var) in [("XWALK_TARGET", "TARGET"), ("XWALK_PROFILE", "PROFILE")] {
        let value = env::var(var).unwrap_or_else(|_| "unknown".to_string());
        println!("cargo:rustc-env={key}={value}");
    }
}

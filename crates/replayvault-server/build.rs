use std::process::Command;

/// Short commit hash of the checkout, if there is one
fn git_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn main() {
    println!("cargo:rustc-env=VERSION={}", env!("CARGO_PKG_VERSION"));

    // Release builds pass REPLAYVAULT_GIT_SHA; local builds ask git
    let sha = std::env::var("REPLAYVAULT_GIT_SHA")
        .ok()
        .or_else(git_sha)
        .unwrap_or_else(|| "dev".to_string());
    println!("cargo:rustc-env=SHA={}", sha);

    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-env-changed=REPLAYVAULT_GIT_SHA");
}

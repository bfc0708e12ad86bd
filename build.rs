use std::process::Command;

/// Exposes the build's commit as `GIT_HASH`, reported by the root endpoint.
/// A `STEMSPLIT_GIT_HASH` environment variable wins over git, for builds
/// from a source tarball.
fn main() {
    println!("cargo:rerun-if-env-changed=STEMSPLIT_GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    let hash = std::env::var("STEMSPLIT_GIT_HASH")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(git_describe)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", hash.trim());
}

fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--exclude", "*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

//! Build script to capture the git commit hash for the startup log

use std::process::Command;

fn main() {
    // Allow packaging without a checkout (e.g. GIT_HASH=abc123 cargo build)
    println!("cargo:rerun-if-env-changed=GIT_HASH");
    if let Ok(hash) = std::env::var("GIT_HASH") {
        println!("cargo:rustc-env=GIT_HASH={}", hash);
        return;
    }

    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output();

    let git_hash = match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => String::from("unknown"),
    };

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rerun-if-changed=.git/HEAD");
}

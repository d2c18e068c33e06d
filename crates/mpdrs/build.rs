use std::env;
use std::process::Command;

use time::OffsetDateTime;
use time::format_description;

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");

    let revision = match git(&["rev-parse", "--short", "HEAD"]) {
        Some(sha) if is_dirty() => format!("{sha}-dirty"),
        Some(sha) => sha,
        None => "unknown".to_string(),
    };
    println!("cargo:rustc-env=GIT_SHA={revision}");
    println!("cargo:rustc-env=BUILD_DATE={}", build_day());
}

fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    Some(text.trim().to_string())
}

fn is_dirty() -> bool {
    git(&["status", "--porcelain", "--untracked-files=no"]).is_some_and(|s| !s.is_empty())
}

/// Calendar day only; `--version` stays one short line.
fn build_day() -> String {
    let when = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    format_description::parse("[year]-[month]-[day]")
        .ok()
        .and_then(|day| when.format(&day).ok())
        .unwrap_or_else(|| "unknown-date".to_string())
}

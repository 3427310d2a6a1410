use anyhow::{Context, Result};
use chrono::TimeZone;
use std::env;
use std::fs;
use std::process::Command;
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("v[0-9]*"))
        .build()?;

    let gitcl_res = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = gitcl_res {
        eprintln!("git describe unavailable, building without it: {e:?}");
        Emitter::default().idempotent().fail_on_error().emit()?;
    }

    let now = match env::var("SOURCE_DATE_EPOCH") {
        Ok(val) => {
            let secs = val
                .parse::<i64>()
                .context("SOURCE_DATE_EPOCH is not an integer")?;
            chrono::Utc
                .timestamp_opt(secs, 0)
                .single()
                .context("SOURCE_DATE_EPOCH is out of range")?
        }
        Err(_) => chrono::Utc::now(),
    };
    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    let dsdio_version = dsdio_version_from_metadata()
        .or_else(|_| dsdio_version_from_manifest())
        .unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=DSDIO_VERSION={dsdio_version}");
    println!("cargo:rerun-if-changed=dsdio/Cargo.toml");

    Ok(())
}

/// Version of the `dsdio` package as resolved by cargo.
fn dsdio_version_from_metadata() -> Result<String> {
    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let output = Command::new(cargo)
        .args(["metadata", "--format-version", "1", "--no-deps", "--offline"])
        .output()?;
    if !output.status.success() {
        anyhow::bail!("cargo metadata failed");
    }

    let metadata: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    metadata["packages"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|package| package["name"].as_str() == Some("dsdio"))
        .and_then(|package| package["version"].as_str())
        .map(str::to_string)
        .context("dsdio package not found in metadata")
}

fn dsdio_version_from_manifest() -> Result<String> {
    let manifest = fs::read_to_string("dsdio/Cargo.toml")?;
    manifest
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("version") && line.contains('='))
        .and_then(|line| line.split_once('='))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .context("no version in dsdio/Cargo.toml")
}

// Examples are allowed to use expect/unwrap for simplicity
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Power-failure walkthrough.
//!
//! Mounts a flakey filesystem, writes one fsynced and one unsynced file,
//! runs an append workload for two seconds, cuts power and reports what
//! survived.
//!
//! # Usage
//!
//! ```bash
//! # ext4 on a 1 GiB image
//! sudo -E cargo run --example power_failure
//!
//! # xfs with a TOML config
//! sudo -E cargo run --example power_failure -- xfs flakey.toml
//!
//! RUST_LOG=debug sudo -E cargo run --example power_failure
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use dmflakey::prelude::*;
use tracing_subscriber::EnvFilter;

const DEVICE: &str = "flakey-demo";

fn write_file(path: &Path, contents: &str, fsync: bool) -> anyhow::Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(contents.as_bytes())?;
    if fsync {
        file.sync_all()?;
    }
    Ok(())
}

fn report(path: &Path) {
    match fs::read_to_string(path) {
        Ok(contents) => tracing::info!("{}: survived ({:?})", path.display(), contents),
        Err(e) => tracing::info!("{}: lost ({e})", path.display()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let fs_type: FsType = args.next().as_deref().unwrap_or("ext4").parse()?;
    let config = match args.next() {
        Some(path) => FlakeyConfig::load(&path).with_context(|| format!("load {path}"))?,
        None => FlakeyConfig {
            image_size: 1024 * 1024 * 1024,
            ..FlakeyConfig::default()
        },
    };

    if let Some(reason) = skip_reason(&[fs_type]) {
        bail!("cannot run the demo: {reason}");
    }

    let mut fixture = FlakeyFixture::with_config(DEVICE, fs_type, "", &config)?;
    let root = fixture.root_fs().to_path_buf();
    tracing::info!(
        "{} ({fs_type}) mounted on {}",
        fixture.flakey().device_path().display(),
        root.display()
    );

    let synced = root.join("synced");
    let unsynced = root.join("unsynced");
    let log = root.join("appends");
    write_file(&synced, "persisted with fsync\n", true)?;
    write_file(&unsynced, "only in the page cache\n", false)?;

    let output = Workload::new("sh")
        .arg("-c")
        .arg(format!("while :; do date +%s%N >> '{}'; done", log.display()))
        .run_for(Duration::from_secs(2))
        .await?;
    tracing::info!(
        "workload ran for {:?} (killed: {})",
        output.elapsed,
        output.killed
    );

    fixture.power_failure(None)?;

    report(&synced);
    report(&unsynced);
    match fs::read_to_string(&log) {
        Ok(contents) => tracing::info!("{}: {} lines survived", log.display(), contents.lines().count()),
        Err(e) => tracing::info!("{}: lost ({e})", log.display()),
    }

    let table = fixture.flakey().live_table()?;
    tracing::info!("live table: {table}");

    fixture.close()?;
    Ok(())
}

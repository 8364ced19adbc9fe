pub mod cli;
pub mod command;
pub mod commands;
pub mod config;
pub mod form;
pub mod model;
pub mod render;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

pub use model::Variant;

#[tracing::instrument(skip_all, fields(variant = variant.as_str()))]
pub fn run(raw_args: Vec<OsString>, variant: Variant) -> anyhow::Result<()> {
    let split = cli::split_rc_overrides(&raw_args);
    let cli = cli::GlobalCli::parse_from(split.argv);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        variant = variant.as_str(),
        "starting choreplug"
    );
    debug!(overrides = ?split.rc_overrides, "positional rc overrides");

    let mut cfg = config::Config::load(cli.rcfile.as_deref())?;
    cfg.apply_overrides(
        split
            .rc_overrides
            .into_iter()
            .chain(cli.rc_overrides)
            .map(|kv| (kv.key, kv.value)),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let storage = storage::FileStorage::open(&data_dir)
        .with_context(|| format!("failed to open storage at {}", data_dir.display()))?;
    let mut tracker = tracker::Tracker::open(store::ConfigStore::new(storage, variant))?;

    let renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    commands::dispatch(&mut tracker, &cfg, &renderer, inv)?;

    info!("done");
    Ok(())
}

pub mod analytics;
pub mod category;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod identity;
pub mod legacy;
pub mod render;
pub mod scheduler;
pub mod slots;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting daygrid CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.daygridrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir,
      &cfg.storage_key()
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let date = datetime::parse_date_expr(
    &cli.date,
    Utc::now()
  )
  .with_context(|| {
    format!(
      "invalid --date value: {}",
      cli.date
    )
  })?;

  let mut scheduler =
    scheduler::Scheduler::new(
      store, date
    );
  let mut renderer =
    render::Renderer::new(&cfg)?;

  commands::dispatch(
    &mut scheduler,
    &cfg,
    &mut renderer,
    cli
      .command
      .unwrap_or(cli::Command::Slots),
    &data_dir
  )?;

  info!("done");
  Ok(())
}

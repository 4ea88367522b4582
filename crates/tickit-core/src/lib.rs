pub mod advisor;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod datetime;
pub mod gemini;
pub mod render;
pub mod state;
pub mod store;
pub mod task;
pub mod view;

use std::ffi::OsString;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub async fn run(
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
    "starting tickit"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
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

  let store = store::FileStore::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open task store at \
       {}",
      data_dir.display()
    )
  })?;
  let repo =
    store::TaskRepository::new(
      Box::new(store)
    );

  let advisor =
    advisor::Advisor::from_config(
      &cfg
    )?;

  let mut ctl =
    controller::Controller::open(
      repo, advisor
    );
  if let Some(secs) =
    cfg.get_u64("celebration.seconds")?
  {
    ctl = ctl.with_celebration_ttl(
      Duration::from_secs(secs)
    );
  }

  let mut renderer =
    render::Renderer::new(&cfg)?;

  commands::dispatch(
    &mut ctl,
    &cfg,
    &mut renderer,
    cli.command
  )
  .await?;

  info!("done");
  Ok(())
}

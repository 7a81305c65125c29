use std::{io::IsTerminal, sync::Arc};

use anyhow::Context;
use tbc_core::{
    clock::{Clock, TokioClock},
    config::{Config, SessionConfig},
    directory::DirectoryClient,
    formatting::{format_console_line, format_csv, format_summary},
    pipeline::Pipeline,
    throttle::ThrottledDirectory,
};
use tbc_mtproto::MtprotoDirectory;
use tbc_telegram::TelegramDirectory;

mod input;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tbc_core::logging::init("tbc")?;

    let cfg = Config::load()?;
    let inputs = input::read_inputs(&cfg.input_file).await?;
    tracing::info!(
        count = inputs.len(),
        file = %cfg.input_file.display(),
        "inputs loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let session = connect(&cfg)
        .await
        .context("failed to open telegram session")?;
    let client: Arc<dyn DirectoryClient> = Arc::new(ThrottledDirectory::new(
        session,
        Arc::clone(&clock),
        cfg.min_request_interval,
    ));

    let pipeline = Pipeline::new(client, clock, cfg.pipeline());
    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, aborting run");
            cancel.cancel();
        }
    });

    let report = pipeline.run(inputs).await;

    let color = !cfg.no_color && std::io::stdout().is_terminal();
    for r in &report.results {
        println!("{}", format_console_line(r, cfg.output_mode, color)?);
    }
    println!();
    println!("{}", format_summary(&report.summary, color));

    if let Some(path) = &cfg.output_file {
        let csv = format_csv(&report.results, cfg.csv_only_valid);
        tokio::fs::write(path, csv)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(file = %path.display(), "results written");
    }

    if !cfg.wait_before_exit.is_zero() {
        tokio::time::sleep(cfg.wait_before_exit).await;
    }
    Ok(())
}

async fn connect(cfg: &Config) -> tbc_core::Result<Arc<dyn DirectoryClient>> {
    Ok(match &cfg.session {
        SessionConfig::User {
            api_id,
            api_hash,
            session_file,
            phone,
        } => Arc::new(
            MtprotoDirectory::connect(*api_id, api_hash, session_file, phone.as_deref()).await?,
        ),
        SessionConfig::Bot { token } => {
            tracing::warn!("bot session: invite links and the verified flag are unavailable");
            Arc::new(TelegramDirectory::connect(token, cfg.request_timeout).await?)
        }
    })
}

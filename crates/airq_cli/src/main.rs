mod cli;
mod config;
mod render;

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use airq_core::{ClientView, JobId, JobKind, Notice, Outcome};
use airq_engine::{ClientConfig, JobClient};
use anyhow::{bail, Result};
use clap::Parser;
use engine_logging::{engine_error, engine_info};
use log::LevelFilter;
use tokio::sync::broadcast::{self, error::RecvError};

use cli::{Cli, CliCommand};
use config::FileConfig;
use render::{JobRenderer, UploadRenderer};

/// How long to wait for the post-job server refresh before giving up on it.
const RECONCILE_WAIT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    engine_logging::initialize(cli.log.destination(), level);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            engine_error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::default();
    if let Some(path) = &cli.config {
        FileConfig::load(path)?.apply(&mut config);
    }
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(transport) = cli.transport {
        config.transport_mode = transport.into();
    }
    Ok(config)
}

/// Returns whether the requested operation succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let config = build_config(&cli)?;
    engine_info!("Using backend {}", config.base_url);
    let client = JobClient::new(config)?;

    match cli.command {
        CliCommand::Upload { file } => {
            let notices = client.notices();
            let id = client.upload(&file).await?;
            let renderer = UploadRenderer::new(&display_name(&file));
            let notice = follow(&client, id, notices, |view| {
                renderer.update(view.upload.as_ref().filter(|upload| upload.id == id))
            })
            .await?;
            renderer.finish(&notice);
            if notice.outcome == Outcome::Uploaded {
                report_reconcile(&client, id).await;
            }
            Ok(notice.outcome == Outcome::Uploaded)
        }
        CliCommand::Run { kind } => {
            let notices = client.notices();
            let id = client.start(kind.into()).await?;
            let mut renderer = JobRenderer::new(JobKind::from(kind).as_str());
            let notice = follow(&client, id, notices, |view| renderer.update(view)).await?;
            renderer.finish(&notice);
            report_reconcile(&client, id).await;
            Ok(notice.outcome == Outcome::Completed)
        }
        CliCommand::Refresh => {
            let snapshot = client.refresh().await?;
            for line in render::snapshot_lines(&snapshot) {
                println!("{line}");
            }
            Ok(true)
        }
    }
}

/// Renders published views until the terminal notice for `subject` arrives.
/// Ctrl-C requests cancellation once; the notice still ends the loop.
async fn follow(
    client: &JobClient,
    subject: JobId,
    mut notices: broadcast::Receiver<Notice>,
    mut render: impl FnMut(&ClientView),
) -> Result<Notice> {
    let mut views = client.watch();
    let initial = views.borrow_and_update().clone();
    render(&initial);
    let mut interrupted = false;

    loop {
        tokio::select! {
            received = notices.recv() => match received {
                Ok(notice) if notice.subject == subject => {
                    render(&client.view());
                    return Ok(notice);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("job client stopped before {subject} finished"),
            },
            changed = views.changed() => {
                if changed.is_err() {
                    bail!("job client stopped before {subject} finished");
                }
                let view = views.borrow_and_update().clone();
                render(&view);
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(err) = signal {
                    engine_error!("Cannot listen for Ctrl-C: {err}");
                    continue;
                }
                engine_info!("Interrupted; cancelling {subject}");
                client.cancel().await;
            }
        }
    }
}

async fn report_reconcile(client: &JobClient, subject: JobId) {
    let waited = tokio::time::timeout(
        RECONCILE_WAIT,
        client.wait_for(|view| view.reconciled_for == Some(subject)),
    )
    .await;
    let view = match waited {
        Ok(Ok(view)) => view,
        Ok(Err(err)) => {
            engine_error!("Server refresh after {subject} unavailable: {err}");
            return;
        }
        Err(_) => {
            eprintln!("server refresh timed out");
            return;
        }
    };
    if let Some(err) = &view.reconcile_error {
        eprintln!("server refresh failed: {err}");
    } else if let Some(snapshot) = &view.server {
        for line in render::snapshot_lines(snapshot) {
            println!("{line}");
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

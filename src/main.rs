//! CLI entry point for the `fetch` tool.

use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::Parser;
use connection_request::{
    ConnectionRequest, JsonTransform, ParseError, Progress, RequestDescriptor, ReqwestTransport,
    ResultTransform, Transport, TransportConfig, cancel_everything,
};
use futures_util::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

/// Variant key for every request this binary issues.
struct Fetch;

type Render = Box<dyn Fn(Bytes) -> Result<String, ParseError> + Send + Sync>;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = load_config(&args)?;
    let transport: Arc<dyn Transport> = Arc::new(
        ReqwestTransport::with_config(&config).context("failed to build HTTP transport")?,
    );

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            let cancelled = cancel_everything();
            warn!(cancelled, "interrupted, cancelled in-flight requests");
        }
    });

    let multi = if !args.quiet && io::stderr().is_terminal() {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    };

    let mut requests = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        let bar = multi.add(new_bar(url));
        let tracked = bar.clone();
        let mut builder = ConnectionRequest::builder(describe(&args, url))
            .variant::<Fetch>()
            .transform(renderer(args.json))
            .transport(Arc::clone(&transport))
            .on_progress(move |progress| track(&tracked, progress));
        if let Some(dir) = &args.output_dir {
            builder = builder.download_dir(dir);
        }
        requests.push((builder.build(), bar));
    }

    info!(requests = requests.len(), method = %args.effective_method(), "starting requests");

    let download = args.download;
    let outcomes = join_all(requests.iter().map(|(request, bar)| async move {
        let outcome = if download {
            request
                .download(None)
                .await
                .map(|path| path.display().to_string())
        } else {
            request.send().await
        };
        bar.finish_and_clear();
        outcome
    }))
    .await;

    let mut failed = 0usize;
    for ((request, _), outcome) in requests.iter().zip(outcomes) {
        let url = request.descriptor().url();
        match outcome {
            Ok(output) => {
                info!(
                    url,
                    status = request.response().map(|r| r.status),
                    bytes = request.bytes_received(),
                    duration_ms = request
                        .duration()
                        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                    "request completed"
                );
                println!("{output}");
            }
            Err(error) if error.is_cancelled() => {
                failed += 1;
                warn!(url, "request cancelled");
            }
            Err(error) => {
                failed += 1;
                warn!(url, code = error.code(), error = %error, "request failed");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} requests did not complete", requests.len());
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<TransportConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => TransportConfig::default().with_env_overrides(),
    };
    if let Some(secs) = args.connect_timeout {
        config.connect_timeout_secs = secs;
    }
    if let Some(secs) = args.read_timeout {
        config.read_timeout_secs = secs;
    }
    if let Some(user_agent) = &args.user_agent {
        config.user_agent = Some(user_agent.clone());
    }
    config.validate()?;
    debug!(?config, "transport configuration resolved");
    Ok(config)
}

fn read_config(path: &Path) -> Result<TransportConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid config file {}", path.display()))
}

fn describe(args: &Args, url: &str) -> RequestDescriptor {
    let descriptor = RequestDescriptor::new(url)
        .with_method(args.effective_method())
        .with_headers(args.headers.iter().cloned());
    match &args.data {
        Some(data) => descriptor.with_body(data.clone()),
        None => descriptor,
    }
}

fn renderer(json: bool) -> Render {
    if json {
        Box::new(|data: Bytes| -> Result<String, ParseError> {
            let value = JsonTransform::new().parse(data)?;
            Ok(serde_json::to_string_pretty(&value)?)
        })
    } else {
        Box::new(|data: Bytes| -> Result<String, ParseError> {
            Ok(String::from_utf8_lossy(&data).into_owned())
        })
    }
}

fn new_bar(url: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} {bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(url.to_string());
    bar
}

fn track(bar: &ProgressBar, progress: Progress) {
    if let Some(total) = progress.bytes_expected {
        if bar.length() != Some(total) {
            bar.set_length(total);
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:30}] {bytes}/{total_bytes} ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
        }
    }
    bar.set_position(progress.bytes_received);
}

//! CLI entry point: `fbcheck check` runs the pipeline against a file or
//! stdin, `fbcheck serve` runs the proxy relay the checker talks to.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fbcheck::client::ProxyClient;
use fbcheck::config;
use fbcheck::i18n::{detect_lang, Lang, Messages};
use fbcheck::pipeline::tokenizer::input_stats;
use fbcheck::pipeline::{run_check, CheckConfig, CheckError, CheckEvent, Protocol, RunContext};
use fbcheck::proxy::{self, ProxyConfig};

#[derive(Parser)]
#[command(name = "fbcheck")]
#[command(about = "Bulk Facebook account status checker", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check accounts from a file (or stdin) and write result buckets
    Check {
        /// Input file; stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Proxy base URL (falls back to the FBCHECK_PROXY variable)
        #[arg(long)]
        proxy: Option<String>,

        /// Verification protocol: per-id or batch
        #[arg(long, default_value = "per-id")]
        protocol: String,

        /// Worker pool width for per-id checks
        #[arg(long)]
        concurrency: Option<usize>,

        /// Directory for valid.txt / invalid.txt / duplicates.txt
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Display language (ru, uk, en); persisted for later runs
        #[arg(long)]
        lang: Option<String>,
    },
    /// Run the proxy relay
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Upstream batch check endpoint
        #[arg(long, default_value = proxy::DEFAULT_UPSTREAM_CHECK_URL)]
        upstream_check: String,

        /// Upstream per-id lookup base
        #[arg(long, default_value = proxy::DEFAULT_UPSTREAM_UID_BASE)]
        upstream_uid: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match Cli::parse().command {
        Commands::Check {
            input,
            proxy,
            protocol,
            concurrency,
            out_dir,
            lang,
        } => check_command(input, proxy, protocol, concurrency, out_dir, lang).await,
        Commands::Serve {
            bind,
            upstream_check,
            upstream_uid,
        } => {
            let config = ProxyConfig {
                bind_addr: bind,
                upstream_check_url: upstream_check,
                upstream_uid_base: upstream_uid,
            };
            match proxy::serve(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn check_command(
    input: Option<PathBuf>,
    proxy_flag: Option<String>,
    protocol: String,
    concurrency: Option<usize>,
    out_dir: PathBuf,
    lang_flag: Option<String>,
) -> ExitCode {
    let lang = select_language(lang_flag.as_deref());
    let messages = lang.messages();

    let Some(protocol) = Protocol::from_str(&protocol) else {
        eprintln!("Unknown protocol '{protocol}' (expected per-id or batch)");
        return ExitCode::FAILURE;
    };

    let env_proxy = std::env::var("FBCHECK_PROXY").ok();
    let Some(base_url) = config::resolve_proxy_base(proxy_flag.as_deref(), env_proxy.as_deref())
    else {
        eprintln!("{}", CheckError::Config(messages.proxy_missing.to_string()));
        return ExitCode::FAILURE;
    };

    let text = match read_input(input.as_deref()) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Cannot read input: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stats = input_stats(&text);
    eprintln!(
        "{}",
        messages.format_input_stats(stats.non_blank_lines, stats.identifiers_found)
    );

    let mut check_config = CheckConfig {
        protocol,
        user_lang: lang.as_str().to_string(),
        ..CheckConfig::default()
    };
    if let Some(concurrency) = concurrency {
        check_config.concurrency = concurrency;
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let ctx = Arc::new(RunContext::with_events(tx));
    let printer = tokio::spawn(print_events(rx, lang));

    // Stop on ctrl-c: no new checks start, in-flight ones still finish.
    let cancel_ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", lang.messages().stopping);
            cancel_ctx.cancel();
        }
    });

    let checker = ProxyClient::new(&base_url, &check_config);
    let report = run_check(&text, &checker, &check_config, &ctx).await;
    let _ = printer.await;

    if let Err(e) = write_buckets(&out_dir, &report.buckets) {
        eprintln!("Cannot write results: {e}");
        return ExitCode::FAILURE;
    }

    for error in &report.errors {
        eprintln!("{}: {error}", messages.network_error);
    }
    println!("{}", messages.format_summary(&report.summary));

    ExitCode::SUCCESS
}

/// An explicit flag wins and is persisted for later runs; otherwise the
/// saved setting, then the locale tag.
fn select_language(flag: Option<&str>) -> Lang {
    if let Some(lang) = flag.and_then(Lang::from_str) {
        let settings = config::Settings {
            lang: Some(lang.as_str().to_string()),
        };
        if let Err(e) = config::save_settings(&settings) {
            tracing::debug!(error = %e, "Cannot persist language setting");
        }
        return lang;
    }

    let saved = config::load_settings().lang;
    let tag = std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .ok();
    detect_lang(saved.as_deref(), tag.as_deref())
}

fn read_input(path: Option<&Path>) -> io::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path),
        None => io::read_to_string(io::stdin()),
    }
}

async fn print_events(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<CheckEvent>,
    lang: Lang,
) {
    let messages: &Messages = lang.messages();
    while let Some(event) = rx.recv().await {
        match event {
            CheckEvent::Started { total_ids } => {
                eprintln!("{} 0/{total_ids}", messages.checking);
            }
            CheckEvent::Progress {
                completed, total, ..
            } => {
                eprint!("\r{} {completed}/{total}", messages.checking);
            }
            CheckEvent::ChunkCompleted {
                completed, total, ..
            } => {
                eprintln!("{} {completed}/{total}", messages.checking);
            }
            CheckEvent::Completed { .. } => {
                eprintln!();
                break;
            }
            CheckEvent::Failed { error } => {
                eprintln!("\n{}: {error}", messages.network_error);
                break;
            }
        }
    }
}

fn write_buckets(
    out_dir: &Path,
    buckets: &fbcheck::pipeline::types::ResultBuckets,
) -> io::Result<()> {
    fs::create_dir_all(out_dir)?;
    write_lines(&out_dir.join("valid.txt"), &buckets.valid)?;
    write_lines(&out_dir.join("invalid.txt"), &buckets.invalid)?;
    write_lines(&out_dir.join("duplicates.txt"), &buckets.duplicates)?;
    Ok(())
}

fn write_lines(path: &Path, lines: &[String]) -> io::Result<()> {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content)
}

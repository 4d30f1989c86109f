use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use org_mail_todo::config::{Config, DEFAULT_CONFIG_FILE, LogConfig};
use org_mail_todo::mail::ImapMailbox;
use org_mail_todo::scraper::Scraper;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    // Keep the guard alive so buffered file output is flushed on exit.
    let _log_guard = init_logging(&config.log)?;

    tracing::info!(
        "org-mail-todo v{} → {}",
        env!("CARGO_PKG_VERSION"),
        config.org.diary_file.display()
    );

    let scraper = Scraper::new(&config)?;
    let report = scraper.run(ImapMailbox::connect).inspect_err(|e| {
        tracing::error!("Scrape run aborted: {e}");
    })?;

    if let Some(backup) = &report.backup {
        tracing::info!(
            added = report.added,
            backup = %backup.display(),
            "Run complete"
        );
    }

    Ok(())
}

/// Log to stderr, plus `log.file` when configured.
fn init_logging(log: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &log.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn open_log_file(path: &Path) -> anyhow::Result<tracing_appender::rolling::RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .with_context(|| format!("log file {} has no file name", path.display()))?;

    tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("opening log file {}", path.display()))
}

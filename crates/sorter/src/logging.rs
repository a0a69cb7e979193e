use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn,backup_sorter=info,backup_sorter_core=info";

/// Install the global subscriber: human-readable lines on stderr, plus an
/// appended plain-text copy when `log_file` is given.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = log_file
        .map(|path| -> anyhow::Result<_> {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)))
        })
        .transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

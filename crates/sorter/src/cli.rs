use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use backup_sorter::{logging, Config, Organizer, Stage};

const TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(" {spinner} {msg}")
        .unwrap()
        .tick_chars("▏▎▍▌▋▊▉█▉▋▌▍▎")
}

#[derive(Parser)]
#[command(name = "backup-sorter")]
#[command(version)]
#[command(about = "Restore folders, names and timestamps for an unpacked messenger backup")]
struct Cli {
    #[arg(help = "Unpacked backup directory", required_unless_present = "print_config")]
    source: Option<PathBuf>,
    #[arg(short, long, help = "Descend into subdirectories")]
    recursive: bool,
    #[arg(short, long, env = "BACKUP_SORTER_CONFIG", help = "JSON configuration file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Also append the log to this file")]
    log_file: Option<PathBuf>,
    #[arg(long, help = "Format timestamps in UTC instead of local time")]
    utc: bool,
    #[arg(long, help = "Mark thumbnails instead of deleting them")]
    keep_thumbnails: bool,
    #[arg(long, help = "Print the effective configuration as JSON and exit")]
    print_config: bool,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Config::default(),
        };
        config.recursive |= self.recursive;
        config.use_utc |= self.utc;
        config.thumbnail.auto_delete &= !self.keep_thumbnails;
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match &cli.source {
        Some(source) => cmd_sort(source, config),
        None => anyhow::bail!("no source directory given"),
    }
}

fn cmd_sort(source: &Path, config: Config) -> Result<()> {
    logging::init(config.log_file.as_deref())?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.enable_steady_tick(Duration::from_millis(TICK_MS));

    let organizer = Organizer::new(source, config);
    let result = organizer.run_with_progress(|stage| {
        if stage != Stage::Done {
            pb.set_message(stage.to_string());
        }
    });
    pb.finish_and_clear();

    let report = result?;
    println!("Sorted {}\n", source.display());
    println!("{}", report);

    for stage in report.stages.iter().filter(|s| !s.issues.is_empty()) {
        println!("\n{} ({} issues):", stage.stage, stage.issues.len());
        for issue in &stage.issues {
            println!("  - {}", issue);
        }
    }
    Ok(())
}

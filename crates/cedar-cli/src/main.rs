use anyhow::Context;
use cedar_common::StorageConfig;
use cedar_query::Selection;
use cedar_storage::Table;
use clap::{Args, Parser};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Loads a CSV table, indexes every field and runs one equality selection.
#[derive(Parser)]
#[command(name = "cedar", version, about = "Cedar B+ tree selection tool", long_about = None)]
struct Cli {
    /// CSV file with a header line.
    csv: PathBuf,

    /// Equality term `field=value`; repeat for a conjunction.
    #[arg(short = 'w', long = "where", value_name = "FIELD=VALUE")]
    terms: Vec<String>,

    /// Save the selected tuples as CSV.
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// Check the structure of every index after loading.
    #[arg(long)]
    verify: bool,

    #[command(flatten)]
    storage: StorageArgs,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

#[derive(Args)]
struct StorageArgs {
    /// JSON storage configuration file.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Directory for table data, indices and results.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Branching factor of every index.
    #[arg(short = 'm', long = "branching-factor")]
    branching_factor: Option<usize>,

    /// Tuples per tuple-store page.
    #[arg(long = "page-capacity")]
    page_capacity: Option<usize>,

    /// Sync index and page writes to disk.
    #[arg(long)]
    fsync: bool,
}

impl StorageArgs {
    fn resolve(&self) -> anyhow::Result<StorageConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str::<StorageConfig>(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => StorageConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(m) = self.branching_factor {
            config.index.set_branching_factor(m);
        }
        if let Some(capacity) = self.page_capacity {
            config.page_capacity = capacity;
        }
        if self.fsync {
            config.fsync_enabled = true;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = cli.storage.resolve()?;
    let mut table = Table::create(&config, &cli.csv)
        .with_context(|| format!("loading table from {}", cli.csv.display()))?;

    if cli.verify {
        for field in table.schema().fields().to_vec() {
            let shape = table.index_mut(&field)?.verify()?;
            println!(
                "{}: depth {} nodes {} leaves {} keys {}",
                field, shape.depth, shape.nodes, shape.leaves, shape.keys
            );
        }
    }

    if cli.terms.is_empty() {
        if cli.out.is_some() {
            anyhow::bail!("--out needs at least one --where term");
        }
        return Ok(());
    }

    let selection = Selection::parse(cli.terms.as_slice())?;
    let output = selection.execute(&mut table)?;
    println!("{}", output.stats());

    if let Some(path) = &cli.out {
        output
            .save_csv(path)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "selection saved");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(config: Option<PathBuf>, branching_factor: Option<usize>) -> StorageArgs {
        StorageArgs {
            config,
            data_dir: None,
            branching_factor,
            page_capacity: None,
            fsync: false,
        }
    }

    #[test]
    fn test_branching_flag_keeps_loaded_header_width() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cedar.json");
        fs::write(&path, r#"{"index": {"branching_factor": 10, "header_width": 64}}"#).unwrap();

        let config = args(Some(path), Some(20)).resolve().unwrap();
        assert_eq!(config.index.branching_factor, 20);
        assert_eq!(config.index.header_width, 64);
        assert_eq!(config.index.line_width, 2010);
    }

    #[test]
    fn test_huge_branching_flag_is_rejected() {
        assert!(args(None, Some(usize::MAX / 50)).resolve().is_err());
    }
}

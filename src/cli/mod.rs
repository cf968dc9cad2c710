//! Command-line interface.
//!
//! Reads blocks as JSON lines from a file or stdin, computes the chain's
//! metric tree for each one and streams the result as CSV or JSON lines.

use crate::chain::{chain_metrics, inbox_table, BlockWithReceipts};
use crate::core::config::ConfigBuilder;
use crate::core::{ChainConfig, Config, ExportConfig, LogLevel, MetricsError, Result};
use crate::export::{run_export, CsvExporter, ExportFormat, ExportStats};
use crate::metrics::AggregateMetric;
use crate::source::{record_stream, BlockReader, ReadStats};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Export onchain metrics from a stream of blocks.
#[derive(Parser, Debug)]
#[command(name = "onchain-metrics")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/onchain-metrics/config.yaml)
    #[arg(short, long, env = "ONCHAIN_METRICS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Chain to export, required when several are configured
    #[arg(long, env = "ONCHAIN_METRICS_CHAIN")]
    pub chain: Option<String>,

    /// Block input as JSON lines, `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub input: String,

    /// Metrics output, `-` for stdout
    #[arg(short, long, default_value = "-")]
    pub output: String,

    /// Output format: csv or json
    #[arg(short, long, env = "ONCHAIN_METRICS_FORMAT")]
    pub format: Option<ExportFormat>,

    /// Records per JSON-lines flush
    #[arg(long, env = "ONCHAIN_METRICS_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Write a CSV header line before the first record
    #[arg(long)]
    pub csv_header: bool,

    /// Enable debug logging
    #[arg(short, long, env = "ONCHAIN_METRICS_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Print the series of the chain's metric tree and exit
    #[arg(long)]
    pub list_series: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("onchain-metrics").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/onchain-metrics/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
            },
            Err(e) if self.config.is_some() => {
                return Err(MetricsError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {},
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(format) = self.format {
            builder = builder.format(format);
        }
        if let Some(size) = self.batch_size {
            builder = builder.batch_size(size);
        }
        if self.csv_header {
            builder = builder.csv_header(true);
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging.
    ///
    /// `RUST_LOG` wins over everything; otherwise `--debug` forces debug and
    /// the configured level applies. Logs go to stderr, stdout carries
    /// metrics.
    pub fn init_logging(&self, level: LogLevel) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = if self.debug { "debug" } else { level.as_str() };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.debug)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| MetricsError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Counters of a finished pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub read: ReadStats,
    pub export: ExportStats,
}

/// Read blocks from `input`, export the tree's values to `out`.
///
/// The reader runs as its own task behind a bounded channel. An export
/// failure wins over a reader failure; a reader failure (a malformed line,
/// say) surfaces after the records before it were exported.
pub async fn run_pipeline<R, W>(
    chain: &ChainConfig,
    export: &ExportConfig,
    tree: &AggregateMetric<BlockWithReceipts>,
    cancel: &CancellationToken,
    input: R,
    out: &mut W,
) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (tx, rx) = mpsc::channel(export.channel_capacity);
    let reader = BlockReader::new().with_min_time(chain.min_time);
    let reader_cancel = cancel.child_token();
    // stops a reader still waiting on open input once the export is over
    let stop_reader = reader_cancel.clone().drop_guard();
    let reader_task = tokio::spawn(async move { reader.run(&reader_cancel, input, tx).await });

    if export.format == ExportFormat::Csv && export.csv_header {
        let header = CsvExporter::new(tree, BlockWithReceipts::time).header();
        out.write_all(header.as_bytes())
            .await
            .map_err(|source| MetricsError::Write {
                context: "CSV header".to_string(),
                source,
            })?;
    }

    let exported = run_export(
        export.format,
        export.batch_size,
        tree,
        BlockWithReceipts::time,
        cancel,
        record_stream(rx),
        out,
    )
    .await;

    drop(stop_reader);
    let read = reader_task.await.map_err(|e| MetricsError::Io(std::io::Error::other(e)))?;

    let export = exported?;
    let read = read?;
    Ok(RunSummary { read, export })
}

/// Execute the application.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(config.logging.level)?;

    let (name, chain) = config.select_chain(cli.chain.as_deref())?;
    let inboxes = chain.l1_chain_id.map(inbox_table).transpose()?;
    let tree = chain_metrics(chain.kind, inboxes);

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Chain: {} ({})", name, chain.kind);
        if let Some(l1) = &chain.l1 {
            println!("  L1: {}", l1);
        }
        println!("  Min time: {}", chain.min_time);
        println!("  Format: {}", config.export.format);
        println!("  Batch size: {}", config.export.batch_size);
        println!("  Channel capacity: {}", config.export.channel_capacity);
        println!("  Series: {}", tree.width());
        return Ok(());
    }

    if cli.list_series {
        print!("{}", tree);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal, stopping...");
            shutdown.cancel();
        }
    });

    let input = open_input(&cli.input).await?;
    let mut out = open_output(&cli.output).await?;

    tracing::info!(
        chain = %name,
        kind = %chain.kind,
        format = %config.export.format,
        series = tree.width(),
        "Starting export"
    );

    match run_pipeline(&chain, &config.export, &tree, &cancel, input, &mut out).await {
        Ok(summary) => {
            tracing::info!(
                chain = %name,
                records = summary.export.records,
                skipped = summary.read.skipped,
                bytes = summary.export.bytes,
                "Export complete"
            );
            Ok(())
        },
        Err(e) if e.is_cancelled() => {
            // flush what the exporter already wrote before stopping
            if let Err(e) = out.flush().await {
                tracing::warn!("Failed to flush output: {}", e);
            }
            tracing::info!(chain = %name, "Export stopped");
            Ok(())
        },
        Err(e) => {
            tracing::error!(chain = %name, category = e.category(), "Export failed: {}", e);
            Err(e)
        },
    }
}

async fn open_input(path: &str) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| MetricsError::config(format!("Failed to open input {:?}: {}", path, e)))?;
    Ok(Box::new(BufReader::new(file)))
}

async fn open_output(path: &str) -> Result<BufWriter<Box<dyn AsyncWrite + Unpin + Send>>> {
    let sink: Box<dyn AsyncWrite + Unpin + Send> = if path == "-" {
        Box::new(tokio::io::stdout())
    } else {
        let file = tokio::fs::File::create(path).await.map_err(|e| {
            MetricsError::config(format!("Failed to create output {:?}: {}", path, e))
        })?;
        Box::new(file)
    };
    Ok(BufWriter::new(sink))
}

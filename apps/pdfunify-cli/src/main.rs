//! pdfunify
//!
//! Merges PDF documents and SVG graphics, in the order given, into a single
//! PDF whose pages all share one width (A4 by default).

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use pdfunify_core::{
    GraphicRenderer, Source, SourceKind, UnifyError, UnifyOptions, UnifyReport, Unifier,
};
use tracing::{debug, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for pdfunify
#[derive(Parser, Debug)]
#[command(name = "pdfunify")]
#[command(version, about = "Merge PDF and SVG files into one PDF with uniform page width")]
struct Args {
    /// Input files (.pdf or .svg), merged in the order given
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output PDF path
    #[arg(short, long, default_value = "output.pdf")]
    output: PathBuf,

    /// JSON options file; flags given on the command line take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Width every page is scaled to, in points [default: 595.2764]
    #[arg(long)]
    target_width: Option<f64>,

    /// Write streams uncompressed
    #[arg(long)]
    no_compress: bool,

    /// Fallback font family for text in SVG files [default: Arial]
    #[arg(long)]
    font_family: Option<String>,

    /// Abort if unifying takes longer than this, in milliseconds (0 = no limit)
    #[arg(long, default_value = "0")]
    timeout_ms: u64,

    /// Print a JSON report to stdout
    #[arg(long)]
    report: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Layer the explicit flags over `base`.
    fn options(&self, mut base: UnifyOptions) -> UnifyOptions {
        if let Some(width) = self.target_width {
            base.target_width = width;
        }
        if self.no_compress {
            base.compress = false;
        }
        if let Some(family) = &self.font_family {
            base.font_family = family.clone();
        }
        base
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // Logs go to stderr so `--report` output on stdout stays clean.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("pdfunify v{}", env!("CARGO_PKG_VERSION"));

    block_on_detached(run(args))
}

/// Drive `future` to completion on a fresh runtime, then shut the runtime
/// down without joining blocking tasks a timeout left behind.
fn block_on_detached<T>(future: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(future);
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let options = load_options(&args).await?;
    let sources = read_sources(&args.inputs).await?;

    let (bytes, report) =
        unify_with_deadline(Unifier::new(options), sources, args.timeout_ms).await?;

    tokio::fs::write(&args.output, &bytes)
        .await
        .map_err(UnifyError::from)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    info!(
        "Wrote {} pages ({} bytes) to {}",
        report.page_count,
        report.output_size_bytes,
        args.output.display()
    );

    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

async fn load_options(args: &Args) -> anyhow::Result<UnifyOptions> {
    let base = match &args.config {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .map_err(UnifyError::from)
                .with_context(|| format!("failed to read {}", path.display()))?;
            UnifyOptions::from_json(&json)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => UnifyOptions::default(),
    };
    Ok(args.options(base))
}

/// Run the pipeline on a blocking thread. With a non-zero `timeout_ms` the
/// caller stops waiting after that long; the pipeline thread is abandoned.
async fn unify_with_deadline<R>(
    mut unifier: Unifier<R>,
    sources: Vec<Source>,
    timeout_ms: u64,
) -> anyhow::Result<(Vec<u8>, UnifyReport)>
where
    R: GraphicRenderer + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || unifier.unify_with_report(sources));

    let joined = if timeout_ms > 0 {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(joined) => joined,
            Err(_) => bail!("unify timed out after {}ms", timeout_ms),
        }
    } else {
        task.await
    };
    Ok(joined.context("unify task panicked")??)
}

/// Classify and read every input, one after another, in the order given.
async fn read_sources(paths: &[PathBuf]) -> anyhow::Result<Vec<Source>> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        sources.push(read_source(path).await?);
    }
    Ok(sources)
}

async fn read_source(path: &Path) -> anyhow::Result<Source> {
    let kind = SourceKind::from_path(path)?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(UnifyError::from)
        .with_context(|| format!("failed to read {}", path.display()))?;
    debug!(path = %path.display(), ?kind, bytes = bytes.len(), "read input");
    Ok(Source::new(kind, bytes, path.display().to_string()))
}

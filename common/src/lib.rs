//! Common library for the `rsort` file sorter
//!
//! Sorting copies every regular file found under a source directory into
//! `<output>/<bucket>/<file name>`, where the bucket is the lowercased extension of the file or
//! [`bucket::NO_EXTENSION`] for files without one.
//!
//! # Pipeline
//!
//! - [`walk`] streams file paths out of the source tree over a bounded channel
//! - [`bucket`] classifies a path by its extension
//! - [`destination`] creates each bucket directory exactly once, even under concurrency
//! - [`copy`] writes the data through a temporary file and renames it into place
//! - [`sort`](mod@sort) ties these together, one task per file, and aggregates a [`sort::Summary`]
//!
//! # Error Handling
//!
//! A failure affects only the file it belongs to: it is logged, counted in the summary and
//! reported through [`sort::Error::Incomplete`] at the end. Only problems with the source or
//! output root end a run early.
//!
//! # Throttling
//!
//! [`throttle::Throttle`] bounds the number of files open at once and optionally the number of
//! file operations per second. See [`ThrottleConfig`].

pub mod bucket;
pub mod config;
pub mod copy;
pub mod destination;
pub mod preserve;
pub mod progress;
pub mod sort;
pub mod throttle;
pub mod walk;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, ThrottleConfig};
pub use sort::sort;

static PROGRESS: std::sync::LazyLock<progress::Progress> =
    std::sync::LazyLock::new(progress::Progress::new);

/// Process-wide progress counters, shared by all tasks of a run.
pub fn get_progress() -> &'static progress::Progress {
    &PROGRESS
}

/// Default interval between progress updates.
pub const DEFAULT_PROGRESS_DELAY: &str = "10s";

#[derive(Debug, Clone, Default)]
pub struct ProgressSettings {
    /// Human readable duration, e.g. "500ms" or "1min"
    pub progress_delay: Option<String>,
}

fn init_tracing(output: &OutputConfig) {
    let filter = if output.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.default_directive()))
    };
    // fails only when a subscriber is already installed, e.g. by a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_target(false)
        .try_init();
}

fn build_runtime(runtime: &RuntimeConfig) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    builder.build()
}

fn build_throttle(throttle: &ThrottleConfig) -> anyhow::Result<throttle::Throttle> {
    let max_open_files = match throttle.max_open_files {
        Some(max_open_files) => max_open_files,
        None => throttle::default_max_open_files()?,
    };
    tracing::debug!(
        "max open files: {}, ops throttle: {}",
        max_open_files,
        throttle.ops_throttle
    );
    Ok(throttle::Throttle::new(max_open_files, throttle.ops_throttle))
}

/// Set up logging and the tokio runtime, then run `func` to completion.
///
/// `func` receives the [`throttle::Throttle`] built from `throttle`. On success the summary is
/// printed to stdout when requested (or when running verbose) and returned. On failure the full
/// error chain is logged and `None` is returned; callers are expected to exit with a non-zero
/// status.
pub fn run<Fut, Summary>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    throttle: ThrottleConfig,
    func: impl FnOnce(throttle::Throttle) -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    init_tracing(&output);
    if let Err(error) = throttle.validate() {
        tracing::error!("invalid throttle settings: {}", error);
        return None;
    }
    let progress_delay = match progress {
        Some(settings) => {
            let delay = settings
                .progress_delay
                .as_deref()
                .unwrap_or(DEFAULT_PROGRESS_DELAY);
            match humantime::parse_duration(delay) {
                Ok(delay) if !delay.is_zero() => Some(delay),
                Ok(_) => {
                    tracing::error!("progress delay must be greater than zero");
                    return None;
                }
                Err(error) => {
                    tracing::error!("invalid progress delay {:?}: {}", delay, error);
                    return None;
                }
            }
        }
        None => None,
    };
    let runtime = match build_runtime(&runtime) {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("failed to start the tokio runtime: {}", error);
            return None;
        }
    };
    let res = runtime.block_on(async move {
        let throttle = build_throttle(&throttle)?;
        let replenish = tokio::spawn(throttle.clone().run_replenish_thread());
        let reporter =
            progress_delay.map(|delay| tokio::spawn(progress::report(get_progress(), delay)));
        let res = func(throttle).await;
        replenish.abort();
        if let Some(reporter) = reporter {
            reporter.abort();
            tracing::info!(
                "{}",
                progress::ProgressPrinter::new(get_progress()).print()
            );
        }
        res
    });
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{:#}", error);
            None
        }
    }
}

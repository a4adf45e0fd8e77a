use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rsort",
    version,
    about = "Sort files by extension - copies every file of a directory tree into per-extension directories",
    long_about = "`rsort` walks a source directory recursively and copies every regular file into
`<OUTPUT>/<extension>/<file name>`. Extensions are lowercased; files without one go to
`<OUTPUT>/no_extension`. Files are copied concurrently, one task per file.

EXAMPLE:
    # Sort a downloads folder with progress and a final summary
    rsort --source ~/Downloads --output ~/sorted --progress --summary

Note: files with the same name and extension from different source folders end up at the same
destination path, the last one copied wins."
)]
struct Args {
    // Sorting options
    /// Directory to sort (searched recursively)
    #[arg(short = 's', long, value_name = "DIR", help_heading = "Sorting options")]
    source: std::path::PathBuf,

    /// Directory receiving the per-extension folders, created if missing
    #[arg(short = 'o', long, value_name = "DIR", help_heading = "Sorting options")]
    output: std::path::PathBuf,

    /// Preserve file owner and group as well as setuid/setgid/sticky bits
    ///
    /// Permission bits and timestamps are always preserved.
    #[arg(short = 'p', long, help_heading = "Sorting options")]
    preserve: bool,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Sets the delay between progress updates, default is 10s
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v DEBUG / -vv TRACE (default: INFO)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't log anything
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Maximum number of open files, 0 means no limit, leaving unspecified means using 80% of max open files system limit
    #[arg(long, value_name = "N", help_heading = "Performance & throttling")]
    max_open_files: Option<usize>,

    /// Throttle the number of file operations per second, 0 means no throttle
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    ops_throttle: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,
}

fn spawn_interrupt_handler(
    cancel: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupted, waiting for copies in progress to finish");
                cancel.cancel();
            }
            Err(error) => tracing::warn!("cannot listen for interrupts: {}", error),
        }
    })
}

#[instrument(skip(throttle))]
async fn async_main(
    args: Args,
    throttle: common::throttle::Throttle,
) -> Result<common::sort::Summary> {
    let settings = common::sort::Settings {
        preserve: if args.preserve {
            common::preserve::preserve_all()
        } else {
            common::preserve::preserve_default()
        },
    };
    let cancel = tokio_util::sync::CancellationToken::new();
    let interrupt_handler = spawn_interrupt_handler(cancel.clone());
    let res =
        common::sort::sort_paths(&args.source, &args.output, &settings, &throttle, cancel).await;
    interrupt_handler.abort();
    match res {
        Ok(summary) => Ok(summary),
        Err(error) => {
            if args.summary || args.verbose > 0 {
                return Err(anyhow!("{}\n\n{}", error, error.summary()));
            }
            Err(error.into())
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        |throttle| async_main(args, throttle)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let throttle = common::ThrottleConfig {
        max_open_files: args.max_open_files,
        ops_throttle: args.ops_throttle,
    };
    let res = common::run(
        if args.progress || args.progress_delay.is_some() {
            Some(common::ProgressSettings {
                progress_delay: args.progress_delay,
            })
        } else {
            None
        },
        output,
        runtime,
        throttle,
        func,
    );
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}

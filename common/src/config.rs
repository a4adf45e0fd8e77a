//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Throttling configuration for resource control
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottleConfig {
    /// Maximum number of concurrently open files (None = 80% of system limit, 0 = no limit)
    pub max_open_files: Option<usize>,
    /// File operations per second throttle (0 = no throttle)
    pub ops_throttle: usize,
}

impl ThrottleConfig {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        let max_permits = tokio::sync::Semaphore::MAX_PERMITS;
        if let Some(max_open_files) = self.max_open_files
            && max_open_files > max_permits
        {
            return Err(format!(
                "max_open_files must not exceed {max_permits}, got {max_open_files}"
            ));
        }
        if self.ops_throttle > max_permits {
            return Err(format!(
                "ops_throttle must not exceed {max_permits}, got {}",
                self.ops_throttle
            ));
        }
        Ok(())
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress all log output
    pub quiet: bool,
    /// Verbosity level: 0=INFO, 1=DEBUG, 2+=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Directive used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_directive(&self) -> &'static str {
        if self.quiet {
            return "off";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

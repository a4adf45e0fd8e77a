use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU64,
}

impl Counter {
    pub fn add(&self, value: u64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct ProgressCounter {
    started: Counter,
    finished: Counter,
}

pub struct ProgressGuard<'a> {
    progress: &'a ProgressCounter,
}

impl<'a> ProgressGuard<'a> {
    pub fn new(progress: &'a ProgressCounter) -> Self {
        progress.started.inc();
        Self { progress }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.progress.finished.inc();
    }
}

pub struct Status {
    pub started: u64,
    pub finished: u64,
}

impl ProgressCounter {
    pub fn guard(&self) -> ProgressGuard<'_> {
        ProgressGuard::new(self)
    }

    pub fn get(&self) -> Status {
        // read finished first so that a concurrent start can't make pending negative
        let finished = self.finished.get();
        let started = self.started.get().max(finished);
        Status { started, finished }
    }
}

/// Live counters shared by every copy task of a run.
#[derive(Debug)]
pub struct Progress {
    pub ops: ProgressCounter,
    pub files_found: Counter,
    pub files_copied: Counter,
    pub files_failed: Counter,
    pub bytes_copied: Counter,
    pub directories_created: Counter,
    start_time: std::time::Instant,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            ops: Default::default(),
            files_found: Default::default(),
            files_copied: Default::default(),
            files_failed: Default::default(),
            bytes_copied: Default::default(),
            directories_created: Default::default(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressPrinter<'a> {
    progress: &'a Progress,
    last_ops: u64,
    last_bytes: u64,
    last_update: std::time::Instant,
}

impl<'a> ProgressPrinter<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        Self {
            progress,
            last_ops: progress.ops.get().finished,
            last_bytes: progress.bytes_copied.get(),
            last_update: std::time::Instant::now(),
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn print(&mut self) -> String {
        let time_now = std::time::Instant::now();
        let ops = self.progress.ops.get();
        let total_duration_secs = self.progress.get_duration().as_secs_f64().max(f64::EPSILON);
        let curr_duration_secs = (time_now - self.last_update)
            .as_secs_f64()
            .max(f64::EPSILON);
        let average_ops_rate = ops.finished as f64 / total_duration_secs;
        let current_ops_rate = (ops.finished - self.last_ops) as f64 / curr_duration_secs;
        let bytes = self.progress.bytes_copied.get();
        let average_bytes_rate = bytes as f64 / total_duration_secs;
        let current_bytes_rate = (bytes - self.last_bytes) as f64 / curr_duration_secs;
        self.last_ops = ops.finished;
        self.last_bytes = bytes;
        self.last_update = time_now;
        format!(
            "pending: {} | files: {:.2}/s avg, {:.2}/s now | bytes: {}/s avg, {}/s now | \
            found: {} copied: {} failed: {} ({}) | directories created: {}",
            ops.started - ops.finished,
            average_ops_rate,
            current_ops_rate,
            bytesize::ByteSize(average_bytes_rate as u64),
            bytesize::ByteSize(current_bytes_rate as u64),
            self.progress.files_found.get(),
            self.progress.files_copied.get(),
            self.progress.files_failed.get(),
            bytesize::ByteSize(bytes),
            self.progress.directories_created.get(),
        )
    }
}

/// Log a progress line every `delay` until the task is aborted.
pub async fn report(progress: &'static Progress, delay: std::time::Duration) {
    let mut printer = ProgressPrinter::new(progress);
    let mut interval = tokio::time::interval(delay);
    // the first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        tracing::info!("{}", printer.print());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_counting() {
        let counter = Counter::default();
        for _ in 0..10 {
            counter.inc();
        }
        assert_eq!(counter.get(), 10);
    }

    #[test]
    fn threaded_counting() {
        let counter = Counter::default();
        std::thread::scope(|scope| {
            for _ in 0..10 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        counter.inc();
                    }
                });
            }
        });
        assert_eq!(counter.get(), 1000);
    }

    #[test]
    fn guard_tracks_pending() {
        let ops = ProgressCounter::default();
        {
            let _guard = ops.guard();
            let status = ops.get();
            assert_eq!(status.started - status.finished, 1);
        }
        let status = ops.get();
        assert_eq!(status.started, 1);
        assert_eq!(status.finished, 1);
    }

    #[test]
    fn printer_reports_counts() {
        let progress = Progress::new();
        progress.files_found.add(3);
        progress.files_copied.add(2);
        progress.files_failed.inc();
        let mut printer = ProgressPrinter::new(&progress);
        let line = printer.print();
        assert!(line.contains("found: 3 copied: 2 failed: 1"), "{line}");
    }
}

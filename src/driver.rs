// Stream driver - the orchestration loop.
//
// Each cycle: pick a kind, resolve its dependencies against current
// relational state, build the payload, materialize relationally, then
// archive. Recoverable failures end the cycle; only startup failures
// escape. The pacing sleep polls the stop flag so an external stop
// signal takes effect within one pacing interval.

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::catalog::EventCatalog;
use crate::db::RelationalTarget;
use crate::error::StreamError;
use crate::payload::PayloadBuilder;
use crate::resolver::DependencyResolver;
use crate::sink::{ArchiveTarget, EventSink};

/// Run parameters, as handed over by the CLI.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Drop and recreate the tables (and purge the archive) first.
    pub recreate: bool,
    /// Fixed inter-event delay.
    pub event_interval: Duration,
    /// Wall-clock run duration.
    pub duration: Duration,
}

/// Per-run counters, reported once at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Kinds drawn from the catalog.
    pub generated: u64,
    /// Events materialized to the relational store.
    pub applied: u64,
    /// Cycles discarded because no eligible subject existed.
    pub validation_failures: u64,
    /// Relational writes rejected after successful validation.
    pub write_failures: u64,
    /// Archive or stream writes that failed (event still processed).
    pub archive_failures: u64,
}

/// Single-writer orchestration loop over one relational target, one
/// archive target, and any number of extra sinks.
pub struct StreamDriver {
    relational: RelationalTarget,
    archive: ArchiveTarget,
    extra_sinks: Vec<Box<dyn EventSink>>,
    catalog: EventCatalog,
    builder: PayloadBuilder,
    config: StreamConfig,
    stop: Arc<AtomicBool>,
}

impl StreamDriver {
    pub fn new(relational: RelationalTarget, archive: ArchiveTarget, config: StreamConfig) -> Self {
        StreamDriver {
            relational,
            archive,
            extra_sinks: Vec::new(),
            catalog: EventCatalog::new(),
            builder: PayloadBuilder::new(),
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the default catalog (custom weights).
    pub fn with_catalog(mut self, catalog: EventCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the default payload builder (custom deposit cap).
    pub fn with_builder(mut self, builder: PayloadBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Attach an additional failure-isolated sink.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.extra_sinks.push(sink);
    }

    /// Shared stop flag; setting it stops the driver within one
    /// pacing interval.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the stream until the configured duration elapses or the stop
    /// flag is raised. Consumes the driver; the relational connection is
    /// released exactly once on the way out.
    pub fn run<R: Rng + ?Sized>(mut self, rng: &mut R) -> Result<StreamStats> {
        self.relational
            .ensure_schema(self.config.recreate)
            .context("schema bootstrap failed")?;
        if self.config.recreate {
            self.archive.purge()?;
        }

        let started = Instant::now();
        let mut stats = StreamStats::default();

        while started.elapsed() < self.config.duration && !self.stop.load(Ordering::SeqCst) {
            self.cycle(rng, &mut stats);
            self.pace();
        }

        info!(
            generated = stats.generated,
            applied = stats.applied,
            validation_failures = stats.validation_failures,
            write_failures = stats.write_failures,
            archive_failures = stats.archive_failures,
            "stream stopped"
        );

        self.relational.close()?;
        Ok(stats)
    }

    /// One generation cycle. Recoverable errors are contained here.
    fn cycle<R: Rng + ?Sized>(&mut self, rng: &mut R, stats: &mut StreamStats) {
        let kind = self.catalog.pick(rng);
        stats.generated += 1;
        info!(event = %kind, "generated event");

        let resolution = {
            let resolver = DependencyResolver::new(self.relational.conn());
            match resolver.resolve(kind, rng) {
                Ok(resolution) => resolution,
                Err(err @ StreamError::NoEligibleSubject(_)) => {
                    warn!(%err, "event discarded");
                    stats.validation_failures += 1;
                    return;
                }
                Err(err) => {
                    error!(%err, "dependency resolution failed; event discarded");
                    stats.write_failures += 1;
                    return;
                }
            }
        };

        let payload = self.builder.build(resolution, rng, Utc::now().naive_utc());
        if let Ok(json) = serde_json::to_string(&payload) {
            debug!(payload = %json, "built payload");
        }

        if let Err(err) = self.relational.apply(&payload) {
            error!(event = %kind, %err, "event dropped");
            stats.write_failures += 1;
            return;
        }
        stats.applied += 1;
        debug!(event = %kind, "event materialized");

        // Archive writes are fire-and-forget relative to the relational
        // write: failures are logged, the event counts as processed.
        if let Err(err) = self.archive.write(&payload) {
            let err = StreamError::archive(err);
            warn!(sink = self.archive.name(), %err, "event still processed");
            stats.archive_failures += 1;
        }
        for sink in &mut self.extra_sinks {
            if let Err(err) = sink.write(&payload) {
                let err = StreamError::archive(err);
                warn!(sink = sink.name(), %err, "event still processed");
                stats.archive_failures += 1;
            }
        }
    }

    /// Fixed inter-event delay, sliced so the stop flag is honored
    /// promptly.
    fn pace(&self) {
        const SLICE: Duration = Duration::from_millis(25);

        let deadline = Instant::now() + self.config.event_interval;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EventKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use std::path::Path;

    fn short_config() -> StreamConfig {
        StreamConfig {
            recreate: false,
            event_interval: Duration::from_millis(1),
            duration: Duration::from_millis(250),
        }
    }

    fn driver_with_archive(root: &Path, config: StreamConfig) -> StreamDriver {
        let relational = RelationalTarget::open_in_memory().unwrap();
        let archive = ArchiveTarget::open(root).unwrap();
        StreamDriver::new(relational, archive, config)
    }

    fn archived_object_count(root: &Path) -> u64 {
        fn walk(dir: &Path, count: &mut u64) {
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        walk(&path, count);
                    } else {
                        *count += 1;
                    }
                }
            }
        }
        let mut count = 0;
        walk(&root.join("events"), &mut count);
        count
    }

    #[test]
    fn test_run_generates_and_archives_events() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver_with_archive(dir.path(), short_config());
        let mut rng = StdRng::seed_from_u64(11);

        let stats = driver.run(&mut rng).unwrap();

        assert!(stats.generated > 0);
        assert!(stats.applied > 0);
        assert_eq!(stats.write_failures, 0);
        assert_eq!(stats.archive_failures, 0);
        // Every applied event has an archived copy.
        assert_eq!(archived_object_count(dir.path()), stats.applied);
    }

    #[test]
    fn test_validation_failures_do_not_archive() {
        let dir = tempfile::tempdir().unwrap();
        // Withdraw-only catalog over an empty store: every cycle fails
        // validation and nothing may reach either sink.
        let driver = driver_with_archive(dir.path(), short_config())
            .with_catalog(EventCatalog::with_weights(vec![(EventKind::Withdraw, 1)]));
        let mut rng = StdRng::seed_from_u64(12);

        let stats = driver.run(&mut rng).unwrap();

        assert!(stats.generated > 0);
        assert_eq!(stats.applied, 0);
        assert_eq!(stats.validation_failures, stats.generated);
        assert_eq!(archived_object_count(dir.path()), 0);
    }

    #[test]
    fn test_stop_flag_preempts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = StreamConfig {
            recreate: false,
            event_interval: Duration::from_millis(10),
            duration: Duration::from_secs(3600),
        };
        let driver = driver_with_archive(dir.path(), config);
        let stop = driver.stop_flag();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stop.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let mut rng = StdRng::seed_from_u64(13);
        let stats = driver.run(&mut rng).unwrap();
        handle.join().unwrap();

        assert!(stats.generated > 0);
        // Far below the configured hour: the stop flag took effect.
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_recreate_purges_the_archive_before_streaming() {
        let dir = tempfile::tempdir().unwrap();

        let stale = dir.path().join("events/2020/01/01");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("old.json"), b"{}").unwrap();

        let config = StreamConfig {
            recreate: true,
            ..short_config()
        };
        let driver = driver_with_archive(dir.path(), config);
        let mut rng = StdRng::seed_from_u64(14);

        let stats = driver.run(&mut rng).unwrap();

        assert!(!stale.join("old.json").exists());
        assert_eq!(archived_object_count(dir.path()), stats.applied);
    }
}

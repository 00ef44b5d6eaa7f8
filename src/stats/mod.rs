//! Statistics collection: per-stream atomic counters plus a 1 Hz global
//! aggregator that turns cumulative counters into rates.
//!
//! The registry's `RwLock<HashMap<String, Arc<StreamStats>>>` follows
//! `hub::state::HubState` (`cli/src/hub/state.rs`): a map indexed by a
//! session/stream key behind an `RwLock` so lookups never block each
//! other, with exactly one writer path (there, agent add/remove; here,
//! `register`). Per-counter updates use the same hot-path-writes,
//! atomic-field pattern as `hub::command_channel`'s `Arc<AtomicI64>`
//! (`cli/src/hub/command_channel.rs`), generalized from one counter to
//! a struct of them and read back as a point-in-time snapshot rather
//! than a single value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Per-stream counters, updated from the puller and broker hot paths.
/// All fields are atomics so increments never contend with a concurrent
/// snapshot.
#[derive(Default)]
pub struct StreamStats {
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    connections: AtomicI64,
    peak_connections: AtomicU64,
    source_connected: AtomicBool,
    stream_duration_secs: AtomicU64,
}

impl StreamStats {
    pub fn record_received(&self, packets: u64, bytes: u64) {
        self.packets_received.fetch_add(packets, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_sent(&self, packets: u64, bytes: u64) {
        self.packets_sent.fetch_add(packets, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, packets: u64) {
        self.packets_dropped.fetch_add(packets, Ordering::Relaxed);
    }

    pub fn add_connection(&self) {
        let current = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_connections.fetch_max(current.max(0) as u64, Ordering::Relaxed);
    }

    pub fn remove_connection(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set_source_connected(&self, connected: bool) {
        self.source_connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.source_connected.load(Ordering::Relaxed)
    }

    pub fn add_stream_duration(&self, elapsed: Duration) {
        self.stream_duration_secs.fetch_add(elapsed.as_secs(), Ordering::Relaxed);
    }

    /// Total packets received so far. Exposed for tests that assert on
    /// the puller's bookkeeping without going through a full snapshot.
    #[cfg(test)]
    pub(crate) fn packets_received_for_test(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    fn sample(&self) -> Sample {
        Sample {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed).max(0) as u64,
            peak_connections: self.peak_connections.load(Ordering::Relaxed),
            source_connected: self.source_connected.load(Ordering::Relaxed),
            stream_duration_secs: self.stream_duration_secs.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Default)]
struct Sample {
    packets_received: u64,
    packets_sent: u64,
    packets_dropped: u64,
    bytes_received: u64,
    bytes_sent: u64,
    connections: u64,
    peak_connections: u64,
    source_connected: bool,
    stream_duration_secs: u64,
}

/// A read-only snapshot of one stream's statistics, including rates
/// computed against the previous 1 Hz tick.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatistics {
    pub connections: u64,
    pub peak_connections: u64,
    pub connected: bool,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_received_per_sec: f64,
    pub packets_sent_per_sec: f64,
    pub bytes_sent_per_sec: f64,
    pub stream_duration_secs: u64,
}

/// A process-wide snapshot: admission limits plus every stream's
/// statistics, keyed by client-visible path.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStatistics {
    pub connections: u64,
    pub hard_connection_limit: usize,
    pub soft_connection_limit: usize,
    /// Level-reported soft-limit state: `true` whenever the process-wide
    /// admission controller considers itself full (`connections >=
    /// soft_limit`), per spec.md §9's "report as level" decision. The
    /// edge-triggered counterpart is [`crate::events::EventBus`].
    pub full: bool,
    pub streams: HashMap<String, StreamStatistics>,
}

struct Tick {
    at: Instant,
    samples: HashMap<String, Sample>,
}

/// Owns every stream's [`StreamStats`] and the previous-tick samples
/// used to compute rates. Registration happens once at stream start;
/// reads happen at whatever rate the observability endpoints are polled.
pub struct StatsRegistry {
    streams: RwLock<HashMap<String, Arc<StreamStats>>>,
    previous: RwLock<Tick>,
    hard_connection_limit: usize,
    soft_connection_limit: usize,
}

impl StatsRegistry {
    #[must_use]
    pub fn new(hard_connection_limit: usize, soft_connection_limit: usize) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            previous: RwLock::new(Tick { at: Instant::now(), samples: HashMap::new() }),
            hard_connection_limit,
            soft_connection_limit,
        }
    }

    /// Register a new stream's counters, returning a shared handle the
    /// puller/broker/subscriber writer update directly.
    pub fn register(&self, path: &str) -> Arc<StreamStats> {
        let stats = Arc::new(StreamStats::default());
        self.streams.write().unwrap_or_else(|e| e.into_inner()).insert(path.to_owned(), Arc::clone(&stats));
        stats
    }

    /// Per-stream snapshot with rates, or `None` if `path` names no
    /// registered stream.
    #[must_use]
    pub fn stream_statistics(&self, path: &str) -> Option<StreamStatistics> {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        let stats = streams.get(path)?;
        let now = stats.sample();
        let previous = self.previous.read().unwrap_or_else(|e| e.into_inner());
        let elapsed = previous.at.elapsed().as_secs_f64().max(0.001);
        let prev = previous.samples.get(path).copied().unwrap_or_default();
        Some(to_statistics(&now, &prev, elapsed))
    }

    /// Whether the named stream's upstream source is currently connected.
    #[must_use]
    pub fn is_connected(&self, path: &str) -> Option<bool> {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.get(path).map(|s| s.is_connected())
    }

    /// Snapshot across every registered stream plus the process-wide
    /// admission limits. `full` is the admission controller's current
    /// level-reported soft-limit state (see [`GlobalStatistics::full`]);
    /// callers pass `AdmissionController::is_full()` since stats and
    /// admission are independent, sibling-owned subsystems.
    #[must_use]
    pub fn global_statistics(&self, full: bool) -> GlobalStatistics {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        let previous = self.previous.read().unwrap_or_else(|e| e.into_inner());
        let elapsed = previous.at.elapsed().as_secs_f64().max(0.001);

        let mut out = HashMap::with_capacity(streams.len());
        let mut total_connections = 0u64;
        for (path, stats) in streams.iter() {
            let now = stats.sample();
            total_connections += now.connections;
            let prev = previous.samples.get(path).copied().unwrap_or_default();
            out.insert(path.clone(), to_statistics(&now, &prev, elapsed));
        }

        GlobalStatistics {
            connections: total_connections,
            hard_connection_limit: self.hard_connection_limit,
            soft_connection_limit: self.soft_connection_limit,
            full,
            streams: out,
        }
    }

    /// Advance the 1 Hz tick: snapshot every stream's current counters
    /// as the new "previous" baseline for the next rate computation.
    /// Intended to be called once per second from a background task.
    pub fn tick(&self) {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        let samples = streams.iter().map(|(path, stats)| (path.clone(), stats.sample())).collect();
        let mut previous = self.previous.write().unwrap_or_else(|e| e.into_inner());
        *previous = Tick { at: Instant::now(), samples };
    }
}

fn to_statistics(now: &Sample, prev: &Sample, elapsed_secs: f64) -> StreamStatistics {
    StreamStatistics {
        connections: now.connections,
        peak_connections: now.peak_connections,
        connected: now.source_connected,
        packets_received: now.packets_received,
        packets_sent: now.packets_sent,
        packets_dropped: now.packets_dropped,
        bytes_received: now.bytes_received,
        bytes_sent: now.bytes_sent,
        packets_received_per_sec: rate(now.packets_received, prev.packets_received, elapsed_secs),
        packets_sent_per_sec: rate(now.packets_sent, prev.packets_sent, elapsed_secs),
        bytes_sent_per_sec: rate(now.bytes_sent, prev.bytes_sent, elapsed_secs),
        stream_duration_secs: now.stream_duration_secs,
    }
}

fn rate(now: u64, prev: u64, elapsed_secs: f64) -> f64 {
    (now.saturating_sub(prev)) as f64 / elapsed_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_snapshots_a_stream() {
        let registry = StatsRegistry::new(100, 80);
        let stats = registry.register("/live");
        stats.record_received(10, 1880);
        stats.add_connection();
        stats.set_source_connected(true);

        let snap = registry.stream_statistics("/live").unwrap();
        assert_eq!(snap.packets_received, 10);
        assert_eq!(snap.bytes_received, 1880);
        assert_eq!(snap.connections, 1);
        assert_eq!(snap.peak_connections, 1);
        assert!(snap.connected);
    }

    #[test]
    fn peak_connections_is_a_high_water_mark() {
        let stats = StreamStats::default();
        stats.add_connection();
        stats.add_connection();
        stats.add_connection();
        stats.remove_connection();
        stats.remove_connection();

        let snap = stats.sample();
        assert_eq!(snap.connections, 1);
        assert_eq!(snap.peak_connections, 3);
    }

    #[test]
    fn unknown_stream_returns_none() {
        let registry = StatsRegistry::new(0, 0);
        assert!(registry.stream_statistics("/nope").is_none());
        assert!(registry.is_connected("/nope").is_none());
    }

    #[test]
    fn global_statistics_aggregates_connection_counts() {
        let registry = StatsRegistry::new(100, 0);
        let a = registry.register("/a");
        let b = registry.register("/b");
        a.add_connection();
        a.add_connection();
        b.add_connection();

        let global = registry.global_statistics(false);
        assert_eq!(global.connections, 3);
        assert_eq!(global.streams.len(), 2);
        assert_eq!(global.hard_connection_limit, 100);
        assert!(!global.full);
    }

    #[test]
    fn global_statistics_carries_the_admission_controller_full_flag() {
        let registry = StatsRegistry::new(1, 1);
        assert!(registry.global_statistics(true).full);
    }

    #[test]
    fn tick_rebases_rate_computation() {
        let registry = StatsRegistry::new(0, 0);
        let stats = registry.register("/live");
        stats.record_received(100, 18800);
        registry.tick();
        stats.record_received(50, 9400);

        let snap = registry.stream_statistics("/live").unwrap();
        assert_eq!(snap.packets_received, 150);
        assert!(snap.packets_received_per_sec > 0.0);
    }
}

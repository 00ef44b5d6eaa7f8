//! Process-wide wiring: one [`AdmissionController`], one [`EventBus`],
//! one [`StatsRegistry`], and a running [`StreamHandle`] per configured
//! stream.

use std::collections::HashMap;
use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::config::ProcessConfig;
use crate::events::EventBus;
use crate::stats::StatsRegistry;
use crate::stream::StreamHandle;

/// Owns every process-wide shared resource plus the map of running
/// streams, keyed by client-visible path.
pub struct App {
    pub admission: Arc<AdmissionController>,
    pub events: Arc<EventBus>,
    pub stats: Arc<StatsRegistry>,
    pub streams: HashMap<String, StreamHandle>,
}

impl App {
    /// Start every configured stream's puller and broker. Returns once
    /// all streams have been launched; pullers connect in the
    /// background.
    #[must_use]
    pub fn start(config: ProcessConfig) -> Self {
        let admission = Arc::new(AdmissionController::new(config.hard_connection_limit, config.soft_connection_limit));
        let events = Arc::new(EventBus::start(config.soft_connection_limit as i64));
        let stats = Arc::new(StatsRegistry::new(config.hard_connection_limit, config.soft_connection_limit));

        let mut streams = HashMap::with_capacity(config.streams.len());
        for stream_config in config.streams {
            let path = stream_config.path.clone();
            let stream_stats = stats.register(&path);
            log::info!("[{path}] starting stream with {} candidate remote(s)", stream_config.remotes.len());
            let handle = StreamHandle::start(stream_config, Arc::clone(&admission), Arc::clone(&events), stream_stats);
            streams.insert(path, handle);
        }

        Self { admission, events, stats, streams }
    }

    /// Spawn the background task that advances the statistics registry's
    /// 1 Hz tick, used to compute per-second rates.
    pub fn spawn_stats_tick(self: &Arc<Self>) {
        let app = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                interval.tick().await;
                app.stats.tick();
            }
        });
    }
}

//! Wires one configured stream's puller, broker, and stats together and
//! exposes the handle the HTTP layer needs to serve subscribers.

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::broker::{BrokerHandle, StreamBroker};
use crate::config::StreamConfig;
use crate::events::EventBus;
use crate::puller::Puller;
use crate::source::parse_descriptor;
use crate::stats::StreamStats;

/// Opaque "verify credential → allow/deny" hook, evaluated against a
/// subscriber's request before admission is attempted. Absent a
/// configured policy, every request passes.
pub trait CredentialPolicy: Send + Sync {
    /// `credential` is caller-defined (e.g. a query parameter or header
    /// value extracted by the HTTP layer). Returns `true` to allow.
    fn check(&self, credential: Option<&str>) -> bool;
}

/// A running stream: its broker handle (for subscriber admission) and
/// its stats handle (for the observability surface). The puller task
/// runs detached for the life of the process.
pub struct StreamHandle {
    pub config: StreamConfig,
    pub broker: BrokerHandle,
    pub stats: Arc<StreamStats>,
    pub credential_policy: Option<Arc<dyn CredentialPolicy>>,
}

impl StreamHandle {
    /// Start the puller and broker for `config` and return the handle
    /// used to admit subscribers and read statistics.
    ///
    /// Remotes are validated at [`crate::config::ProcessConfig::load`]
    /// time, so a parse failure here would indicate a config loaded
    /// without going through that validation; such a remote is skipped
    /// with a logged warning rather than panicking the whole process.
    pub fn start(config: StreamConfig, admission: Arc<AdmissionController>, events: Arc<EventBus>, stats_stream: Arc<StreamStats>) -> Self {
        let candidates = config
            .remotes
            .iter()
            .filter_map(|remote| match parse_descriptor(remote) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    log::warn!("[{}] skipping unparseable remote {remote:?}: {e}", config.path);
                    None
                }
            })
            .collect();

        let broker = StreamBroker::spawn(admission, Arc::clone(&stats_stream), events);
        Puller::spawn(config.path.clone(), config.clone(), candidates, broker.clone(), Arc::clone(&stats_stream));

        Self { config, broker, stats: stats_stream, credential_policy: None }
    }

    /// Attach a credential policy, evaluated by the HTTP layer before
    /// every admission attempt on this stream.
    #[must_use]
    pub fn with_credential_policy(mut self, policy: Arc<dyn CredentialPolicy>) -> Self {
        self.credential_policy = Some(policy);
        self
    }

    /// Evaluate this stream's credential policy, if any, against
    /// `credential`.
    #[must_use]
    pub fn check_credential(&self, credential: Option<&str>) -> bool {
        match &self.credential_policy {
            Some(policy) => policy.check(credential),
            None => true,
        }
    }
}

//! Upstream puller: keeps a single stream's source connection alive —
//! connect, pull, reconnect — and feeds framed packets to the broker.
//!
//! Grounded on the teacher's `mcp_serve::run_async` outer reconnect loop
//! (`cli/src/mcp_serve.rs`): connect-or-retry, run until disconnected,
//! loop back to reconnect, with every transition logged and a single
//! background task owning the resource for its whole lifetime. The
//! explicit `Connecting`/`Connected`/`Disconnected` status tracking in
//! `tunnel::TunnelStatus` (`cli/src/tunnel.rs`) is the model for this
//! module's own `State` enum, generalized to the candidate-list/backoff
//! policy below.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio::sync::mpsc;

use crate::broker::BrokerHandle;
use crate::config::StreamConfig;
use crate::error::PullerError;
use crate::source::{self, OpenDeadlines, SourceDescriptor};
use crate::stats::StreamStats;
use crate::ts::{Framer, Packet, ReadOutcome};

/// *Streaming* has no state of its own here: it is the body of
/// [`stream_until_failure`], entered the moment `State::Connecting`
/// succeeds and always exited back into `Backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Backoff,
    Offline,
}

/// Runs a puller for one stream until permanently `Offline`. Spawned
/// once per configured stream and left to run for the life of the
/// process.
pub struct Puller;

impl Puller {
    /// Spawn the puller task. `path` is used only for log prefixing. The
    /// two terminal failure modes of §4.C/§7 ([`PullerError`]) are logged
    /// here; everything transient is already handled inside the loop.
    pub fn spawn(path: String, config: StreamConfig, candidates: Vec<SourceDescriptor>, broker: BrokerHandle, stats: Arc<StreamStats>) {
        tokio::spawn(async move {
            if let Err(e) = run(path, config, candidates, broker, stats).await {
                log::error!("{e}");
            }
        });
    }
}

async fn run(
    path: String,
    config: StreamConfig,
    mut candidates: Vec<SourceDescriptor>,
    broker: BrokerHandle,
    stats: Arc<StreamStats>,
) -> Result<(), PullerError> {
    if candidates.is_empty() {
        return Err(PullerError::InvalidSourceList { path });
    }
    candidates.shuffle(&mut rand::thread_rng());

    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    let read_timeout = Duration::from_secs(config.read_timeout_secs);
    let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);

    let mut state = State::Connecting;
    let mut candidate_index = 0usize;
    let mut deadline = Instant::now() + reconnect_delay;

    loop {
        match state {
            State::Connecting => {
                deadline = Instant::now() + reconnect_delay;
                let descriptor = &candidates[candidate_index];
                candidate_index = (candidate_index + 1) % candidates.len();

                log::info!("[{path}] connecting to {descriptor:?}");
                match source::open(descriptor, OpenDeadlines { connect_timeout }, &config).await {
                    Ok(mut opened_source) => {
                        stream_until_failure(&path, &config, read_timeout, opened_source.as_mut(), &broker, &stats).await;
                        opened_source.close().await;
                        state = State::Backoff;
                    }
                    Err(e) => {
                        log::warn!("[{path}] connect failed: {e}");
                        state = State::Backoff;
                    }
                }
            }
            State::Backoff => {
                if reconnect_delay.is_zero() {
                    state = State::Offline;
                    continue;
                }
                let now = Instant::now();
                if now < deadline {
                    tokio::time::sleep(deadline - now).await;
                }
                state = State::Connecting;
            }
            State::Offline => {
                stats.set_source_connected(false);
                return Err(PullerError::AllSourcesExhaustedAndNoReconnect { path });
            }
        }
    }
}

/// Read and fan out packets from `src` until a read error, read-timeout,
/// or a framer `unexpected_end`. The broker's packet channel is created
/// lazily, on the first successfully framed packet, per the first-packet
/// handshake contract. Returns once streaming has ended, for any reason;
/// the caller (always [`run`]) is responsible for closing `src` and
/// moving on to backoff.
async fn stream_until_failure(
    path: &str,
    config: &StreamConfig,
    read_timeout: Duration,
    src: &mut dyn source::Source,
    broker: &BrokerHandle,
    stats: &Arc<StreamStats>,
) {
    let mut framer = Framer::new();
    let mut packet_tx: Option<mpsc::Sender<Packet>> = None;

    loop {
        let outcome = match tokio::time::timeout(read_timeout, framer.read_packet(src)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                log::warn!("[{path}] framer error: {e}");
                return;
            }
            Err(_) => {
                log::warn!("[{path}] read timed out after {read_timeout:?}");
                return;
            }
        };

        match outcome {
            ReadOutcome::Packet(packet) => {
                let packet_len = packet.len() as u64;
                let tx = if let Some(tx) = &packet_tx {
                    tx
                } else {
                    let (tx, rx) = mpsc::channel(config.input_buffer.max(1));
                    broker.start(rx).await;
                    log::info!("[{path}] source connected");
                    packet_tx.get_or_insert(tx)
                };
                stats.record_received(1, packet_len);
                if tx.send(packet).await.is_err() {
                    // Broker is gone (stream shutting down); nothing more to do.
                    return;
                }
            }
            ReadOutcome::NoPacketThisRound => {}
            ReadOutcome::EndOfStream => {
                log::info!("[{path}] source reached end of stream");
                return;
            }
        }
    }
}

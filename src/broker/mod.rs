//! Stream broker: the single serialized actor that owns one stream's
//! subscriber set and fans packets out to it.
//!
//! Grounded on the teacher's `StreamMultiplexer` (`cli/src/relay/stream_mux.rs`):
//! a single owner of a `HashMap<id, StreamHandle>` where each handle wraps
//! its own `mpsc::Sender`, fed by one incoming stream of frames and torn
//! down independently per peer. Its `handle_data` is the model for this
//! module's fan-out: a non-blocking `try_send` per handle, with
//! `TrySendError::Full` logged and dropped rather than awaited and
//! `TrySendError::Closed` pruning the handle from the map — the same
//! drop-on-full policy, generalized from one multiplexed TCP peer to many
//! subscriber queues. The outer command/packet `select!` loop follows the
//! teacher's `Tunnel::connect` (`cli/src/tunnel.rs`), which also runs a
//! single task alternating between an inbound stream and a side-channel of
//! pending work (there, `pending_rx` beside the websocket read half; here,
//! the command channel beside the packet channel) so state is mutated from
//! one place and needs no per-item lock. `hub::command_channel`
//! (`cli/src/hub/command_channel.rs`) is the model for request structs that
//! carry their own reply plumbing into a background task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::admission::AdmissionController;
use crate::events::EventBus;
use crate::stats::StreamStats;
use crate::ts::{Packet, PACKET_SIZE};

/// Depth of the broker's own command queue. Commands are administrative
/// (add/remove/inhibit/allow); this never carries packet data.
const COMMAND_QUEUE_CAPACITY: usize = 256;

enum Command {
    Add { remote: SocketAddr, capacity: usize, reply: oneshot::Sender<AddOutcome> },
    Remove { id: u64 },
    Inhibit,
    Allow,
    InternalStart { packets: mpsc::Receiver<Packet> },
}

/// Result of a subscriber admission attempt.
pub enum AddOutcome {
    /// Admitted: a packet queue the subscriber writer should drain.
    Admitted(Subscription),
    /// Rejected by admission policy, local inhibit, or because the
    /// stream has no upstream source yet.
    Rejected,
}

/// A subscriber's packet queue plus the id it must pass back to
/// [`BrokerHandle::remove`] on teardown.
pub struct Subscription {
    pub id: u64,
    pub packets: mpsc::Receiver<Packet>,
}

/// Cloneable handle to a running [`StreamBroker`]. Held by the puller
/// (to signal the first-packet handshake and disconnects) and by every
/// HTTP subscriber handler (to add/remove itself).
#[derive(Clone)]
pub struct BrokerHandle {
    commands: mpsc::Sender<Command>,
}

impl BrokerHandle {
    /// Request admission for `remote`. Waits for the broker's decision;
    /// `Rejected` covers both policy denial and "broker not yet started".
    pub async fn add(&self, remote: SocketAddr, capacity: usize) -> AddOutcome {
        let (reply, waiter) = oneshot::channel();
        if self.commands.send(Command::Add { remote, capacity, reply }).await.is_err() {
            return AddOutcome::Rejected;
        }
        waiter.await.unwrap_or(AddOutcome::Rejected)
    }

    /// Tell the broker this subscriber is gone. Idempotent: safe to call
    /// even if the subscriber was already dropped by an `inhibit`.
    pub async fn remove(&self, id: u64) {
        let _ = self.commands.send(Command::Remove { id }).await;
    }

    /// Veto further admission and disconnect every current subscriber.
    pub async fn inhibit(&self) {
        let _ = self.commands.send(Command::Inhibit).await;
    }

    /// Clear a previously set local inhibit.
    pub async fn allow(&self) {
        let _ = self.commands.send(Command::Allow).await;
    }

    /// Called by the puller on its first successfully framed packet:
    /// hands the broker the packet channel and starts fan-out.
    ///
    /// Public rather than crate-private so integration tests can drive a
    /// broker directly without a real upstream source attached.
    pub async fn start(&self, packets: mpsc::Receiver<Packet>) {
        let _ = self.commands.send(Command::InternalStart { packets }).await;
    }
}

/// Owns the command-channel sender side; [`spawn`] is the only
/// constructor.
pub struct StreamBroker;

impl StreamBroker {
    /// Spawn a broker task for one stream and return a handle to it. The
    /// task runs until `handle` (and every clone of it) is dropped.
    #[must_use]
    pub fn spawn(admission: Arc<AdmissionController>, stats: Arc<StreamStats>, events: Arc<EventBus>) -> BrokerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        tokio::spawn(run(rx, admission, stats, events));
        BrokerHandle { commands: tx }
    }
}

async fn run(mut commands: mpsc::Receiver<Command>, admission: Arc<AdmissionController>, stats: Arc<StreamStats>, events: Arc<EventBus>) {
    let mut inhibit = false;
    let mut subscribers: HashMap<u64, mpsc::Sender<Packet>> = HashMap::new();
    let mut next_id: u64 = 0;

    loop {
        // Command-eater phase: no source is attached yet. `add` is
        // rejected outright (stream offline) rather than queued; inhibit
        // state still tracks so a stream inhibited before its first
        // packet stays inhibited once streaming starts.
        let packets = loop {
            match commands.recv().await {
                Some(Command::InternalStart { packets }) => break packets,
                Some(Command::Add { reply, .. }) => {
                    let _ = reply.send(AddOutcome::Rejected);
                }
                Some(Command::Remove { .. }) => {}
                Some(Command::Inhibit) => inhibit = true,
                Some(Command::Allow) => inhibit = false,
                None => return,
            }
        };

        stats.set_source_connected(true);
        run_main_loop(&mut commands, packets, &admission, &stats, &events, &mut inhibit, &mut subscribers, &mut next_id).await;
        stats.set_source_connected(false);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_main_loop(
    commands: &mut mpsc::Receiver<Command>,
    mut packets: mpsc::Receiver<Packet>,
    admission: &Arc<AdmissionController>,
    stats: &Arc<StreamStats>,
    events: &Arc<EventBus>,
    inhibit: &mut bool,
    subscribers: &mut HashMap<u64, mpsc::Sender<Packet>>,
    next_id: &mut u64,
) {
    loop {
        tokio::select! {
            biased;

            packet = packets.recv() => {
                match packet {
                    Some(packet) => fan_out(subscribers, &packet, stats),
                    None => break,
                }
            }

            command = commands.recv() => {
                match command {
                    Some(Command::Add { remote, capacity, reply }) => {
                        let outcome = try_admit(*inhibit, admission, stats, events, subscribers, next_id, remote, capacity);
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Remove { id }) => {
                        if subscribers.remove(&id).is_some() {
                            release_subscriber(admission, stats, events);
                        }
                    }
                    Some(Command::Inhibit) => {
                        *inhibit = true;
                        for (_, tx) in subscribers.drain() {
                            drop(tx);
                            release_subscriber(admission, stats, events);
                        }
                    }
                    Some(Command::Allow) => *inhibit = false,
                    Some(Command::InternalStart { .. }) => {
                        // A source is already attached; a second handshake
                        // before this one tore down is a puller bug, not a
                        // condition to recover from here.
                    }
                    None => {
                        for (_, tx) in subscribers.drain() {
                            drop(tx);
                            release_subscriber(admission, stats, events);
                        }
                        return;
                    }
                }
            }
        }
    }

    // Source disconnected: drain any residual in-flight packets, then
    // close every subscriber queue so their writers shut down.
    while packets.try_recv().is_ok() {}
    for (_, tx) in subscribers.drain() {
        drop(tx);
        release_subscriber(admission, stats, events);
    }
}

#[allow(clippy::too_many_arguments)]
fn try_admit(
    inhibit: bool,
    admission: &Arc<AdmissionController>,
    stats: &Arc<StreamStats>,
    events: &Arc<EventBus>,
    subscribers: &mut HashMap<u64, mpsc::Sender<Packet>>,
    next_id: &mut u64,
    remote: SocketAddr,
    capacity: usize,
) -> AddOutcome {
    if inhibit || !admission.try_admit(remote) {
        return AddOutcome::Rejected;
    }
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let id = *next_id;
    *next_id += 1;
    subscribers.insert(id, tx);
    stats.add_connection();
    events.notify_connect(1);
    AddOutcome::Admitted(Subscription { id, packets: rx })
}

fn release_subscriber(admission: &Arc<AdmissionController>, stats: &Arc<StreamStats>, events: &Arc<EventBus>) {
    admission.release();
    stats.remove_connection();
    events.notify_connect(-1);
}

fn fan_out(subscribers: &mut HashMap<u64, mpsc::Sender<Packet>>, packet: &Packet, stats: &Arc<StreamStats>) {
    let mut sent = 0u64;
    let mut dropped = 0u64;
    subscribers.retain(|_, tx| match tx.try_send(Arc::clone(packet)) {
        Ok(()) => {
            sent += 1;
            true
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            dropped += 1;
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
    if sent > 0 {
        stats.record_sent(sent, sent * PACKET_SIZE as u64);
    }
    if dropped > 0 {
        stats.record_dropped(dropped);
    }
}

//! Scenario: the source closes after `P1`; on reconnect it emits `P2`.
//! A subscriber connected before `P1` sees its response body end when
//! the source drops (the broker tears down on source close); a new
//! subscriber connecting after the reconnect receives `P2` onward, not
//! anything from the first connection.
//!
//! Driven directly at the broker's first-packet-handshake contract
//! (`start`/`add`), since that boundary — not the puller's reconnect
//! timing — is what this invariant is about; the puller's own backoff
//! scheduling is covered separately in `puller::tests`.

use std::sync::Arc;

use tspx::admission::AdmissionController;
use tspx::broker::{AddOutcome, StreamBroker};
use tspx::events::EventBus;
use tspx::stats::StreamStats;
use tspx::ts::PACKET_SIZE;

fn packet(marker: u8) -> Arc<[u8; PACKET_SIZE]> {
    let mut bytes = [marker; PACKET_SIZE];
    bytes[0] = 0x47;
    Arc::new(bytes)
}

#[tokio::test]
async fn subscriber_across_source_flap_only_sees_packets_since_its_own_connection() {
    let admission = Arc::new(AdmissionController::new(0, 0));
    let stats = Arc::new(StreamStats::default());
    let events = Arc::new(EventBus::start(0));
    let broker = StreamBroker::spawn(admission, Arc::clone(&stats), events);

    let remote = "127.0.0.1:0".parse().unwrap();

    // First connection: the puller's first-packet handshake.
    let (tx1, rx1) = tokio::sync::mpsc::channel(8);
    broker.start(rx1).await;

    let mut before_flap = match broker.add(remote, 8).await {
        AddOutcome::Admitted(sub) => sub,
        AddOutcome::Rejected => panic!("subscriber connected before P1 should be admitted"),
    };

    tx1.send(packet(0x01)).await.unwrap();
    assert_eq!(before_flap.packets.recv().await.unwrap()[1], 0x01);

    // Source closes: the puller drops its sender, which the broker
    // treats as a disconnect and tears the subscriber set down.
    drop(tx1);
    assert!(before_flap.packets.recv().await.is_none(), "body should end when the source drops");

    // A client attempting to connect between the flap and the reconnect
    // finds the stream offline.
    match broker.add(remote, 8).await {
        AddOutcome::Rejected => {}
        AddOutcome::Admitted(_) => panic!("broker should reject admission before the reconnect's first packet"),
    }

    // Reconnect: second first-packet handshake.
    let (tx2, rx2) = tokio::sync::mpsc::channel(8);
    broker.start(rx2).await;

    let mut after_reconnect = match broker.add(remote, 8).await {
        AddOutcome::Admitted(sub) => sub,
        AddOutcome::Rejected => panic!("subscriber connecting after reconnect should be admitted"),
    };

    tx2.send(packet(0x02)).await.unwrap();
    let got = after_reconnect.packets.recv().await.unwrap();
    assert_eq!(got[1], 0x02, "new subscriber must see only packets from the reconnected source");

    drop(tx2);
}

//! Scenario: a subscriber's queue has capacity 2 and it never reads; 10
//! packets flow from the source. Eight of them are dropped for that one
//! subscriber, every packet is still counted as sent to a peer with
//! enough room, and no other subscriber is affected.

use std::sync::Arc;
use std::time::Duration;

use tspx::admission::AdmissionController;
use tspx::broker::{AddOutcome, StreamBroker};
use tspx::events::EventBus;
use tspx::stats::StatsRegistry;
use tspx::ts::PACKET_SIZE;

fn packet(marker: u8) -> Arc<[u8; PACKET_SIZE]> {
    let mut bytes = [marker; PACKET_SIZE];
    bytes[0] = 0x47;
    Arc::new(bytes)
}

#[tokio::test]
async fn slow_subscriber_drops_without_affecting_peers_or_source() {
    let admission = Arc::new(AdmissionController::new(0, 0));
    let registry = StatsRegistry::new(0, 0);
    let stats = registry.register("/live");
    let events = Arc::new(EventBus::start(0));
    let broker = StreamBroker::spawn(admission, Arc::clone(&stats), events);

    let (packet_tx, packet_rx) = tokio::sync::mpsc::channel(16);
    broker.start(packet_rx).await;

    let remote = "127.0.0.1:0".parse().unwrap();

    // The slow subscriber: queue capacity 2, never drained during the
    // run below.
    let mut slow = match broker.add(remote, 2).await {
        AddOutcome::Admitted(sub) => sub,
        AddOutcome::Rejected => panic!("expected admission"),
    };

    // A healthy peer with enough room to absorb every packet.
    let mut healthy = match broker.add(remote, 16).await {
        AddOutcome::Admitted(sub) => sub,
        AddOutcome::Rejected => panic!("expected admission"),
    };

    for i in 0..10u8 {
        packet_tx.send(packet(i)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = registry.stream_statistics("/live").unwrap();
    assert_eq!(snapshot.packets_dropped, 8, "slow subscriber should drop 10 - capacity(2) = 8 packets");
    assert_eq!(snapshot.packets_sent, 12, "2 delivered to the slow subscriber + 10 delivered to the healthy one");

    for i in 0..10u8 {
        assert_eq!(healthy.packets.recv().await.unwrap()[1], i, "healthy peer must see every packet, untouched by the slow one");
    }

    let mut held = 0;
    while slow.packets.try_recv().is_ok() {
        held += 1;
    }
    assert_eq!(held, 2, "slow subscriber keeps only what fit in its own queue capacity");

    drop(packet_tx);
}

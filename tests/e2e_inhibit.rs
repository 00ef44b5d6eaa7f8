//! Scenario: two clients are streaming; the operator calls
//! `set_inhibit(true)`. Within bounded time both clients see their
//! response body end; a new client attempting to connect receives a
//! rejection; `set_inhibit(false)` restores admission.

use std::sync::Arc;

use tspx::admission::AdmissionController;
use tspx::broker::{AddOutcome, StreamBroker};
use tspx::events::EventBus;
use tspx::stats::StreamStats;

#[tokio::test]
async fn inhibit_drains_current_subscribers_and_blocks_new_ones_until_allowed() {
    let admission = Arc::new(AdmissionController::new(0, 0));
    let stats = Arc::new(StreamStats::default());
    let events = Arc::new(EventBus::start(0));
    let broker = StreamBroker::spawn(admission, stats, events);

    let (_packet_tx, packet_rx) = tokio::sync::mpsc::channel(8);
    broker.start(packet_rx).await;

    let remote = "127.0.0.1:0".parse().unwrap();

    let mut client_a = match broker.add(remote, 8).await {
        AddOutcome::Admitted(sub) => sub,
        AddOutcome::Rejected => panic!("client a should be admitted"),
    };
    let mut client_b = match broker.add(remote, 8).await {
        AddOutcome::Admitted(sub) => sub,
        AddOutcome::Rejected => panic!("client b should be admitted"),
    };

    broker.inhibit().await;

    assert!(client_a.packets.recv().await.is_none(), "client a's body must end once inhibited");
    assert!(client_b.packets.recv().await.is_none(), "client b's body must end once inhibited");

    match broker.add(remote, 8).await {
        AddOutcome::Rejected => {}
        AddOutcome::Admitted(_) => panic!("a new client must be refused while inhibited"),
    }

    broker.allow().await;

    match broker.add(remote, 8).await {
        AddOutcome::Admitted(_) => {}
        AddOutcome::Rejected => panic!("allow() should restore admission"),
    }
}

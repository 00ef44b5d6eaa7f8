//! Scenario: the source opens with 40 bytes that contain no sync byte,
//! then emits two aligned packets, `P1` and `P2`. A subscriber connects
//! as soon as the broker admits it (immediately once the puller frames
//! its first packet). The subscriber receives exactly `P1, P2`, in
//! order, with the leading garbage silently discarded by the framer's
//! resync.
//!
//! Unlike the broker-level scenarios, this one drives the real
//! `source::open` path over a loopback TCP connection so the framer's
//! resync is exercised end to end, not just unit-tested in isolation.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use tspx::admission::AdmissionController;
use tspx::broker::{AddOutcome, StreamBroker};
use tspx::config::StreamConfig;
use tspx::events::EventBus;
use tspx::puller::Puller;
use tspx::source::parse_descriptor;
use tspx::stats::StreamStats;
use tspx::ts::PACKET_SIZE;

fn packet(marker: u8) -> Vec<u8> {
    let mut bytes = vec![marker; PACKET_SIZE];
    bytes[0] = 0x47;
    bytes
}

#[tokio::test]
async fn subscriber_receives_only_the_resynced_packets() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut wire = vec![0x00u8; 40]; // no sync byte anywhere in the prefix
        wire.extend(packet(0xAA));
        wire.extend(packet(0xBB));
        socket.write_all(&wire).await.unwrap();
        // Hold the connection open long enough for the test to read both
        // packets before the puller sees end-of-stream and backs off.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let config = StreamConfig {
        path: "/live".to_owned(),
        remotes: vec![format!("tcp://127.0.0.1:{port}")],
        input_buffer: 8,
        output_buffer: 8,
        connect_timeout_secs: 1,
        read_timeout_secs: 2,
        reconnect_delay_secs: 1,
        udp_buffer_size: None,
        udp_packet_size: None,
        multicast_interface: None,
    };
    let candidates = vec![parse_descriptor(&config.remotes[0]).unwrap()];

    let admission = Arc::new(AdmissionController::new(0, 0));
    let stats = Arc::new(StreamStats::default());
    let events = Arc::new(EventBus::start(0));
    let broker = StreamBroker::spawn(Arc::clone(&admission), Arc::clone(&stats), events);

    Puller::spawn("/live".to_owned(), config, candidates, broker.clone(), Arc::clone(&stats));

    let remote = "127.0.0.1:0".parse().unwrap();
    let mut subscription = loop {
        match broker.add(remote, 8).await {
            AddOutcome::Admitted(sub) => break sub,
            AddOutcome::Rejected => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    };

    let first = tokio::time::timeout(Duration::from_secs(2), subscription.packets.recv())
        .await
        .expect("first packet should arrive")
        .expect("channel should stay open");
    let second = tokio::time::timeout(Duration::from_secs(2), subscription.packets.recv())
        .await
        .expect("second packet should arrive")
        .expect("channel should stay open");

    assert_eq!(first[1], 0xAA);
    assert_eq!(second[1], 0xBB);
}

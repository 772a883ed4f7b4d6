//! End-to-end transfers between transports over the simulated medium

use std::time::{Duration, Instant};

use ooklink_core::Address;
use ooklink_radio::{
    MediumConfig, MediumPort, SimulatedMedium, SystemClock, Transport, TransportConfig,
};

const SENDER: Address = Address(1);
const RECEIVER: Address = Address(2);

fn fast_channel() -> MediumConfig {
    MediumConfig {
        bandwidth_bps: 64_000,
        packet_loss: 0.0,
        latency: Duration::from_millis(1),
        latency_jitter: Duration::ZERO,
    }
}

fn transport_config() -> TransportConfig {
    TransportConfig {
        max_message_len: 40,
        pool_size: 3,
        retries: 5,
        frame_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(1),
        stale_slot_timeout: None,
    }
}

fn transport(address: Address, port: MediumPort) -> Transport<MediumPort> {
    Transport::new(address, transport_config(), port, SystemClock).unwrap()
}

/// Polls `receiver` until it has collected `count` messages or `deadline`
/// passes. Returns (source, contents) pairs in arrival order.
fn collect_messages(
    receiver: &mut Transport<MediumPort>,
    count: usize,
    deadline: Duration,
) -> Vec<(Address, Vec<u8>)> {
    let start = Instant::now();
    let mut messages = Vec::new();
    while messages.len() < count && start.elapsed() < deadline {
        match receiver.receive() {
            Some(message) => {
                messages.push((message.source(), message.contents().to_vec()));
                message.free();
            }
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }
    messages
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_delivered_over_medium() {
    let medium = SimulatedMedium::new(fast_channel());
    let mut sender = transport(SENDER, medium.join(SENDER).await);
    let mut receiver = transport(RECEIVER, medium.join(RECEIVER).await);

    let rx = tokio::task::spawn_blocking(move || {
        collect_messages(&mut receiver, 1, Duration::from_secs(10))
    });
    let tx = tokio::task::spawn_blocking(move || sender.send(RECEIVER, b"HELLO!"));

    assert_eq!(tx.await.unwrap(), Ok(()));
    assert_eq!(rx.await.unwrap(), vec![(SENDER, b"HELLO!".to_vec())]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lost_acks_are_recovered() {
    let medium = SimulatedMedium::new(fast_channel());
    let mut sender = transport(SENDER, medium.join(SENDER).await);
    let mut receiver = transport(RECEIVER, medium.join(RECEIVER).await);

    // the handshake ack and the next one both vanish
    medium.drop_next_from(RECEIVER, 2).await;

    let payload: Vec<u8> = (0u8..37).collect();
    let expected = payload.clone();
    let rx = tokio::task::spawn_blocking(move || {
        collect_messages(&mut receiver, 1, Duration::from_secs(10))
    });
    let tx = tokio::task::spawn_blocking(move || sender.send(RECEIVER, &payload));

    assert_eq!(tx.await.unwrap(), Ok(()));
    assert_eq!(rx.await.unwrap(), vec![(SENDER, expected)]);
    assert_eq!(medium.stats().await.frames_dropped, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_senders_share_one_receiver() {
    let medium = SimulatedMedium::new(fast_channel());
    let mut receiver = transport(RECEIVER, medium.join(RECEIVER).await);

    let mut senders = Vec::new();
    for id in [10u8, 11, 12] {
        let mut node = transport(Address(id), medium.join(Address(id)).await);
        senders.push(tokio::task::spawn_blocking(move || {
            let payload = vec![id; 13];
            node.send(RECEIVER, &payload)
        }));
    }
    let rx = tokio::task::spawn_blocking(move || {
        collect_messages(&mut receiver, 3, Duration::from_secs(20))
    });

    for sender in senders {
        assert_eq!(sender.await.unwrap(), Ok(()));
    }
    let mut messages = rx.await.unwrap();
    messages.sort();
    assert_eq!(
        messages,
        vec![
            (Address(10), vec![10u8; 13]),
            (Address(11), vec![11u8; 13]),
            (Address(12), vec![12u8; 13]),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_destination_fails() {
    let medium = SimulatedMedium::new(fast_channel());
    let config = TransportConfig {
        retries: 2,
        frame_timeout: Duration::from_millis(20),
        ..transport_config()
    };
    let mut sender =
        Transport::new(SENDER, config, medium.join(SENDER).await, SystemClock).unwrap();

    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || sender.send(Address(99), b"anyone?"))
        .await
        .unwrap();

    assert!(result.is_err());
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert_eq!(medium.stats().await.frames_sent, 3);
}

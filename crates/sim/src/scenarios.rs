//! Simulation scenarios for ooklink over a lossy shared medium

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use ooklink_core::Address;
use ooklink_radio::{
    MediumConfig, MediumPort, MediumStats, SimulatedMedium, SystemClock, Transport,
    TransportConfig,
};
use rand::Rng;

use crate::SimulationPresets;

const RECEIVER: Address = Address(1);

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub attempted: usize,
    pub delivered: usize,
    pub received: usize,
    pub mismatched: usize,
    pub bytes_delivered: usize,
    pub elapsed: Duration,
    pub medium: MediumStats,
}

impl ScenarioReport {
    pub fn delivery_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.attempted as f64 * 100.0
    }

    pub fn goodput_bps(&self) -> f64 {
        (self.bytes_delivered * 8) as f64 / self.elapsed.as_secs_f64()
    }
}

/// One sender pushes `messages` random messages to one receiver.
pub async fn point_to_point_test(config: MediumConfig, messages: usize) -> Result<ScenarioReport> {
    println!("\n=== Point-to-Point Test ===");
    let transport = SimulationPresets::transport_for(&config);
    let batches = vec![(Address(2), random_payloads(messages, transport.max_message_len))];
    run_transfers(config, transport, batches).await
}

/// Several senders talk to one receiver at the same time; the receiver
/// reassembles their messages in parallel slots.
pub async fn interleaved_senders_test(
    config: MediumConfig,
    senders: u8,
    messages: usize,
) -> Result<ScenarioReport> {
    println!("\n=== Interleaved Senders Test ({} senders) ===", senders);
    let transport = SimulationPresets::transport_for(&config);
    let batches = (0..senders)
        .map(|i| (Address(10 + i), random_payloads(messages, transport.max_message_len)))
        .collect();
    run_transfers(config, transport, batches).await
}

/// More senders than reassembly slots: senders that cannot get a slot
/// retry until one frees up or their budget runs out.
pub async fn slot_contention_test(config: MediumConfig, senders: u8) -> Result<ScenarioReport> {
    println!("\n=== Slot Contention Test ({} senders, 1 slot) ===", senders);
    let transport = TransportConfig {
        pool_size: 1,
        ..SimulationPresets::transport_for(&config)
    };
    let batches = (0..senders)
        .map(|i| (Address(20 + i), random_payloads(1, transport.max_message_len)))
        .collect();
    run_transfers(config, transport, batches).await
}

async fn run_transfers(
    config: MediumConfig,
    transport: TransportConfig,
    batches: Vec<(Address, Vec<Vec<u8>>)>,
) -> Result<ScenarioReport> {
    println!("Medium config: {:?}", config);
    println!(
        "Transport: {} slots, {} retries, {:?} frame timeout",
        transport.pool_size, transport.retries, transport.frame_timeout
    );

    let medium = SimulatedMedium::new(config);
    let linger = transport.frame_timeout * (transport.retries + 1);
    let receiver = Transport::new(
        RECEIVER,
        transport.clone(),
        medium.join(RECEIVER).await,
        SystemClock,
    )?;

    let mut senders = Vec::new();
    for (address, payloads) in &batches {
        let port = medium.join(*address).await;
        let node = Transport::new(*address, transport.clone(), port, SystemClock)?;
        senders.push((node, payloads.clone()));
    }

    let start = Instant::now();
    let done = Arc::new(AtomicBool::new(false));
    let receiver_task = {
        let done = done.clone();
        tokio::task::spawn_blocking(move || receive_until_done(receiver, &done, linger))
    };

    let mut sender_tasks = Vec::new();
    for (mut sender, payloads) in senders {
        sender_tasks.push(tokio::task::spawn_blocking(move || {
            let mut delivered = Vec::new();
            for payload in &payloads {
                match sender.send(RECEIVER, payload) {
                    Ok(()) => delivered.push(payload.len()),
                    Err(e) => log::warn!("{} -> {}: {}", sender.address(), RECEIVER, e),
                }
            }
            delivered
        }));
    }

    let mut delivered = 0;
    let mut bytes_delivered = 0;
    for task in sender_tasks {
        let lengths = task.await?;
        delivered += lengths.len();
        bytes_delivered += lengths.iter().sum::<usize>();
    }
    let elapsed = start.elapsed();
    done.store(true, Ordering::Release);
    let received = receiver_task.await?;

    let attempted = batches.iter().map(|(_, payloads)| payloads.len()).sum();
    let mismatched = received
        .iter()
        .filter(|(source, contents)| {
            !batches
                .iter()
                .any(|(address, payloads)| address == source && payloads.contains(contents))
        })
        .count();

    let report = ScenarioReport {
        attempted,
        delivered,
        received: received.len(),
        mismatched,
        bytes_delivered,
        elapsed,
        medium: medium.stats().await,
    };
    print_report(&report);
    Ok(report)
}

/// Drains completed messages until `done` is set and a further `linger`
/// has passed, so retransmitted tails still land.
fn receive_until_done(
    mut receiver: Transport<MediumPort>,
    done: &AtomicBool,
    linger: Duration,
) -> Vec<(Address, Vec<u8>)> {
    let mut received = Vec::new();
    let mut finished_at = None;
    loop {
        if let Some(message) = receiver.receive() {
            received.push((message.source(), message.contents().to_vec()));
            message.free();
            continue;
        }

        if done.load(Ordering::Acquire) {
            let since = *finished_at.get_or_insert_with(Instant::now);
            if since.elapsed() > linger {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    received
}

fn random_payloads(count: usize, max_len: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let mut payload = vec![0u8; rng.random_range(1..=max_len)];
            rng.fill(&mut payload[..]);
            payload
        })
        .collect()
}

fn print_report(report: &ScenarioReport) {
    println!("  - messages attempted: {}", report.attempted);
    println!(
        "  - delivered (acknowledged): {} ({:.1}%)",
        report.delivered,
        report.delivery_rate()
    );
    println!("  - received by sink: {}", report.received);
    if report.mismatched > 0 {
        println!("  - received but not matching any sent payload: {}", report.mismatched);
    }
    println!("  - time: {:?}", report.elapsed);
    println!("  - goodput: {:.2} bps", report.goodput_bps());
    println!(
        "  - medium: {} frames sent, {} lost, {} delivered",
        report.medium.frames_sent, report.medium.frames_dropped, report.medium.frames_delivered
    );
}

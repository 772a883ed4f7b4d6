//! Simulated shared broadcast medium for testing
//!
//! One background task drains a single transmission queue, so the medium
//! carries one frame at a time. Each frame is delayed by its airtime plus
//! latency and jitter, may be lost, and is otherwise heard by every joined
//! port except the one that sent it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use ooklink_core::{Address, FRAME_BITS};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::{MediumConfig, Transceiver};

const PORT_BUFFER: usize = 1024;
const QUEUE_BUFFER: usize = 4096;

#[derive(Debug)]
struct Burst {
    from: Address,
    raw: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MediumStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_delivered: u64,
}

pub struct SimulatedMedium {
    ports: Arc<RwLock<HashMap<Address, mpsc::Sender<u64>>>>,
    queue: mpsc::Sender<Burst>,
    stats: Arc<Mutex<MediumStats>>,
    forced_drops: Arc<Mutex<HashMap<Address, u32>>>,
}

impl SimulatedMedium {
    /// Must be called from within a tokio runtime.
    pub fn new(config: MediumConfig) -> Arc<Self> {
        let ports = Arc::new(RwLock::new(HashMap::<Address, mpsc::Sender<u64>>::new()));
        let stats = Arc::new(Mutex::new(MediumStats::default()));
        let forced_drops = Arc::new(Mutex::new(HashMap::new()));
        let (queue, queue_rx) = mpsc::channel(QUEUE_BUFFER);

        log::info!("SimulatedMedium initialized with config: {:?}", config);
        tokio::spawn(run_channel(
            config,
            queue_rx,
            ports.clone(),
            stats.clone(),
            forced_drops.clone(),
        ));

        Arc::new(Self {
            ports,
            queue,
            stats,
            forced_drops,
        })
    }

    /// Attaches a radio for `address`. Joining twice replaces the earlier
    /// port, which stops hearing the medium.
    pub async fn join(self: &Arc<Self>, address: Address) -> MediumPort {
        let (tx, rx) = mpsc::channel(PORT_BUFFER);
        self.ports.write().await.insert(address, tx);
        debug!("Port {} joined the medium", address);
        MediumPort {
            address,
            queue: self.queue.clone(),
            rx,
            pending: None,
        }
    }

    /// Loses the next `count` frames transmitted by `address`, on top of
    /// the random loss model.
    pub async fn drop_next_from(&self, address: Address, count: u32) {
        *self.forced_drops.lock().await.entry(address).or_default() += count;
    }

    pub async fn stats(&self) -> MediumStats {
        *self.stats.lock().await
    }
}

async fn run_channel(
    config: MediumConfig,
    mut queue_rx: mpsc::Receiver<Burst>,
    ports: Arc<RwLock<HashMap<Address, mpsc::Sender<u64>>>>,
    stats: Arc<Mutex<MediumStats>>,
    forced_drops: Arc<Mutex<HashMap<Address, u32>>>,
) {
    let airtime = Duration::from_secs_f64(FRAME_BITS as f64 / config.bandwidth_bps as f64);
    let jitter = Normal::new(0.0, config.latency_jitter.as_secs_f64()).ok();

    while let Some(burst) = queue_rx.recv().await {
        stats.lock().await.frames_sent += 1;

        let jitter_delay = jitter
            .as_ref()
            .map(|normal| Duration::from_secs_f64(normal.sample(&mut rand::rng()).abs()))
            .unwrap_or_default();
        tokio::time::sleep(airtime + config.latency + jitter_delay).await;

        if take_forced_drop(&forced_drops, burst.from).await || random_loss(config.packet_loss) {
            stats.lock().await.frames_dropped += 1;
            debug!("Frame from {} lost on the medium", burst.from);
            continue;
        }

        let listeners = ports.read().await;
        for (&address, port) in listeners.iter() {
            if address == burst.from {
                continue;
            }
            match port.try_send(burst.raw) {
                Ok(()) => trace!("Frame from {} heard by {}", burst.from, address),
                Err(TrySendError::Full(_)) => {
                    warn!("Port {} is not draining its radio, frame dropped", address)
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        stats.lock().await.frames_delivered += 1;
    }
}

async fn take_forced_drop(forced_drops: &Mutex<HashMap<Address, u32>>, from: Address) -> bool {
    let mut drops = forced_drops.lock().await;
    match drops.get_mut(&from) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

/// "Bursty" loss: most frames see roughly the base rate, some see a
/// multiple of it.
fn random_loss(base_loss: f32) -> bool {
    if base_loss <= 0.0 {
        return false;
    }
    let mut rng = rand::rng();
    let r: f64 = rng.random();
    let dynamic_factor = if r < 0.7 {
        0.8 + (r / 0.7) * 0.4
    } else if r < 0.95 {
        1.2 + ((r - 0.7) / 0.25) * 0.6
    } else {
        2.0 + ((r - 0.95) / 0.05) * 1.0
    };
    rng.random::<f64>() < base_loss as f64 * dynamic_factor
}

/// A node's radio on a [`SimulatedMedium`]. All operations are
/// non-blocking, so a transport can drive it from a blocking thread.
pub struct MediumPort {
    address: Address,
    queue: mpsc::Sender<Burst>,
    rx: mpsc::Receiver<u64>,
    pending: Option<u64>,
}

impl MediumPort {
    pub fn address(&self) -> Address {
        self.address
    }
}

impl Transceiver for MediumPort {
    fn transmit(&mut self, raw: u64, width: u8) {
        debug_assert_eq!(width, FRAME_BITS);
        if let Err(e) = self.queue.try_send(Burst {
            from: self.address,
            raw,
        }) {
            warn!("Port {} could not queue frame: {}", self.address, e);
        }
    }

    fn frame_available(&mut self) -> bool {
        if self.pending.is_none() {
            match self.rx.try_recv() {
                Ok(raw) => self.pending = Some(raw),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
        }
        self.pending.is_some()
    }

    fn take_frame(&mut self) -> Option<u64> {
        self.frame_available();
        self.pending.take()
    }
}

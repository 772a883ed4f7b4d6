//! simulation tools for ooklink

pub mod scenarios;

use std::time::Duration;

use ooklink_core::FRAME_BITS;
use ooklink_radio::{MediumConfig, TransportConfig};

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn good_conditions() -> MediumConfig {
        MediumConfig {
            bandwidth_bps: 4800,
            packet_loss: 0.02,
            latency: Duration::from_millis(5),
            latency_jitter: Duration::from_millis(1),  // ±1ms jitter (good conditions)
        }
    }

    pub fn average_conditions() -> MediumConfig {
        MediumConfig {
            bandwidth_bps: 2400,
            packet_loss: 0.10,
            latency: Duration::from_millis(10),
            latency_jitter: Duration::from_millis(3),  // ±3ms jitter (average conditions)
        }
    }

    pub fn poor_conditions() -> MediumConfig {
        MediumConfig {
            bandwidth_bps: 1200,
            packet_loss: 0.25,
            latency: Duration::from_millis(20),
            latency_jitter: Duration::from_millis(8), // ±8ms jitter (poor conditions)
        }
    }

    pub fn extreme_conditions() -> MediumConfig {
        MediumConfig {
            bandwidth_bps: 600,
            packet_loss: 0.45,
            latency: Duration::from_millis(40),
            latency_jitter: Duration::from_millis(15), // ±15ms jitter (extreme conditions)
        }
    }

    /// Transport settings whose ack timeout covers one round trip on
    /// `medium` with room for jitter and a busy channel.
    pub fn transport_for(medium: &MediumConfig) -> TransportConfig {
        let airtime = Duration::from_secs_f64(FRAME_BITS as f64 / medium.bandwidth_bps as f64);
        let one_way = airtime + medium.latency + medium.latency_jitter * 3;
        TransportConfig {
            frame_timeout: one_way * 6,
            retries: 8,
            ..TransportConfig::default()
        }
    }
}

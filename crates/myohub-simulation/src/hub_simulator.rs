//! Simulated acquisition hub producing wire frames

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use myohub_core::{HardwareAddress, LedState, CHANNEL_COUNT};
use myohub_protocol::command::HubCommand;
use myohub_protocol::frame;
use myohub_protocol::telemetry::{
    TEL_ACK, TEL_BATTERY_REPORT, TEL_CONNECTIVITY, TEL_DISCOVERY, TEL_SAMPLE_BATCH,
};

/// Configuration for simulated sample generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Mean of the simulated EMG envelope
    pub baseline: f64,
    /// Standard deviation of sample noise
    pub noise_sd: f64,
    /// Probability that one generated sample is a transmission glitch
    pub glitch_probability: f64,
    /// Probability that a whole batch's sequence number is skipped
    pub drop_probability: f64,
    /// Sample frames per generated batch
    pub frames_per_batch: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            baseline: 8_000.0,
            noise_sd: 400.0,
            glitch_probability: 0.0,
            drop_probability: 0.0,
            frames_per_batch: 4,
        }
    }
}

/// Deterministic (seedable) hub telemetry generator
pub struct HubSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    noise: Normal<f64>,
    sequence: u32,
}

impl HubSimulator {
    /// Create a simulator seeded from the OS entropy source
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Create a simulator with a fixed seed for reproducible tests
    pub fn with_seed(config: SimulatorConfig, seed: u64) -> Self {
        let noise = Normal::new(0.0, config.noise_sd.max(f64::EPSILON))
            .unwrap_or_else(|_| Normal::new(0.0, 1.0).expect("unit normal"));
        HubSimulator {
            config,
            rng: StdRng::seed_from_u64(seed),
            noise,
            sequence: 0,
        }
    }

    /// Next packet sequence number the simulator will use
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Generate one sample-batch frame, advancing the sequence number
    ///
    /// With a nonzero drop probability the sequence number may skip
    /// ahead, simulating a lost packet.
    pub fn next_sample_batch(&mut self) -> String {
        if self.config.drop_probability > 0.0
            && self.rng.gen_bool(self.config.drop_probability)
        {
            self.sequence = self.sequence.wrapping_add(1);
        }

        let mut payload = format!("{:08X}", self.sequence);
        for _ in 0..self.config.frames_per_batch {
            for channel in 0..CHANNEL_COUNT {
                payload.push_str(&format!("{:04X}", self.next_sample(channel)));
            }
        }
        payload.push_str("00"); // reserved trailing byte

        self.sequence = self.sequence.wrapping_add(1);
        frame::encode(TEL_SAMPLE_BATCH, &payload)
    }

    fn next_sample(&mut self, channel: usize) -> u16 {
        if self.config.glitch_probability > 0.0
            && self.rng.gen_bool(self.config.glitch_probability)
        {
            // Half the glitches drop to zero, half saturate.
            return if self.rng.gen_bool(0.5) { 0 } else { 50_000 };
        }

        // Slight per-channel offset so channels are distinguishable.
        let value = self.config.baseline
            + channel as f64 * 50.0
            + self.noise.sample(&mut self.rng);
        value.clamp(1.0, 40_000.0) as u16
    }

    /// Battery report frame: one code per channel plus the hub code
    pub fn battery_report(&self, clip_codes: &[u8; CHANNEL_COUNT], hub_code: u8) -> String {
        let mut payload: String = clip_codes.iter().map(|c| format!("{:02X}", c)).collect();
        payload.push_str(&format!("{:02X}", hub_code));
        frame::encode(TEL_BATTERY_REPORT, &payload)
    }

    /// Discovery report frame for one sensor
    pub fn discovery(&self, address: &HardwareAddress, slot: u8, battery_code: u8) -> String {
        frame::encode(
            TEL_DISCOVERY,
            &format!("{}{:02X}{:02X}", address.as_hex(), slot, battery_code),
        )
    }

    /// Connectivity change frame for one sensor
    pub fn connectivity(&self, address: &HardwareAddress, connected: bool) -> String {
        let status: u8 = if connected { 0x01 } else { 0x00 };
        frame::encode(
            TEL_CONNECTIVITY,
            &format!("{}{:02X}", address.as_hex(), status),
        )
    }

    /// Acknowledgement frame for a previously issued command
    pub fn ack(&self, command: u8, success: bool) -> String {
        let status: u8 = if success { 0x00 } else { 0x01 };
        frame::encode(TEL_ACK, &format!("{:02X}{:02X}", command, status))
    }

    /// Expected LED-change frame, handy for asserting outbound traffic
    pub fn expected_led_frame(address: &HardwareAddress, state: LedState) -> String {
        HubCommand::SetLed {
            address: address.clone(),
            state,
        }
        .to_frame()
    }
}

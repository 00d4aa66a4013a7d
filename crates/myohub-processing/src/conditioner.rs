//! Per-channel glitch rejection and rolling-average smoothing
//!
//! Raw samples are processed strictly in arrival order. The first
//! `warmup_samples` per channel are recorded but never cleaned. After
//! warm-up each sample passes a glitch test; glitches are replaced by a
//! weighted prediction from the recent cleaned history. Once enough
//! cleaned samples exist, every new one also produces a rolling average.

use myohub_core::{validate_channel, ChannelBuffers, MyoResult, CHANNEL_COUNT};

use crate::config::ConditionerConfig;

/// Prediction weights over the cleaned history, most-recent first
pub const GLITCH_KERNEL: [f64; 10] = [
    0.29395525, 0.21062814, 0.15092166, 0.10814009, 0.07748576,
    0.05552097, 0.03978252, 0.02850542, 0.02042503, 0.01463517,
];

/// Stateful signal conditioner over all hub channels
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    config: ConditionerConfig,
    channels: Vec<ChannelBuffers>,
}

impl SignalConditioner {
    /// Create a conditioner with empty buffers for every channel
    pub fn new(config: ConditionerConfig) -> Self {
        SignalConditioner {
            config,
            channels: vec![ChannelBuffers::new(); CHANNEL_COUNT],
        }
    }

    /// Clear every channel's buffers (full measurement reset)
    pub fn reset(&mut self) {
        for buffers in &mut self.channels {
            buffers.reset();
        }
    }

    /// Buffers of one channel
    pub fn channel(&self, index: usize) -> MyoResult<&ChannelBuffers> {
        validate_channel(index)?;
        Ok(&self.channels[index])
    }

    /// Rolling averages of one channel, the externally consumed output
    pub fn averages(&self, index: usize) -> MyoResult<&[u16]> {
        Ok(&self.channel(index)?.averages)
    }

    /// Feed one raw sample to one channel
    ///
    /// Returns the rolling average produced by this sample, if the
    /// cleaned sequence is long enough to emit one.
    pub fn push_sample(&mut self, channel: usize, raw: u16) -> MyoResult<Option<u16>> {
        validate_channel(channel)?;
        let config = self.config.clone();
        let buffers = &mut self.channels[channel];

        buffers.raw.push(raw);
        if buffers.raw.len() <= config.warmup_samples {
            return Ok(None);
        }

        let cleaned = if is_glitch(raw, &buffers.cleaned, &config) {
            predict(&buffers.cleaned)
        } else {
            raw
        };
        buffers.cleaned.push(cleaned);

        if buffers.cleaned.len() >= config.average_window {
            let window = &buffers.cleaned[buffers.cleaned.len() - config.average_window..];
            let sum: u64 = window.iter().map(|&v| v as u64).sum();
            let average =
                ((sum as f64 / config.average_window as f64).round()) as u16;
            buffers.averages.push(average);
            return Ok(Some(average));
        }

        Ok(None)
    }

    /// Feed one sample frame, one value per channel, in channel order
    ///
    /// Returns the (channel, average) pairs produced by this frame.
    pub fn push_frame(&mut self, frame: &[u16; CHANNEL_COUNT]) -> Vec<(usize, u16)> {
        let mut produced = Vec::new();
        for (channel, &raw) in frame.iter().enumerate() {
            // Channel index comes from the frame layout, always valid.
            if let Ok(Some(average)) = self.push_sample(channel, raw) {
                produced.push((channel, average));
            }
        }
        produced
    }
}

/// Glitch test against the cleaned history
fn is_glitch(raw: u16, cleaned: &[u16], config: &ConditionerConfig) -> bool {
    if raw == 0 || raw > config.glitch_ceiling {
        return true;
    }
    if cleaned.len() >= GLITCH_KERNEL.len() {
        if let Some(&last) = cleaned.last() {
            let jump = (raw as i32 - last as i32).unsigned_abs();
            return jump > config.glitch_jump as u32;
        }
    }
    false
}

/// Weighted prediction from the recent cleaned history
///
/// With fewer than ten cleaned entries the partial kernel is applied to
/// what exists, so an early glitch degrades toward zero instead of
/// failing.
fn predict(cleaned: &[u16]) -> u16 {
    let taps = GLITCH_KERNEL.len().min(cleaned.len());
    let mut weighted = 0.0f64;
    for (k, &weight) in GLITCH_KERNEL.iter().take(taps).enumerate() {
        weighted += cleaned[cleaned.len() - 1 - k] as f64 * weight;
    }
    weighted.round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warmed_up(config: &ConditionerConfig) -> SignalConditioner {
        let mut conditioner = SignalConditioner::new(config.clone());
        for _ in 0..config.warmup_samples {
            conditioner.push_sample(0, 1000).unwrap();
        }
        conditioner
    }

    #[test]
    fn test_warmup_withheld_from_cleaned() {
        let config = ConditionerConfig::default();
        let mut conditioner = SignalConditioner::new(config.clone());
        for i in 0..config.warmup_samples {
            conditioner.push_sample(0, 1000 + i as u16).unwrap();
        }

        let buffers = conditioner.channel(0).unwrap();
        assert_eq!(buffers.raw.len(), config.warmup_samples);
        assert!(buffers.cleaned.is_empty());

        conditioner.push_sample(0, 2000).unwrap();
        let buffers = conditioner.channel(0).unwrap();
        assert_eq!(buffers.cleaned, vec![2000]);
    }

    #[test]
    fn test_zero_is_replaced() {
        let config = ConditionerConfig::default();
        let mut conditioner = warmed_up(&config);
        for _ in 0..10 {
            conditioner.push_sample(0, 1000).unwrap();
        }

        conditioner.push_sample(0, 0).unwrap();
        let buffers = conditioner.channel(0).unwrap();
        let replaced = *buffers.cleaned.last().unwrap();
        assert_ne!(replaced, 0);
        // Kernel over a constant history predicts close to that constant.
        assert!((replaced as i32 - 1000).abs() < 5);
    }

    #[test]
    fn test_ceiling_is_replaced() {
        let config = ConditionerConfig::default();
        let mut conditioner = warmed_up(&config);
        for _ in 0..10 {
            conditioner.push_sample(0, 1000).unwrap();
        }

        conditioner.push_sample(0, 50_000).unwrap();
        let buffers = conditioner.channel(0).unwrap();
        assert_ne!(*buffers.cleaned.last().unwrap(), 50_000);
    }

    #[test]
    fn test_jump_is_replaced_once_history_exists() {
        let config = ConditionerConfig::default();
        let mut conditioner = warmed_up(&config);
        for _ in 0..10 {
            conditioner.push_sample(0, 10_000).unwrap();
        }

        // Deviation of 6000 from the last cleaned value is a glitch.
        conditioner.push_sample(0, 16_000).unwrap();
        let buffers = conditioner.channel(0).unwrap();
        assert_ne!(*buffers.cleaned.last().unwrap(), 16_000);

        // 4000 is within tolerance and passes through verbatim.
        conditioner.push_sample(0, 14_000).unwrap();
        let buffers = conditioner.channel(0).unwrap();
        assert_eq!(*buffers.cleaned.last().unwrap(), 14_000);
    }

    #[test]
    fn test_jump_not_tested_with_short_history() {
        let config = ConditionerConfig::default();
        let mut conditioner = warmed_up(&config);
        conditioner.push_sample(0, 10_000).unwrap();
        // Only one cleaned entry: the deviation rule does not apply yet.
        conditioner.push_sample(0, 30_000).unwrap();
        let buffers = conditioner.channel(0).unwrap();
        assert_eq!(*buffers.cleaned.last().unwrap(), 30_000);
    }

    #[test]
    fn test_first_average_at_window_fill() {
        let config = ConditionerConfig::default();
        let mut conditioner = warmed_up(&config);

        let mut produced = None;
        for i in 0..config.average_window {
            produced = conditioner.push_sample(0, 1000 + i as u16).unwrap();
            if i + 1 < config.average_window {
                assert!(produced.is_none());
            }
        }

        // Mean of 1000..=1025 is 1012.5, rounded to 1013 (ties away from zero).
        assert_eq!(produced, Some(1013));
        let buffers = conditioner.channel(0).unwrap();
        assert_eq!(buffers.averages, vec![1013]);
    }

    #[test]
    fn test_reset_clears_all_channels() {
        let config = ConditionerConfig::default();
        let mut conditioner = SignalConditioner::new(config);
        for channel in 0..CHANNEL_COUNT {
            conditioner.push_sample(channel, 500).unwrap();
        }
        conditioner.reset();
        for channel in 0..CHANNEL_COUNT {
            assert!(conditioner.channel(channel).unwrap().raw.is_empty());
        }
    }

    #[test]
    fn test_push_frame_spreads_across_channels() {
        let config = ConditionerConfig {
            warmup_samples: 0,
            ..ConditionerConfig::default()
        };
        let mut conditioner = SignalConditioner::new(config);
        conditioner.push_frame(&[100, 200, 300, 400, 500, 600, 700, 800]);
        for channel in 0..CHANNEL_COUNT {
            let buffers = conditioner.channel(channel).unwrap();
            assert_eq!(buffers.raw, vec![(100 * (channel as u16 + 1))]);
        }
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let mut conditioner = SignalConditioner::new(ConditionerConfig::default());
        assert!(conditioner.push_sample(8, 100).is_err());
    }

    #[test]
    fn test_kernel_weights_sum_close_to_one() {
        let sum: f64 = GLITCH_KERNEL.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}

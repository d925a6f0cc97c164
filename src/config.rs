//! Timeline configuration.
//!
//! Hosts usually embed a `[timeline]` table in their own settings file and
//! hand the text to [`TimelineConfig::from_toml_str`]. Every field has a
//! default, so an empty table is valid.

use serde::{Deserialize, Serialize};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse timeline config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid timeline config: {0}")]
    Invalid(String),
}

/// Tunables for the engine clock, audio queue and dispatcher pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Engine ticks per emulated second.
    pub clock_hz: u64,

    /// Audio samples generated per emulated second at normal speed.
    pub audio_sample_rate: u32,

    /// Capacity of the engine's audio queue, in samples.
    pub audio_queue_samples: usize,

    /// Speed multiplier applied while turbo is enabled.
    pub turbo_factor: u32,

    /// Longest run the dispatcher performs before checking for requests.
    pub run_slice_ticks: u64,

    /// Ticks between two vertical sync pulses.
    pub vsync_ticks: u64,

    /// How long an idle dispatcher waits for a request, in milliseconds.
    pub idle_poll_ms: u64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            clock_hz: 4_000_000,
            audio_sample_rate: 48_000,
            audio_queue_samples: 8_192,
            turbo_factor: 10,
            run_slice_ticks: 20_000,
            vsync_ticks: 80_000,
            idle_poll_ms: 5,
        }
    }
}

impl TimelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TimelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Reject values that would stall the clock or the audio queue.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("clock_hz", self.clock_hz == 0),
            ("audio_sample_rate", self.audio_sample_rate == 0),
            ("audio_queue_samples", self.audio_queue_samples == 0),
            ("turbo_factor", self.turbo_factor == 0),
            ("run_slice_ticks", self.run_slice_ticks == 0),
            ("vsync_ticks", self.vsync_ticks == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
        }
        if u64::from(self.audio_sample_rate) > self.clock_hz {
            return Err(ConfigError::Invalid(
                "audio_sample_rate cannot exceed clock_hz".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine audio frequency for the given turbo state.
    ///
    /// Turbo divides the rate so a queue drained at real-time speed spans
    /// `turbo_factor` times more emulated time.
    pub fn audio_frequency(&self, turbo: bool) -> u32 {
        if turbo {
            self.audio_sample_rate / self.turbo_factor.max(1)
        } else {
            self.audio_sample_rate
        }
    }

    /// Emulated-time multiplier for the given turbo state.
    pub fn speed(&self, turbo: bool) -> u64 {
        if turbo {
            u64::from(self.turbo_factor)
        } else {
            1
        }
    }
}

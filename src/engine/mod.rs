//! Emulation engine primitives.
//!
//! The timeline never simulates hardware itself. It drives an [`Engine`] through a
//! narrow set of primitives: run until a tick or stop condition, apply a discrete
//! input, snapshot and restore state, and drain generated audio.
//!
//! [`ReferenceCore`] is a small deterministic engine implementing the full
//! interface. It is the default engine for new machines and the engine used in
//! the test-suite.

mod audio;
mod reference;

pub use audio::{AudioQueue, FRAME_BYTES};
pub use reference::{ReferenceCore, ROM_SIZE, STATE_MAGIC, STATE_VERSION};

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use crate::action::Action;
use crate::config::TimelineConfig;

/// Set of conditions that can end a run early.
///
/// A `run_until` call is given the reasons it should stop for and returns the
/// reasons that actually stopped it (`NONE` when the target tick was reached).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StopReason(u8);

impl StopReason {
    pub const NONE: StopReason = StopReason(0);
    /// The audio sample queue is full.
    pub const AUDIO_OVERRUN: StopReason = StopReason(1);
    /// A vertical sync pulse occurred.
    pub const VSYNC: StopReason = StopReason(2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        StopReason(bits & (Self::AUDIO_OVERRUN.0 | Self::VSYNC.0))
    }

    pub fn contains(self, other: StopReason) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any reason in `other` is also set in `self`.
    pub fn intersects(self, other: StopReason) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for StopReason {
    type Output = StopReason;

    fn bitor(self, rhs: StopReason) -> StopReason {
        StopReason(self.0 | rhs.0)
    }
}

impl BitOrAssign for StopReason {
    fn bitor_assign(&mut self, rhs: StopReason) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        let mut names = Vec::new();
        if self.contains(Self::AUDIO_OVERRUN) {
            names.push("audio-overrun");
        }
        if self.contains(Self::VSYNC) {
            names.push("vsync");
        }
        write!(f, "{}", names.join("|"))
    }
}

/// Errors raised by engine primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid key code {0}")]
    InvalidKeyCode(u8),

    #[error("invalid drive {0}")]
    InvalidDrive(u8),

    #[error("media rejected: {0}")]
    InvalidMedia(String),

    #[error("invalid engine state: {0}")]
    InvalidState(String),

    #[error("invalid ROM size {0} (expected {expected})", expected = ROM_SIZE)]
    InvalidRomSize(usize),
}

/// Primitive interface of a cycle-stepping emulator.
///
/// Implementations are owned by exactly one dispatcher thread, hence `Send`
/// without `Sync`.
pub trait Engine: Send {
    /// Monotonic tick counter.
    fn ticks(&self) -> u64;

    /// Run until `stop_ticks` is reached or a condition in `stop_reason` fires.
    ///
    /// Returns the reasons that stopped the run, `StopReason::NONE` when the
    /// target tick was reached. Never runs past `stop_ticks`.
    fn run_until(&mut self, stop_ticks: u64, stop_reason: StopReason) -> StopReason;

    /// Apply a key edge. Returns `false` if the key was already in that state.
    fn key_press(&mut self, code: u8, down: bool) -> Result<bool, EngineError>;

    /// Insert a disc image, or eject with `None`.
    fn load_disc(&mut self, drive: u8, media: Option<&[u8]>) -> Result<(), EngineError>;

    /// Insert a tape image, or eject with `None`.
    fn load_tape(&mut self, media: Option<&[u8]>) -> Result<(), EngineError>;

    /// Soft reset. Ticks keep counting.
    fn reset(&mut self);

    /// Serialize the full machine state.
    fn get_state(&self) -> Vec<u8>;

    /// Restore a state produced by [`Engine::get_state`].
    ///
    /// ROMs and the audio frequency are host configuration and are not part of
    /// the blob. Pending audio is discarded.
    fn set_state(&mut self, state: &[u8]) -> Result<(), EngineError>;

    fn set_lower_rom(&mut self, rom: &[u8]) -> Result<(), EngineError>;

    fn set_upper_rom(&mut self, bank: u8, rom: &[u8]) -> Result<(), EngineError>;

    /// Sample generation rate in Hz.
    fn set_audio_frequency(&mut self, hz: u32);

    /// Drain queued samples as interleaved little-endian 16-bit stereo frames.
    ///
    /// Writes as many whole frames as fit in `buffer` and returns the frame count.
    fn read_audio_16bit_stereo(&mut self, buffer: &mut [u8]) -> usize;

    /// Number of samples waiting in the audio queue.
    fn pending_audio_samples(&self) -> usize;

    /// Discard up to `samples` queued samples. Returns how many were dropped.
    fn advance_playback(&mut self, samples: usize) -> usize;

    /// Ticks between two vertical sync pulses.
    fn vsync_interval(&self) -> u64;

    /// Execute a request and echo back what was actually done.
    ///
    /// `Ok(None)` means the engine coalesced the request into a no-op (a key
    /// already in the requested state, or a run-until) and nothing should be
    /// recorded.
    fn execute(&mut self, request: &Action) -> Result<Option<Action>, EngineError> {
        match request {
            Action::Reset => {
                self.reset();
                Ok(Some(Action::Reset))
            }
            Action::KeyPress { code, down } => {
                let changed = self.key_press(*code, *down)?;
                Ok(changed.then(|| request.clone()))
            }
            Action::LoadDisc { drive, media } => {
                self.load_disc(*drive, media.as_deref())?;
                Ok(Some(request.clone()))
            }
            Action::LoadTape { media } => {
                self.load_tape(media.as_deref())?;
                Ok(Some(request.clone()))
            }
            Action::RunUntil {
                stop_ticks,
                stop_reason,
            } => {
                self.run_until(*stop_ticks, *stop_reason);
                Ok(None)
            }
        }
    }

    /// Run through `frames` vertical sync pulses.
    ///
    /// Stops early, returning the reason, if any other condition in
    /// `stop_reason` fires first.
    fn run_for_vsync(&mut self, frames: u32, stop_reason: StopReason) -> StopReason {
        for _ in 0..frames {
            let limit = self.ticks().saturating_add(self.vsync_interval());
            let reason = self.run_until(limit, stop_reason | StopReason::VSYNC);
            let early = StopReason::from_bits(reason.bits() & !StopReason::VSYNC.bits());
            if !early.is_none() {
                return early;
            }
        }
        StopReason::VSYNC
    }
}

/// Builds a fresh engine at power-on.
pub type EngineFactory = Arc<dyn Fn(&TimelineConfig) -> Box<dyn Engine> + Send + Sync>;

/// The factory used when the host does not supply one.
pub fn reference_factory() -> EngineFactory {
    Arc::new(|config: &TimelineConfig| Box::new(ReferenceCore::new(config)) as Box<dyn Engine>)
}

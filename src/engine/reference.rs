//! Deterministic reference engine.
//!
//! `ReferenceCore` models just enough of a home computer to exercise every
//! timeline primitive: a tick clock, an 80-key keyboard matrix, two disc drives,
//! a tape deck, banked ROM slots and a noise voice feeding an audio queue.
//! Everything is derived from the tick count and the inputs, so two cores fed the
//! same actions at the same ticks produce identical state blobs. The noise voice
//! is clocked by ticks; only the resampler feeding the audio queue follows the
//! host sample rate, and its phase is not part of the state.
//!
//! ## State Format
//!
//! - 4 bytes: magic `"TLRC"`
//! - 4 bytes: version (u32 little-endian)
//! - 8 bytes: ticks (u64)
//! - 4 bytes: noise LFSR (u32)
//! - 10 bytes: keyboard matrix
//! - per drive, then the tape: 1 byte present flag, and when present a u32
//!   length followed by the media bytes

use std::collections::BTreeMap;
use std::sync::Arc;

use super::audio::AudioQueue;
use super::{Engine, EngineError, StopReason};
use crate::action::Media;
use crate::config::TimelineConfig;

/// Required size of every ROM image.
pub const ROM_SIZE: usize = 0x4000;

/// Magic number for state blobs ("TLRC" in ASCII).
pub const STATE_MAGIC: [u8; 4] = *b"TLRC";

/// Current state format version.
pub const STATE_VERSION: u32 = 2;

const KEY_COUNT: u8 = 80;
const MATRIX_BYTES: usize = 10;
const DRIVE_COUNT: usize = 2;

const DISC_MAGICS: [&[u8]; 2] = [b"MV - CPC", b"EXTENDED CPC DSK"];
const TAPE_MAGIC: &[u8] = b"ZXTape!\x1a";

/// 23-bit noise register, seeded non-zero.
const LFSR_MASK: u32 = (1 << 23) - 1;
const LFSR_SEED: u32 = 0x7FFFF8;
/// Taps 22 and 17 give a maximal-length sequence.
const LFSR_PERIOD: u64 = (1 << 23) - 1;

/// Ticks per noise register shift.
const NOISE_PERIOD: u64 = 64;

/// Base amplitude of the noise voice.
const NOISE_LEVEL: i16 = 0x0400;

/// Deterministic engine implementing every timeline primitive.
#[derive(Debug, Clone)]
pub struct ReferenceCore {
    clock_hz: u64,
    frequency: u64,
    vsync_ticks: u64,

    ticks: u64,
    /// Resampler phase: accumulated `frequency` per tick, a sample is due each
    /// time it reaches `clock_hz`.
    accumulator: u64,
    lfsr: u32,
    keyboard: [u8; MATRIX_BYTES],
    drives: [Option<Media>; DRIVE_COUNT],
    tape: Option<Media>,

    lower_rom: Option<Arc<[u8]>>,
    upper_roms: BTreeMap<u8, Arc<[u8]>>,

    audio: AudioQueue,
}

impl ReferenceCore {
    /// Create a core at power-on. One audio sample is queued immediately.
    pub fn new(config: &TimelineConfig) -> Self {
        let mut core = Self {
            clock_hz: config.clock_hz.max(1),
            frequency: u64::from(config.audio_sample_rate),
            vsync_ticks: config.vsync_ticks.max(1),
            ticks: 0,
            accumulator: 0,
            lfsr: LFSR_SEED,
            keyboard: [0; MATRIX_BYTES],
            drives: [None, None],
            tape: None,
            lower_rom: None,
            upper_roms: BTreeMap::new(),
            audio: AudioQueue::new(config.audio_queue_samples),
        };
        core.generate_sample();
        core
    }

    /// Whether a key is currently held.
    pub fn is_key_down(&self, code: u8) -> bool {
        code < KEY_COUNT && self.keyboard[usize::from(code / 8)] & (1 << (code % 8)) != 0
    }

    /// Media in a drive, if any.
    pub fn disc(&self, drive: u8) -> Option<&[u8]> {
        self.drives.get(usize::from(drive))?.as_deref()
    }

    pub fn tape(&self) -> Option<&[u8]> {
        self.tape.as_deref()
    }

    pub fn lower_rom(&self) -> Option<&[u8]> {
        self.lower_rom.as_deref()
    }

    pub fn upper_rom(&self, bank: u8) -> Option<&[u8]> {
        self.upper_roms.get(&bank).map(|rom| &rom[..])
    }

    /// Samples lost to a full queue since power-on.
    pub fn dropped_samples(&self) -> u64 {
        self.audio.dropped()
    }

    /// Ticks until the accumulator next reaches the clock rate.
    fn ticks_to_next_sample(&self) -> u64 {
        if self.frequency == 0 {
            return u64::MAX;
        }
        (self.clock_hz - self.accumulator).div_ceil(self.frequency)
    }

    fn advance(&mut self, delta: u64) {
        let shifts = (self.ticks + delta) / NOISE_PERIOD - self.ticks / NOISE_PERIOD;
        for _ in 0..shifts % LFSR_PERIOD {
            self.clock_noise();
        }
        self.ticks += delta;
        if self.frequency == 0 {
            return;
        }
        self.accumulator += delta * self.frequency;
        while self.accumulator >= self.clock_hz {
            self.accumulator -= self.clock_hz;
            self.generate_sample();
        }
    }

    /// Resampler phase a core running at `frequency` since power-on has at `ticks`.
    fn phase_at(&self, ticks: u64) -> u64 {
        let phase = u128::from(ticks) * u128::from(self.frequency) % u128::from(self.clock_hz);
        phase as u64
    }

    fn clock_noise(&mut self) {
        let bit = ((self.lfsr >> 22) ^ (self.lfsr >> 17)) & 1;
        self.lfsr = ((self.lfsr << 1) | bit) & LFSR_MASK;
    }

    fn generate_sample(&mut self) {
        let held = self.keyboard.iter().map(|b| b.count_ones()).sum::<u32>();
        let level = NOISE_LEVEL.saturating_mul(1 + held.min(7) as i16);
        let left = if self.lfsr & 1 != 0 { level } else { -level };
        let right = if self.lfsr & 2 != 0 { level } else { -level };
        self.audio.push(left, right);
    }

    fn check_rom(rom: &[u8]) -> Result<Arc<[u8]>, EngineError> {
        if rom.len() != ROM_SIZE {
            return Err(EngineError::InvalidRomSize(rom.len()));
        }
        Ok(Arc::from(rom))
    }
}

impl Engine for ReferenceCore {
    fn ticks(&self) -> u64 {
        self.ticks
    }

    fn run_until(&mut self, stop_ticks: u64, stop_reason: StopReason) -> StopReason {
        let watch_overrun = stop_reason.contains(StopReason::AUDIO_OVERRUN);
        let watch_vsync = stop_reason.contains(StopReason::VSYNC);

        while self.ticks < stop_ticks {
            if watch_overrun && self.audio.is_full() {
                return StopReason::AUDIO_OVERRUN;
            }

            let mut target = stop_ticks.min(self.ticks.saturating_add(self.ticks_to_next_sample()));
            if watch_vsync {
                let next_vsync = (self.ticks / self.vsync_ticks + 1) * self.vsync_ticks;
                target = target.min(next_vsync);
            }

            self.advance(target - self.ticks);

            if watch_vsync && self.ticks % self.vsync_ticks == 0 {
                return StopReason::VSYNC;
            }
        }

        StopReason::NONE
    }

    fn key_press(&mut self, code: u8, down: bool) -> Result<bool, EngineError> {
        if code >= KEY_COUNT {
            return Err(EngineError::InvalidKeyCode(code));
        }
        if self.is_key_down(code) == down {
            return Ok(false);
        }

        let byte = &mut self.keyboard[usize::from(code / 8)];
        let mask = 1 << (code % 8);
        if down {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        Ok(true)
    }

    fn load_disc(&mut self, drive: u8, media: Option<&[u8]>) -> Result<(), EngineError> {
        let slot = self
            .drives
            .get_mut(usize::from(drive))
            .ok_or(EngineError::InvalidDrive(drive))?;

        if let Some(image) = media {
            if !DISC_MAGICS.iter().any(|magic| image.starts_with(magic)) {
                return Err(EngineError::InvalidMedia(
                    "not a CPC disc image".to_string(),
                ));
            }
        }

        *slot = media.map(Media::from);
        Ok(())
    }

    fn load_tape(&mut self, media: Option<&[u8]>) -> Result<(), EngineError> {
        if let Some(image) = media {
            if !image.starts_with(TAPE_MAGIC) {
                return Err(EngineError::InvalidMedia("not a TZX tape image".to_string()));
            }
        }

        self.tape = media.map(Media::from);
        Ok(())
    }

    fn reset(&mut self) {
        self.keyboard = [0; MATRIX_BYTES];
        self.lfsr = LFSR_SEED;
    }

    fn get_state(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&STATE_MAGIC);
        data.extend_from_slice(&STATE_VERSION.to_le_bytes());
        data.extend_from_slice(&self.ticks.to_le_bytes());
        data.extend_from_slice(&self.lfsr.to_le_bytes());
        data.extend_from_slice(&self.keyboard);
        for media in self.drives.iter().chain(std::iter::once(&self.tape)) {
            write_media(&mut data, media.as_deref());
        }
        data
    }

    fn set_state(&mut self, state: &[u8]) -> Result<(), EngineError> {
        let mut reader = StateReader::new(state);

        if reader.bytes(4)? != STATE_MAGIC {
            return Err(EngineError::InvalidState(
                "invalid state magic number".to_string(),
            ));
        }
        let version = reader.u32()?;
        if version != STATE_VERSION {
            return Err(EngineError::InvalidState(format!(
                "incompatible state version: expected {}, got {}",
                STATE_VERSION, version
            )));
        }

        let ticks = reader.u64()?;
        let lfsr = reader.u32()?;
        let mut keyboard = [0u8; MATRIX_BYTES];
        keyboard.copy_from_slice(reader.bytes(MATRIX_BYTES)?);
        let drives = [reader.media()?, reader.media()?];
        let tape = reader.media()?;

        if !reader.is_at_end() {
            return Err(EngineError::InvalidState(
                "trailing bytes after state".to_string(),
            ));
        }

        self.ticks = ticks;
        self.accumulator = self.phase_at(ticks);
        self.lfsr = lfsr & LFSR_MASK;
        self.keyboard = keyboard;
        self.drives = drives;
        self.tape = tape;
        self.audio.clear();
        Ok(())
    }

    fn set_lower_rom(&mut self, rom: &[u8]) -> Result<(), EngineError> {
        self.lower_rom = Some(Self::check_rom(rom)?);
        Ok(())
    }

    fn set_upper_rom(&mut self, bank: u8, rom: &[u8]) -> Result<(), EngineError> {
        let rom = Self::check_rom(rom)?;
        self.upper_roms.insert(bank, rom);
        Ok(())
    }

    fn set_audio_frequency(&mut self, hz: u32) {
        self.frequency = u64::from(hz);
    }

    fn read_audio_16bit_stereo(&mut self, buffer: &mut [u8]) -> usize {
        self.audio.read_16bit_stereo(buffer)
    }

    fn pending_audio_samples(&self) -> usize {
        self.audio.len()
    }

    fn advance_playback(&mut self, samples: usize) -> usize {
        self.audio.advance(samples)
    }

    fn vsync_interval(&self) -> u64 {
        self.vsync_ticks
    }
}

fn write_media(data: &mut Vec<u8>, media: Option<&[u8]>) {
    match media {
        Some(bytes) => {
            data.push(1);
            data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            data.extend_from_slice(bytes);
        }
        None => data.push(0),
    }
}

/// Little-endian cursor over a state blob.
struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], EngineError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| EngineError::InvalidState("state truncated".to_string()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, EngineError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, EngineError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.bytes(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, EngineError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    fn media(&mut self) -> Result<Option<Media>, EngineError> {
        match self.u8()? {
            0 => Ok(None),
            1 => {
                let len = self.u32()? as usize;
                Ok(Some(Media::from(self.bytes(len)?)))
            }
            flag => Err(EngineError::InvalidState(format!(
                "invalid media flag {}",
                flag
            ))),
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

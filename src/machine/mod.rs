//! The machine: a live engine bound to a persistent history timeline.
//!
//! A [`Machine`] is a cheap handle. The engine, the history tree and the open
//! log file live on a dedicated dispatcher thread, and every method marshals
//! one request there and waits for its reply. Methods therefore take `&self`
//! and may be called from any thread; they are applied in call order.
//!
//! ```no_run
//! use std::sync::Arc;
//! use emutimeline::{DiskFileSystem, Machine, StopReason};
//!
//! # fn main() -> emutimeline::Result<()> {
//! let fs = Arc::new(DiskFileSystem::new());
//! let mut machine = Machine::new("demo", "demo.cpvc", fs)?;
//! machine.key(58, true)?;
//! machine.run_until(400_000, StopReason::NONE)?;
//! machine.add_bookmark(false)?;
//! machine.close()?;
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod pacer;
mod pause;

pub use dispatcher::MachineStatus;
pub use pause::AutoPause;

use std::fmt;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use tracing::warn;

use crate::action::Action;
use crate::bookmark::Bookmark;
use crate::config::TimelineConfig;
use crate::engine::{reference_factory, EngineFactory, StopReason};
use crate::error::{Result, TimelineError};
use crate::fs::SharedFileSystem;
use crate::history::{EventId, HistoryEvent, HistoryTree};
use dispatcher::{Host, Reply, Request, Timeline};

/// Construction options for a [`Machine`].
#[derive(Clone)]
pub struct MachineOptions {
    pub config: TimelineConfig,
    /// Builds every engine instance, at creation, open and root seeks.
    pub engine_factory: EngineFactory,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            config: TimelineConfig::default(),
            engine_factory: reference_factory(),
        }
    }
}

impl MachineOptions {
    pub fn with_config(config: TimelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn engine_factory(mut self, factory: EngineFactory) -> Self {
        self.engine_factory = factory;
        self
    }
}

/// Handle to a running machine.
///
/// Dropping the handle closes the machine, writing the closing bookmark.
/// Call [`Machine::close`] to observe close errors.
pub struct Machine {
    name: String,
    filepath: String,
    requests: Option<Sender<Request>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("filepath", &self.filepath)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn dispatcher_gone() -> TimelineError {
    TimelineError::Lifecycle("machine dispatcher is not running".to_string())
}

impl Machine {
    /// Create a new machine, replacing any file at `filepath`.
    pub fn new(name: &str, filepath: &str, fs: SharedFileSystem) -> Result<Self> {
        Self::new_with(name, filepath, fs, MachineOptions::default())
    }

    pub fn new_with(
        name: &str,
        filepath: &str,
        fs: SharedFileSystem,
        options: MachineOptions,
    ) -> Result<Self> {
        options.config.validate()?;
        let timeline = Timeline::create(Host::new(name, filepath, fs, options))?;
        Self::spawn(timeline)
    }

    /// Open an existing machine file.
    ///
    /// With `lazy`, only the tail of the file is read: the name and the most
    /// recent checkpoint. The full replay happens on [`Machine::open_fully`]
    /// or on the first operation that needs the engine or the tree.
    pub fn open(name: &str, filepath: &str, fs: SharedFileSystem, lazy: bool) -> Result<Self> {
        Self::open_with(name, filepath, fs, lazy, MachineOptions::default())
    }

    pub fn open_with(
        name: &str,
        filepath: &str,
        fs: SharedFileSystem,
        lazy: bool,
        options: MachineOptions,
    ) -> Result<Self> {
        options.config.validate()?;
        let timeline = Timeline::open(Host::new(name, filepath, fs, options), lazy)?;
        Self::spawn(timeline)
    }

    fn spawn(timeline: Timeline) -> Result<Self> {
        let name = timeline.name().to_string();
        let filepath = timeline.filepath().to_string();
        let (requests, receiver) = unbounded();
        let dispatcher = thread::Builder::new()
            .name("timeline-dispatcher".to_string())
            .spawn(move || dispatcher::run(timeline, receiver))?;

        Ok(Self {
            name,
            filepath,
            requests: Some(requests),
            dispatcher: Some(dispatcher),
        })
    }

    fn call<T>(&self, request: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let requests = self.requests.as_ref().ok_or_else(TimelineError::closed)?;
        let (reply, response) = bounded(1);
        requests
            .send(request(reply))
            .map_err(|_| dispatcher_gone())?;
        response.recv().map_err(|_| dispatcher_gone())?
    }

    /// The machine's display name, as recorded in its file.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_none()
    }

    pub fn status(&self) -> Result<MachineStatus> {
        self.call(|reply| Request::Status { reply })
    }

    /// Whether the machine was opened lazily and has not been replayed yet.
    pub fn requires_open(&self) -> Result<bool> {
        Ok(self.status()?.requires_open)
    }

    /// Complete a lazy open. A no-op for fully opened machines.
    pub fn open_fully(&self) -> Result<()> {
        self.call(|reply| Request::OpenFully { reply })
    }

    // History

    pub fn root_event(&self) -> Result<HistoryEvent> {
        self.event(EventId::ROOT)
    }

    pub fn current_event(&self) -> Result<HistoryEvent> {
        self.call(|reply| Request::Event { id: None, reply })
    }

    pub fn event(&self, id: EventId) -> Result<HistoryEvent> {
        self.call(|reply| Request::Event { id: Some(id), reply })
    }

    /// A snapshot of the whole history tree.
    pub fn history(&self) -> Result<HistoryTree> {
        self.call(|reply| Request::History { reply })
    }

    // Run state

    pub fn start(&self) -> Result<()> {
        self.call(|reply| Request::SetRunning {
            running: Some(true),
            reply,
        })
        .map(drop)
    }

    pub fn stop(&self) -> Result<()> {
        self.call(|reply| Request::SetRunning {
            running: Some(false),
            reply,
        })
        .map(drop)
    }

    /// Flip between running and stopped. Returns whether the machine now runs.
    pub fn toggle_running(&self) -> Result<bool> {
        self.call(|reply| Request::SetRunning {
            running: None,
            reply,
        })
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(self.status()?.running)
    }

    /// Pause until the returned guard is dropped.
    pub fn auto_pause(&self) -> Result<AutoPause> {
        self.call(|reply| Request::Pause { reply })?;
        let requests = self.requests.as_ref().ok_or_else(TimelineError::closed)?;
        Ok(AutoPause::new(requests.clone()))
    }

    pub fn enable_turbo(&self, on: bool) -> Result<()> {
        self.call(|reply| Request::EnableTurbo { on, reply })
    }

    // Engine

    pub fn ticks(&self) -> Result<u64> {
        self.call(|reply| Request::Ticks { reply })
    }

    pub fn engine_state(&self) -> Result<Vec<u8>> {
        self.call(|reply| Request::EngineState { reply })
    }

    fn submit(&self, action: Action) -> Result<Option<EventId>> {
        self.call(|reply| Request::Submit { action, reply })
    }

    /// Press or release a key. Returns the recorded event, or `None` if the
    /// key was already in that state.
    pub fn key(&self, code: u8, down: bool) -> Result<Option<EventId>> {
        self.submit(Action::key_press(code, down))
    }

    /// Insert a disc image, or eject with `None`.
    pub fn load_disc(&self, drive: u8, media: Option<&[u8]>) -> Result<Option<EventId>> {
        self.submit(Action::load_disc(drive, media))
    }

    pub fn load_tape(&self, media: Option<&[u8]>) -> Result<Option<EventId>> {
        self.submit(Action::load_tape(media))
    }

    pub fn reset(&self) -> Result<Option<EventId>> {
        self.submit(Action::reset())
    }

    /// Run until `stop_ticks` or until a condition in `stop_reason` fires.
    pub fn run_until(&self, stop_ticks: u64, stop_reason: StopReason) -> Result<StopReason> {
        self.call(|reply| Request::RunUntil {
            stop_ticks,
            stop_reason,
            reply,
        })
    }

    pub fn run_for_vsync(&self, frames: u32) -> Result<StopReason> {
        self.call(|reply| Request::RunForVSync { frames, reply })
    }

    // Timeline

    /// Bookmark the engine's current state.
    ///
    /// Returns `None` when the current event already is an equivalent
    /// bookmark at the engine's tick.
    pub fn add_bookmark(&self, system: bool) -> Result<Option<EventId>> {
        self.call(|reply| Request::AddBookmark { system, reply })
    }

    /// Rewind to the nearest bookmarked ancestor of the current event.
    pub fn seek_to_last_bookmark(&self) -> Result<EventId> {
        self.call(|reply| Request::SeekToLastBookmark { reply })
    }

    /// Move to any event in the tree, reconstructing the engine state there.
    pub fn seek_to_event(&self, id: EventId) -> Result<()> {
        self.call(|reply| Request::SeekToEvent { id, reply })
    }

    /// Delete the subtree rooted at `id`.
    ///
    /// Returns `false` for the root, which cannot be trimmed. Fails for the
    /// current event or any of its ancestors.
    pub fn trim_timeline(&self, id: EventId) -> Result<bool> {
        self.call(|reply| Request::Trim { id, reply })
    }

    /// Attach, replace or (with `None`) remove the bookmark of a checkpoint.
    pub fn set_bookmark(&self, id: EventId, bookmark: Option<Bookmark>) -> Result<()> {
        self.call(|reply| Request::SetBookmark {
            id,
            bookmark,
            reply,
        })
    }

    /// Compact the machine file in place. Returns the status message.
    pub fn rewrite_machine_file(&self) -> Result<String> {
        self.call(|reply| Request::Rewrite { reply })
    }

    // Host plumbing

    /// Drain audio into `buffer[offset..offset + len]` as 16-bit stereo frames.
    ///
    /// Returns the number of frames written.
    pub fn read_audio(&self, buffer: &mut [u8], offset: usize, len: usize) -> Result<usize> {
        let buffer_len = buffer.len();
        let target = offset
            .checked_add(len)
            .and_then(|end| buffer.get_mut(offset..end))
            .ok_or_else(|| {
                TimelineError::InvalidOperation(format!(
                    "audio range {}+{} exceeds buffer of {} bytes",
                    offset,
                    len,
                    buffer_len
                ))
            })?;

        let (frames, bytes) = self.call(|reply| Request::ReadAudio { len, reply })?;
        target[..bytes.len()].copy_from_slice(&bytes);
        Ok(frames)
    }

    /// Drop up to `samples` queued audio samples without reading them.
    pub fn advance_playback(&self, samples: usize) -> Result<usize> {
        self.call(|reply| Request::AdvancePlayback { samples, reply })
    }

    pub fn set_lower_rom(&self, rom: &[u8]) -> Result<()> {
        let rom = rom.into();
        self.call(|reply| Request::SetLowerRom { rom, reply })
    }

    pub fn set_upper_rom(&self, bank: u8, rom: &[u8]) -> Result<()> {
        let rom = rom.into();
        self.call(|reply| Request::SetUpperRom { bank, rom, reply })
    }

    /// Stop the machine, write the closing system bookmark and release the file.
    ///
    /// Closing twice is a no-op. Every other method fails after close.
    pub fn close(&mut self) -> Result<()> {
        let Some(requests) = self.requests.take() else {
            return Ok(());
        };

        let (reply, response) = bounded(1);
        let result = match requests.send(Request::Close { reply }) {
            Ok(()) => response.recv().unwrap_or_else(|_| Err(dispatcher_gone())),
            Err(_) => Err(dispatcher_gone()),
        };
        drop(requests);

        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                warn!(name = %self.name, "dispatcher thread panicked");
            }
        }
        result
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(name = %self.name, error = %e, "failed to close machine");
        }
    }
}

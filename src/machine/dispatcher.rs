//! Single-writer dispatcher.
//!
//! One thread owns the live engine, the history tree and the log handle.
//! Callers never touch them directly: every operation is a [`Request`] sent
//! over a channel, carrying a one-shot reply sender. Requests are handled
//! strictly in arrival order, so appends, seeks and trims are totally ordered.
//!
//! ```text
//!   Machine (any thread)        unbounded       dispatcher thread
//!   ┌──────────────────┐  ──── Request ────▶  ┌─────────────────────────┐
//!   │ .key()           │                      │ Timeline                │
//!   │ .seek_to_...()   │  ◀─── Result<T> ───  │   engine + tree + log   │
//!   │ .read_audio()    │     bounded(1)       │   real-time run slices  │
//!   └──────────────────┘                      └─────────────────────────┘
//! ```
//!
//! While running, the loop drains pending requests, then runs the engine for
//! one slice toward the real-time target. While stopped it blocks on the
//! channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, info, warn};

use super::pacer::Pacer;
use super::MachineOptions;
use crate::action::Action;
use crate::bookmark::Bookmark;
use crate::codec::{compact_lines, compaction_percent, replay, LazySummary, LogRecord};
use crate::config::TimelineConfig;
use crate::engine::{Engine, EngineFactory, StopReason, FRAME_BYTES};
use crate::error::{Result, TimelineError};
use crate::fs::{LogFile, SharedFileSystem};
use crate::history::{EventId, EventKind, HistoryEvent, HistoryTree};

pub(crate) type Reply<T> = Sender<Result<T>>;

/// Operations marshalled onto the dispatcher thread.
pub(crate) enum Request {
    // Recorded actions
    Submit {
        action: Action,
        reply: Reply<Option<EventId>>,
    },

    // Engine stepping
    RunUntil {
        stop_ticks: u64,
        stop_reason: StopReason,
        reply: Reply<StopReason>,
    },
    RunForVSync {
        frames: u32,
        reply: Reply<StopReason>,
    },

    // Run state
    SetRunning {
        /// `None` toggles.
        running: Option<bool>,
        reply: Reply<bool>,
    },
    Pause {
        reply: Reply<()>,
    },
    Unpause {
        reply: Reply<()>,
    },
    EnableTurbo {
        on: bool,
        reply: Reply<()>,
    },

    // Timeline
    AddBookmark {
        system: bool,
        reply: Reply<Option<EventId>>,
    },
    SeekToLastBookmark {
        reply: Reply<EventId>,
    },
    SeekToEvent {
        id: EventId,
        reply: Reply<()>,
    },
    Trim {
        id: EventId,
        reply: Reply<bool>,
    },
    SetBookmark {
        id: EventId,
        bookmark: Option<Bookmark>,
        reply: Reply<()>,
    },
    Rewrite {
        reply: Reply<String>,
    },

    // Host plumbing
    ReadAudio {
        len: usize,
        reply: Reply<(usize, Vec<u8>)>,
    },
    AdvancePlayback {
        samples: usize,
        reply: Reply<usize>,
    },
    SetLowerRom {
        rom: Arc<[u8]>,
        reply: Reply<()>,
    },
    SetUpperRom {
        bank: u8,
        rom: Arc<[u8]>,
        reply: Reply<()>,
    },

    // Queries
    OpenFully {
        reply: Reply<()>,
    },
    Ticks {
        reply: Reply<u64>,
    },
    EngineState {
        reply: Reply<Vec<u8>>,
    },
    Event {
        /// `None` asks for the current event.
        id: Option<EventId>,
        reply: Reply<HistoryEvent>,
    },
    History {
        reply: Reply<HistoryTree>,
    },
    Status {
        reply: Reply<MachineStatus>,
    },

    Close {
        reply: Reply<()>,
    },
}

/// Snapshot of a machine's run state, readable without a full open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineStatus {
    /// Opened lazily and not yet replayed.
    pub requires_open: bool,
    /// The engine is currently advancing in real time.
    pub running: bool,
    /// At least one pause guard is held.
    pub paused: bool,
    pub turbo: bool,
    /// Engine ticks; for a lazily opened machine, the ticks of its last checkpoint.
    pub ticks: u64,
    /// Reason the last run stopped early, `NONE` if it did not.
    pub last_stop: StopReason,
    /// Human-readable result of the last maintenance operation.
    pub message: String,
}

/// ROM images re-applied to every freshly built engine.
#[derive(Default)]
struct Roms {
    lower: Option<Arc<[u8]>>,
    upper: BTreeMap<u8, Arc<[u8]>>,
}

/// Host-side configuration of a timeline: where it lives and how to build engines.
pub(crate) struct Host {
    name: String,
    filepath: String,
    fs: SharedFileSystem,
    config: TimelineConfig,
    factory: EngineFactory,
    roms: Roms,
    turbo: bool,
}

impl Host {
    pub(crate) fn new(
        name: &str,
        filepath: &str,
        fs: SharedFileSystem,
        options: MachineOptions,
    ) -> Self {
        Self {
            name: name.to_string(),
            filepath: filepath.to_string(),
            fs,
            config: options.config,
            factory: options.engine_factory,
            roms: Roms::default(),
            turbo: false,
        }
    }

    /// A fresh engine at power-on, with ROMs and audio rate applied.
    fn power_on(&self) -> Result<Box<dyn Engine>> {
        let mut engine = (self.factory)(&self.config);
        engine.set_audio_frequency(self.config.audio_frequency(self.turbo));
        if let Some(rom) = &self.roms.lower {
            engine.set_lower_rom(rom)?;
        }
        for (bank, rom) in &self.roms.upper {
            engine.set_upper_rom(*bank, rom)?;
        }
        Ok(engine)
    }
}

/// A fully opened timeline.
struct Live {
    tree: HistoryTree,
    engine: Box<dyn Engine>,
    log: Box<dyn LogFile>,
}

impl Live {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        let line = record.to_string();
        self.log.write_line(&line)?;
        debug!(
            record = line.split(':').next().unwrap_or_default(),
            id = ?record.id(),
            "appended log record"
        );
        Ok(())
    }

    /// Append an event under the cursor at the engine's ticks, log it, and advance.
    fn record(&mut self, kind: EventKind) -> Result<EventId> {
        let id = self.tree.append(self.engine.ticks(), kind)?;
        let record = LogRecord::event(self.tree.event(id)?);
        if let Err(e) = self.write(&record) {
            // Not durable, so not part of the history.
            let _ = self.tree.trim(id);
            return Err(e);
        }
        self.tree.set_current(id)?;
        Ok(id)
    }

    fn move_cursor(&mut self, id: EventId) -> Result<()> {
        self.write(&LogRecord::Current(id))?;
        self.tree.set_current(id)
    }

    /// Close off the branch being left if the engine ran past the cursor.
    fn mark_departure(&mut self) -> Result<()> {
        if self.engine.ticks() > self.tree.current().ticks() {
            self.record(EventKind::checkpoint())?;
        }
        Ok(())
    }

    fn add_bookmark(&mut self, system: bool, closing: bool) -> Result<Option<EventId>> {
        let ticks = self.engine.ticks();
        let current = self.tree.current();
        if current.is_checkpoint() && current.ticks() == ticks {
            let equivalent = current.bookmark().is_some_and(|b| b.system == system);
            if equivalent || (closing && current.is_root()) {
                debug!(current = %current.id(), system, "bookmark already present");
                return Ok(None);
            }
        }

        let state = self.engine.get_state();
        let bookmark = Bookmark::from_vec(ticks, state, system);
        self.record(EventKind::bookmarked(bookmark)).map(Some)
    }

    /// A fresh engine in the state recorded at `id`, which must be restorable directly.
    ///
    /// The live engine is left untouched, so a failed restore changes nothing.
    fn restored(&self, id: EventId, host: &Host) -> Result<Box<dyn Engine>> {
        let event = self.tree.event(id)?;
        let mut engine = host.power_on()?;
        match event.bookmark() {
            Some(bookmark) => engine.set_state(&bookmark.state)?,
            None if event.is_root() => {}
            None => {
                return Err(TimelineError::InvalidOperation(format!(
                    "event {} has no bookmark",
                    id
                )))
            }
        }
        Ok(engine)
    }
}

enum Stage {
    Lazy(LazySummary),
    Open(Live),
    Closed,
}

/// State owned by the dispatcher thread.
pub(crate) struct Timeline {
    host: Host,
    stage: Stage,
    /// Whether the machine should run when no pause is held.
    running: bool,
    pause_depth: u32,
    pacer: Pacer,
    last_stop: StopReason,
    message: String,
}

impl Timeline {
    fn with_stage(host: Host, stage: Stage) -> Self {
        let pacer = Pacer::new(host.config.clock_hz);
        Self {
            host,
            stage,
            running: false,
            pause_depth: 0,
            pacer,
            last_stop: StopReason::NONE,
            message: String::new(),
        }
    }

    /// Start a new machine file, replacing any file at the path.
    pub(crate) fn create(host: Host) -> Result<Self> {
        check_name(&host.name)?;
        host.fs.delete_file(&host.filepath)?;
        let mut log = host.fs.open_file(&host.filepath)?;
        let tree = HistoryTree::new();
        log.write_line(&LogRecord::Name(host.name.clone()).to_string())?;
        log.write_line(&LogRecord::event(tree.root()).to_string())?;

        let engine = host.power_on()?;
        info!(name = %host.name, path = %host.filepath, "created machine");
        Ok(Self::with_stage(host, Stage::Open(Live { tree, engine, log })))
    }

    /// Open an existing machine file.
    pub(crate) fn open(mut host: Host, lazy: bool) -> Result<Self> {
        check_name(&host.name)?;
        if lazy {
            let reversed = host.fs.read_lines_reverse(&host.filepath)?;
            let summary = LazySummary::scan(&reversed)?;
            if let Some(name) = &summary.name {
                host.name = name.clone();
            }
            info!(name = %host.name, path = %host.filepath, "opened machine lazily");
            return Ok(Self::with_stage(host, Stage::Lazy(summary)));
        }

        let live = load(&mut host)?;
        Ok(Self::with_stage(host, Stage::Open(live)))
    }

    pub(crate) fn name(&self) -> &str {
        &self.host.name
    }

    pub(crate) fn filepath(&self) -> &str {
        &self.host.filepath
    }

    fn ensure_open(&mut self) -> Result<()> {
        if let Stage::Lazy(_) = self.stage {
            let live = load(&mut self.host)?;
            self.stage = Stage::Open(live);
        }
        Ok(())
    }

    /// The open timeline, completing a lazy open first.
    fn open_live(&mut self) -> Result<(&mut Live, &Host)> {
        self.ensure_open()?;
        match &mut self.stage {
            Stage::Open(live) => Ok((live, &self.host)),
            _ => Err(TimelineError::closed()),
        }
    }

    fn is_running(&self) -> bool {
        self.running && self.pause_depth == 0 && matches!(self.stage, Stage::Open(_))
    }

    /// Re-anchor real-time pacing after the run state or the ticks changed.
    fn run_state_changed(&mut self, was_running: bool) {
        let running = self.is_running();
        if running && !was_running {
            if let Stage::Open(live) = &self.stage {
                self.pacer.anchor(live.engine.ticks(), Instant::now());
            }
            debug!(name = %self.host.name, "machine running");
        } else if was_running && !running {
            debug!(name = %self.host.name, "machine stopped");
        }
    }

    fn reanchor(&mut self, ticks: u64) {
        self.pacer.anchor(ticks, Instant::now());
    }

    /// Handle one request. Returns `false` once the machine is closed.
    pub(crate) fn handle(&mut self, request: Request) -> bool {
        // A dropped reply receiver means the caller gave up waiting; nothing to do.
        match request {
            Request::Submit { action, reply } => {
                let _ = reply.send(self.submit(action));
            }
            Request::RunUntil {
                stop_ticks,
                stop_reason,
                reply,
            } => {
                let _ = reply.send(self.run_until(stop_ticks, stop_reason));
            }
            Request::RunForVSync { frames, reply } => {
                let _ = reply.send(self.run_for_vsync(frames));
            }
            Request::SetRunning { running, reply } => {
                let _ = reply.send(self.set_running(running));
            }
            Request::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            Request::Unpause { reply } => {
                let _ = reply.send(self.unpause());
            }
            Request::EnableTurbo { on, reply } => {
                let _ = reply.send(self.enable_turbo(on));
            }
            Request::AddBookmark { system, reply } => {
                let _ = reply.send(self.add_bookmark(system));
            }
            Request::SeekToLastBookmark { reply } => {
                let _ = reply.send(self.seek_to_last_bookmark());
            }
            Request::SeekToEvent { id, reply } => {
                let _ = reply.send(self.seek_to_event(id));
            }
            Request::Trim { id, reply } => {
                let _ = reply.send(self.trim(id));
            }
            Request::SetBookmark {
                id,
                bookmark,
                reply,
            } => {
                let _ = reply.send(self.set_bookmark(id, bookmark));
            }
            Request::Rewrite { reply } => {
                let _ = reply.send(self.rewrite());
            }
            Request::ReadAudio { len, reply } => {
                let _ = reply.send(self.read_audio(len));
            }
            Request::AdvancePlayback { samples, reply } => {
                let _ = reply.send(
                    self.open_live()
                        .map(|(live, _)| live.engine.advance_playback(samples)),
                );
            }
            Request::SetLowerRom { rom, reply } => {
                let _ = reply.send(self.set_lower_rom(rom));
            }
            Request::SetUpperRom { bank, rom, reply } => {
                let _ = reply.send(self.set_upper_rom(bank, rom));
            }
            Request::OpenFully { reply } => {
                let _ = reply.send(self.open_live().map(|_| ()));
            }
            Request::Ticks { reply } => {
                let _ = reply.send(self.open_live().map(|(live, _)| live.engine.ticks()));
            }
            Request::EngineState { reply } => {
                let _ = reply.send(self.open_live().map(|(live, _)| live.engine.get_state()));
            }
            Request::Event { id, reply } => {
                let _ = reply.send(self.event(id));
            }
            Request::History { reply } => {
                let _ = reply.send(self.open_live().map(|(live, _)| live.tree.clone()));
            }
            Request::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Request::Close { reply } => {
                let _ = reply.send(self.close());
                return false;
            }
        }
        true
    }

    fn submit(&mut self, action: Action) -> Result<Option<EventId>> {
        let (live, _) = self.open_live()?;
        let before = live.engine.get_state();
        let Some(recorded) = live.engine.execute(&action)? else {
            return Ok(None);
        };

        match live.record(EventKind::CoreAction(recorded)) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                // An action missing from the history must not affect the engine.
                if let Err(rollback) = live.engine.set_state(&before) {
                    warn!(error = %rollback, "failed to roll back unrecorded action");
                }
                Err(e)
            }
        }
    }

    fn run_until(&mut self, stop_ticks: u64, stop_reason: StopReason) -> Result<StopReason> {
        let (live, _) = self.open_live()?;
        let reason = live.engine.run_until(stop_ticks, stop_reason);
        let ticks = live.engine.ticks();
        self.last_stop = reason;
        self.reanchor(ticks);
        Ok(reason)
    }

    fn run_for_vsync(&mut self, frames: u32) -> Result<StopReason> {
        let (live, _) = self.open_live()?;
        let reason = live.engine.run_for_vsync(frames, StopReason::NONE);
        let ticks = live.engine.ticks();
        self.last_stop = reason;
        self.reanchor(ticks);
        Ok(reason)
    }

    fn set_running(&mut self, running: Option<bool>) -> Result<bool> {
        if matches!(self.stage, Stage::Closed) {
            return Err(TimelineError::closed());
        }
        let running = running.unwrap_or(!self.running);
        if running {
            self.ensure_open()?;
        }

        let was_running = self.is_running();
        self.running = running;
        self.run_state_changed(was_running);
        Ok(self.is_running())
    }

    fn pause(&mut self) -> Result<()> {
        if matches!(self.stage, Stage::Closed) {
            return Err(TimelineError::closed());
        }
        let was_running = self.is_running();
        self.pause_depth += 1;
        self.run_state_changed(was_running);
        Ok(())
    }

    fn unpause(&mut self) -> Result<()> {
        if self.pause_depth == 0 {
            return Err(TimelineError::InvalidOperation(
                "pause released more often than acquired".to_string(),
            ));
        }
        let was_running = self.is_running();
        self.pause_depth -= 1;
        self.run_state_changed(was_running);
        Ok(())
    }

    fn enable_turbo(&mut self, on: bool) -> Result<()> {
        let ticks = match &mut self.stage {
            Stage::Closed => return Err(TimelineError::closed()),
            Stage::Lazy(_) => 0,
            Stage::Open(live) => {
                live.engine
                    .set_audio_frequency(self.host.config.audio_frequency(on));
                live.engine.ticks()
            }
        };
        self.host.turbo = on;
        self.pacer
            .set_speed(self.host.config.speed(on), ticks, Instant::now());
        debug!(name = %self.host.name, turbo = on, "turbo changed");
        Ok(())
    }

    fn add_bookmark(&mut self, system: bool) -> Result<Option<EventId>> {
        let (live, _) = self.open_live()?;
        live.add_bookmark(system, false)
    }

    fn seek_to_last_bookmark(&mut self) -> Result<EventId> {
        let (live, host) = self.open_live()?;
        let target = live.tree.nearest_bookmarked_ancestor(live.tree.current_id())?;
        let engine = live.restored(target, host)?;

        live.mark_departure()?;
        live.move_cursor(target)?;
        live.engine = engine;

        let ticks = live.engine.ticks();
        debug!(target = %target, ticks, "seeked to last bookmark");
        self.reanchor(ticks);
        Ok(target)
    }

    /// Seek to any event: restore its nearest bookmarked ancestor, then replay
    /// the actions on the path down to it.
    fn seek_to_event(&mut self, id: EventId) -> Result<()> {
        let (live, host) = self.open_live()?;
        live.tree.event(id)?;

        let anchor = live.tree.nearest_bookmarked_ancestor(id)?;
        let mut engine = live.restored(anchor, host)?;
        for step in live.tree.path_between(anchor, id)? {
            let event = live.tree.event(step)?;
            engine.run_until(event.ticks(), StopReason::NONE);
            if let Some(action) = event.action() {
                engine.execute(action)?;
            }
        }

        live.mark_departure()?;
        live.move_cursor(id)?;
        live.engine = engine;

        let ticks = live.engine.ticks();
        debug!(target = %id, anchor = %anchor, ticks, "seeked to event");
        self.reanchor(ticks);
        Ok(())
    }

    fn trim(&mut self, id: EventId) -> Result<bool> {
        let (live, _) = self.open_live()?;
        if id == EventId::ROOT {
            debug!("ignoring trim of the root event");
            return Ok(false);
        }

        live.tree.check_trim(id)?;
        let removed = live.tree.subtree_len(id);
        live.write(&LogRecord::Delete(id))?;
        live.tree.trim(id)?;
        debug!(id = %id, removed, "trimmed timeline");
        Ok(true)
    }

    fn set_bookmark(&mut self, id: EventId, bookmark: Option<Bookmark>) -> Result<()> {
        let (live, host) = self.open_live()?;
        let event = live.tree.event(id)?;
        if !event.is_checkpoint() {
            return Err(TimelineError::InvalidOperation(format!(
                "event {} is not a checkpoint",
                id
            )));
        }
        if let Some(bookmark) = &bookmark {
            if bookmark.ticks != event.ticks() {
                return Err(TimelineError::InvalidOperation(format!(
                    "bookmark at tick {} does not match event {} at tick {}",
                    bookmark.ticks,
                    id,
                    event.ticks()
                )));
            }
            // Seeks restore from it later, so the engine must accept it now.
            host.power_on()?.set_state(&bookmark.state)?;
        }

        live.write(&LogRecord::bookmark(id, bookmark.as_ref()))?;
        live.tree.set_bookmark(id, bookmark)
    }

    fn rewrite(&mut self) -> Result<String> {
        let (live, host) = self.open_live()?;
        let path = host.filepath.as_str();
        let tmp = format!("{}.tmp", path);

        let old_len = host.fs.file_length(path)?;
        let lines = compact_lines(&host.name, &live.tree);

        host.fs.delete_file(&tmp)?;
        let mut file = host.fs.open_file(&tmp)?;
        for line in &lines {
            file.write_line(line)?;
        }
        file.close()?;

        live.log.close()?;
        let replaced = host.fs.replace_file(path, &tmp);
        live.log = host.fs.open_file(path)?;
        replaced?;

        let new_len = host.fs.file_length(path)?;
        let message = format!(
            "Compacted machine file by {}%",
            compaction_percent(old_len, new_len)
        );
        info!(path, old_len, new_len, lines = lines.len(), "{}", message);
        self.message = message.clone();
        Ok(message)
    }

    fn read_audio(&mut self, len: usize) -> Result<(usize, Vec<u8>)> {
        let (live, _) = self.open_live()?;
        let mut buffer = vec![0u8; len];
        let frames = live.engine.read_audio_16bit_stereo(&mut buffer);
        buffer.truncate(frames * FRAME_BYTES);
        Ok((frames, buffer))
    }

    fn set_lower_rom(&mut self, rom: Arc<[u8]>) -> Result<()> {
        let (live, _) = self.open_live()?;
        live.engine.set_lower_rom(&rom)?;
        self.host.roms.lower = Some(rom);
        Ok(())
    }

    fn set_upper_rom(&mut self, bank: u8, rom: Arc<[u8]>) -> Result<()> {
        let (live, _) = self.open_live()?;
        live.engine.set_upper_rom(bank, &rom)?;
        self.host.roms.upper.insert(bank, rom);
        Ok(())
    }

    fn event(&mut self, id: Option<EventId>) -> Result<HistoryEvent> {
        let (live, _) = self.open_live()?;
        let id = id.unwrap_or_else(|| live.tree.current_id());
        live.tree.event(id).cloned()
    }

    fn status(&self) -> Result<MachineStatus> {
        let (requires_open, ticks) = match &self.stage {
            Stage::Closed => return Err(TimelineError::closed()),
            Stage::Lazy(summary) => (true, summary.checkpoint_ticks),
            Stage::Open(live) => (false, live.engine.ticks()),
        };
        Ok(MachineStatus {
            requires_open,
            running: self.is_running(),
            paused: self.pause_depth > 0,
            turbo: self.host.turbo,
            ticks,
            last_stop: self.last_stop,
            message: self.message.clone(),
        })
    }

    /// Stop, write the closing system bookmark and release the log.
    fn close(&mut self) -> Result<()> {
        self.running = false;
        match std::mem::replace(&mut self.stage, Stage::Closed) {
            Stage::Closed => Ok(()),
            Stage::Lazy(_) => {
                info!(name = %self.host.name, "closed machine");
                Ok(())
            }
            Stage::Open(mut live) => {
                let bookmarked = live.add_bookmark(true, true);
                let closed = live.log.close();
                info!(
                    name = %self.host.name,
                    ticks = live.engine.ticks(),
                    events = live.tree.len(),
                    "closed machine"
                );
                bookmarked?;
                closed?;
                Ok(())
            }
        }
    }

    /// Run the engine toward the real-time target for at most one slice.
    ///
    /// Returns `false` when no progress was made: the engine is ahead of real
    /// time or stalled on a full audio queue.
    fn run_slice(&mut self) -> bool {
        let Stage::Open(live) = &mut self.stage else {
            return false;
        };
        let now = Instant::now();
        let ticks = live.engine.ticks();
        let target = self.pacer.target_ticks(now);
        if target <= ticks {
            return false;
        }

        let stop = target.min(ticks.saturating_add(self.host.config.run_slice_ticks));
        let reason = live.engine.run_until(stop, StopReason::AUDIO_OVERRUN);
        if reason.contains(StopReason::AUDIO_OVERRUN) {
            // Resume from here once the host drains audio, instead of catching up.
            self.last_stop = reason;
            self.pacer.anchor(live.engine.ticks(), now);
            return false;
        }
        true
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.close() {
            warn!(name = %self.host.name, error = %e, "failed to close machine on disconnect");
        }
    }
}

/// Names are stored on a single `name:` line.
fn check_name(name: &str) -> Result<()> {
    if name.contains(['\n', '\r']) {
        return Err(TimelineError::InvalidOperation(format!(
            "machine name {:?} spans more than one line",
            name
        )));
    }
    Ok(())
}

/// Eagerly replay the machine file and build the live engine at the resume point.
fn load(host: &mut Host) -> Result<Live> {
    let lines = host.fs.read_lines(&host.filepath)?;
    let replayed = replay(&lines)?;
    if let Some(name) = &replayed.name {
        host.name = name.clone();
    }

    let resume = replayed.resume_point();
    let mut tree = replayed.tree;
    let mut engine = host.power_on()?;
    if let Some(bookmark) = tree.event(resume)?.bookmark() {
        engine.set_state(&bookmark.state)?;
    }

    let mut log = host.fs.open_file(&host.filepath)?;
    if resume != tree.current_id() {
        warn!(
            from = %tree.current_id(),
            to = %resume,
            "current event has no bookmark, resuming from the nearest bookmark"
        );
        log.write_line(&LogRecord::Current(resume).to_string())?;
        tree.set_current(resume)?;
    }

    info!(
        name = %host.name,
        path = %host.filepath,
        events = tree.len(),
        current = %resume,
        "opened machine"
    );
    Ok(Live { tree, engine, log })
}

/// Dispatcher thread body.
pub(crate) fn run(mut timeline: Timeline, requests: Receiver<Request>) {
    let idle = Duration::from_millis(timeline.host.config.idle_poll_ms.max(1));
    debug!(name = %timeline.host.name, "dispatcher started");

    'dispatch: loop {
        if !timeline.is_running() {
            match requests.recv() {
                Ok(request) => {
                    if !timeline.handle(request) {
                        break 'dispatch;
                    }
                }
                Err(_) => {
                    timeline.shutdown();
                    break 'dispatch;
                }
            }
            continue;
        }

        // Drain queued requests before running the next slice.
        loop {
            match requests.try_recv() {
                Ok(request) => {
                    if !timeline.handle(request) {
                        break 'dispatch;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    timeline.shutdown();
                    break 'dispatch;
                }
            }
        }

        if timeline.is_running() && !timeline.run_slice() {
            match requests.recv_timeout(idle) {
                Ok(request) => {
                    if !timeline.handle(request) {
                        break 'dispatch;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    timeline.shutdown();
                    break 'dispatch;
                }
            }
        }
    }

    debug!(name = %timeline.host.name, "dispatcher stopped");
}

//! Emulator input actions.
//!
//! An [`Action`] describes a single state-changing input to the emulator: a reset,
//! a key edge, a disc or tape swap, or a run-until request. The same shape is used
//! for what a caller *asked for* (a request) and for what the engine *actually did*
//! (the recorded action stored in the history tree), so tree nodes can hold either.
//!
//! Media buffers are copied on construction. Mutating the caller's buffer after the
//! action has been built is never observable through the action.

use std::fmt;
use std::sync::Arc;

use crate::engine::StopReason;

/// Immutable, shared media image (disc or tape).
pub type Media = Arc<[u8]>;

/// Discriminant of an [`Action`], useful for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Reset,
    KeyPress,
    RunUntil,
    LoadDisc,
    LoadTape,
}

/// A single emulator input or control action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Soft reset of the machine.
    Reset,

    /// A key edge on the keyboard matrix.
    KeyPress {
        /// Matrix key code.
        code: u8,
        /// `true` for key down, `false` for key up.
        down: bool,
    },

    /// Advance the engine until `stop_ticks` or until a stop reason fires.
    ///
    /// Never recorded in the history tree: elapsed time is implicit in the
    /// tick stamps of the surrounding events.
    RunUntil {
        stop_ticks: u64,
        stop_reason: StopReason,
    },

    /// Insert (or eject, with `None`) a disc image.
    LoadDisc { drive: u8, media: Option<Media> },

    /// Insert (or eject, with `None`) a tape image.
    LoadTape { media: Option<Media> },
}

/// A request submitted to the dispatcher. Shares the [`Action`] shape.
pub type CoreRequest = Action;

impl Action {
    /// Build a reset action.
    pub fn reset() -> Self {
        Action::Reset
    }

    /// Build a key edge action.
    pub fn key_press(code: u8, down: bool) -> Self {
        Action::KeyPress { code, down }
    }

    /// Build a run-until request.
    pub fn run_until(stop_ticks: u64, stop_reason: StopReason) -> Self {
        Action::RunUntil {
            stop_ticks,
            stop_reason,
        }
    }

    /// Build a disc action. The buffer is copied; `None` ejects the drive.
    pub fn load_disc(drive: u8, buffer: Option<&[u8]>) -> Self {
        Action::LoadDisc {
            drive,
            media: buffer.map(Media::from),
        }
    }

    /// Build a tape action. The buffer is copied; `None` ejects the tape.
    pub fn load_tape(buffer: Option<&[u8]>) -> Self {
        Action::LoadTape {
            media: buffer.map(Media::from),
        }
    }

    /// The discriminant of this action.
    pub fn action_type(&self) -> ActionType {
        match self {
            Action::Reset => ActionType::Reset,
            Action::KeyPress { .. } => ActionType::KeyPress,
            Action::RunUntil { .. } => ActionType::RunUntil,
            Action::LoadDisc { .. } => ActionType::LoadDisc,
            Action::LoadTape { .. } => ActionType::LoadTape,
        }
    }

    /// Whether this action can be stored as a history node.
    pub fn is_recordable(&self) -> bool {
        !matches!(self, Action::RunUntil { .. })
    }

    /// Media carried by a disc or tape action.
    pub fn media(&self) -> Option<&[u8]> {
        match self {
            Action::LoadDisc { media, .. } | Action::LoadTape { media } => media.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Reset => write!(f, "Reset"),
            Action::KeyPress { code, down } => {
                write!(f, "Key {} {}", code, if *down { "down" } else { "up" })
            }
            Action::RunUntil { stop_ticks, .. } => write!(f, "Run until {}", stop_ticks),
            Action::LoadDisc { drive, media } => match media {
                Some(m) => write!(f, "Load disc {} ({} bytes)", drive, m.len()),
                None => write!(f, "Eject disc {}", drive),
            },
            Action::LoadTape { media } => match media {
                Some(m) => write!(f, "Load tape ({} bytes)", m.len()),
                None => write!(f, "Eject tape"),
            },
        }
    }
}

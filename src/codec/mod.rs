//! Line-oriented machine file format.
//!
//! A machine file is an append-only sequence of UTF-8 lines, one record per
//! line, each starting with a tag. Fields are separated by `:` and binary
//! payloads are hex-encoded inline.
//!
//! | Record | Meaning |
//! |--------|---------|
//! | `name:<text>` | machine display name |
//! | `checkpoint:<id>:<ticks>:<has>:<system>[:<state>]` | checkpoint, optionally bookmarked |
//! | `key:<id>:<ticks>:<code>:<down>` | key edge |
//! | `reset:<id>:<ticks>` | soft reset |
//! | `disc:<id>:<ticks>:<drive>[:<media>]` | disc insert or eject |
//! | `tape:<id>:<ticks>[:<media>]` | tape insert or eject |
//! | `current:<id>` | cursor moved without an append |
//! | `delete:<id>` | subtree trimmed |
//! | `bookmark:<id>:<has>:<system>[:<state>]` | bookmark replaced on an existing checkpoint |
//!
//! Bookmark state is run-length coded (see [`rle`]) before hex encoding;
//! media is hex-encoded as-is.

mod compact;
pub mod rle;
mod replay;

pub use compact::{compact_lines, compaction_percent};
pub use replay::{replay, LazySummary, Replayed};

use std::fmt;
use std::str::Split;
use std::sync::Arc;

use crate::action::{Action, Media};
use crate::bookmark::Bookmark;
use crate::error::TimelineError;
use crate::history::{EventId, EventKind, HistoryEvent};
use rle::RleError;

/// Why a single line failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("unknown tag '{0}'")]
    UnknownTag(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid {field} '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid {field} flag '{value}' (expected 0 or 1)")]
    InvalidFlag { field: &'static str, value: String },

    #[error("unexpected trailing field in '{0}' record")]
    TrailingField(String),

    #[error("bookmark flag and payload disagree")]
    BookmarkPayload,

    #[error("invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid bookmark payload: {0}")]
    Rle(#[from] RleError),
}

/// One parsed line of a machine file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Name(String),

    /// A history event appended under the cursor.
    Event {
        id: EventId,
        ticks: u64,
        kind: EventKind,
    },

    Current(EventId),

    Delete(EventId),

    /// Replace the bookmark of an existing checkpoint. `state: None` clears it.
    Bookmark {
        id: EventId,
        system: bool,
        state: Option<Arc<[u8]>>,
    },
}

impl LogRecord {
    /// The record for a history event as it stands in the tree.
    pub fn event(event: &HistoryEvent) -> Self {
        LogRecord::Event {
            id: event.id(),
            ticks: event.ticks(),
            kind: event.kind().clone(),
        }
    }

    /// The record that replaces `id`'s bookmark.
    pub fn bookmark(id: EventId, bookmark: Option<&Bookmark>) -> Self {
        LogRecord::Bookmark {
            id,
            system: bookmark.is_some_and(|b| b.system),
            state: bookmark.map(|b| b.state.clone()),
        }
    }

    /// Parse one line.
    pub fn parse(line: &str) -> Result<Self, RecordError> {
        let (tag, rest) = line.split_once(':').unwrap_or((line, ""));
        if tag == "name" {
            return Ok(LogRecord::Name(rest.to_string()));
        }

        let mut fields = Fields::new(tag, rest);
        let record = match tag {
            "checkpoint" => {
                let id = fields.id()?;
                let ticks = fields.number("ticks")?;
                let has = fields.flag("bookmark")?;
                let system = fields.flag("system")?;
                let bookmark = match (has, fields.optional()) {
                    (true, Some(payload)) => {
                        Some(Bookmark::from_vec(ticks, decode_state(payload)?, system))
                    }
                    (false, None) => None,
                    _ => return Err(RecordError::BookmarkPayload),
                };
                LogRecord::Event {
                    id,
                    ticks,
                    kind: EventKind::Checkpoint { bookmark },
                }
            }
            "key" => {
                let id = fields.id()?;
                let ticks = fields.number("ticks")?;
                let code = fields.number("key code")?;
                let down = fields.flag("key down")?;
                action_event(id, ticks, Action::key_press(code, down))
            }
            "reset" => {
                let id = fields.id()?;
                let ticks = fields.number("ticks")?;
                action_event(id, ticks, Action::Reset)
            }
            "disc" => {
                let id = fields.id()?;
                let ticks = fields.number("ticks")?;
                let drive = fields.number("drive")?;
                let media = fields.optional().map(decode_media).transpose()?;
                action_event(id, ticks, Action::LoadDisc { drive, media })
            }
            "tape" => {
                let id = fields.id()?;
                let ticks = fields.number("ticks")?;
                let media = fields.optional().map(decode_media).transpose()?;
                action_event(id, ticks, Action::LoadTape { media })
            }
            "current" => LogRecord::Current(fields.id()?),
            "delete" => LogRecord::Delete(fields.id()?),
            "bookmark" => {
                let id = fields.id()?;
                let has = fields.flag("bookmark")?;
                let system = fields.flag("system")?;
                let state = match (has, fields.optional()) {
                    (true, Some(payload)) => Some(Arc::from(decode_state(payload)?)),
                    (false, None) => None,
                    _ => return Err(RecordError::BookmarkPayload),
                };
                LogRecord::Bookmark { id, system, state }
            }
            other => return Err(RecordError::UnknownTag(other.to_string())),
        };

        fields.finish()?;
        Ok(record)
    }

    /// The event id a record refers to, if any.
    pub fn id(&self) -> Option<EventId> {
        match self {
            LogRecord::Name(_) => None,
            LogRecord::Event { id, .. }
            | LogRecord::Current(id)
            | LogRecord::Delete(id)
            | LogRecord::Bookmark { id, .. } => Some(*id),
        }
    }

    pub fn is_checkpoint(&self) -> bool {
        matches!(
            self,
            LogRecord::Event {
                kind: EventKind::Checkpoint { .. },
                ..
            }
        )
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogRecord::Name(name) => write!(f, "name:{}", name),
            LogRecord::Current(id) => write!(f, "current:{}", id),
            LogRecord::Delete(id) => write!(f, "delete:{}", id),
            LogRecord::Bookmark { id, system, state } => {
                write!(f, "bookmark:{}:{}:{}", id, flag(state.is_some()), flag(*system))?;
                if let Some(state) = state {
                    write!(f, ":{}", hex::encode(rle::encode(state)))?;
                }
                Ok(())
            }
            LogRecord::Event { id, ticks, kind } => match kind {
                EventKind::Checkpoint { bookmark } => {
                    let system = bookmark.as_ref().is_some_and(|b| b.system);
                    write!(
                        f,
                        "checkpoint:{}:{}:{}:{}",
                        id,
                        ticks,
                        flag(bookmark.is_some()),
                        flag(system)
                    )?;
                    if let Some(bookmark) = bookmark {
                        write!(f, ":{}", hex::encode(rle::encode(&bookmark.state)))?;
                    }
                    Ok(())
                }
                EventKind::CoreAction(action) => match action {
                    Action::Reset => write!(f, "reset:{}:{}", id, ticks),
                    Action::KeyPress { code, down } => {
                        write!(f, "key:{}:{}:{}:{}", id, ticks, code, flag(*down))
                    }
                    Action::LoadDisc { drive, media } => {
                        write!(f, "disc:{}:{}:{}", id, ticks, drive)?;
                        write_media(f, media.as_ref())
                    }
                    Action::LoadTape { media } => {
                        write!(f, "tape:{}:{}", id, ticks)?;
                        write_media(f, media.as_ref())
                    }
                    // Not recordable; HistoryTree refuses to hold one.
                    Action::RunUntil { .. } => Err(fmt::Error),
                },
            },
        }
    }
}

/// Parse line `line_no` (1-based), lifting failures into a format error.
pub fn parse_line(line_no: usize, line: &str) -> Result<LogRecord, TimelineError> {
    LogRecord::parse(line).map_err(|e| TimelineError::format(line_no, e.to_string()))
}

fn action_event(id: EventId, ticks: u64, action: Action) -> LogRecord {
    LogRecord::Event {
        id,
        ticks,
        kind: EventKind::CoreAction(action),
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

fn write_media(f: &mut fmt::Formatter, media: Option<&Media>) -> fmt::Result {
    match media {
        Some(media) => write!(f, ":{}", hex::encode(media)),
        None => Ok(()),
    }
}

fn decode_state(payload: &str) -> Result<Vec<u8>, RecordError> {
    Ok(rle::decode(&hex::decode(payload)?)?)
}

fn decode_media(payload: &str) -> Result<Media, RecordError> {
    Ok(Media::from(hex::decode(payload)?))
}

/// Cursor over the `:`-separated fields following a tag.
struct Fields<'a> {
    tag: &'a str,
    parts: Option<Split<'a, char>>,
}

impl<'a> Fields<'a> {
    fn new(tag: &'a str, rest: &'a str) -> Self {
        let parts = (!rest.is_empty()).then(|| rest.split(':'));
        Self { tag, parts }
    }

    fn optional(&mut self) -> Option<&'a str> {
        self.parts.as_mut()?.next()
    }

    fn required(&mut self, field: &'static str) -> Result<&'a str, RecordError> {
        self.optional().ok_or(RecordError::MissingField(field))
    }

    fn number<T: std::str::FromStr>(&mut self, field: &'static str) -> Result<T, RecordError> {
        let value = self.required(field)?;
        value.parse().map_err(|_| RecordError::InvalidNumber {
            field,
            value: value.to_string(),
        })
    }

    fn id(&mut self) -> Result<EventId, RecordError> {
        self.number("id").map(EventId)
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, RecordError> {
        match self.required(field)? {
            "0" => Ok(false),
            "1" => Ok(true),
            value => Err(RecordError::InvalidFlag {
                field,
                value: value.to_string(),
            }),
        }
    }

    fn finish(mut self) -> Result<(), RecordError> {
        match self.optional() {
            Some(_) => Err(RecordError::TrailingField(self.tag.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(line: &str) {
        let record = LogRecord::parse(line).unwrap();
        assert_eq!(record.to_string(), line);
    }

    #[test]
    fn test_records_round_trip() {
        round_trip("name:My machine");
        round_trip("checkpoint:0:0:0:0");
        round_trip("key:3:1200:58:1");
        round_trip("reset:4:99");
        round_trip("disc:5:100:0");
        round_trip("disc:6:100:1:4d56202d20435043");
        round_trip("tape:7:100");
        round_trip("current:2");
        round_trip("delete:9");
        round_trip("bookmark:2:0:0");
    }

    #[test]
    fn test_name_keeps_separators() {
        assert_eq!(
            LogRecord::parse("name:a:b").unwrap(),
            LogRecord::Name("a:b".to_string())
        );
    }

    #[test]
    fn test_checkpoint_bookmark_payload() {
        let bookmark = Bookmark::new(100, &[0, 0, 0, 0, 0, 0, 5], true);
        let record = LogRecord::Event {
            id: EventId(1),
            ticks: 100,
            kind: EventKind::bookmarked(bookmark.clone()),
        };
        let line = record.to_string();
        assert!(line.starts_with("checkpoint:1:100:1:1:"));

        match LogRecord::parse(&line).unwrap() {
            LogRecord::Event {
                kind: EventKind::Checkpoint { bookmark: Some(b) },
                ..
            } => assert_eq!(b, bookmark),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_bookmark_payload_fails() {
        assert!(matches!(
            LogRecord::parse("checkpoint:1:100:1:0:010203"),
            Err(RecordError::Rle(_))
        ));
        assert!(matches!(
            LogRecord::parse("checkpoint:1:100:1:0:zz"),
            Err(RecordError::Hex(_))
        ));
        assert!(matches!(
            LogRecord::parse("checkpoint:1:100:1:0"),
            Err(RecordError::BookmarkPayload)
        ));
    }

    #[test]
    fn test_malformed_lines_fail() {
        assert!(matches!(
            LogRecord::parse("invalid:0"),
            Err(RecordError::UnknownTag(_))
        ));
        assert!(matches!(
            LogRecord::parse("key:1:2:3"),
            Err(RecordError::MissingField("key down"))
        ));
        assert!(matches!(
            LogRecord::parse("key:1:2:300:1"),
            Err(RecordError::InvalidNumber { .. })
        ));
        assert!(matches!(
            LogRecord::parse("key:1:2:3:2"),
            Err(RecordError::InvalidFlag { .. })
        ));
        assert!(matches!(
            LogRecord::parse("reset:1:2:3"),
            Err(RecordError::TrailingField(tag)) if tag == "reset"
        ));
        assert!(matches!(
            LogRecord::parse("current"),
            Err(RecordError::MissingField("id"))
        ));
    }

    #[test]
    fn test_parse_line_reports_line_number() {
        let err = parse_line(7, "bogus").unwrap_err();
        assert!(matches!(err, TimelineError::Format { line: 7, .. }));
    }
}

//! Rebuilding a history tree from machine file lines.

use tracing::debug;

use super::{parse_line, LogRecord};
use crate::bookmark::Bookmark;
use crate::error::{Result, TimelineError};
use crate::history::{EventId, EventKind, HistoryTree};

/// Outcome of an eager replay.
#[derive(Debug, Clone)]
pub struct Replayed {
    /// Name from the file's `name:` record, if present.
    pub name: Option<String>,
    /// The reconstructed tree, cursor where the file left it.
    pub tree: HistoryTree,
}

impl Replayed {
    /// Where a reopened machine should resume.
    ///
    /// The cursor itself when it can be restored directly (the root, or a
    /// bookmarked checkpoint), otherwise its nearest bookmarked ancestor. The
    /// latter happens when the final close bookmark is missing.
    pub fn resume_point(&self) -> EventId {
        let current = self.tree.current();
        if current.is_root() || current.bookmark().is_some() {
            return current.id();
        }
        self.tree
            .nearest_bookmarked_ancestor(current.id())
            .unwrap_or(EventId::ROOT)
    }
}

fn lifecycle_no_checkpoint() -> TimelineError {
    TimelineError::Lifecycle("machine file contains no checkpoint".to_string())
}

/// Replay every line of a machine file, in order.
///
/// Event records append under the cursor and advance it; `current` moves it;
/// `delete` trims; `bookmark` replaces a checkpoint's bookmark. Any malformed
/// or inconsistent line fails the whole replay with a format error. A file
/// without a root checkpoint fails with a lifecycle error.
pub fn replay<I, S>(lines: I) -> Result<Replayed>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut name = None;
    let mut tree: Option<HistoryTree> = None;

    for (index, line) in lines.into_iter().enumerate() {
        let line_no = index + 1;
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }

        let record = parse_line(line_no, line)?;
        if let LogRecord::Name(text) = record {
            name = Some(text);
            continue;
        }

        match tree.as_mut() {
            Some(tree) => apply(tree, line_no, record)?,
            None => tree = Some(root_from(line_no, record)?),
        }
    }

    let tree = tree.ok_or_else(lifecycle_no_checkpoint)?;
    debug!(
        events = tree.len(),
        current = %tree.current_id(),
        "replayed machine file"
    );

    Ok(Replayed { name, tree })
}

fn root_from(line_no: usize, record: LogRecord) -> Result<HistoryTree> {
    match record {
        LogRecord::Event {
            id: EventId::ROOT,
            ticks,
            kind: EventKind::Checkpoint { bookmark },
        } => Ok(HistoryTree::with_root(ticks, bookmark)),
        _ => Err(TimelineError::format(
            line_no,
            "first event must be the root checkpoint 0",
        )),
    }
}

fn apply(tree: &mut HistoryTree, line_no: usize, record: LogRecord) -> Result<()> {
    let at_line = |e: TimelineError| TimelineError::format(line_no, e.to_string());

    match record {
        LogRecord::Name(_) => {}
        LogRecord::Event { id, ticks, kind } => {
            let id = tree.insert(id, ticks, kind).map_err(at_line)?;
            tree.set_current(id).map_err(at_line)?;
        }
        LogRecord::Current(id) => tree.set_current(id).map_err(at_line)?,
        LogRecord::Delete(EventId::ROOT) => {
            debug!(line = line_no, "ignoring delete of the root event");
        }
        LogRecord::Delete(id) => tree.trim(id).map_err(at_line)?,
        LogRecord::Bookmark { id, system, state } => {
            let ticks = tree.event(id).map_err(at_line)?.ticks();
            let bookmark = state.map(|state| Bookmark {
                ticks,
                state,
                system,
            });
            tree.set_bookmark(id, bookmark).map_err(at_line)?;
        }
    }

    Ok(())
}

/// What a lazy open learns from the tail of a machine file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazySummary {
    pub name: Option<String>,
    /// The most recent checkpoint in the file.
    pub checkpoint: EventId,
    pub checkpoint_ticks: u64,
    pub bookmarked: bool,
}

impl LazySummary {
    /// Scan lines given last-to-first until both a name and a checkpoint were seen.
    ///
    /// Other lines are skipped by their tag without being decoded, so only the
    /// latest checkpoint and the name are ever parsed.
    pub fn scan<S: AsRef<str>>(reversed: &[S]) -> Result<Self> {
        let total = reversed.len();
        let mut name = None;
        let mut checkpoint = None;

        for (index, line) in reversed.iter().enumerate() {
            let line = line.as_ref();
            let wanted = match line.split(':').next() {
                Some("name") => name.is_none(),
                Some("checkpoint") => checkpoint.is_none(),
                _ => false,
            };
            if !wanted {
                continue;
            }

            match parse_line(total - index, line)? {
                LogRecord::Name(text) => name = Some(text),
                LogRecord::Event {
                    id,
                    ticks,
                    kind: EventKind::Checkpoint { bookmark },
                } => {
                    checkpoint = Some((id, ticks, bookmark.is_some()));
                }
                _ => {}
            }

            if name.is_some() && checkpoint.is_some() {
                break;
            }
        }

        let (checkpoint, checkpoint_ticks, bookmarked) =
            checkpoint.ok_or_else(lifecycle_no_checkpoint)?;
        Ok(Self {
            name,
            checkpoint,
            checkpoint_ticks,
            bookmarked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EventType;

    #[test]
    fn test_branching_replay() {
        let replayed = replay([
            "name:Test",
            "checkpoint:0:0:0:0",
            "key:1:100:58:1",
            "key:2:200:58:0",
            "current:1",
            "reset:3:300",
        ])
        .unwrap();

        let tree = &replayed.tree;
        assert_eq!(replayed.name.as_deref(), Some("Test"));
        assert_eq!(tree.get(EventId(1)).unwrap().children(), &[EventId(2), EventId(3)]);
        assert_eq!(tree.current_id(), EventId(3));
        assert_eq!(
            tree.get(EventId(3)).unwrap().event_type(),
            EventType::CoreAction
        );
    }

    #[test]
    fn test_no_checkpoint_is_lifecycle_error() {
        let err = replay(["name:Test"]).unwrap_err();
        assert!(err.is_lifecycle());
    }

    #[test]
    fn test_invalid_token_is_format_error() {
        let err = replay(["invalid:0"]).unwrap_err();
        assert!(matches!(err, TimelineError::Format { line: 1, .. }));
    }

    #[test]
    fn test_corrupt_bookmark_fails() {
        let err = replay([
            "name:Test",
            "checkpoint:0:0:0:0",
            "checkpoint:1:100:1:0:010203",
        ])
        .unwrap_err();
        assert!(matches!(err, TimelineError::Format { line: 3, .. }));
    }

    #[test]
    fn test_delete_root_is_ignored() {
        let replayed = replay(["name:Test", "checkpoint:0:0:0:0", "delete:0"]).unwrap();
        assert!(replayed.tree.root().children().is_empty());
    }

    #[test]
    fn test_delete_is_permanent() {
        let replayed = replay([
            "checkpoint:0:0:0:0",
            "key:1:10:1:1",
            "current:0",
            "delete:1",
            "key:2:20:2:1",
        ])
        .unwrap();
        assert!(!replayed.tree.contains(EventId(1)));
        assert_eq!(replayed.tree.root().children(), &[EventId(2)]);
    }

    #[test]
    fn test_inconsistent_records_fail() {
        for lines in [
            vec!["key:1:0:1:1"],
            vec!["checkpoint:3:0:0:0"],
            vec!["checkpoint:0:0:0:0", "current:5"],
            vec!["checkpoint:0:0:0:0", "delete:4"],
            vec!["checkpoint:0:0:0:0", "key:1:0:1:1", "delete:1"],
            vec!["checkpoint:0:0:0:0", "key:2:0:1:1", "key:1:0:1:0"],
            vec!["checkpoint:0:0:0:0", "key:1:0:1:1", "bookmark:1:0:0"],
        ] {
            let err = replay(&lines).unwrap_err();
            assert!(err.is_format(), "{:?} gave {:?}", lines, err);
        }
    }

    #[test]
    fn test_bookmark_record_updates_checkpoint() {
        let replayed = replay([
            "checkpoint:0:0:0:0",
            "checkpoint:1:50:1:0:00030000000a0b0c",
            "bookmark:1:0:0",
        ])
        .unwrap();
        assert!(replayed.tree.get(EventId(1)).unwrap().bookmark().is_none());
    }

    #[test]
    fn test_resume_point_falls_back_to_bookmark() {
        let replayed = replay([
            "checkpoint:0:0:0:0",
            "checkpoint:1:50:1:0:00030000000a0b0c",
            "disc:2:80:0",
        ])
        .unwrap();
        assert_eq!(replayed.tree.current_id(), EventId(2));
        assert_eq!(replayed.resume_point(), EventId(1));
    }

    #[test]
    fn test_lazy_scan() {
        let summary = LazySummary::scan(&["checkpoint:0:0:0:0", "name:Test"]).unwrap();
        assert_eq!(summary.name.as_deref(), Some("Test"));
        assert_eq!(summary.checkpoint, EventId::ROOT);
        assert!(!summary.bookmarked);
    }

    #[test]
    fn test_lazy_scan_stops_early() {
        // The corrupt line is never reached.
        let summary = LazySummary::scan(&[
            "checkpoint:4:900:1:1:00020000000102",
            "key:3:800:1:1",
            "name:Test",
            "bogus",
        ])
        .unwrap();
        assert_eq!(summary.checkpoint, EventId(4));
        assert!(summary.bookmarked);
    }

    #[test]
    fn test_lazy_scan_skips_older_records() {
        // Neither the bad media payload nor the older bad checkpoint is decoded.
        let summary = LazySummary::scan(&[
            "checkpoint:5:900:0:0",
            "disc:4:800:0:zz",
            "checkpoint:3:700:1:0:010203",
            "name:Test",
        ])
        .unwrap();
        assert_eq!(summary.checkpoint, EventId(5));
        assert_eq!(summary.checkpoint_ticks, 900);
        assert_eq!(summary.name.as_deref(), Some("Test"));
    }

    #[test]
    fn test_lazy_scan_checks_latest_checkpoint() {
        let err = LazySummary::scan(&["checkpoint:5:900:1:0:010203", "name:Test"]).unwrap_err();
        assert!(matches!(err, TimelineError::Format { line: 2, .. }));
    }

    #[test]
    fn test_lazy_scan_without_checkpoint() {
        assert!(LazySummary::scan(&["name:Test"]).unwrap_err().is_lifecycle());
    }
}

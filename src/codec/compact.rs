//! Compaction: writing a tree back out as a minimal machine file.

use super::LogRecord;
use crate::history::HistoryTree;

/// Lines of a machine file that replays to `tree`.
///
/// Live events are written in ascending id order, which is always a valid
/// replay order because children have larger ids than their parents. A
/// `current:<parent>` record precedes any event whose parent is not the
/// event written just before it, and a final `current:<id>` restores the
/// cursor. Bookmarks are written as they stand, so no `bookmark:` records
/// are needed and trimmed subtrees never appear.
pub fn compact_lines(name: &str, tree: &HistoryTree) -> Vec<String> {
    let mut lines = Vec::with_capacity(tree.len() * 2 + 2);
    lines.push(LogRecord::Name(name.to_string()).to_string());

    let mut previous = None;
    for event in tree.iter() {
        if let Some(parent) = event.parent() {
            if previous != Some(parent) {
                lines.push(LogRecord::Current(parent).to_string());
            }
        }
        lines.push(LogRecord::event(event).to_string());
        previous = Some(event.id());
    }

    lines.push(LogRecord::Current(tree.current_id()).to_string());
    lines
}

/// Size reduction as a whole percentage, saturating at zero.
pub fn compaction_percent(old_len: u64, new_len: u64) -> u64 {
    if old_len == 0 {
        return 0;
    }
    old_len.saturating_sub(new_len) * 100 / old_len
}

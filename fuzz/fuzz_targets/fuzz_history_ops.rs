//! Fuzz target for history tree edits.
//!
//! Applies an arbitrary sequence of appends, cursor moves, trims and
//! bookmark edits, and checks the tree's structural invariants after each.

#![no_main]

use arbitrary::Arbitrary;
use emutimeline::{Bookmark, EventId, EventKind, HistoryTree};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Append { ticks: u16, bookmark: bool },
    Move { target: u8 },
    Trim { target: u8 },
    SetBookmark { target: u8, clear: bool },
}

fn pick(tree: &HistoryTree, target: u8) -> EventId {
    let ids: Vec<EventId> = tree.iter().map(|e| e.id()).collect();
    ids[target as usize % ids.len()]
}

fn check(tree: &HistoryTree) {
    assert!(tree.contains(tree.current_id()));
    assert!(tree.is_ancestor_or_self(EventId::ROOT, tree.current_id()));
    for event in tree.iter() {
        for child in event.children() {
            let child = tree.event(*child).expect("children must be live");
            assert_eq!(child.parent(), Some(event.id()));
            assert!(child.ticks() >= event.ticks());
            assert!(child.id() > event.id());
        }
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let mut tree = HistoryTree::new();
    for op in ops.into_iter().take(512) {
        match op {
            Op::Append { ticks, bookmark } => {
                let ticks = tree.current().ticks() + u64::from(ticks);
                let kind = if bookmark {
                    EventKind::bookmarked(Bookmark::new(ticks, &[1, 2, 3], false))
                } else {
                    EventKind::checkpoint()
                };
                let id = tree.append(ticks, kind).expect("append under cursor");
                tree.set_current(id).expect("appended event exists");
            }
            Op::Move { target } => {
                let id = pick(&tree, target);
                tree.set_current(id).expect("picked event exists");
            }
            Op::Trim { target } => {
                let id = pick(&tree, target);
                let allowed = tree.check_trim(id).is_ok();
                assert_eq!(tree.trim(id).is_ok(), allowed);
            }
            Op::SetBookmark { target, clear } => {
                let id = pick(&tree, target);
                let ticks = tree.event(id).expect("picked event exists").ticks();
                let bookmark = (!clear).then(|| Bookmark::new(ticks, &[9], true));
                let _ = tree.set_bookmark(id, bookmark);
            }
        }
        check(&tree);
    }
});

//! Integration tests for editing the timeline: trims, bookmarks, compaction
//! and rejected actions.

mod common;

use common::{create_machine, open_machine, run_for, tags, PATH};
use emutimeline::{Bookmark, EngineError, EventId, MemoryFileSystem, TimelineError};

#[test]
fn test_trim_root_is_a_no_op() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);

    assert!(!machine.trim_timeline(EventId::ROOT).unwrap());
    assert!(machine.root_event().unwrap().children().is_empty());
    assert_eq!(fs.lines(PATH).len(), 2);
}

#[test]
fn test_trim_current_branch_fails() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 100);
    let first = machine.key(1, true).unwrap().unwrap();
    run_for(&machine, 100);
    let second = machine.key(2, true).unwrap().unwrap();
    let before = machine.history().unwrap();

    for id in [first, second] {
        let err = machine.trim_timeline(id).unwrap_err();
        assert!(matches!(err, TimelineError::InvalidOperation(_)));
    }

    assert_eq!(machine.history().unwrap(), before);
    assert_eq!(fs.lines(PATH).len(), 4);
}

#[test]
fn test_trim_unknown_event_fails() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);

    let err = machine.trim_timeline(EventId(7)).unwrap_err();
    assert!(matches!(err, TimelineError::UnknownEvent(EventId(7))));
}

#[test]
fn test_trim_abandoned_branch() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 100);
    let bookmark = machine.add_bookmark(false).unwrap().unwrap();
    let abandoned = machine.key(1, true).unwrap().unwrap();
    run_for(&machine, 100);
    machine.seek_to_last_bookmark().unwrap();

    assert!(machine.trim_timeline(abandoned).unwrap());

    assert!(machine.event(bookmark).unwrap().children().is_empty());
    assert!(matches!(
        machine.event(abandoned).unwrap_err(),
        TimelineError::UnknownEvent(_)
    ));
    assert_eq!(fs.lines(PATH).last().unwrap(), &format!("delete:{}", abandoned));
}

#[test]
fn test_set_bookmark_on_non_checkpoint() {
    let fs = MemoryFileSystem::new();
    fs.insert(PATH, ["name:Test", "checkpoint:0:0:0:0", "key:1:100:58:1"]);
    let machine = open_machine(&fs, false).unwrap();
    let written = fs.lines(PATH).len();

    let err = machine.set_bookmark(EventId(1), None).unwrap_err();

    assert!(matches!(err, TimelineError::InvalidOperation(_)));
    let root = machine.root_event().unwrap();
    assert_eq!(root.children().len(), 1);
    assert!(machine.event(root.children()[0]).unwrap().children().is_empty());
    assert_eq!(fs.lines(PATH).len(), written);
}

#[test]
fn test_set_bookmark_is_durable() {
    let fs = MemoryFileSystem::new();
    let mut machine = create_machine(&fs);
    run_for(&machine, 1000);
    let state = machine.engine_state().unwrap();
    machine.seek_to_last_bookmark().unwrap();
    let branch_end = machine.root_event().unwrap().children()[0];

    machine
        .set_bookmark(branch_end, Some(Bookmark::new(1000, &state, false)))
        .unwrap();
    assert!(fs
        .lines(PATH)
        .last()
        .unwrap()
        .starts_with(&format!("bookmark:{}:1:0:", branch_end)));

    // The attached state is now a seek target.
    machine.seek_to_event(branch_end).unwrap();
    assert_eq!(machine.engine_state().unwrap(), state);
    machine.close().unwrap();

    let machine = open_machine(&fs, false).unwrap();
    let event = machine.event(branch_end).unwrap();
    assert_eq!(&*event.bookmark().unwrap().state, &state[..]);
}

#[test]
fn test_set_bookmark_with_wrong_ticks_fails() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    let state = machine.engine_state().unwrap();

    let err = machine
        .set_bookmark(EventId::ROOT, Some(Bookmark::new(50, &state, false)))
        .unwrap_err();

    assert!(matches!(err, TimelineError::InvalidOperation(_)));
    assert_eq!(fs.lines(PATH).len(), 2);
}

#[test]
fn test_rejected_actions_are_not_recorded() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);

    assert!(matches!(
        machine.key(200, true).unwrap_err(),
        TimelineError::Engine(EngineError::InvalidKeyCode(200))
    ));
    assert!(matches!(
        machine.load_disc(5, None).unwrap_err(),
        TimelineError::Engine(EngineError::InvalidDrive(5))
    ));
    assert!(matches!(
        machine.load_tape(Some(&b"not a tape"[..])).unwrap_err(),
        TimelineError::Engine(EngineError::InvalidMedia(_))
    ));

    assert_eq!(fs.lines(PATH).len(), 2);
    assert_eq!(machine.history().unwrap().len(), 1);
}

#[test]
fn test_coalesced_key_is_not_recorded() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);

    assert!(machine.key(30, true).unwrap().is_some());
    assert_eq!(machine.key(30, true).unwrap(), None);
    assert!(machine.key(30, false).unwrap().is_some());
    assert_eq!(tags(&fs.lines(PATH)), ["name", "checkpoint", "key", "key"]);
}

#[test]
fn test_media_is_recorded_inline() {
    let fs = MemoryFileSystem::new();
    let mut machine = create_machine(&fs);
    let disc = b"MV - CPC test image".to_vec();
    run_for(&machine, 10);
    machine.load_disc(1, Some(disc.as_slice())).unwrap();
    machine.close().unwrap();

    let lines = fs.lines(PATH);
    assert_eq!(lines[2], format!("disc:1:10:1:{}", hex::encode(&disc)));

    let machine = open_machine(&fs, false).unwrap();
    let event = machine.event(EventId(1)).unwrap();
    assert_eq!(event.action().unwrap().media(), Some(&disc[..]));
}

#[test]
fn test_rewrite_file() {
    let fs = MemoryFileSystem::new();
    {
        let mut machine = create_machine(&fs);
        run_for(&machine, 1000);
        machine.load_disc(0, None).unwrap();
        run_for(&machine, 1000);
        let bookmark = machine.add_bookmark(false).unwrap().unwrap();
        run_for(&machine, 1000);
        let to_delete = machine.load_disc(0, None).unwrap().unwrap();
        run_for(&machine, 1000);
        machine.seek_to_last_bookmark().unwrap();
        machine.load_disc(0, None).unwrap();
        run_for(&machine, 1000);
        machine.seek_to_last_bookmark().unwrap();
        machine.load_tape(None).unwrap();
        run_for(&machine, 1000);
        let branch_end = machine.event(to_delete).unwrap().children()[0];
        assert!(machine.trim_timeline(branch_end).unwrap());
        machine.set_bookmark(bookmark, None).unwrap();
        machine.close().unwrap();
    }

    let mut machine = open_machine(&fs, false).unwrap();
    let before = machine.history().unwrap();
    let message = machine.rewrite_machine_file().unwrap();

    assert!(message.starts_with("Compacted machine file by "));
    assert!(message.ends_with('%'));
    assert_eq!(machine.status().unwrap().message, message);

    let lines = fs.lines(PATH);
    assert_eq!(
        lines[..10],
        [
            "name:test",
            "checkpoint:0:0:0:0",
            "disc:1:1000:0",
            "checkpoint:2:2000:0:0",
            "disc:3:3000:0",
            "current:2",
            "disc:5:2000:0",
            "checkpoint:6:3000:0:0",
            "current:2",
            "tape:7:2000",
        ]
    );
    assert!(lines[10].starts_with("checkpoint:8:3000:1:1:"));
    assert_eq!(lines[11], "current:8");
    assert_eq!(lines.len(), 12);
    assert!(!fs.exists(&format!("{}.tmp", PATH)));

    // The log stays writable after the swap.
    machine.key(9, true).unwrap();
    assert_eq!(fs.lines(PATH).last().unwrap(), "key:9:3000:9:1");
    machine.close().unwrap();

    let reopened = open_machine(&fs, false).unwrap();
    let after = reopened.history().unwrap();
    // The new key and the close bookmark hang below event 8.
    assert_eq!(after.len(), before.len() + 2);
    for event in before.iter().filter(|e| e.id() != EventId(8)) {
        assert_eq!(after.event(event.id()).unwrap(), event);
    }
}

#[test]
fn test_failed_write_leaves_engine_unchanged() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 1000);
    let before = machine.engine_state().unwrap();
    let written = fs.lines(PATH).len();

    fs.fail_writes(true);
    let err = machine.key(5, true).unwrap_err();

    assert!(matches!(err, TimelineError::Io(_)));
    assert_eq!(machine.engine_state().unwrap(), before);
    assert_eq!(machine.history().unwrap().len(), 1);
    assert_eq!(fs.lines(PATH).len(), written);

    // The retry is recorded rather than coalesced into a phantom key press.
    fs.fail_writes(false);
    let id = machine.key(5, true).unwrap().unwrap();
    assert_eq!(machine.current_event().unwrap().id(), id);
    assert_eq!(
        fs.lines(PATH).last().unwrap(),
        &format!("key:{}:1000:5:1", id)
    );
}

#[test]
fn test_set_bookmark_rejects_unusable_state() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);

    let err = machine
        .set_bookmark(EventId::ROOT, Some(Bookmark::new(0, b"junk", false)))
        .unwrap_err();

    assert!(matches!(
        err,
        TimelineError::Engine(EngineError::InvalidState(_))
    ));
    assert!(machine.root_event().unwrap().bookmark().is_none());
    assert_eq!(fs.lines(PATH).len(), 2);
}

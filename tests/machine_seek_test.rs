//! Integration tests for seeking within the timeline.

mod common;

use common::{create_machine, open_machine, run_for, PATH};
use emutimeline::{EventId, MemoryFileSystem, TimelineError};

#[test]
fn test_seek_without_bookmark_returns_to_power_on() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    let power_on = machine.engine_state().unwrap();
    machine.key(42, true).unwrap();
    run_for(&machine, 1000);

    let target = machine.seek_to_last_bookmark().unwrap();

    assert_eq!(target, EventId::ROOT);
    assert_eq!(machine.ticks().unwrap(), 0);
    assert_eq!(machine.engine_state().unwrap(), power_on);
    assert_eq!(machine.current_event().unwrap().id(), EventId::ROOT);
}

#[test]
fn test_seek_restores_bookmark() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 1000);
    let bookmark = machine.add_bookmark(false).unwrap().unwrap();
    let state = machine.engine_state().unwrap();
    machine.key(3, true).unwrap();
    run_for(&machine, 2000);

    let target = machine.seek_to_last_bookmark().unwrap();

    assert_eq!(target, bookmark);
    assert_eq!(machine.ticks().unwrap(), 1000);
    assert_eq!(machine.engine_state().unwrap(), state);
    assert_eq!(machine.current_event().unwrap().id(), bookmark);
}

#[test]
fn test_seek_marks_branch_end() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 1000);

    machine.seek_to_last_bookmark().unwrap();

    assert_eq!(
        fs.lines(PATH),
        vec![
            "name:test",
            "checkpoint:0:0:0:0",
            "checkpoint:1:1000:0:0",
            "current:0",
        ]
    );
    let root = machine.root_event().unwrap();
    assert_eq!(root.children(), &[EventId(1)]);
}

#[test]
fn test_seek_without_progress_adds_no_checkpoint() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 1000);
    let bookmark = machine.add_bookmark(false).unwrap().unwrap();

    machine.seek_to_last_bookmark().unwrap();
    machine.seek_to_last_bookmark().unwrap();

    let lines = fs.lines(PATH);
    assert_eq!(&lines[3..], ["current:1", "current:1"]);
    assert_eq!(machine.history().unwrap().len(), 2);
    assert_eq!(machine.current_event().unwrap().id(), bookmark);
}

#[test]
fn test_actions_after_seek_start_a_branch() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 100);
    let bookmark = machine.add_bookmark(false).unwrap().unwrap();
    let first = machine.key(1, true).unwrap().unwrap();

    machine.seek_to_last_bookmark().unwrap();
    let second = machine.key(2, true).unwrap().unwrap();

    let event = machine.event(bookmark).unwrap();
    assert_eq!(event.children(), &[first, second]);
    assert_eq!(machine.event(second).unwrap().parent(), Some(bookmark));
}

#[test]
fn test_seek_to_event_replays_actions() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 1000);
    let first = machine.key(10, true).unwrap().unwrap();
    let state = machine.engine_state().unwrap();
    run_for(&machine, 4000);
    let second = machine.key(11, true).unwrap().unwrap();
    run_for(&machine, 1000);

    machine.seek_to_event(first).unwrap();

    assert_eq!(machine.ticks().unwrap(), 1000);
    assert_eq!(machine.engine_state().unwrap(), state);
    assert_eq!(machine.current_event().unwrap().id(), first);

    // The abandoned branch keeps its end point.
    let second = machine.event(second).unwrap();
    assert_eq!(second.children().len(), 1);
    let end = machine.event(second.children()[0]).unwrap();
    assert_eq!(end.ticks(), 6000);
    assert!(end.is_checkpoint());
}

#[test]
fn test_seek_to_event_from_bookmark() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 500);
    machine.add_bookmark(false).unwrap();
    run_for(&machine, 500);
    let key = machine.key(20, true).unwrap().unwrap();
    let state = machine.engine_state().unwrap();
    run_for(&machine, 500);
    machine.reset().unwrap();

    machine.seek_to_event(key).unwrap();

    assert_eq!(machine.engine_state().unwrap(), state);
}

#[test]
fn test_seek_to_unknown_event_fails() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    run_for(&machine, 100);

    let err = machine.seek_to_event(EventId(99)).unwrap_err();

    assert!(matches!(err, TimelineError::UnknownEvent(EventId(99))));
    assert_eq!(fs.lines(PATH).len(), 2);
    assert_eq!(machine.ticks().unwrap(), 100);
}

#[test]
fn test_seek_survives_reopen() {
    let fs = MemoryFileSystem::new();
    let mut machine = create_machine(&fs);
    run_for(&machine, 100);
    // A system bookmark, so closing on it writes nothing further.
    let bookmark = machine.add_bookmark(true).unwrap().unwrap();
    machine.key(5, true).unwrap();
    run_for(&machine, 100);
    machine.seek_to_last_bookmark().unwrap();
    let tree = machine.history().unwrap();
    machine.close().unwrap();

    let machine = open_machine(&fs, false).unwrap();
    assert_eq!(machine.current_event().unwrap().id(), bookmark);
    assert_eq!(machine.ticks().unwrap(), 100);
    assert_eq!(machine.history().unwrap(), tree);
}

#[test]
fn test_seek_to_event_ignores_turbo_changes() {
    let fs = MemoryFileSystem::new();
    let machine = create_machine(&fs);
    machine.enable_turbo(true).unwrap();
    run_for(&machine, 1000);
    let key = machine.key(10, true).unwrap().unwrap();
    let recorded = machine.engine_state().unwrap();
    run_for(&machine, 50_000);

    machine.enable_turbo(false).unwrap();
    machine.seek_to_event(key).unwrap();

    assert_eq!(machine.ticks().unwrap(), 1000);
    assert_eq!(machine.engine_state().unwrap(), recorded);
}

#[test]
fn test_failed_seek_changes_nothing() {
    let fs = MemoryFileSystem::new();
    let mut machine = create_machine(&fs);
    run_for(&machine, 1000);
    machine.add_bookmark(false).unwrap();
    run_for(&machine, 1000);
    machine.key(5, true).unwrap();
    machine.close().unwrap();

    // Checkpoint 1 now holds "junk", which the engine refuses to restore.
    let lines: Vec<String> = fs
        .lines(PATH)
        .into_iter()
        .map(|line| {
            if line.starts_with("checkpoint:1:") {
                "checkpoint:1:1000:1:0:00040000006a756e6b".to_string()
            } else {
                line
            }
        })
        .collect();
    fs.insert(PATH, lines.clone());

    let machine = open_machine(&fs, false).unwrap();
    let current = machine.current_event().unwrap().id();
    run_for(&machine, 500);

    assert!(machine.seek_to_event(EventId(2)).is_err());
    assert_eq!(machine.current_event().unwrap().id(), current);
    assert_eq!(machine.ticks().unwrap(), 2500);
    assert_eq!(fs.lines(PATH), lines);
}

//! Shared helpers for machine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use emutimeline::{Machine, MemoryFileSystem, StopReason};

pub const PATH: &str = "test.cpvc";

/// A new machine on an in-memory file system, with all-zero ROMs.
pub fn create_machine(fs: &MemoryFileSystem) -> Machine {
    let machine = Machine::new("test", PATH, Arc::new(fs.clone())).unwrap();
    let zero_rom = vec![0u8; 0x4000];
    machine.set_lower_rom(&zero_rom).unwrap();
    machine.set_upper_rom(0, &zero_rom).unwrap();
    machine.set_upper_rom(7, &zero_rom).unwrap();
    machine
}

pub fn open_machine(fs: &MemoryFileSystem, lazy: bool) -> emutimeline::Result<Machine> {
    Machine::open("test", PATH, Arc::new(fs.clone()), lazy)
}

/// Advance the engine deterministically by `ticks`.
pub fn run_for(machine: &Machine, ticks: u64) {
    let target = machine.ticks().unwrap() + ticks;
    machine.run_until(target, StopReason::NONE).unwrap();
}

/// Written lines, with the tag of each.
pub fn tags(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(|l| l.split(':').next().unwrap_or_default())
        .collect()
}

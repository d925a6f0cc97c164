//! Fuzz target for machine file replay.
//!
//! Arbitrary text must either replay into a consistent tree or fail with an
//! error. A successful replay must survive compaction unchanged.

#![no_main]

use emutimeline::codec::{compact_lines, replay};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    // Limit input size to prevent OOM
    if text.len() > 1 << 20 {
        return;
    }

    let Ok(replayed) = replay(text.lines()) else {
        return;
    };

    let lines = compact_lines("fuzz", &replayed.tree);
    let reopened = replay(&lines).expect("compacted file must replay");
    assert_eq!(reopened.tree, replayed.tree);
});

//! Fuzz target for the bookmark payload RLE codec.

#![no_main]

use emutimeline::codec::rle;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic.
    let _ = rle::decode(data);

    // Encoding arbitrary bytes must round-trip.
    let encoded = rle::encode(data);
    assert_eq!(rle::decode(&encoded).expect("encoded data must decode"), data);
});

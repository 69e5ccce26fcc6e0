//! Fuzz target: `FrameDecoder::feed` + `commands::parse`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! parses every frame it yields.  Neither may panic, and every frame must
//! fit the decoder's buffer and contain no braces.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use otv_daq::app::commands;
use otv_daq::config::SystemConfig;
use otv_daq::rpc::codec::{FrameDecoder, MAX_FRAME_SIZE};

fuzz_target!(|data: &[u8]| {
    let config = SystemConfig::default();
    let mut decoder = FrameDecoder::new();

    decoder.feed(data, |body| {
        assert!(body.len() <= MAX_FRAME_SIZE, "frame exceeds MAX_FRAME_SIZE");
        assert!(!body.contains(['{', '}']), "frame carries a brace");
        let _ = commands::parse(body, &config);
    });

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    decoder.feed(data, |_| {});
});

//! Brace-delimited frame codec.
//!
//! Wire format (ASCII, one command per frame):
//! ```text
//!   ... noise ... { C F I 1 5 0 0 0 , 4 8 0 } ... noise ...
//!                 └──────── body ────────┘
//! ```
//!
//! Bytes outside braces are ignored.  An opening brace inside a frame
//! restarts the frame, so a truncated frame never swallows the next one.
//! Bodies longer than [`MAX_FRAME_SIZE`] are dropped whole.
//!
//! A single serial read may carry part of a frame, or several frames
//! back to back; the decoder keeps state across [`FrameDecoder::feed`]
//! calls.

use log::warn;

/// Longest accepted frame body (protects the fixed buffer).
pub const MAX_FRAME_SIZE: usize = 128;

const OPEN: u8 = b'{';
const CLOSE: u8 = b'}';

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for `{`.
    Idle,
    /// Collecting the body.
    InFrame,
    /// Body overflowed; skipping to the closing brace.
    Discarding,
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    body: heapless::Vec<u8, MAX_FRAME_SIZE>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            body: heapless::Vec::new(),
        }
    }

    /// Push one byte.  Returns the body when this byte closes a frame.
    ///
    /// The returned slice is valid until the next call.
    pub fn push(&mut self, byte: u8) -> Option<&str> {
        match (self.state, byte) {
            (_, OPEN) => {
                if self.state == DecoderState::InFrame {
                    warn!("Codec: unterminated frame dropped");
                }
                self.body.clear();
                self.state = DecoderState::InFrame;
                None
            }
            (DecoderState::InFrame, CLOSE) => {
                self.state = DecoderState::Idle;
                match core::str::from_utf8(&self.body) {
                    Ok(body) => Some(body),
                    Err(_) => {
                        warn!("Codec: non-UTF-8 frame dropped");
                        None
                    }
                }
            }
            (DecoderState::InFrame, _) => {
                if self.body.push(byte).is_err() {
                    warn!("Codec: frame exceeds {} bytes, dropped", MAX_FRAME_SIZE);
                    self.state = DecoderState::Discarding;
                }
                None
            }
            (DecoderState::Discarding, CLOSE) => {
                self.state = DecoderState::Idle;
                None
            }
            (DecoderState::Idle | DecoderState::Discarding, _) => None,
        }
    }

    /// Feed a chunk, calling `on_frame` for every frame it completes.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(&str)) {
        for &byte in data {
            if let Some(body) = self.push(byte) {
                on_frame(body);
            }
        }
    }

    /// Forget any partial frame.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.body.clear();
    }
}

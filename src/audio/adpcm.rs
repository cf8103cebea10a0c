//! IMA ADPCM encoder.
//!
//! Frame layout: `[predictor BE i16, step index, packed nibbles]`, high
//! nibble first.  The header holds the codec state *before* the block, so
//! a receiver can decode any frame on its own.  256 samples encode to
//! 3 + 128 = 131 bytes.

use crate::app::ports::Encoder;
use crate::audio::frame::Frame;
use crate::config::FRAME_CAPACITY;
use crate::error::EncodeError;

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

const INDEX_TABLE: [i32; 8] = [-1, -1, -1, -1, 2, 4, 6, 8];

/// Bytes an `n`-sample block encodes to.
pub const fn encoded_len(samples: usize) -> usize {
    3 + samples / 2
}

/// Running IMA ADPCM codec state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdpcmState {
    pub predictor: i16,
    pub index: u8,
}

impl AdpcmState {
    fn encode_sample(&mut self, sample: i16) -> u8 {
        let step = STEP_TABLE[self.index as usize];
        let mut diff = i32::from(sample) - i32::from(self.predictor);
        let mut nibble = 0u8;
        if diff < 0 {
            nibble = 8;
            diff = -diff;
        }

        let mut delta = step >> 3;
        let mut s = step;
        for bit in [4u8, 2, 1] {
            if diff >= s {
                nibble |= bit;
                diff -= s;
                delta += s;
            }
            s >>= 1;
        }

        let predicted = if nibble & 8 != 0 {
            i32::from(self.predictor) - delta
        } else {
            i32::from(self.predictor) + delta
        };
        self.predictor = predicted.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        self.index = (i32::from(self.index) + INDEX_TABLE[(nibble & 7) as usize]).clamp(0, 88) as u8;
        nibble
    }

    /// Inverse of one encode step; used by tests and host tooling.
    pub fn decode_sample(&mut self, nibble: u8) -> i16 {
        let step = STEP_TABLE[self.index as usize];
        let mut delta = step >> 3;
        if nibble & 4 != 0 {
            delta += step;
        }
        if nibble & 2 != 0 {
            delta += step >> 1;
        }
        if nibble & 1 != 0 {
            delta += step >> 2;
        }
        let predicted = if nibble & 8 != 0 {
            i32::from(self.predictor) - delta
        } else {
            i32::from(self.predictor) + delta
        };
        self.predictor = predicted.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        self.index = (i32::from(self.index) + INDEX_TABLE[(nibble & 7) as usize]).clamp(0, 88) as u8;
        self.predictor
    }
}

/// IMA ADPCM [`Encoder`] carrying state across frames.
#[derive(Debug, Default)]
pub struct AdpcmEncoder {
    state: AdpcmState,
}

impl AdpcmEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AdpcmState {
        self.state
    }
}

impl Encoder for AdpcmEncoder {
    fn encode(&mut self, samples: &[i16], frame: &mut Frame) -> Result<(), EncodeError> {
        if samples.is_empty() || samples.len() % 2 != 0 {
            return Err(EncodeError::InputLength);
        }
        let len = encoded_len(samples.len());
        if len > FRAME_CAPACITY {
            return Err(EncodeError::OutputTooSmall);
        }

        let out = frame.buffer_mut();
        out[..2].copy_from_slice(&self.state.predictor.to_be_bytes());
        out[2] = self.state.index;
        for (i, pair) in samples.chunks_exact(2).enumerate() {
            let hi = self.state.encode_sample(pair[0]);
            let lo = self.state.encode_sample(pair[1]);
            out[3 + i] = (hi << 4) | lo;
        }
        frame.set_len(len)
    }

    fn reset(&mut self) {
        self.state = AdpcmState::default();
    }
}

use std::sync::{Mutex, PoisonError};

use crate::temporal::wall_clock_ms;

/// Sortable 64-symbol alphabet: ASCII order equals digit order.
pub const KEY_ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Number of characters in every generated key.
pub const KEY_LEN: usize = 11;

const BITS_PER_CHAR: u32 = 6;
const COUNTER_BITS: u32 = 22;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;
const MS_MASK: u64 = (1 << (64 - COUNTER_BITS)) - 1;

/// Internal mutable state of the generator.
struct KeyState {
    /// Last millisecond component handed out; never decreases.
    physical_ms: u64,
    /// Incremented on every call, never reset.
    counter: u64,
}

/// Generator of unique, roughly time-ordered keys.
///
/// Each key packs a millisecond timestamp (high 42 bits) and an intra-process
/// counter (low 22 bits) into one integer, then encodes it as [`KEY_LEN`]
/// characters of [`KEY_ALPHABET`], most significant group first. Keys are
/// therefore strictly increasing for one generator, and a key produced a
/// millisecond later always sorts after every earlier key.
///
/// The generator is an explicit service: construct one per process (or per
/// test) and share it as `Arc<KeyGenerator>`.
pub struct KeyGenerator {
    clock: fn() -> u64,
    state: Mutex<KeyState>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::with_clock(wall_clock_ms)
    }

    /// A generator reading milliseconds from `clock` instead of the wall clock.
    pub fn with_clock(clock: fn() -> u64) -> Self {
        Self {
            clock,
            state: Mutex::new(KeyState {
                physical_ms: 0,
                counter: 0,
            }),
        }
    }

    /// Produce the next key.
    pub fn generate_key(&self) -> String {
        encode_key(self.next_value())
    }

    fn next_value(&self) -> u64 {
        let wall = (self.clock)();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut physical = wall.max(state.physical_ms);
        let value = ((physical & MS_MASK) << COUNTER_BITS) | (state.counter & COUNTER_MASK);

        state.counter = state.counter.wrapping_add(1);
        if state.counter & COUNTER_MASK == 0 {
            // Counter wrapped; carry into the millisecond component so the
            // next key still sorts after this one.
            physical += 1;
        }
        state.physical_ms = physical;

        value
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_key(value: u64) -> String {
    (0..KEY_LEN)
        .map(|i| {
            let shift = BITS_PER_CHAR * (KEY_LEN - 1 - i) as u32;
            KEY_ALPHABET[((value >> shift) & 63) as usize] as char
        })
        .collect()
}

/// Decode a generated key back into its packed integer.
pub fn decode_key(key: &str) -> Option<u64> {
    if key.len() != KEY_LEN {
        return None;
    }
    let mut value: u64 = 0;
    for (i, byte) in key.bytes().enumerate() {
        let digit = KEY_ALPHABET.iter().position(|c| *c == byte)? as u64;
        // Only the low 4 bits of the leading group fit in 64 bits.
        if i == 0 && digit >= 16 {
            return None;
        }
        value = (value << BITS_PER_CHAR) | digit;
    }
    Some(value)
}

/// The millisecond component of a generated key.
pub fn key_timestamp_ms(key: &str) -> Option<u64> {
    decode_key(key).map(|value| value >> COUNTER_BITS)
}

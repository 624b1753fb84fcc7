//! Snowflake style room id generator
//!
//! Layout, most significant bit first: 41 bits of milliseconds since
//! [`EPOCH_MS`], 10 bits of generator id, 12 bits of per-millisecond sequence.

use parking_lot::Mutex;
use shared::utils::get_timestamp;
use shared::RoomId;

/// 2010-11-04T01:42:54.657Z, the customary snowflake epoch
pub const EPOCH_MS: u64 = 1_288_834_974_657;

const GENERATOR_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_GENERATOR: u16 = (1 << GENERATOR_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

struct GeneratorState {
    last_ms: u64,
    sequence: u64,
}

pub struct RoomIdGenerator {
    generator_id: u64,
    state: Mutex<GeneratorState>,
}

impl RoomIdGenerator {
    /// Generator ids above 1023 are masked down to 10 bits
    pub fn new(generator_id: u16) -> Self {
        Self {
            generator_id: u64::from(generator_id & MAX_GENERATOR),
            state: Mutex::new(GeneratorState {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    /// Returns a new id, strictly greater than every id this generator returned before
    ///
    /// If the clock goes backwards, or 4096 ids are drawn within one millisecond,
    /// the generator borrows from the next millisecond instead of waiting.
    pub fn next_id(&self) -> RoomId {
        let now = get_timestamp().saturating_sub(EPOCH_MS);
        let mut state = self.state.lock();

        if now > state.last_ms {
            state.last_ms = now;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                state.last_ms += 1;
            }
        }

        (state.last_ms << (GENERATOR_BITS + SEQUENCE_BITS))
            | (self.generator_id << SEQUENCE_BITS)
            | state.sequence
    }
}

impl Default for RoomIdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

//! Store file names: `<modality>_<8 hex digits>.dcm`
//!
//! The hex part comes from a 64-bit linear congruential generator seeded from
//! the clock and the process id, so two processes naming files in the same
//! second still diverge. Collisions are resolved by the caller.

use chrono::Utc;
use dimse::sop_class::{modality_prefix, UNKNOWN_MODALITY_PREFIX};

const MULTIPLIER: u64 = 6364136223846793005;
const INCREMENT: u64 = 1442695040888963407;

#[derive(Debug, Clone)]
pub struct FileNameGenerator {
    state: u64,
}

impl FileNameGenerator {
    /// A generator producing a fixed sequence
    pub fn seeded(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn from_clock() -> Self {
        let now = Utc::now();
        let micros = now.timestamp_micros() as u64;
        Self::seeded(micros ^ (u64::from(std::process::id()) << 32))
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        (self.state >> 32) as u32
    }

    /// Next candidate name for an object of the given SOP class
    pub fn next_name(&mut self, sop_class_uid: &str) -> String {
        let prefix = modality_prefix(sop_class_uid).unwrap_or(UNKNOWN_MODALITY_PREFIX);
        format!("{}_{:08X}.dcm", prefix, self.next_u32())
    }
}

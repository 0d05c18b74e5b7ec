//! Sequence Allocator
//!
//! Hands out the 15-bit transaction identifiers that correlate requests
//! with responses.
//!
//! The counter starts from a random point seeded from wall-clock time and
//! process id, and is reseeded whenever it runs past 32767. With only 15
//! bits, two requests outstanding for a very long time can collide; that is
//! a limitation of the wire format.

use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Largest sequence number representable on the wire
pub const MAX_SEQ: u16 = 0x7fff;

/// Source of seed entropy for the allocator
pub type SeedSource = Box<dyn FnMut() -> u64 + Send>;

/// 15-bit wrapping counter
pub struct SequenceAllocator {
    /// Last value handed out; `None` until first use
    last: Option<u16>,
    seed: SeedSource,
}

impl SequenceAllocator {
    /// Allocator seeded from wall-clock time and process id
    pub fn new() -> Self {
        Self::with_seed_source(Box::new(clock_and_pid))
    }

    /// Allocator with an injected seed source
    pub fn with_seed_source(seed: SeedSource) -> Self {
        Self { last: None, seed }
    }

    /// Next sequence number, always in `0..=MAX_SEQ`
    pub fn next_seq(&mut self) -> u16 {
        let next = match self.last {
            Some(last) if last < MAX_SEQ => last + 1,
            Some(last) => {
                let reseeded = self.reseed().wrapping_add(1) & MAX_SEQ;
                if reseeded == last {
                    (reseeded + 1) & MAX_SEQ
                } else {
                    reseeded
                }
            }
            None => self.reseed().wrapping_add(1) & MAX_SEQ,
        };
        self.last = Some(next);
        next
    }

    fn reseed(&mut self) -> u16 {
        let mut rng = StdRng::seed_from_u64((self.seed)());
        let start = rng.gen_range(0..=MAX_SEQ);
        tracing::trace!("Sequence counter reseeded at {}", start);
        start
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn clock_and_pid() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    now ^ u64::from(std::process::id())
}

// =============================================================================
// Shared Handle
// =============================================================================

/// Cloneable handle to an allocator
///
/// The client and the proxy each hold one. [`Sequencer::process`] returns
/// the handle shared by the whole process; tests build private ones.
#[derive(Clone)]
pub struct Sequencer {
    inner: Arc<Mutex<SequenceAllocator>>,
}

impl Sequencer {
    pub fn new(allocator: SequenceAllocator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(allocator)),
        }
    }

    /// Process-wide sequencer
    pub fn process() -> Self {
        static PROCESS: OnceLock<Sequencer> = OnceLock::new();
        PROCESS
            .get_or_init(|| Sequencer::new(SequenceAllocator::new()))
            .clone()
    }

    /// Sequencer with a fixed seed, so runs are reproducible
    pub fn seeded(seed: u64) -> Self {
        Self::new(SequenceAllocator::with_seed_source(Box::new(move || seed)))
    }

    pub fn next_seq(&self) -> u16 {
        self.inner.lock().next_seq()
    }
}

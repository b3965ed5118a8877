//! Random-port and random-ID strategy.
//!
//! The stack never binds a real kernel port; the "source pseudo-port" is
//! just an identifier the peer echoes back that we match on. The RNG is
//! seeded from the current wall-clock second the first time a link is
//! opened, which is the only place nondeterminism enters the stack outside
//! packet payloads.

use std::sync::Once;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;

static SEED_ONCE: Once = Once::new();
static RNG: Mutex<Option<StdRng>> = Mutex::new(None);

fn seed_now() {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    *RNG.lock().unwrap() = Some(StdRng::seed_from_u64(secs));
}

pub fn seed_from_wallclock() {
    SEED_ONCE.call_once(seed_now);
}

fn with_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    // `call_once` must run to completion (and release the `RNG` lock it
    // takes) before we take our own lock below, or a caller that reaches
    // here with no link open yet would deadlock on a re-entrant acquire.
    SEED_ONCE.call_once(seed_now);
    let mut guard = RNG.lock().unwrap();
    f(guard.as_mut().unwrap())
}

/// A random 16-bit value, used for pseudo-ports, DNS transaction IDs, and
/// IPv4 identification fields.
pub fn random_u16() -> u16 { with_rng(|r| r.gen()) }

/// A random 32-bit value, used for TCP initial sequence numbers.
pub fn random_u32() -> u32 { with_rng(|r| r.gen()) }

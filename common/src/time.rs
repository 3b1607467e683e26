use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// The last timestamp handed out by [`now`], in micros since the epoch.
///
/// `Vulnerability`/`Project` require `updated_at >= discovered_at` and
/// strictly increasing `updated_at` across mutations (`spec.md` §8,
/// invariant 3). Two mutations issued within the same clock tick would
/// otherwise tie; this forces monotonicity the way a sequence column
/// would in a database-backed version of this system.
static LAST_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// A wall-clock timestamp guaranteed to be strictly greater than every
/// previous call to `now()` from this process.
pub fn now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_micros();
    let mut current = LAST_MICROS.load(Ordering::SeqCst);
    let micros = loop {
        let next = wall.max(current + 1);
        match LAST_MICROS.compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => break next,
            Err(observed) => current = observed,
        }
    };
    DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
}

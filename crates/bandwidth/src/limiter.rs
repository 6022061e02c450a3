use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Refill interval of the bucket.
const TICK: Duration = Duration::from_millis(250);
/// Ticks per second, so `limit / TICKS_PER_SECOND` is one tick's budget.
const TICKS_PER_SECOND: u64 = 4;

/// Transfer direction a token is accounted against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Bytes received from the server.
    Inbound = 0,
    /// Bytes sent to the server.
    Outbound = 1,
}

struct Participant {
    id: u64,
    available: [u64; 2],
}

struct State {
    /// Bytes per second per direction; zero disables the limit.
    limits: [u64; 2],
    /// How many ticks worth of budget a participant may accumulate.
    bucket_ticks: u64,
    participants: Vec<Participant>,
    next_id: u64,
    last_refill: Instant,
}

struct Inner {
    state: Mutex<State>,
    wakeup: Condvar,
}

/// Process-wide token bucket. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

/// Registration handle of one transport. Dropping it releases the
/// participant's share back to the pool.
pub struct TransportToken {
    id: u64,
    inner: Arc<Inner>,
}

impl RateLimiter {
    /// A limiter with no limits configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    limits: [0, 0],
                    bucket_ticks: 1,
                    participants: Vec::new(),
                    next_id: 0,
                    last_refill: Instant::now(),
                }),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Applies limits in bytes per second (zero disables) and the burst
    /// tolerance setting (0, 1 or 2, mapping to buckets of 1, 2 or 5
    /// ticks).
    pub fn configure(&self, inbound: u64, outbound: u64, burst_tolerance: u8) {
        let mut state = self.lock();
        state.limits = [inbound, outbound];
        state.bucket_ticks = match burst_tolerance {
            0 => 1,
            1 => 2,
            _ => 5,
        };
        // A changed limit may unblock or re-block waiters either way.
        self.inner.wakeup.notify_all();
    }

    /// Registers a transport as a bucket participant.
    #[must_use]
    pub fn register(&self) -> TransportToken {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.participants.push(Participant {
            id,
            available: [0, 0],
        });
        TransportToken {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Bytes the participant may move right now; `-1` means unlimited.
    #[must_use]
    pub fn available(&self, token: &TransportToken, direction: Direction) -> i64 {
        let mut state = self.lock();
        state.refill(Instant::now());
        if state.limits[direction as usize] == 0 {
            return -1;
        }
        state
            .participant(token.id)
            .map_or(0, |p| i64::try_from(p.available[direction as usize]).unwrap_or(i64::MAX))
    }

    /// Blocks until the participant has budget in `direction`. Returns
    /// immediately when unlimited.
    pub fn wait(&self, token: &TransportToken, direction: Direction) {
        let mut state = self.lock();
        loop {
            let now = Instant::now();
            state.refill(now);
            if state.limits[direction as usize] == 0 {
                return;
            }
            if state
                .participant(token.id)
                .is_some_and(|p| p.available[direction as usize] > 0)
            {
                return;
            }
            // Sleep to the next tick boundary; a config change or a
            // deregistration may wake us earlier.
            let elapsed = now.duration_since(state.last_refill);
            let until_tick = TICK.saturating_sub(elapsed).max(Duration::from_millis(1));
            let (guard, _) = self
                .inner
                .wakeup
                .wait_timeout(state, until_tick)
                .unwrap_or_else(|poisoned| {
                    let inner = poisoned.into_inner();
                    (inner.0, inner.1)
                });
            state = guard;
        }
    }

    /// Records `amount` bytes actually moved by the participant.
    pub fn used(&self, token: &TransportToken, direction: Direction, amount: u64) {
        let mut state = self.lock();
        state.refill(Instant::now());
        if let Some(p) = state.participant(token.id) {
            let slot = &mut p.available[direction as usize];
            *slot = slot.saturating_sub(amount);
        }
    }

    /// Advances the bucket clock; only refills whole elapsed ticks.
    /// Exposed so tests can drive time explicitly.
    pub fn advance_to(&self, now: Instant) {
        let mut state = self.lock();
        state.refill(now);
        self.inner.wakeup.notify_all();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn participant(&mut self, id: u64) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let ticks = (elapsed.as_millis() / TICK.as_millis()) as u64;
        if ticks == 0 || self.participants.is_empty() {
            return;
        }
        self.last_refill += TICK * u32::try_from(ticks.min(u64::from(u32::MAX))).unwrap_or(u32::MAX);

        for direction in 0..2 {
            let limit = self.limits[direction];
            if limit == 0 {
                continue;
            }
            let per_tick = (limit / TICKS_PER_SECOND).max(1);
            let count = self.participants.len() as u64;
            let fair_share = (per_tick / count).max(1);
            let cap = self.bucket_ticks * fair_share;
            let mut budget = per_tick.saturating_mul(ticks);

            // First pass: everyone gets an equal cut. Later passes hand
            // what the capped participants could not absorb to the rest.
            loop {
                let hungry: Vec<usize> = self
                    .participants
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.available[direction] < cap)
                    .map(|(i, _)| i)
                    .collect();
                if hungry.is_empty() || budget == 0 {
                    break;
                }
                let share = (budget / hungry.len() as u64).max(1);
                for index in hungry {
                    let slot = &mut self.participants[index].available[direction];
                    let grant = share.min(cap - *slot).min(budget);
                    *slot += grant;
                    budget -= grant;
                    if budget == 0 {
                        break;
                    }
                }
            }
        }
    }
}

impl Drop for TransportToken {
    fn drop(&mut self) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.participants.retain(|p| p.id != self.id);
        // The departing participant's future share goes to the others.
        self.inner.wakeup.notify_all();
    }
}

#[cfg(test)]
mod tests;

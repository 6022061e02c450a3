#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `bandwidth` implements the process-wide token bucket that throttles
//! every transfer in the engine. One [`RateLimiter`] exists per process;
//! each live transport registers itself and receives a fair share of the
//! configured byte budget, per direction, replenished in 250 ms ticks.
//!
//! # Design
//!
//! - Tokens are granted per registered participant. Each tick hands every
//!   participant `limit / 4 / N` bytes, capped at `bucket_size` ticks
//!   worth of budget, with `bucket_size` drawn from the configured burst
//!   tolerance (1, 2 or 5).
//! - Budget a capped participant cannot absorb is redistributed to the
//!   ones still below their cap, so a mostly-idle connection does not
//!   strand bandwidth the busy ones could use.
//! - Refill is computed lazily from the elapsed time on every call, so
//!   there is no timer thread; blocked readers are woken through a
//!   condition variable.
//!
//! # Invariants
//!
//! - With no limit configured, [`RateLimiter::available`] returns `-1`
//!   and [`RateLimiter::wait`] never blocks.
//! - A participant's balance never exceeds `bucket_size * limit / 4 / N`
//!   immediately after a refill.
//! - [`RateLimiter::used`] saturates at zero; consuming more than granted
//!   is a caller bug but must not wrap.

mod limiter;

pub use limiter::{Direction, RateLimiter, TransportToken};

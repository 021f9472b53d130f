//! Reference-counted shared ownership with a per-object reader/writer lock.
//!
//! `rwarc` provides [`Strong`], an atomically counted owning handle to a heap
//! value, and [`Weak`], a non-owning observer that can attempt to promote
//! itself back to an owner while the value still exists. The value is
//! destroyed exactly once, by whichever handle returns the last unit of the
//! strong count.
//!
//! Unlike the standard `Arc`, every control block carries a reader/writer
//! lock: mutation of the shared value goes through [`with_mut`] (or
//! [`Strong::write`]) under the exclusive side, consistent reads take the
//! shared side via [`Strong::read`], and cloning briefly holds the shared
//! side so a new owner can never materialize in the middle of an exclusive
//! mutation or the destruction sequence. Raw access through [`Strong::get`]
//! stays unsynchronized by choice; a reader opts into the lock to be
//! race-free.
//!
//! The lock is a blocking `parking_lot` reader/writer lock, accepted as a
//! design trade-off over a lock-free scheme. There are no timeouts and no
//! recoverable errors anywhere in the API: the one "failure" a caller ever
//! sees is [`Weak::upgrade`] handing back the empty [`Strong`] after the
//! payload is gone.

pub(crate) mod block;
pub mod strong;
pub mod weak;

pub use strong::{with_mut, ReadGuard, Strong, WriteGuard};
pub use weak::Weak;

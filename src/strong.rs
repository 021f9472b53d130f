use std::{fmt, marker::PhantomData, ops::{Deref, DerefMut}, ptr};

use crate::{block::BlockPtr, weak::Weak};

/// Shared-ownership handle to a heap value.
///
/// Every live `Strong` holds exactly one unit of its block's strong count;
/// the payload is destroyed exactly once, when the last unit is returned.
/// A `Strong` may also be *empty* ("no object"), which is what a failed
/// upgrade produces: every operation on an empty handle is a clean no-op or
/// yields `None`/null, never a panic.
///
/// The payload is guarded by a reader/writer lock owned by the block. Reads
/// through [`Strong::get`] are unsynchronized; callers wanting consistency
/// against concurrent writers take a [`ReadGuard`] via [`Strong::read`], and
/// all mutation goes through [`Strong::write`] or [`with_mut`].
pub struct Strong<T>
{
    ptr: Option<BlockPtr<T>>,
}

unsafe impl<T: Send + Sync> Send for Strong<T> {}
unsafe impl<T: Send + Sync> Sync for Strong<T> {}

impl<T> Strong<T>
{
    /// Move `value` onto the heap under a fresh control block.
    pub fn new(value: T) -> Self { Self { ptr: Some(BlockPtr::allocate(value)) } }

    /// The "no object" handle.
    pub fn empty() -> Self { Self { ptr: None } }

    pub fn is_empty(&self) -> bool { self.ptr.is_none() }

    pub(crate) fn from_block(ptr: Option<BlockPtr<T>>) -> Self { Self { ptr } }

    pub(crate) fn block(&self) -> Option<BlockPtr<T>> { self.ptr }

    /// Raw view of the payload; null for the empty handle.
    ///
    /// This does not synchronize. A read through the returned pointer races
    /// with any concurrent writer; callers that need a consistent view must
    /// hold a [`ReadGuard`] across the read instead.
    pub fn get(&self) -> *const T
    {
        match self.ptr {
            Some(p) => p.payload_ptr(),
            None => ptr::null(),
        }
    }

    /// Take the shared side of the block's lock for the guard's lifetime.
    ///
    /// Any number of readers may be inside at once; none can overlap a
    /// writer or the destruction sequence. Returns `None` on the empty
    /// handle. Blocks while a writer is inside.
    pub fn read(&self) -> Option<ReadGuard<'_, T>>
    {
        let block = self.ptr?;
        block.lock_shared();
        Some(ReadGuard {
            block,
            _marker: PhantomData,
        })
    }

    /// Take the exclusive side of the block's lock for the guard's lifetime.
    ///
    /// At most one writer is inside at a time, and no readers or locked
    /// clones overlap it. Returns `None` on the empty handle. The lock is
    /// returned on every exit path, including unwinding.
    pub fn write(&self) -> Option<WriteGuard<'_, T>>
    {
        let block = self.ptr?;
        block.lock_exclusive();
        Some(WriteGuard {
            block,
            _marker: PhantomData,
        })
    }

    /// Replace this handle's block with `other`'s.
    ///
    /// Self-assignment, and assignment between two handles of the same
    /// block, are no-ops: the net count change is zero, and taking the same
    /// exclusive lock twice would deadlock. Otherwise both blocks are locked
    /// exclusively in address order, the old unit is released under its held
    /// lock, and the new block is adopted. Address ordering keeps two
    /// threads cross-assigning the same pair of blocks from deadlocking.
    pub fn assign(&mut self, other: &Strong<T>)
    {
        if ptr::eq(self, other) {
            return;
        }
        match (self.ptr, other.ptr) {
            (Some(old), Some(new)) if old.addr() == new.addr() => {}
            (Some(old), Some(new)) => {
                let (first, second) = if old.addr() < new.addr() {
                    (old, new)
                } else {
                    (new, old)
                };
                first.lock_exclusive();
                second.lock_exclusive();
                // Safety: we own the unit `self` held, and we hold the
                // exclusive lock on `old`.
                let destroyed = unsafe { old.release_under_lock() };
                new.acquire();
                self.ptr = Some(new);
                unsafe {
                    second.unlock_exclusive();
                    first.unlock_exclusive();
                }
                if destroyed {
                    // The strong family's retention unit; returned only once
                    // the lock is no longer held, since freeing the block
                    // frees the lock with it.
                    unsafe { old.release_block() };
                }
            }
            (Some(old), None) => {
                self.ptr = None;
                unsafe { old.release() };
            }
            (None, Some(new)) => {
                new.lock_shared();
                new.acquire();
                unsafe { new.unlock_shared() };
                self.ptr = Some(new);
            }
            (None, None) => {}
        }
    }

    /// Produce a non-owning observer of this handle's payload.
    ///
    /// Does not touch the strong count; the empty handle downgrades to the
    /// empty `Weak`.
    pub fn downgrade(&self) -> Weak<T> { Weak::derive(self) }

    /// Current strong count; 0 for the empty handle. Snapshot only, already
    /// stale by the time the caller looks at it.
    pub fn strong_count(&self) -> usize { self.ptr.map_or(0, |p| p.strong_count()) }

    /// Whether two handles share one control block. Two empty handles
    /// compare equal.
    pub fn ptr_eq(&self, other: &Strong<T>) -> bool
    {
        match (self.ptr, other.ptr) {
            (Some(a), Some(b)) => a.addr() == b.addr(),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for Strong<T>
{
    /// Share the block under its shared lock.
    ///
    /// The lock guarantees the new handle cannot come into being in the
    /// middle of an exclusive mutation or the destruction sequence; the
    /// increment itself is relaxed because `self` pins the count above zero.
    fn clone(&self) -> Self
    {
        match self.ptr {
            Some(p) => {
                p.lock_shared();
                p.acquire();
                unsafe { p.unlock_shared() };
                Self { ptr: Some(p) }
            }
            None => Self::empty(),
        }
    }
}

impl<T> Default for Strong<T>
{
    fn default() -> Self { Self::empty() }
}

impl<T> Drop for Strong<T>
{
    fn drop(&mut self)
    {
        if let Some(p) = self.ptr.take() {
            // Safety: returns the unit this handle held.
            unsafe { p.release() };
        }
    }
}

impl<T> fmt::Debug for Strong<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Strong").field("ptr", &self.ptr).finish()
    }
}

/// Shared-lock view of the payload. Readers holding one never overlap a
/// writer.
pub struct ReadGuard<'a, T>
{
    block: BlockPtr<T>,
    _marker: PhantomData<&'a Strong<T>>,
}

impl<'a, T> Deref for ReadGuard<'a, T>
{
    type Target = T;

    fn deref(&self) -> &T
    {
        // Safety: the borrowed handle pins the payload, the guard holds the
        // shared lock.
        unsafe { self.block.payload_ref() }
    }
}

impl<'a, T> Drop for ReadGuard<'a, T>
{
    fn drop(&mut self) { unsafe { self.block.unlock_shared() } }
}

impl<'a, T: fmt::Debug> fmt::Debug for ReadGuard<'a, T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { (**self).fmt(f) }
}

/// Exclusive-lock view of the payload. At most one exists per block at a
/// time.
pub struct WriteGuard<'a, T>
{
    block: BlockPtr<T>,
    _marker: PhantomData<&'a Strong<T>>,
}

impl<'a, T> Deref for WriteGuard<'a, T>
{
    type Target = T;

    fn deref(&self) -> &T { unsafe { self.block.payload_ref() } }
}

impl<'a, T> DerefMut for WriteGuard<'a, T>
{
    fn deref_mut(&mut self) -> &mut T
    {
        // Safety: the borrowed handle pins the payload, the guard holds the
        // exclusive lock.
        unsafe { self.block.payload_mut() }
    }
}

impl<'a, T> Drop for WriteGuard<'a, T>
{
    fn drop(&mut self) { unsafe { self.block.unlock_exclusive() } }
}

impl<'a, T: fmt::Debug> fmt::Debug for WriteGuard<'a, T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { (**self).fmt(f) }
}

/// Run `f` with exclusive access to `strong`'s payload.
///
/// Serializes against every other writer, reader, and locked clone on the
/// same block; the lock is released on every exit path, including a panic in
/// `f`. Returns `None` on the empty handle.
pub fn with_mut<T, R>(strong: &Strong<T>, f: impl FnOnce(&mut T) -> R) -> Option<R>
{
    let mut guard = strong.write()?;
    Some(f(&mut *guard))
}

use std::{
    cell::UnsafeCell,
    fmt,
    mem::ManuallyDrop,
    ptr::NonNull,
    sync::atomic::{fence, AtomicUsize, Ordering::*},
};

use lock_api::RawRwLock;

/// Past this point the process aborts rather than risk a wrapped count.
const MAX_REFCOUNT: usize = usize::MAX / 2;

/// The shared record behind every family of `Strong` handles.
///
/// `strong` counts live `Strong` handles; the payload is destroyed, in place,
/// by whichever decrement observes the 1→0 transition. `keep` counts reasons
/// the allocation itself must stay addressable: one unit held collectively by
/// the strong family, plus one per live `WeakBlock` observing this block. The
/// allocation is freed when `keep` reaches 0, which lets a weak observer probe
/// the strong count long after the payload is gone.
pub(crate) struct ControlBlock<T>
{
    strong: AtomicUsize,
    keep: AtomicUsize,
    access: parking_lot::RawRwLock,
    payload: UnsafeCell<ManuallyDrop<T>>,
}

/// Shared pointer to a `ControlBlock`. Plain copyable address; all counting
/// discipline lives in the handle types that wrap it.
#[repr(transparent)]
pub(crate) struct BlockPtr<T>(NonNull<ControlBlock<T>>);

impl<T> Clone for BlockPtr<T>
{
    fn clone(&self) -> Self { *self }
}
impl<T> Copy for BlockPtr<T> {}

impl<T> fmt::Debug for BlockPtr<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_tuple("BlockPtr").field(&self.0).finish()
    }
}

impl<T> BlockPtr<T>
{
    pub(crate) fn allocate(value: T) -> Self
    {
        Self(unsafe {
            NonNull::new_unchecked(Box::into_raw(Box::new(ControlBlock {
                strong: AtomicUsize::new(1),
                keep: AtomicUsize::new(1),
                access: parking_lot::RawRwLock::INIT,
                payload: UnsafeCell::new(ManuallyDrop::new(value)),
            })))
        })
    }

    fn header(&self) -> &ControlBlock<T> { unsafe { self.0.as_ref() } }

    /// Take one more unit of the strong count.
    ///
    /// Relaxed suffices: the caller already holds a live strong reference, so
    /// the count is at least 1 and cannot race to zero under us.
    pub(crate) fn acquire(&self)
    {
        if self.header().strong.fetch_add(1, Relaxed) > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Take a unit of the strong count only if the payload is still alive.
    ///
    /// This is the upgrade primitive: it never increments from zero, so it can
    /// never resurrect a payload a concurrent `release` has claimed.
    pub(crate) fn try_acquire(&self) -> bool
    {
        let mut n = self.header().strong.load(Relaxed);
        loop {
            if n == 0 {
                return false;
            }
            if n > MAX_REFCOUNT {
                std::process::abort();
            }
            match self
                .header()
                .strong
                .compare_exchange_weak(n, n + 1, Relaxed, Relaxed)
            {
                Ok(_) => return true,
                Err(seen) => n = seen,
            }
        }
    }

    /// Return one unit of the strong count, destroying the payload on the
    /// 1→0 transition.
    ///
    /// The destroying thread issues an acquire fence to see every prior
    /// release on this block, then takes the exclusive lock so destruction
    /// cannot overlap an in-flight reader, writer, or locked clone. The count
    /// is re-checked under the lock before the payload is dropped.
    ///
    /// Safety: consumes a strong-count unit the caller owns. The handle must
    /// not be used afterwards.
    pub(crate) unsafe fn release(self)
    {
        if self.header().strong.fetch_sub(1, Release) != 1 {
            return;
        }
        fence(Acquire);
        self.lock_exclusive();
        let destroyed = self.destroy_if_dead();
        self.unlock_exclusive();
        if destroyed {
            self.release_block();
        }
    }

    /// `release` for callers that already hold this block's exclusive lock
    /// (the dual-lock assignment path). Returns whether the payload was
    /// destroyed; if so the caller must call `release_block` once the lock is
    /// out of the way.
    ///
    /// Safety: as `release`, plus the exclusive lock must be held.
    pub(crate) unsafe fn release_under_lock(self) -> bool
    {
        if self.header().strong.fetch_sub(1, Release) != 1 {
            return false;
        }
        fence(Acquire);
        self.destroy_if_dead()
    }

    unsafe fn destroy_if_dead(&self) -> bool
    {
        if self.header().strong.load(Relaxed) == 0 {
            ManuallyDrop::drop(&mut *self.header().payload.get());
            true
        } else {
            false
        }
    }

    /// Take one more unit of the retention count.
    pub(crate) fn acquire_block(&self)
    {
        if self.header().keep.fetch_add(1, Relaxed) > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Return one unit of the retention count, freeing the allocation on the
    /// 1→0 transition.
    ///
    /// Safety: consumes a retention unit the caller owns; by the time the
    /// count can reach zero the payload has already been destroyed.
    pub(crate) unsafe fn release_block(self)
    {
        if self.header().keep.fetch_sub(1, Release) == 1 {
            fence(Acquire);
            drop(Box::from_raw(self.0.as_ptr()));
        }
    }

    pub(crate) fn lock_shared(&self) { self.header().access.lock_shared() }

    pub(crate) unsafe fn unlock_shared(&self) { self.header().access.unlock_shared() }

    pub(crate) fn lock_exclusive(&self) { self.header().access.lock_exclusive() }

    pub(crate) unsafe fn unlock_exclusive(&self) { self.header().access.unlock_exclusive() }

    /// Safety: the payload must be alive (a strong-count unit is held) and the
    /// caller is responsible for read synchronization.
    pub(crate) unsafe fn payload_ref(&self) -> &T { &*self.header().payload.get() }

    /// Safety: as `payload_ref`, and the exclusive lock must be held.
    pub(crate) unsafe fn payload_mut(&self) -> &mut T { &mut *self.header().payload.get() }

    /// Raw payload address without forming a reference.
    pub(crate) fn payload_ptr(&self) -> *const T { self.header().payload.get() as *const T }

    pub(crate) fn strong_count(&self) -> usize { self.header().strong.load(Relaxed) }

    pub(crate) fn addr(&self) -> usize { self.0.as_ptr() as usize }
}

/// The small record behind a family of `Weak` handles.
///
/// Holds its own count plus one retention unit on the observed block, so the
/// block's strong count stays readable for upgrades while any weak observer
/// is alive. Carries no lock of its own.
pub(crate) struct WeakBlock<T>
{
    weak: AtomicUsize,
    block: BlockPtr<T>,
}

#[repr(transparent)]
pub(crate) struct WeakPtr<T>(NonNull<WeakBlock<T>>);

impl<T> Clone for WeakPtr<T>
{
    fn clone(&self) -> Self { *self }
}
impl<T> Copy for WeakPtr<T> {}

impl<T> fmt::Debug for WeakPtr<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_tuple("WeakPtr").field(&self.0).finish()
    }
}

impl<T> WeakPtr<T>
{
    pub(crate) fn allocate(block: BlockPtr<T>) -> Self
    {
        block.acquire_block();
        Self(unsafe {
            NonNull::new_unchecked(Box::into_raw(Box::new(WeakBlock {
                weak: AtomicUsize::new(1),
                block,
            })))
        })
    }

    fn header(&self) -> &WeakBlock<T> { unsafe { self.0.as_ref() } }

    pub(crate) fn acquire(&self)
    {
        if self.header().weak.fetch_add(1, Relaxed) > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Return one unit of the weak count. The last unit frees this record and
    /// hands its retention unit back to the observed block.
    ///
    /// Safety: consumes a weak-count unit the caller owns. The handle must not
    /// be used afterwards.
    pub(crate) unsafe fn release(self)
    {
        if self.header().weak.fetch_sub(1, Release) == 1 {
            fence(Acquire);
            let block = self.header().block;
            drop(Box::from_raw(self.0.as_ptr()));
            block.release_block();
        }
    }

    pub(crate) fn block(&self) -> BlockPtr<T> { self.header().block }

    pub(crate) fn weak_count(&self) -> usize { self.header().weak.load(Relaxed) }
}

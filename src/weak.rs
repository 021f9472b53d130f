use std::{fmt, ptr};

use crate::{block::WeakPtr, strong::Strong};

/// Non-owning observer of a payload managed by [`Strong`] handles.
///
/// A `Weak` never holds a unit of the strong count, so it does not extend
/// the payload's lifetime. It shares a small counted record with the other
/// `Weak` handles cloned from it; that record keeps the *control block*
/// addressable (not the payload alive) so [`Weak::upgrade`] can probe the
/// strong count race-free long after the last owner is gone.
pub struct Weak<T>
{
    ptr: Option<WeakPtr<T>>,
}

unsafe impl<T: Send + Sync> Send for Weak<T> {}
unsafe impl<T: Send + Sync> Sync for Weak<T> {}

impl<T> Weak<T>
{
    pub(crate) fn derive(strong: &Strong<T>) -> Self
    {
        Self {
            ptr: strong.block().map(WeakPtr::allocate),
        }
    }

    /// The "no object" observer, as produced by downgrading an empty
    /// `Strong`.
    pub fn empty() -> Self { Self { ptr: None } }

    pub fn is_empty(&self) -> bool { self.ptr.is_none() }

    /// Attempt to reconstruct an owner of the observed payload.
    ///
    /// Succeeds only while at least one `Strong` is alive, in which case the
    /// result joins the *same* strong-count family as the surviving owners —
    /// never a second independent family over one payload. Once the payload
    /// has been destroyed this returns the empty `Strong`, always; the race
    /// against a concurrent last-release is settled by the block's
    /// increment-only-from-nonzero primitive.
    pub fn upgrade(&self) -> Strong<T>
    {
        match self.ptr {
            Some(w) => {
                let block = w.block();
                if block.try_acquire() {
                    Strong::from_block(Some(block))
                } else {
                    Strong::empty()
                }
            }
            None => Strong::empty(),
        }
    }

    /// Replace this handle's record with `other`'s.
    ///
    /// Self-assignment is detected and ignored. No lock discipline is needed
    /// here: the weak record carries no payload lock, only counts, and the
    /// incoming unit is taken before the old one is returned.
    pub fn assign(&mut self, other: &Weak<T>)
    {
        if ptr::eq(self, other) {
            return;
        }
        if let Some(new) = other.ptr {
            new.acquire();
        }
        if let Some(old) = self.ptr.take() {
            // Safety: returns the unit this handle held.
            unsafe { old.release() };
        }
        self.ptr = other.ptr;
    }

    /// Number of `Weak` handles sharing this record; 0 for the empty
    /// handle. Snapshot only.
    pub fn weak_count(&self) -> usize { self.ptr.map_or(0, |w| w.weak_count()) }
}

impl<T> Clone for Weak<T>
{
    fn clone(&self) -> Self
    {
        if let Some(w) = self.ptr {
            w.acquire();
        }
        Self { ptr: self.ptr }
    }
}

impl<T> Default for Weak<T>
{
    fn default() -> Self { Self::empty() }
}

impl<T> Drop for Weak<T>
{
    fn drop(&mut self)
    {
        if let Some(w) = self.ptr.take() {
            // Safety: returns the unit this handle held.
            unsafe { w.release() };
        }
    }
}

impl<T> fmt::Debug for Weak<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Weak").field("ptr", &self.ptr).finish()
    }
}

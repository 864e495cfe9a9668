//! Non-owning observation of a shared object.

use core::{fmt, marker::PhantomData, mem, ptr::NonNull};

use crate::{shared::address, BlockRef, ExpiredError, SharedPtr};

/// An observer of an object owned by one or more `SharedPtr`.
///
/// A `WeakPtr` does not keep the object alive, only its control block, and can be promoted to a `SharedPtr` for as
/// long as the object is alive.
pub struct WeakPtr<T>
where
    T: ?Sized,
{
    ptr: Option<NonNull<T>>,
    block: Option<BlockRef>,
    _observed: PhantomData<T>,
}

//
//  Construction
//

impl<T> WeakPtr<T>
where
    T: ?Sized,
{
    /// Creates an empty observer, which is always expired.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            ptr: None,
            block: None,
            _observed: PhantomData,
        }
    }
}

impl<T> From<&SharedPtr<T>> for WeakPtr<T>
where
    T: ?Sized,
{
    fn from(shared: &SharedPtr<T>) -> Self {
        let block = SharedPtr::block(shared);

        if let Some(block) = block {
            //  Safety:
            //  -   Lifetime: `shared` is a strong handle.
            //  -   Accounting: a new weak handle is created below.
            unsafe { block.increment_weak() };
        }

        Self {
            ptr: SharedPtr::get(shared),
            block,
            _observed: PhantomData,
        }
    }
}

impl<T> Clone for WeakPtr<T>
where
    T: ?Sized,
{
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            //  Safety:
            //  -   Lifetime: `self` is a weak handle.
            //  -   Accounting: a new weak handle is created below.
            unsafe { block.increment_weak() };
        }

        Self {
            ptr: self.ptr,
            block: self.block,
            _observed: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.block == source.block {
            self.ptr = source.ptr;
            return;
        }

        *self = source.clone();
    }
}

impl<T> Default for WeakPtr<T>
where
    T: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

//
//  Promotion
//

impl<T> WeakPtr<T>
where
    T: ?Sized,
{
    /// Attempts to promote `this` to a `SharedPtr`.
    ///
    /// Returns an empty `SharedPtr` if the object has already been dropped, or if `this` is empty.
    #[inline]
    pub fn lock(this: &Self) -> SharedPtr<T> {
        Self::upgrade(this).unwrap_or_default()
    }

    /// Attempts to promote `this` to a `SharedPtr`.
    ///
    /// #   Errors
    ///
    /// Returns `ExpiredError` if the object has already been dropped, or if `this` is empty.
    #[inline]
    pub fn upgrade(this: &Self) -> Result<SharedPtr<T>, ExpiredError> {
        let Some(block) = this.block else { return Err(ExpiredError) };

        //  Safety:
        //  -   Lifetime: `this` is a weak handle.
        //  -   Accounting: a new strong handle is created on success.
        if !unsafe { block.try_increment_strong() } {
            return Err(ExpiredError);
        }

        //  Safety:
        //  -   Accounting: strong count incremented above.
        Ok(unsafe { SharedPtr::from_parts(this.ptr, Some(block)) })
    }
}

//
//  Modifiers
//

impl<T> WeakPtr<T>
where
    T: ?Sized,
{
    /// Stops observing, leaving `this` empty.
    ///
    /// If `this` was the last handle on the control block, the control block is freed.
    #[inline]
    pub fn reset(this: &mut Self) {
        this.ptr = None;

        let Some(block) = this.block.take() else { return };

        //  Safety:
        //  -   Lifetime: `this` was a weak handle until now.
        //  -   Accounting: `this` no longer refers to `block`.
        unsafe { block.release_weak() };
    }

    /// Moves the content out, leaving `this` empty.
    #[inline(always)]
    pub fn take(this: &mut Self) -> Self {
        mem::take(this)
    }

    /// Swaps the content of `this` and `other`.
    #[inline(always)]
    pub fn swap(this: &mut Self, other: &mut Self) {
        mem::swap(this, other);
    }
}

impl<T> Drop for WeakPtr<T>
where
    T: ?Sized,
{
    fn drop(&mut self) {
        Self::reset(self);
    }
}

//
//  Observers
//

impl<T> WeakPtr<T>
where
    T: ?Sized,
{
    /// Returns whether the observed object has been dropped, or if there never was one.
    #[inline(always)]
    pub fn expired(this: &Self) -> bool {
        Self::use_count(this) == 0
    }

    /// Returns the number of `SharedPtr` owning the observed object, or 0 if empty.
    #[inline(always)]
    pub fn use_count(this: &Self) -> usize {
        //  Safety:
        //  -   Lifetime: `this` is a weak handle.
        this.block.map_or(0, |block| unsafe { block.strong_count() })
    }

    /// Returns the number of `WeakPtr` observing the object, or 0 if empty.
    #[inline(always)]
    pub fn weak_count(this: &Self) -> usize {
        //  Safety:
        //  -   Lifetime: `this` is a weak handle.
        this.block.map_or(0, |block| unsafe { block.weak_count() })
    }

    /// Returns whether no control block is attached.
    #[inline(always)]
    pub fn is_empty(this: &Self) -> bool {
        this.block.is_none()
    }

    /// Returns whether `this` and `other` observe the same address.
    ///
    /// The address may dangle, if the object has been dropped.
    #[inline(always)]
    pub fn ptr_eq<U>(this: &Self, other: &WeakPtr<U>) -> bool
    where
        U: ?Sized,
    {
        address(this.ptr) == address(other.ptr)
    }

    /// Returns whether `this` and `other` share the same control block, or are both empty.
    #[inline(always)]
    pub fn owner_eq<U>(this: &Self, other: &WeakPtr<U>) -> bool
    where
        U: ?Sized,
    {
        this.block == other.block
    }

    /// Returns whether `this` observes the object owned by `shared`.
    #[inline(always)]
    pub fn observes<U>(this: &Self, shared: &SharedPtr<U>) -> bool
    where
        U: ?Sized,
    {
        this.block == SharedPtr::block(shared)
    }
}

impl<T> fmt::Debug for WeakPtr<T>
where
    T: ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str("(WeakPtr)")
    }
}

// mod tests

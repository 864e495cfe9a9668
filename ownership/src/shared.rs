//! Shared ownership of a heap object.
//!
//! A `SharedPtr` is a pair of an address, the one it dereferences to, and a control block, the one it keeps alive.
//! The two usually match, but need not: an aliasing `SharedPtr` dereferences to, say, a field of the object, while
//! keeping the entire object alive.

use core::{cmp, convert::Infallible, fmt, hash, marker::PhantomData, mem, ops, ptr::{self, NonNull}};

use alloc::boxed::Box;

use crate::{BlockRef, DefaultDelete, Deleter, ExpiredError, InlineBlock, SeparateBlock, UniquePtr, WeakPtr};

/// One of many owners of a `T`.
///
/// The object is dropped when the last `SharedPtr` referencing its control block is dropped, or reset, whereas the
/// control block itself lives on as long as any `WeakPtr` references it.
///
/// A `SharedPtr` may be empty, in which case dereferencing it panics.
pub struct SharedPtr<T>
where
    T: ?Sized,
{
    ptr: Option<NonNull<T>>,
    block: Option<BlockRef>,
    _owned: PhantomData<T>,
}

//
//  Construction
//

impl<T> SharedPtr<T> {
    /// Allocates a control block and places `value` into it, in a single allocation.
    #[inline(always)]
    pub fn new(value: T) -> Self {
        Self::new_with(move || value)
    }

    /// Allocates a control block and constructs the object in it, in a single allocation.
    ///
    /// If `construct` panics, the control block is freed prior to unwinding further.
    #[inline]
    pub fn new_with<F>(construct: F) -> Self
    where
        F: FnOnce() -> T,
    {
        match Self::try_new_with(move || Ok::<_, Infallible>(construct())) {
            Ok(this) => this,
            Err(never) => match never {},
        }
    }

    /// Allocates a control block and attempts to construct the object in it, in a single allocation.
    ///
    /// If `construct` fails, or panics, the control block is freed, and the error is returned as is.
    #[inline]
    pub fn try_new_with<E, F>(construct: F) -> Result<Self, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let (block, ptr) = InlineBlock::try_new(construct)?;

        //  Safety:
        //  -   Accounting: `block` has a strong count of 1, transferred to the new instance.
        Ok(unsafe { Self::from_parts(Some(ptr), Some(block)) })
    }
}

impl<T> SharedPtr<T>
where
    T: ?Sized,
{
    /// Creates an empty pointer, without a control block.
    #[inline(always)]
    pub const fn null() -> Self {
        Self {
            ptr: None,
            block: None,
            _owned: PhantomData,
        }
    }

    /// Takes ownership of the boxed value, allocating a separate control block.
    #[inline]
    pub fn from_box(value: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(value));

        //  Safety:
        //  -   Ownership & Compatible: freshly leaked from a `Box`.
        unsafe { Self::from_raw(ptr) }
    }

    /// Takes ownership of `ptr`, allocating a separate control block.
    ///
    /// The object will be disposed of with `DefaultDelete`.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `ptr` SHALL point to an object owned by the caller, ownership of which is transferred.
    /// -   Compatible: `ptr` SHALL have been allocated by `Box`.
    #[inline(always)]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        //  Safety:
        //  -   Ownership & Compatible: as per pre-condition.
        unsafe { Self::from_raw_with(ptr, DefaultDelete) }
    }

    /// Takes ownership of `ptr`, allocating a separate control block.
    ///
    /// The object will be disposed of by `deleter`, which lives in the control block until then.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `ptr` SHALL point to an object owned by the caller, ownership of which is transferred.
    /// -   Compatible: `ptr` SHALL be suitable for disposal with `deleter`.
    #[inline]
    pub unsafe fn from_raw_with<D>(ptr: NonNull<T>, deleter: D) -> Self
    where
        D: Deleter<T> + 'static,
    {
        //  Safety:
        //  -   Ownership & Compatible: as per pre-condition.
        let block = unsafe { SeparateBlock::allocate(ptr, deleter) };

        //  Safety:
        //  -   Accounting: `block` has a strong count of 1, transferred to the new instance.
        unsafe { Self::from_parts(Some(ptr), Some(block)) }
    }

    /// Creates a pointer sharing the control block of `owner`, but dereferencing to `ptr`.
    ///
    /// If `owner` is empty, so is the control block of the result, which then does not own `ptr`.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: `ptr`, if any, SHALL remain valid for as long as the object of `owner` is alive.
    #[inline]
    pub unsafe fn aliasing<U>(owner: &SharedPtr<U>, ptr: Option<NonNull<T>>) -> Self
    where
        U: ?Sized,
    {
        if let Some(block) = owner.block {
            //  Safety:
            //  -   Lifetime: `owner` is a strong handle.
            //  -   Accounting: a new strong handle is created below.
            unsafe { block.increment_strong() };
        }

        //  Safety:
        //  -   Accounting: strong count incremented above, if any.
        unsafe { Self::from_parts(ptr, owner.block) }
    }

    /// Creates a pointer sharing the control block of `this`, but dereferencing to the result of `project`.
    ///
    /// This is the safe version of `aliasing`, typically used to keep a field alive via its owner, or to view the
    /// object as a `dyn Trait`. If `this` does not point to any object, `project` is not invoked and the result
    /// dereferences to nothing either.
    #[inline]
    pub fn project<U, F>(this: &Self, project: F) -> SharedPtr<U>
    where
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        let ptr = Self::as_ref(this).map(|value| NonNull::from(project(value)));

        //  Safety:
        //  -   Lifetime: `ptr` is borrowed from the object of `this`, or outlives it.
        unsafe { SharedPtr::aliasing(this, ptr) }
    }

    //  Safety:
    //  -   Accounting: the strong count of `block`, if any, SHALL account for the new instance.
    #[inline(always)]
    pub(crate) unsafe fn from_parts(ptr: Option<NonNull<T>>, block: Option<BlockRef>) -> Self {
        Self {
            ptr,
            block,
            _owned: PhantomData,
        }
    }
}

//
//  Conversion
//

impl<T, D> From<UniquePtr<T, D>> for SharedPtr<T>
where
    T: ?Sized,
    D: Deleter<T> + 'static,
{
    fn from(unique: UniquePtr<T, D>) -> Self {
        let (ptr, deleter) = UniquePtr::into_parts(unique);

        let Some(ptr) = ptr else { return Self::null() };

        //  Safety:
        //  -   Ownership: `unique` was the exclusive owner.
        //  -   Compatible: `deleter` is the deleter `unique` would have used.
        unsafe { Self::from_raw_with(ptr, deleter) }
    }
}

impl<T> From<Box<T>> for SharedPtr<T>
where
    T: ?Sized,
{
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T> TryFrom<&WeakPtr<T>> for SharedPtr<T>
where
    T: ?Sized,
{
    type Error = ExpiredError;

    fn try_from(weak: &WeakPtr<T>) -> Result<Self, ExpiredError> {
        WeakPtr::upgrade(weak)
    }
}

impl<T> SharedPtr<T>
where
    T: ?Sized,
{
    /// Creates a new `WeakPtr` observing the object of `this`.
    #[inline(always)]
    pub fn downgrade(this: &Self) -> WeakPtr<T> {
        WeakPtr::from(this)
    }
}

//
//  Modifiers
//

impl<T> SharedPtr<T>
where
    T: ?Sized,
{
    /// Gives up ownership, leaving `this` empty.
    ///
    /// If `this` was the last owner, the object is dropped. If there is no `WeakPtr` either, the control block is
    /// freed.
    #[inline]
    pub fn reset(this: &mut Self) {
        this.ptr = None;

        let Some(block) = this.block.take() else { return };

        //  Safety:
        //  -   Lifetime: `this` was a strong handle until now.
        //  -   Accounting: `this` no longer refers to `block`.
        unsafe { block.release_strong() };
    }

    /// Gives up ownership, then takes ownership of `ptr`, allocating a separate control block.
    ///
    /// The new control block is installed prior to giving up ownership.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `ptr` SHALL point to an object owned by the caller, ownership of which is transferred.
    /// -   Compatible: `ptr` SHALL have been allocated by `Box`.
    #[inline]
    pub unsafe fn reset_to(this: &mut Self, ptr: NonNull<T>) {
        //  Safety:
        //  -   Ownership & Compatible: as per pre-condition.
        *this = unsafe { Self::from_raw(ptr) };
    }

    /// Moves the content out, leaving `this` empty.
    #[inline(always)]
    pub fn take(this: &mut Self) -> Self {
        mem::replace(this, Self::null())
    }

    /// Swaps the content of `this` and `other`.
    #[inline(always)]
    pub fn swap(this: &mut Self, other: &mut Self) {
        mem::swap(this, other);
    }
}

//
//  Destruction
//

impl<T> Drop for SharedPtr<T>
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

impl<T> SharedPtr<T>
where
    T: ?Sized,
{
    /// Returns the address this pointer dereferences to, if any.
    #[inline(always)]
    pub fn get(this: &Self) -> Option<NonNull<T>> {
        this.ptr
    }

    /// Returns a reference to the object, if any.
    #[inline(always)]
    pub fn as_ref(this: &Self) -> Option<&T> {
        //  Safety:
        //  -   Convertible: kept alive by this strong handle, or by the aliasing contract.
        this.ptr.map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Returns whether no control block is attached.
    ///
    /// An aliasing pointer may dereference to nothing, yet have a control block, and thus not be empty.
    #[inline(always)]
    pub fn is_empty(this: &Self) -> bool {
        this.block.is_none()
    }

    /// Returns the number of `SharedPtr` sharing the control block of `this`, or 0 if empty.
    #[inline(always)]
    pub fn use_count(this: &Self) -> usize {
        //  Safety:
        //  -   Lifetime: `this` is a strong handle.
        this.block.map_or(0, |block| unsafe { block.strong_count() })
    }

    /// Returns the number of `WeakPtr` sharing the control block of `this`, or 0 if empty.
    #[inline(always)]
    pub fn weak_count(this: &Self) -> usize {
        //  Safety:
        //  -   Lifetime: `this` is a strong handle.
        this.block.map_or(0, |block| unsafe { block.weak_count() })
    }

    /// Returns whether `this` and `other` dereference to the same address.
    ///
    /// Only the address is compared, ignoring any metadata.
    #[inline(always)]
    pub fn ptr_eq<U>(this: &Self, other: &SharedPtr<U>) -> bool
    where
        U: ?Sized,
    {
        address(this.ptr) == address(other.ptr)
    }

    /// Returns whether `this` and `other` share the same control block, or are both empty.
    #[inline(always)]
    pub fn owner_eq<U>(this: &Self, other: &SharedPtr<U>) -> bool
    where
        U: ?Sized,
    {
        this.block == other.block
    }

    //  Returns the control block, if any.
    #[inline(always)]
    pub(crate) fn block(this: &Self) -> Option<BlockRef> {
        this.block
    }
}

#[inline(always)]
pub(crate) fn address<T>(ptr: Option<NonNull<T>>) -> *const u8
where
    T: ?Sized,
{
    ptr.map_or(ptr::null(), |ptr| ptr.as_ptr() as *const u8)
}

//
//  Clone
//

impl<T> Clone for SharedPtr<T>
where
    T: ?Sized,
{
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            //  Safety:
            //  -   Lifetime: `self` is a strong handle.
            //  -   Accounting: a new strong handle is created below.
            unsafe { block.increment_strong() };
        }

        //  Safety:
        //  -   Accounting: strong count incremented above, if any.
        unsafe { Self::from_parts(self.ptr, self.block) }
    }
}

//
//  Value Access
//

impl<T> ops::Deref for SharedPtr<T>
where
    T: ?Sized,
{
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &T {
        match Self::as_ref(self) {
            Some(value) => value,
            None => null_dereference(),
        }
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn null_dereference() -> ! {
    panic!("dereferenced an empty SharedPtr")
}

//
//  Defaults
//

impl<T> Default for SharedPtr<T>
where
    T: ?Sized,
{
    fn default() -> Self {
        Self::null()
    }
}

//
//  Formatting
//

impl<T> fmt::Debug for SharedPtr<T>
where
    T: ?Sized + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match Self::as_ref(self) {
            Some(value) => f.debug_tuple("SharedPtr").field(&value).finish(),
            None => f.write_str("SharedPtr(null)"),
        }
    }
}

impl<T> fmt::Display for SharedPtr<T>
where
    T: ?Sized + fmt::Display,
{
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T> fmt::Pointer for SharedPtr<T>
where
    T: ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Pointer::fmt(&address(self.ptr), f)
    }
}

//
//  Identity
//
//  Two `SharedPtr` are equal if they share the same control block, regardless of the address they dereference to.
//

impl<T> Eq for SharedPtr<T> where T: ?Sized {}

impl<T> PartialEq for SharedPtr<T>
where
    T: ?Sized,
{
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        Self::owner_eq(self, other)
    }
}

impl<T> hash::Hash for SharedPtr<T>
where
    T: ?Sized,
{
    #[inline(always)]
    fn hash<HS>(&self, hasher: &mut HS)
    where
        HS: hash::Hasher,
    {
        self.block.map(BlockRef::as_ptr).hash(hasher);
    }
}

//
//  Ordering
//

impl<T> Ord for SharedPtr<T>
where
    T: ?Sized,
{
    #[inline(always)]
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.block.cmp(&other.block)
    }
}

impl<T> PartialOrd for SharedPtr<T>
where
    T: ?Sized,
{
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// mod tests

//! Shared ownership of objects embedding their own reference count.
//!
//! Unlike `SharedPtr`, there is no control block: the object itself carries its count, within a `RefCount`, and
//! disposes of itself, through its `Deleter`, when the count reaches 0. As a result, a pointer to the object suffices
//! to create a new owner, and an `IntrusivePtr` is no larger than a raw pointer.
//!
//! There is no weak observation of intrusively counted objects.

use core::{fmt, marker::PhantomData, mem, ops, ptr::{self, NonNull}};

use alloc::boxed::Box;

use crate::{Counter, DefaultDelete, Deleter, SimpleCounter};

/// The reference count embedded in an intrusively counted object.
///
/// A copy of the object does not share the owners of the original: cloning a `RefCount` yields a fresh count of 0.
pub struct RefCount<C = SimpleCounter> {
    counter: C,
}

impl<C> RefCount<C>
where
    C: Counter,
{
    /// Creates a count of 0.
    #[inline(always)]
    pub fn new() -> Self {
        Self { counter: C::new() }
    }

    /// Returns the current count.
    #[inline(always)]
    pub fn count(&self) -> usize {
        self.counter.count()
    }
}

impl<C> Clone for RefCount<C>
where
    C: Counter,
{
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<C> Default for RefCount<C>
where
    C: Counter,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for RefCount<C>
where
    C: Counter,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("RefCount").field(&self.count()).finish()
    }
}

/// An object embedding its own reference count.
///
/// #   Safety
///
/// -   Stable: `ref_count_of` SHALL always return the same `RefCount`, embedded within `self`.
/// -   Exclusive: the `RefCount` SHALL only ever be manipulated through `inc_ref` and `dec_ref`.
pub unsafe trait RefCounted {
    /// The counter used by the embedded `RefCount`.
    type Counter: Counter;

    /// The policy used to dispose of the object once its count reaches 0.
    type Deleter: Deleter<Self> + Default;

    /// Returns the embedded `RefCount`.
    fn ref_count_of(&self) -> &RefCount<Self::Counter>;

    /// Returns the current count.
    #[inline(always)]
    fn ref_count(&self) -> usize {
        self.ref_count_of().count()
    }

    /// Increments the count, returning the new count.
    ///
    /// Calling this function without calling `dec_ref` afterwards leaks the object.
    #[inline(always)]
    fn inc_ref(&self) -> usize {
        self.ref_count_of().counter.increment()
    }

    /// Decrements the count, disposing of the object if it reaches 0.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: `this` SHALL point to a live object.
    /// -   Accounting: the caller SHALL give up one reference, obtained from `inc_ref`, and SHALL not use `this`
    ///     afterwards.
    /// -   Compatible: the object SHALL have been allocated in a way compatible with `Self::Deleter`.
    #[inline]
    unsafe fn dec_ref(this: NonNull<Self>) {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        let count = unsafe { this.as_ref() }.ref_count_of().counter.decrement();

        if count > 0 {
            return;
        }

        let mut deleter = Self::Deleter::default();

        //  Safety:
        //  -   Ownership: the count just reached 0, the last reference is given up.
        //  -   Compatible: as per pre-condition.
        unsafe { deleter.delete(this) };

        log::trace!("intrusive object {:p}: deleted", this.as_ptr() as *const u8);
    }
}

/// One of many owners of a `T` embedding its own reference count.
pub struct IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
{
    ptr: Option<NonNull<T>>,
    _owned: PhantomData<T>,
}

//
//  Construction
//

impl<T> IntrusivePtr<T>
where
    T: RefCounted<Deleter = DefaultDelete>,
{
    /// Allocates `value` on the heap and takes a first reference to it.
    #[inline]
    pub fn new(value: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));

        //  Safety:
        //  -   Lifetime: freshly allocated.
        //  -   Compatible: allocated by `Box`, as expected by `DefaultDelete`.
        unsafe { Self::from_raw(ptr) }
    }
}

impl<T> IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
{
    /// Creates a null pointer.
    #[inline(always)]
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _owned: PhantomData,
        }
    }

    /// Takes a new reference to the object pointed to by `ptr`.
    ///
    /// If the count of the object is 0, the new pointer becomes its first owner.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: `ptr` SHALL point to a live object.
    /// -   Compatible: the object SHALL have been allocated in a way compatible with `T::Deleter`.
    /// -   Ownership: if the count of the object is 0, the object SHALL not be owned by anything else.
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        unsafe { ptr.as_ref() }.inc_ref();

        Self {
            ptr: Some(ptr),
            _owned: PhantomData,
        }
    }
}

//
//  Modifiers
//

impl<T> IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
{
    /// Gives up the reference, leaving `this` null.
    ///
    /// If `this` was the last owner, the object is disposed of.
    #[inline]
    pub fn reset(this: &mut Self) {
        let Some(ptr) = this.ptr.take() else { return };

        //  Safety:
        //  -   Lifetime: `this` held a reference until now.
        //  -   Accounting: `this` no longer refers to `ptr`.
        //  -   Compatible: as per construction.
        unsafe { T::dec_ref(ptr) };
    }

    /// Takes a new reference to `ptr`, then gives up the current reference.
    ///
    /// Resetting to the object already pointed to is thus harmless.
    ///
    /// #   Safety
    ///
    /// -   As per `from_raw`.
    #[inline]
    pub unsafe fn reset_to(this: &mut Self, ptr: NonNull<T>) {
        //  Safety:
        //  -   As per pre-condition.
        *this = unsafe { Self::from_raw(ptr) };
    }

    /// Moves the content out, leaving `this` null.
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

impl<T> Drop for IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
{
    fn drop(&mut self) {
        Self::reset(self);
    }
}

impl<T> Clone for IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
{
    fn clone(&self) -> Self {
        if let Some(value) = Self::as_ref(self) {
            value.inc_ref();
        }

        Self {
            ptr: self.ptr,
            _owned: PhantomData,
        }
    }
}

impl<T> Default for IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
{
    fn default() -> Self {
        Self::null()
    }
}

//
//  Observers
//

impl<T> IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
{
    /// Returns the address of the object, if any.
    #[inline(always)]
    pub fn get(this: &Self) -> Option<NonNull<T>> {
        this.ptr
    }

    /// Returns a reference to the object, if any.
    #[inline(always)]
    pub fn as_ref(this: &Self) -> Option<&T> {
        //  Safety:
        //  -   Convertible: kept alive by the reference held by `this`.
        this.ptr.map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Returns whether `this` points to nothing.
    #[inline(always)]
    pub fn is_null(this: &Self) -> bool {
        this.ptr.is_none()
    }

    /// Returns the count of the object, or 0 if null.
    #[inline(always)]
    pub fn use_count(this: &Self) -> usize {
        Self::as_ref(this).map_or(0, T::ref_count)
    }

    /// Returns whether `this` and `other` point to the same address.
    #[inline(always)]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr.map(|ptr| ptr.as_ptr() as *const u8) == other.ptr.map(|ptr| ptr.as_ptr() as *const u8)
    }
}

impl<T> ops::Deref for IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
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
    panic!("dereferenced a null IntrusivePtr")
}

impl<T> fmt::Debug for IntrusivePtr<T>
where
    T: ?Sized + RefCounted + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match Self::as_ref(self) {
            Some(value) => f.debug_tuple("IntrusivePtr").field(&value).finish(),
            None => f.write_str("IntrusivePtr(null)"),
        }
    }
}

impl<T> fmt::Pointer for IntrusivePtr<T>
where
    T: ?Sized + RefCounted,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let address = self.ptr.map_or(ptr::null(), |ptr| ptr.as_ptr() as *const u8);

        fmt::Pointer::fmt(&address, f)
    }
}

// mod tests

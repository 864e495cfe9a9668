//! Handles the actual finnicky details of control blocks.
//!
//! A control block starts with a `BlockHeader`, containing the strong & weak counts and a vtable, followed by either:
//!
//! -   A pointer to a separately allocated payload, and its deleter: `SeparateBlock`.
//! -   The payload itself: `InlineBlock`.
//!
//! The vtable abstracts over the two, so that `SharedPtr` and `WeakPtr` need not know which is in use.

use core::{cell::{Cell, UnsafeCell}, fmt, mem::{ManuallyDrop, MaybeUninit}, ptr::{self, NonNull}};

use alloc::boxed::Box;

use crate::{Counter, Deleter, SimpleCounter};

/// The header of any control block.
///
/// The strong count represents the number of `SharedPtr` referencing the block. The payload is destroyed when the
/// strong count reaches 0.
///
/// The weak count represents the number of `WeakPtr` referencing the block. The memory block is freed when both the
/// strong and weak counts have reached 0.
///
/// While the payload is destroyed, the block is flagged as `destroying` and cannot be freed, so that the payload may
/// itself release weak references to its own block, such as its `SelfWeak`, without freeing it from under its feet.
/// The flag is not a reference: the weak count only ever reflects the live `WeakPtr`.
#[repr(C)]
pub(crate) struct BlockHeader {
    strong: SimpleCounter,
    weak: SimpleCounter,
    destroying: Cell<bool>,
    vtable: &'static BlockVTable,
}

/// The operations depending on the actual type of the control block.
pub(crate) struct BlockVTable {
    //  Safety:
    //  -   Accounting: to be invoked exactly once, when the strong count reaches 0.
    destroy_payload: unsafe fn(NonNull<BlockHeader>),
    //  Safety:
    //  -   Accounting: to be invoked exactly once, when both strong and weak counts have reached 0.
    free: unsafe fn(NonNull<BlockHeader>),
}

impl BlockHeader {
    //  A freshly created block is referenced by exactly one strong handle.
    fn new(vtable: &'static BlockVTable) -> Self {
        let strong = SimpleCounter::new();
        let weak = SimpleCounter::new();

        strong.increment();

        let destroying = Cell::new(false);

        Self { strong, weak, destroying, vtable }
    }
}

/// A raw, non-owning, reference to a live control block.
///
/// It is up to the handles, `SharedPtr` and `WeakPtr`, to faithfully account for the references they hold.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct BlockRef(NonNull<BlockHeader>);

//
//  Counting
//

impl BlockRef {
    /// Returns the number of strong handles.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the block SHALL be alive, ie referenced by at least one handle.
    #[inline(always)]
    pub(crate) unsafe fn strong_count(self) -> usize {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        unsafe { self.header().strong.count() }
    }

    /// Returns the number of weak handles.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the block SHALL be alive, ie referenced by at least one handle.
    #[inline(always)]
    pub(crate) unsafe fn weak_count(self) -> usize {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        unsafe { self.header().weak.count() }
    }

    /// Returns whether the block may be freed, ie whether neither strong nor weak handles reference it, and its payload
    /// is not being destroyed.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the block SHALL not have been freed yet.
    #[inline(always)]
    pub(crate) unsafe fn can_be_freed(self) -> bool {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        let header = unsafe { self.header() };

        header.strong.count() == 0 && header.weak.count() == 0 && !header.destroying.get()
    }

    /// Increments the strong count.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the block SHALL be referenced by at least one strong handle.
    /// -   Accounting: the caller SHALL create a new strong handle.
    #[inline(always)]
    pub(crate) unsafe fn increment_strong(self) {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        let header = unsafe { self.header() };

        debug_assert!(header.strong.count() > 0);

        header.strong.increment();
    }

    /// Increments the strong count, unless it is 0.
    ///
    /// Returns whether the increment succeeded.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the block SHALL be alive, ie referenced by at least one handle.
    /// -   Accounting: the caller SHALL create a new strong handle on success.
    #[inline(always)]
    pub(crate) unsafe fn try_increment_strong(self) -> bool {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        let header = unsafe { self.header() };

        if header.strong.count() == 0 {
            return false;
        }

        header.strong.increment();

        true
    }

    /// Increments the weak count.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the block SHALL be alive, ie referenced by at least one handle.
    /// -   Accounting: the caller SHALL create a new weak handle.
    #[inline(always)]
    pub(crate) unsafe fn increment_weak(self) {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        unsafe { self.header().weak.increment() };
    }

    /// Decrements the strong count, destroying the payload if it reaches 0, and freeing the block if the weak count is
    /// 0 as well.
    ///
    /// The block is freed even if the payload panics on destruction.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the block SHALL be alive.
    /// -   Accounting: the caller SHALL give up one strong handle, and SHALL not use `self` afterwards.
    #[inline]
    pub(crate) unsafe fn release_strong(self) {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        let header = unsafe { self.header() };

        if header.strong.decrement() > 0 {
            return;
        }

        //  Safety:
        //  -   Accounting: the strong count just reached 0.
        unsafe { self.destroy_payload() };
    }

    /// Decrements the weak count, freeing the block if both strong and weak counts are 0.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the block SHALL be alive.
    /// -   Accounting: the caller SHALL give up one weak handle, and SHALL not use `self` afterwards.
    #[inline]
    pub(crate) unsafe fn release_weak(self) {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        let header = unsafe { self.header() };

        header.weak.decrement();

        //  Safety:
        //  -   Lifetime: as per pre-condition.
        if !unsafe { self.can_be_freed() } {
            return;
        }

        //  Safety:
        //  -   Accounting: both counts are 0.
        unsafe { self.free() };
    }
}

//
//  Identity
//

impl BlockRef {
    /// Returns the address of the block, for identity purposes.
    #[inline(always)]
    pub(crate) fn as_ptr(self) -> *const u8 {
        self.0.as_ptr() as *const u8
    }
}

impl fmt::Debug for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Pointer::fmt(&self.0, f)
    }
}

//
//  Implementation
//

impl BlockRef {
    //  Safety:
    //  -   Lifetime: the lifetime of the returned reference is only guaranteed until the block is freed.
    #[inline(always)]
    unsafe fn header<'a>(self) -> &'a BlockHeader {
        //  Safety:
        //  -   Convertible: as per pre-condition.
        unsafe { self.0.as_ref() }
    }

    //  Safety:
    //  -   Accounting: should only be invoked when the strong count reaches 0.
    #[inline(never)]
    unsafe fn destroy_payload(self) {
        //  Ensure the block is freed, if need be, even if the payload panics during its destruction.
        struct ReleaseGuard(BlockRef);

        impl Drop for ReleaseGuard {
            fn drop(&mut self) {
                //  Safety:
                //  -   Lifetime: the `destroying` flag kept the block alive until now.
                let header = unsafe { self.0.header() };

                header.destroying.set(false);

                //  Safety:
                //  -   Lifetime: not freed yet, as per above.
                if !unsafe { self.0.can_be_freed() } {
                    return;
                }

                //  Safety:
                //  -   Accounting: both counts are 0, and the payload is destroyed.
                unsafe { self.0.free() };
            }
        }

        //  Safety:
        //  -   Lifetime: the strong count just reached 0, no handle could free the block yet.
        unsafe { self.header() }.destroying.set(true);

        let _guard = ReleaseGuard(self);

        //  Safety:
        //  -   Lifetime: kept alive by the `destroying` flag.
        let destroy_payload = unsafe { self.header().vtable.destroy_payload };

        //  Safety:
        //  -   Accounting: the strong count just reached 0, hence this is the only call.
        unsafe { destroy_payload(self.0) };

        log::trace!("control block {:?}: payload destroyed", self);
    }

    //  Safety:
    //  -   Accounting: should only be invoked when both strong and weak counts have reached 0.
    #[inline(never)]
    unsafe fn free(self) {
        //  Safety:
        //  -   Lifetime: not freed yet.
        let free = unsafe { self.header().vtable.free };

        //  Safety:
        //  -   Accounting: both counts are 0, hence this is the only call.
        unsafe { free(self.0) };

        log::trace!("control block {:?}: freed", self);
    }
}

/// A control block for a payload allocated separately, disposed of by `D`.
#[repr(C)]
pub(crate) struct SeparateBlock<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    header: BlockHeader,
    payload: NonNull<T>,
    deleter: UnsafeCell<ManuallyDrop<D>>,
}

impl<T, D> SeparateBlock<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    const VTABLE: &'static BlockVTable = &BlockVTable {
        destroy_payload: Self::destroy_payload,
        free: Self::free,
    };

    /// Allocates a control block for `payload`, with a strong count of 1.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `payload` SHALL point to an object owned by the caller, ownership of which is transferred.
    /// -   Compatible: `payload` SHALL be suitable for disposal with `deleter`.
    pub(crate) unsafe fn allocate(payload: NonNull<T>, deleter: D) -> BlockRef {
        let header = BlockHeader::new(Self::VTABLE);
        let deleter = UnsafeCell::new(ManuallyDrop::new(deleter));

        let block = Box::new(Self { header, payload, deleter });

        BlockRef(NonNull::from(Box::leak(block)).cast())
    }

    //  Safety:
    //  -   Accounting: only invoked once, when the strong count reaches 0.
    unsafe fn destroy_payload(header: NonNull<BlockHeader>) {
        let this = header.cast::<Self>().as_ptr();

        //  Safety:
        //  -   Convertible: `this` points to a live `Self`.
        //  -   Exclusive: the deleter is only ever accessed here, and there is only one call.
        let (payload, mut deleter) = unsafe { ((*this).payload, ManuallyDrop::take(&mut *(*this).deleter.get())) };

        //  Safety:
        //  -   Ownership: transferred at construction, and this is the last use.
        //  -   Compatible: as per construction.
        unsafe { deleter.delete(payload) };
    }

    //  Safety:
    //  -   Accounting: only invoked once, when both counts have reached 0.
    unsafe fn free(header: NonNull<BlockHeader>) {
        //  Safety:
        //  -   RoundTrip: allocated as a `Box<Self>` in `allocate`.
        let block = unsafe { Box::from_raw(header.cast::<Self>().as_ptr()) };

        drop(block);
    }
}

/// A control block embedding its payload, for a single allocation.
#[repr(C)]
pub(crate) struct InlineBlock<T> {
    header: BlockHeader,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> InlineBlock<T> {
    const VTABLE: &'static BlockVTable = &BlockVTable {
        destroy_payload: Self::destroy_payload,
        free: Self::free,
    };

    /// Allocates a control block, then constructs its payload in place with `construct`.
    ///
    /// Returns the block, with a strong count of 1, and a pointer to the payload.
    ///
    /// If `construct` fails, or panics, the block is freed, without ever considering the payload constructed.
    pub(crate) fn try_new<E, F>(construct: F) -> Result<(BlockRef, NonNull<T>), E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let header = BlockHeader::new(Self::VTABLE);
        let value = UnsafeCell::new(MaybeUninit::uninit());

        //  On failure or panic, `block` is freed, and `MaybeUninit` does not drop its content.
        let block = Box::new(Self { header, value });

        let value = construct()?;

        let block = NonNull::from(Box::leak(block)).as_ptr();

        //  Safety:
        //  -   InBounds: `block` points to a live `Self`.
        //  -   Layout: `UnsafeCell<MaybeUninit<T>>` has the same layout as `T`.
        let payload = unsafe { ptr::addr_of_mut!((*block).value) }.cast::<T>();

        //  Safety:
        //  -   Valid: suitably aligned, and uninitialized.
        unsafe { payload.write(value) };

        //  Safety:
        //  -   NonNull: derived from a non-null pointer.
        let (block, payload) = unsafe { (NonNull::new_unchecked(block), NonNull::new_unchecked(payload)) };

        Ok((BlockRef(block.cast()), payload))
    }

    //  Safety:
    //  -   Accounting: only invoked once, when the strong count reaches 0.
    unsafe fn destroy_payload(header: NonNull<BlockHeader>) {
        let this = header.cast::<Self>().as_ptr();

        //  Safety:
        //  -   InBounds: `this` points to a live `Self`.
        //  -   Layout: `UnsafeCell<MaybeUninit<T>>` has the same layout as `T`.
        let payload = unsafe { ptr::addr_of_mut!((*this).value) }.cast::<T>();

        //  Safety:
        //  -   Valid: constructed in `try_new`, and not yet destroyed as per Accounting.
        unsafe { ptr::drop_in_place(payload) };
    }

    //  Safety:
    //  -   Accounting: only invoked once, when both counts have reached 0.
    unsafe fn free(header: NonNull<BlockHeader>) {
        //  Safety:
        //  -   RoundTrip: allocated as a `Box<Self>` in `try_new`.
        let block = unsafe { Box::from_raw(header.cast::<Self>().as_ptr()) };

        //  The payload, if any, was already destroyed, and `MaybeUninit` will not attempt to drop it again.
        drop(block);
    }
}

// mod tests

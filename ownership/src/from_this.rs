//! Objects handing out shared and weak pointers to themselves.
//!
//! An object may only hand out a `SharedPtr` to itself if it is already owned by a `SharedPtr`, as otherwise the new
//! `SharedPtr` would be the sole owner of an object it did not allocate. To do so, the object embeds a `SelfWeak`,
//! which the `SharedPtr::*_enabled*` factories populate with a `WeakPtr` to the freshly created control block.
//!
//! ```
//! use endor_ownership::{EnableSharedFromThis, SelfWeak, SharedPtr};
//!
//! struct Node {
//!     name: String,
//!     this: SelfWeak<Node>,
//! }
//!
//! impl EnableSharedFromThis for Node {
//!     fn self_weak(&self) -> &SelfWeak<Self> {
//!         &self.this
//!     }
//! }
//!
//! let node = SharedPtr::new_enabled(Node { name: "root".into(), this: SelfWeak::new() });
//!
//! let again = node.shared_from_this().unwrap();
//!
//! assert_eq!("root", again.name);
//! assert_eq!(2, SharedPtr::use_count(&node));
//! ```

use core::{cell::OnceCell, fmt, ptr::NonNull};

use alloc::boxed::Box;

use crate::{ExpiredError, InlineBlock, SharedPtr, WeakPtr};

/// The back-reference embedded in objects implementing `EnableSharedFromThis`.
///
/// Empty until the object is wrapped by one of the `SharedPtr::*_enabled*` factories, after which it observes the
/// control block of the object for the rest of its life.
pub struct SelfWeak<T>
where
    T: ?Sized,
{
    weak: OnceCell<WeakPtr<T>>,
}

impl<T> SelfWeak<T>
where
    T: ?Sized,
{
    /// Creates an empty back-reference.
    #[inline(always)]
    pub const fn new() -> Self {
        Self { weak: OnceCell::new() }
    }

    /// Returns whether the back-reference has been installed.
    #[inline(always)]
    pub fn is_installed(&self) -> bool {
        self.weak.get().is_some()
    }

    //  Installs `weak`, unless a back-reference was already installed, in which case the first owner wins.
    fn install(&self, weak: WeakPtr<T>) {
        let _ = self.weak.set(weak);
    }
}

//  A copy of an object does not share the control block of the original.
impl<T> Clone for SelfWeak<T>
where
    T: ?Sized,
{
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Default for SelfWeak<T>
where
    T: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SelfWeak<T>
where
    T: ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("SelfWeak").field("installed", &self.is_installed()).finish()
    }
}

/// The capability for an object to hand out `SharedPtr` and `WeakPtr` to itself.
///
/// #   Wrapping
///
/// The back-reference is only installed by the `SharedPtr::*_enabled*` factories: `new_enabled`, `new_enabled_with`,
/// `try_new_enabled_with`, `from_box_enabled`, and `from_raw_enabled`.
///
/// The other ways of creating a `SharedPtr`, such as `SharedPtr::new`, `SharedPtr::from_box`, `SharedPtr::from_raw`,
/// or `SharedPtr::from(unique)`, do NOT install it. An object wrapped that way behaves as if it had never been wrapped:
/// `shared_from_this` returns `ExpiredError` and `weak_from_this` returns an empty `WeakPtr`.
pub trait EnableSharedFromThis {
    /// Returns the back-reference embedded in `self`.
    fn self_weak(&self) -> &SelfWeak<Self>;

    /// Returns a `SharedPtr` sharing ownership of `self` with its existing owners.
    ///
    /// #   Errors
    ///
    /// Returns `ExpiredError` if `self` was not wrapped by one of the `SharedPtr::*_enabled*` factories.
    fn shared_from_this(&self) -> Result<SharedPtr<Self>, ExpiredError> {
        match self.self_weak().weak.get() {
            Some(weak) => WeakPtr::upgrade(weak),
            None => Err(ExpiredError),
        }
    }

    /// Returns a `WeakPtr` observing `self`.
    ///
    /// The result is empty if `self` was not wrapped by one of the `SharedPtr::*_enabled*` factories.
    fn weak_from_this(&self) -> WeakPtr<Self> {
        self.self_weak().weak.get().cloned().unwrap_or_default()
    }
}

//
//  Factories
//

impl<T> SharedPtr<T>
where
    T: EnableSharedFromThis,
{
    /// Allocates a control block, places `value` into it, and installs the back-reference of `value`.
    #[inline]
    pub fn new_enabled(value: T) -> Self {
        Self::enabled(Self::new(value))
    }

    /// Allocates a control block, constructs the object in it, and installs the back-reference of the object.
    ///
    /// If `construct` panics, the control block is freed prior to unwinding further.
    #[inline]
    pub fn new_enabled_with<F>(construct: F) -> Self
    where
        F: FnOnce() -> T,
    {
        Self::enabled(Self::new_with(construct))
    }

    /// Allocates a control block, attempts to construct the object in it, and installs the back-reference of the
    /// object.
    ///
    /// If `construct` fails, or panics, the control block is freed, and the error is returned as is.
    #[inline]
    pub fn try_new_enabled_with<E, F>(construct: F) -> Result<Self, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let (block, ptr) = InlineBlock::try_new(construct)?;

        //  Safety:
        //  -   Accounting: `block` has a strong count of 1, transferred to the new instance.
        let this = unsafe { Self::from_parts(Some(ptr), Some(block)) };

        Ok(Self::enabled(this))
    }

    /// Takes ownership of the boxed value, allocating a separate control block, and installs the back-reference of
    /// the value.
    #[inline]
    pub fn from_box_enabled(value: Box<T>) -> Self {
        Self::enabled(Self::from_box(value))
    }

    /// Takes ownership of `ptr`, allocating a separate control block, and installs the back-reference of the object.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `ptr` SHALL point to an object owned by the caller, ownership of which is transferred.
    /// -   Compatible: `ptr` SHALL have been allocated by `Box`.
    #[inline]
    pub unsafe fn from_raw_enabled(ptr: NonNull<T>) -> Self {
        //  Safety:
        //  -   Ownership & Compatible: as per pre-condition.
        Self::enabled(unsafe { Self::from_raw(ptr) })
    }

    fn enabled(this: Self) -> Self {
        if let Some(value) = Self::as_ref(&this) {
            value.self_weak().install(Self::downgrade(&this));
        }

        this
    }
}

// mod tests

//! Disposal policies for owned objects.

use core::ptr::NonNull;

use alloc::boxed::Box;

/// A policy disposing of an owned object.
///
/// Implemented by `DefaultDelete`, `ArrayDelete`, and any `FnMut(NonNull<T>)`.
pub trait Deleter<T>
where
    T: ?Sized,
{
    /// Disposes of the object pointed to by `ptr`.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `ptr` SHALL point to an object owned by the caller, which SHALL not be used after this call.
    /// -   Compatible: `ptr` SHALL have been allocated in a way compatible with this deleter.
    unsafe fn delete(&mut self, ptr: NonNull<T>);
}

/// Disposes of a single object allocated by `Box`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct DefaultDelete;

impl<T> Deleter<T> for DefaultDelete
where
    T: ?Sized,
{
    #[inline]
    unsafe fn delete(&mut self, ptr: NonNull<T>) {
        //  Safety:
        //  -   Ownership: as per pre-condition.
        //  -   Compatible: allocated by `Box`, as per pre-condition.
        let boxed = unsafe { Box::from_raw(ptr.as_ptr()) };

        drop(boxed);
    }
}

/// Disposes of a contiguous array of objects allocated by `Box<[T]>` or `Vec<T>::into_boxed_slice`.
///
/// All elements are dropped, in order, then the array is deallocated.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ArrayDelete;

impl<T> Deleter<[T]> for ArrayDelete {
    #[inline]
    unsafe fn delete(&mut self, ptr: NonNull<[T]>) {
        //  Safety:
        //  -   Ownership: as per pre-condition.
        //  -   Compatible: allocated by `Box<[T]>`, with its length carried by `ptr`, as per pre-condition.
        let boxed: Box<[T]> = unsafe { Box::from_raw(ptr.as_ptr()) };

        drop(boxed);
    }
}

impl<T, F> Deleter<T> for F
where
    T: ?Sized,
    F: FnMut(NonNull<T>),
{
    #[inline(always)]
    unsafe fn delete(&mut self, ptr: NonNull<T>) {
        self(ptr)
    }
}

// mod tests

//! Exclusive ownership of a heap object, or array.
//!
//! `UniquePtr<T, D>` bundles the handle and its deleter in a `CompressedPair`, hence with a stateless deleter, such as
//! the default one, it is no larger than a raw pointer.

use core::{fmt, marker::PhantomData, mem::{self, ManuallyDrop}, ops, panic, ptr::{self, NonNull}};

use alloc::{boxed::Box, vec::Vec};

use crate::{ArrayDelete, CompressedPair, DefaultDelete, Deleter};

/// The exclusive owner of an array, disposed of with `ArrayDelete`.
pub type UniqueArray<T> = UniquePtr<[T], ArrayDelete>;

/// The exclusive owner of a `T`, disposed of by `D`.
///
/// The pointer may be empty, in which case dereferencing it panics.
pub struct UniquePtr<T, D = DefaultDelete>
where
    T: ?Sized,
    D: Deleter<T>,
{
    pair: CompressedPair<Option<NonNull<T>>, D>,
    _owned: PhantomData<T>,
}

//
//  Construction
//

impl<T> UniquePtr<T, DefaultDelete> {
    /// Allocates memory on the heap and then places `value` into it.
    #[inline(always)]
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }
}

impl<T> UniquePtr<T, DefaultDelete>
where
    T: ?Sized,
{
    /// Takes ownership of the boxed value.
    #[inline(always)]
    pub fn from_box(value: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(value));

        //  Safety:
        //  -   Ownership & Compatible: freshly leaked from a `Box`.
        unsafe { Self::from_raw(ptr) }
    }

    /// Converts back into a box, if not empty.
    #[inline]
    pub fn into_box(this: Self) -> Option<Box<T>> {
        let (ptr, _) = Self::into_parts(this);

        //  Safety:
        //  -   Ownership: `this` was the exclusive owner.
        //  -   Compatible: disposed of by `DefaultDelete`, hence allocated by `Box`.
        ptr.map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

impl<T> UniquePtr<[T], ArrayDelete> {
    /// Takes ownership of the elements of the vector.
    #[inline(always)]
    pub fn from_vec(elements: Vec<T>) -> Self {
        Self::from_boxed_slice(elements.into_boxed_slice())
    }

    /// Takes ownership of the boxed slice.
    #[inline(always)]
    pub fn from_boxed_slice(elements: Box<[T]>) -> Self {
        let ptr = NonNull::from(Box::leak(elements));

        //  Safety:
        //  -   Ownership & Compatible: freshly leaked from a `Box<[T]>`.
        unsafe { Self::from_raw(ptr) }
    }
}

impl<T, D> UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    /// Creates an empty pointer.
    #[inline(always)]
    pub fn null() -> Self
    where
        D: Default,
    {
        Self::null_with(D::default())
    }

    /// Creates an empty pointer, with a specific deleter.
    #[inline(always)]
    pub fn null_with(deleter: D) -> Self {
        let pair = CompressedPair::new(None, deleter);

        Self { pair, _owned: PhantomData }
    }

    /// Takes ownership of `ptr`.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `ptr` SHALL point to an object owned by the caller, ownership of which is transferred.
    /// -   Compatible: `ptr` SHALL be suitable for disposal with `D::default()`.
    #[inline(always)]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self
    where
        D: Default,
    {
        //  Safety:
        //  -   Ownership & Compatible: as per pre-condition.
        unsafe { Self::from_raw_with(ptr, D::default()) }
    }

    /// Takes ownership of `ptr`, which will be disposed of by `deleter`.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `ptr` SHALL point to an object owned by the caller, ownership of which is transferred.
    /// -   Compatible: `ptr` SHALL be suitable for disposal with `deleter`.
    #[inline(always)]
    pub unsafe fn from_raw_with(ptr: NonNull<T>, deleter: D) -> Self {
        let pair = CompressedPair::new(Some(ptr), deleter);

        Self { pair, _owned: PhantomData }
    }
}

//
//  Conversion
//

impl<T, D> UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    /// Deconstructs the instance, returning the handle, if any, and the deleter.
    ///
    /// The handle is NOT disposed of.
    #[inline]
    pub fn into_parts(this: Self) -> (Option<NonNull<T>>, D) {
        let this = ManuallyDrop::new(this);

        //  Safety:
        //  -   Valid: `this.pair` is valid, and will not be used again as `this` is never dropped.
        let pair = unsafe { ptr::read(&this.pair) };

        pair.into_parts()
    }

    /// Converts to a pointer to a related type, typically a `dyn Trait` implemented by `T`.
    ///
    /// The handle, if any, is converted by `convert`, while the deleter is carried over.
    ///
    /// #   Safety
    ///
    /// -   Compatible: the pointer returned by `convert` SHALL be suitable for disposal with `D`. This is notably the
    ///     case when it points to the same object, unsized, as in `|ptr| ptr as NonNull<dyn Trait>`.
    #[inline]
    pub unsafe fn cast<U, F>(this: Self, convert: F) -> UniquePtr<U, D>
    where
        U: ?Sized,
        D: Deleter<U>,
        F: FnOnce(NonNull<T>) -> NonNull<U>,
    {
        let (ptr, deleter) = Self::into_parts(this);

        let pair = CompressedPair::new(ptr.map(convert), deleter);

        UniquePtr { pair, _owned: PhantomData }
    }
}

impl<T> From<Box<T>> for UniquePtr<T, DefaultDelete>
where
    T: ?Sized,
{
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T> From<Vec<T>> for UniquePtr<[T], ArrayDelete> {
    fn from(elements: Vec<T>) -> Self {
        Self::from_vec(elements)
    }
}

//
//  Modifiers
//

impl<T, D> UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    /// Detaches the handle, if any, without disposing of it.
    ///
    /// `this` is empty afterwards, and the caller is responsible for disposing of the returned handle.
    #[inline(always)]
    pub fn release(this: &mut Self) -> Option<NonNull<T>> {
        this.pair.first_mut().take()
    }

    /// Disposes of the handle, if any.
    ///
    /// `this` is empty afterwards.
    #[inline]
    pub fn reset(this: &mut Self) {
        let (ptr, deleter) = this.pair.as_mut_parts();

        let Some(ptr) = ptr.take() else { return };

        //  Safety:
        //  -   Ownership: `this` was the exclusive owner, and no longer refers to `ptr`.
        //  -   Compatible: as per construction.
        unsafe { deleter.delete(ptr) };
    }

    /// Disposes of the current handle, if any, then takes ownership of `ptr`.
    ///
    /// `ptr` is installed prior to disposing of the current handle.
    ///
    /// #   Safety
    ///
    /// -   Ownership: `ptr` SHALL point to an object owned by the caller, ownership of which is transferred.
    /// -   Compatible: `ptr` SHALL be suitable for disposal with the current deleter.
    #[inline]
    pub unsafe fn reset_to(this: &mut Self, ptr: NonNull<T>) {
        let (current, deleter) = this.pair.as_mut_parts();

        let Some(previous) = current.replace(ptr) else { return };

        //  Safety:
        //  -   Ownership: `this` was the exclusive owner, and no longer refers to `previous`.
        //  -   Compatible: as per construction.
        unsafe { deleter.delete(previous) };
    }

    /// Moves the content out, leaving `this` empty.
    #[inline(always)]
    pub fn take(this: &mut Self) -> Self
    where
        D: Default,
    {
        mem::take(this)
    }

    /// Swaps the handles, and deleters, of `this` and `other`.
    #[inline(always)]
    pub fn swap(this: &mut Self, other: &mut Self) {
        mem::swap(&mut this.pair, &mut other.pair);
    }
}

//
//  Destruction
//

impl<T, D> Drop for UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    fn drop(&mut self) {
        Self::reset(self);
    }
}

//
//  Observers
//

impl<T, D> UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    /// Returns the handle, if any.
    #[inline(always)]
    pub fn get(this: &Self) -> Option<NonNull<T>> {
        *this.pair.first()
    }

    /// Returns whether the pointer is empty.
    #[inline(always)]
    pub fn is_null(this: &Self) -> bool {
        this.pair.first().is_none()
    }

    /// Returns a reference to the object, if any.
    #[inline(always)]
    pub fn as_ref(this: &Self) -> Option<&T> {
        //  Safety:
        //  -   Convertible: alive & guarded shared access.
        Self::get(this).map(|ptr| unsafe { ptr.as_ref() })
    }

    /// Returns a mutable reference to the object, if any.
    #[inline(always)]
    pub fn as_mut(this: &mut Self) -> Option<&mut T> {
        //  Safety:
        //  -   Convertible: alive & guarded exclusive access.
        Self::get(this).map(|mut ptr| unsafe { ptr.as_mut() })
    }

    /// Returns a reference to the deleter.
    #[inline(always)]
    pub fn deleter(this: &Self) -> &D {
        this.pair.second()
    }

    /// Returns a mutable reference to the deleter.
    #[inline(always)]
    pub fn deleter_mut(this: &mut Self) -> &mut D {
        this.pair.second_mut()
    }
}

impl<T, D> UniquePtr<[T], D>
where
    D: Deleter<[T]>,
{
    /// Returns the number of elements, 0 if empty.
    #[inline(always)]
    pub fn len(this: &Self) -> usize {
        this.pair.first().map_or(0, |ptr| ptr.len())
    }

    /// Returns whether there is no element, including if empty.
    #[inline(always)]
    pub fn is_empty(this: &Self) -> bool {
        Self::len(this) == 0
    }
}

//
//  Value Access
//

impl<T, D> ops::Deref for UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
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

impl<T, D> ops::DerefMut for UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    #[track_caller]
    fn deref_mut(&mut self) -> &mut T {
        match Self::as_mut(self) {
            Some(value) => value,
            None => null_dereference(),
        }
    }
}

impl<T, D> ops::Index<usize> for UniquePtr<[T], D>
where
    D: Deleter<[T]>,
{
    type Output = T;

    #[track_caller]
    fn index(&self, index: usize) -> &T {
        let elements: &[T] = self;

        &elements[index]
    }
}

impl<T, D> ops::IndexMut<usize> for UniquePtr<[T], D>
where
    D: Deleter<[T]>,
{
    #[track_caller]
    fn index_mut(&mut self, index: usize) -> &mut T {
        let elements: &mut [T] = self;

        &mut elements[index]
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn null_dereference() -> ! {
    panic!("dereferenced an empty UniquePtr")
}

//
//  Defaults
//

impl<T, D> Default for UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T> + Default,
{
    fn default() -> Self {
        Self::null()
    }
}

//
//  Formatting
//

impl<T, D> fmt::Debug for UniquePtr<T, D>
where
    T: ?Sized + fmt::Debug,
    D: Deleter<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match Self::as_ref(self) {
            Some(value) => f.debug_tuple("UniquePtr").field(&value).finish(),
            None => f.write_str("UniquePtr(null)"),
        }
    }
}

impl<T, D> fmt::Pointer for UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let ptr = Self::get(self).map_or(ptr::null(), |ptr| ptr.as_ptr() as *const u8);

        fmt::Pointer::fmt(&ptr, f)
    }
}

//
//  Identity
//

impl<T, D> Eq for UniquePtr<T, D>
where
    T: ?Sized + Eq,
    D: Deleter<T>,
{
}

impl<T, D> PartialEq for UniquePtr<T, D>
where
    T: ?Sized + PartialEq,
    D: Deleter<T>,
{
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        Self::as_ref(self) == Self::as_ref(other)
    }
}

//
//  Markers
//

//  Safety: as Box.
impl<T, D> Unpin for UniquePtr<T, D>
where
    T: ?Sized,
    D: Deleter<T>,
{
}

//  Safety: as Box.
impl<T, D> panic::UnwindSafe for UniquePtr<T, D>
where
    T: ?Sized + panic::UnwindSafe,
    D: Deleter<T> + panic::UnwindSafe,
{
}

//  Safety: as Box.
unsafe impl<T, D> Send for UniquePtr<T, D>
where
    T: ?Sized + Send,
    D: Deleter<T> + Send,
{
}

//  Safety: as Box.
unsafe impl<T, D> Sync for UniquePtr<T, D>
where
    T: ?Sized + Sync,
    D: Deleter<T> + Sync,
{
}

#[cfg(test)]
mod tests {
    use core::{cell::Cell, fmt::Debug};

    use crate::testing::DropCounter;

    use super::*;

    #[test]
    fn decons_vanilla() {
        let counter = DropCounter::new();

        let unique = UniquePtr::new(counter.track("Hello, World!"));

        assert!(!UniquePtr::is_null(&unique));
        assert_eq!("Hello, World!", unique.value);

        drop(unique);

        assert_eq!(1, counter.get());
    }

    #[test]
    fn decons_null() {
        let unique: UniquePtr<String> = UniquePtr::null();

        assert!(UniquePtr::is_null(&unique));
        assert_eq!(None, UniquePtr::get(&unique));
        assert_eq!(None, UniquePtr::as_ref(&unique));
    }

    #[test]
    #[should_panic(expected = "dereferenced an empty UniquePtr")]
    fn deref_null() {
        let unique: UniquePtr<String> = UniquePtr::null();

        let _ = unique.len();
    }

    #[test]
    fn deref_mut() {
        let mut unique = UniquePtr::new(String::from("Hello, World!"));

        unique.make_ascii_lowercase();

        assert_eq!("hello, world!", &*unique);
    }

    #[test]
    fn take_leaves_null() {
        let counter = DropCounter::new();

        let mut source = UniquePtr::new(counter.track("Hello, World!"));
        let address = UniquePtr::get(&source);

        let destination = UniquePtr::take(&mut source);

        assert!(UniquePtr::is_null(&source));
        assert_eq!(address, UniquePtr::get(&destination));

        drop(source);

        assert_eq!(0, counter.get());

        drop(destination);

        assert_eq!(1, counter.get());
    }

    #[test]
    fn release() {
        let counter = DropCounter::new();

        let mut unique = UniquePtr::new(counter.track("Hello, World!"));

        let ptr = UniquePtr::release(&mut unique).expect("not null");

        assert!(UniquePtr::is_null(&unique));

        drop(unique);

        assert_eq!(0, counter.get());

        //  Safety:
        //  -   Ownership & Compatible: released from a `UniquePtr` with `DefaultDelete`.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });

        assert_eq!(1, counter.get());
    }

    #[test]
    fn reset() {
        let counter = DropCounter::new();

        let mut unique = UniquePtr::new(counter.track("Hello, World!"));

        UniquePtr::reset(&mut unique);

        assert!(UniquePtr::is_null(&unique));
        assert_eq!(1, counter.get());

        //  Idempotent.
        UniquePtr::reset(&mut unique);

        assert_eq!(1, counter.get());
    }

    #[test]
    fn reset_to() {
        let counter = DropCounter::new();

        let mut unique = UniquePtr::new(counter.track("Hello"));

        let replacement = NonNull::from(Box::leak(Box::new(counter.track("World"))));

        //  Safety:
        //  -   Ownership & Compatible: freshly leaked from a `Box`.
        unsafe { UniquePtr::reset_to(&mut unique, replacement) };

        assert_eq!(1, counter.get());
        assert_eq!("World", unique.value);

        drop(unique);

        assert_eq!(2, counter.get());
    }

    #[test]
    fn swap() {
        let mut hello = UniquePtr::new(String::from("Hello"));
        let mut world = UniquePtr::new(String::from("World"));

        UniquePtr::swap(&mut hello, &mut world);

        assert_eq!("World", &*hello);
        assert_eq!("Hello", &*world);
    }

    #[test]
    fn custom_deleter() {
        let deleted = Cell::new(0);

        let deleter = |ptr: NonNull<String>| {
            deleted.set(deleted.get() + 1);

            //  Safety:
            //  -   Ownership & Compatible: leaked from a `Box` below.
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        };

        let ptr = NonNull::from(Box::leak(Box::new(String::from("Hello, World!"))));

        //  Safety:
        //  -   Ownership & Compatible: freshly leaked from a `Box`.
        let unique = unsafe { UniquePtr::from_raw_with(ptr, deleter) };

        assert_eq!("Hello, World!", &*unique);

        drop(unique);

        assert_eq!(1, deleted.get());
    }

    #[test]
    fn stateful_deleter_access() {
        #[derive(Default)]
        struct Counting(usize);

        impl Deleter<u32> for Counting {
            unsafe fn delete(&mut self, ptr: NonNull<u32>) {
                self.0 += 1;

                //  Safety:
                //  -   Ownership & Compatible: as per pre-condition.
                drop(unsafe { Box::from_raw(ptr.as_ptr()) });
            }
        }

        let ptr = NonNull::from(Box::leak(Box::new(7u32)));

        //  Safety:
        //  -   Ownership & Compatible: freshly leaked from a `Box`.
        let mut unique: UniquePtr<u32, Counting> = unsafe { UniquePtr::from_raw(ptr) };

        UniquePtr::deleter_mut(&mut unique).0 = 40;
        UniquePtr::reset(&mut unique);

        assert_eq!(41, UniquePtr::deleter(&unique).0);
    }

    #[test]
    fn cast_to_dyn() {
        let counter = DropCounter::new();

        let unique = UniquePtr::new(counter.track("Hello, World!"));

        //  Safety:
        //  -   Compatible: same object, unsized.
        let unique: UniquePtr<dyn Debug> = unsafe { UniquePtr::cast(unique, |ptr| ptr as NonNull<dyn Debug>) };

        assert!(format!("{:?}", &*unique).contains("Hello, World!"));

        drop(unique);

        assert_eq!(1, counter.get());
    }

    #[test]
    fn box_round_trip() {
        let unique = UniquePtr::from(Box::new(String::from("Hello, World!")));

        let boxed = UniquePtr::into_box(unique).expect("not null");

        assert_eq!("Hello, World!", &*boxed);
    }

    #[test]
    fn array_index() {
        let counter = DropCounter::new();

        let mut array = UniqueArray::from_vec(vec![counter.track("Hello"), counter.track("World")]);

        assert_eq!(2, UniqueArray::len(&array));
        assert!(!UniqueArray::is_empty(&array));
        assert_eq!("Hello", array[0].value);

        array[1].value.make_ascii_uppercase();

        assert_eq!("WORLD", array[1].value);

        drop(array);

        assert_eq!(2, counter.get());
    }

    #[test]
    fn array_null() {
        let array: UniqueArray<u32> = UniqueArray::null();

        assert_eq!(0, UniqueArray::len(&array));
        assert!(UniqueArray::is_empty(&array));
    }

    #[test]
    #[should_panic]
    fn array_out_of_bounds() {
        let array = UniqueArray::from_vec(vec![1, 2, 3]);

        let _ = array[3];
    }

    #[test]
    fn compressed_size() {
        #[derive(Default)]
        struct Stateless;

        impl Deleter<u64> for Stateless {
            unsafe fn delete(&mut self, ptr: NonNull<u64>) {
                //  Safety:
                //  -   Ownership & Compatible: as per pre-condition.
                drop(unsafe { Box::from_raw(ptr.as_ptr()) });
            }
        }

        assert_eq!(mem::size_of::<*mut u64>(), mem::size_of::<UniquePtr<u64>>());
        assert_eq!(mem::size_of::<*mut u64>(), mem::size_of::<UniquePtr<u64, Stateless>>());
        assert_eq!(mem::size_of::<*mut [u64]>(), mem::size_of::<UniqueArray<u64>>());
        assert_eq!(mem::size_of::<*mut ()>(), mem::size_of::<UniquePtr<()>>());
    }

    #[test]
    fn stateful_size() {
        assert_eq!(
            2 * mem::size_of::<*mut u64>(),
            mem::size_of::<UniquePtr<u64, fn(NonNull<u64>)>>()
        );
    }
} // mod tests

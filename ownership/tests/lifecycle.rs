/// Lifecycle tests for endor-ownership.
///
/// Those tests check, allocation by allocation, that memory blocks are released exactly when expected, using a global
/// allocator counting the live allocations of the current thread.
///
/// Reminder: to run only lifecycle tests, run `cargo test --test lifecycle`.
use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    ptr::NonNull,
    rc::Rc,
};

use endor_ownership::{
    EnableSharedFromThis, IntrusivePtr, RefCount, RefCounted, SelfWeak, SharedPtr, SimpleCounter, UniqueArray,
    UniquePtr, WeakPtr,
};

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

#[test]
fn unique_allocates_once() {
    let (live, unique) = allocations(|| UniquePtr::new(String::from("Hello, World!")));

    //  The `String` buffer, and the box holding it.
    assert_eq!(2, live);

    let (live, ()) = allocations(move || drop(unique));

    assert_eq!(-2, live);
}

#[test]
fn unique_array_allocates_once() {
    let (live, array) = allocations(|| UniqueArray::from_vec(vec![1u32, 2, 3, 4]));

    assert_eq!(1, live);
    assert_eq!(4, UniquePtr::len(&array));

    let (live, ()) = allocations(move || drop(array));

    assert_eq!(-1, live);
}

#[test]
fn shared_inline_allocates_once() {
    let (live, shared) = allocations(|| SharedPtr::new(42u64));

    //  Control block and value, together.
    assert_eq!(1, live);

    let (live, ()) = allocations(move || drop(shared));

    assert_eq!(-1, live);
}

#[test]
fn shared_separate_allocates_twice() {
    let boxed = Box::new(42u64);

    let (live, shared) = allocations(move || SharedPtr::from_box(boxed));

    //  The control block only, the value was already allocated.
    assert_eq!(1, live);

    let (live, ()) = allocations(move || drop(shared));

    //  Both the value and the control block.
    assert_eq!(-2, live);
}

#[test]
fn shared_copies_do_not_allocate() {
    let shared = SharedPtr::new(42u64);

    let (live, copies) = allocations(|| [shared.clone(), shared.clone(), shared.clone()]);

    assert_eq!(0, live);
    assert_eq!(4, SharedPtr::use_count(&shared));

    let (live, ()) = allocations(move || drop(copies));

    assert_eq!(0, live);
    assert_eq!(1, SharedPtr::use_count(&shared));
}

#[test]
fn shared_construction_failure_leaks_nothing() {
    let constructed = Rc::new(Cell::new(0));
    let destroyed = Rc::new(Cell::new(0));

    let (live, result) = allocations(|| {
        SharedPtr::<Probe>::try_new_with(|| {
            let _partial = Probe::new(&constructed, &destroyed);

            Err("Nope")
        })
    });

    assert_eq!(0, live);
    assert_eq!(Some("Nope"), result.err());

    //  Only `_partial`, never the payload.
    assert_eq!(1, constructed.get());
    assert_eq!(1, destroyed.get());
}

#[test]
fn shared_construction_panic_leaks_nothing() {
    let constructed = Rc::new(Cell::new(0));
    let destroyed = Rc::new(Cell::new(0));

    //  Silence the default hook, which may allocate to report the panic, and let the panic machinery perform its
    //  one-time allocations ahead of the measurement.
    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));

    let _ = panic::catch_unwind(|| panic::panic_any(0u8));

    let (live, panicked) = allocations(|| {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            SharedPtr::<Probe>::new_with(|| {
                let _partial = Probe::new(&constructed, &destroyed);

                panic::panic_any(7u8)
            })
        }));

        result.is_err()
    });

    panic::set_hook(hook);

    assert!(panicked);
    assert_eq!(0, live);

    //  Only `_partial`, never the payload.
    assert_eq!(1, constructed.get());
    assert_eq!(1, destroyed.get());
}

#[test]
fn weak_keeps_block_not_object() {
    let constructed = Rc::new(Cell::new(0));
    let destroyed = Rc::new(Cell::new(0));

    let shared = SharedPtr::new(Probe::new(&constructed, &destroyed));
    let weak = SharedPtr::downgrade(&shared);

    assert_eq!(1, constructed.get());

    let (live, ()) = allocations(move || drop(shared));

    //  The object is gone, the block is not.
    assert_eq!(0, live);
    assert_eq!(1, destroyed.get());
    assert!(WeakPtr::expired(&weak));

    let (live, ()) = allocations(move || drop(weak));

    assert_eq!(-1, live);
    assert_eq!(1, destroyed.get());
}

#[test]
fn expired_then_promoted() {
    let shared = SharedPtr::new(String::from("Hello, World!"));
    let weak = SharedPtr::downgrade(&shared);

    assert_eq!("Hello, World!", &*WeakPtr::lock(&weak));

    drop(shared);

    assert!(SharedPtr::is_empty(&WeakPtr::lock(&weak)));
    assert!(WeakPtr::upgrade(&weak).is_err());

    let error = SharedPtr::try_from(&weak).expect_err("expired");

    assert_eq!("bad weak pointer: the object has already been dropped", error.to_string());
}

#[test]
fn self_reference_round_trip() {
    let constructed = Rc::new(Cell::new(0));
    let destroyed = Rc::new(Cell::new(0));

    let (live, node) = allocations(|| {
        SharedPtr::new_enabled(Node {
            _probe: Probe::new(&constructed, &destroyed),
            this: SelfWeak::new(),
        })
    });

    //  A single allocation, the back-reference is not allocated separately.
    assert_eq!(1, live);

    let again = node.shared_from_this().expect("enabled");

    assert_eq!(2, SharedPtr::use_count(&node));
    assert_eq!(SharedPtr::get(&node), SharedPtr::get(&again));

    drop(again);

    let (live, ()) = allocations(move || drop(node));

    //  The back-reference does not keep the block alive.
    assert_eq!(-1, live);
    assert_eq!(1, destroyed.get());
}

#[test]
fn aliasing_keeps_owner_alive() {
    let constructed = Rc::new(Cell::new(0));
    let destroyed = Rc::new(Cell::new(0));

    let owner = SharedPtr::new((Probe::new(&constructed, &destroyed), String::from("Hello, World!")));

    let alias = SharedPtr::project(&owner, |pair| &pair.1);

    drop(owner);

    assert_eq!(0, destroyed.get());
    assert_eq!("Hello, World!", &*alias);

    drop(alias);

    assert_eq!(1, destroyed.get());
}

#[test]
fn intrusive_allocates_once() {
    let constructed = Rc::new(Cell::new(0));
    let destroyed = Rc::new(Cell::new(0));

    let (live, intrusive) = allocations(|| {
        IntrusivePtr::new(Counted {
            _probe: Probe::new(&constructed, &destroyed),
            count: RefCount::new(),
        })
    });

    assert_eq!(1, live);

    let copy = intrusive.clone();

    assert_eq!(2, IntrusivePtr::use_count(&copy));

    drop(intrusive);

    let (live, ()) = allocations(move || drop(copy));

    assert_eq!(-1, live);
    assert_eq!(1, destroyed.get());
}

#[test]
fn unique_to_shared_keeps_deleter() {
    let deleted = Rc::new(Cell::new(0));

    let deleter = {
        let deleted = deleted.clone();

        move |ptr: NonNull<u64>| {
            deleted.set(deleted.get() + 1);

            //  Safety:
            //  -   Ownership & Compatible: allocated by `Box` below.
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
    };

    let ptr = NonNull::from(Box::leak(Box::new(42u64)));

    //  Safety:
    //  -   Ownership & Compatible: freshly leaked from a `Box`.
    let unique = unsafe { UniquePtr::from_raw_with(ptr, deleter) };

    let shared = SharedPtr::from(unique);

    assert_eq!(0, deleted.get());
    assert_eq!(42, *shared);

    drop(shared);

    assert_eq!(1, deleted.get());
}

//
//  Helpers
//

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
}

//  Counts the live allocations of each thread, as tests run in parallel.
struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = LIVE.try_with(|live| live.set(live.get() + 1));

        //  Safety:
        //  -   As per pre-condition.
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _ = LIVE.try_with(|live| live.set(live.get() - 1));

        //  Safety:
        //  -   As per pre-condition.
        unsafe { System.dealloc(ptr, layout) }
    }
}

//  Returns the difference in live allocations of the current thread across `fun`, and its result.
fn allocations<R, F>(fun: F) -> (isize, R)
where
    F: FnOnce() -> R,
{
    let before = LIVE.with(Cell::get);

    let result = fun();

    let after = LIVE.with(Cell::get);

    (after - before, result)
}

//  Counts constructions & destructions.
struct Probe {
    destroyed: Rc<Cell<usize>>,
}

impl Probe {
    fn new(constructed: &Rc<Cell<usize>>, destroyed: &Rc<Cell<usize>>) -> Self {
        constructed.set(constructed.get() + 1);

        Self {
            destroyed: destroyed.clone(),
        }
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.destroyed.set(self.destroyed.get() + 1);
    }
}

struct Node {
    _probe: Probe,
    this: SelfWeak<Node>,
}

impl EnableSharedFromThis for Node {
    fn self_weak(&self) -> &SelfWeak<Self> {
        &self.this
    }
}

struct Counted {
    _probe: Probe,
    count: RefCount,
}

//  Safety:
//  -   Stable & Exclusive: `count` is only exposed here.
unsafe impl RefCounted for Counted {
    type Counter = SimpleCounter;
    type Deleter = endor_ownership::DefaultDelete;

    fn ref_count_of(&self) -> &RefCount {
        &self.count
    }
}

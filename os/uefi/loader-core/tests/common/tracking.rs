//! Global allocator that tells the mock firmware when the loader touched the pool.
//!
//! Counters are per thread, so tests running in parallel do not see each
//! other's allocations. Work the mock does for itself runs [`untracked`].

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

pub struct TrackingAllocator;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
    static FREES: Cell<usize> = const { Cell::new(0) };
    static PAUSED: Cell<bool> = const { Cell::new(false) };
}

fn count(counter: &'static std::thread::LocalKey<Cell<usize>>) {
    let paused = PAUSED.try_with(Cell::get).unwrap_or(true);
    if !paused {
        let _ = counter.try_with(|c| c.set(c.get() + 1));
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        count(&ALLOCATIONS);
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        count(&ALLOCATIONS);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        count(&FREES);
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // A pool has no realloc: it is an allocation plus a free.
        count(&ALLOCATIONS);
        count(&FREES);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

/// Pool changes on this thread since the last call.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct PoolChanges {
    pub allocations: usize,
    pub frees: usize,
}

impl PoolChanges {
    pub const fn total(self) -> usize {
        self.allocations + self.frees
    }
}

pub fn take() -> PoolChanges {
    PoolChanges {
        allocations: ALLOCATIONS.with(|c| c.replace(0)),
        frees: FREES.with(|c| c.replace(0)),
    }
}

/// Runs `f` without counting its allocations.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let was = PAUSED.with(|p| p.replace(true));
    let result = f();
    PAUSED.with(|p| p.set(was));
    result
}

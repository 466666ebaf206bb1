use std::{
  alloc::{GlobalAlloc, Layout},
  ops::{Deref, DerefMut},
  ptr,
};

use spin::{Mutex, MutexGuard};

use crate::{
  align::ALIGN,
  allocator::Allocator,
  config::Config,
  grower::{ArenaGrower, SbrkGrower},
  logging,
};

/// An [`Allocator`] behind one spin lock, usable as `#[global_allocator]`.
///
/// Each call holds the lock for its whole duration: splitting and merging
/// move free-list links around, so nothing finer grained is safe.
///
/// ```rust,ignore
/// use rmalloc::LockedAllocator;
///
/// #[global_allocator]
/// static HEAP: LockedAllocator = LockedAllocator::new();
/// ```
///
/// While a thread holds the lock the crate logs nothing on that thread, so an
/// allocating logger never calls back into the held heap. An allocation that
/// still reaches the heap from the thread holding it gets null instead of
/// spinning on its own lock.
pub struct LockedAllocator<G: ArenaGrower = SbrkGrower>(Mutex<Allocator<G>>);

/// Exclusive access to the heap of a [`LockedAllocator`].
pub struct HeapGuard<'a, G: ArenaGrower> {
  heap: MutexGuard<'a, Allocator<G>>,
  outer: usize,
}

impl LockedAllocator<SbrkGrower> {
  pub const fn new() -> Self {
    Self(Mutex::new(Allocator::new()))
  }
}

impl Default for LockedAllocator<SbrkGrower> {
  fn default() -> Self {
    Self::new()
  }
}

impl<G: ArenaGrower> LockedAllocator<G> {
  pub const fn with_config(
    grower: G,
    config: Config,
  ) -> Self {
    Self(Mutex::new(Allocator::with_config(grower, config)))
  }

  /// Exclusive access, e.g. for diagnostics or reconfiguration.
  ///
  /// When this is the global allocator, the thread holding the guard must not
  /// allocate: `validate` and `usable_size` are fine, while `blocks`, `dump`
  /// and `leak_report` build owned values and will see a failed allocation.
  pub fn lock(&self) -> HeapGuard<'_, G> {
    let heap = self.0.lock();
    let outer = logging::hold(self.id());
    HeapGuard { heap, outer }
  }

  fn id(&self) -> usize {
    self as *const Self as usize
  }

  /// The guard, or `None` when this thread already holds it.
  fn enter(&self) -> Option<HeapGuard<'_, G>> {
    if logging::held() == self.id() {
      return None;
    }
    Some(self.lock())
  }
}

impl<G: ArenaGrower> Deref for HeapGuard<'_, G> {
  type Target = Allocator<G>;

  fn deref(&self) -> &Allocator<G> {
    &self.heap
  }
}

impl<G: ArenaGrower> DerefMut for HeapGuard<'_, G> {
  fn deref_mut(&mut self) -> &mut Allocator<G> {
    &mut self.heap
  }
}

impl<G: ArenaGrower> Drop for HeapGuard<'_, G> {
  fn drop(&mut self) {
    logging::hold(self.outer);
  }
}

unsafe impl<G: ArenaGrower + Send> GlobalAlloc for LockedAllocator<G> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    let Some(mut heap) = self.enter() else {
      return ptr::null_mut();
    };
    unsafe { heap.memalign(layout.align(), layout.size()) }
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    // The heap never allocates, so it never frees from the holding thread.
    if let Some(mut heap) = self.enter() {
      unsafe { heap.free(ptr) }
    }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    let Some(mut heap) = self.enter() else {
      return ptr::null_mut();
    };
    unsafe {
      if layout.align() <= ALIGN {
        return heap.calloc(1, layout.size());
      }
      let payload = heap.memalign(layout.align(), layout.size());
      if !payload.is_null() {
        ptr::write_bytes(payload, 0, layout.size());
      }
      payload
    }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    let Some(mut heap) = self.enter() else {
      return ptr::null_mut();
    };
    unsafe {
      // Shrinking and in-place growth keep the address, moving does not.
      if layout.align() <= ALIGN || new_size <= heap.usable_size(ptr) {
        return heap.realloc(ptr, new_size);
      }

      let moved = heap.memalign(layout.align(), new_size);
      if !moved.is_null() {
        ptr::copy_nonoverlapping(ptr, moved, layout.size().min(new_size));
        heap.free(ptr);
      }
      moved
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{align::PAGE_SIZE, fit::FitStrategy, grower::FixedArena};
  use std::{sync::Arc, thread};

  fn locked() -> LockedAllocator<FixedArena> {
    LockedAllocator::with_config(FixedArena::new(64 * PAGE_SIZE).unwrap(), Config::default())
  }

  #[test_log::test]
  fn test_global_alloc_surface() {
    let heap = locked();

    unsafe {
      let layout = Layout::from_size_align(48, 8).unwrap();
      let p = heap.alloc(layout);
      assert!(!p.is_null());
      assert_eq!(p as usize % ALIGN, 0);

      std::ptr::write_bytes(p, 0x42, 48);
      let q = heap.realloc(p, layout, 480);
      assert!(std::slice::from_raw_parts(q, 48).iter().all(|&b| b == 0x42));

      let z = heap.alloc_zeroed(Layout::from_size_align(64, 16).unwrap());
      assert!(std::slice::from_raw_parts(z, 64).iter().all(|&b| b == 0));

      heap.dealloc(q, Layout::from_size_align(480, 8).unwrap());
      heap.dealloc(z, Layout::from_size_align(64, 16).unwrap());
    }

    let guard = heap.lock();
    assert!(guard.leak_report().is_clean());
    assert!(guard.validate().is_ok());
  }

  #[test_log::test]
  fn test_over_aligned_layouts() {
    let heap = locked();

    unsafe {
      let layout = Layout::from_size_align(64, 128).unwrap();
      let p = heap.alloc(layout);
      assert!(!p.is_null());
      assert_eq!(p as usize % 128, 0);
      std::ptr::write_bytes(p, 0x5A, 64);
      assert!(heap.lock().validate().is_ok());

      let page = Layout::from_size_align(100, 4096).unwrap();
      let z = heap.alloc_zeroed(page);
      assert_eq!(z as usize % 4096, 0);
      assert!(std::slice::from_raw_parts(z, 100).iter().all(|&b| b == 0));

      let grown = heap.realloc(p, layout, 1000);
      assert_eq!(grown as usize % 128, 0);
      assert!(std::slice::from_raw_parts(grown, 64).iter().all(|&b| b == 0x5A));

      let shrunk = heap.realloc(grown, Layout::from_size_align(1000, 128).unwrap(), 32);
      assert_eq!(shrunk, grown);

      heap.dealloc(shrunk, Layout::from_size_align(32, 128).unwrap());
      heap.dealloc(z, page);
    }

    let guard = heap.lock();
    assert!(guard.validate().is_ok());
    assert!(guard.leak_report().is_clean());
  }

  #[test_log::test]
  fn test_reentry_fails_instead_of_spinning() {
    let heap = locked();
    let layout = Layout::from_size_align(32, 8).unwrap();

    let guard = heap.lock();
    assert!(logging::quiet());
    unsafe {
      assert!(heap.alloc(layout).is_null());
      assert!(heap.alloc_zeroed(layout).is_null());
    }
    drop(guard);
    assert!(!logging::quiet());

    unsafe {
      let p = heap.alloc(layout);
      assert!(!p.is_null());
      heap.dealloc(p, layout);
    }
  }

  #[test_log::test]
  fn test_other_heaps_stay_usable_while_one_is_held() {
    let outer = locked();
    let inner = locked();
    let layout = Layout::from_size_align(32, 8).unwrap();

    let guard = outer.lock();
    unsafe {
      let p = inner.alloc(layout);
      assert!(!p.is_null());
      inner.dealloc(p, layout);
    }
    // Releasing the inner heap must not unmark the outer one.
    assert!(logging::quiet());
    drop(guard);
  }

  #[test_log::test]
  fn test_shared_between_threads() {
    let heap = Arc::new(locked());
    heap.lock().set_strategy(FitStrategy::BestFit);

    let workers: Vec<_> = (0..4u8)
      .map(|id| {
        let heap = Arc::clone(&heap);
        thread::spawn(move || {
          for round in 0..100usize {
            let size = 16 + (round * 7 + id as usize * 13) % 200;
            let align = 8 << (round % 5);
            let layout = Layout::from_size_align(size, align).unwrap();
            unsafe {
              let p = heap.alloc(layout);
              assert!(!p.is_null());
              assert_eq!(p as usize % align, 0);
              std::ptr::write_bytes(p, id, size);
              assert!(std::slice::from_raw_parts(p, size).iter().all(|&b| b == id));
              heap.dealloc(p, layout);
            }
          }
        })
      })
      .collect();

    for worker in workers {
      worker.join().unwrap();
    }

    let guard = heap.lock();
    assert!(guard.leak_report().is_clean());
    assert!(guard.validate().is_ok());
  }
}

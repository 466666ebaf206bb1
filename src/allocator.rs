use std::ptr::{self, NonNull};

use crate::{
  align::{ALIGN, checked_align},
  block::{Block, HEADER_SIZE, MIN_DATA_SIZE},
  config::{Config, SCRIBBLE_BYTE},
  error::AllocError,
  fit::FitStrategy,
  free_list::{FreeList, InsertPolicy},
  grower::{ArenaGrower, SbrkGrower},
  logging::{trace, warn},
};

/// A free-list allocator over an arena obtained page by page from `G`.
///
/// ```text
///   physical chain (address order, next/prev in headers)
///   ┌──────┬────────┬──────┬──────────────┬──────┬──────┬─────────────────┐
///   │ hdr  │  USED  │ hdr  │  FREE ●──┐   │ hdr  │ USED │ hdr  FREE ●──┐  │
///   └──────┴────────┴──────┴──────────│───┴──────┴──────┴──────────────│──┘
///                                     └── free list (payload words) ──►└─► null
/// ```
///
/// Not thread-safe: wrap it in [`LockedAllocator`](crate::LockedAllocator) to
/// share it.
pub struct Allocator<G: ArenaGrower = SbrkGrower> {
  pub(crate) grower: G,
  pub(crate) head: *mut Block,
  pub(crate) tail: *mut Block,
  pub(crate) free: FreeList,
  strategy: FitStrategy,
  scribble: bool,
}

unsafe impl<G: ArenaGrower + Send> Send for Allocator<G> {}

impl Allocator<SbrkGrower> {
  /// An empty allocator growing the program break.
  pub const fn new() -> Self {
    Self::with_config(SbrkGrower, Config {
      strategy: FitStrategy::FirstFit,
      insertion: InsertPolicy::Front,
      scribble: false,
    })
  }
}

impl Default for Allocator<SbrkGrower> {
  fn default() -> Self {
    Self::new()
  }
}

impl<G: ArenaGrower> Allocator<G> {
  pub fn with_grower(grower: G) -> Self {
    Self::with_config(grower, Config::default())
  }

  pub const fn with_config(
    grower: G,
    config: Config,
  ) -> Self {
    Self {
      grower,
      head: ptr::null_mut(),
      tail: ptr::null_mut(),
      free: FreeList::new(config.insertion),
      strategy: config.strategy,
      scribble: config.scribble,
    }
  }

  pub fn config(&self) -> Config {
    Config {
      strategy: self.strategy,
      insertion: self.free.policy(),
      scribble: self.scribble,
    }
  }

  pub fn grower(&self) -> &G {
    &self.grower
  }

  /// Takes effect from the next allocation on.
  pub fn set_strategy(
    &mut self,
    strategy: FitStrategy,
  ) {
    trace!("fit strategy: {}", strategy);
    self.strategy = strategy;
  }

  /// Fill every freshly handed-out payload with `0xAA`.
  pub fn set_scribble(
    &mut self,
    enable: bool,
  ) {
    trace!("scribble: {}", enable);
    self.scribble = enable;
  }

  /// Where blocks entering the free list are placed. Existing entries keep
  /// their order.
  pub fn set_insert_policy(
    &mut self,
    policy: InsertPolicy,
  ) {
    trace!("insert policy: {}", policy);
    self.free.set_policy(policy);
  }

  /// Allocates at least `size` bytes aligned to [`ALIGN`](crate::align::ALIGN).
  /// Returns null for a zero size or when the arena cannot grow.
  ///
  /// # Safety
  ///
  /// The arena must not have been corrupted through previously returned
  /// pointers.
  pub unsafe fn malloc(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match unsafe { self.try_malloc(size) } {
      Ok(payload) => payload.as_ptr(),
      Err(AllocError::ZeroSize) => ptr::null_mut(),
      Err(err) => {
        warn!("malloc({}) failed: {}", size, err);
        ptr::null_mut()
      }
    }
  }

  /// [`Allocator::malloc`] with the failure reason.
  ///
  /// # Safety
  ///
  /// Same as [`Allocator::malloc`].
  pub unsafe fn try_malloc(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }
    let aligned = checked_align(size).ok_or(AllocError::SizeOverflow { count: 1, size })?;

    unsafe {
      let block = match self.strategy.select(&self.free, aligned) {
        found if !found.is_null() => {
          self.claim(found);
          found
        }
        _ => self.extend(aligned)?,
      };

      self.split(block, aligned);

      let payload = Block::payload(block);
      if self.scribble {
        ptr::write_bytes(payload, SCRIBBLE_BYTE, (*block).size());
      }

      trace!("malloc({}) -> {:?} ({} bytes)", size, payload, (*block).size());
      Ok(NonNull::new_unchecked(payload))
    }
  }

  /// Returns a block to the free list, merging it with free neighbours.
  /// Null is ignored.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer returned by this allocator.
  pub unsafe fn free(
    &mut self,
    payload: *mut u8,
  ) {
    if payload.is_null() {
      return;
    }

    unsafe {
      let block = Block::from_payload(payload);
      trace!("free({:?}) ({} bytes)", payload, (*block).size());

      self.release(block);
      self.coalesce(block);
    }
  }

  /// Zeroed room for `count` elements of `size` bytes. Null when the product
  /// is zero or overflows.
  ///
  /// # Safety
  ///
  /// Same as [`Allocator::malloc`].
  pub unsafe fn calloc(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    let Some(total) = count.checked_mul(size) else {
      warn!("calloc({}, {}) failed: {}", count, size, AllocError::SizeOverflow { count, size });
      return ptr::null_mut();
    };

    unsafe {
      let payload = self.malloc(total);
      if !payload.is_null() {
        ptr::write_bytes(payload, 0, total);
      }
      payload
    }
  }

  /// `size` bytes at an address that is a multiple of `alignment`, a power of
  /// two. Alignments up to [`ALIGN`] are plain [`Allocator::malloc`].
  ///
  /// The request is over-allocated by `alignment` plus room for one more
  /// block. The slack in front of the first suitable address becomes a free
  /// block of its own and the excess behind the payload is split off, so the
  /// result is freed like any other payload. [`Allocator::realloc`] keeps the
  /// alignment only while it resizes in place.
  ///
  /// ```text
  ///   ┌─────┬──────────────────┬─────┬───────────────┬─────┬──────────┐
  ///   │ hdr │ slack (FREE)     │ hdr │ payload       │ hdr │ excess   │
  ///   └─────┴──────────────────┴─────┴───────────────┴─────┴──────────┘
  ///                                  ▲ multiple of `alignment`
  /// ```
  ///
  /// # Safety
  ///
  /// Same as [`Allocator::malloc`].
  pub unsafe fn memalign(
    &mut self,
    alignment: usize,
    size: usize,
  ) -> *mut u8 {
    if !alignment.is_power_of_two() {
      warn!("memalign({}, {}) failed: {}", alignment, size, AllocError::BadAlignment { alignment });
      return ptr::null_mut();
    }
    if alignment <= ALIGN || size == 0 {
      return unsafe { self.malloc(size) };
    }

    let Some((aligned, request)) = checked_align(size).and_then(|aligned| {
      let request = aligned.checked_add(alignment + HEADER_SIZE + MIN_DATA_SIZE)?;
      Some((aligned, request))
    }) else {
      warn!("memalign({}, {}) failed: size overflows", alignment, size);
      return ptr::null_mut();
    };

    unsafe {
      let payload = self.malloc(request);
      if payload.is_null() {
        return payload;
      }

      let mut block = Block::from_payload(payload);
      if payload as usize % alignment != 0 {
        // The slack must hold a block of its own.
        let mut target = crate::align_to!(payload as usize, alignment);
        if target - (payload as usize) < HEADER_SIZE + MIN_DATA_SIZE {
          target += alignment;
        }
        block = self.release_front(block, target - payload as usize);
      }

      self.split(block, aligned);

      let payload = Block::payload(block);
      trace!("memalign({}, {}) -> {:?} ({} bytes)", alignment, size, payload, (*block).size());
      payload
    }
  }

  /// Resizes a block, in place when possible. The first
  /// `min(old size, size)` bytes are preserved.
  ///
  /// A null `payload` behaves like [`Allocator::malloc`]; a zero `size` frees
  /// `payload` and returns null. On failure null is returned and `payload`
  /// stays valid.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer returned by this allocator.
  pub unsafe fn realloc(
    &mut self,
    payload: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      if payload.is_null() {
        return self.malloc(size);
      }
      if size == 0 {
        self.free(payload);
        return ptr::null_mut();
      }

      let Some(aligned) = checked_align(size) else {
        warn!("realloc({:?}, {}) failed: size overflows", payload, size);
        return ptr::null_mut();
      };

      let block = Block::from_payload(payload);
      let old_size = (*block).size();

      if aligned <= old_size {
        self.split(block, aligned);
        trace!("realloc({:?}, {}) shrank in place", payload, size);
        return payload;
      }

      if self.grow_in_place(block, aligned) {
        if self.scribble {
          ptr::write_bytes(payload.add(old_size), SCRIBBLE_BYTE, (*block).size() - old_size);
        }
        trace!("realloc({:?}, {}) grew in place", payload, size);
        return payload;
      }

      let moved = self.malloc(aligned);
      if moved.is_null() {
        return ptr::null_mut();
      }
      ptr::copy_nonoverlapping(payload, moved, old_size.min(aligned));
      self.free(payload);

      trace!("realloc({:?}, {}) moved to {:?}", payload, size, moved);
      moved
    }
  }

  /// Absorbs a free right neighbour when that alone makes `block` hold
  /// `size` bytes, then trims the excess.
  unsafe fn grow_in_place(
    &mut self,
    block: *mut Block,
    size: usize,
  ) -> bool {
    unsafe {
      let next = (*block).next();
      if next.is_null() || !(*next).is_free() || !Block::adjoins(block, next) {
        return false;
      }
      if (*block).size() + HEADER_SIZE + (*next).size() < size {
        return false;
      }

      // The neighbour's header is about to become payload.
      self.free.remove(next);
      self.absorb_next(block);
      self.split(block, size);
      true
    }
  }

  /// Payload bytes actually available behind `payload`; zero for null.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer returned by this allocator.
  pub unsafe fn usable_size(
    &self,
    payload: *mut u8,
  ) -> usize {
    if payload.is_null() {
      return 0;
    }
    unsafe { (*Block::from_payload(payload)).size() }
  }

  /// Tags a live block for [`Allocator::print`] and
  /// [`Allocator::leak_check`]. Keeps at most 7 bytes.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer returned by this allocator.
  pub unsafe fn set_name(
    &mut self,
    payload: *mut u8,
    name: &str,
  ) {
    if payload.is_null() {
      return;
    }
    unsafe { (*Block::from_payload(payload)).set_name(name) };
  }
}

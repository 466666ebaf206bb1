//! The crate's `log` macros.
//!
//! They go quiet while the current thread holds a [`LockedAllocator`]: when
//! that allocator is the global one, a logger that allocates would call back
//! into the heap it is being invoked from.
//!
//! [`LockedAllocator`]: crate::LockedAllocator

use std::cell::Cell;

thread_local! {
  /// Address of the locked heap this thread is inside of, 0 for none.
  static HELD: Cell<usize> = const { Cell::new(0) };
}

/// The locked heap the current thread holds, 0 for none.
pub(crate) fn held() -> usize {
  HELD.try_with(Cell::get).unwrap_or(0)
}

/// Records `heap` as held by this thread; returns the previous value so it
/// can be restored on release.
pub(crate) fn hold(heap: usize) -> usize {
  HELD.try_with(|held| held.replace(heap)).unwrap_or(0)
}

pub(crate) fn quiet() -> bool {
  HELD.try_with(|held| held.get() != 0).unwrap_or(true)
}

macro_rules! trace {
  ($($arg:tt)+) => {
    if !$crate::logging::quiet() {
      ::log::trace!($($arg)+);
    }
  };
}

macro_rules! debug {
  ($($arg:tt)+) => {
    if !$crate::logging::quiet() {
      ::log::debug!($($arg)+);
    }
  };
}

macro_rules! info {
  ($($arg:tt)+) => {
    if !$crate::logging::quiet() {
      ::log::info!($($arg)+);
    }
  };
}

macro_rules! log_warn {
  ($($arg:tt)+) => {
    if !$crate::logging::quiet() {
      ::log::warn!($($arg)+);
    }
  };
}

pub(crate) use {debug, info, log_warn as warn, trace};

use std::{fmt, ptr, str::FromStr};

use crate::block::Block;

/// Where a block lands when it enters the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPolicy {
  /// Stack order: the most recently freed block is found first.
  #[default]
  Front,
  /// Queue order: blocks age towards the front.
  Back,
}

impl FromStr for InsertPolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "front" | "lifo" => Ok(Self::Front),
      "back" | "fifo" => Ok(Self::Back),
      other => Err(format!("unknown insert policy `{other}`")),
    }
  }
}

impl fmt::Display for InsertPolicy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Front => write!(f, "front"),
      Self::Back => write!(f, "back"),
    }
  }
}

/// Singly linked index of the free blocks, threaded through their payloads.
///
/// List order is insertion order under the current [`InsertPolicy`], not
/// address order.
pub struct FreeList {
  head: *mut Block,
  tail: *mut Block,
  len: usize,
  policy: InsertPolicy,
}

impl FreeList {
  pub const fn new(policy: InsertPolicy) -> Self {
    Self {
      head: ptr::null_mut(),
      tail: ptr::null_mut(),
      len: 0,
      policy,
    }
  }

  pub fn policy(&self) -> InsertPolicy {
    self.policy
  }

  /// Affects later insertions only.
  pub fn set_policy(
    &mut self,
    policy: InsertPolicy,
  ) {
    self.policy = policy;
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  pub fn head(&self) -> *mut Block {
    self.head
  }

  /// Adds a block that just became free.
  ///
  /// # Safety
  ///
  /// `block` must be marked free and must not already be in the list.
  pub unsafe fn insert(
    &mut self,
    block: *mut Block,
  ) {
    debug_assert!(!unsafe { self.contains(block) }, "block {block:?} inserted twice");

    unsafe {
      match self.policy {
        InsertPolicy::Front => {
          Block::set_next_free(block, self.head);
          self.head = block;
          if self.tail.is_null() {
            self.tail = block;
          }
        }
        InsertPolicy::Back => {
          Block::set_next_free(block, ptr::null_mut());
          if self.tail.is_null() {
            self.head = block;
          } else {
            Block::set_next_free(self.tail, block);
          }
          self.tail = block;
        }
      }
    }

    self.len += 1;
  }

  /// Unlinks `block`, returning whether it was present.
  ///
  /// # Safety
  ///
  /// Every entry, `block` included, must still be marked free.
  pub unsafe fn remove(
    &mut self,
    block: *mut Block,
  ) -> bool {
    let mut prev: *mut Block = ptr::null_mut();
    let mut current = self.head;

    unsafe {
      while !current.is_null() {
        let next = Block::next_free(current);

        if current == block {
          if prev.is_null() {
            self.head = next;
          } else {
            Block::set_next_free(prev, next);
          }
          if self.tail == block {
            self.tail = prev;
          }
          Block::set_next_free(block, ptr::null_mut());
          self.len -= 1;
          return true;
        }

        prev = current;
        current = next;
      }
    }

    false
  }

  /// First entry, in list order, matching `predicate`.
  ///
  /// # Safety
  ///
  /// The list must be consistent (every entry a live free block).
  pub unsafe fn find<P>(
    &self,
    mut predicate: P,
  ) -> *mut Block
  where
    P: FnMut(&Block) -> bool,
  {
    unsafe { self.iter() }
      .find(|&block| predicate(unsafe { &*block }))
      .unwrap_or(ptr::null_mut())
  }

  /// # Safety
  ///
  /// Same as [`FreeList::find`].
  pub unsafe fn contains(
    &self,
    block: *mut Block,
  ) -> bool {
    unsafe { self.iter() }.any(|entry| entry == block)
  }

  /// Walks the list in order.
  ///
  /// # Safety
  ///
  /// The list must not be mutated while the iterator is alive.
  pub unsafe fn iter(&self) -> Iter {
    Iter { current: self.head }
  }
}

pub struct Iter {
  current: *mut Block,
}

impl Iterator for Iter {
  type Item = *mut Block;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }

    let block = self.current;
    self.current = unsafe { Block::next_free(block) };
    Some(block)
  }
}

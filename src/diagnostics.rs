use std::fmt::{self, Write};

use crate::{
  align::ALIGN,
  allocator::Allocator,
  block::Block,
  error::HeapError,
  grower::ArenaGrower,
  logging::info,
};

/// A snapshot of one block of the physical chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the header.
  pub header: usize,
  /// Address of the payload.
  pub payload: usize,
  /// One past the last payload byte.
  pub end: usize,
  pub size: usize,
  pub free: bool,
  pub name: String,
}

impl BlockInfo {
  unsafe fn of(block: *mut Block) -> Self {
    unsafe {
      Self {
        header: block as usize,
        payload: Block::payload(block) as usize,
        end: Block::end(block) as usize,
        size: (*block).size(),
        free: (*block).is_free(),
        name: (*block).name().to_string(),
      }
    }
  }
}

/// Blocks still in use, as found by [`Allocator::leak_check`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakReport {
  pub leaks: Vec<BlockInfo>,
  pub blocks: usize,
  pub bytes: usize,
}

impl LeakReport {
  pub fn is_clean(&self) -> bool {
    self.blocks == 0
  }
}

impl fmt::Display for LeakReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "-- Leak Check --")?;
    for leak in &self.leaks {
      writeln!(f, "[BLOCK {:#x}] {} '{}'", leak.header, leak.size, leak.name)?;
    }
    writeln!(f, "-- Summary --")?;
    writeln!(f, "{} blocks lost ({} bytes)", self.blocks, self.bytes)
  }
}

struct Chain {
  current: *mut Block,
}

impl Iterator for Chain {
  type Item = *mut Block;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }
    let block = self.current;
    self.current = unsafe { (*block).next() };
    Some(block)
  }
}

impl<G: ArenaGrower> Allocator<G> {
  fn chain(&self) -> Chain {
    Chain { current: self.head }
  }

  /// The physical chain, in address order.
  pub fn blocks(&self) -> Vec<BlockInfo> {
    self.chain().map(|block| unsafe { BlockInfo::of(block) }).collect()
  }

  /// Writes the physical chain followed by the free list.
  ///
  /// ```text
  /// -- Current Memory State --
  /// [BLOCK 0x5610a000-0x5610a060] 64 [USED] 'argv'
  /// [BLOCK 0x5610a060-0x5610b000] 4000 [FREE] ''
  ///
  /// -- Free List --
  /// [0x5610a080] -> NULL
  /// ```
  pub fn write_dump<W: Write>(
    &self,
    out: &mut W,
  ) -> fmt::Result {
    writeln!(out, "-- Current Memory State --")?;
    for block in self.chain() {
      unsafe {
        writeln!(
          out,
          "[BLOCK {:p}-{:p}] {} [{}] '{}'",
          block,
          Block::end(block),
          (*block).size(),
          if (*block).is_free() { "FREE" } else { "USED" },
          (*block).name()
        )?;
      }
    }

    writeln!(out)?;
    writeln!(out, "-- Free List --")?;
    for block in unsafe { self.free.iter() } {
      write!(out, "[{:p}] -> ", Block::payload(block))?;
    }
    writeln!(out, "NULL")
  }

  pub fn dump(&self) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = self.write_dump(&mut out);
    out
  }

  /// Prints [`Allocator::dump`] to stdout.
  pub fn print(&self) {
    print!("{}", Dump(self));
  }

  /// Every block still marked used, with totals.
  pub fn leak_report(&self) -> LeakReport {
    let leaks: Vec<BlockInfo> = self.blocks().into_iter().filter(|info| !info.free).collect();

    LeakReport {
      blocks: leaks.len(),
      bytes: leaks.iter().map(|info| info.size).sum(),
      leaks,
    }
  }

  /// Prints and returns the [`LeakReport`]. Meant for points where every
  /// legitimate allocation should already be freed.
  pub fn leak_check(&self) -> LeakReport {
    let report = self.leak_report();
    info!("leak check: {} blocks lost ({} bytes)", report.blocks, report.bytes);
    print!("{report}");
    report
  }

  /// Walks the chain and the free list, checking that they agree with each
  /// other and with the block layout rules. Allocates nothing, so it can run
  /// while the heap is locked as the global allocator.
  pub fn validate(&self) -> Result<(), HeapError> {
    let mut free = 0;

    unsafe {
      for block in self.chain() {
        let address = block as usize;
        let size = (*block).size();

        if Block::payload(block) as usize % ALIGN != 0 || size % ALIGN != 0 {
          return Err(HeapError::Misaligned { block: address });
        }

        if (*block).is_free() {
          free += 1;
        }

        let next = (*block).next();
        if next.is_null() {
          continue;
        }

        if (*next).prev() != block {
          return Err(HeapError::BrokenBackLink { block: address, next: next as usize });
        }
        if (Block::end(block) as usize) > next as usize {
          return Err(HeapError::Overlap { block: address, next: next as usize });
        }
        if Block::adjoins(block, next) && (*block).is_free() && (*next).is_free() {
          return Err(HeapError::UncoalescedNeighbours {
            block: address,
            next: next as usize,
          });
        }
      }

      // Walked by hand: a used entry must be reported, not dereferenced, and
      // more entries than free blocks means one is listed twice.
      let mut listed = 0;
      let mut entry = self.free.head();
      while !entry.is_null() {
        if listed == free || !self.chain().any(|block| block == entry && (*block).is_free()) {
          return Err(HeapError::StrayIndexEntry { block: entry as usize });
        }
        listed += 1;
        entry = Block::next_free(entry);
      }

      let unlisted = self
        .chain()
        .find(|&block| (*block).is_free() && !self.free.contains(block));
      if let Some(block) = unlisted {
        return Err(HeapError::NotIndexed { block: block as usize });
      }
      if listed != self.free.len() {
        return Err(HeapError::IndexCount {
          listed: self.free.len(),
          free,
        });
      }
    }

    Ok(())
  }
}

/// [`Allocator::write_dump`] as a `Display`, so printing needs no buffer.
struct Dump<'a, G: ArenaGrower>(&'a Allocator<G>);

impl<G: ArenaGrower> fmt::Display for Dump<'_, G> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    self.0.write_dump(f)
  }
}

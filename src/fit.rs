use std::{fmt, ptr, str::FromStr};

use crate::{block::Block, free_list::FreeList};

/// Rule used to pick among the free blocks large enough for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitStrategy {
  /// The first block in free-list order that is large enough.
  #[default]
  FirstFit,
  /// The smallest block that is large enough; earlier entries win ties.
  BestFit,
  /// The largest block; earlier entries win ties.
  WorstFit,
}

impl FitStrategy {
  /// Picks a free block whose payload holds `size` bytes, or null.
  ///
  /// # Safety
  ///
  /// `list` must be consistent.
  pub unsafe fn select(
    self,
    list: &FreeList,
    size: usize,
  ) -> *mut Block {
    if list.is_empty() {
      return ptr::null_mut();
    }
    if self == FitStrategy::FirstFit {
      return unsafe { list.find(|block| block.size() >= size) };
    }

    let mut chosen: *mut Block = ptr::null_mut();

    for block in unsafe { list.iter() } {
      let candidate = unsafe { (*block).size() };
      if candidate < size {
        continue;
      }

      if chosen.is_null() {
        chosen = block;
        continue;
      }

      let current = unsafe { (*chosen).size() };
      let better = match self {
        FitStrategy::BestFit => candidate < current,
        FitStrategy::WorstFit => candidate > current,
        FitStrategy::FirstFit => false,
      };

      if better {
        chosen = block;
      }
    }

    chosen
  }
}

impl TryFrom<i32> for FitStrategy {
  type Error = i32;

  fn try_from(value: i32) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(FitStrategy::FirstFit),
      1 => Ok(FitStrategy::BestFit),
      2 => Ok(FitStrategy::WorstFit),
      other => Err(other),
    }
  }
}

impl FromStr for FitStrategy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "first" | "first-fit" | "firstfit" | "0" => Ok(FitStrategy::FirstFit),
      "best" | "best-fit" | "bestfit" | "1" => Ok(FitStrategy::BestFit),
      "worst" | "worst-fit" | "worstfit" | "2" => Ok(FitStrategy::WorstFit),
      other => Err(format!("unknown fit strategy `{other}`")),
    }
  }
}

impl fmt::Display for FitStrategy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      FitStrategy::FirstFit => write!(f, "first-fit"),
      FitStrategy::BestFit => write!(f, "best-fit"),
      FitStrategy::WorstFit => write!(f, "worst-fit"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{block::HEADER_SIZE, free_list::InsertPolicy};

  #[repr(C, align(16))]
  struct Region([u8; 1024]);

  /// Free blocks with payloads of 112, 208 and 304 bytes (in that list order)
  /// followed by an 80-byte one.
  fn populate(region: &mut Region) -> (FreeList, [*mut Block; 4]) {
    let base = region.0.as_mut_ptr();
    let mut list = FreeList::new(InsertPolicy::Back);
    let mut offset = 0;
    let mut blocks = [ptr::null_mut(); 4];

    for (i, payload) in [112, 208, 304, 80].into_iter().enumerate() {
      unsafe {
        blocks[i] = Block::init(base.add(offset), HEADER_SIZE + payload);
        list.insert(blocks[i]);
      }
      offset += HEADER_SIZE + payload;
    }

    (list, blocks)
  }

  #[test]
  fn test_first_fit_takes_list_order() {
    let mut region = Region([0; 1024]);
    let (list, [small, medium, _, _]) = populate(&mut region);

    unsafe {
      assert_eq!(FitStrategy::FirstFit.select(&list, 90), small);
      assert_eq!(FitStrategy::FirstFit.select(&list, 150), medium);
    }
  }

  #[test]
  fn test_best_fit_takes_smallest() {
    let mut region = Region([0; 1024]);
    let (list, [small, medium, _, tiny]) = populate(&mut region);

    unsafe {
      assert_eq!(FitStrategy::BestFit.select(&list, 64), tiny);
      assert_eq!(FitStrategy::BestFit.select(&list, 90), small);
      assert_eq!(FitStrategy::BestFit.select(&list, 113), medium);
    }
  }

  #[test]
  fn test_worst_fit_takes_largest() {
    let mut region = Region([0; 1024]);
    let (list, [_, _, large, _]) = populate(&mut region);

    unsafe {
      assert_eq!(FitStrategy::WorstFit.select(&list, 16), large);
      assert_eq!(FitStrategy::WorstFit.select(&list, 304), large);
    }
  }

  #[test]
  fn test_no_fit() {
    let mut region = Region([0; 1024]);
    let (list, _) = populate(&mut region);

    for strategy in [FitStrategy::FirstFit, FitStrategy::BestFit, FitStrategy::WorstFit] {
      assert!(unsafe { strategy.select(&list, 305) }.is_null());
    }

    let empty = FreeList::new(InsertPolicy::Front);
    assert!(unsafe { FitStrategy::BestFit.select(&empty, 16) }.is_null());
  }

  #[test]
  fn test_ties_prefer_earlier_entry() {
    let mut region = Region([0; 1024]);
    let base = region.0.as_mut_ptr();
    let mut list = FreeList::new(InsertPolicy::Back);

    let (a, b) = unsafe {
      let a = Block::init(base, HEADER_SIZE + 64);
      let b = Block::init(base.add(HEADER_SIZE + 64), HEADER_SIZE + 64);
      list.insert(a);
      list.insert(b);
      (a, b)
    };

    unsafe {
      assert_eq!(FitStrategy::BestFit.select(&list, 32), a);
      assert_eq!(FitStrategy::WorstFit.select(&list, 32), a);
      assert_ne!(FitStrategy::WorstFit.select(&list, 32), b);
    }
  }

  #[test]
  fn test_strategy_conversions() {
    assert_eq!(FitStrategy::try_from(0), Ok(FitStrategy::FirstFit));
    assert_eq!(FitStrategy::try_from(2), Ok(FitStrategy::WorstFit));
    assert_eq!(FitStrategy::try_from(3), Err(3));
    assert_eq!(FitStrategy::try_from(-1), Err(-1));
    assert_eq!("Best".parse::<FitStrategy>(), Ok(FitStrategy::BestFit));
    assert_eq!("worst-fit".parse::<FitStrategy>(), Ok(FitStrategy::WorstFit));
    assert!("next".parse::<FitStrategy>().is_err());
    assert_eq!(FitStrategy::default(), FitStrategy::FirstFit);
  }
}

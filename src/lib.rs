//! # rmalloc - A Free-List Memory Allocator Library
//!
//! This crate provides a `malloc`/`free`/`calloc`/`realloc` allocator that
//! manages one growable arena obtained page by page, by default from the
//! `sbrk` system call.
//!
//! ## Overview
//!
//! Every byte of the arena belongs to exactly one block: a fixed header
//! followed by its payload. Blocks are chained in address order, and the free
//! ones are additionally threaded into a free list whose links live inside
//! their (otherwise unused) payloads:
//!
//! ```text
//!   Arena:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │  ┌─────┬──────┐ ┌─────┬───────────┐ ┌─────┬────┐ ┌─────┬──────────┐  │
//!   │  │ hdr │ USED │ │ hdr │ FREE  ●   │ │ hdr │USED│ │ hdr │ FREE  ●  │  │
//!   │  └─────┴──────┘ └─────┴───────│───┘ └─────┴────┘ └─────┴───────│──┘  │
//!   │     ◄──────── prev / next ────│──────────────────────►         │     │
//!   │                               └──── free list ────────────────►└► ∅ │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - `malloc` asks the [`FitStrategy`] for a free block, splits off what it
//!   does not need and hands out the payload. When nothing fits, the arena
//!   grows by whole pages and the new region becomes one block.
//! - `free` puts the block back on the free list and merges it with free
//!   physical neighbours, so two adjacent blocks are never both free.
//! - `realloc` shrinks in place, grows into a free right neighbour when it
//!   can, and otherwise moves.
//!
//! ## Crate Structure
//!
//! ```text
//!   rmalloc
//!   ├── align       - Alignment macros (align!, align_to!), ALIGN, PAGE_SIZE
//!   ├── block       - Block header: size + free flag, physical links, name
//!   ├── free_list   - Free-list index threaded through free payloads
//!   ├── fit         - First/best/worst fit selection
//!   ├── engine      - Split, coalesce, arena growth
//!   ├── allocator   - Allocator: malloc, free, calloc, realloc, memalign
//!   ├── diagnostics - print, leak_check, validate
//!   ├── grower      - ArenaGrower trait, SbrkGrower, FixedArena
//!   ├── config      - Config and RMALLOC_* environment overrides
//!   ├── error       - AllocError, HeapError
//!   ├── locked      - LockedAllocator (GlobalAlloc behind a spin lock)
//!   └── logging     - log macros, muted while a locked heap is held
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rmalloc::{Allocator, FitStrategy};
//!
//! fn main() {
//!     let mut allocator = Allocator::new();
//!     allocator.set_strategy(FitStrategy::BestFit);
//!
//!     unsafe {
//!         let ptr = allocator.malloc(64);
//!         allocator.set_name(ptr, "buffer");
//!
//!         let ptr = allocator.realloc(ptr, 256);
//!         allocator.print();
//!
//!         allocator.free(ptr);
//!         allocator.leak_check();
//!     }
//! }
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   ┌───────────────────────────────┬────────────────────────────────┐
//!   │        Block Header           │           Payload              │
//!   │  ┌─────────────────────────┐  │                                │
//!   │  │ name: [u8; 8]           │  │  free: first word = next free  │
//!   │  │ size: N | free bit      │  │  used: N bytes of user data    │
//!   │  │ next: physical next     │  │                                │
//!   │  │ prev: physical prev     │  │                                │
//!   │  └─────────────────────────┘  │                                │
//!   │          32 bytes             │                                │
//!   └───────────────────────────────┴────────────────────────────────┘
//!                                   ▲
//!                                   └── Pointer returned to user (16-aligned)
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded core**: `Allocator` has no locking; use
//!   [`LockedAllocator`] to share one
//! - **No shrinking**: pages obtained from the grower are never returned
//! - **No hardening**: double frees and foreign pointers are undefined behaviour
//! - **Alignment**: payloads are 16-byte aligned; larger alignments go
//!   through `memalign`, which spends the slack in front as a free block
//!
//! ## Safety
//!
//! This crate deals with raw memory. Allocation and deallocation require
//! `unsafe` blocks.

pub mod align;
mod allocator;
mod block;
mod config;
mod diagnostics;
mod engine;
mod error;
mod fit;
mod free_list;
mod grower;
mod locked;
mod logging;

pub use allocator::Allocator;
pub use block::{HEADER_SIZE, MIN_DATA_SIZE};
pub use config::{Config, ENV_INSERT, ENV_SCRIBBLE, ENV_STRATEGY, SCRIBBLE_BYTE};
pub use diagnostics::{BlockInfo, LeakReport};
pub use error::{AllocError, HeapError};
pub use fit::FitStrategy;
pub use free_list::InsertPolicy;
pub use grower::{ArenaGrower, FixedArena, SbrkGrower};
pub use locked::{HeapGuard, LockedAllocator};

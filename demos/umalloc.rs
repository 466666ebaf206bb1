use std::{env, io::Read, ptr, slice};

use rmalloc::{Allocator, Config, FitStrategy, SCRIBBLE_BYTE, SbrkGrower};

/// Waits until the user presses ENTER when `--step` was given, so the heap can
/// be inspected with `pmap`, `gdb` and friends between stages.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn report(
  ok: bool,
  what: &str,
  failures: &mut usize,
) {
  if ok {
    println!("PASS: {what}");
  } else {
    println!("FAIL: {what}");
    *failures += 1;
  }
}

/// The first `len` bytes behind `payload`, or `None` for a failed allocation.
unsafe fn bytes<'a>(
  payload: *mut u8,
  len: usize,
) -> Option<&'a [u8]> {
  (!payload.is_null()).then(|| unsafe { slice::from_raw_parts(payload, len) })
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkGrower::program_break(),
  );
}

fn main() {
  env_logger::init();

  let step = env::args().any(|arg| arg == "--step");
  let config = Config::from_env();
  let mut heap = Allocator::with_config(SbrkGrower, config);
  let mut failures = 0;

  println!("configuration: {:?}", heap.config());
  print_program_break("start");

  unsafe {
    println!("\n===== BASIC MALLOC/FREE =====");
    let a = heap.malloc(32);
    report(!a.is_null(), "malloc(32) returns non-null", &mut failures);
    if !a.is_null() {
      *a = b'x';
    }
    report(bytes(a, 1) == Some(&b"x"[..]), "malloc'd memory is writable", &mut failures);
    heap.free(a);
    print_program_break("after first grant");
    pause(step);

    println!("\n===== CALLOC =====");
    let b = heap.calloc(8, 8);
    report(!b.is_null(), "calloc returns non-null", &mut failures);
    report(
      bytes(b, 64).is_some_and(|b| b.iter().all(|&x| x == 0)),
      "calloc returns zeroed memory",
      &mut failures,
    );
    heap.free(b);

    println!("\n===== FIRST FIT + REUSE =====");
    heap.set_strategy(FitStrategy::FirstFit);
    let c1 = heap.malloc(100);
    let c2 = heap.malloc(100);
    heap.free(c1);
    let c3 = heap.malloc(50);
    report(c3 == c1, "freed block reused (first fit)", &mut failures);
    heap.free(c2);
    heap.free(c3);

    println!("\n===== BEST/WORST FIT =====");
    let x1 = heap.malloc(100);
    let g1 = heap.malloc(16);
    let x2 = heap.malloc(200);
    let g2 = heap.malloc(16);
    let x3 = heap.malloc(300);
    let g3 = heap.malloc(16);
    heap.free(x1);
    heap.free(x2);
    heap.free(x3);

    heap.set_strategy(FitStrategy::BestFit);
    let best = heap.malloc(90);
    report(best == x1, "best fit selected the smallest block", &mut failures);
    heap.free(best);

    heap.print();
    heap.set_strategy(config.strategy);
    for guard in [g1, g2, g3] {
      heap.free(guard);
    }
    pause(step);

    println!("\n===== COALESCING =====");
    let m1 = heap.malloc(100);
    let m2 = heap.malloc(100);
    let m3 = heap.malloc(100);
    heap.free(m1);
    heap.free(m2);
    heap.free(m3);
    let big = heap.malloc(250);
    report(big == m1, "coalescing merged neighbours", &mut failures);
    heap.free(big);

    println!("\n===== REALLOC =====");
    let r = heap.malloc(20);
    if !r.is_null() {
      ptr::copy_nonoverlapping(b"hello\0".as_ptr(), r, 6);
    }
    let grown = heap.realloc(r, 100);
    report(
      bytes(grown, 6) == Some(&b"hello\0"[..]),
      "realloc grow preserves data",
      &mut failures,
    );
    // A failed realloc leaves the old block live.
    let r = if grown.is_null() { r } else { grown };
    let shrunk = heap.realloc(r, 10);
    report(
      bytes(shrunk, 6) == Some(&b"hello\0"[..]),
      "realloc shrink preserves data",
      &mut failures,
    );
    heap.free(if shrunk.is_null() { r } else { shrunk });

    println!("\n===== SCRIBBLE =====");
    heap.set_scribble(true);
    let s = heap.malloc(64);
    report(
      bytes(s, 64).is_some_and(|s| s.iter().all(|&x| x == SCRIBBLE_BYTE)),
      "scribble fills fresh memory",
      &mut failures,
    );
    heap.free(s);
    heap.set_scribble(config.scribble);

    println!("\n===== ALIGNED ALLOCATION =====");
    let aligned = heap.memalign(256, 100);
    report(
      !aligned.is_null() && aligned as usize % 256 == 0,
      "memalign(256, 100) is 256-byte aligned",
      &mut failures,
    );
    report(heap.validate().is_ok(), "slack in front is a free block", &mut failures);
    heap.free(aligned);

    println!("\n===== LARGE ALLOCATION =====");
    print_program_break("before large alloc");
    let large = heap.malloc(64 * 1024);
    report(!large.is_null(), "64 KiB allocation succeeds", &mut failures);
    print_program_break("after large alloc");
    heap.free(large);
    pause(step);

    println!("\n===== LEAK CHECK =====");
    let l1 = heap.malloc(100);
    let l2 = heap.malloc(200);
    heap.set_name(l2, "leak");
    heap.free(l1);
    println!("(leak check should report exactly 1 block)");
    let leaks = heap.leak_check();
    report(leaks.blocks == 1, "leak check found the live block", &mut failures);
    heap.free(l2);

    report(heap.validate().is_ok(), "heap is consistent", &mut failures);
  }

  println!("\n{failures} failure(s)");
  if failures > 0 {
    std::process::exit(1);
  }
}

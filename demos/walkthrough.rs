use tagalloc::{Allocator, ArenaSource, Block};

/// Prints every block between the prologue and the epilogue, followed by the
/// checker's verdict.
fn print_heap(
  label: &str,
  allocator: &Allocator<ArenaSource>,
) {
  println!("\n[{label}]");
  for info in allocator.blocks() {
    println!(
      "  {:>#8x}  {:>6} bytes  {}",
      info.block.offset(),
      info.size,
      if info.allocated { "allocated" } else { "free" }
    );
  }
  match allocator.check() {
    Ok(()) => println!("  check: healthy"),
    Err(violation) => println!("  check: {violation}"),
  }
}

fn describe(
  name: &str,
  block: Block,
) {
  println!("{name} = {block:?}");
}

fn main() {
  // RUST_LOG=trace shows every split, coalesce and growth decision.
  env_logger::init();

  let mut allocator = match Allocator::initialize(ArenaSource::default()) {
    Ok(allocator) => allocator,
    Err(err) => {
      eprintln!("initialize failed: {err}");
      return;
    }
  };
  print_heap("initialized", &allocator);

  // --------------------------------------------------------------------
  // 1) Two small allocations, carved from the initial chunk.
  // --------------------------------------------------------------------
  let p = allocator.allocate(16).expect("allocate p");
  let q = allocator.allocate(8).expect("allocate q");
  describe("p", p);
  describe("q", q);
  print_heap("after allocating p and q", &allocator);

  // --------------------------------------------------------------------
  // 2) Free p and allocate again. Next-fit resumes at the freed block.
  // --------------------------------------------------------------------
  allocator.release(p).expect("release p");
  let s = allocator.allocate(8).expect("allocate s");
  describe("s", s);
  println!("s reuses p's block? {}", s == p);
  print_heap("after release(p) + allocate(8)", &allocator);

  // --------------------------------------------------------------------
  // 3) Grow q in place by taking bytes from the free block behind it.
  // --------------------------------------------------------------------
  allocator.payload_mut(q).expect("payload q").fill(0x51);
  let r = allocator
    .resize(Some(q), 16)
    .expect("resize q")
    .expect("non-zero resize yields a block");
  describe("r", r);
  println!("resized in place? {}", r == q);
  print_heap("after resize(q, 16)", &allocator);

  // --------------------------------------------------------------------
  // 4) A request larger than the chunk forces the heap to grow.
  // --------------------------------------------------------------------
  let big = allocator.allocate(10_000).expect("allocate big");
  describe("big", big);
  print_heap("after allocate(10000)", &allocator);

  println!("\n{:#?}", allocator.stats());
}

// ── Connection-scoped concurrency ──
//
// `SessionScope` is the region tasks are spawned into; the allocator
// rebinds it on every connection transition.

mod allocator;
mod scope;

pub(crate) use allocator::SessionAllocator;
pub use scope::{SessionContext, SessionScope};

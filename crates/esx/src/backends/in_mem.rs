//! 🧠 In-memory ends of the pipe, for tests and `--dry-run`.
//!
//! The [`InMemorySource`] hands out pages it was given up front. The [`InMemorySink`] keeps
//! every payload behind an `Arc<Mutex<...>>` so the caller can look afterwards. No disk, no
//! network.

mod in_mem_sink;
mod in_mem_source;

pub(crate) use in_mem_sink::InMemorySink;
pub(crate) use in_mem_source::InMemorySource;

//! wp-pool: Asynchronous sample file pool
//!
//! Bridges a hard real-time audio thread and the disk. Every registered
//! sample keeps a small preload head resident so note-on produces audio
//! instantly; the full tail is decoded in the background once a note
//! actually plays, and reclaimed again after the sample has sat idle.
//!
//! Goals:
//! - The audio thread NEVER waits for disk
//! - The audio thread NEVER blocks on the background workers
//! - Promise requests are a bounded try-push plus atomic reads
//! - All heavy decode and deallocation happens off the hot paths

mod entry;
mod garbage;
mod loader;
mod metrics;
mod pool;
mod priority;
mod queue;
mod thread_pool;

pub use entry::{CachedFile, FileHandle, Status, TailView};
pub use metrics::{DebugLoadLog, LoadTimeLog};
pub use pool::FilePool;
pub use thread_pool::{Task, ThreadPool};

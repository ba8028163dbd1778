//! TaskStore - persistent scheduled-task and watcher-cursor storage
//!
//! Two small JSON-document stores shared by the daemon loop:
//!
//! - [`TaskStore`] holds the scheduled-task collection. Every mutation is
//!   written through to disk atomically (temp file + rename), so the file
//!   on disk is always either the previous consistent document or the new
//!   one, never a torn write.
//! - [`CursorStore`] holds one opaque cursor per watcher (last-seen mail
//!   file, last-seen message line, last-seen commit SHA) plus a bounded
//!   set of recently seen event ids used for deduplication across daemon
//!   restarts.
//!
//! Both stores assume a single daemon instance; read-modify-write cycles
//! are sequenced by the daemon's tick loop, not by file locks.

pub mod cursor;
pub mod store;
pub mod task;

pub use cursor::{CursorStore, WatcherCursor};
pub use store::{StoreError, TaskStore};
pub use task::{Schedule, ScheduledTask, TaskOrigin, TaskStatus};

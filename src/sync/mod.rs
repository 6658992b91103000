//! Client-side synchronization of student records.
//!
//! - `debounce`: generic trailing-edge write coalescer with cancel/flush
//! - `engine`: cache of student records, optimistic writes, flush-on-logout

mod debounce;
mod engine;

pub use engine::{SyncEngine, SyncSettings};

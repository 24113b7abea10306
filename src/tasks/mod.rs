//! Background Tasks Module
//!
//! Helpers an embedding application may spawn next to the engine.
//!
//! # Tasks
//! - Cache Cleanup: Removes expired entries of configured keys at a fixed interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;

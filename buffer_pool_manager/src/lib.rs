//! A latch-per-frame buffer pool manager.
//!
//! This is the one reference [`common::api::BufferPool`] implementation the
//! index latches against. Each frame is backed by a real `RwLock`, so the
//! index's crab-latching protocol has something genuine to crab against,
//! unlike an actor/mailbox variant that serializes every access through a
//! single thread and never actually contends on a latch.

pub mod manager;

pub use manager::ConcurrentBufferPool;

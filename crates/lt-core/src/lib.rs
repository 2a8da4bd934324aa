//! Location Tracer core library.
//!
//! Buffers periodically-observed position samples in a bounded in-memory
//! store and flushes them to an injected reporting sink on a timer, while a
//! listening session independently governs when observation is active:
//!
//! - Bounded FIFO sample store with eviction hooks and acceptance tracking
//! - Transform stage mapping raw observations into stored samples
//! - Repeating and self-correcting alarm primitives
//! - Listening and reporting session state machines
//!
//! Platform position sensing, timers, and the reporting sink are consumed
//! as capability traits; see `capabilities`.

pub mod alarm;
pub mod capabilities;
pub mod clock;
pub mod logging;
pub mod store;
pub mod tracer;
pub mod transform;

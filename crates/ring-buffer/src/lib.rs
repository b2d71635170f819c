//! Bounded History Buffer
//!
//! Fixed-capacity buffer that evicts its oldest entry on overflow. Backs the
//! rolling FPS and detection-count windows and the presenter's message log.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};

//! Utility functions and supporting infrastructure.
//!
//! Byte-order serialization for chunk records, bit-level helpers for DSD
//! payload reshuffling, the error taxonomy and frame buffer recycling.

pub mod bits;
pub mod byteorder;
pub mod errors;
pub mod frame_pool;

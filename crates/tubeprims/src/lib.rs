//! Non-blocking, record-preserving local tubes for event streams.
//!
//! tubeprims moves fixed-size records between a producer and a consumer in
//! different threads or processes over seqpacket socket pairs, without ever
//! splitting or merging a record and without ever blocking.
//!
//! # Crate Structure
//!
//! - [`transport`]: the tube itself, capability envelopes, readiness helpers
//! - [`records`]: fixed-size record batching with framing enforcement

/// Re-export transport types.
pub mod transport {
    pub use tubeprims_transport::*;
}

/// Re-export record types.
pub mod records {
    pub use tubeprims_records::*;
}

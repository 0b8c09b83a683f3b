//! Fixed-size record batching over tubeprims tubes.
//!
//! Each batch of records travels as one seqpacket message:
//! - [`send_records`] writes `count * record_size` bytes in a single call
//! - [`recv_records`] reads at most `count * record_size` bytes in a single call
//!
//! Records are never split or merged. A transfer that contradicts this
//! terminates the process through [`FramingViolation::abort`].

pub mod codec;
pub mod error;
pub mod marshal;
pub mod receiver;
pub mod sender;
pub mod violation;

pub use codec::{decode_records, encode_records, Record};
pub use error::{RecordError, Result};
pub use marshal::{recv_records, send_records};
pub use receiver::RecordReceiver;
pub use sender::RecordSender;
pub use violation::{Direction, FramingViolation};

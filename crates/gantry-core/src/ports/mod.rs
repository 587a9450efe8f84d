//! Ports: the abstraction seams of the engine.
//!
//! Each trait hides an external concern (durable storage, output encoding,
//! wall-clock time) so implementations can be swapped without touching the
//! execution logic.

pub mod clock;
pub mod codec;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::codec::{Codec, CodecError};
pub use self::store::{Store, StoreError, StoreKey, StoreRef};

//! Stack configuration trait.

use crate::{link::Transmitter, time::Timer};
use rand_core::RngCore;

/// Trait for Link Layer stack configurations.
///
/// This trait defines the hardware-specific types the core relies on. Every application provides
/// one type implementing this trait, tied to its concrete timer, radio, and entropy source.
///
/// L2CAP/ATT/GATT are out of scope of this crate, so unlike a full Host stack's configuration
/// trait, this one carries no channel mapper or packet queue type.
pub trait Config {
    /// A time source with microsecond resolution.
    type Timer: Timer;

    /// The BLE packet transmitter (radio).
    type Transmitter: Transmitter;

    /// A source of random bytes, used to generate the per-connection access address, CRC init and
    /// hop increment when emitting `CONNECT_REQ` (see `link::advertising::ConnectRequestData`).
    type Rng: RngCore;
}

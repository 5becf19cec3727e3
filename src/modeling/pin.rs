//! Pins are the opaque identifiers of communication channels. A pin is
//! unique for the life of the process, so models in different simulators can
//! never be cross-wired by accident.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PIN: AtomicU64 = AtomicU64::new(0);

/// An opaque channel identifier. Couplings are declared between pins, and a
/// pin may terminate at a component input (see
/// [`Coupled::connect`](super::Coupled::connect)). Pin identity is stable
/// for the lifetime of the model that declared it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pin(u64);

impl Pin {
    /// Creates a fresh pin, distinct from every other pin in the process.
    pub fn new() -> Self {
        Self(NEXT_PIN.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Pin {
    /// Equivalent to [`Pin::new`]: every default-constructed pin is fresh.
    fn default() -> Self {
        Self::new()
    }
}

/// A value stamped with the pin it travels on.
#[derive(Clone, Debug, PartialEq)]
pub struct PinValue<X> {
    pub pin: Pin,
    pub value: X,
}

impl<X> PinValue<X> {
    pub fn new(pin: Pin, value: X) -> Self {
        Self { pin, value }
    }
}

/// Per-step message collection of a model. Insertion order is preserved and
/// duplicates are allowed, but iteration order is not part of the contract.
/// Bags are cleared, not reallocated, at step boundaries.
pub type Bag<X> = Vec<PinValue<X>>;

//! Host-facing events and the deferred-dispatch queue that carries them.
//!
//! Modeled on `original_source/include/blessed/events.h`: the radio/timer ISR path never calls
//! directly into host code. Instead it pushes a small [`Event`] onto a fixed-capacity queue, which
//! a lower-priority "software interrupt" (in practice, whatever polls [`LinkLayer::next_event`])
//! drains and hands to the application.

use crate::link::DeviceAddress;
use heapless::{
    consts::U4,
    spsc::{MultiCore, Queue},
};

/// Reason a connection ended, reported in [`Event::DisconnectComplete`].
///
/// Values are the subset of HCI error codes this core can actually produce, carried over from
/// `errcodes.h`. `RemoteLowResources` and `RemotePowerOff` round out the enum for completeness of
/// the HCI vocabulary even though nothing in this core emits them today (see `errcodes.h`'s
/// `BLE_HCI_*` constants) — a future transport may surface them out-of-band.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No valid packet was received within the supervision timeout.
    ConnectionTimeout,
    /// The peer sent `LL_TERMINATE_IND`.
    RemoteUserTerminated,
    /// Reserved HCI reason code `0x14`; not produced by this core yet.
    RemoteLowResources,
    /// Reserved HCI reason code `0x15`; not produced by this core yet.
    RemotePowerOff,
    /// The local host called `conn_terminate()`.
    LocalHostTerminated,
}

impl DisconnectReason {
    /// Returns the raw HCI error code for this reason.
    pub fn code(&self) -> u8 {
        match self {
            DisconnectReason::ConnectionTimeout => 0x08,
            DisconnectReason::RemoteUserTerminated => 0x13,
            DisconnectReason::RemoteLowResources => 0x14,
            DisconnectReason::RemotePowerOff => 0x15,
            DisconnectReason::LocalHostTerminated => 0x16,
        }
    }
}

/// A single host-facing notification produced by the Link Layer.
///
/// Carried through [`EventQueue`] from the radio/timer ISR context to the deferred-dispatch path;
/// every variant fits comfortably in a fixed byte budget (no heap, no `&dyn`).
#[derive(Debug, Copy, Clone)]
pub enum Event {
    /// A connection was successfully established (`conn_create` succeeded, or a peer connected to
    /// our advertisement).
    ConnectionComplete {
        /// Connection index; always 0 since this core supports a single simultaneous connection.
        index: u8,
        peer_addr: DeviceAddress,
    },
    /// The single connection ended.
    DisconnectComplete { index: u8, reason: DisconnectReason },
    /// The queued outgoing payload was transmitted and acknowledged.
    PacketsSent { index: u8 },
    /// A data payload was received and copied into the host's receive buffer.
    PacketsReceived { index: u8, length: u8 },
    /// A PDU was observed while scanning.
    AdvReport(AdvReport),
}

/// An observed advertising PDU, delivered while scanning (see `link::State::Scanning`).
#[derive(Debug, Copy, Clone)]
pub struct AdvReport {
    pub ty: crate::link::advertising::PduType,
    pub peer_addr: DeviceAddress,
    pub data: [u8; 31],
    pub len: u8,
}

impl AdvReport {
    /// Returns the AD structure payload actually carried by this report.
    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }
}

/// Fixed-capacity single-producer/single-consumer queue carrying [`Event`]s out of the
/// radio/timer ISR path.
///
/// Sized for 4 pending events, matching the Timer Service's `SLOTS` constant; this is a
/// deliberately small, non-growable buffer (`no_std`, no `alloc`), consistent with the rest of the
/// crate's `heapless`-backed buffers (`link::queue::SimpleQueue`).
pub struct EventQueue {
    inner: Queue<Event, U4, u8, MultiCore>,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            inner: Queue(heapless::i::Queue::u8()),
        }
    }

    /// Pushes an event, dropping the oldest pending event if the queue is full.
    ///
    /// Host event delivery is advisory in this core (there's no backpressure channel to the
    /// radio ISR), so silently overwriting a stale slot beats blocking or panicking in an ISR.
    pub fn push(&mut self, event: Event) {
        if self.inner.enqueue(event).is_err() {
            let _ = self.inner.dequeue();
            let _ = self.inner.enqueue(event);
        }
    }

    /// Pops the oldest pending event, if any.
    pub fn pop(&mut self) -> Option<Event> {
        self.inner.dequeue()
    }

    pub fn is_empty(&self) -> bool {
        !self.inner.ready()
    }
}

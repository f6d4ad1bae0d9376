//! The I<sup>2</sup>C controller hardware boundary.
//!
//! The transfer engine in [`crate::drivers::i2c`] is written against the
//! small set of peripheral primitives collected in the [`I2cHardware`]
//! trait, rather than against one vendor's register block. A board crate
//! implements the trait over the real registers (on the MSPM0 this is a
//! thin veneer over the DriverLib controller API); the test suite
//! implements it with a scripted mock peripheral. The engine's correctness
//! depends only on the contracts documented here.

use mycelium_bitfield::bitfield;

/// A 7-bit target address.
///
/// The controller only ever addresses a single target per transfer, and
/// only in 7-bit mode; 10-bit addressing is not supported by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr(u8);

impl Addr {
    /// Const-constructs an address, masking to the low 7 bits.
    pub const fn new(addr: u8) -> Self {
        Self(addr & 0x7f)
    }

    /// The raw address bits, right-aligned (no R/W bit).
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Direction of a transfer, from the controller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Controller receives from the target.
    Read,
    /// Controller transmits to the target.
    Write,
}

/// A pending controller interrupt event, as reported by the peripheral's
/// interrupt index register.
///
/// The engine services exactly one event per interrupt invocation; the
/// hardware keeps the interrupt line asserted while further events are
/// pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// An RX transfer finished (STOP sent after the last byte).
    RxDone,
    /// A TX transfer finished.
    TxDone,
    /// The RX FIFO crossed its watermark and has bytes to drain.
    RxFifoTrigger,
    /// The TX FIFO crossed its watermark and has room to refill.
    TxFifoTrigger,
    /// Lost arbitration to another controller mid-transaction.
    ArbitrationLost,
    /// The target refused a byte (or is absent).
    Nack,
    /// RX FIFO completely full.
    RxFifoFull,
    /// TX FIFO completely empty.
    TxFifoEmpty,
    /// A START condition was put on the bus.
    Start,
    /// A STOP condition was put on the bus.
    Stop,
    /// DMA event channel 1 finished. Unused without DMA transfers.
    Dma1Done,
    /// DMA event channel 2 finished. Unused without DMA transfers.
    Dma2Done,
}

bitfield! {
    /// Controller status bits, as read from the peripheral's
    /// controller-status register.
    pub struct BusStatus<u32> {
        /// `IDLE`: the controller's transfer state machine is idle.
        ///
        /// Clear from the moment a transfer command is accepted until the
        /// closing STOP has been driven. Distinct from `BUSY_BUS`, which
        /// watches the wire rather than this controller.
        pub const IDLE: bool;
        /// `BUSY_BUS`: the bus wire is held by an ongoing transaction
        /// (ours or anyone's).
        pub const BUSY_BUS: bool;
        /// `ERROR`: the controller latched a bus-level error during the
        /// last transfer. Sticky until the next transfer command.
        pub const ERROR: bool;
    }
}

impl BusStatus {
    pub fn is_idle(self) -> bool {
        self.get(Self::IDLE)
    }

    pub fn is_busy_bus(self) -> bool {
        self.get(Self::BUSY_BUS)
    }

    pub fn is_error(self) -> bool {
        self.get(Self::ERROR)
    }
}

/// The peripheral primitives consumed by the transfer engine.
///
/// All methods take `&self`: the peripheral is a shared resource touched
/// from both the foreground and the interrupt context, exactly like a PAC
/// register block. Implementations are expected to be interior-mutable and
/// must tolerate being called from either context.
pub trait I2cHardware {
    /// Copy bytes into the TX FIFO, up to the FIFO's free space.
    ///
    /// Returns how many bytes the FIFO accepted; the caller owns the
    /// remainder.
    fn fill_tx_fifo(&self, bytes: &[u8]) -> usize;

    /// `true` when the RX FIFO holds no pending bytes.
    fn rx_fifo_empty(&self) -> bool;

    /// Pop one byte from the RX FIFO.
    ///
    /// Popping has the side effect of making FIFO room; bytes must be
    /// popped even when software intends to discard them, or the FIFO
    /// backpressures and stalls the bus.
    fn take_rx_byte(&self) -> u8;

    /// The highest-priority pending, enabled interrupt event, or `None`.
    ///
    /// Reading acknowledges the returned event; the next call reports the
    /// next pending one.
    fn pending_event(&self) -> Option<Event>;

    /// Enable or disable the TX FIFO watermark (refill) interrupt source.
    ///
    /// Disabled whenever the whole remaining payload already fits in the
    /// FIFO.
    fn set_refill_interrupt(&self, enabled: bool);

    /// Mask or unmask the controller's event interrupt as a whole.
    ///
    /// While masked, no events are delivered to the interrupt handler;
    /// pending events are held, not dropped.
    fn set_event_interrupt(&self, enabled: bool);

    /// Snapshot the controller status bits.
    fn status(&self) -> BusStatus;

    /// Issue a transfer command for `len` bytes to `addr`.
    ///
    /// The hardware frames the transaction itself: START, the address byte
    /// with the R/W bit for `dir`, byte clocking, and the closing STOP
    /// once `len` bytes have crossed the bus.
    fn start_transfer(&self, addr: Addr, dir: Direction, len: usize);

    /// Suspend the calling context until the next hardware event.
    ///
    /// A WFE-style low-power wait, not a spin. May also return spuriously;
    /// callers re-check their condition in a loop.
    fn wait_for_event(&self);
}

//! Interrupt-driven I<sup>2</sup>C controller transfer engine.
//!
//! The engine splits a transfer across two execution contexts. The
//! foreground half ([`I2cController`]) primes the hardware, starts the
//! transfer, and blocks until it resolves; the interrupt half
//! ([`I2cBus::handle_interrupt`]) services FIFO watermark and completion
//! events in short bursts and advances the shared [`Status`] the
//! foreground is waiting on.
//!
//! There is no lock around the shared state. Each field has exactly one
//! writing context: the foreground writes `requested` lengths and the
//! `*Started` statuses, the interrupt handler writes transfer progress and
//! every other status. The status itself lives in an atomic cell, and the
//! foreground only touches the rest of the shared data while the
//! controller's event interrupt is masked (the guard returned by
//! `I2cBus::lock`).
//!
//! Payloads larger than the hardware FIFO are chunked: the foreground
//! fills the FIFO once, and leaves the refill interrupt enabled only if
//! bytes remain. Each refill event then tops the FIFO up from the
//! unsent tail until the payload is exhausted.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use portable_atomic::{AtomicU8, Ordering};

use crate::i2c::{Addr, Direction, Event, I2cHardware};

/// Capacity of the TX and RX transfer buffers, in bytes.
///
/// Fixed at compile time. Transfers are chunked through the hardware FIFO,
/// so this bounds a single `write`/`read` call, not the FIFO depth.
pub const MAX_TRANSFER_LEN: usize = 64;

/// Transfer status, the sole synchronization signal between the foreground
/// and the interrupt handler.
///
/// Transitions follow
/// `Idle → {TxStarted, RxStarted} → {TxInProgress, RxInProgress}* →
/// {TxComplete, RxComplete} | Error`. The foreground performs only the
/// `Idle` reset and the `*Started` transitions; the interrupt handler
/// performs every transition out of `*Started`/`*InProgress`. `Error` and
/// `*Complete` are terminal until the next `write`/`read` resets the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// No transfer in flight.
    Idle = 0,
    /// A TX transfer has been primed and started.
    TxStarted,
    /// The interrupt handler has begun refilling the TX FIFO.
    TxInProgress,
    /// The TX transfer finished.
    TxComplete,
    /// An RX transfer has been started.
    RxStarted,
    /// The interrupt handler has begun draining the RX FIFO.
    RxInProgress,
    /// The RX transfer finished.
    RxComplete,
    /// The transfer failed before making progress (NACK or lost
    /// arbitration).
    Error,
}

impl Status {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Status::Idle,
            1 => Status::TxStarted,
            2 => Status::TxInProgress,
            3 => Status::TxComplete,
            4 => Status::RxStarted,
            5 => Status::RxInProgress,
            6 => Status::RxComplete,
            7 => Status::Error,
            _ => unreachable!("status cell only ever holds a Status value"),
        }
    }
}

/// One direction's transfer buffer: payload bytes plus the two counters
/// that track a transfer through the FIFO.
///
/// Invariant: `pos <= len <= MAX_TRANSFER_LEN`. `len` is written once by
/// the foreground when the transfer is primed; `pos` advances only in the
/// interrupt handler (and in the foreground's initial FIFO fill, before
/// the transfer starts).
struct PacketBuf {
    buf: [u8; MAX_TRANSFER_LEN],
    /// Requested transfer length.
    len: usize,
    /// Bytes that have crossed the FIFO boundary so far.
    pos: usize,
}

impl PacketBuf {
    const fn new() -> Self {
        Self {
            buf: [0; MAX_TRANSFER_LEN],
            len: 0,
            pos: 0,
        }
    }

    /// Stage an outgoing payload.
    fn load(&mut self, bytes: &[u8]) {
        self.buf[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        self.pos = 0;
    }

    /// Reset the counters for an incoming transfer of `len` bytes.
    fn prepare(&mut self, len: usize) {
        self.len = len;
        self.pos = 0;
    }

    /// The staged bytes that have not yet been queued into the FIFO.
    fn unsent(&self) -> &[u8] {
        &self.buf[self.pos..self.len]
    }

    /// The bytes captured so far.
    fn captured(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

/// Data shared between the foreground and the interrupt handler.
struct BusData {
    tx: PacketBuf,
    rx: PacketBuf,
    /// Error recorded by the interrupt handler when it parks the status at
    /// [`Status::Error`].
    err: Option<ErrorKind>,
}

/// Per-bus shared state. One instance exists per bus, in a `static`:
///
/// ```no_run
/// # use mspm0_core::drivers::i2c::I2cBus;
/// static I2C0_BUS: I2cBus = I2cBus::new();
/// ```
///
/// The platform's interrupt vector for the bus calls
/// [`handle_interrupt`](Self::handle_interrupt); the foreground hands the
/// same reference to [`I2cController::new`].
pub struct I2cBus {
    status: AtomicU8,
    data: UnsafeCell<BusData>,
}

// Field access is partitioned between the two contexts; see the module
// docs and `lock`.
unsafe impl Sync for I2cBus {}

impl I2cBus {
    pub const fn new() -> Self {
        Self {
            status: AtomicU8::new(Status::Idle as u8),
            data: UnsafeCell::new(BusData {
                tx: PacketBuf::new(),
                rx: PacketBuf::new(),
                err: None,
            }),
        }
    }

    /// The current transfer status.
    pub fn status(&self) -> Status {
        Status::from_bits(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Claim foreground access to the shared data.
    ///
    /// Masks the controller's event interrupt while the guard is held, so
    /// the interrupt handler cannot observe the data mid-update; the
    /// interrupt is unmasked again when the guard drops.
    #[must_use]
    fn lock<'a, H: I2cHardware>(&'a self, hw: &'a H) -> BusGuard<'a, H> {
        hw.set_event_interrupt(false);
        let data = unsafe { &mut *self.data.get() };
        BusGuard { data, hw }
    }

    /// Service one pending controller event.
    ///
    /// This is the bus's interrupt handler; the platform's vector for the
    /// bus interrupt calls it with the peripheral handle. It never blocks,
    /// and its work per invocation is bounded by the FIFO depth. Apart
    /// from the interrupt vector, callers must hold the event interrupt
    /// masked (the shared data is otherwise the handler's to write).
    pub fn handle_interrupt<H: I2cHardware>(&self, hw: &H) {
        let data = unsafe {
            // safety: this function is only entered from the bus interrupt
            // vector, which the foreground masks before touching `data`.
            &mut *self.data.get()
        };
        let Some(event) = hw.pending_event() else {
            return;
        };
        tracing::trace!(?event, status = ?self.status(), "I2C event");

        match event {
            Event::RxDone => self.set_status(Status::RxComplete),
            Event::TxDone => {
                hw.set_refill_interrupt(false);
                self.set_status(Status::TxComplete);
            }
            Event::RxFifoTrigger => {
                self.set_status(Status::RxInProgress);
                // Drain everything currently available. Bytes beyond the
                // requested length must still come out of the FIFO (it
                // backpressures the bus otherwise); they just don't land
                // in the buffer.
                while !hw.rx_fifo_empty() {
                    let byte = hw.take_rx_byte();
                    if data.rx.pos < data.rx.len {
                        data.rx.buf[data.rx.pos] = byte;
                        data.rx.pos += 1;
                    }
                }
            }
            Event::TxFifoTrigger => {
                self.set_status(Status::TxInProgress);
                if data.tx.pos < data.tx.len {
                    let queued = hw.fill_tx_fifo(data.tx.unsent());
                    data.tx.pos += queued;
                }
            }
            Event::ArbitrationLost | Event::Nack => {
                // Only a refusal before any byte made progress aborts the
                // transfer — a NACK here means the target is absent.
                let status = self.status();
                if status == Status::TxStarted || status == Status::RxStarted {
                    let err = match event {
                        Event::Nack => {
                            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
                        }
                        _ => ErrorKind::ArbitrationLoss,
                    };
                    tracing::warn!(?err, "I2C transfer aborted");
                    data.err = Some(err);
                    self.set_status(Status::Error);
                }
            }
            // Nothing to service for these.
            Event::RxFifoFull
            | Event::TxFifoEmpty
            | Event::Start
            | Event::Stop
            | Event::Dma1Done
            | Event::Dma2Done => {}
        }
    }
}

impl Default for I2cBus {
    fn default() -> Self {
        Self::new()
    }
}

struct BusGuard<'a, H: I2cHardware> {
    data: &'a mut BusData,
    hw: &'a H,
}

impl<H: I2cHardware> Drop for BusGuard<'_, H> {
    fn drop(&mut self) {
        self.hw.set_event_interrupt(true);
    }
}

impl<H: I2cHardware> Deref for BusGuard<'_, H> {
    type Target = BusData;

    fn deref(&self) -> &Self::Target {
        &*self.data
    }
}

impl<H: I2cHardware> DerefMut for BusGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.data
    }
}

/// The foreground half of the engine: blocking `write`/`read` over one
/// bus.
///
/// Callers are responsible for sequencing — the engine supports exactly
/// one transfer in flight, which the blocking API enforces as long as a
/// single context owns the controller.
pub struct I2cController<H: I2cHardware> {
    hw: H,
    bus: &'static I2cBus,
}

impl<H: I2cHardware> I2cController<H> {
    pub fn new(hw: H, bus: &'static I2cBus) -> Self {
        Self { hw, bus }
    }

    /// Send `bytes` to `addr`, blocking until the transfer resolves.
    ///
    /// On success the whole payload was clocked out and acknowledged. On
    /// failure no partial-success indication is given; the transfer is not
    /// retried.
    ///
    /// # Panics
    ///
    /// If `bytes` exceeds [`MAX_TRANSFER_LEN`].
    #[tracing::instrument(
        level = tracing::Level::DEBUG,
        skip(self, bytes),
        fields(len = bytes.len()),
    )]
    pub fn write(&mut self, addr: Addr, bytes: &[u8]) -> Result<(), ErrorKind> {
        let len = bytes.len();
        assert!(len <= MAX_TRANSFER_LEN, "payload exceeds transfer buffer");

        {
            let mut guard = self.bus.lock(&self.hw);
            self.bus.set_status(Status::Idle);
            guard.err = None;
            guard.tx.load(bytes);

            // Prime the FIFO. The fill primitive reports how many bytes
            // fit; the refill interrupt stays enabled only if the FIFO
            // couldn't take the whole payload.
            let queued = guard.hw.fill_tx_fifo(guard.tx.unsent());
            guard.tx.pos = queued;
            guard.hw.set_refill_interrupt(queued < len);

            self.bus.set_status(Status::TxStarted);
        }

        // Don't start on top of a transaction that is still winding down.
        while !self.hw.status().is_idle() {}
        self.hw.start_transfer(addr, Direction::Write, len);

        self.wait_while_in_flight(Status::TxComplete);
        while self.hw.status().is_busy_bus() {}

        if self.bus.status() == Status::Error {
            let mut guard = self.bus.lock(&self.hw);
            let err = guard.err.take().unwrap_or(ErrorKind::Other);
            tracing::warn!(?err, "TX transfer failed");
            return Err(err);
        }
        // The controller can latch a bus error the handler never saw;
        // that error is as terminal as a NACK.
        if self.hw.status().is_error() {
            tracing::warn!("controller error flag set after TX");
            return Err(ErrorKind::Bus);
        }
        while !self.hw.status().is_idle() {}

        tracing::debug!("TX transfer complete");
        Ok(())
    }

    /// Read `buf.len()` bytes from `addr` into `buf`, blocking until the
    /// transfer resolves.
    ///
    /// Returns the number of bytes captured, which equals the request on
    /// any successful transfer.
    ///
    /// # Panics
    ///
    /// If `buf` exceeds [`MAX_TRANSFER_LEN`].
    #[tracing::instrument(
        level = tracing::Level::DEBUG,
        skip(self, buf),
        fields(len = buf.len()),
    )]
    pub fn read(&mut self, addr: Addr, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        let len = buf.len();
        assert!(len <= MAX_TRANSFER_LEN, "request exceeds transfer buffer");

        {
            let mut guard = self.bus.lock(&self.hw);
            self.bus.set_status(Status::Idle);
            guard.err = None;
            guard.rx.prepare(len);
            self.bus.set_status(Status::RxStarted);
        }

        while !self.hw.status().is_idle() {}
        self.hw.start_transfer(addr, Direction::Read, len);

        self.wait_while_in_flight(Status::RxComplete);
        while self.hw.status().is_busy_bus() {}

        if self.bus.status() == Status::Error {
            let mut guard = self.bus.lock(&self.hw);
            let err = guard.err.take().unwrap_or(ErrorKind::Other);
            tracing::warn!(?err, "RX transfer failed");
            return Err(err);
        }
        if self.hw.status().is_error() {
            tracing::warn!("controller error flag set after RX");
            return Err(ErrorKind::Bus);
        }
        while !self.hw.status().is_idle() {}

        let guard = self.bus.lock(&self.hw);
        let captured = guard.rx.captured();
        buf[..captured.len()].copy_from_slice(captured);
        tracing::debug!(captured = captured.len(), "RX transfer complete");
        Ok(captured.len())
    }

    /// Suspend until the interrupt handler parks the status at `done` or
    /// [`Status::Error`].
    ///
    /// This is the one cooperative wait in a transfer; the hardware's
    /// wait-for-event primitive may wake spuriously, so the status is
    /// re-checked each time around.
    fn wait_while_in_flight(&self, done: Status) {
        loop {
            let status = self.bus.status();
            if status == done || status == Status::Error {
                return;
            }
            self.hw.wait_for_event();
        }
    }
}

//! A scripted mock I<sup>2</sup>C peripheral for the test suite.
//!
//! [`MockI2c`] implements [`I2cHardware`] over a simulated 16-deep FIFO
//! pair and a scripted bus partner. The simulation advances inside
//! [`I2cHardware::wait_for_event`]: each call plays one burst of bus
//! traffic — clocking FIFO bytes onto the wire, or pushing supplied bytes
//! into the RX FIFO — then raises the matching events and runs the bus's
//! interrupt handler, standing in for the interrupt that would preempt a
//! real WFE.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use crate::drivers::i2c::I2cBus;
use crate::i2c::{Addr, BusStatus, Direction, Event, I2cHardware};

/// Depth of the mock's hardware FIFOs, in bytes.
pub const FIFO_DEPTH: usize = 16;

/// Failure and supply scripting for a [`MockI2c`].
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Bytes the bus partner supplies to RX transfers, in order.
    pub supply: Vec<u8>,
    /// Refuse the first byte of every transfer.
    pub nack_on_start: bool,
    /// Lose arbitration at the start of every transfer.
    pub lose_arbitration: bool,
    /// Push the whole remaining supply at an RX transfer, even past the
    /// requested length.
    pub deliver_excess: bool,
    /// Latch the controller error flag when a transfer completes.
    pub latch_error_flag: bool,
    /// Events to raise once, as soon as a transfer is underway.
    pub inject_mid_transfer: Vec<Event>,
}

/// Record of one framed transfer the controller issued.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub addr: Addr,
    pub dir: Direction,
    /// For TX, the bytes clocked onto the wire; for RX, the bytes the
    /// partner pushed toward the controller.
    pub wire: Vec<u8>,
}

struct Xfer {
    dir: Direction,
    /// Total bytes this transfer moves: the request for TX, the scripted
    /// delivery for RX.
    total: usize,
    progress: usize,
}

struct MockState {
    script: Script,
    supply: VecDeque<u8>,
    tx_fifo: VecDeque<u8>,
    rx_fifo: VecDeque<u8>,
    pending: VecDeque<Event>,
    current: Option<Xfer>,
    busy: bool,
    error_flag: bool,
    refill_irq: bool,
    event_irq: bool,
    refill_was_enabled: bool,
    refill_events: usize,
    fills: Vec<usize>,
    event_irq_toggles: Vec<bool>,
    transfers: Vec<TransferRecord>,
}

#[derive(Clone)]
pub struct MockI2c {
    state: Rc<RefCell<MockState>>,
    bus: &'static I2cBus,
}

impl MockI2c {
    pub fn new(bus: &'static I2cBus, script: Script) -> Self {
        let supply = script.supply.iter().copied().collect();
        Self {
            state: Rc::new(RefCell::new(MockState {
                script,
                supply,
                tx_fifo: VecDeque::new(),
                rx_fifo: VecDeque::new(),
                pending: VecDeque::new(),
                current: None,
                busy: false,
                error_flag: false,
                refill_irq: false,
                // the vector is enabled from reset, like the NVIC line on
                // the real part
                event_irq: true,
                refill_was_enabled: false,
                refill_events: 0,
                fills: Vec::new(),
                event_irq_toggles: Vec::new(),
                transfers: Vec::new(),
            })),
            bus,
        }
    }

    /// Every transfer the controller issued, in order.
    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.state.borrow().transfers.clone()
    }

    /// Bytes accepted by each `fill_tx_fifo` call, in order.
    pub fn fill_sizes(&self) -> Vec<usize> {
        self.state.borrow().fills.clone()
    }

    /// How many TX refill events fired.
    pub fn refill_events(&self) -> usize {
        self.state.borrow().refill_events
    }

    /// Whether the refill interrupt source was ever enabled.
    pub fn refill_interrupt_was_enabled(&self) -> bool {
        self.state.borrow().refill_was_enabled
    }

    /// Every value passed to `set_event_interrupt`, in order.
    pub fn event_interrupt_toggles(&self) -> Vec<bool> {
        self.state.borrow().event_irq_toggles.clone()
    }

    pub fn event_interrupt_enabled(&self) -> bool {
        self.state.borrow().event_irq
    }

    fn raise(&self, event: Event) {
        self.state.borrow_mut().pending.push_back(event);
    }

    /// Run the interrupt handler until no deliverable events remain.
    fn pump(&self) {
        loop {
            let quiet = {
                let st = self.state.borrow();
                st.pending.is_empty() || !st.event_irq
            };
            if quiet {
                return;
            }
            self.bus.handle_interrupt(self);
        }
    }

    /// Abort the transfer before its first byte, if the script says so.
    fn take_start_failure(&self) -> Option<Event> {
        let mut st = self.state.borrow_mut();
        let untouched = st.current.as_ref().map_or(false, |c| c.progress == 0);
        let (nack, arb) = (st.script.nack_on_start, st.script.lose_arbitration);
        if !(untouched && (nack || arb)) {
            return None;
        }

        st.error_flag = true;
        st.busy = false;
        st.current = None;
        Some(if nack {
            Event::Nack
        } else {
            Event::ArbitrationLost
        })
    }

    /// Play one burst of bus traffic for the in-flight transfer.
    fn advance(&self) {
        let dir = {
            let st = self.state.borrow();
            let cur = st
                .current
                .as_ref()
                .expect("wait_for_event with no transfer in flight");
            cur.dir
        };
        match dir {
            Direction::Write => self.advance_tx(),
            Direction::Read => self.advance_rx(),
        }
    }

    fn advance_tx(&self) {
        if let Some(event) = self.take_start_failure() {
            self.raise(event);
            self.pump();
            return;
        }

        let injected = {
            let mut st = self.state.borrow_mut();
            if st.current.as_ref().map_or(false, |c| c.progress > 0) {
                std::mem::take(&mut st.script.inject_mid_transfer)
            } else {
                Vec::new()
            }
        };
        for event in injected {
            self.raise(event);
            self.pump();
        }

        let (refill, done) = {
            let mut st = self.state.borrow_mut();
            let drained: Vec<u8> = st.tx_fifo.drain(..).collect();
            let latch = st.script.latch_error_flag;
            let refill_irq = st.refill_irq;

            let cur = st.current.as_mut().unwrap();
            cur.progress += drained.len();
            let done = cur.progress >= cur.total;

            st.transfers
                .last_mut()
                .unwrap()
                .wire
                .extend_from_slice(&drained);

            if done {
                st.busy = false;
                st.current = None;
                if latch {
                    st.error_flag = true;
                }
                (false, true)
            } else {
                assert!(
                    refill_irq,
                    "TX stalled: FIFO empty with payload unsent and the \
                     refill interrupt disabled"
                );
                st.refill_events += 1;
                (true, false)
            }
        };

        if refill {
            self.raise(Event::TxFifoTrigger);
            self.pump();
        }
        if done {
            self.raise(Event::TxDone);
            self.pump();
        }
    }

    fn advance_rx(&self) {
        if let Some(event) = self.take_start_failure() {
            self.raise(event);
            self.pump();
            return;
        }

        let (delivered, done) = {
            let mut st = self.state.borrow_mut();
            let latch = st.script.latch_error_flag;
            let room = FIFO_DEPTH - st.rx_fifo.len();
            let remaining = {
                let cur = st.current.as_ref().unwrap();
                cur.total - cur.progress
            };

            let mut burst = Vec::new();
            for _ in 0..room.min(remaining) {
                let byte = st.supply.pop_front().expect("scripted supply underflow");
                st.rx_fifo.push_back(byte);
                burst.push(byte);
            }

            let cur = st.current.as_mut().unwrap();
            cur.progress += burst.len();
            let done = cur.progress >= cur.total;

            st.transfers
                .last_mut()
                .unwrap()
                .wire
                .extend_from_slice(&burst);

            if done {
                st.busy = false;
                st.current = None;
                if latch {
                    st.error_flag = true;
                }
            }
            (!burst.is_empty(), done)
        };

        if delivered {
            self.raise(Event::RxFifoTrigger);
            self.pump();
        }
        if done {
            self.raise(Event::RxDone);
            self.pump();
        }
    }
}

impl I2cHardware for MockI2c {
    fn fill_tx_fifo(&self, bytes: &[u8]) -> usize {
        let mut st = self.state.borrow_mut();
        let space = FIFO_DEPTH - st.tx_fifo.len();
        let n = space.min(bytes.len());
        st.tx_fifo.extend(bytes[..n].iter().copied());
        st.fills.push(n);
        n
    }

    fn rx_fifo_empty(&self) -> bool {
        self.state.borrow().rx_fifo.is_empty()
    }

    fn take_rx_byte(&self) -> u8 {
        self.state
            .borrow_mut()
            .rx_fifo
            .pop_front()
            .expect("RX FIFO underflow")
    }

    fn pending_event(&self) -> Option<Event> {
        self.state.borrow_mut().pending.pop_front()
    }

    fn set_refill_interrupt(&self, enabled: bool) {
        let mut st = self.state.borrow_mut();
        st.refill_irq = enabled;
        if enabled {
            st.refill_was_enabled = true;
        }
    }

    fn set_event_interrupt(&self, enabled: bool) {
        let mut st = self.state.borrow_mut();
        st.event_irq = enabled;
        st.event_irq_toggles.push(enabled);
    }

    fn status(&self) -> BusStatus {
        let st = self.state.borrow();
        BusStatus::new()
            .with(BusStatus::IDLE, st.current.is_none())
            .with(BusStatus::BUSY_BUS, st.busy)
            .with(BusStatus::ERROR, st.error_flag)
    }

    fn start_transfer(&self, addr: Addr, dir: Direction, len: usize) {
        let mut st = self.state.borrow_mut();
        assert!(
            st.current.is_none(),
            "start_transfer while a transfer is in flight"
        );

        st.error_flag = false;
        st.busy = true;
        let total = match dir {
            Direction::Write => len,
            Direction::Read => {
                if st.script.deliver_excess {
                    st.supply.len()
                } else {
                    len.min(st.supply.len())
                }
            }
        };
        st.current = Some(Xfer {
            dir,
            total,
            progress: 0,
        });
        st.transfers.push(TransferRecord {
            addr,
            dir,
            wire: Vec::new(),
        });
    }

    fn wait_for_event(&self) {
        self.advance();
    }
}

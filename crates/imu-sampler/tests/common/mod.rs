#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use bus_manager::{BusFactory, BusManager};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, Operation};
use imu_sampler::{Reading, ReadingSink, TimeSource};
use lsm9ds1::Channel;

pub const AG: u8 = 0x6A;
pub const OUT_X_L_G: u8 = 0x18;
pub const OUT_X_L_XL: u8 = 0x28;
pub const CTRL_REG1_G: u8 = 0x10;
pub const CTRL_REG6_XL: u8 = 0x20;

/// Failure count meaning "every time".
pub const ALWAYS: usize = usize::MAX;

// ---------------------------------------------------------------------------
// Recording bus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tx {
    Write { addr: u8, reg: u8, data: Vec<u8> },
    Read { addr: u8, reg: u8, len: usize },
}

/// Register file plus a log of everything that crossed the wire.
#[derive(Debug, Default)]
pub struct BusState {
    pub regs: HashMap<(u8, u8), u8>,
    pub log: Vec<Tx>,
    /// Remaining injected failures per `(address, register)` read.
    pub fail_reads: HashMap<(u8, u8), usize>,
    pub fail_writes: HashSet<(u8, u8)>,
    in_flight: bool,
    /// Set when a transaction started while another was still running.
    pub interleaved: bool,
}

impl BusState {
    pub fn set_burst(&mut self, addr: u8, reg: u8, axes: [i16; 3]) {
        for (i, axis) in axes.iter().enumerate() {
            let [low, high] = axis.to_le_bytes();
            self.regs.insert((addr, reg + 2 * i as u8), low);
            self.regs.insert((addr, reg + 2 * i as u8 + 1), high);
        }
    }

    pub fn reg(&self, addr: u8, reg: u8) -> u8 {
        self.regs.get(&(addr, reg)).copied().unwrap_or(0)
    }

    pub fn bursts(&self, reg: u8) -> usize {
        self.log
            .iter()
            .filter(|tx| matches!(tx, Tx::Read { reg: r, len: 6, .. } if *r == reg))
            .count()
    }

    pub fn writes_to(&self, reg: u8) -> Vec<u8> {
        self.log
            .iter()
            .filter_map(|tx| match tx {
                Tx::Write { reg: r, data, .. } if *r == reg => Some(data[0]),
                _ => None,
            })
            .collect()
    }

    fn apply(
        &mut self,
        addr: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), ErrorKind> {
        let mut reg = 0;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    reg = bytes[0];
                    if bytes.len() == 1 {
                        continue;
                    }
                    let data = bytes[1..].to_vec();
                    self.log.push(Tx::Write { addr, reg, data: data.clone() });
                    if self.fail_writes.contains(&(addr, reg)) {
                        return Err(ErrorKind::Other);
                    }
                    for (i, byte) in data.into_iter().enumerate() {
                        self.regs.insert((addr, reg + i as u8), byte);
                    }
                }
                Operation::Read(buf) => {
                    self.log.push(Tx::Read { addr, reg, len: buf.len() });
                    if let Some(remaining) = self.fail_reads.get_mut(&(addr, reg)) {
                        if *remaining > 0 {
                            if *remaining != ALWAYS {
                                *remaining -= 1;
                            }
                            return Err(ErrorKind::Other);
                        }
                    }
                    for (i, byte) in buf.iter_mut().enumerate() {
                        *byte = self.reg(addr, reg + i as u8);
                    }
                }
            }
        }
        Ok(())
    }
}

/// I2C bus that yields in the middle of every transaction, so two
/// transactions overlapping would be visible in `interleaved`.
pub struct MockI2c {
    state: Rc<RefCell<BusState>>,
}

impl MockI2c {
    pub fn new(state: Rc<RefCell<BusState>>) -> Self {
        Self { state }
    }
}

impl ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        {
            let mut state = self.state.borrow_mut();
            if state.in_flight {
                state.interleaved = true;
            }
            state.in_flight = true;
        }
        yield_now().await;
        let mut state = self.state.borrow_mut();
        let result = state.apply(address, operations);
        state.in_flight = false;
        result
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

pub struct MockResources {
    state: Rc<RefCell<BusState>>,
    opened: Rc<Cell<usize>>,
    closed: Rc<Cell<usize>>,
}

pub struct MockFactory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoSuchBus;

impl BusFactory for MockFactory {
    type Bus = Mutex<NoopRawMutex, MockI2c>;
    type Resources = MockResources;
    type Destructor = MockResources;
    type Error = NoSuchBus;

    fn create(
        resources: Self::Resources,
        id: &str,
    ) -> Result<(Self::Bus, Self::Destructor), (Self::Error, Self::Resources)>
    {
        if id != "I2C1" {
            return Err((NoSuchBus, resources));
        }
        resources.opened.set(resources.opened.get() + 1);
        let bus = Mutex::new(MockI2c { state: resources.state.clone() });
        Ok((bus, resources))
    }

    fn recover(destructor: Self::Destructor) -> Self::Resources {
        destructor.closed.set(destructor.closed.get() + 1);
        destructor
    }
}

/// A device answering like a freshly powered LSM9DS1 with fixed outputs.
pub struct Rig {
    pub state: Rc<RefCell<BusState>>,
    pub opened: Rc<Cell<usize>>,
    pub closed: Rc<Cell<usize>>,
    pub manager: BusManager<NoopRawMutex, MockFactory>,
}

/// Bus state of a device reporting 2 g / 245 dps example outputs.
pub fn device() -> Rc<RefCell<BusState>> {
    let state = Rc::new(RefCell::new(BusState::default()));
    {
        let mut s = state.borrow_mut();
        s.regs.insert((AG, 0x0F), 0x68);
        s.set_burst(AG, OUT_X_L_G, [32767, 0, -32768]);
        s.set_burst(AG, OUT_X_L_XL, [16384, -16384, 0]);
    }
    state
}

pub fn rig() -> Rig {
    let state = device();
    let opened = Rc::new(Cell::new(0));
    let closed = Rc::new(Cell::new(0));
    let manager = BusManager::new(MockResources {
        state: state.clone(),
        opened: opened.clone(),
        closed: closed.clone(),
    });
    Rig { state, opened, closed, manager }
}

// ---------------------------------------------------------------------------
// Time, delay, sink
// ---------------------------------------------------------------------------

/// Advances 10 us per call.
#[derive(Default)]
pub struct TickClock(Cell<u64>);

impl TimeSource for TickClock {
    fn now_us(&self) -> u64 {
        let now = self.0.get() + 10;
        self.0.set(now);
        now
    }
}

/// Records each requested sleep and yields once instead of waiting.
#[derive(Clone, Default)]
pub struct YieldDelay {
    pub sleeps: Rc<RefCell<Vec<u32>>>,
}

impl DelayNs for YieldDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.sleeps.borrow_mut().push(ns);
        yield_now().await;
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub readings: RefCell<Vec<Reading>>,
}

impl RecordingSink {
    pub fn len(&self) -> usize {
        self.readings.borrow().len()
    }

    pub fn of(&self, channel: Channel) -> Vec<Reading> {
        self.readings
            .borrow()
            .iter()
            .filter(|r| r.channel == channel)
            .copied()
            .collect()
    }
}

impl ReadingSink for RecordingSink {
    fn emit(&self, reading: Reading) {
        self.readings.borrow_mut().push(reading);
    }
}

pub fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "expected {expected}, got {actual}"
    );
}

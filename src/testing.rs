//! Shared mocks for the unit tests
//!
//! One recording register block, scripted rails/clocks and a scripted
//! panel, plus the interrupt pump that stands in for the hardware IRQ line
//! while a test thread is blocked inside the transaction engine.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::config::{LcdTiming, LinkConfig};
use crate::device::{ControllerId, DsimDevice};
use crate::error::DsimError;
use crate::interface::LinkRegisters;
use crate::packet::Packet;
use crate::panel::{DsiHost, PanelDriver};
use crate::regs::{self, IntSrc, Reg, RX_FIFO_READ_DONE};
use crate::resources::{
    DsimResources, LinkClock, PowerRail, RegulatorInfo, ResetLine, ResourceError,
};

/// Order-preserving log of resource and panel events
pub(crate) type EventLog = Arc<spin::Mutex<Vec<String>>>;

pub(crate) fn event_log() -> EventLog {
    Arc::new(spin::Mutex::new(Vec::new()))
}

/// Register block that records writes and plays back scripted reads
pub(crate) struct MockLink {
    writes: Arc<spin::Mutex<Vec<(Reg, u32)>>>,
    values: HashMap<Reg, u32>,
    rx_script: Arc<spin::Mutex<VecDeque<u32>>>,
    err_script: Arc<spin::Mutex<VecDeque<u32>>>,
}

impl LinkRegisters for MockLink {
    fn read(&mut self, reg: Reg) -> u32 {
        match reg {
            Reg::RxFifo => self
                .rx_script
                .lock()
                .pop_front()
                .unwrap_or(RX_FIFO_READ_DONE),
            Reg::IntSrc => self.err_script.lock().pop_front().unwrap_or(0),
            _ => self.values.get(&reg).copied().unwrap_or(0),
        }
    }

    fn write(&mut self, reg: Reg, val: u32) {
        self.writes.lock().push((reg, val));
        self.values.insert(reg, val);
    }
}

/// Handles into a device's mocks that outlive the device construction
pub(crate) struct Harness {
    pub writes: Arc<spin::Mutex<Vec<(Reg, u32)>>>,
    pub events: EventLog,
    rx_script: Arc<spin::Mutex<VecDeque<u32>>>,
    err_script: Arc<spin::Mutex<VecDeque<u32>>>,
}

impl Harness {
    /// Queue words the receive FIFO will yield, in order
    pub fn script_rx(&self, words: &[u32]) {
        self.rx_script.lock().extend(words.iter().copied());
    }

    /// Queue values successive interrupt-source reads will yield
    pub fn script_errors(&self, values: &[u32]) {
        self.err_script.lock().extend(values.iter().copied());
    }
}

/// Knobs for [`mock_device_with`]
pub(crate) struct MockSetup {
    pub config: LinkConfig,
    pub fail_clock: Option<&'static str>,
    pub fail_rail: Option<&'static str>,
}

pub(crate) struct MockClock {
    name: &'static str,
    log: EventLog,
    fail: bool,
}

impl MockClock {
    pub fn new(name: &'static str, log: &EventLog, fail: bool) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            fail,
        }
    }
}

impl LinkClock for MockClock {
    fn enable(&mut self) -> Result<(), ResourceError> {
        if self.fail {
            return Err(ResourceError {
                resource: self.name,
            });
        }
        self.log.lock().push(format!("{} on", self.name));
        Ok(())
    }

    fn disable(&mut self) {
        self.log.lock().push(format!("{} off", self.name));
    }
}

pub(crate) struct MockRail {
    name: &'static str,
    log: EventLog,
    fail: bool,
}

impl MockRail {
    pub fn new(name: &'static str, log: &EventLog, fail: bool) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            fail,
        }
    }
}

impl PowerRail for MockRail {
    fn enable(&mut self) -> Result<(), ResourceError> {
        if self.fail {
            return Err(ResourceError {
                resource: self.name,
            });
        }
        self.log.lock().push(format!("{} on", self.name));
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ResourceError> {
        self.log.lock().push(format!("{} off", self.name));
        Ok(())
    }
}

pub(crate) struct MockReset {
    log: EventLog,
}

impl MockReset {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
        }
    }
}

impl ResetLine for MockReset {
    fn assert_reset(&mut self) {
        self.log.lock().push("reset asserted".into());
    }

    fn release_reset(&mut self) {
        self.log.lock().push("reset released".into());
    }
}

/// Delay source that records instead of sleeping
pub(crate) struct MockDelay {
    log: EventLog,
}

impl MockDelay {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
        }
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.log.lock().push(format!("delay {}us", ns / 1000));
    }
}

/// Panel driver that records capability invocations
pub(crate) struct ScriptedPanel {
    log: EventLog,
    fail_at: Option<&'static str>,
    send_init_commands: bool,
}

impl ScriptedPanel {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
            fail_at: None,
            send_init_commands: false,
        }
    }

    /// Fail when the named capability runs
    pub fn failing_at(mut self, op: &'static str) -> Self {
        self.fail_at = Some(op);
        self
    }

    /// Issue a DCS sleep-out through the host during `init`
    pub fn sending_init_commands(mut self) -> Self {
        self.send_init_commands = true;
        self
    }

    fn op(&mut self, name: &'static str) -> Result<(), DsimError> {
        self.log.lock().push(name.into());
        if self.fail_at == Some(name) {
            return Err(DsimError::Panel { op: name });
        }
        Ok(())
    }
}

impl PanelDriver for ScriptedPanel {
    fn early_probe(&mut self, _host: &dyn DsiHost) -> Result<(), DsimError> {
        self.op("early_probe")
    }

    fn probe(&mut self, _host: &dyn DsiHost) -> Result<(), DsimError> {
        self.op("probe")
    }

    fn init(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        self.op("init")?;
        if self.send_init_commands {
            host.write_command(&Packet::dcs_write(0x11, &[]))?;
        }
        Ok(())
    }

    fn displayon(&mut self, _host: &dyn DsiHost) -> Result<(), DsimError> {
        self.op("displayon")
    }

    fn suspend(&mut self, _host: &dyn DsiHost) -> Result<(), DsimError> {
        self.op("suspend")
    }

    fn resume(&mut self, _host: &dyn DsiHost) -> Result<(), DsimError> {
        self.op("resume")
    }

    fn exit(&mut self, _host: &dyn DsiHost) -> Result<(), DsimError> {
        self.op("exit")
    }

    fn dump(&mut self, _host: &dyn DsiHost) -> Result<(), DsimError> {
        self.op("dump")
    }
}

fn test_config() -> LinkConfig {
    match crate::config::Builder::new()
        .pktgo(true)
        .command_timeout(Duration::from_millis(25))
        .build()
    {
        Ok(config) => config,
        Err(_) => unreachable!("test config is valid"),
    }
}

fn test_timing() -> LcdTiming {
    LcdTiming {
        xres: 1080,
        yres: 1920,
        fps: 60,
        ..LcdTiming::default()
    }
}

/// Status value with every lane reporting both stop state and ULPS entry,
/// so state transitions poll successfully against the mock
const READY_STATUS: u32 = regs::STATUS_ULPS_CLK
    | regs::STATUS_STOP_STATE_CLK
    | regs::status_ulps_lane_mask(4)
    | regs::status_stop_state_lane_mask(4);

pub(crate) fn mock_device(id: ControllerId) -> (Arc<DsimDevice<MockLink>>, Harness) {
    mock_device_with(id, |_| {})
}

pub(crate) fn mock_device_with(
    id: ControllerId,
    tweak: impl FnOnce(&mut MockSetup),
) -> (Arc<DsimDevice<MockLink>>, Harness) {
    let mut setup = MockSetup {
        config: test_config(),
        fail_clock: None,
        fail_rail: None,
    };
    tweak(&mut setup);

    let harness = Harness {
        writes: Arc::new(spin::Mutex::new(Vec::new())),
        events: event_log(),
        rx_script: Arc::new(spin::Mutex::new(VecDeque::new())),
        err_script: Arc::new(spin::Mutex::new(VecDeque::new())),
    };
    let link = MockLink {
        writes: Arc::clone(&harness.writes),
        values: HashMap::from([(Reg::Status, READY_STATUS)]),
        rx_script: Arc::clone(&harness.rx_script),
        err_script: Arc::clone(&harness.err_script),
    };

    let clock = |name: &'static str| -> Box<dyn LinkClock> {
        Box::new(MockClock::new(
            name,
            &harness.events,
            setup.fail_clock == Some(name),
        ))
    };
    let resources = DsimResources::new(
        clock("pclk"),
        clock("dphy_esc"),
        clock("dphy_byte"),
        Box::new(MockDelay::new(&harness.events)),
    )
    .with_reset(Box::new(MockReset::new(&harness.events)))
    .with_rail(RegulatorInfo::new(
        Box::new(MockRail::new(
            "vdd",
            &harness.events,
            setup.fail_rail == Some("vdd"),
        )),
        100,
        50,
    ));

    let dev = Arc::new(DsimDevice::new(
        id,
        link,
        setup.config,
        test_timing(),
        resources,
    ));
    (dev, harness)
}

/// Stand-in for the hardware interrupt line
///
/// Signals the given interrupt sources every few hundred microseconds until
/// dropped. A real controller raises one interrupt per FIFO drain; the pump
/// is merely denser, which the reset-before-wait discipline absorbs.
pub(crate) struct IrqPump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for IrqPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub(crate) fn irq_pump<I: LinkRegisters + 'static>(dev: &Arc<DsimDevice<I>>) -> IrqPump {
    irq_pump_with(
        dev,
        IntSrc::SFR_PH_FIFO_EMPTY | IntSrc::SFR_PL_FIFO_EMPTY | IntSrc::RX_DATA_DONE,
    )
}

pub(crate) fn irq_pump_with<I: LinkRegisters + 'static>(
    dev: &Arc<DsimDevice<I>>,
    src: IntSrc,
) -> IrqPump {
    let stop = Arc::new(AtomicBool::new(false));
    let pump_stop = Arc::clone(&stop);
    let pump_dev = Arc::clone(dev);
    let handle = std::thread::spawn(move || {
        while !pump_stop.load(Ordering::Relaxed) {
            pump_dev.handle_interrupt(src);
            std::thread::sleep(Duration::from_micros(200));
        }
    });
    IrqPump {
        stop,
        handle: Some(handle),
    }
}

//! Device context and link state machine
//!
//! One [`DsimDevice`] exists per physical controller instance (there are at
//! most two) and owns everything the link needs: the register interface,
//! the resource set, the authoritative link state, the packet-go queue and
//! the completion signals.
//!
//! ## Locking
//!
//! Two exclusion domains per context, never shared across controllers:
//!
//! - the **transaction lock** (`inner`): serializes all command traffic and
//!   every link-state transition. Held for the full duration of a
//!   transaction, including its completion wait.
//! - the **spinlock** (`slock`): guards the handful of cached fields the
//!   interrupt path touches (advisory state, enabled flag, write-error
//!   counter, TE reference). Never held across a register access or a wait.
//!
//! The panel binding has its own lock (see [`crate::panel`]); it is taken
//! before, never while holding, the transaction lock.
//!
//! ## State machine
//!
//! ```text
//!              resume/displayon                 enter ULPS
//!   Suspended ------------------> HsClockEnabled ----------> Ulps
//!       ^   (resources acquired)        ^                      |
//!       |                               +---- exit ULPS -------+
//!       +--------- suspend (resources released, idempotent) ---+
//! ```
//!
//! A context is created Suspended. The resume transition acquires the
//! resource set first and stays Suspended if any part of that fails. The
//! suspend transition releases resources in reverse order and is a no-op on
//! an already-suspended context.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::{LcdTiming, LinkConfig};
use crate::error::DsimError;
use crate::interface::LinkRegisters;
use crate::packet::Packet;
use crate::panel::PanelDriver;
use crate::regs::{self, IntSrc, Reg};
use crate::resources::DsimResources;
use crate::sync::{Completion, lock_unpoisoned};
use crate::transfer::PktGoState;

/// Identifier of one of the two supported controller instances
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControllerId {
    /// First controller
    Dsim0,
    /// Second controller
    Dsim1,
}

impl ControllerId {
    /// Slot index of this controller
    pub const fn index(self) -> usize {
        match self {
            Self::Dsim0 => 0,
            Self::Dsim1 => 1,
        }
    }

    /// Controller for a slot index, if it names one of the two instances
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Dsim0),
            1 => Some(Self::Dsim1),
            _ => None,
        }
    }
}

impl core::fmt::Display for ControllerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "dsim{}", self.index())
    }
}

/// Operational state of the link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// High-speed clock enabled; command traffic is legal
    HsClockEnabled,
    /// Ultra-low-power state; link infrastructure alive, no traffic
    Ulps,
    /// Link down, resources released
    Suspended,
}

/// State behind the transaction lock
pub(crate) struct Inner<I> {
    pub(crate) regs: I,
    /// Authoritative link state; mirrored into the spinlock for advisory
    /// reads
    pub(crate) state: LinkState,
    pub(crate) resources: DsimResources,
    pub(crate) lcd_info: LcdTiming,
    pub(crate) pktgo: PktGoState,
    pub(crate) pktgo_queue: VecDeque<Packet>,
}

/// Cached fields readable from interrupt context
struct Shared {
    state: LinkState,
    enabled: bool,
    wr_err_cnt: u32,
    cur_ref_te: u32,
}

/// Per-controller device context
///
/// Created at driver attach, destroyed at detach; all operations take
/// `&self` and are safe to call from multiple threads.
pub struct DsimDevice<I: LinkRegisters> {
    id: ControllerId,
    config: LinkConfig,
    inner: Mutex<Inner<I>>,
    slock: spin::Mutex<Shared>,
    pub(crate) read_comp: Completion,
    pub(crate) pkt_hd_comp: Completion,
    pub(crate) pkt_pl_comp: Completion,
    pub(crate) panel: Mutex<Option<Box<dyn PanelDriver>>>,
}

impl<I: LinkRegisters> DsimDevice<I> {
    /// Create a context for one controller instance, initially Suspended
    pub fn new(
        id: ControllerId,
        regs: I,
        config: LinkConfig,
        lcd_info: LcdTiming,
        resources: DsimResources,
    ) -> Self {
        Self {
            id,
            config,
            inner: Mutex::new(Inner {
                regs,
                state: LinkState::Suspended,
                resources,
                lcd_info,
                pktgo: PktGoState::Disabled,
                pktgo_queue: VecDeque::new(),
            }),
            slock: spin::Mutex::new(Shared {
                state: LinkState::Suspended,
                enabled: false,
                wr_err_cnt: 0,
                cur_ref_te: 0,
            }),
            read_comp: Completion::new(),
            pkt_hd_comp: Completion::new(),
            pkt_pl_comp: Completion::new(),
            panel: Mutex::new(None),
        }
    }

    /// Identifier of this controller
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Link configuration of this controller
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Current link state
    ///
    /// Advisory: the value may change the moment this returns. Operations
    /// that gate on the state re-check it under the transaction lock.
    pub fn state(&self) -> LinkState {
        self.slock.lock().state
    }

    /// Whether the link is up and the panel sequence has completed
    pub fn is_enabled(&self) -> bool {
        self.slock.lock().enabled
    }

    /// Cumulative hardware write-error count
    pub fn write_error_count(&self) -> u32 {
        self.slock.lock().wr_err_cnt
    }

    /// Last recorded tearing-effect reference value
    pub fn te_reference(&self) -> u32 {
        self.slock.lock().cur_ref_te
    }

    /// Record a tearing-effect reference from the TE interrupt path
    pub fn note_te(&self, ref_val: u32) {
        self.slock.lock().cur_ref_te = ref_val;
    }

    /// Current panel timing descriptor
    pub fn lcd_info(&self) -> LcdTiming {
        lock_unpoisoned(&self.inner).lcd_info
    }

    /// Replace the panel timing descriptor (porch update passthrough)
    pub fn set_lcd_info(&self, timing: LcdTiming) {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.lcd_info = timing;
        if inner.state == LinkState::HsClockEnabled {
            Self::program_resolution(&mut inner);
        }
    }

    /// Vertical line count as programmed into the controller
    pub fn line_val(&self) -> u32 {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.regs.read_mask(Reg::Mdresol, regs::MDRESOL_LINEVAL_MASK) >> regs::MDRESOL_LINEVAL_SHIFT
    }

    /// Horizontal pixel count as programmed into the controller
    pub fn hoz_val(&self) -> u32 {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.regs.read_mask(Reg::Mdresol, regs::MDRESOL_HOZVAL_MASK)
    }

    /// Bind the panel driver for this link
    pub fn bind_panel(&self, panel: Box<dyn PanelDriver>) {
        *lock_unpoisoned(&self.panel) = Some(panel);
    }

    /// Interrupt handler body
    ///
    /// The embedding glue reads and acknowledges the hardware interrupt
    /// source register and forwards the bits here. Never takes the
    /// transaction lock, so it is safe from interrupt context.
    pub fn handle_interrupt(&self, src: IntSrc) {
        if src.contains(IntSrc::SFR_PH_FIFO_EMPTY) {
            self.pkt_hd_comp.complete();
        }
        if src.contains(IntSrc::SFR_PL_FIFO_EMPTY) {
            self.pkt_pl_comp.complete();
        }
        if src.contains(IntSrc::RX_DATA_DONE) {
            self.read_comp.complete();
        }
        if src.intersects(IntSrc::ERRORS) {
            log::debug!("{}: error interrupt {:?}", self.id, src & IntSrc::ERRORS);
        }
    }

    /// Bring the link up: Suspended to HsClockEnabled
    ///
    /// Acquires the resource set first; if any part of that fails the state
    /// stays Suspended and the failure surfaces. Enabling an already-up
    /// link is a no-op.
    ///
    /// # Errors
    ///
    /// [`DsimError::ResourceAcquisition`] if a clock or rail failed, and
    /// [`DsimError::InvalidLinkState`] when called from ULPS (leave ULPS
    /// through [`DsimDevice::exit_ulps`]).
    pub fn enable(&self) -> Result<(), DsimError> {
        let mut inner = lock_unpoisoned(&self.inner);
        match inner.state {
            LinkState::HsClockEnabled => return Ok(()),
            LinkState::Ulps => {
                return Err(DsimError::InvalidLinkState { state: inner.state });
            }
            LinkState::Suspended => {}
        }

        inner.resources.acquire().inspect_err(|e| {
            log::error!("{}: link bring-up failed: {e}", self.id);
        })?;
        self.init_link(&mut inner);
        self.commit_state(&mut inner, LinkState::HsClockEnabled);
        log::info!("{}: link enabled", self.id);
        Ok(())
    }

    /// Take the link down: any state to Suspended
    ///
    /// Releases every acquired resource in reverse order. Idempotent:
    /// suspending an already-suspended context does nothing.
    pub fn disable(&self) {
        let mut inner = lock_unpoisoned(&self.inner);
        if inner.state == LinkState::Suspended {
            log::debug!("{}: already suspended", self.id);
            return;
        }
        // Quiesce the transmit path before the clocks go away.
        inner.regs.write_mask(
            Reg::ClkCtrl,
            0,
            regs::CLKCTRL_TX_REQUEST_HSCLK | regs::CLKCTRL_ESCCLK_EN | regs::CLKCTRL_BYTECLK_EN,
        );
        inner.regs.write(Reg::IntMsk, 0);
        inner.resources.release();
        self.commit_state(&mut inner, LinkState::Suspended);
        self.slock.lock().enabled = false;
        log::info!("{}: link suspended", self.id);
    }

    /// Enter the ultra-low-power state
    ///
    /// Taking the transaction lock first guarantees no command transaction
    /// is in flight; packets issued in ULPS are undefined.
    ///
    /// # Errors
    ///
    /// [`DsimError::InvalidLinkState`] from Suspended;
    /// [`DsimError::TransactionTimeout`] if the lanes never report ULPS
    /// entry.
    pub fn enter_ulps(&self) -> Result<(), DsimError> {
        let mut inner = lock_unpoisoned(&self.inner);
        match inner.state {
            LinkState::Ulps => return Ok(()),
            LinkState::Suspended => {
                return Err(DsimError::InvalidLinkState { state: inner.state });
            }
            LinkState::HsClockEnabled => {}
        }

        inner.regs.write_mask(
            Reg::Escmode,
            regs::ESCMODE_TX_ULPS_CLK | regs::ESCMODE_TX_ULPS_DATA,
            regs::ESCMODE_ULPS_MASK,
        );
        let entered = regs::STATUS_ULPS_CLK
            | regs::status_ulps_lane_mask(self.config.data_lane_cnt);
        Self::poll_status(&mut inner, entered)?;
        self.commit_state(&mut inner, LinkState::Ulps);
        log::info!("{}: entered ULPS", self.id);
        Ok(())
    }

    /// Leave the ultra-low-power state and resume high-speed traffic
    ///
    /// Re-validates the clock and lane configuration before the transaction
    /// lock is released for command use.
    ///
    /// # Errors
    ///
    /// [`DsimError::InvalidLinkState`] from Suspended;
    /// [`DsimError::TransactionTimeout`] if the lanes never report the exit.
    pub fn exit_ulps(&self) -> Result<(), DsimError> {
        let mut inner = lock_unpoisoned(&self.inner);
        match inner.state {
            LinkState::HsClockEnabled => return Ok(()),
            LinkState::Suspended => {
                return Err(DsimError::InvalidLinkState { state: inner.state });
            }
            LinkState::Ulps => {}
        }

        inner.regs.write_mask(
            Reg::Escmode,
            regs::ESCMODE_TX_ULPS_CLK_EXIT | regs::ESCMODE_TX_ULPS_DATA_EXIT,
            regs::ESCMODE_ULPS_MASK,
        );
        let stopped = regs::STATUS_STOP_STATE_CLK
            | regs::status_stop_state_lane_mask(self.config.data_lane_cnt);
        Self::poll_status(&mut inner, stopped)?;
        inner
            .regs
            .write_mask(Reg::Escmode, 0, regs::ESCMODE_ULPS_MASK);
        // Lane and clock configuration may have drifted while the PHY was
        // parked; re-assert it before anyone issues a packet.
        self.program_clocks(&mut inner);
        self.program_lanes(&mut inner);
        self.commit_state(&mut inner, LinkState::HsClockEnabled);
        log::info!("{}: exited ULPS", self.id);
        Ok(())
    }

    /// Record a state change under the transaction lock and mirror it for
    /// advisory readers
    fn commit_state(&self, inner: &mut Inner<I>, state: LinkState) {
        inner.state = state;
        self.slock.lock().state = state;
    }

    pub(crate) fn bump_write_errors(&self) -> u32 {
        let mut shared = self.slock.lock();
        shared.wr_err_cnt += 1;
        shared.wr_err_cnt
    }

    pub(crate) fn mark_enabled(&self) {
        self.slock.lock().enabled = true;
    }

    /// Poll the status register until `expected` bits are all set
    fn poll_status(inner: &mut Inner<I>, expected: u32) -> Result<(), DsimError> {
        const TRIES: u32 = 10;
        const STEP_US: u32 = 100;
        for _ in 0..TRIES {
            if inner.regs.read_mask(Reg::Status, expected) == expected {
                return Ok(());
            }
            inner.resources.delay.delay_us(STEP_US);
        }
        Err(DsimError::TransactionTimeout {
            after_ms: u64::from(TRIES * STEP_US) / 1000,
        })
    }

    /// Program the controller after a cold bring-up
    fn init_link(&self, inner: &mut Inner<I>) {
        inner
            .regs
            .write(Reg::SwRst, regs::SWRST_RESET | regs::SWRST_FUNC);
        inner.resources.delay.delay_us(100);

        // Conservative LP-RX / BTA timeouts.
        inner.regs.write(Reg::Timeout, (0xff << 16) | 0xffff);

        inner.regs.write(
            Reg::PllCtrl,
            regs::PLLCTRL_PLL_EN
                | ((u32::from(self.config.freq_band) << regs::PLLCTRL_FREQ_BAND_SHIFT)
                    & regs::PLLCTRL_FREQ_BAND_MASK),
        );
        self.program_clocks(inner);
        self.program_lanes(inner);
        Self::program_resolution(inner);

        inner.regs.write(Reg::FifoCtrl, regs::FIFOCTRL_INIT_ALL);
        // Drop anything pending from a previous life, then open the mask.
        inner.regs.write(Reg::IntSrc, u32::MAX);
        inner.regs.write(
            Reg::IntMsk,
            (IntSrc::SFR_PH_FIFO_EMPTY
                | IntSrc::SFR_PL_FIFO_EMPTY
                | IntSrc::RX_DATA_DONE
                | IntSrc::ERRORS)
                .bits(),
        );
    }

    fn program_clocks(&self, inner: &mut Inner<I>) {
        let prescaler = (self.config.byte_clk_hz / self.config.escape_clk_hz.max(1)) as u32;
        inner.regs.write(
            Reg::ClkCtrl,
            regs::CLKCTRL_TX_REQUEST_HSCLK
                | regs::CLKCTRL_ESCCLK_EN
                | regs::CLKCTRL_BYTECLK_EN
                | (prescaler & regs::CLKCTRL_ESC_PRESCALER_MASK),
        );
    }

    fn program_lanes(&self, inner: &mut Inner<I>) {
        let lanes = self.config.data_lane_cnt;
        inner.regs.write(
            Reg::Config,
            regs::CONFIG_LANE_EN_CLK
                | regs::config_lane_en_mask(lanes)
                | regs::config_num_of_data_lane(lanes),
        );
    }

    fn program_resolution(inner: &mut Inner<I>) {
        let lineval = (inner.lcd_info.yres << regs::MDRESOL_LINEVAL_SHIFT)
            & regs::MDRESOL_LINEVAL_MASK;
        let hozval = inner.lcd_info.xres & regs::MDRESOL_HOZVAL_MASK;
        inner.regs.write(Reg::Mdresol, lineval | hozval);
    }

    pub(crate) fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner<I>> {
        lock_unpoisoned(&self.inner)
    }

    // Register passthrough for the manager's id-indexed interface. Each call
    // holds the transaction lock for just the one access.

    pub(crate) fn reg_read(&self, reg: Reg) -> u32 {
        self.lock_inner().regs.read(reg)
    }

    pub(crate) fn reg_read_mask(&self, reg: Reg, mask: u32) -> u32 {
        self.lock_inner().regs.read_mask(reg, mask)
    }

    pub(crate) fn reg_write(&self, reg: Reg, val: u32) {
        self.lock_inner().regs.write(reg, val);
    }

    pub(crate) fn reg_write_mask(&self, reg: Reg, val: u32, mask: u32) {
        self.lock_inner().regs.write_mask(reg, val, mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{irq_pump, mock_device, mock_device_with};
    use std::time::Duration;

    #[test]
    fn test_new_context_is_suspended_and_disabled() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        assert_eq!(dev.state(), LinkState::Suspended);
        assert!(!dev.is_enabled());
        assert_eq!(dev.write_error_count(), 0);
    }

    #[test]
    fn test_enable_reaches_hs_clock() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        assert!(dev.enable().is_ok());
        assert_eq!(dev.state(), LinkState::HsClockEnabled);
    }

    #[test]
    fn test_enable_is_idempotent() {
        let (dev, harness) = mock_device(ControllerId::Dsim0);
        assert!(dev.enable().is_ok());
        let writes_after_first = harness.writes.lock().len();
        assert!(dev.enable().is_ok());
        assert_eq!(harness.writes.lock().len(), writes_after_first);
    }

    #[test]
    fn test_resource_failure_leaves_suspended() {
        let (dev, _harness) = mock_device_with(ControllerId::Dsim0, |h| {
            h.fail_clock = Some("dphy_esc");
        });
        let result = dev.enable();
        assert!(matches!(result, Err(DsimError::ResourceAcquisition(_))));
        assert_eq!(dev.state(), LinkState::Suspended);
        assert!(!dev.is_enabled());
    }

    #[test]
    fn test_suspend_is_idempotent() {
        let (dev, harness) = mock_device(ControllerId::Dsim0);
        assert!(dev.enable().is_ok());
        dev.disable();
        assert_eq!(dev.state(), LinkState::Suspended);
        let events = harness.events.lock().len();
        dev.disable();
        // Second suspend must not touch resources again.
        assert_eq!(harness.events.lock().len(), events);
    }

    #[test]
    fn test_enter_ulps_from_suspended_is_invalid() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        assert_eq!(
            dev.enter_ulps(),
            Err(DsimError::InvalidLinkState {
                state: LinkState::Suspended
            })
        );
    }

    #[test]
    fn test_ulps_round_trip() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        assert!(dev.enable().is_ok());
        assert!(dev.enter_ulps().is_ok());
        assert_eq!(dev.state(), LinkState::Ulps);
        // Re-entry is a no-op.
        assert!(dev.enter_ulps().is_ok());
        assert!(dev.exit_ulps().is_ok());
        assert_eq!(dev.state(), LinkState::HsClockEnabled);
    }

    #[test]
    fn test_enable_from_ulps_is_invalid() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        assert!(dev.enable().is_ok());
        assert!(dev.enter_ulps().is_ok());
        assert_eq!(
            dev.enable(),
            Err(DsimError::InvalidLinkState {
                state: LinkState::Ulps
            })
        );
    }

    #[test]
    fn test_controllers_are_independent() {
        let (dev0, _h0) = mock_device(ControllerId::Dsim0);
        let (dev1, _h1) = mock_device(ControllerId::Dsim1);
        assert!(dev0.enable().is_ok());
        assert_eq!(dev0.state(), LinkState::HsClockEnabled);
        assert_eq!(dev1.state(), LinkState::Suspended);
        dev0.disable();
        assert!(dev1.enable().is_ok());
        assert!(dev1.enter_ulps().is_ok());
        assert_eq!(dev0.state(), LinkState::Suspended);
        assert_eq!(dev1.state(), LinkState::Ulps);
    }

    #[test]
    fn test_interrupt_signals_completions() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        dev.read_comp.reinit();
        dev.pkt_hd_comp.reinit();
        dev.handle_interrupt(IntSrc::RX_DATA_DONE);
        assert!(dev.read_comp.wait_timeout(Duration::from_millis(1)));
        // Header completion was not part of the interrupt.
        assert!(!dev.pkt_hd_comp.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_te_reference_tracking() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        assert_eq!(dev.te_reference(), 0);
        dev.note_te(0x42);
        assert_eq!(dev.te_reference(), 0x42);
    }

    #[test]
    fn test_resolution_readback() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        assert!(dev.enable().is_ok());
        // mock_device programs a 1080x1920 panel
        assert_eq!(dev.hoz_val(), 1080);
        assert_eq!(dev.line_val(), 1920 & 0xfff);
    }

    #[test]
    fn test_set_lcd_info_reprograms_resolution_when_up() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        assert!(dev.enable().is_ok());
        let mut timing = dev.lcd_info();
        timing.xres = 720;
        timing.yres = 1280;
        dev.set_lcd_info(timing);
        assert_eq!(dev.hoz_val(), 720);
        assert_eq!(dev.line_val(), 1280);
        assert_eq!(dev.lcd_info().xres, 720);
    }

    #[test]
    fn test_concurrent_state_reads_do_not_block_transitions() {
        let (dev, _harness) = mock_device(ControllerId::Dsim0);
        let _pump = irq_pump(&dev);
        assert!(dev.enable().is_ok());
        let reader = {
            let dev = std::sync::Arc::clone(&dev);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let _ = dev.state();
                    let _ = dev.is_enabled();
                }
            })
        };
        assert!(dev.enter_ulps().is_ok());
        assert!(dev.exit_ulps().is_ok());
        let _ = reader.join();
    }
}

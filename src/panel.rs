//! Panel lifecycle dispatcher
//!
//! Panel-specific code lives behind the [`PanelDriver`] capability set and
//! stays opaque to the link core. The dispatcher invokes the bound driver
//! at the right link-state transitions:
//!
//! - attach: `early_probe` → resource/state bring-up → `probe` → `init` →
//!   `displayon`. A failing capability aborts the remaining sequence and
//!   the dispatcher unwinds the bring-up — nothing stays acquired, the
//!   link returns to Suspended.
//! - suspend/detach: `suspend` (or `exit`) runs before resources are
//!   released.
//! - resume: bring-up, then `resume`.
//! - `dump` may run at any time for diagnostics and must not mutate link
//!   state.
//!
//! Every capability is optional: the default methods succeed without doing
//! anything, so a driver implements only what its panel family needs.
//!
//! Panel code talks back to the link through the [`DsiHost`] facade it is
//! handed, typically to send its initialization command tables:
//!
//! ```
//! use dsim::packet::Packet;
//! use dsim::{DsiHost, DsimError, PanelDriver};
//!
//! struct AmoledPanel;
//!
//! impl PanelDriver for AmoledPanel {
//!     fn init(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
//!         host.write_command(&Packet::dcs_write(0x11, &[]))?; // sleep out
//!         host.write_command(&Packet::dcs_write(0x29, &[]))?; // display on
//!         Ok(())
//!     }
//!
//!     fn suspend(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
//!         host.write_command(&Packet::dcs_write(0x28, &[]))?; // display off
//!         host.write_command(&Packet::dcs_write(0x10, &[]))   // sleep in
//!     }
//! }
//! ```

use crate::config::LcdTiming;
use crate::device::{ControllerId, DsimDevice, LinkState};
use crate::error::DsimError;
use crate::interface::LinkRegisters;
use crate::packet::Packet;
use crate::sync::lock_unpoisoned;

/// Link services available to panel code
///
/// Object-safe facade over the owning device so panel drivers need no type
/// parameter and no access to the core's internals.
pub trait DsiHost {
    /// Identifier of the controller this panel hangs off
    fn id(&self) -> ControllerId;

    /// Advisory link state
    fn link_state(&self) -> LinkState;

    /// Current panel timing descriptor
    fn lcd_info(&self) -> LcdTiming;

    /// Send one command packet (see
    /// [`DsimDevice::write_command`](crate::device::DsimDevice::write_command))
    fn write_command(&self, packet: &Packet) -> Result<(), DsimError>;

    /// Read `buf.len()` bytes from DCS register `addr` (see
    /// [`DsimDevice::read_command`](crate::device::DsimDevice::read_command))
    fn read_command(&self, addr: u8, buf: &mut [u8]) -> Result<(), DsimError>;
}

impl<I: LinkRegisters> DsiHost for DsimDevice<I> {
    fn id(&self) -> ControllerId {
        DsimDevice::id(self)
    }

    fn link_state(&self) -> LinkState {
        self.state()
    }

    fn lcd_info(&self) -> LcdTiming {
        DsimDevice::lcd_info(self)
    }

    fn write_command(&self, packet: &Packet) -> Result<(), DsimError> {
        DsimDevice::write_command(self, packet)
    }

    fn read_command(&self, addr: u8, buf: &mut [u8]) -> Result<(), DsimError> {
        DsimDevice::read_command(self, addr, buf)
    }
}

/// Capability set of a panel family driver
///
/// Registered once per link via
/// [`DsimDevice::bind_panel`](crate::device::DsimDevice::bind_panel).
/// Every method defaults to a successful no-op; an absent capability is not
/// an error.
#[allow(unused_variables)]
pub trait PanelDriver: Send {
    /// Called before any resource is acquired
    fn early_probe(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        Ok(())
    }

    /// Detect and bind the panel once the link is up
    fn probe(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        Ok(())
    }

    /// Run the panel's initialization command sequence
    fn init(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        Ok(())
    }

    /// Light the panel up
    fn displayon(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        Ok(())
    }

    /// Quiesce the panel ahead of a link suspend
    fn suspend(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        Ok(())
    }

    /// Wake the panel after a link resume
    fn resume(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        Ok(())
    }

    /// Final teardown at detach
    fn exit(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        Ok(())
    }

    /// Diagnostic dump; must not mutate link state
    fn dump(&mut self, host: &dyn DsiHost) -> Result<(), DsimError> {
        Ok(())
    }
}

impl<I: LinkRegisters> DsimDevice<I> {
    /// Invoke one panel capability, if a panel is bound
    ///
    /// The panel lock is taken before — never while holding — the
    /// transaction lock, so panel code is free to issue commands through
    /// the host facade.
    fn panel_op(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut dyn PanelDriver, &dyn DsiHost) -> Result<(), DsimError>,
    ) -> Result<(), DsimError> {
        let mut panel = lock_unpoisoned(&self.panel);
        let Some(driver) = panel.as_mut() else {
            return Ok(());
        };
        f(driver.as_mut(), self)
            .inspect_err(|e| log::error!("{}: panel {op} failed: {e}", DsimDevice::id(self)))
    }

    /// Run the attach sequence against the bound panel
    ///
    /// `early_probe` → bring-up → `probe` → `init` → `displayon`. Any
    /// failure aborts the remainder; a failure after bring-up releases the
    /// resources again and leaves the link Suspended.
    pub fn attach(&self) -> Result<(), DsimError> {
        self.panel_op("early_probe", |p, h| p.early_probe(h))?;
        self.enable()?;
        let sequence = self
            .panel_op("probe", |p, h| p.probe(h))
            .and_then(|()| self.panel_op("init", |p, h| p.init(h)))
            .and_then(|()| self.panel_op("displayon", |p, h| p.displayon(h)));
        if let Err(e) = sequence {
            self.disable();
            return Err(e);
        }
        self.mark_enabled();
        log::info!("{}: panel attached", DsimDevice::id(self));
        Ok(())
    }

    /// Run the detach sequence: panel `exit`, then release everything
    pub fn detach(&self) -> Result<(), DsimError> {
        let result = self.panel_op("exit", |p, h| p.exit(h));
        self.disable();
        result
    }

    /// Suspend the link, quiescing the panel first
    ///
    /// Idempotent: suspending an already-suspended context succeeds without
    /// touching the panel.
    pub fn suspend(&self) -> Result<(), DsimError> {
        if self.state() == LinkState::Suspended {
            return Ok(());
        }
        let result = self.panel_op("suspend", |p, h| p.suspend(h));
        self.disable();
        result
    }

    /// Resume the link and wake the panel
    pub fn resume(&self) -> Result<(), DsimError> {
        self.enable()?;
        if let Err(e) = self.panel_op("resume", |p, h| p.resume(h)) {
            self.disable();
            return Err(e);
        }
        self.mark_enabled();
        Ok(())
    }

    /// Drive the link up and invoke the panel's `displayon` capability
    pub fn display_on(&self) -> Result<(), DsimError> {
        self.enable()?;
        self.panel_op("displayon", |p, h| p.displayon(h))?;
        self.mark_enabled();
        Ok(())
    }

    /// Invoke the panel's diagnostic dump
    pub fn dump(&self) -> Result<(), DsimError> {
        self.panel_op("dump", |p, h| p.dump(h))
    }
}

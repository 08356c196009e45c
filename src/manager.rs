//! Driver manager: controller registry and control surface
//!
//! The process owns one [`DriverManager`] holding the two controller slots.
//! Slots are populated at attach and cleared at detach; resolving an
//! unregistered id through [`DriverManager::device`] (or the id-indexed
//! register operations) is a driver-ordering bug and therefore a fatal
//! precondition violation, not a recoverable error.
//!
//! The control surface maps one [`DsimRequest`] to one operation on the
//! owning device:
//!
//! ```rust,no_run
//! use dsim::{DriverManager, DsimRequest, DsimResponse};
//! # use dsim::regs::Reg;
//! # use dsim::{ControllerId, LinkRegisters};
//! # struct MmioBlock;
//! # impl LinkRegisters for MmioBlock {
//! #     fn read(&mut self, _reg: Reg) -> u32 { 0 }
//! #     fn write(&mut self, _reg: Reg, _val: u32) {}
//! # }
//! # fn control(manager: &DriverManager<MmioBlock>) {
//! let timing = match manager.request(ControllerId::Dsim0, DsimRequest::GetLcdInfo) {
//!     Ok(DsimResponse::LcdInfo(timing)) => timing,
//!     _ => return,
//! };
//! let _ = manager.request(ControllerId::Dsim0, DsimRequest::EnterUlps);
//! let _ = timing;
//! # }
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use crate::config::LcdTiming;
use crate::device::{ControllerId, DsimDevice};
use crate::error::DsimError;
use crate::interface::LinkRegisters;
use crate::regs::Reg;
use crate::transfer::PartialArea;

/// Control-surface request codes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DsimRequest {
    /// Park the link in the ultra-low-power state
    EnterUlps,
    /// Suspend the link, releasing its resources
    LcdOff,
    /// Enable packet-go batching
    PktGoEnable,
    /// Disable packet-go batching (flushes the queue first)
    PktGoDisable,
    /// Release the queued batch
    PktGoReady,
    /// Return the current panel timing descriptor
    GetLcdInfo,
    /// Replace the panel timing descriptor (passthrough)
    SetPorch(LcdTiming),
    /// Issue the partial-update window command sequence
    PartialCmd(PartialArea),
    /// Invoke the panel's diagnostic dump
    Dump,
    /// Bring the link up and invoke the panel's displayon capability
    DisplayOn,
}

/// Control-surface responses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DsimResponse {
    /// Request completed without data
    None,
    /// Panel timing descriptor for [`DsimRequest::GetLcdInfo`]
    LcdInfo(LcdTiming),
}

/// Process-wide registry of the two controller instances
///
/// The two slots are fully independent: no lock is shared between them and
/// an operation on one can never block the other.
pub struct DriverManager<I: LinkRegisters> {
    slots: [RwLock<Option<Arc<DsimDevice<I>>>>; 2],
}

impl<I: LinkRegisters> Default for DriverManager<I> {
    fn default() -> Self {
        Self {
            slots: [RwLock::new(None), RwLock::new(None)],
        }
    }
}

impl<I: LinkRegisters> DriverManager<I> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and run its panel attach sequence
    ///
    /// The slot is populated before the sequence so that id-indexed
    /// register access works from panel code; it is cleared again if the
    /// sequence fails.
    ///
    /// # Errors
    ///
    /// [`DsimError::AlreadyAttached`] when the slot is occupied, otherwise
    /// whatever the attach sequence surfaced.
    pub fn attach(&self, dev: Arc<DsimDevice<I>>) -> Result<(), DsimError> {
        let id = dev.id();
        {
            let mut slot = self.slot_mut(id);
            if slot.is_some() {
                return Err(DsimError::AlreadyAttached { id });
            }
            *slot = Some(Arc::clone(&dev));
        }
        if let Err(e) = dev.attach() {
            *self.slot_mut(id) = None;
            return Err(e);
        }
        log::info!("{id}: attached");
        Ok(())
    }

    /// Run the detach sequence and clear the slot
    ///
    /// Detaching an empty slot is a no-op.
    pub fn detach(&self, id: ControllerId) -> Result<(), DsimError> {
        let Some(dev) = self.slot_mut(id).take() else {
            log::warn!("{id}: detach without attach");
            return Ok(());
        };
        let result = dev.detach();
        log::info!("{id}: detached");
        result
    }

    /// Look a controller up without the registered-id precondition
    pub fn try_device(&self, id: ControllerId) -> Option<Arc<DsimDevice<I>>> {
        self.slots[id.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve a controller id to its attached device
    ///
    /// # Panics
    ///
    /// Panics when `id` has no attached device. That is a driver-attach
    /// ordering bug in the embedding code, never a runtime condition to
    /// recover from.
    #[allow(clippy::panic)]
    pub fn device(&self, id: ControllerId) -> Arc<DsimDevice<I>> {
        match self.try_device(id) {
            Some(dev) => dev,
            None => panic!("{id} used before attach"),
        }
    }

    /// Read a register of controller `id`
    pub fn read(&self, id: ControllerId, reg: Reg) -> u32 {
        self.device(id).reg_read(reg)
    }

    /// Read a register of controller `id`, keeping only the bits in `mask`
    pub fn read_mask(&self, id: ControllerId, reg: Reg, mask: u32) -> u32 {
        self.device(id).reg_read_mask(reg, mask)
    }

    /// Write a register of controller `id`
    pub fn write(&self, id: ControllerId, reg: Reg, val: u32) {
        self.device(id).reg_write(reg, val);
    }

    /// Read-modify-write a register of controller `id`
    pub fn write_mask(&self, id: ControllerId, reg: Reg, val: u32, mask: u32) {
        self.device(id).reg_write_mask(reg, val, mask);
    }

    /// Dispatch one control-surface request to controller `id`
    pub fn request(
        &self,
        id: ControllerId,
        req: DsimRequest,
    ) -> Result<DsimResponse, DsimError> {
        let dev = self.device(id);
        match req {
            DsimRequest::EnterUlps => dev.enter_ulps().map(|()| DsimResponse::None),
            DsimRequest::LcdOff => dev.suspend().map(|()| DsimResponse::None),
            DsimRequest::PktGoEnable => dev.pkt_go_enable(true).map(|()| DsimResponse::None),
            DsimRequest::PktGoDisable => dev.pkt_go_enable(false).map(|()| DsimResponse::None),
            DsimRequest::PktGoReady => dev.pkt_go_ready().map(|()| DsimResponse::None),
            DsimRequest::GetLcdInfo => Ok(DsimResponse::LcdInfo(dev.lcd_info())),
            DsimRequest::SetPorch(timing) => {
                dev.set_lcd_info(timing);
                Ok(DsimResponse::None)
            }
            DsimRequest::PartialCmd(area) => {
                dev.partial_area_command(area).map(|()| DsimResponse::None)
            }
            DsimRequest::Dump => dev.dump().map(|()| DsimResponse::None),
            DsimRequest::DisplayOn => dev.display_on().map(|()| DsimResponse::None),
        }
    }

    fn slot_mut(
        &self,
        id: ControllerId,
    ) -> std::sync::RwLockWriteGuard<'_, Option<Arc<DsimDevice<I>>>> {
        self.slots[id.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

//! MIPI-DSI Link-Management Core
//!
//! Driver core for the DSIM display serial interface controller: it owns
//! the link's power/clock state machine, executes command transactions
//! (writes and reads) under a strict hand-shake protocol with hardware
//! completion signals, and dispatches the attached panel driver's
//! lifecycle. Up to two controller instances are supported, fully
//! independent of each other.
//!
//! ## Features
//!
//! - Link state machine: high-speed clock, ultra-low-power state (ULPS),
//!   suspend — with scoped resource bring-up and reverse-order unwind
//! - Serialized command transactions with bounded completion timeouts,
//!   bounded retry on hardware write errors and a visible degraded-link
//!   signal
//! - Optional packet-go batching: queue short command packets and release
//!   them together
//! - Panel drivers behind a capability trait ([`PanelDriver`]); hardware
//!   behind a register trait ([`LinkRegisters`]) and resource traits, with
//!   `embedded-hal` pins usable as reset lines
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dsim::{
//!     Builder, ControllerId, DriverManager, DsimDevice, DsimResources, LcdTiming, StdDelay,
//! };
//! # use dsim::regs::Reg;
//! # use dsim::{LinkClock, LinkRegisters, ResourceError};
//! # struct MmioBlock;
//! # impl LinkRegisters for MmioBlock {
//! #     fn read(&mut self, _reg: Reg) -> u32 { 0 }
//! #     fn write(&mut self, _reg: Reg, _val: u32) {}
//! # }
//! # struct Gate;
//! # impl LinkClock for Gate {
//! #     fn enable(&mut self) -> Result<(), ResourceError> { Ok(()) }
//! #     fn disable(&mut self) {}
//! # }
//! let config = match Builder::new().data_lanes(4).pktgo(true).build() {
//!     Ok(config) => config,
//!     Err(_) => return,
//! };
//! let timing = LcdTiming {
//!     xres: 1080,
//!     yres: 1920,
//!     fps: 60,
//!     ..LcdTiming::default()
//! };
//! let resources = DsimResources::new(
//!     Box::new(Gate),
//!     Box::new(Gate),
//!     Box::new(Gate),
//!     Box::new(StdDelay),
//! );
//! let device = Arc::new(DsimDevice::new(
//!     ControllerId::Dsim0,
//!     MmioBlock,
//!     config,
//!     timing,
//!     resources,
//! ));
//!
//! let manager = DriverManager::new();
//! if manager.attach(device).is_ok() {
//!     // Link is up; command transactions and the control surface are live.
//! }
//! ```
//!
//! The embedding glue is expected to wire three things: a
//! [`LinkRegisters`] implementation over the mapped control block, the
//! clock/regulator/reset collaborators of [`DsimResources`], and an
//! interrupt handler that forwards acknowledged interrupt-source bits to
//! [`DsimDevice::handle_interrupt`].

/// Link configuration types and builder
pub mod config;
/// Device context and link state machine
pub mod device;
/// Error types for the driver
pub mod error;
/// Hardware interface abstraction
pub mod interface;
/// Controller registry and control surface
pub mod manager;
/// Outbound command packets
pub mod packet;
/// Panel lifecycle dispatcher
pub mod panel;
/// DSIM register definitions
pub mod regs;
/// Link power and clock resources
pub mod resources;
/// Command transaction engine and packet-go batching
pub mod transfer;

mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    Builder, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_DEGRADE_THRESHOLD, DEFAULT_WRITE_RETRIES,
    DisplayMode, LcdTiming, LinkConfig,
};
pub use device::{ControllerId, DsimDevice, LinkState};
pub use error::{ConfigError, DsimError};
pub use interface::LinkRegisters;
pub use manager::{DriverManager, DsimRequest, DsimResponse};
pub use packet::{DataId, Packet};
pub use panel::{DsiHost, PanelDriver};
pub use regs::{IntSrc, MAX_RX_FIFO, PKTHDR_FIFO_CNT, Reg};
pub use resources::{
    DsimResources, LinkClock, PowerRail, RegulatorInfo, ResetLine, ResourceError, StdDelay,
};
pub use transfer::{PartialArea, PktGoState};

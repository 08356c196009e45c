//! Hardware interface abstraction
//!
//! This module provides the [`LinkRegisters`] trait, the sole boundary
//! between the link-management core and the memory-mapped DSIM control
//! block.
//!
//! ## Access model
//!
//! Register accesses are direct, non-blocking and infallible: a mapped
//! control block either responds in bounded time or the platform is broken
//! in a way no error path can repair. Failures on this link are
//! protocol-level (error interrupt bits, missing completions) and are
//! handled by the transaction engine, not by the register accessors.
//!
//! ## Implementing
//!
//! The platform glue owns the mapping of the control block and implements
//! the two required methods; the masked read-modify-write variants are
//! provided. A second controller instance gets its own implementation value
//! over its own block.
//!
//! ```
//! use dsim::regs::Reg;
//! use dsim::LinkRegisters;
//!
//! /// Register file backed by plain memory, e.g. for a simulator.
//! struct FakeBlock {
//!     words: std::collections::HashMap<u32, u32>,
//! }
//!
//! impl LinkRegisters for FakeBlock {
//!     fn read(&mut self, reg: Reg) -> u32 {
//!         self.words.get(&reg.offset()).copied().unwrap_or(0)
//!     }
//!
//!     fn write(&mut self, reg: Reg, val: u32) {
//!         self.words.insert(reg.offset(), val);
//!     }
//! }
//!
//! let mut block = FakeBlock { words: std::collections::HashMap::new() };
//! block.write(Reg::Mdresol, 0x0500_0320);
//! assert_eq!(block.read_mask(Reg::Mdresol, 0xfff), 0x320);
//! ```

use crate::regs::Reg;

/// Typed access to the DSIM control block
///
/// One implementation value exists per controller instance and is owned by
/// that controller's [`DsimDevice`](crate::device::DsimDevice), inside its
/// transaction lock; the core never accesses registers without holding that
/// lock.
pub trait LinkRegisters: Send {
    /// Read a register
    fn read(&mut self, reg: Reg) -> u32;

    /// Write a register
    fn write(&mut self, reg: Reg, val: u32);

    /// Read a register and keep only the bits in `mask`
    fn read_mask(&mut self, reg: Reg, mask: u32) -> u32 {
        self.read(reg) & mask
    }

    /// Read-modify-write: update the bits in `mask` from `val`, preserve the
    /// rest
    fn write_mask(&mut self, reg: Reg, val: u32, mask: u32) {
        let old = self.read(reg);
        self.write(reg, (val & mask) | (old & !mask));
    }
}

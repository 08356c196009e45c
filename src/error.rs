//! Error types for the driver
//!
//! This module defines the runtime error type ([`DsimError`]) shared by the
//! link state machine, the transaction engine and the panel dispatcher, and
//! the configuration-time error type ([`ConfigError`]).
//!
//! ## Propagation policy
//!
//! Hardware-transient write errors are retried a small configured number of
//! times inside the transaction engine before surfacing as
//! [`DsimError::HardwareWrite`] (or [`DsimError::LinkDegraded`] once the
//! cumulative counter crossed the configured threshold). Every other kind
//! surfaces immediately with no local retry, and nothing is silently
//! swallowed.

use crate::device::{ControllerId, LinkState};
use crate::resources::ResourceError;

/// Errors that can occur while operating the link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DsimError {
    /// Operation attempted outside the link state it requires
    ///
    /// Command traffic and batch control are only legal while the high-speed
    /// clock is enabled; the offending state is carried for diagnostics.
    InvalidLinkState {
        /// Link state at the time of the attempt
        state: LinkState,
    },
    /// A clock, regulator or reset line failed to switch
    ///
    /// Wraps the collaborator-reported fault. Whatever had already been
    /// acquired was released again before this surfaced.
    ResourceAcquisition(ResourceError),
    /// A completion was not signaled within the configured bound
    TransactionTimeout {
        /// Bound that expired, in milliseconds
        after_ms: u64,
    },
    /// Outbound payload exceeds the packet-header FIFO depth
    ///
    /// Oversize payloads are rejected whole; nothing is truncated.
    PayloadTooLarge {
        /// Offered payload length in bytes
        len: usize,
        /// Maximum accepted length in bytes
        max: usize,
    },
    /// The link reported a protocol-level write fault after all retries
    HardwareWrite {
        /// Cumulative write-error count of the controller
        err_cnt: u32,
    },
    /// Write errors have accumulated past the configured threshold
    ///
    /// Reported in place of [`DsimError::HardwareWrite`] so a degrading link
    /// is visible to the caller rather than hidden behind per-call retries.
    LinkDegraded {
        /// Cumulative write-error count of the controller
        err_cnt: u32,
    },
    /// A read response carried fewer bytes than requested
    ///
    /// Reads never return a short success; the caller gets the full
    /// requested size or this error.
    ReadUnderrun {
        /// Bytes requested
        requested: usize,
        /// Bytes the response actually carried
        available: usize,
    },
    /// A panel capability reported failure
    Panel {
        /// Name of the failing capability
        op: &'static str,
    },
    /// A controller slot is already occupied at attach
    AlreadyAttached {
        /// Identifier of the occupied slot
        id: ControllerId,
    },
}

impl core::fmt::Display for DsimError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidLinkState { state } => {
                write!(f, "invalid link state: {state:?}")
            }
            Self::ResourceAcquisition(e) => write!(f, "resource acquisition failed: {e}"),
            Self::TransactionTimeout { after_ms } => {
                write!(f, "transaction timed out after {after_ms}ms")
            }
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds FIFO depth of {max}")
            }
            Self::HardwareWrite { err_cnt } => {
                write!(f, "hardware write error (cumulative count {err_cnt})")
            }
            Self::LinkDegraded { err_cnt } => {
                write!(f, "link degraded: {err_cnt} accumulated write errors")
            }
            Self::ReadUnderrun {
                requested,
                available,
            } => {
                write!(f, "read underrun: requested {requested}, got {available}")
            }
            Self::Panel { op } => write!(f, "panel {op} failed"),
            Self::AlreadyAttached { id } => {
                write!(f, "controller {id} is already attached")
            }
        }
    }
}

impl core::error::Error for DsimError {}

impl From<ResourceError> for DsimError {
    fn from(e: ResourceError) -> Self {
        Self::ResourceAcquisition(e)
    }
}

/// Errors that can occur when building a link configuration
///
/// These occur during the builder pattern before any device exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Data-lane count outside 1..=4
    InvalidLaneCount {
        /// Requested lane count
        lanes: u8,
    },
    /// A clock rate is zero or outside its legal range
    InvalidClockRate {
        /// Which clock was rejected
        clock: &'static str,
        /// Requested rate in Hz
        hz: u64,
    },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidLaneCount { lanes } => {
                write!(f, "invalid data-lane count {lanes} (1..=4 supported)")
            }
            Self::InvalidClockRate { clock, hz } => {
                write!(f, "invalid {clock} clock rate: {hz}Hz")
            }
        }
    }
}

impl core::error::Error for ConfigError {}

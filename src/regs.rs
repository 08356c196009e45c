//! DSIM register definitions
//!
//! This module owns the register layout of the DSIM control block: register
//! ids with their offsets, the bit fields the link-management core touches,
//! and the protocol constants of the receive path. Everything outside this
//! module treats registers as opaque [`Reg`] ids and accesses them through
//! the [`LinkRegisters`](crate::interface::LinkRegisters) trait.
//!
//! The bit-field encoding here targets the controller block as wired on the
//! dual-DSI display subsystem; a different silicon revision supplies its own
//! build of this module together with its `LinkRegisters` implementation.

use bitflags::bitflags;

/// Number of packet-header FIFO slots
///
/// Bounds both the payload accepted for a single outbound packet and the
/// number of packets the batch controller will hold before forcing a flush.
pub const PKTHDR_FIFO_CNT: usize = 15;

/// Receive FIFO capacity in bytes
///
/// A read transaction never returns more than this many bytes; requests for
/// larger responses are rejected up front.
pub const MAX_RX_FIFO: usize = 64;

/// Sentinel word the receive FIFO yields once a read response is fully drained
///
/// Distinguished from ordinary response words by the protocol layer; it is
/// never surfaced to callers as data.
pub const RX_FIFO_READ_DONE: u32 = 0x3080_0002;

/// Registers of the DSIM control block
///
/// The discriminants are meaningless to the core; [`Reg::offset`] gives the
/// byte offset inside the memory-mapped block for MMIO implementations of
/// [`LinkRegisters`](crate::interface::LinkRegisters).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reg {
    /// Link status (stop state, ULPS entry per lane)
    Status,
    /// Software reset control
    SwRst,
    /// Clock gating and escape-clock prescaler
    ClkCtrl,
    /// Low-power / bus-turnaround timeout programming
    Timeout,
    /// Escape-mode entry/exit requests
    Escmode,
    /// Main display resolution (lineval/hozval)
    Mdresol,
    /// Lane configuration
    Config,
    /// Interrupt source (write 1 to clear)
    IntSrc,
    /// Interrupt mask
    IntMsk,
    /// Packet header FIFO
    PktHdr,
    /// Packet payload FIFO
    Payload,
    /// Receive FIFO
    RxFifo,
    /// FIFO initialization / status
    FifoCtrl,
    /// Multi-packet (packet-go) control
    MultiPkt,
    /// PHY PLL control and frequency band
    PllCtrl,
}

impl Reg {
    /// Byte offset of the register inside the control block
    pub const fn offset(self) -> u32 {
        match self {
            Self::Status => 0x0000,
            Self::SwRst => 0x0004,
            Self::ClkCtrl => 0x0008,
            Self::Timeout => 0x000c,
            Self::Escmode => 0x0010,
            Self::Mdresol => 0x0014,
            Self::Config => 0x0018,
            Self::IntSrc => 0x002c,
            Self::IntMsk => 0x0030,
            Self::PktHdr => 0x0034,
            Self::Payload => 0x0038,
            Self::RxFifo => 0x003c,
            Self::FifoCtrl => 0x0044,
            Self::MultiPkt => 0x0078,
            Self::PllCtrl => 0x0094,
        }
    }
}

bitflags! {
    /// Interrupt source bits ([`Reg::IntSrc`], write 1 to clear)
    ///
    /// The embedding glue reads and acknowledges the hardware register in its
    /// interrupt handler and forwards the bits to
    /// [`DsimDevice::handle_interrupt`](crate::device::DsimDevice::handle_interrupt).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IntSrc: u32 {
        /// PHY PLL reached lock
        const PLL_STABLE = 1 << 31;
        /// Software reset released
        const SW_RST_RELEASE = 1 << 30;
        /// Payload FIFO drained to the link
        const SFR_PL_FIFO_EMPTY = 1 << 29;
        /// Packet-header FIFO drained to the link
        const SFR_PH_FIFO_EMPTY = 1 << 28;
        /// Frame transfer completed
        const FRAME_DONE = 1 << 24;
        /// Read response landed in the receive FIFO
        const RX_DATA_DONE = 1 << 18;
        /// CRC error in a received long packet
        const ERR_RX_CRC = 1 << 14;
        /// Uncorrectable ECC error in a received header
        const ERR_RX_ECC = 1 << 13;
        /// Transmit FIFO protocol fault (overrun / write while full)
        const ERR_SFR_FIFO = 1 << 12;
        /// Escape-mode entry sequence fault
        const ERR_ESC_MODE = 1 << 10;

        /// All error conditions counted against the link
        const ERRORS = Self::ERR_RX_CRC.bits()
            | Self::ERR_RX_ECC.bits()
            | Self::ERR_SFR_FIFO.bits()
            | Self::ERR_ESC_MODE.bits();
    }
}

// Status register fields

/// Clock lane has entered ULPS
pub const STATUS_ULPS_CLK: u32 = 1 << 9;

/// Clock lane is in stop state
pub const STATUS_STOP_STATE_CLK: u32 = 1 << 8;

/// ULPS entry bits for the first `lanes` data lanes
pub const fn status_ulps_lane_mask(lanes: u8) -> u32 {
    (((1u32 << lanes) - 1) & 0xf) << 4
}

/// Stop-state bits for the first `lanes` data lanes
pub const fn status_stop_state_lane_mask(lanes: u8) -> u32 {
    ((1u32 << lanes) - 1) & 0xf
}

// Software reset fields

/// Full controller reset
pub const SWRST_RESET: u32 = 1 << 0;

/// Function reset (protocol state only, registers retained)
pub const SWRST_FUNC: u32 = 1 << 16;

// Clock control fields

/// Request high-speed clock on the link
pub const CLKCTRL_TX_REQUEST_HSCLK: u32 = 1 << 31;

/// Gate for the escape clock
pub const CLKCTRL_ESCCLK_EN: u32 = 1 << 28;

/// Gate for the byte clock
pub const CLKCTRL_BYTECLK_EN: u32 = 1 << 24;

/// Escape-clock prescaler (byte clock / escape clock)
pub const CLKCTRL_ESC_PRESCALER_MASK: u32 = 0xffff;

// Escape mode fields

/// Request ULPS entry on the clock lane
pub const ESCMODE_TX_ULPS_CLK: u32 = 1 << 1;

/// Request ULPS exit on the clock lane
pub const ESCMODE_TX_ULPS_CLK_EXIT: u32 = 1 << 2;

/// Request ULPS entry on the data lanes
pub const ESCMODE_TX_ULPS_DATA: u32 = 1 << 3;

/// Request ULPS exit on the data lanes
pub const ESCMODE_TX_ULPS_DATA_EXIT: u32 = 1 << 4;

/// Transmit commands in low-power mode
pub const ESCMODE_CMD_LPDT: u32 = 1 << 7;

/// All four ULPS request/exit bits
pub const ESCMODE_ULPS_MASK: u32 = ESCMODE_TX_ULPS_CLK
    | ESCMODE_TX_ULPS_CLK_EXIT
    | ESCMODE_TX_ULPS_DATA
    | ESCMODE_TX_ULPS_DATA_EXIT;

// Lane configuration fields

/// Clock lane enable
pub const CONFIG_LANE_EN_CLK: u32 = 1 << 4;

/// Data lane enable bits for the first `lanes` lanes
pub const fn config_lane_en_mask(lanes: u8) -> u32 {
    ((1u32 << lanes) - 1) & 0xf
}

/// Encoded data-lane count field
pub const fn config_num_of_data_lane(lanes: u8) -> u32 {
    ((lanes as u32).saturating_sub(1) & 0x3) << 5
}

// Resolution fields

/// Shift of the vertical line count inside [`Reg::Mdresol`]
pub const MDRESOL_LINEVAL_SHIFT: u32 = 16;

/// Vertical line count field
pub const MDRESOL_LINEVAL_MASK: u32 = 0xfff << MDRESOL_LINEVAL_SHIFT;

/// Horizontal pixel count field
pub const MDRESOL_HOZVAL_MASK: u32 = 0xfff;

// FIFO control fields

/// Reinitialize the receive FIFO
pub const FIFOCTRL_INIT_RX: u32 = 1 << 4;

/// Reinitialize the packet-header FIFO
pub const FIFOCTRL_INIT_SFR: u32 = 1 << 3;

/// Reinitialize the payload FIFO
pub const FIFOCTRL_INIT_PL: u32 = 1 << 2;

/// Reinitialize every transmit/receive FIFO
pub const FIFOCTRL_INIT_ALL: u32 = FIFOCTRL_INIT_RX | FIFOCTRL_INIT_SFR | FIFOCTRL_INIT_PL;

// Multi-packet (packet-go) fields

/// Hold transmitted packets until the go-ready strobe
pub const MULTI_PKT_GO_EN: u32 = 1 << 31;

/// Release every held packet (self-clearing strobe)
pub const MULTI_PKT_GO_RDY: u32 = 1 << 30;

// PLL control fields

/// PHY PLL enable
pub const PLLCTRL_PLL_EN: u32 = 1 << 23;

/// Shift of the frequency-band selector
pub const PLLCTRL_FREQ_BAND_SHIFT: u32 = 24;

/// Frequency-band selector field
pub const PLLCTRL_FREQ_BAND_MASK: u32 = 0x1f << PLLCTRL_FREQ_BAND_SHIFT;

//! Link configuration types and builder

use core::time::Duration;

pub use crate::error::ConfigError;

/// Largest supported data-lane count
pub const MAX_DATA_LANES: u8 = 4;

/// Largest escape-clock rate the PHY supports, in Hz
pub const MAX_ESCAPE_CLK_HZ: u64 = 20_000_000;

/// Default bound for a command transaction's completion wait, in milliseconds
///
/// Chosen as an explicit configuration constant; override through
/// [`Builder::command_timeout`] when the platform knows better.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 100;

/// Default number of local retries after a hardware write error
pub const DEFAULT_WRITE_RETRIES: u32 = 3;

/// Default cumulative write-error count past which the link reports degraded
pub const DEFAULT_DEGRADE_THRESHOLD: u32 = 16;

/// Link configuration for one controller instance
///
/// Use [`Builder`] to create a validated `LinkConfig`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    /// Active data-lane count, 1..=4
    pub data_lane_cnt: u8,
    /// High-speed bit clock in Hz
    pub hs_clk_hz: u64,
    /// Escape clock in Hz
    pub escape_clk_hz: u64,
    /// Byte clock in Hz (high-speed clock / 8 unless overridden)
    pub byte_clk_hz: u64,
    /// PHY frequency-band selector
    pub freq_band: u8,
    /// Whether the packet-go batch controller is available on this build
    pub pktgo_capable: bool,
    /// Bound for every completion wait of the transaction engine
    pub command_timeout: Duration,
    /// Local retries after a hardware write error before surfacing it
    pub write_retries: u32,
    /// Cumulative write-error count past which failures report as degraded
    pub degrade_threshold: u32,
}

/// Panel timing and geometry descriptor
///
/// Carried for the sink side and the panel driver; the link core passes it
/// through `GET_LCD_INFO` / `SET_PORCH` without reinterpreting any field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LcdTiming {
    /// Transfer mode of the attached panel
    pub mode: DisplayMode,
    /// Horizontal resolution in pixels
    pub xres: u32,
    /// Vertical resolution in pixels
    pub yres: u32,
    /// Horizontal front porch in pixels
    pub hfp: u32,
    /// Horizontal back porch in pixels
    pub hbp: u32,
    /// Horizontal sync width in pixels
    pub hsa: u32,
    /// Vertical front porch in lines
    pub vfp: u32,
    /// Vertical back porch in lines
    pub vbp: u32,
    /// Vertical sync width in lines
    pub vsa: u32,
    /// Refresh rate in frames per second
    pub fps: u32,
    /// Physical width in millimeters
    pub width_mm: u32,
    /// Physical height in millimeters
    pub height_mm: u32,
}

/// Transfer mode of the attached panel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// Continuous video stream, panel has no frame memory
    Video,
    /// Command mode, panel refreshes from its own frame memory
    #[default]
    Command,
}

/// Builder for constructing a link configuration
///
/// # Example
///
/// ```
/// use dsim::{Builder, LinkConfig};
///
/// let config: LinkConfig = match Builder::new()
///     .data_lanes(4)
///     .hs_clk_hz(1_100_000_000)
///     .escape_clk_hz(16_000_000)
///     .freq_band(0x18)
///     .pktgo(true)
///     .build()
/// {
///     Ok(config) => config,
///     Err(_) => return,
/// };
/// assert_eq!(config.byte_clk_hz, 137_500_000);
/// ```
#[must_use]
pub struct Builder {
    data_lane_cnt: u8,
    hs_clk_hz: u64,
    escape_clk_hz: u64,
    byte_clk_hz: Option<u64>,
    freq_band: u8,
    pktgo_capable: bool,
    command_timeout: Duration,
    write_retries: u32,
    degrade_threshold: u32,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            data_lane_cnt: 4,
            // Common defaults for a full-HD command-mode panel; platforms
            // override from their board description.
            hs_clk_hz: 1_100_000_000,
            escape_clk_hz: 16_000_000,
            byte_clk_hz: None,
            freq_band: 0,
            pktgo_capable: false,
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            write_retries: DEFAULT_WRITE_RETRIES,
            degrade_threshold: DEFAULT_DEGRADE_THRESHOLD,
        }
    }
}

impl Builder {
    /// Create a new Builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active data-lane count (1..=4)
    pub fn data_lanes(mut self, lanes: u8) -> Self {
        self.data_lane_cnt = lanes;
        self
    }

    /// Set the high-speed bit clock in Hz
    pub fn hs_clk_hz(mut self, hz: u64) -> Self {
        self.hs_clk_hz = hz;
        self
    }

    /// Set the escape clock in Hz
    pub fn escape_clk_hz(mut self, hz: u64) -> Self {
        self.escape_clk_hz = hz;
        self
    }

    /// Override the byte clock; defaults to high-speed clock / 8
    pub fn byte_clk_hz(mut self, hz: u64) -> Self {
        self.byte_clk_hz = Some(hz);
        self
    }

    /// Set the PHY frequency-band selector
    pub fn freq_band(mut self, band: u8) -> Self {
        self.freq_band = band;
        self
    }

    /// Enable or disable the packet-go batch controller
    pub fn pktgo(mut self, capable: bool) -> Self {
        self.pktgo_capable = capable;
        self
    }

    /// Set the completion-wait bound for command transactions
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the local retry count for hardware write errors
    pub fn write_retries(mut self, retries: u32) -> Self {
        self.write_retries = retries;
        self
    }

    /// Set the cumulative write-error count that reports the link degraded
    pub fn degrade_threshold(mut self, threshold: u32) -> Self {
        self.degrade_threshold = threshold;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLaneCount`] for a lane count outside
    /// 1..=4 and [`ConfigError::InvalidClockRate`] for a zero high-speed
    /// clock or an escape clock of zero or above [`MAX_ESCAPE_CLK_HZ`].
    pub fn build(self) -> Result<LinkConfig, ConfigError> {
        if self.data_lane_cnt == 0 || self.data_lane_cnt > MAX_DATA_LANES {
            return Err(ConfigError::InvalidLaneCount {
                lanes: self.data_lane_cnt,
            });
        }
        if self.hs_clk_hz == 0 {
            return Err(ConfigError::InvalidClockRate {
                clock: "high-speed",
                hz: self.hs_clk_hz,
            });
        }
        if self.escape_clk_hz == 0 || self.escape_clk_hz > MAX_ESCAPE_CLK_HZ {
            return Err(ConfigError::InvalidClockRate {
                clock: "escape",
                hz: self.escape_clk_hz,
            });
        }
        Ok(LinkConfig {
            data_lane_cnt: self.data_lane_cnt,
            hs_clk_hz: self.hs_clk_hz,
            escape_clk_hz: self.escape_clk_hz,
            byte_clk_hz: self.byte_clk_hz.unwrap_or(self.hs_clk_hz / 8),
            freq_band: self.freq_band,
            pktgo_capable: self.pktgo_capable,
            command_timeout: self.command_timeout,
            write_retries: self.write_retries,
            degrade_threshold: self.degrade_threshold,
        })
    }
}

//! Link power and clock resources
//!
//! The core never talks to a clock tree or a regulator framework directly;
//! it owns a [`DsimResources`] set of collaborator handles and drives them
//! as a scoped sequence. Bring-up order is power rails (observing each
//! rail's post-enable settle delay), then the reset line, then the three
//! link clocks; teardown is the exact reverse, observing each rail's
//! pre-disable delay. A partial bring-up failure unwinds only what was
//! already acquired, in reverse order, before the failure surfaces.
//!
//! Reset lines come for free from any `embedded-hal` output pin via a
//! blanket [`ResetLine`] impl; settle delays go through
//! [`embedded_hal::delay::DelayNs`], with [`StdDelay`] as the host-side
//! implementation.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// Fault reported by a resource collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceError {
    /// Name of the resource that failed to switch
    pub resource: &'static str,
}

impl core::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.resource)
    }
}

impl core::error::Error for ResourceError {}

/// A gateable link clock
///
/// Disable must not fail; a clock that cannot be ungated on teardown is a
/// platform bug to log, not an error the link core can act on.
pub trait LinkClock: Send {
    /// Ungate the clock
    fn enable(&mut self) -> Result<(), ResourceError>;
    /// Gate the clock
    fn disable(&mut self);
}

/// A switchable power rail
pub trait PowerRail: Send {
    /// Switch the rail on
    fn enable(&mut self) -> Result<(), ResourceError>;
    /// Switch the rail off
    fn disable(&mut self) -> Result<(), ResourceError>;
}

/// The panel/PHY reset line
///
/// Pin-level faults are ignored the way a GPIO reset toggle always is; a
/// reset line that cannot toggle shows up immediately as a dead link.
pub trait ResetLine: Send {
    /// Drive the line to its asserted (reset) level
    fn assert_reset(&mut self);
    /// Release the line
    fn release_reset(&mut self);
}

impl<P: OutputPin + Send> ResetLine for P {
    fn assert_reset(&mut self) {
        let _ = self.set_low();
    }

    fn release_reset(&mut self) {
        let _ = self.set_high();
    }
}

/// One power rail plus its settle delays
pub struct RegulatorInfo {
    /// The rail collaborator
    pub rail: Box<dyn PowerRail>,
    /// Delay after enabling, in microseconds
    pub on_delay_us: u32,
    /// Delay before disabling, in microseconds
    pub off_delay_us: u32,
}

impl RegulatorInfo {
    /// Pair a rail with its settle delays
    pub fn new(rail: Box<dyn PowerRail>, on_delay_us: u32, off_delay_us: u32) -> Self {
        Self {
            rail,
            on_delay_us,
            off_delay_us,
        }
    }
}

/// Number of power-rail slots in a resource set
pub const LCD_PWR_RAILS: usize = 3;

/// The full resource set of one controller instance
///
/// Owned exclusively by the controller's device context and released on
/// detach or on any bring-up failure.
pub struct DsimResources {
    /// Bus interface clock
    pub pclk: Box<dyn LinkClock>,
    /// PHY escape clock
    pub dphy_esc: Box<dyn LinkClock>,
    /// PHY byte clock
    pub dphy_byte: Box<dyn LinkClock>,
    /// Panel/PHY reset line, if the board wires one
    pub reset: Option<Box<dyn ResetLine>>,
    /// Panel power rails, in bring-up order
    pub lcd_pwr: [Option<RegulatorInfo>; LCD_PWR_RAILS],
    /// Delay source for settle times
    pub delay: Box<dyn DelayNs + Send>,
}

impl DsimResources {
    /// Assemble a resource set from the three link clocks and a delay source
    pub fn new(
        pclk: Box<dyn LinkClock>,
        dphy_esc: Box<dyn LinkClock>,
        dphy_byte: Box<dyn LinkClock>,
        delay: Box<dyn DelayNs + Send>,
    ) -> Self {
        Self {
            pclk,
            dphy_esc,
            dphy_byte,
            reset: None,
            lcd_pwr: [None, None, None],
            delay,
        }
    }

    /// Attach a reset line
    pub fn with_reset(mut self, reset: Box<dyn ResetLine>) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Attach a power rail in the next free slot
    ///
    /// Rails are brought up in the order they were attached. A fourth rail
    /// is silently ignored only in release builds; debug builds assert.
    pub fn with_rail(mut self, rail: RegulatorInfo) -> Self {
        let slot = self.lcd_pwr.iter_mut().find(|s| s.is_none());
        debug_assert!(slot.is_some(), "all {LCD_PWR_RAILS} rail slots occupied");
        if let Some(slot) = slot {
            *slot = Some(rail);
        }
        self
    }

    /// Bring every resource up, in order, observing settle delays
    ///
    /// On failure, everything acquired so far has been released again (in
    /// reverse order) before the error returns.
    pub(crate) fn acquire(&mut self) -> Result<(), ResourceError> {
        let mut rails_on = 0;
        for i in 0..LCD_PWR_RAILS {
            let (switched, on_delay_us) = match &mut self.lcd_pwr[i] {
                Some(reg) => (reg.rail.enable(), reg.on_delay_us),
                None => continue,
            };
            if let Err(e) = switched {
                log::error!("rail {i} failed to enable: {e}");
                self.power_off_rails(rails_on);
                return Err(e);
            }
            self.delay.delay_us(on_delay_us);
            rails_on = i + 1;
        }

        if let Some(reset) = &mut self.reset {
            reset.release_reset();
        }

        if let Err(e) = self.pclk.enable() {
            log::error!("pclk failed to enable: {e}");
            self.assert_reset_line();
            self.power_off_rails(rails_on);
            return Err(e);
        }
        if let Err(e) = self.dphy_esc.enable() {
            log::error!("dphy_esc failed to enable: {e}");
            self.pclk.disable();
            self.assert_reset_line();
            self.power_off_rails(rails_on);
            return Err(e);
        }
        if let Err(e) = self.dphy_byte.enable() {
            log::error!("dphy_byte failed to enable: {e}");
            self.dphy_esc.disable();
            self.pclk.disable();
            self.assert_reset_line();
            self.power_off_rails(rails_on);
            return Err(e);
        }

        log::debug!("link resources acquired ({rails_on} rails)");
        Ok(())
    }

    /// Release every resource in reverse acquisition order
    pub(crate) fn release(&mut self) {
        self.dphy_byte.disable();
        self.dphy_esc.disable();
        self.pclk.disable();
        self.assert_reset_line();
        let rails = self.lcd_pwr.iter().flatten().count();
        self.power_off_rails(rails);
        log::debug!("link resources released");
    }

    fn assert_reset_line(&mut self) {
        if let Some(reset) = &mut self.reset {
            reset.assert_reset();
        }
    }

    /// Switch off the first `count` rails, last first, observing off-delays
    fn power_off_rails(&mut self, count: usize) {
        for slot in self.lcd_pwr[..count].iter_mut().rev() {
            let Some(reg) = slot else { continue };
            self.delay.delay_us(reg.off_delay_us);
            if let Err(e) = reg.rail.disable() {
                log::warn!("rail failed to disable: {e}");
            }
        }
    }
}

/// Host-side delay source backed by `std::thread::sleep`
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(core::time::Duration::from_nanos(ns as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClock, MockDelay, MockRail, MockReset, event_log};

    fn rail(name: &'static str, log: &crate::testing::EventLog, fail: bool) -> RegulatorInfo {
        RegulatorInfo::new(Box::new(MockRail::new(name, log, fail)), 100, 50)
    }

    fn resources(log: &crate::testing::EventLog) -> DsimResources {
        DsimResources::new(
            Box::new(MockClock::new("pclk", log, false)),
            Box::new(MockClock::new("dphy_esc", log, false)),
            Box::new(MockClock::new("dphy_byte", log, false)),
            Box::new(MockDelay::new(log)),
        )
        .with_reset(Box::new(MockReset::new(log)))
        .with_rail(rail("vdd1", log, false))
        .with_rail(rail("vdd2", log, false))
    }

    #[test]
    fn test_acquire_orders_rails_reset_clocks() {
        let log = event_log();
        let mut res = resources(&log);
        assert!(res.acquire().is_ok());
        assert_eq!(
            *log.lock(),
            vec![
                "vdd1 on",
                "delay 100us",
                "vdd2 on",
                "delay 100us",
                "reset released",
                "pclk on",
                "dphy_esc on",
                "dphy_byte on",
            ]
        );
    }

    #[test]
    fn test_release_is_reverse_of_acquire() {
        let log = event_log();
        let mut res = resources(&log);
        assert!(res.acquire().is_ok());
        log.lock().clear();
        res.release();
        assert_eq!(
            *log.lock(),
            vec![
                "dphy_byte off",
                "dphy_esc off",
                "pclk off",
                "reset asserted",
                "delay 50us",
                "vdd2 off",
                "delay 50us",
                "vdd1 off",
            ]
        );
    }

    #[test]
    fn test_rail_failure_unwinds_earlier_rails_only() {
        let log = event_log();
        let mut res = DsimResources::new(
            Box::new(MockClock::new("pclk", &log, false)),
            Box::new(MockClock::new("dphy_esc", &log, false)),
            Box::new(MockClock::new("dphy_byte", &log, false)),
            Box::new(MockDelay::new(&log)),
        )
        .with_rail(rail("vdd1", &log, false))
        .with_rail(rail("vdd2", &log, true));

        let err = res.acquire();
        assert_eq!(err, Err(ResourceError { resource: "vdd2" }));
        assert_eq!(
            *log.lock(),
            vec!["vdd1 on", "delay 100us", "delay 50us", "vdd1 off"]
        );
    }

    #[test]
    fn test_clock_failure_unwinds_reset_and_rails() {
        let log = event_log();
        let mut res = DsimResources::new(
            Box::new(MockClock::new("pclk", &log, false)),
            Box::new(MockClock::new("dphy_esc", &log, true)),
            Box::new(MockClock::new("dphy_byte", &log, false)),
            Box::new(MockDelay::new(&log)),
        )
        .with_reset(Box::new(MockReset::new(&log)))
        .with_rail(rail("vdd1", &log, false));

        let err = res.acquire();
        assert_eq!(err, Err(ResourceError { resource: "dphy_esc" }));
        assert_eq!(
            *log.lock(),
            vec![
                "vdd1 on",
                "delay 100us",
                "reset released",
                "pclk on",
                "pclk off",
                "reset asserted",
                "delay 50us",
                "vdd1 off",
            ]
        );
    }
}

//! Command transaction engine and packet-go batching
//!
//! All command traffic on one controller funnels through here, serialized
//! by the context's transaction lock for the full duration of each
//! transaction. The link state is re-checked under that lock immediately
//! before any register traffic; outside the high-speed state nothing
//! touches hardware.
//!
//! ## Write path
//!
//! Short packets are a single header-FIFO write; long packets stream their
//! payload through the payload FIFO first, then the header releases them.
//! The engine waits for the matching FIFO-drain completion, bounded by the
//! configured command timeout, then polls the error interrupt bits. A
//! protocol-level write fault increments the context's error counter and
//! is retried up to the configured bound before surfacing — as
//! [`DsimError::LinkDegraded`] once the counter has crossed the configured
//! threshold, as [`DsimError::HardwareWrite`] below it.
//!
//! ## Read path
//!
//! A read bounds the response size first, rearms the read completion,
//! issues the request and blocks until the response lands or the timeout
//! expires. The receive FIFO is then drained — at most
//! [`MAX_RX_FIFO`] bytes — and the caller gets exactly the requested byte
//! count or an error; never a short success. The hardware's read-done
//! sentinel terminates the drain and is never surfaced as data.
//!
//! ## Packet-go
//!
//! With batching enabled, writes enqueue instead of transmitting. The
//! queued set is released in enqueue order by [`DsimDevice::pkt_go_ready`]
//! (or by disabling batch mode, which flushes first — queued commands are
//! never dropped), with a single go-ready strobe releasing the whole set.

use crate::device::{DsimDevice, Inner, LinkState};
use crate::error::DsimError;
use crate::interface::LinkRegisters;
use crate::packet::{
    Packet, RX_ACK_AND_ERROR, RX_DCS_LONG, RX_DCS_SHORT_1, RX_DCS_SHORT_2, RX_EOT,
    RX_GENERIC_LONG, RX_GENERIC_SHORT_1, RX_GENERIC_SHORT_2,
};
use crate::regs::{self, IntSrc, MAX_RX_FIFO, PKTHDR_FIFO_CNT, RX_FIFO_READ_DONE, Reg};

/// Batch-mode state of one controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PktGoState {
    /// Writes transmit immediately
    #[default]
    Disabled,
    /// Writes enqueue until released
    Enabled,
}

/// Region of a partial display update, in panel coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartialArea {
    /// Left edge in pixels
    pub x: u16,
    /// Top edge in lines
    pub y: u16,
    /// Width in pixels
    pub w: u16,
    /// Height in lines
    pub h: u16,
}

impl PartialArea {
    /// Describe a partial-update region
    pub fn new(x: u16, y: u16, w: u16, h: u16) -> Self {
        Self { x, y, w, h }
    }
}

// DCS commands issued by the partial-update sequence
const DCS_SET_COLUMN_ADDRESS: u8 = 0x2a;
const DCS_SET_PAGE_ADDRESS: u8 = 0x2b;

impl<I: LinkRegisters> DsimDevice<I> {
    /// Send one command packet over the link
    ///
    /// Serialized against all other command traffic on this controller.
    /// With batch mode enabled the packet is enqueued instead and released
    /// by [`DsimDevice::pkt_go_ready`].
    ///
    /// # Errors
    ///
    /// [`DsimError::InvalidLinkState`] outside the high-speed state,
    /// [`DsimError::PayloadTooLarge`] beyond the FIFO depth,
    /// [`DsimError::TransactionTimeout`] on a missing completion, and
    /// [`DsimError::HardwareWrite`] / [`DsimError::LinkDegraded`] after
    /// exhausted retries.
    pub fn write_command(&self, packet: &Packet) -> Result<(), DsimError> {
        let mut inner = self.lock_inner();
        Self::require_hs(&inner)?;
        if packet.payload.len() > PKTHDR_FIFO_CNT {
            return Err(DsimError::PayloadTooLarge {
                len: packet.payload.len(),
                max: PKTHDR_FIFO_CNT,
            });
        }

        if inner.pktgo == PktGoState::Enabled {
            if inner.pktgo_queue.len() >= PKTHDR_FIFO_CNT {
                // Queue at FIFO depth: release the current batch before
                // accepting more.
                self.pkt_go_flush(&mut inner)?;
            }
            inner.pktgo_queue.push_back(packet.clone());
            log::trace!(
                "{}: batched packet ({} pending)",
                self.id(),
                inner.pktgo_queue.len()
            );
            return Ok(());
        }

        self.transmit(&mut inner, packet)
    }

    /// Read `buf.len()` bytes from the peripheral at DCS register `addr`
    ///
    /// Blocks on the read completion with the configured timeout. On
    /// success the buffer is filled completely; there is no partial
    /// success.
    ///
    /// # Errors
    ///
    /// [`DsimError::InvalidLinkState`] outside the high-speed state,
    /// [`DsimError::PayloadTooLarge`] for requests of 0 or more than
    /// [`MAX_RX_FIFO`] bytes, [`DsimError::TransactionTimeout`] if no
    /// response arrives, and [`DsimError::ReadUnderrun`] when the response
    /// carried fewer bytes than requested.
    pub fn read_command(&self, addr: u8, buf: &mut [u8]) -> Result<(), DsimError> {
        let mut inner = self.lock_inner();
        Self::require_hs(&inner)?;
        let want = buf.len();
        if want == 0 || want > MAX_RX_FIFO {
            return Err(DsimError::PayloadTooLarge {
                len: want,
                max: MAX_RX_FIFO,
            });
        }

        self.transmit(&mut inner, &Packet::set_max_return_size(want as u16))?;

        // Rearm before the request goes out so the response cannot race the
        // wait, and so a stale signal from a timed-out predecessor is
        // discarded.
        self.read_comp.reinit();
        self.transmit(&mut inner, &Packet::dcs_read(addr))?;

        let timeout = self.config().command_timeout;
        if !self.read_comp.wait_timeout(timeout) {
            log::error!("{}: read {addr:#04x} timed out", self.id());
            inner.regs.write(Reg::FifoCtrl, regs::FIFOCTRL_INIT_RX);
            return Err(DsimError::TransactionTimeout {
                after_ms: timeout.as_millis() as u64,
            });
        }
        self.drain_rx(&mut inner, addr, buf)
    }

    /// Enable or disable packet-go batch mode
    ///
    /// Disabling with packets still queued flushes them first; nothing is
    /// dropped. A no-op on links configured without batch support.
    pub fn pkt_go_enable(&self, on: bool) -> Result<(), DsimError> {
        if !self.config().pktgo_capable {
            log::debug!("{}: packet-go not supported on this link", self.id());
            return Ok(());
        }
        let mut inner = self.lock_inner();
        Self::require_hs(&inner)?;
        if on {
            if inner.pktgo == PktGoState::Enabled {
                return Ok(());
            }
            inner
                .regs
                .write_mask(Reg::MultiPkt, regs::MULTI_PKT_GO_EN, regs::MULTI_PKT_GO_EN);
            inner.pktgo = PktGoState::Enabled;
            log::info!("{}: packet-go enabled", self.id());
        } else {
            if inner.pktgo == PktGoState::Disabled {
                return Ok(());
            }
            self.pkt_go_flush(&mut inner)?;
            inner
                .regs
                .write_mask(Reg::MultiPkt, 0, regs::MULTI_PKT_GO_EN);
            inner.pktgo = PktGoState::Disabled;
            log::info!("{}: packet-go disabled", self.id());
        }
        Ok(())
    }

    /// Release every packet queued since batch mode was enabled
    ///
    /// The queued set goes out in enqueue order, atomically with respect to
    /// other command traffic on this controller.
    pub fn pkt_go_ready(&self) -> Result<(), DsimError> {
        if !self.config().pktgo_capable {
            return Ok(());
        }
        let mut inner = self.lock_inner();
        Self::require_hs(&inner)?;
        self.pkt_go_flush(&mut inner)
    }

    /// Issue the partial-update window commands for `area`
    ///
    /// Both address packets go out back to back under one hold of the
    /// transaction lock.
    pub fn partial_area_command(&self, area: PartialArea) -> Result<(), DsimError> {
        let x_end = area.x.saturating_add(area.w).saturating_sub(1);
        let y_end = area.y.saturating_add(area.h).saturating_sub(1);
        let columns = Packet::dcs_write(
            DCS_SET_COLUMN_ADDRESS,
            &[
                (area.x >> 8) as u8,
                (area.x & 0xff) as u8,
                (x_end >> 8) as u8,
                (x_end & 0xff) as u8,
            ],
        );
        let pages = Packet::dcs_write(
            DCS_SET_PAGE_ADDRESS,
            &[
                (area.y >> 8) as u8,
                (area.y & 0xff) as u8,
                (y_end >> 8) as u8,
                (y_end & 0xff) as u8,
            ],
        );

        let mut inner = self.lock_inner();
        Self::require_hs(&inner)?;
        self.transmit(&mut inner, &columns)?;
        self.transmit(&mut inner, &pages)
    }

    /// Re-check the link state under the transaction lock
    fn require_hs(inner: &Inner<I>) -> Result<(), DsimError> {
        if inner.state != LinkState::HsClockEnabled {
            return Err(DsimError::InvalidLinkState { state: inner.state });
        }
        Ok(())
    }

    /// Transmit with bounded retry on hardware write errors
    fn transmit(&self, inner: &mut Inner<I>, packet: &Packet) -> Result<(), DsimError> {
        let mut attempt = 0;
        loop {
            match self.transmit_once(inner, packet) {
                Ok(()) => return Ok(()),
                Err(DsimError::HardwareWrite { err_cnt }) => {
                    if attempt < self.config().write_retries {
                        attempt += 1;
                        log::warn!(
                            "{}: write error (count {err_cnt}), retry {attempt}",
                            self.id()
                        );
                        continue;
                    }
                    if err_cnt >= self.config().degrade_threshold {
                        log::error!("{}: link degraded, {err_cnt} write errors", self.id());
                        return Err(DsimError::LinkDegraded { err_cnt });
                    }
                    return Err(DsimError::HardwareWrite { err_cnt });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn transmit_once(&self, inner: &mut Inner<I>, packet: &Packet) -> Result<(), DsimError> {
        let long = packet.di.is_long() && !packet.payload.is_empty();
        if long {
            self.pkt_pl_comp.reinit();
            Self::write_payload(inner, &packet.payload);
        }
        self.pkt_hd_comp.reinit();
        inner.regs.write(Reg::PktHdr, packet.header());

        let timeout = self.config().command_timeout;
        if !self.pkt_hd_comp.wait_timeout(timeout) {
            log::error!("{}: header fifo drain timed out", self.id());
            return Err(DsimError::TransactionTimeout {
                after_ms: timeout.as_millis() as u64,
            });
        }
        if long && !self.pkt_pl_comp.wait_timeout(timeout) {
            log::error!("{}: payload fifo drain timed out", self.id());
            return Err(DsimError::TransactionTimeout {
                after_ms: timeout.as_millis() as u64,
            });
        }
        self.check_write_errors(inner)
    }

    /// Poll and acknowledge the error interrupt bits after a transmission
    fn check_write_errors(&self, inner: &mut Inner<I>) -> Result<(), DsimError> {
        let errs = inner.regs.read_mask(Reg::IntSrc, IntSrc::ERRORS.bits());
        if errs == 0 {
            return Ok(());
        }
        inner.regs.write(Reg::IntSrc, errs); // write 1 to clear
        let err_cnt = self.bump_write_errors();
        log::warn!("{}: hardware write error {errs:#010x}", self.id());
        Err(DsimError::HardwareWrite { err_cnt })
    }

    fn write_payload(inner: &mut Inner<I>, payload: &[u8]) {
        for chunk in payload.chunks(4) {
            let mut word = 0u32;
            for (i, byte) in chunk.iter().enumerate() {
                word |= u32::from(*byte) << (8 * i);
            }
            inner.regs.write(Reg::Payload, word);
        }
    }

    /// Push the queued batch into the FIFOs and strobe the go-ready release
    fn pkt_go_flush(&self, inner: &mut Inner<I>) -> Result<(), DsimError> {
        let count = inner.pktgo_queue.len();
        if count == 0 {
            return Ok(());
        }
        self.pkt_hd_comp.reinit();
        while let Some(packet) = inner.pktgo_queue.pop_front() {
            if packet.di.is_long() && !packet.payload.is_empty() {
                Self::write_payload(inner, &packet.payload);
            }
            inner.regs.write(Reg::PktHdr, packet.header());
        }
        inner
            .regs
            .write_mask(Reg::MultiPkt, regs::MULTI_PKT_GO_RDY, regs::MULTI_PKT_GO_RDY);

        let timeout = self.config().command_timeout;
        if !self.pkt_hd_comp.wait_timeout(timeout) {
            log::error!("{}: batch release timed out", self.id());
            return Err(DsimError::TransactionTimeout {
                after_ms: timeout.as_millis() as u64,
            });
        }
        self.check_write_errors(inner)?;
        log::debug!("{}: released {count} batched packets", self.id());
        Ok(())
    }

    fn drain_rx(&self, inner: &mut Inner<I>, addr: u8, buf: &mut [u8]) -> Result<(), DsimError> {
        let want = buf.len();
        let mut word = inner.regs.read(Reg::RxFifo);
        // An EoT ahead of the response is legal; skip at most one.
        if (word & 0x3f) as u8 == RX_EOT {
            word = inner.regs.read(Reg::RxFifo);
        }

        let di = (word & 0x3f) as u8;
        match di {
            RX_ACK_AND_ERROR => {
                let err_cnt = self.bump_write_errors();
                log::warn!(
                    "{}: error report {:#06x} reading {addr:#04x}",
                    self.id(),
                    (word >> 8) & 0xffff
                );
                self.finish_rx(inner);
                Err(DsimError::HardwareWrite { err_cnt })
            }
            RX_GENERIC_SHORT_1 | RX_DCS_SHORT_1 => {
                if want > 1 {
                    self.finish_rx(inner);
                    return Err(DsimError::ReadUnderrun {
                        requested: want,
                        available: 1,
                    });
                }
                buf[0] = (word >> 8) as u8;
                self.finish_rx(inner);
                Ok(())
            }
            RX_GENERIC_SHORT_2 | RX_DCS_SHORT_2 => {
                if want > 2 {
                    self.finish_rx(inner);
                    return Err(DsimError::ReadUnderrun {
                        requested: want,
                        available: 2,
                    });
                }
                buf[0] = (word >> 8) as u8;
                if want == 2 {
                    buf[1] = (word >> 16) as u8;
                }
                self.finish_rx(inner);
                Ok(())
            }
            RX_GENERIC_LONG | RX_DCS_LONG => {
                let available = ((word >> 8) & 0xffff) as usize;
                let drain = available.min(MAX_RX_FIFO);
                let mut data = [0u8; MAX_RX_FIFO];
                let mut got = 0;
                while got < drain {
                    let payload = inner.regs.read(Reg::RxFifo);
                    for i in 0..4 {
                        if got < drain {
                            data[got] = (payload >> (8 * i)) as u8;
                            got += 1;
                        }
                    }
                }
                if available < want {
                    self.finish_rx(inner);
                    return Err(DsimError::ReadUnderrun {
                        requested: want,
                        available,
                    });
                }
                if available > want {
                    log::debug!(
                        "{}: response carried {} extra bytes",
                        self.id(),
                        available - want
                    );
                }
                buf.copy_from_slice(&data[..want]);
                self.finish_rx(inner);
                Ok(())
            }
            _ => {
                log::error!("{}: unexpected rx data id {di:#04x}", self.id());
                let err_cnt = self.bump_write_errors();
                inner.regs.write(Reg::FifoCtrl, regs::FIFOCTRL_INIT_RX);
                Err(DsimError::HardwareWrite { err_cnt })
            }
        }
    }

    /// Consume the read-done sentinel closing a response
    fn finish_rx(&self, inner: &mut Inner<I>) {
        let word = inner.regs.read(Reg::RxFifo);
        if word != RX_FIFO_READ_DONE {
            log::warn!(
                "{}: rx fifo not drained ({word:#010x}), reinitializing",
                self.id()
            );
            inner.regs.write(Reg::FifoCtrl, regs::FIFOCTRL_INIT_RX);
        }
    }
}

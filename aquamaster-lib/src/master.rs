// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

// The bus master scheduler.
//
// Everything runs on one task: a `select!` loop over the framed serial
// stream and a handful of timer deadlines. Handlers run to completion, so
// the head of the pending queue at read time is exactly the request whose
// reply just arrived, and the connected/data-valid flags are never observed
// half-updated.
//
// Transaction rules:
//  - requests leave the wire in FIFO enqueue order, one in flight at most;
//  - a reply is matched to the request at the head of the queue, and it is
//    attributed to the address the *request* was sent to (slaves echo their
//    address, but the master is authoritative);
//  - a request that stays unanswered past the reply timeout is dropped;
//    only the per-device liveness timer may mark a slave disconnected;
//  - consecutive frames are separated by the inter-frame gap.

use std::collections::VecDeque;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};
use tokio_util::codec::Framed;

use aqualink_frame::codec::{FrameCodec, Message};
use aqualink_frame::frame;

use crate::errors::{MasterError, QueueError, SerialError};
use crate::property::{PropertyStore, PropertyType};
use crate::registry::DeviceRegistry;
use crate::settings::BusSettings;

/// Offered to every disconnected slave on each probe cycle.
pub const PROBE_REQUEST: u8 = 0x00;
/// A slave's answer to a probe; flips its device to connected.
pub const PROBE_RESPONSE: u8 = 0x01;

/// Encoded request frames never exceed this many bytes.
pub const MAX_FRAME_LEN: usize = 32;
/// Buffer handed to slaves composing an outgoing message.
pub const MAX_MSG_LEN: usize = 16;

#[derive(Debug)]
struct PendingRequest {
    /// The address the request was sent to; replies are attributed here.
    addr: u8,
    frame: Vec<u8>,
}

pub struct Master<S> {
    framed: Framed<S, FrameCodec>,
    registry: DeviceRegistry,
    /// Bus-wide values shared across slaves and exported to consumers.
    context: PropertyStore,
    settings: BusSettings,
    pending: VecDeque<PendingRequest>,

    probe_at: Instant,
    work_at: Instant,
    /// Armed while a transmitted request awaits its reply.
    reply_deadline: Option<Instant>,
    /// Armed after a frame completes; holds off the next transmission.
    gap_until: Option<Instant>,
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Master<S> {
    pub fn new(stream: S, registry: DeviceRegistry, settings: BusSettings) -> Self {
        let now = Instant::now();

        let mut context = PropertyStore::new();
        context.declare("pool_temp", PropertyType::Int);
        context.declare("spa_temp", PropertyType::Int);

        Self {
            framed: Framed::new(stream, FrameCodec),
            registry,
            context,
            probe_at: now + settings.probe_initial_delay,
            work_at: now + settings.work_initial_delay,
            settings,
            pending: VecDeque::new(),
            reply_deadline: None,
            gap_until: None,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn context(&self) -> &PropertyStore {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut PropertyStore {
        &mut self.context
    }

    /// Drive the bus until the serial stream dies.
    pub async fn run(&mut self) -> Result<(), MasterError> {
        loop {
            let liveness = self.registry.next_expiry();

            tokio::select! {
                item = self.framed.next() => match item {
                    Some(Ok(Ok(reply))) => self.handle_reply(reply).await?,
                    Some(Ok(Err(err))) => {
                        // Corrupt frame: drop it and let the reply timeout
                        // advance the queue.
                        log::error!("Error decoding frame: {err}");
                    }
                    Some(Err(err)) => return Err(SerialError::IO(err).into()),
                    None => {
                        log::error!("tty EOF. shutting down");
                        return Err(MasterError::StreamEof);
                    }
                },
                _ = time::sleep_until(self.probe_at) => self.probe_bus().await?,
                _ = time::sleep_until(self.work_at) => self.poll_devices().await?,
                _ = sleep_opt(self.reply_deadline), if self.reply_deadline.is_some() => {
                    self.reply_timed_out().await?;
                }
                _ = sleep_opt(self.gap_until), if self.gap_until.is_some() => {
                    self.gap_until = None;
                    self.send_head().await?;
                }
                _ = sleep_opt(liveness), if liveness.is_some() => self.expire_devices(),
            }
        }
    }

    /// Offer a probe to every slave that is not currently connected.
    async fn probe_bus(&mut self) -> Result<(), MasterError> {
        self.probe_at = Instant::now() + self.settings.probe_period;

        let offline: Vec<u8> = self
            .registry
            .iter()
            .filter(|dev| !dev.connected())
            .map(|dev| dev.addr())
            .collect();

        for addr in offline {
            let frame = frame::encode(&[addr, PROBE_REQUEST]);
            if let Err(err) = self.enqueue(addr, frame) {
                log::error!("Cannot queue probe for addr {addr:#04x}: {err}");
            }
        }

        self.send_head().await
    }

    /// Ask every registered slave for its next request and put the results
    /// on the wire.
    async fn poll_devices(&mut self) -> Result<(), MasterError> {
        if !self.pending.is_empty() {
            log::warn!("Bus contention. Delaying device work");
            self.work_at = Instant::now() + self.settings.contention_delay;
            return Ok(());
        }

        self.work_at = Instant::now() + self.settings.work_period;

        let mut requests: Vec<(u8, Vec<u8>)> = Vec::new();
        let context = &self.context;
        for dev in self.registry.iter_mut() {
            let mut buf = [0u8; MAX_MSG_LEN];
            match dev.poll_request(context, &mut buf) {
                Ok(len) if len <= buf.len() => {
                    requests.push((dev.addr(), frame::encode(&buf[..len])));
                }
                Ok(len) => {
                    log::error!(
                        "Slave addr={:#04x} composed a {len} byte message; ignoring",
                        dev.addr()
                    );
                }
                Err(err) if err.is_idle() => {}
                Err(err) => {
                    log::error!("Slave addr={:#04x} next request error: {err}", dev.addr());
                }
            }
        }

        for (addr, frame) in requests {
            if let Err(err) = self.enqueue(addr, frame) {
                log::error!("Cannot queue request for addr {addr:#04x}: {err}");
            }
        }

        self.send_head().await
    }

    fn enqueue(&mut self, addr: u8, frame: Vec<u8>) -> Result<(), QueueError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(QueueError::FrameTooLarge(frame.len()));
        }

        self.pending.push_back(PendingRequest { addr, frame });
        Ok(())
    }

    /// Transmit the queue head, unless the bus or the transaction state says
    /// not to: nothing pending, gap not yet elapsed, or a reply still
    /// outstanding.
    async fn send_head(&mut self) -> Result<(), MasterError> {
        if self.gap_until.is_some() || self.reply_deadline.is_some() {
            return Ok(());
        }

        let Some(request) = self.pending.front() else {
            return Ok(());
        };

        // The timeout must include the time to transmit the request frame.
        self.reply_deadline = Some(Instant::now() + self.settings.reply_timeout);

        self.framed
            .get_mut()
            .write_all(&request.frame)
            .await
            .map_err(SerialError::IO)?;

        log::debug!(
            "Sent {} byte frame to addr {:#04x}",
            request.frame.len(),
            request.addr
        );

        Ok(())
    }

    async fn handle_reply(&mut self, reply: Message) -> Result<(), MasterError> {
        let Some(request) = self.pending.pop_front() else {
            log::error!("Discarding unsolicited reply");
            return Ok(());
        };

        self.reply_deadline = None;
        self.gap_until = Some(Instant::now() + self.settings.interframe_gap);

        if let Err(err) = self.dispatch_reply(&request, &reply) {
            log::warn!(
                "Unhandled reply to request for addr {:#04x}: {err}",
                request.addr
            );
        }

        // Defers to the inter-frame gap just armed.
        self.send_head().await
    }

    fn dispatch_reply(
        &mut self,
        request: &PendingRequest,
        reply: &[u8],
    ) -> Result<(), MasterError> {
        if reply.len() < 2 {
            return Err(MasterError::ShortReply(reply.len()));
        }

        let Some(dev) = self.registry.lookup_mut(request.addr) else {
            return Err(MasterError::UnknownDevice(request.addr));
        };

        let result = match reply[1] {
            PROBE_RESPONSE => {
                if !dev.connected() {
                    log::info!("Device {} addr={:#04x} is on the bus", dev.kind(), dev.addr());
                }
                dev.mark_connected();
                Ok(())
            }
            _ => dev
                .handle_reply(&mut self.context, reply)
                .map_err(MasterError::from),
        };

        dev.touch(Instant::now() + self.settings.liveness_timeout);

        result
    }

    async fn reply_timed_out(&mut self) -> Result<(), MasterError> {
        self.reply_deadline = None;

        // Move on; we no longer expect a response to this request.
        if let Some(request) = self.pending.pop_front() {
            log::error!(
                "RS-485 timeout on request to device addr {:#04x}",
                request.addr
            );
        }

        self.send_head().await
    }

    fn expire_devices(&mut self) {
        let now = Instant::now();
        for dev in self.registry.iter_mut() {
            if dev.expires_at().is_some_and(|at| at <= now) {
                log::warn!("Communication lost with device addr={:#04x}", dev.addr());
                dev.mark_lost();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_rejects_oversized_frames() {
        let (bus, _remote) = tokio::io::duplex(64);
        let mut master = Master::new(bus, DeviceRegistry::new(), BusSettings::default());

        let err = master
            .enqueue(0x68, vec![0u8; MAX_FRAME_LEN + 1])
            .unwrap_err();
        assert_eq!(err, QueueError::FrameTooLarge(MAX_FRAME_LEN + 1));
        assert!(master.pending.is_empty());
    }

    #[test]
    fn enqueue_preserves_fifo_order() {
        let (bus, _remote) = tokio::io::duplex(64);
        let mut master = Master::new(bus, DeviceRegistry::new(), BusSettings::default());

        master.enqueue(0x68, frame::encode(&[0x68, 0x00])).unwrap();
        master.enqueue(0x40, frame::encode(&[0x40, 0x00])).unwrap();
        master.enqueue(0x10, frame::encode(&[0x10, 0x00])).unwrap();

        let order: Vec<u8> = master.pending.iter().map(|request| request.addr).collect();
        assert_eq!(order, [0x68, 0x40, 0x10]);
    }
}

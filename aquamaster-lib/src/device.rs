// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use std::fmt;

use tokio::time::Instant;

use crate::errors::{PropertyError, SlaveError};
use crate::property::PropertyStore;

/// Operations every supported slave type implements.
///
/// Implementations keep whatever rotation counters they need as own state;
/// per-device values live in the device's property store, and bus-wide
/// values (shared with other slaves and with consumers of the store) in the
/// master's context store.
pub trait SlaveOps: fmt::Debug {
    /// Short name for log lines.
    fn kind(&self) -> &'static str;

    /// Declare the device's property schema. Called once at registration.
    fn init_properties(&self, props: &mut PropertyStore) -> Result<(), PropertyError>;

    /// Compose the next outgoing message into `buf`: the slave address at
    /// offset 0, the command at offset 1, the rest command-specific. The
    /// buffer holds at least [`crate::master::MAX_MSG_LEN`] bytes. Returns
    /// the message length, or [`SlaveError::NoRequest`] /
    /// [`SlaveError::NotSupported`] when there is nothing to poll.
    fn next_request(
        &mut self,
        addr: u8,
        props: &mut PropertyStore,
        ctx: &PropertyStore,
        buf: &mut [u8],
    ) -> Result<usize, SlaveError>;

    /// Consume an unescaped reply (address byte, command byte, payload; at
    /// least two bytes) and fold it into the property stores.
    fn handle_reply(
        &mut self,
        props: &mut PropertyStore,
        ctx: &mut PropertyStore,
        reply: &[u8],
    ) -> Result<(), SlaveError>;
}

/// A slave on the bus: address, behavior, and per-device state.
#[derive(Debug)]
pub struct Device {
    addr: u8,
    ops: Box<dyn SlaveOps>,
    props: PropertyStore,
    connected: bool,
    data_valid: bool,
    expires_at: Option<Instant>,
}

impl Device {
    pub(crate) fn new(addr: u8, ops: Box<dyn SlaveOps>) -> Result<Self, PropertyError> {
        let mut props = PropertyStore::new();
        ops.init_properties(&mut props)?;

        Ok(Self {
            addr,
            ops,
            props,
            connected: false,
            data_valid: false,
            expires_at: None,
        })
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }

    pub fn kind(&self) -> &'static str {
        self.ops.kind()
    }

    /// Whether the device answered a probe more recently than the liveness
    /// window.
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Whether the property store holds data from a successfully parsed
    /// reply that has not expired.
    pub fn data_valid(&self) -> bool {
        self.data_valid
    }

    pub fn props(&self) -> &PropertyStore {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut PropertyStore {
        &mut self.props
    }

    pub(crate) fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub(crate) fn mark_connected(&mut self) {
        self.connected = true;
    }

    pub(crate) fn mark_lost(&mut self) {
        self.connected = false;
        self.data_valid = false;
        self.expires_at = None;
    }

    /// Push the liveness deadline out; called on every reply attributed to
    /// this device.
    pub(crate) fn touch(&mut self, deadline: Instant) {
        self.expires_at = Some(deadline);
    }

    pub(crate) fn poll_request(
        &mut self,
        ctx: &PropertyStore,
        buf: &mut [u8],
    ) -> Result<usize, SlaveError> {
        let Device { addr, ops, props, .. } = self;
        ops.next_request(*addr, props, ctx, buf)
    }

    pub(crate) fn handle_reply(
        &mut self,
        ctx: &mut PropertyStore,
        reply: &[u8],
    ) -> Result<(), SlaveError> {
        let Device { ops, props, .. } = self;
        ops.handle_reply(props, ctx, reply)?;
        self.data_valid = true;
        Ok(())
    }
}

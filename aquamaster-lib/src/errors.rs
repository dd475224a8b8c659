// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use std::io;

use thiserror::Error;

use crate::property::PropertyType;

// Rule of thumb: public-facing functions return `MasterError`. For
// crate-public/private functions you can use the more specific errors.

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("Serial connection error: {0}")]
    Serial(#[from] SerialError),

    #[error("Device registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Property store error: {0}")]
    Property(#[from] PropertyError),

    #[error("Request queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Slave device error: {0}")]
    Slave(#[from] SlaveError),

    #[error("Reply received for unregistered device address {0:#04x}")]
    UnknownDevice(u8),

    #[error("Reply of {0} bytes cannot carry an address and a command")]
    ShortReply(usize),

    #[error("Serial stream reached EOF")]
    StreamEof,
}

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Failed to interface in serial using tokio_serial: {0}")]
    TokioSerial(#[from] tokio_serial::Error),

    #[error("Failed to perform read/write operations on serial port: {0}")]
    IO(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Device address {0:#04x} is already registered")]
    DuplicateAddress(u8),

    #[error("Device registry is full ({0} slots)")]
    Full(usize),

    #[error("Device address 0 is reserved")]
    ReservedAddress,

    #[error("Device schema error: {0}")]
    Schema(#[from] PropertyError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("No property named {0:?}")]
    Missing(String),

    #[error("Property {name:?} holds a {found}, not a {expected}")]
    TypeMismatch {
        name: String,
        expected: PropertyType,
        found: PropertyType,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Frame of {0} bytes exceeds the pending request buffer")]
    FrameTooLarge(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlaveError {
    #[error("No request to send")]
    NoRequest,

    #[error("Polling is not supported by this device")]
    NotSupported,

    #[error("Reply to command {cmd:#04x} carries {got} bytes, expected at least {want}")]
    ShortReply { cmd: u8, want: usize, got: usize },

    #[error("Command {0:#04x} is not understood by this device")]
    UnknownCommand(u8),

    #[error("Display text of {0} bytes does not fit the panel line")]
    TextTooLong(usize),

    #[error("Property error: {0}")]
    Property(#[from] PropertyError),
}

impl SlaveError {
    /// The quiet "nothing to poll right now" cases, as opposed to faults.
    pub fn is_idle(&self) -> bool {
        matches!(self, SlaveError::NoRequest | SlaveError::NotSupported)
    }
}

// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

//! Capability of the OS/hardware layer.
//!
//! The bus never talks to hardware directly. It only enumerates
//! [`DeviceDescriptor`]s, opens [`DeviceHandle`]s and pushes or pulls
//! raw bytes through the channels of those handles.

use std::borrow::Cow;

use thiserror::Error;

use crate::TimeStamp;

pub mod memory;

#[cfg(feature = "midir")]
pub mod midir;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unavailable")]
    Unavailable,
    #[error("disconnected")]
    Disconnected,
    #[error("{msg}")]
    Backend { msg: Cow<'static, str> },
}

impl TransportError {
    pub fn backend(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Backend { msg: msg.into() }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Direction of a connection, seen from the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Messages flow from the device into the bus.
    Input,
    /// Messages flow from the bus to the device.
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities {
    /// The device transmits messages, i.e. it could be used as an input.
    pub transmit: bool,
    /// The device receives messages, i.e. it could be used as an output.
    pub receive: bool,
}

impl Capabilities {
    pub const INPUT: Self = Self {
        transmit: true,
        receive: false,
    };

    pub const OUTPUT: Self = Self {
        transmit: false,
        receive: true,
    };

    pub const INPUT_OUTPUT: Self = Self {
        transmit: true,
        receive: true,
    };

    #[must_use]
    pub const fn supports(self, direction: Direction) -> bool {
        match direction {
            Direction::Input => self.transmit,
            Direction::Output => self.receive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Availability {
    #[default]
    Available,
    /// Busy or otherwise refused by the transport.
    Unavailable,
}

/// Endpoint as reported by the transport.
///
/// Immutable for a given enumeration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    /// Opaque key of the endpoint, unique within the transport.
    pub id: String,
    /// Display name, not guaranteed to be unique.
    pub name: String,
    pub capabilities: Capabilities,
    pub availability: Availability,
}

impl DeviceDescriptor {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    #[must_use]
    pub fn supports(&self, direction: Direction) -> bool {
        self.capabilities.supports(direction)
    }
}

/// Invoked by the transport for each incoming message.
///
/// Could be invoked on any thread owned by the transport.
pub type ReceiveCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Receives messages from a device.
pub trait ReceiveChannel: Send {
    /// Stop delivery and release the channel.
    ///
    /// The callback is not invoked anymore after this function returned.
    fn close(self: Box<Self>) -> TransportResult<()>;
}

/// Transmits messages to a device.
pub trait TransmitChannel: Send {
    fn send(&mut self, message: &[u8], ts: Option<TimeStamp>) -> TransportResult<()>;

    fn close(self: Box<Self>) -> TransportResult<()>;
}

pub trait DeviceHandle: Send {
    fn descriptor(&self) -> &DeviceDescriptor;

    fn is_open(&self) -> bool;

    fn open(&mut self) -> TransportResult<()>;

    fn close(&mut self) -> TransportResult<()>;

    /// Fails with [`TransportError::Unavailable`] if the device cannot be opened.
    fn open_transmit_channel(&mut self) -> TransportResult<Box<dyn TransmitChannel>>;

    /// Fails with [`TransportError::Unavailable`] if the device cannot be opened.
    fn open_receive_channel(
        &mut self,
        callback: ReceiveCallback,
    ) -> TransportResult<Box<dyn ReceiveChannel>>;
}

pub trait Transport: Send + Sync {
    fn enumerate_devices(&self) -> TransportResult<Vec<DeviceDescriptor>>;

    fn open_device(&self, descriptor: &DeviceDescriptor) -> TransportResult<Box<dyn DeviceHandle>>;
}

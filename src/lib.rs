// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

#![allow(rustdoc::invalid_rust_codeblocks)]
#![doc = include_str!("../README.md")]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::pedantic)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(rustdoc::broken_intra_doc_links)]
// Repetitions of module/type names occur frequently when using many
// modules for keeping the size of the source files handy. Often
// types have the same name as their parent module.
#![allow(clippy::module_name_repetitions)]
// Repeating the type name in `..Default::default()` expressions
// is not needed since the context is obvious.
#![allow(clippy::default_trait_access)]

use std::time::{SystemTime, UNIX_EPOCH};

pub mod bus;
pub use self::bus::{BusConfig, MidiBus};

mod connection;

mod dispatch;

mod error;
pub use self::error::{CloseReport, Error, Result};

pub mod listener;
pub use self::listener::{MidiListener, SharedListener};

pub mod message;
pub use self::message::{
    decode, ControlChange, DecodedMessage, MetaMessage, MidiMessage, Note, ShortMessage,
    SystemExclusiveMessage,
};

pub mod registry;
pub use self::registry::{DeviceRegistry, DeviceSelector};

mod router;

pub mod transport;
pub use self::transport::{
    Availability, Capabilities, DeviceDescriptor, DeviceHandle, Direction, ReceiveCallback,
    ReceiveChannel, TransmitChannel, Transport, TransportError, TransportResult,
};

/// Wall-clock time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("{_0} ms")]
#[repr(transparent)]
pub struct TimeStamp(u64);

impl TimeStamp {
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn to_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        // A system clock before the epoch is not supported
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        Self(millis)
    }
}

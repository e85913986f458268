// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

use std::borrow::Cow;

use thiserror::Error;

use crate::{DeviceSelector, Direction, TransportError};

#[derive(Debug, Error)]
pub enum Error {
    /// The selector resolves to no device.
    #[error("no {direction} device {selector} found")]
    NotFound {
        direction: Direction,
        selector: DeviceSelector,
    },

    /// The device lacks the capability required for the direction.
    #[error("device \"{name}\" cannot be used as {direction}")]
    DirectionMismatch { name: String, direction: Direction },

    /// A connection with the same device name already exists.
    #[error("device \"{name}\" is already attached as {direction}")]
    AlreadyAttached { name: String, direction: Direction },

    /// The transport refused to open the device or one of its channels.
    #[error("device \"{name}\" is unavailable")]
    Unavailable {
        name: String,
        #[source]
        source: Option<TransportError>,
    },

    #[error("invalid MIDI message: {reason}")]
    InvalidMessage { reason: Cow<'static, str> },

    /// Some outputs rejected a message that has been sent to all others.
    #[error("failed to send message to {failed} of {total} output(s)")]
    Send { failed: usize, total: usize },

    #[error("bus is closed")]
    Closed,
}

impl Error {
    pub(crate) fn invalid_message(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of closing many connections or devices at once.
///
/// Each item is closed independently. Failures never abort the
/// remaining closures, they are collected here instead.
#[derive(Debug, Default)]
#[must_use]
pub struct CloseReport {
    pub closed: usize,
    pub failures: Vec<(String, TransportError)>,
}

impl CloseReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, name: &str, result: std::result::Result<(), TransportError>) {
        match result {
            Ok(()) => self.closed += 1,
            Err(err) => self.failures.push((name.to_owned(), err)),
        }
    }

    pub(crate) fn merge(&mut self, other: Self) {
        let Self { closed, failures } = other;
        self.closed += closed;
        self.failures.extend(failures);
    }

    /// Emit the single aggregate diagnostic for all failures.
    pub(crate) fn log_failures(&self, context: &str) {
        if self.failures.is_empty() {
            return;
        }
        let failures = self
            .failures
            .iter()
            .map(|(name, err)| format!("\"{name}\": {err}"))
            .collect::<Vec<_>>()
            .join(", ");
        log::warn!(
            "{context}: failed to close {num_failed} of {num_total} item(s): {failures}",
            num_failed = self.failures.len(),
            num_total = self.closed + self.failures.len(),
        );
    }
}

// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

//! Outbound router.
//!
//! All send operations of [`MidiBus`] end up in a single transmission
//! that delivers the message to every attached output.

use crate::{
    bus::BusShared, connection::Connection, ControlChange, Error, MidiBus, MidiMessage, Note,
    Result,
};

impl BusShared {
    /// Deliver a message to all outputs.
    ///
    /// The lock is held until all outputs have been served. A failing
    /// output does not prevent delivery to the remaining outputs.
    pub(crate) fn transmit(&self, message: &MidiMessage) -> Result<()> {
        let bytes = message.to_bytes();
        let ts = self.timestamp();
        let mut state = self.state.lock();
        if state.is_closed {
            log::warn!(
                "Failed to send message through closed bus \"{name}\"",
                name = self.name
            );
            return Err(Error::Closed);
        }
        let total = state.outputs.len();
        let mut failed = 0;
        state.outputs.for_each_mut(|output| {
            log::trace!(
                "Sending message to MIDI device \"{name}\": {bytes:x?}",
                name = output.descriptor().name
            );
            if let Err(err) = output.send(&bytes, ts) {
                log::warn!(
                    "Failed to send message to MIDI device \"{name}\": {err}",
                    name = output.descriptor().name
                );
                failed += 1;
            }
        });
        if failed > 0 {
            return Err(Error::Send { failed, total });
        }
        Ok(())
    }
}

/// Send operations.
///
/// Messages are sent to all attached outputs. Sending without any
/// attached outputs succeeds and has no effect.
impl MidiBus {
    /// Send a message in its canonical form.
    pub fn send_message(&self, message: &MidiMessage) -> Result<()> {
        self.shared.transmit(message)
    }

    /// Send a raw message.
    ///
    /// The first byte selects the kind of message. Excess data bytes of
    /// short messages are dropped and missing data bytes are set to 0.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        let message = MidiMessage::from_bytes(bytes)
            .inspect_err(|err| log::warn!("Failed to send {bytes:x?}: {err}"))?;
        self.send_message(&message)
    }

    /// Send a short message that consists of only the status byte.
    pub fn send_status(&self, status: i32) -> Result<()> {
        self.send_status_data(status, 0, 0)
    }

    pub fn send_status_data1(&self, status: i32, data1: i32) -> Result<()> {
        self.send_status_data(status, data1, 0)
    }

    /// Data bytes not used by the status are ignored.
    pub fn send_status_data(&self, status: i32, data1: i32, data2: i32) -> Result<()> {
        let message = MidiMessage::from_status_data(status, data1, data2).inspect_err(|err| {
            log::warn!("Failed to send status {status} with data {data1}/{data2}: {err}");
        })?;
        self.send_message(&message)
    }

    /// Send a channel message.
    ///
    /// The channel is combined with the command into the status byte.
    pub fn send_command(&self, command: i32, channel: i32, data1: i32, data2: i32) -> Result<()> {
        let message = MidiMessage::from_command(command, channel, data1, data2).inspect_err(|err| {
            log::warn!(
                "Failed to send command {command} on channel {channel} with data {data1}/{data2}: {err}"
            );
        })?;
        self.send_message(&message)
    }

    /// Arguments out of range are clamped.
    pub fn send_note_on(&self, channel: i32, pitch: i32, velocity: i32) -> Result<()> {
        self.send_message(&MidiMessage::note_on(channel, pitch, velocity))
    }

    pub fn send_note_on_event(&self, note: Note) -> Result<()> {
        let Note {
            channel,
            pitch,
            velocity,
        } = note;
        self.send_note_on(channel.into(), pitch.into(), velocity.into())
    }

    /// Arguments out of range are clamped.
    pub fn send_note_off(&self, channel: i32, pitch: i32, velocity: i32) -> Result<()> {
        self.send_message(&MidiMessage::note_off(channel, pitch, velocity))
    }

    pub fn send_note_off_event(&self, note: Note) -> Result<()> {
        let Note {
            channel,
            pitch,
            velocity,
        } = note;
        self.send_note_off(channel.into(), pitch.into(), velocity.into())
    }

    /// Arguments out of range are clamped.
    pub fn send_controller_change(&self, channel: i32, number: i32, value: i32) -> Result<()> {
        self.send_message(&MidiMessage::control_change(channel, number, value))
    }

    pub fn send_controller_change_event(&self, change: ControlChange) -> Result<()> {
        let ControlChange {
            channel,
            number,
            value,
        } = change;
        self.send_controller_change(channel.into(), number.into(), value.into())
    }
}

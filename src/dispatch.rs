// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

//! Inbound dispatcher.
//!
//! Turns raw bytes from the receive channels of attached inputs into
//! listener notifications.

use std::sync::Weak;

use crate::{
    bus::BusShared, connection::ConnectionId, DecodedMessage, MidiListener, MidiMessage, ReceiveCallback, SharedListener,
    TimeStamp,
};

/// Bind a receive channel of an input device to a bus.
///
/// The callback only holds a weak reference and silently drops
/// messages that arrive after the bus is gone.
pub(crate) fn receive_callback(
    bus: Weak<BusShared>,
    device_name: String,
    connection_id: ConnectionId,
) -> ReceiveCallback {
    Box::new(move |input: &[u8]| {
        let Some(bus) = bus.upgrade() else {
            log::debug!("Dropping message from MIDI device \"{device_name}\" of a dropped bus");
            return;
        };
        bus.dispatch(&device_name, connection_id, input);
    })
}

impl BusShared {
    /// Messages are only dispatched if they arrive through the receive
    /// channel of the currently attached input.
    pub(crate) fn dispatch(&self, device_name: &str, connection_id: ConnectionId, input: &[u8]) {
        log::trace!("Received message from MIDI device \"{device_name}\": {input:x?}");
        let message = match MidiMessage::from_bytes(input) {
            Ok(message) => message.normalize(),
            Err(err) => {
                log::warn!("Dropping message from MIDI device \"{device_name}\": {err}");
                return;
            }
        };
        let ts = self.timestamp();
        let listeners = {
            let state = self.state.lock();
            if state.is_closed {
                log::debug!("Dropping message from MIDI device \"{device_name}\" of a closed bus");
                return;
            }
            let is_attached = state
                .inputs
                .get(device_name)
                .is_some_and(|connection| connection.id() == connection_id);
            if !is_attached {
                log::debug!(
                    "Dropping message from MIDI device \"{device_name}\" that is not attached \
                     through connection {connection_id}"
                );
                return;
            }
            state.listeners.snapshot()
        };
        notify_listeners(&listeners, &message, ts);
    }
}

/// Notify all listeners in order, without holding any lock.
fn notify_listeners(
    listeners: &[SharedListener],
    message: &MidiMessage,
    ts: Option<TimeStamp>,
) {
    if listeners.is_empty() {
        return;
    }
    let decoded = message.decode();
    for listener in listeners {
        notify_listener(listener.as_ref(), message, decoded, ts);
    }
}

fn notify_listener(
    listener: &dyn MidiListener,
    message: &MidiMessage,
    decoded: DecodedMessage,
    ts: Option<TimeStamp>,
) {
    listener.midi_message(message, ts);
    match decoded {
        DecodedMessage::NoteOn(note) => {
            listener.note_on(note.channel, note.pitch, note.velocity);
            listener.note_on_event(note);
        }
        DecodedMessage::NoteOff(note) => {
            listener.note_off(note.channel, note.pitch, note.velocity);
            listener.note_off_event(note);
        }
        DecodedMessage::ControlChange(change) => {
            listener.controller_change(change.channel, change.number, change.value);
            listener.controller_change_event(change);
        }
        DecodedMessage::Other => (),
    }
}

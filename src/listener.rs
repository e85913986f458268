// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use crate::{ControlChange, MidiMessage, Note, TimeStamp};

/// Receives inbound messages of a bus.
///
/// For each message [`MidiListener::midi_message`] is invoked first.
/// Note-on, note-off and control change messages are then delivered
/// twice: once with plain integers and once as an event object. All
/// methods have an empty default implementation, i.e. implementors
/// only need to provide the callbacks they are interested in.
///
/// Callbacks are invoked synchronously on the thread of the transport
/// that delivers the message. A blocking listener delays all subsequent
/// listeners and all subsequent messages of the same device. Listeners
/// should therefore never block.
pub trait MidiListener: Send + Sync {
    /// Invoked for every message.
    ///
    /// The time stamp is `None` if time stamping is disabled.
    fn midi_message(&self, _message: &MidiMessage, _ts: Option<TimeStamp>) {}

    fn note_on(&self, _channel: u8, _pitch: u8, _velocity: u8) {}

    /// Also invoked for note-on messages with velocity 0.
    fn note_off(&self, _channel: u8, _pitch: u8, _velocity: u8) {}

    fn controller_change(&self, _channel: u8, _number: u8, _value: u8) {}

    fn note_on_event(&self, _note: Note) {}

    fn note_off_event(&self, _note: Note) {}

    fn controller_change_event(&self, _change: ControlChange) {}
}

/// Closures only receive the generic message callback.
impl<F> MidiListener for F
where
    F: Fn(&MidiMessage, Option<TimeStamp>) + Send + Sync,
{
    fn midi_message(&self, message: &MidiMessage, ts: Option<TimeStamp>) {
        self(message, ts);
    }
}

pub type SharedListener = Arc<dyn MidiListener>;

fn identity<L: MidiListener + ?Sized>(listener: &Arc<L>) -> *const () {
    Arc::as_ptr(listener).cast::<()>()
}

/// Listeners in registration order, compared by identity.
///
/// Copy-on-write for taking cheap snapshots during dispatch.
#[derive(Clone, Default)]
pub(crate) struct ListenerSet {
    listeners: Arc<Vec<SharedListener>>,
}

impl ListenerSet {
    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    fn position<L: MidiListener + ?Sized>(&self, listener: &Arc<L>) -> Option<usize> {
        let identity = identity(listener);
        self.listeners
            .iter()
            .position(|next| self::identity(next) == identity)
    }

    /// Returns `false` if the listener has already been added.
    pub(crate) fn insert(&mut self, listener: SharedListener) -> bool {
        if self.position(&listener).is_some() {
            return false;
        }
        Arc::make_mut(&mut self.listeners).push(listener);
        true
    }

    pub(crate) fn remove<L: MidiListener + ?Sized>(&mut self, listener: &Arc<L>) -> bool {
        let Some(index) = self.position(listener) else {
            return false;
        };
        Arc::make_mut(&mut self.listeners).remove(index);
        true
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<SharedListener>> {
        Arc::clone(&self.listeners)
    }
}

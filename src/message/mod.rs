// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

//! Decoding and encoding of MIDI byte messages.

use std::borrow::Cow;

use crate::{Error, Result};


pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const CONTROL_CHANGE: u8 = 0xb0;
pub const SYSTEM_EXCLUSIVE: u8 = 0xf0;
pub const SPECIAL_SYSTEM_EXCLUSIVE: u8 = 0xf7;
pub const META: u8 = 0xff;

const UNDEFINED_SYSTEM_COMMON_1: u8 = 0xf4;
const UNDEFINED_SYSTEM_COMMON_2: u8 = 0xf5;

pub const MAX_CHANNEL: u8 = 0x0f;
pub const MAX_DATA_VALUE: u8 = 0x7f;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp(value: i32, max: u8) -> u8 {
    value.clamp(0, i32::from(max)) as u8
}

/// Clamp an arbitrary integer into the range of MIDI channels.
#[must_use]
pub fn clamp_channel(channel: i32) -> u8 {
    clamp(channel, MAX_CHANNEL)
}

/// Clamp an arbitrary integer into the range of a 7-bit data byte.
#[must_use]
pub fn clamp_data(value: i32) -> u8 {
    clamp(value, MAX_DATA_VALUE)
}

fn checked_data(value: i32, what: &'static str) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|value| *value <= MAX_DATA_VALUE)
        .ok_or_else(|| Error::invalid_message(format!("{what} out of range: {value}")))
}

fn checked_status(status: i32) -> Result<u8> {
    let Some(status) = u8::try_from(status).ok().filter(|status| *status >= 0x80) else {
        return Err(Error::invalid_message(format!(
            "status byte out of range: {status}"
        )));
    };
    match status {
        SYSTEM_EXCLUSIVE => Err(Error::invalid_message(
            "system exclusive status in short message",
        )),
        UNDEFINED_SYSTEM_COMMON_1 | UNDEFINED_SYSTEM_COMMON_2 => Err(
            Error::invalid_message(format!("undefined status byte: {status:#04x}")),
        ),
        // Includes the end of system exclusive marker 0xf7 without any data
        _ => Ok(status),
    }
}

/// Number of data bytes that follow the given status byte in a short message.
#[must_use]
pub const fn short_message_data_len(status: u8) -> usize {
    match status {
        0x80..=0xbf | 0xe0..=0xef | 0xf2 => 2,
        0xc0..=0xdf | 0xf1 | 0xf3 => 1,
        _ => 0,
    }
}

/// A note event: channel, pitch and velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
}

impl Note {
    #[must_use]
    pub const fn new(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self {
            channel,
            pitch,
            velocity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlChange {
    pub channel: u8,
    pub number: u8,
    pub value: u8,
}

impl ControlChange {
    #[must_use]
    pub const fn new(channel: u8, number: u8, value: u8) -> Self {
        Self {
            channel,
            number,
            value,
        }
    }
}

/// Typed view of a [`MidiMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedMessage {
    NoteOn(Note),
    NoteOff(Note),
    ControlChange(ControlChange),
    /// Any other message, only available as [`MidiMessage`].
    Other,
}

/// Status byte followed by up to 2 data bytes.
///
/// Data bytes that are not used by the status are always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortMessage {
    bytes: [u8; 3],
}

impl ShortMessage {
    /// Build a short message from explicit integers.
    ///
    /// Data bytes are only validated if the status requires them,
    /// otherwise they are ignored.
    pub fn try_new(status: i32, data1: i32, data2: i32) -> Result<Self> {
        let status = checked_status(status)?;
        let data_len = short_message_data_len(status);
        let data1 = if data_len > 0 {
            checked_data(data1, "first data byte")?
        } else {
            0
        };
        let data2 = if data_len > 1 {
            checked_data(data2, "second data byte")?
        } else {
            0
        };
        Ok(Self {
            bytes: [status, data1, data2],
        })
    }

    /// Build a channel message from a command and a channel.
    pub fn try_with_channel(command: i32, channel: i32, data1: i32, data2: i32) -> Result<Self> {
        if !(0x80..0xf0).contains(&command) {
            return Err(Error::invalid_message(format!(
                "not a channel message command: {command}"
            )));
        }
        if !(0..=i32::from(MAX_CHANNEL)).contains(&channel) {
            return Err(Error::invalid_message(format!(
                "channel out of range: {channel}"
            )));
        }
        Self::try_new((command & 0xf0) | channel, data1, data2)
    }

    const fn channel_message(command: u8, channel: u8, data1: u8, data2: u8) -> Self {
        debug_assert!(channel <= MAX_CHANNEL);
        debug_assert!(data1 <= MAX_DATA_VALUE);
        debug_assert!(data2 <= MAX_DATA_VALUE);
        Self {
            bytes: [command | channel, data1, data2],
        }
    }

    #[must_use]
    pub const fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// The upper nibble for channel messages, the whole status byte otherwise.
    #[must_use]
    pub const fn command(&self) -> u8 {
        let status = self.status();
        if status < 0xf0 {
            status & 0xf0
        } else {
            status
        }
    }

    #[must_use]
    pub const fn channel(&self) -> u8 {
        self.status() & 0x0f
    }

    #[must_use]
    pub const fn data1(&self) -> u8 {
        self.bytes[1]
    }

    #[must_use]
    pub const fn data2(&self) -> u8 {
        self.bytes[2]
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..=short_message_data_len(self.status())]
    }
}

/// Complete system exclusive message, including the leading status byte.
///
/// All bytes between the leading status byte and an optional trailing
/// end marker are 7-bit data bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SystemExclusiveMessage {
    bytes: Vec<u8>,
}

impl SystemExclusiveMessage {
    pub fn try_new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        let Some((&(SYSTEM_EXCLUSIVE | SPECIAL_SYSTEM_EXCLUSIVE), data)) = bytes.split_first()
        else {
            return Err(Error::invalid_message(
                "system exclusive message must start with 0xf0 or 0xf7",
            ));
        };
        let data = data
            .strip_suffix(&[SPECIAL_SYSTEM_EXCLUSIVE])
            .unwrap_or(data);
        if let Some(byte) = data.iter().find(|byte| **byte > MAX_DATA_VALUE) {
            return Err(Error::invalid_message(format!(
                "invalid system exclusive data byte: {byte:#04x}"
            )));
        }
        Ok(Self { bytes })
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Meta event of a standard MIDI file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaMessage {
    kind: u8,
    data: Vec<u8>,
}

impl MetaMessage {
    /// The type must be a 7-bit value, the payload is arbitrary.
    pub fn try_new(kind: u8, data: impl Into<Vec<u8>>) -> Result<Self> {
        if kind > MAX_DATA_VALUE {
            return Err(Error::invalid_message(format!(
                "invalid meta message type: {kind}"
            )));
        }
        Ok(Self {
            kind,
            data: data.into(),
        })
    }

    #[must_use]
    pub const fn kind(&self) -> u8 {
        self.kind
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Canonical message for transmission and notification.
///
/// Only valid messages could be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MidiMessage {
    Short(ShortMessage),
    SystemExclusive(SystemExclusiveMessage),
    Meta(MetaMessage),
}

impl From<SystemExclusiveMessage> for MidiMessage {
    fn from(from: SystemExclusiveMessage) -> Self {
        Self::SystemExclusive(from)
    }
}

impl From<MetaMessage> for MidiMessage {
    fn from(from: MetaMessage) -> Self {
        Self::Meta(from)
    }
}

impl From<ShortMessage> for MidiMessage {
    fn from(from: ShortMessage) -> Self {
        Self::Short(from)
    }
}

impl MidiMessage {
    /// Parse a raw byte sequence.
    ///
    /// The first byte selects the message class. Short messages
    /// take at most 2 data bytes, any excess bytes are dropped.
    /// Missing data bytes are filled with 0.
    pub fn from_bytes(input: &[u8]) -> Result<Self> {
        match *input {
            [] => Err(Error::invalid_message("empty message")),
            [META, kind, ref data @ ..] => MetaMessage::try_new(kind, data).map(Into::into),
            [META] => Err(Error::invalid_message("meta message without type")),
            [SYSTEM_EXCLUSIVE | SPECIAL_SYSTEM_EXCLUSIVE, ..] => {
                SystemExclusiveMessage::try_new(input).map(Into::into)
            }
            [status, ref data @ ..] => {
                let data1 = data.first().copied().unwrap_or_default();
                let data2 = data.get(1).copied().unwrap_or_default();
                ShortMessage::try_new(status.into(), data1.into(), data2.into()).map(Into::into)
            }
        }
    }

    /// Status byte only. Required data bytes are set to 0.
    pub fn from_status(status: i32) -> Result<Self> {
        Self::from_status_data(status, 0, 0)
    }

    pub fn from_status_data1(status: i32, data1: i32) -> Result<Self> {
        Self::from_status_data(status, data1, 0)
    }

    pub fn from_status_data(status: i32, data1: i32, data2: i32) -> Result<Self> {
        ShortMessage::try_new(status, data1, data2).map(Into::into)
    }

    pub fn from_command(command: i32, channel: i32, data1: i32, data2: i32) -> Result<Self> {
        ShortMessage::try_with_channel(command, channel, data1, data2).map(Into::into)
    }

    /// Note-on with all arguments clamped into their valid ranges.
    #[must_use]
    pub fn note_on(channel: i32, pitch: i32, velocity: i32) -> Self {
        ShortMessage::channel_message(
            NOTE_ON,
            clamp_channel(channel),
            clamp_data(pitch),
            clamp_data(velocity),
        )
        .into()
    }

    /// Note-off with all arguments clamped into their valid ranges.
    #[must_use]
    pub fn note_off(channel: i32, pitch: i32, velocity: i32) -> Self {
        ShortMessage::channel_message(
            NOTE_OFF,
            clamp_channel(channel),
            clamp_data(pitch),
            clamp_data(velocity),
        )
        .into()
    }

    /// Control change with all arguments clamped into their valid ranges.
    #[must_use]
    pub fn control_change(channel: i32, number: i32, value: i32) -> Self {
        ShortMessage::channel_message(
            CONTROL_CHANGE,
            clamp_channel(channel),
            clamp_data(number),
            clamp_data(value),
        )
        .into()
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        match self {
            Self::Short(short) => short.status(),
            Self::SystemExclusive(sysex) => sysex.status(),
            Self::Meta(_) => META,
        }
    }

    /// Re-tag a note-on with velocity 0 as note-off.
    ///
    /// Channel, pitch and velocity are preserved.
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Self::Short(short) if short.command() == NOTE_ON && short.data2() == 0 => {
                ShortMessage::channel_message(NOTE_OFF, short.channel(), short.data1(), 0).into()
            }
            message => message,
        }
    }

    #[must_use]
    pub fn decode(&self) -> DecodedMessage {
        let Self::Short(short) = self else {
            return DecodedMessage::Other;
        };
        let channel = short.channel();
        match short.command() {
            NOTE_ON => DecodedMessage::NoteOn(Note::new(channel, short.data1(), short.data2())),
            NOTE_OFF => DecodedMessage::NoteOff(Note::new(channel, short.data1(), short.data2())),
            CONTROL_CHANGE => DecodedMessage::ControlChange(ControlChange::new(
                channel,
                short.data1(),
                short.data2(),
            )),
            _ => DecodedMessage::Other,
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Short(short) => Cow::Borrowed(short.as_bytes()),
            Self::SystemExclusive(sysex) => Cow::Borrowed(sysex.as_bytes()),
            Self::Meta(MetaMessage { kind, data }) => {
                let mut bytes = Vec::with_capacity(data.len() + 6);
                bytes.push(META);
                bytes.push(*kind);
                write_variable_length_quantity(data.len(), &mut bytes);
                bytes.extend_from_slice(data);
                Cow::Owned(bytes)
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_variable_length_quantity(mut value: usize, output: &mut Vec<u8>) {
    let mut buf = [0u8; 10];
    let mut start = buf.len() - 1;
    buf[start] = (value & 0x7f) as u8;
    value >>= 7;
    while value > 0 {
        start -= 1;
        buf[start] = (value & 0x7f) as u8 | 0x80;
        value >>= 7;
    }
    output.extend_from_slice(&buf[start..]);
}

/// Decode raw input into a typed message.
///
/// Note-on with velocity 0 decodes as note-off. Malformed
/// input decodes as [`DecodedMessage::Other`].
#[must_use]
pub fn decode(input: &[u8]) -> DecodedMessage {
    MidiMessage::from_bytes(input).map_or(DecodedMessage::Other, |message| {
        message.normalize().decode()
    })
}

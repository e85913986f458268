// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

//! Hardware transport driven by [`midir`].
//!
//! Each `midir` input port and each output port is reported as a
//! separate device, even if both share the same name.

use std::borrow::Cow;

use midir::{
    ConnectError, Ignore, InitError, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput,
    MidiOutputConnection, MidiOutputPort, SendError,
};

use super::{
    Availability, Capabilities, DeviceDescriptor, DeviceHandle, ReceiveCallback, ReceiveChannel,
    TransmitChannel, Transport, TransportError, TransportResult,
};
use crate::TimeStamp;

const INPUT_ID_PREFIX: &str = "in:";
const OUTPUT_ID_PREFIX: &str = "out:";

impl From<InitError> for TransportError {
    fn from(err: InitError) -> Self {
        Self::backend(err.to_string())
    }
}

impl From<SendError> for TransportError {
    fn from(err: SendError) -> Self {
        Self::backend(err.to_string())
    }
}

impl<T> From<ConnectError<T>> for TransportError {
    fn from(err: ConnectError<T>) -> Self {
        log::debug!("Failed to connect: {err}");
        Self::Unavailable
    }
}

/// Enumerates and opens `midir` ports.
#[derive(Debug, Clone)]
pub struct MidirTransport {
    client_name: Cow<'static, str>,
}

impl Default for MidirTransport {
    fn default() -> Self {
        Self::new("midibus")
    }
}

impl MidirTransport {
    /// The client name is used when registering with the OS MIDI service.
    #[must_use]
    pub fn new(client_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn new_input(&self) -> TransportResult<MidiInput> {
        let mut input = MidiInput::new(&self.client_name)?;
        input.ignore(Ignore::None);
        Ok(input)
    }

    fn new_output(&self) -> TransportResult<MidiOutput> {
        MidiOutput::new(&self.client_name).map_err(Into::into)
    }
}

fn port_descriptor(
    id: String,
    name: Result<String, midir::PortInfoError>,
    capabilities: Capabilities,
) -> DeviceDescriptor {
    let (name, availability) = match name {
        Ok(name) => (name, Availability::Available),
        Err(err) => {
            log::warn!("Failed to query name of port {id}: {err}");
            (id.clone(), Availability::Unavailable)
        }
    };
    DeviceDescriptor {
        id,
        name,
        capabilities,
        availability,
    }
}

impl Transport for MidirTransport {
    fn enumerate_devices(&self) -> TransportResult<Vec<DeviceDescriptor>> {
        let input = self.new_input()?;
        let output = self.new_output()?;
        let input_ports = input.ports().into_iter().map(|port| {
            port_descriptor(
                format!("{INPUT_ID_PREFIX}{id}", id = port.id()),
                input.port_name(&port),
                Capabilities::INPUT,
            )
        });
        let output_ports = output.ports().into_iter().map(|port| {
            port_descriptor(
                format!("{OUTPUT_ID_PREFIX}{id}", id = port.id()),
                output.port_name(&port),
                Capabilities::OUTPUT,
            )
        });
        Ok(input_ports.chain(output_ports).collect())
    }

    fn open_device(&self, descriptor: &DeviceDescriptor) -> TransportResult<Box<dyn DeviceHandle>> {
        if !descriptor.is_available() {
            return Err(TransportError::Unavailable);
        }
        let port = if let Some(port_id) = descriptor.id.strip_prefix(INPUT_ID_PREFIX) {
            let port = self
                .new_input()?
                .ports()
                .into_iter()
                .find(|port| port.id() == port_id)
                .ok_or(TransportError::Disconnected)?;
            MidirPort::Input(port)
        } else if let Some(port_id) = descriptor.id.strip_prefix(OUTPUT_ID_PREFIX) {
            let port = self
                .new_output()?
                .ports()
                .into_iter()
                .find(|port| port.id() == port_id)
                .ok_or(TransportError::Disconnected)?;
            MidirPort::Output(port)
        } else {
            return Err(TransportError::Disconnected);
        };
        Ok(Box::new(MidirDeviceHandle {
            transport: self.clone(),
            descriptor: descriptor.clone(),
            port,
            is_open: false,
        }))
    }
}

#[allow(missing_debug_implementations)]
enum MidirPort {
    Input(MidiInputPort),
    Output(MidiOutputPort),
}

/// `midir` has no notion of an open device, only of open connections.
#[allow(missing_debug_implementations)]
struct MidirDeviceHandle {
    transport: MidirTransport,
    descriptor: DeviceDescriptor,
    port: MidirPort,
    is_open: bool,
}

impl DeviceHandle for MidirDeviceHandle {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn open(&mut self) -> TransportResult<()> {
        self.is_open = true;
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        self.is_open = false;
        Ok(())
    }

    fn open_transmit_channel(&mut self) -> TransportResult<Box<dyn TransmitChannel>> {
        let MidirPort::Output(port) = &self.port else {
            return Err(TransportError::Unavailable);
        };
        if !self.is_open {
            return Err(TransportError::Unavailable);
        }
        let connection = self
            .transport
            .new_output()?
            .connect(port, &self.descriptor.name)?;
        Ok(Box::new(MidirTransmitChannel { connection }))
    }

    fn open_receive_channel(
        &mut self,
        callback: ReceiveCallback,
    ) -> TransportResult<Box<dyn ReceiveChannel>> {
        let MidirPort::Input(port) = &self.port else {
            return Err(TransportError::Unavailable);
        };
        if !self.is_open {
            return Err(TransportError::Unavailable);
        }
        let connection = self.transport.new_input()?.connect(
            port,
            &self.descriptor.name,
            |micros, input, callback| {
                log::trace!("Received MIDI input @ {micros} us: {input:x?}");
                callback(input);
            },
            callback,
        )?;
        Ok(Box::new(MidirReceiveChannel { connection }))
    }
}

#[allow(missing_debug_implementations)]
struct MidirReceiveChannel {
    connection: MidiInputConnection<ReceiveCallback>,
}

impl ReceiveChannel for MidirReceiveChannel {
    fn close(self: Box<Self>) -> TransportResult<()> {
        let Self { connection } = *self;
        connection.close();
        Ok(())
    }
}

#[allow(missing_debug_implementations)]
struct MidirTransmitChannel {
    connection: MidiOutputConnection,
}

impl TransmitChannel for MidirTransmitChannel {
    // Messages are sent immediately, the time stamp is ignored.
    fn send(&mut self, message: &[u8], _ts: Option<TimeStamp>) -> TransportResult<()> {
        self.connection.send(message).map_err(Into::into)
    }

    fn close(self: Box<Self>) -> TransportResult<()> {
        let Self { connection } = *self;
        connection.close();
        Ok(())
    }
}

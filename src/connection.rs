// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;

use crate::{
    registry::SharedDeviceHandle, CloseReport, DeviceDescriptor, DeviceSelector, ReceiveCallback,
    ReceiveChannel, TimeStamp, TransmitChannel, TransportResult,
};

/// Closing only releases the channel, never the shared device.
pub(crate) trait Connection {
    fn descriptor(&self) -> &DeviceDescriptor;

    fn close(self) -> TransportResult<()>;
}

/// Identifies a receive channel within a bus.
///
/// Inbound messages are only dispatched if they arrive through the
/// channel of the currently attached input.
pub(crate) type ConnectionId = u64;

/// Open receive channel of an attached input device.
pub(crate) struct InputConnection {
    id: ConnectionId,
    descriptor: DeviceDescriptor,
    // Keeps the device alive while the channel is open
    _device: SharedDeviceHandle,
    channel: Box<dyn ReceiveChannel>,
}

impl InputConnection {
    pub(crate) fn open(
        id: ConnectionId,
        descriptor: DeviceDescriptor,
        device: SharedDeviceHandle,
        callback: ReceiveCallback,
    ) -> TransportResult<Self> {
        let channel = device.lock().open_receive_channel(callback)?;
        Ok(Self {
            id,
            descriptor,
            _device: device,
            channel,
        })
    }

    pub(crate) const fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Connection for InputConnection {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn close(self) -> TransportResult<()> {
        self.channel.close()
    }
}

/// Open transmit channel of an attached output device.
pub(crate) struct OutputConnection {
    descriptor: DeviceDescriptor,
    _device: SharedDeviceHandle,
    channel: Box<dyn TransmitChannel>,
}

impl OutputConnection {
    pub(crate) fn open(
        descriptor: DeviceDescriptor,
        device: SharedDeviceHandle,
    ) -> TransportResult<Self> {
        let channel = device.lock().open_transmit_channel()?;
        Ok(Self {
            descriptor,
            _device: device,
            channel,
        })
    }

    pub(crate) fn send(&mut self, message: &[u8], ts: Option<TimeStamp>) -> TransportResult<()> {
        self.channel.send(message, ts)
    }
}

impl Connection for OutputConnection {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn close(self) -> TransportResult<()> {
        self.channel.close()
    }
}

/// Connections of one direction, keyed by device name.
///
/// Remembers the attachment order for positional access.
pub(crate) struct Attachments<C> {
    by_name: HashMap<String, C>,
    order: Vec<String>,
}

impl<C> Default for Attachments<C> {
    fn default() -> Self {
        Self {
            by_name: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<C: Connection> Attachments<C> {
    pub(crate) fn len(&self) -> usize {
        debug_assert_eq!(self.by_name.len(), self.order.len());
        self.order.len()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&C> {
        self.by_name.get(name)
    }

    /// Device names in attachment order.
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    /// Rejects the connection if the name is already in use.
    pub(crate) fn insert(&mut self, connection: C) -> Result<(), C> {
        let name = &connection.descriptor().name;
        if self.contains(name) {
            return Err(connection);
        }
        let name = name.clone();
        self.order.push(name.clone());
        self.by_name.insert(name, connection);
        Ok(())
    }

    pub(crate) fn remove(&mut self, selector: &DeviceSelector) -> Option<C> {
        let index = match selector {
            DeviceSelector::None => return None,
            DeviceSelector::Index(index) => *index,
            DeviceSelector::Name(name) => self.order.iter().position(|next| next == name)?,
        };
        if index >= self.order.len() {
            return None;
        }
        let name = self.order.remove(index);
        let connection = self.by_name.remove(&name);
        debug_assert!(connection.is_some());
        connection
    }

    /// Remove all connections, in attachment order.
    pub(crate) fn take_all(&mut self) -> Vec<C> {
        let mut by_name = std::mem::take(&mut self.by_name);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect()
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut C)) {
        for name in &self.order {
            if let Some(connection) = self.by_name.get_mut(name) {
                f(connection);
            }
        }
    }
}

/// Close connections one by one, regardless of failures.
pub(crate) fn close_all<C: Connection>(connections: Vec<C>) -> CloseReport {
    let mut report = CloseReport::default();
    for connection in connections {
        let name = connection.descriptor().name.clone();
        log::debug!("Closing connection to MIDI device \"{name}\"");
        report.record(&name, connection.close());
    }
    report
}

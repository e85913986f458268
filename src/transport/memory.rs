// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

//! In-process transport.
//!
//! Devices are registered programmatically. Inbound messages are
//! injected from any thread and transmitted messages are recorded
//! per device. Useful for loopback setups and for testing.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    Availability, Capabilities, DeviceDescriptor, DeviceHandle, ReceiveCallback, ReceiveChannel,
    TransmitChannel, Transport, TransportError, TransportResult,
};
use crate::TimeStamp;

type SharedCallback = Arc<Mutex<ReceiveCallback>>;

/// A message recorded by a transmit channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub bytes: Vec<u8>,
    pub ts: Option<TimeStamp>,
}

#[allow(missing_debug_implementations)]
struct MemoryDevice {
    descriptor: DeviceDescriptor,
    is_open: bool,
    receivers: Vec<(u64, SharedCallback)>,
    num_transmitters: usize,
    sent: Vec<SentMessage>,
    fail_on_send: bool,
    fail_on_close: bool,
}

#[derive(Default)]
#[allow(missing_debug_implementations)]
struct MemoryState {
    devices: Vec<MemoryDevice>,
    next_channel_id: u64,
}

impl MemoryState {
    fn device(&self, id: &str) -> Option<&MemoryDevice> {
        self.devices
            .iter()
            .find(|device| device.descriptor.id == id)
    }

    fn device_mut(&mut self, id: &str) -> TransportResult<&mut MemoryDevice> {
        self.devices
            .iter_mut()
            .find(|device| device.descriptor.id == id)
            .ok_or(TransportError::Disconnected)
    }

    fn next_channel_id(&mut self) -> u64 {
        let id = self.next_channel_id;
        self.next_channel_id += 1;
        id
    }
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryTransport")
            .field(
                "devices",
                &state
                    .devices
                    .iter()
                    .map(|device| &device.descriptor)
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an available device.
    pub fn add_device(&self, name: impl Into<String>, capabilities: Capabilities) -> DeviceDescriptor {
        self.add_device_with_availability(name, capabilities, Availability::Available)
    }

    pub fn add_device_with_availability(
        &self,
        name: impl Into<String>,
        capabilities: Capabilities,
        availability: Availability,
    ) -> DeviceDescriptor {
        let mut state = self.state.lock();
        let descriptor = DeviceDescriptor {
            id: format!("memory:{index}", index = state.devices.len()),
            name: name.into(),
            capabilities,
            availability,
        };
        log::debug!("Adding device {descriptor:?}");
        state.devices.push(MemoryDevice {
            descriptor: descriptor.clone(),
            is_open: false,
            receivers: Vec::new(),
            num_transmitters: 0,
            sent: Vec::new(),
            fail_on_send: false,
            fail_on_close: false,
        });
        descriptor
    }

    /// Deliver a message to all open receive channels of a device.
    ///
    /// Returns the number of channels that received the message.
    pub fn inject(&self, id: &str, input: &[u8]) -> usize {
        // Callbacks must be invoked without holding the lock to allow
        // them to send messages through this transport.
        let callbacks = {
            let state = self.state.lock();
            let Some(device) = state.device(id).filter(|device| device.is_open) else {
                return 0;
            };
            device
                .receivers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect::<Vec<_>>()
        };
        for callback in &callbacks {
            let mut callback = callback.lock();
            (*callback)(input);
        }
        callbacks.len()
    }

    #[must_use]
    pub fn sent(&self, id: &str) -> Vec<SentMessage> {
        self.state
            .lock()
            .device(id)
            .map(|device| device.sent.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn sent_bytes(&self, id: &str) -> Vec<Vec<u8>> {
        self.sent(id)
            .into_iter()
            .map(|SentMessage { bytes, .. }| bytes)
            .collect()
    }

    #[must_use]
    pub fn is_device_open(&self, id: &str) -> bool {
        self.state
            .lock()
            .device(id)
            .is_some_and(|device| device.is_open)
    }

    #[must_use]
    pub fn num_receive_channels(&self, id: &str) -> usize {
        self.state
            .lock()
            .device(id)
            .map_or(0, |device| device.receivers.len())
    }

    #[must_use]
    pub fn num_transmit_channels(&self, id: &str) -> usize {
        self.state
            .lock()
            .device(id)
            .map_or(0, |device| device.num_transmitters)
    }

    /// Let sending through any transmit channel of the device fail.
    pub fn set_fail_on_send(&self, id: &str, fail_on_send: bool) {
        if let Ok(device) = self.state.lock().device_mut(id) {
            device.fail_on_send = fail_on_send;
        }
    }

    /// Let closing any channel or the device itself fail.
    ///
    /// The channel is released nevertheless.
    pub fn set_fail_on_close(&self, id: &str, fail_on_close: bool) {
        if let Ok(device) = self.state.lock().device_mut(id) {
            device.fail_on_close = fail_on_close;
        }
    }
}

impl Transport for MemoryTransport {
    fn enumerate_devices(&self) -> TransportResult<Vec<DeviceDescriptor>> {
        Ok(self
            .state
            .lock()
            .devices
            .iter()
            .map(|device| device.descriptor.clone())
            .collect())
    }

    fn open_device(&self, descriptor: &DeviceDescriptor) -> TransportResult<Box<dyn DeviceHandle>> {
        let state = self.state.lock();
        let Some(device) = state.device(&descriptor.id) else {
            return Err(TransportError::Disconnected);
        };
        if !device.descriptor.is_available() {
            return Err(TransportError::Unavailable);
        }
        Ok(Box::new(MemoryDeviceHandle {
            descriptor: device.descriptor.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

#[allow(missing_debug_implementations)]
struct MemoryDeviceHandle {
    descriptor: DeviceDescriptor,
    state: Arc<Mutex<MemoryState>>,
}

fn close_result(fail_on_close: bool) -> TransportResult<()> {
    if fail_on_close {
        return Err(TransportError::backend("simulated close failure"));
    }
    Ok(())
}

impl DeviceHandle for MemoryDeviceHandle {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn is_open(&self) -> bool {
        self.state
            .lock()
            .device(&self.descriptor.id)
            .is_some_and(|device| device.is_open)
    }

    fn open(&mut self) -> TransportResult<()> {
        let mut state = self.state.lock();
        let device = state.device_mut(&self.descriptor.id)?;
        device.is_open = true;
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        let mut state = self.state.lock();
        let device = state.device_mut(&self.descriptor.id)?;
        device.is_open = false;
        close_result(device.fail_on_close)
    }

    fn open_transmit_channel(&mut self) -> TransportResult<Box<dyn TransmitChannel>> {
        let mut state = self.state.lock();
        let device = state.device_mut(&self.descriptor.id)?;
        if !device.is_open || !device.descriptor.capabilities.receive {
            return Err(TransportError::Unavailable);
        }
        device.num_transmitters += 1;
        Ok(Box::new(MemoryTransmitChannel {
            device_id: self.descriptor.id.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    fn open_receive_channel(
        &mut self,
        callback: ReceiveCallback,
    ) -> TransportResult<Box<dyn ReceiveChannel>> {
        let mut state = self.state.lock();
        let channel_id = state.next_channel_id();
        let device = state.device_mut(&self.descriptor.id)?;
        if !device.is_open || !device.descriptor.capabilities.transmit {
            return Err(TransportError::Unavailable);
        }
        device
            .receivers
            .push((channel_id, Arc::new(Mutex::new(callback))));
        Ok(Box::new(MemoryReceiveChannel {
            device_id: self.descriptor.id.clone(),
            channel_id,
            state: Arc::clone(&self.state),
        }))
    }
}

#[allow(missing_debug_implementations)]
struct MemoryReceiveChannel {
    device_id: String,
    channel_id: u64,
    state: Arc<Mutex<MemoryState>>,
}

impl ReceiveChannel for MemoryReceiveChannel {
    fn close(self: Box<Self>) -> TransportResult<()> {
        let mut state = self.state.lock();
        let device = state.device_mut(&self.device_id)?;
        device
            .receivers
            .retain(|(channel_id, _)| *channel_id != self.channel_id);
        close_result(device.fail_on_close)
    }
}

#[allow(missing_debug_implementations)]
struct MemoryTransmitChannel {
    device_id: String,
    state: Arc<Mutex<MemoryState>>,
}

impl TransmitChannel for MemoryTransmitChannel {
    fn send(&mut self, message: &[u8], ts: Option<TimeStamp>) -> TransportResult<()> {
        let mut state = self.state.lock();
        let device = state.device_mut(&self.device_id)?;
        if !device.is_open {
            return Err(TransportError::Disconnected);
        }
        if device.fail_on_send {
            return Err(TransportError::backend("simulated send failure"));
        }
        device.sent.push(SentMessage {
            bytes: message.to_vec(),
            ts,
        });
        Ok(())
    }

    fn close(self: Box<Self>) -> TransportResult<()> {
        let mut state = self.state.lock();
        let device = state.device_mut(&self.device_id)?;
        debug_assert!(device.num_transmitters > 0);
        device.num_transmitters = device.num_transmitters.saturating_sub(1);
        close_result(device.fail_on_close)
    }
}

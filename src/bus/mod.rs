// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

//! The bus facade.
//!
//! A [`MidiBus`] connects any number of input and output devices with
//! any number of listeners. Messages received from an attached input
//! are delivered to all listeners. Messages sent through the bus are
//! delivered to all attached outputs.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;

use crate::{
    connection::{
        close_all, Attachments, Connection, ConnectionId, InputConnection, OutputConnection,
    },
    dispatch::receive_callback,
    listener::ListenerSet,
    CloseReport, DeviceDescriptor, DeviceRegistry, DeviceSelector, Direction, Error, MidiListener,
    Result, SharedListener, TimeStamp, TransportError,
};

#[cfg(test)]
mod tests;

const DEFAULT_NAME_PREFIX: &str = "MidiBus_";

/// Generate a name from the current wall-clock time.
///
/// Uniqueness is not guaranteed.
fn default_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() % 100_000_000);
    format!("{DEFAULT_NAME_PREFIX}{millis:08}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// A name is generated if `None`.
    pub name: Option<String>,
    /// Tag inbound and outbound messages with the current time.
    pub timestamping: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: None,
            timestamping: true,
        }
    }
}

impl BusConfig {
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Mutable state, guarded by a single lock.
#[derive(Default)]
pub(crate) struct BusState {
    pub(crate) inputs: Attachments<InputConnection>,
    pub(crate) outputs: Attachments<OutputConnection>,
    pub(crate) listeners: ListenerSet,
    pub(crate) is_closed: bool,
}

/// State shared with the receive callbacks of all inputs.
pub(crate) struct BusShared {
    pub(crate) name: String,
    pub(crate) registry: Arc<DeviceRegistry>,
    timestamping: AtomicBool,
    next_connection_id: AtomicU64,
    pub(crate) state: Mutex<BusState>,
}

impl BusShared {
    pub(crate) fn timestamp(&self) -> Option<TimeStamp> {
        self.timestamping
            .load(Ordering::Relaxed)
            .then(TimeStamp::now)
    }

    fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[allow(missing_debug_implementations)]
pub struct MidiBus {
    pub(crate) shared: Arc<BusShared>,
}

impl MidiBus {
    #[must_use]
    pub fn new(registry: Arc<DeviceRegistry>, config: BusConfig) -> Self {
        let BusConfig { name, timestamping } = config;
        let name = name.unwrap_or_else(default_name);
        log::debug!("Creating bus \"{name}\"");
        Self {
            shared: Arc::new(BusShared {
                name,
                registry,
                timestamping: AtomicBool::new(timestamping),
                next_connection_id: AtomicU64::new(0),
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.shared.registry
    }

    #[must_use]
    pub fn is_timestamping(&self) -> bool {
        self.shared.timestamping.load(Ordering::Relaxed)
    }

    /// Affects all subsequent inbound and outbound messages.
    pub fn set_timestamping(&self, timestamping: bool) {
        self.shared
            .timestamping
            .store(timestamping, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().is_closed
    }

    /// Names of all available input devices.
    #[must_use]
    pub fn available_inputs(&self) -> Vec<String> {
        device_names(self.shared.registry.available_inputs())
    }

    /// Names of all available output devices.
    #[must_use]
    pub fn available_outputs(&self) -> Vec<String> {
        device_names(self.shared.registry.available_outputs())
    }

    #[must_use]
    pub fn unavailable_devices(&self) -> Vec<String> {
        device_names(self.shared.registry.unavailable_devices())
    }

    /// Names of the attached input devices in attachment order.
    #[must_use]
    pub fn attached_inputs(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .inputs
            .names()
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Names of the attached output devices in attachment order.
    #[must_use]
    pub fn attached_outputs(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .outputs
            .names()
            .map(ToOwned::to_owned)
            .collect()
    }

    #[must_use]
    pub fn input_count(&self) -> usize {
        self.shared.state.lock().inputs.len()
    }

    #[must_use]
    pub fn output_count(&self) -> usize {
        self.shared.state.lock().outputs.len()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.state.lock().listeners.len()
    }

    /// Attach an available input device.
    ///
    /// An index selects from the available inputs of the current
    /// snapshot, a name selects the first available input with
    /// this name.
    pub fn attach_input(&self, selector: impl Into<DeviceSelector>) -> Result<()> {
        self.attach(Direction::Input, &selector.into())
    }

    /// Attach an available output device.
    ///
    /// See also: [`MidiBus::attach_input`]
    pub fn attach_output(&self, selector: impl Into<DeviceSelector>) -> Result<()> {
        self.attach(Direction::Output, &selector.into())
    }

    pub fn attach_input_device(&self, descriptor: &DeviceDescriptor) -> Result<()> {
        self.attach_device(Direction::Input, descriptor)
    }

    pub fn attach_output_device(&self, descriptor: &DeviceDescriptor) -> Result<()> {
        self.attach_device(Direction::Output, descriptor)
    }

    fn attach(&self, direction: Direction, selector: &DeviceSelector) -> Result<()> {
        let descriptor = match self.shared.registry.resolve(direction, selector) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                log::warn!(
                    "Failed to attach {direction} {selector} to bus \"{bus}\": {err}",
                    bus = self.shared.name
                );
                return Err(err);
            }
        };
        self.attach_device(direction, &descriptor)
    }

    fn attach_device(&self, direction: Direction, descriptor: &DeviceDescriptor) -> Result<()> {
        let result = match direction {
            Direction::Input => self.try_attach_input(descriptor),
            Direction::Output => self.try_attach_output(descriptor),
        };
        let name = &descriptor.name;
        let bus = &self.shared.name;
        match &result {
            Ok(()) => log::info!("Attached {direction} \"{name}\" to bus \"{bus}\""),
            Err(err) => log::warn!("Failed to attach {direction} \"{name}\" to bus \"{bus}\": {err}"),
        }
        result
    }

    /// Checks that could be done before opening anything.
    fn check_attachable(&self, direction: Direction, descriptor: &DeviceDescriptor) -> Result<()> {
        let name = &descriptor.name;
        if !descriptor.supports(direction) {
            return Err(Error::DirectionMismatch {
                name: name.clone(),
                direction,
            });
        }
        if !descriptor.is_available() {
            return Err(Error::Unavailable {
                name: name.clone(),
                source: None,
            });
        }
        let state = self.shared.state.lock();
        if state.is_closed {
            return Err(Error::Closed);
        }
        let is_attached = match direction {
            Direction::Input => state.inputs.contains(name),
            Direction::Output => state.outputs.contains(name),
        };
        if is_attached {
            return Err(Error::AlreadyAttached {
                name: name.clone(),
                direction,
            });
        }
        Ok(())
    }

    fn try_attach_input(&self, descriptor: &DeviceDescriptor) -> Result<()> {
        self.check_attachable(Direction::Input, descriptor)?;
        let device = self
            .shared
            .registry
            .open_device(descriptor)
            .map_err(|err| unavailable(descriptor, err))?;
        let id = self.shared.next_connection_id();
        let callback =
            receive_callback(Arc::downgrade(&self.shared), descriptor.name.clone(), id);
        let connection = InputConnection::open(id, descriptor.clone(), device, callback)
            .map_err(|err| unavailable(descriptor, err))?;
        self.insert_connection(Direction::Input, connection, |state| &mut state.inputs)
    }

    fn try_attach_output(&self, descriptor: &DeviceDescriptor) -> Result<()> {
        self.check_attachable(Direction::Output, descriptor)?;
        let device = self
            .shared
            .registry
            .open_device(descriptor)
            .map_err(|err| unavailable(descriptor, err))?;
        let connection = OutputConnection::open(descriptor.clone(), device)
            .map_err(|err| unavailable(descriptor, err))?;
        self.insert_connection(Direction::Output, connection, |state| &mut state.outputs)
    }

    /// Add an opened connection, unless the state changed in the meantime.
    fn insert_connection<C: Connection>(
        &self,
        direction: Direction,
        connection: C,
        attachments: impl FnOnce(&mut BusState) -> &mut Attachments<C>,
    ) -> Result<()> {
        let rejected = {
            let mut state = self.shared.state.lock();
            if state.is_closed {
                (connection, Error::Closed)
            } else {
                match attachments(&mut *state).insert(connection) {
                    Ok(()) => return Ok(()),
                    Err(connection) => {
                        let name = connection.descriptor().name.clone();
                        (connection, Error::AlreadyAttached { name, direction })
                    }
                }
            }
        };
        let (connection, err) = rejected;
        close_connection(connection);
        Err(err)
    }

    /// Detach an input device.
    ///
    /// An index selects from the attached inputs in attachment order.
    /// The device itself is not closed.
    pub fn detach_input(&self, selector: impl Into<DeviceSelector>) -> Result<()> {
        let selector = selector.into();
        let connection = self.shared.state.lock().inputs.remove(&selector);
        self.detached(Direction::Input, selector, connection)
    }

    /// Detach an output device.
    ///
    /// See also: [`MidiBus::detach_input`]
    pub fn detach_output(&self, selector: impl Into<DeviceSelector>) -> Result<()> {
        let selector = selector.into();
        let connection = self.shared.state.lock().outputs.remove(&selector);
        self.detached(Direction::Output, selector, connection)
    }

    // Must be invoked after the lock has been released.
    fn detached(
        &self,
        direction: Direction,
        selector: DeviceSelector,
        connection: Option<impl Connection>,
    ) -> Result<()> {
        let bus = &self.shared.name;
        let Some(connection) = connection else {
            let err = Error::NotFound {
                direction,
                selector,
            };
            log::warn!("Failed to detach {direction} from bus \"{bus}\": {err}");
            return Err(err);
        };
        let name = connection.descriptor().name.clone();
        close_connection(connection);
        log::info!("Detached {direction} \"{name}\" from bus \"{bus}\"");
        Ok(())
    }

    /// Detach all input devices.
    pub fn clear_inputs(&self) -> CloseReport {
        let inputs = self.shared.state.lock().inputs.take_all();
        let report = close_all(inputs);
        self.log_cleared("Clearing inputs", &report);
        report
    }

    /// Detach all output devices.
    pub fn clear_outputs(&self) -> CloseReport {
        let outputs = self.shared.state.lock().outputs.take_all();
        let report = close_all(outputs);
        self.log_cleared("Clearing outputs", &report);
        report
    }

    /// Detach all input and output devices.
    pub fn clear_all(&self) -> CloseReport {
        let (inputs, outputs) = {
            let mut state = self.shared.state.lock();
            (state.inputs.take_all(), state.outputs.take_all())
        };
        let mut report = close_all(inputs);
        report.merge(close_all(outputs));
        self.log_cleared("Clearing all devices", &report);
        report
    }

    fn log_cleared(&self, context: &str, report: &CloseReport) {
        let bus = &self.shared.name;
        report.log_failures(&format!("{context} of bus \"{bus}\""));
        if report.closed > 0 {
            log::info!(
                "{context} of bus \"{bus}\": detached {closed} device(s)",
                closed = report.closed
            );
        }
    }

    /// Returns `false` if the listener has already been added.
    pub fn add_listener(&self, listener: SharedListener) -> bool {
        let added = self.shared.state.lock().listeners.insert(listener);
        if added {
            log::debug!("Added listener to bus \"{bus}\"", bus = self.shared.name);
        }
        added
    }

    /// Returns `false` if the listener has not been added before.
    pub fn remove_listener<L: MidiListener + ?Sized>(&self, listener: &Arc<L>) -> bool {
        let removed = self.shared.state.lock().listeners.remove(listener);
        if removed {
            log::debug!("Removed listener from bus \"{bus}\"", bus = self.shared.name);
        }
        removed
    }

    /// Detach all devices and close every device of the registry.
    ///
    /// Devices are shared by all buses of the same registry, i.e.
    /// closing a bus breaks the connections of other buses! The bus
    /// cannot be used anymore afterwards. Closing a closed bus has
    /// no effect.
    pub fn close(&self) -> CloseReport {
        let (inputs, outputs) = {
            let mut state = self.shared.state.lock();
            if state.is_closed {
                return CloseReport::default();
            }
            state.is_closed = true;
            (state.inputs.take_all(), state.outputs.take_all())
        };
        let mut report = close_all(inputs);
        report.merge(close_all(outputs));
        report.merge(self.shared.registry.close_devices());
        let bus = &self.shared.name;
        report.log_failures(&format!("Closing bus \"{bus}\""));
        log::info!("Closed bus \"{bus}\"");
        report
    }
}

impl Drop for MidiBus {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        // The shared devices stay open for other buses
        let _report = self.clear_all();
    }
}

impl fmt::Display for MidiBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (num_inputs, num_outputs, num_listeners) = {
            let state = self.shared.state.lock();
            (state.inputs.len(), state.outputs.len(), state.listeners.len())
        };
        write!(
            f,
            "MidiBus: {name} [{num_inputs} input(s), {num_outputs} output(s), {num_listeners} listener(s)]",
            name = self.shared.name
        )
    }
}

fn device_names(devices: Vec<DeviceDescriptor>) -> Vec<String> {
    devices.into_iter().map(|device| device.name).collect()
}

fn unavailable(descriptor: &DeviceDescriptor, err: TransportError) -> Error {
    Error::Unavailable {
        name: descriptor.name.clone(),
        source: Some(err),
    }
}

fn close_connection(connection: impl Connection) {
    let name = connection.descriptor().name.clone();
    if let Err(err) = connection.close() {
        log::warn!("Failed to close connection to MIDI device \"{name}\": {err}");
    }
}

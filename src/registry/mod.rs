// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

//! Process-scoped view of the devices reported by a transport.
//!
//! Keeps the most recent enumeration snapshot and the device handles
//! that have been opened so far. Handles are shared by all buses that
//! use the same registry, i.e. a device is only opened once even if
//! it is attached to multiple buses.

use std::{
    collections::HashMap,
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    CloseReport, DeviceDescriptor, DeviceHandle, Direction, Error, Result, Transport,
    TransportResult,
};


/// Device handle shared between all connections to the same device.
pub(crate) type SharedDeviceHandle = Arc<Mutex<Box<dyn DeviceHandle>>>;

/// Selects a device by position or by name.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::From)]
pub enum DeviceSelector {
    /// Selects nothing, resolution always fails.
    #[display("<none>")]
    #[from(ignore)]
    None,
    /// Position in the list of available devices of a direction.
    #[display("[{_0}]")]
    Index(usize),
    /// The first device with this name.
    #[display("\"{_0}\"")]
    Name(String),
}

impl From<&str> for DeviceSelector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<Option<usize>> for DeviceSelector {
    fn from(index: Option<usize>) -> Self {
        index.map_or(Self::None, Self::Index)
    }
}

#[allow(missing_debug_implementations)]
pub struct DeviceRegistry {
    transport: Box<dyn Transport>,
    snapshot: Mutex<Option<Arc<[DeviceDescriptor]>>>,
    handles: Mutex<HashMap<String, SharedDeviceHandle>>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            snapshot: Mutex::new(None),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the current snapshot by a fresh enumeration.
    ///
    /// The previous snapshot is kept if the enumeration fails.
    pub fn rescan(&self) -> TransportResult<()> {
        let devices = self.transport.enumerate_devices()?;
        log::debug!("Found {num_devices} MIDI device(s)", num_devices = devices.len());
        *self.snapshot.lock() = Some(devices.into());
        Ok(())
    }

    /// The current snapshot.
    ///
    /// Only enumerates the devices implicitly on first use.
    #[must_use]
    pub fn devices(&self) -> Arc<[DeviceDescriptor]> {
        let mut snapshot = self.snapshot.lock();
        if let Some(devices) = &*snapshot {
            return Arc::clone(devices);
        }
        match self.transport.enumerate_devices() {
            Ok(devices) => {
                log::debug!("Found {num_devices} MIDI device(s)", num_devices = devices.len());
                let devices: Arc<[DeviceDescriptor]> = devices.into();
                *snapshot = Some(Arc::clone(&devices));
                devices
            }
            Err(err) => {
                // Not cached, the next call will retry
                log::warn!("Failed to enumerate MIDI devices: {err}");
                Arc::from(Vec::new())
            }
        }
    }

    #[must_use]
    pub fn available(&self, direction: Direction) -> Vec<DeviceDescriptor> {
        self.devices()
            .iter()
            .filter(|device| device.is_available() && device.supports(direction))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn available_inputs(&self) -> Vec<DeviceDescriptor> {
        self.available(Direction::Input)
    }

    #[must_use]
    pub fn available_outputs(&self) -> Vec<DeviceDescriptor> {
        self.available(Direction::Output)
    }

    #[must_use]
    pub fn unavailable_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices()
            .iter()
            .filter(|device| !device.is_available())
            .cloned()
            .collect()
    }

    /// Resolve a selector against the current snapshot.
    pub fn resolve(&self, direction: Direction, selector: &DeviceSelector) -> Result<DeviceDescriptor> {
        let not_found = || Error::NotFound {
            direction,
            selector: selector.clone(),
        };
        let name = match selector {
            DeviceSelector::None => return Err(not_found()),
            DeviceSelector::Index(index) => {
                return self
                    .available(direction)
                    .into_iter()
                    .nth(*index)
                    .ok_or_else(not_found);
            }
            DeviceSelector::Name(name) => name,
        };
        if name.is_empty() {
            return Err(not_found());
        }
        let devices = self.devices();
        if let Some(device) = devices
            .iter()
            .find(|device| device.is_available() && device.supports(direction) && device.name == *name)
        {
            return Ok(device.clone());
        }
        // Explain why a device with this name could not be used
        let Some(device) = devices.iter().find(|device| device.name == *name) else {
            return Err(not_found());
        };
        if !device.is_available() {
            return Err(Error::Unavailable {
                name: name.clone(),
                source: None,
            });
        }
        debug_assert!(!device.supports(direction));
        Err(Error::DirectionMismatch {
            name: name.clone(),
            direction,
        })
    }

    /// Obtain the shared handle of a device and open it if needed.
    pub(crate) fn open_device(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> TransportResult<SharedDeviceHandle> {
        let handle = self.device_handle(descriptor)?;
        {
            let mut device = handle.lock();
            if !device.is_open() {
                log::debug!("Opening MIDI device \"{name}\"", name = descriptor.name);
                device.open()?;
            }
        }
        Ok(handle)
    }

    fn device_handle(&self, descriptor: &DeviceDescriptor) -> TransportResult<SharedDeviceHandle> {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(&descriptor.id) {
            return Ok(Arc::clone(handle));
        }
        let handle = Arc::new(Mutex::new(self.transport.open_device(descriptor)?));
        handles.insert(descriptor.id.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Close all devices without logging.
    pub(crate) fn close_devices(&self) -> CloseReport {
        let mut report = CloseReport::default();
        let devices = self.devices();
        let mut handles = devices
            .iter()
            .filter_map(|descriptor| match self.device_handle(descriptor) {
                Ok(handle) => Some((descriptor.id.clone(), handle)),
                Err(err) => {
                    // Nothing to close
                    log::debug!(
                        "Skipping MIDI device \"{name}\": {err}",
                        name = descriptor.name
                    );
                    None
                }
            })
            .collect::<HashMap<_, _>>();
        // Devices from former snapshots
        for (id, handle) in self.handles.lock().iter() {
            handles
                .entry(id.clone())
                .or_insert_with(|| Arc::clone(handle));
        }
        for handle in handles.values() {
            let mut device = handle.lock();
            if !device.is_open() {
                continue;
            }
            let name = device.descriptor().name.clone();
            log::debug!("Closing MIDI device \"{name}\"");
            report.record(&name, device.close());
        }
        report
    }

    /// Close every device that the transport has ever reported.
    ///
    /// Regardless of whether the device is still attached to a bus or not.
    /// Closing a device that is still attached will break its connections!
    pub fn close_all_devices(&self) -> CloseReport {
        let report = self.close_devices();
        report.log_failures("Closing all MIDI devices");
        report
    }

    /// Write the current snapshot in a human-readable form.
    ///
    /// Nothing is written if no devices are found at all.
    pub fn write_device_list(&self, writer: &mut impl Write) -> io::Result<()> {
        let inputs = self.available_inputs();
        let outputs = self.available_outputs();
        let unavailable = self.unavailable_devices();
        if inputs.is_empty() && outputs.is_empty() && unavailable.is_empty() {
            return Ok(());
        }
        writeln!(writer, "\nAvailable MIDI Devices:")?;
        for (title, devices) in [
            ("Input", inputs),
            ("Output", outputs),
            ("Unavailable", unavailable),
        ] {
            if devices.is_empty() {
                continue;
            }
            writeln!(writer, "----------{title}----------")?;
            for (index, device) in devices.iter().enumerate() {
                writeln!(writer, "[{index}] \"{name}\"", name = device.name)?;
            }
        }
        Ok(())
    }

    pub fn print_device_list(&self) {
        if let Err(err) = self.write_device_list(&mut io::stdout().lock()) {
            log::warn!("Failed to print MIDI devices: {err}");
        }
    }
}

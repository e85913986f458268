// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

use std::{io::BufRead as _, sync::Arc};

use midibus::{
    transport::midir::MidirTransport, BusConfig, ControlChange, DeviceRegistry, DeviceSelector,
    MidiBus, MidiListener, MidiMessage, Note, SharedListener, TimeStamp,
};

struct Monitor;

impl MidiListener for Monitor {
    fn midi_message(&self, message: &MidiMessage, ts: Option<TimeStamp>) {
        let bytes = message.to_bytes();
        match ts {
            Some(ts) => log::debug!("Received {bytes:02x?} @ {ts}"),
            None => log::debug!("Received {bytes:02x?}"),
        }
    }

    fn note_on_event(&self, note: Note) {
        let Note {
            channel,
            pitch,
            velocity,
        } = note;
        log::info!("Note on: channel = {channel}, pitch = {pitch}, velocity = {velocity}");
    }

    fn note_off_event(&self, note: Note) {
        let Note {
            channel,
            pitch,
            velocity,
        } = note;
        log::info!("Note off: channel = {channel}, pitch = {pitch}, velocity = {velocity}");
    }

    fn controller_change_event(&self, change: ControlChange) {
        let ControlChange {
            channel,
            number,
            value,
        } = change;
        log::info!("Controller change: channel = {channel}, number = {number}, value = {value}");
    }
}

/// Numeric arguments select by index, all others by name.
fn parse_selector(arg: &str) -> DeviceSelector {
    arg.parse::<usize>()
        .map_or_else(|_| DeviceSelector::from(arg), DeviceSelector::Index)
}

fn main() {
    pretty_env_logger::init();

    match run() {
        Ok(()) => (),
        Err(err) => log::error!("{err}"),
    }
}

fn run() -> anyhow::Result<()> {
    let registry = Arc::new(DeviceRegistry::new(MidirTransport::new("midi-monitor")));
    registry.print_device_list();

    let bus = MidiBus::new(Arc::clone(&registry), BusConfig::with_name("monitor"));
    bus.add_listener(Arc::new(Monitor) as SharedListener);

    let mut num_attached = 0;
    for arg in std::env::args().skip(1) {
        match bus.attach_input(parse_selector(&arg)) {
            Ok(()) => num_attached += 1,
            // Already logged
            Err(_) => continue,
        }
    }
    if num_attached == 0 {
        log::warn!("No inputs attached");
        return Ok(());
    }
    log::info!("{bus}");

    println!("Press ENTER to quit");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    let report = bus.close();
    anyhow::ensure!(report.is_ok(), "failed to close {} device(s)", report.failures.len());
    Ok(())
}

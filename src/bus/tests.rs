// SPDX-FileCopyrightText: The midibus authors
// SPDX-License-Identifier: MPL-2.0

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Weak,
};

use super::*;
use crate::{
    transport::memory::MemoryTransport, Availability, Capabilities, ControlChange,
    MetaMessage, MidiMessage, Note, SystemExclusiveMessage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Message(MidiMessage),
    NoteOn(u8, u8, u8),
    NoteOff(u8, u8, u8),
    ControllerChange(u8, u8, u8),
    NoteOnEvent(Note),
    NoteOffEvent(Note),
    ControllerChangeEvent(ControlChange),
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl MidiListener for Recorder {
    fn midi_message(&self, message: &MidiMessage, _ts: Option<TimeStamp>) {
        self.push(Call::Message(message.clone()));
    }

    fn note_on(&self, channel: u8, pitch: u8, velocity: u8) {
        self.push(Call::NoteOn(channel, pitch, velocity));
    }

    fn note_off(&self, channel: u8, pitch: u8, velocity: u8) {
        self.push(Call::NoteOff(channel, pitch, velocity));
    }

    fn controller_change(&self, channel: u8, number: u8, value: u8) {
        self.push(Call::ControllerChange(channel, number, value));
    }

    fn note_on_event(&self, note: Note) {
        self.push(Call::NoteOnEvent(note));
    }

    fn note_off_event(&self, note: Note) {
        self.push(Call::NoteOffEvent(note));
    }

    fn controller_change_event(&self, change: ControlChange) {
        self.push(Call::ControllerChangeEvent(change));
    }
}

struct Fixture {
    transport: MemoryTransport,
    registry: Arc<DeviceRegistry>,
    keys: DeviceDescriptor,
    synth: DeviceDescriptor,
    pads: DeviceDescriptor,
    busy: DeviceDescriptor,
}

impl Fixture {
    fn new() -> Self {
        pretty_env_logger::try_init().ok();
        let transport = MemoryTransport::new();
        let keys = transport.add_device("Keys", Capabilities::INPUT);
        let synth = transport.add_device("Synth", Capabilities::OUTPUT);
        let pads = transport.add_device("Pads", Capabilities::INPUT_OUTPUT);
        let busy = transport.add_device_with_availability(
            "Busy",
            Capabilities::INPUT_OUTPUT,
            Availability::Unavailable,
        );
        let registry = Arc::new(DeviceRegistry::new(transport.clone()));
        Self {
            transport,
            registry,
            keys,
            synth,
            pads,
            busy,
        }
    }

    fn new_bus(&self, name: &str) -> MidiBus {
        MidiBus::new(Arc::clone(&self.registry), BusConfig::with_name(name))
    }
}

fn add_recorder(bus: &MidiBus) -> Arc<Recorder> {
    let recorder = Arc::new(Recorder::default());
    assert!(bus.add_listener(Arc::clone(&recorder) as SharedListener));
    recorder
}

#[test]
fn zero_velocity_note_on_is_dispatched_as_note_off() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    let recorder = add_recorder(&bus);
    bus.attach_input("Keys").unwrap();

    assert_eq!(1, fixture.transport.inject(&fixture.keys.id, &[0x93, 60, 0]));

    assert_eq!(
        vec![
            Call::Message(MidiMessage::note_off(3, 60, 0)),
            Call::NoteOff(3, 60, 0),
            Call::NoteOffEvent(Note::new(3, 60, 0)),
        ],
        recorder.take()
    );
}

#[test]
fn control_change_is_delivered_in_all_forms() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    let recorder = add_recorder(&bus);
    bus.attach_input("Keys").unwrap();

    fixture.transport.inject(&fixture.keys.id, &[0xb2, 10, 64]);

    assert_eq!(
        vec![
            Call::Message(MidiMessage::control_change(2, 10, 64)),
            Call::ControllerChange(2, 10, 64),
            Call::ControllerChangeEvent(ControlChange::new(2, 10, 64)),
        ],
        recorder.take()
    );
}

#[test]
fn message_without_listeners_has_no_effect() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_input("Keys").unwrap();
    bus.attach_output("Synth").unwrap();

    assert_eq!(1, fixture.transport.inject(&fixture.keys.id, &[0x90, 60, 100]));

    assert!(fixture.transport.sent(&fixture.synth.id).is_empty());
    assert_eq!(0, bus.listener_count());
}

#[test]
fn malformed_input_is_dropped() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    let recorder = add_recorder(&bus);
    bus.attach_input("Keys").unwrap();

    fixture.transport.inject(&fixture.keys.id, &[]);
    fixture.transport.inject(&fixture.keys.id, &[0x90, 0x80, 0x00]);

    assert!(recorder.take().is_empty());
}

#[test]
fn attaching_the_same_device_twice() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");

    bus.attach_input(0_usize).unwrap();
    assert!(matches!(
        bus.attach_input("Keys"),
        Err(Error::AlreadyAttached {
            direction: Direction::Input,
            ..
        })
    ));
    assert!(matches!(
        bus.attach_input_device(&fixture.keys),
        Err(Error::AlreadyAttached { .. })
    ));

    assert_eq!(1, bus.input_count());
    assert_eq!(vec!["Keys"], bus.attached_inputs());
    assert_eq!(1, fixture.transport.num_receive_channels(&fixture.keys.id));
}

#[test]
fn same_device_as_input_and_output() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");

    bus.attach_input("Pads").unwrap();
    bus.attach_output("Pads").unwrap();

    assert_eq!(vec!["Pads"], bus.attached_inputs());
    assert_eq!(vec!["Pads"], bus.attached_outputs());
    assert_eq!(1, fixture.transport.num_receive_channels(&fixture.pads.id));
    assert_eq!(1, fixture.transport.num_transmit_channels(&fixture.pads.id));
}

#[test]
fn attach_failures() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");

    assert!(matches!(
        bus.attach_input(2_usize),
        Err(Error::NotFound {
            direction: Direction::Input,
            selector: DeviceSelector::Index(2),
        })
    ));
    assert!(matches!(
        bus.attach_output("Nope"),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        bus.attach_input(None::<usize>),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        bus.attach_input("Synth"),
        Err(Error::DirectionMismatch { .. })
    ));
    assert!(matches!(
        bus.attach_output_device(&fixture.keys),
        Err(Error::DirectionMismatch {
            direction: Direction::Output,
            ..
        })
    ));
    assert!(matches!(
        bus.attach_input("Busy"),
        Err(Error::Unavailable { .. })
    ));
    assert!(matches!(
        bus.attach_output_device(&fixture.busy),
        Err(Error::Unavailable { .. })
    ));

    assert_eq!(0, bus.input_count());
    assert_eq!(0, bus.output_count());
}

#[test]
fn detach_by_name_and_index() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_input("Pads").unwrap();
    bus.attach_input("Keys").unwrap();
    assert_eq!(vec!["Pads", "Keys"], bus.attached_inputs());

    // Indexes refer to the attached inputs, not to the available inputs
    bus.detach_input(1_usize).unwrap();
    assert_eq!(vec!["Pads"], bus.attached_inputs());
    bus.detach_input("Pads").unwrap();
    assert_eq!(0, bus.input_count());

    // The devices stay open
    assert!(fixture.transport.is_device_open(&fixture.keys.id));
    assert!(fixture.transport.is_device_open(&fixture.pads.id));
    assert_eq!(0, fixture.transport.num_receive_channels(&fixture.keys.id));
    assert_eq!(0, fixture.transport.num_receive_channels(&fixture.pads.id));
}

#[test]
fn detaching_a_device_that_is_not_attached() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_input("Keys").unwrap();
    bus.attach_output("Synth").unwrap();

    assert!(matches!(
        bus.detach_input("Pads"),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        bus.detach_input(1_usize),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        bus.detach_output("Keys"),
        Err(Error::NotFound {
            direction: Direction::Output,
            ..
        })
    ));

    assert_eq!(vec!["Keys"], bus.attached_inputs());
    assert_eq!(vec!["Synth"], bus.attached_outputs());
}

#[test]
fn detached_input_is_not_dispatched_anymore() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    let recorder = add_recorder(&bus);
    bus.attach_input("Keys").unwrap();
    bus.detach_input("Keys").unwrap();

    assert_eq!(0, fixture.transport.inject(&fixture.keys.id, &[0x90, 60, 100]));

    assert!(recorder.take().is_empty());
}

#[test]
fn stale_receive_channel_is_not_dispatched() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    let recorder = add_recorder(&bus);
    bus.attach_input("Keys").unwrap();
    // A receive channel of the same device that is not the attached one
    let device = fixture.registry.open_device(&fixture.keys).unwrap();
    let stale_channel = device
        .lock()
        .open_receive_channel(receive_callback(
            Arc::downgrade(&bus.shared),
            "Keys".to_owned(),
            ConnectionId::MAX,
        ))
        .unwrap();

    assert_eq!(2, fixture.transport.inject(&fixture.keys.id, &[0x90, 60, 100]));

    assert_eq!(
        vec![
            Call::Message(MidiMessage::note_on(0, 60, 100)),
            Call::NoteOn(0, 60, 100),
            Call::NoteOnEvent(Note::new(0, 60, 100)),
        ],
        recorder.take()
    );
    stale_channel.close().unwrap();
}

#[test]
fn concurrent_attach_of_the_same_input() {
    const NUM_THREADS: usize = 8;

    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    let recorder = add_recorder(&bus);

    let results = std::thread::scope(|scope| {
        let handles = (0..NUM_THREADS)
            .map(|_| scope.spawn(|| bus.attach_input("Keys")))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(1, results.iter().filter(|result| result.is_ok()).count());
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|err| matches!(err, Error::AlreadyAttached { .. })));
    assert_eq!(vec!["Keys"], bus.attached_inputs());
    assert_eq!(1, fixture.transport.num_receive_channels(&fixture.keys.id));

    fixture.transport.inject(&fixture.keys.id, &[0xb0, 1, 2]);

    assert_eq!(3, recorder.take().len());
}

#[test]
fn clear_all_despite_failures() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_input("Keys").unwrap();
    bus.attach_input("Pads").unwrap();
    bus.attach_output("Synth").unwrap();
    fixture.transport.set_fail_on_close(&fixture.keys.id, true);

    let report = bus.clear_all();

    assert_eq!(0, bus.input_count());
    assert_eq!(0, bus.output_count());
    assert_eq!(2, report.closed);
    assert_eq!(1, report.failures.len());
    assert_eq!("Keys", report.failures[0].0);
    assert!(!report.is_ok());
    assert_eq!(0, fixture.transport.num_receive_channels(&fixture.keys.id));
}

#[test]
fn clear_inputs_and_outputs() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_input("Keys").unwrap();
    bus.attach_input("Pads").unwrap();
    bus.attach_output("Synth").unwrap();

    let report = bus.clear_inputs();
    assert!(report.is_ok());
    assert_eq!(2, report.closed);
    assert_eq!(0, bus.input_count());
    assert_eq!(1, bus.output_count());

    let report = bus.clear_outputs();
    assert!(report.is_ok());
    assert_eq!(1, report.closed);
    assert_eq!(0, bus.output_count());
}

#[test]
fn send_note_on_clamps_arguments() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_output("Synth").unwrap();

    bus.send_note_on(20, 200, -5).unwrap();

    assert_eq!(
        vec![vec![0x9f, 0x7f, 0x00]],
        fixture.transport.sent_bytes(&fixture.synth.id)
    );
}

#[test]
fn send_shapes() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_output("Synth").unwrap();

    bus.send_bytes(&[0x91, 60, 100, 0x55]).unwrap();
    bus.send_status(0xf8).unwrap();
    bus.send_status_data1(0xc2, 7).unwrap();
    bus.send_status_data(0xe0, 0, 64).unwrap();
    bus.send_command(0xb0, 5, 7, 100).unwrap();
    bus.send_message(&MidiMessage::from_bytes(&[0xf0, 0x43, 0xf7]).unwrap())
        .unwrap();
    bus.send_note_on_event(Note::new(1, 61, 90)).unwrap();
    bus.send_note_off(1, 61, 0).unwrap();
    bus.send_note_off_event(Note::new(1, 62, 0)).unwrap();
    bus.send_controller_change(-1, 7, 128).unwrap();
    bus.send_controller_change_event(ControlChange::new(3, 1, 2))
        .unwrap();

    assert_eq!(
        vec![
            vec![0x91, 60, 100],
            vec![0xf8],
            vec![0xc2, 7],
            vec![0xe0, 0, 64],
            vec![0xb5, 7, 100],
            vec![0xf0, 0x43, 0xf7],
            vec![0x91, 61, 90],
            vec![0x81, 61, 0],
            vec![0x81, 62, 0],
            vec![0xb0, 7, 127],
            vec![0xb3, 1, 2],
        ],
        fixture.transport.sent_bytes(&fixture.synth.id)
    );
}

#[test]
fn invalid_messages_are_rejected() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_output("Synth").unwrap();

    assert!(matches!(
        bus.send_bytes(&[]),
        Err(Error::InvalidMessage { .. })
    ));
    assert!(matches!(
        bus.send_status(0x40),
        Err(Error::InvalidMessage { .. })
    ));
    assert!(matches!(
        bus.send_status_data(0x90, 200, 0),
        Err(Error::InvalidMessage { .. })
    ));
    assert!(matches!(
        bus.send_command(0x90, 16, 0, 0),
        Err(Error::InvalidMessage { .. })
    ));

    assert!(fixture.transport.sent(&fixture.synth.id).is_empty());
}

#[test]
fn invalid_system_exclusive_and_meta_messages_are_never_sent() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_output("Synth").unwrap();

    assert!(matches!(
        bus.send_bytes(&[0xf0, 0x90, 0xc8, 0xff]),
        Err(Error::InvalidMessage { .. })
    ));
    assert!(matches!(
        bus.send_bytes(&[0xff, 0xff, 0x00]),
        Err(Error::InvalidMessage { .. })
    ));
    assert!(SystemExclusiveMessage::try_new([0xf0_u8, 0x90, 0xc8, 0xff]).is_err());
    assert!(MetaMessage::try_new(0xff, [0x00_u8]).is_err());

    assert!(fixture.transport.sent(&fixture.synth.id).is_empty());
}

#[test]
fn send_to_all_outputs() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");

    // No outputs
    bus.send_note_on(0, 60, 100).unwrap();

    bus.attach_output("Synth").unwrap();
    bus.attach_output("Pads").unwrap();
    bus.send_note_on(0, 60, 100).unwrap();

    assert_eq!(
        vec![vec![0x90, 60, 100]],
        fixture.transport.sent_bytes(&fixture.synth.id)
    );
    assert_eq!(
        vec![vec![0x90, 60, 100]],
        fixture.transport.sent_bytes(&fixture.pads.id)
    );
}

#[test]
fn failing_output_does_not_affect_others() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_output("Synth").unwrap();
    bus.attach_output("Pads").unwrap();
    fixture.transport.set_fail_on_send(&fixture.synth.id, true);

    assert!(matches!(
        bus.send_note_on(0, 60, 100),
        Err(Error::Send {
            failed: 1,
            total: 2
        })
    ));

    assert!(fixture.transport.sent(&fixture.synth.id).is_empty());
    assert_eq!(
        vec![vec![0x90, 60, 100]],
        fixture.transport.sent_bytes(&fixture.pads.id)
    );
}

#[test]
fn detach_during_outbound_fan_out() {
    const NUM_THREADS: u8 = 4;
    const NUM_MESSAGES: u8 = 100;

    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_output("Pads").unwrap();

    std::thread::scope(|scope| {
        for channel in 0..NUM_THREADS {
            let bus = &bus;
            scope.spawn(move || {
                for number in 0..NUM_MESSAGES {
                    bus.send_controller_change(channel.into(), number.into(), 0)
                        .unwrap();
                }
            });
        }
        // Concurrent structural changes
        for _ in 0..NUM_MESSAGES {
            bus.attach_output("Synth").unwrap();
            bus.detach_output("Synth").unwrap();
        }
    });

    let pads = fixture.transport.sent_bytes(&fixture.pads.id);
    let synth = fixture.transport.sent_bytes(&fixture.synth.id);

    // Every message has been delivered to Pads exactly once and in order per sender
    assert_eq!(usize::from(NUM_THREADS) * usize::from(NUM_MESSAGES), pads.len());
    for channel in 0..NUM_THREADS {
        let numbers = pads
            .iter()
            .filter(|bytes| bytes[0] == (0xb0 | channel))
            .map(|bytes| bytes[1])
            .collect::<Vec<_>>();
        assert_eq!((0..NUM_MESSAGES).collect::<Vec<_>>(), numbers);
    }
    // Synth only received complete messages, each of them once and in
    // the same order as Pads
    let mut remaining = pads.iter();
    for bytes in &synth {
        assert_eq!(3, bytes.len());
        assert!(remaining.any(|next| next == bytes));
    }
    assert_eq!(vec!["Pads"], bus.attached_outputs());
    assert_eq!(0, fixture.transport.num_transmit_channels(&fixture.synth.id));
}

#[test]
fn timestamping() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    assert!(bus.is_timestamping());
    bus.attach_input("Keys").unwrap();
    bus.attach_output("Synth").unwrap();
    let inbound = Arc::new(Mutex::new(Vec::new()));
    assert!(bus.add_listener(Arc::new({
        let inbound = Arc::clone(&inbound);
        move |_: &MidiMessage, ts: Option<TimeStamp>| inbound.lock().push(ts)
    })));

    bus.send_note_on(0, 60, 100).unwrap();
    fixture.transport.inject(&fixture.keys.id, &[0x90, 60, 100]);
    bus.set_timestamping(false);
    assert!(!bus.is_timestamping());
    bus.send_note_on(0, 60, 100).unwrap();
    fixture.transport.inject(&fixture.keys.id, &[0x90, 60, 100]);

    let sent = fixture.transport.sent(&fixture.synth.id);
    assert_eq!(2, sent.len());
    assert!(sent[0].ts.is_some());
    assert!(sent[1].ts.is_none());
    let inbound = inbound.lock();
    assert_eq!(2, inbound.len());
    assert!(inbound[0].is_some());
    assert!(inbound[1].is_none());
}

#[test]
fn timestamping_disabled_by_config() {
    let fixture = Fixture::new();
    let bus = MidiBus::new(
        Arc::clone(&fixture.registry),
        BusConfig {
            timestamping: false,
            ..Default::default()
        },
    );
    bus.attach_output("Synth").unwrap();

    bus.send_note_off(0, 60, 0).unwrap();

    assert!(fixture.transport.sent(&fixture.synth.id)[0].ts.is_none());
}

#[test]
fn listeners() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_input("Keys").unwrap();
    let first = add_recorder(&bus);
    let second = add_recorder(&bus);
    assert!(!bus.add_listener(Arc::clone(&first) as SharedListener));
    assert_eq!(2, bus.listener_count());

    fixture.transport.inject(&fixture.keys.id, &[0xc0, 1]);
    assert_eq!(1, first.take().len());
    assert_eq!(1, second.take().len());

    assert!(bus.remove_listener(&first));
    assert!(!bus.remove_listener(&first));
    assert_eq!(1, bus.listener_count());

    fixture.transport.inject(&fixture.keys.id, &[0xc0, 1]);
    assert!(first.take().is_empty());
    assert_eq!(1, second.take().len());
}

#[test]
fn listener_may_send_through_the_bus() {
    let fixture = Fixture::new();
    let bus = Arc::new(fixture.new_bus("thru"));
    bus.attach_input("Keys").unwrap();
    bus.attach_output("Synth").unwrap();
    let weak_bus: Weak<MidiBus> = Arc::downgrade(&bus);
    assert!(bus.add_listener(Arc::new(
        move |message: &MidiMessage, _: Option<TimeStamp>| {
            if let Some(bus) = weak_bus.upgrade() {
                bus.send_message(message).unwrap();
            }
        }
    )));

    fixture.transport.inject(&fixture.keys.id, &[0x90, 60, 100]);

    assert_eq!(
        vec![vec![0x90, 60, 100]],
        fixture.transport.sent_bytes(&fixture.synth.id)
    );
}

#[test]
fn buses_share_devices() {
    let fixture = Fixture::new();
    let first_bus = fixture.new_bus("first");
    let second_bus = fixture.new_bus("second");
    let first = add_recorder(&first_bus);
    let second = add_recorder(&second_bus);
    first_bus.attach_input("Keys").unwrap();
    second_bus.attach_input("Keys").unwrap();

    assert_eq!(2, fixture.transport.inject(&fixture.keys.id, &[0x80, 1, 2]));
    assert_eq!(3, first.take().len());
    assert_eq!(3, second.take().len());

    drop(second_bus);
    assert_eq!(1, fixture.transport.num_receive_channels(&fixture.keys.id));
    assert!(fixture.transport.is_device_open(&fixture.keys.id));
}

#[test]
fn inbound_messages_from_other_threads() {
    const NUM_THREADS: usize = 4;
    const NUM_MESSAGES: usize = 100;

    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_input("Keys").unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    assert!(bus.add_listener(Arc::new({
        let count = Arc::clone(&count);
        move |_: &MidiMessage, _: Option<TimeStamp>| {
            count.fetch_add(1, Ordering::Relaxed);
        }
    })));

    std::thread::scope(|scope| {
        for _ in 0..NUM_THREADS {
            scope.spawn(|| {
                for _ in 0..NUM_MESSAGES {
                    fixture.transport.inject(&fixture.keys.id, &[0xb0, 1, 2]);
                }
            });
        }
        // Concurrent structural changes
        for _ in 0..NUM_MESSAGES {
            let recorder = add_recorder(&bus);
            assert!(bus.remove_listener(&recorder));
        }
    });

    assert_eq!(NUM_THREADS * NUM_MESSAGES, count.load(Ordering::Relaxed));
}

#[test]
fn close() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    let other_bus = fixture.new_bus("other");
    let recorder = add_recorder(&bus);
    bus.attach_input("Keys").unwrap();
    bus.attach_output("Synth").unwrap();
    other_bus.attach_output("Pads").unwrap();
    fixture.transport.set_fail_on_close(&fixture.synth.id, true);

    let report = bus.close();

    assert!(bus.is_closed());
    assert_eq!(0, bus.input_count());
    assert_eq!(0, bus.output_count());
    // Synth fails twice: connection and device
    assert_eq!(2, report.failures.len());
    assert!(!fixture.transport.is_device_open(&fixture.keys.id));
    assert!(!fixture.transport.is_device_open(&fixture.synth.id));
    // Even devices that are attached to other buses
    assert!(!fixture.transport.is_device_open(&fixture.pads.id));

    assert_eq!(0, fixture.transport.inject(&fixture.keys.id, &[0x90, 60, 100]));
    assert!(recorder.take().is_empty());
    assert!(matches!(bus.attach_input("Keys"), Err(Error::Closed)));
    assert!(matches!(bus.send_note_on(0, 1, 2), Err(Error::Closed)));
    assert!(matches!(
        bus.detach_input("Keys"),
        Err(Error::NotFound { .. })
    ));
    assert!(bus.clear_all().is_ok());

    let report = bus.close();
    assert_eq!(0, report.closed);
    assert!(report.is_ok());
}

#[test]
fn dropping_a_bus_detaches_all_devices() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    bus.attach_input("Keys").unwrap();
    bus.attach_output("Synth").unwrap();

    drop(bus);

    assert_eq!(0, fixture.transport.num_receive_channels(&fixture.keys.id));
    assert_eq!(0, fixture.transport.num_transmit_channels(&fixture.synth.id));
    assert!(fixture.transport.is_device_open(&fixture.keys.id));
    assert!(fixture.transport.is_device_open(&fixture.synth.id));
}

#[test]
fn available_devices_by_name() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("test");
    assert_eq!(vec!["Keys", "Pads"], bus.available_inputs());
    assert_eq!(vec!["Synth", "Pads"], bus.available_outputs());
    assert_eq!(vec!["Busy"], bus.unavailable_devices());
}

#[test]
fn default_name_is_derived_from_time() {
    let bus = MidiBus::new(
        Arc::new(DeviceRegistry::new(MemoryTransport::new())),
        BusConfig::default(),
    );
    let suffix = bus.name().strip_prefix("MidiBus_").unwrap();
    assert_eq!(8, suffix.len());
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn display() {
    let fixture = Fixture::new();
    let bus = fixture.new_bus("Studio");
    bus.attach_input("Keys").unwrap();
    bus.attach_input("Pads").unwrap();
    bus.attach_output("Synth").unwrap();
    let _recorder = add_recorder(&bus);

    assert_eq!(
        "MidiBus: Studio [2 input(s), 1 output(s), 1 listener(s)]",
        bus.to_string()
    );
}

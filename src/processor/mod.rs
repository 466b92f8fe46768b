//! The message processor: live transposition with pedal and pad gestures.
//!
//! Every inbound message goes through [`Processor::handle`], which updates
//! the forwarded note table, the pedal/console state and the pad display,
//! and sends whatever must be forwarded back through a [`MidiSink`].
//!
//! The processor never ends the process. Console exit gestures come back as
//! `ControlFlow::Break(Exit)` and the caller decides what to do.

pub mod beatstep;
pub mod forward;
pub mod gesture;

use crate::{
    hub::{HubError, MidiSink, PortLookup},
    midi::{Destination, Event, Message},
};
use beatstep::{Pad, PadDisplay};
use forward::ForwardState;
use gesture::GestureState;
use std::{ops::ControlFlow, time::Duration};

/// Sustain-pedal style controller that toggles console mode.
pub const PEDAL_CONTROLLER: u8 = 0x43;

/// How the performer asked to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Play the reference scale and stay down.
    Halt,
    /// Leave without a sound, expecting to be restarted.
    Quiet,
}

impl Exit {
    pub fn code(&self) -> i32 {
        match self {
            Exit::Halt => 2,
            Exit::Quiet => 3,
        }
    }
}

/// Names the processor looks up once the hub is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortNames {
    /// Tried in order, first hit wins.
    pub beatstep: Vec<String>,
    pub virtual_output: Option<String>,
}

impl Default for PortNames {
    fn default() -> Self {
        Self {
            beatstep: vec!["BeatStep".to_owned(), "Arturia BeatStep".to_owned()],
            virtual_output: Some("Virtual Output".to_owned()),
        }
    }
}

pub struct Processor {
    beatstep_port: Option<usize>,
    virtual_port: Option<usize>,
    forward: ForwardState,
    gesture: GestureState,
    pads: PadDisplay,
}

impl Processor {
    pub fn new(ports: &impl PortLookup, names: &PortNames) -> Self {
        let beatstep_port = names
            .beatstep
            .iter()
            .find_map(|name| ports.port_by_name(name));
        let virtual_port = names
            .virtual_output
            .as_deref()
            .and_then(|name| ports.port_by_name(name));

        log::info!("BeatStep: port={}", display_port(beatstep_port));
        log::info!("Virtual Output: port={}", display_port(virtual_port));

        Self::with_ports(beatstep_port, virtual_port)
    }

    pub fn with_ports(beatstep_port: Option<usize>, virtual_port: Option<usize>) -> Self {
        Self {
            beatstep_port,
            virtual_port,
            forward: ForwardState::default(),
            gesture: GestureState::default(),
            pads: PadDisplay::default(),
        }
    }

    pub fn shift(&self) -> i32 {
        self.gesture.shift()
    }

    pub fn set_shift(&mut self, shift: i32) {
        self.gesture.set_shift(shift);
    }

    pub fn gesture(&self) -> &GestureState {
        &self.gesture
    }

    pub fn forwarded(&self) -> &ForwardState {
        &self.forward
    }

    /// Process one inbound message. Must not be called concurrently; the
    /// hub guarantees a single consumer.
    pub fn handle(
        &mut self,
        message: Message,
        out: &mut impl MidiSink,
    ) -> Result<ControlFlow<Exit>, HubError> {
        let event = message.event();
        let from_beatstep = self.beatstep_port == Some(message.port());

        // the pads are a controller, not an instrument
        let mut forward = !(from_beatstep && self.virtual_port.is_some());
        let mut message = message;

        if from_beatstep {
            if let Event::NoteOn { note, .. } | Event::NoteOff { note } = event {
                self.press_pad(note, matches!(event, Event::NoteOn { .. }), out)?;
                return Ok(ControlFlow::Continue(()));
            }
        }

        match event {
            Event::ControlChange {
                controller: PEDAL_CONTROLLER,
                value,
            } => {
                forward = false;
                self.gesture.pedal(value != 0, self.forward.chord());
            }
            Event::NoteOn { note, .. } if self.gesture.is_console() => {
                forward = false;
                if let Some(exit) = self.gesture.console_note(note) {
                    log::info!("console exit requested: {exit:?}");
                    return Ok(ControlFlow::Break(exit));
                }
            }
            Event::NoteOn { note, velocity } => {
                match self.forward.note_on(note, velocity, self.gesture.shift()) {
                    Some(pitch) => message = message.with_data1(pitch),
                    None => {
                        log::debug!("dropping {message}, out of range");
                        forward = false;
                    }
                }
            }
            Event::NoteOff { note } => match self.forward.note_off(note) {
                Some(pitch) => message = message.with_data1(pitch),
                None => {
                    log::debug!("dropping {message}, note is not sounding");
                    forward = false;
                }
            },
            _ => {}
        }

        if forward {
            out.send(self.route(message.port()), message.bytes())?;
        }

        Ok(ControlFlow::Continue(()))
    }

    fn route(&self, source: usize) -> Destination {
        match self.virtual_port {
            Some(port) => Destination::Port(port),
            None if Some(source) == self.beatstep_port => Destination::Broadcast,
            None => Destination::Port(source),
        }
    }

    fn press_pad(&mut self, note: u8, down: bool, out: &mut impl MidiSink) -> Result<(), HubError> {
        let Some(pad) = Pad::from_note(note) else {
            log::debug!("note {note:#04x} is not a pad");
            return Ok(());
        };

        if down {
            if let Some(value) = pad.shift() {
                self.gesture.set_shift(value - 12);
            }
        }

        let Some(port) = self.beatstep_port else {
            return Ok(());
        };

        let held = down.then_some(pad);
        for sysex in self.pads.refresh(self.gesture.shift(), held) {
            out.send_sysex(Destination::Port(port), &sysex)?;
        }

        Ok(())
    }
}

/// Ascending chromatic scale from middle C, one short note each.
pub fn play_reference_scale(out: &mut impl MidiSink, note_length: Duration) -> Result<(), HubError> {
    for note in 0x3C..=0x47u8 {
        out.send(Destination::Broadcast, &[0x90, note, 0x20])?;
        std::thread::sleep(note_length);
        out.send(Destination::Broadcast, &[0x90, note, 0x00])?;
    }
    Ok(())
}

fn display_port(port: Option<usize>) -> String {
    port.map_or_else(|| "-1".to_owned(), |index| index.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hub::test::{port, FakeBackend};
    use crate::hub::{Capability, Hub};

    const KEYBOARD: usize = 1;
    const BEATSTEP: usize = 2;
    const VIRTUAL: usize = 0;

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<(Destination, Vec<u8>)>,
        sysex: Vec<(Destination, Vec<u8>)>,
    }

    impl MidiSink for RecordingSink {
        fn send(&mut self, destination: Destination, bytes: &[u8]) -> Result<(), HubError> {
            self.sent.push((destination, bytes.to_vec()));
            Ok(())
        }

        fn send_sysex(&mut self, destination: Destination, data: &[u8]) -> Result<(), HubError> {
            self.sysex.push((destination, data.to_vec()));
            Ok(())
        }
    }

    fn msg(port: usize, bytes: [u8; 3]) -> Message {
        Message::new(port, &bytes).unwrap()
    }

    fn feed(processor: &mut Processor, sink: &mut RecordingSink, port: usize, bytes: [u8; 3]) {
        let flow = processor.handle(msg(port, bytes), sink).unwrap();
        assert_eq!(flow, ControlFlow::Continue(()));
    }

    fn sent_bytes(sink: &RecordingSink) -> Vec<Vec<u8>> {
        sink.sent.iter().map(|(_, bytes)| bytes.clone()).collect()
    }

    #[test]
    fn resolves_ports_by_name_with_fallback() {
        let backend = FakeBackend {
            ports: vec![
                port(0, "Virtual Output", Capability::VIRTUAL_OUTPUT),
                port(1, "Keystation", Capability::DUPLEX),
                port(2, "Arturia BeatStep", Capability::DUPLEX),
            ],
            ..Default::default()
        };
        let hub = Hub::open(backend).unwrap();

        let processor = Processor::new(&hub, &PortNames::default());
        assert_eq!(processor.beatstep_port, Some(2));
        assert_eq!(processor.virtual_port, Some(0));

        let names = PortNames {
            beatstep: vec!["Nope".to_owned()],
            virtual_output: None,
        };
        let processor = Processor::new(&hub, &names);
        assert_eq!(processor.beatstep_port, None);
        assert_eq!(processor.virtual_port, None);
    }

    #[test]
    fn identity_when_shift_is_zero() {
        let mut processor = Processor::with_ports(None, None);
        let mut sink = RecordingSink::default();

        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 0x40, 0x64]);
        assert_eq!(
            sink.sent,
            vec![(Destination::Port(KEYBOARD), vec![0x90, 0x40, 0x64])]
        );
    }

    #[test]
    fn note_off_follows_the_note_on_pitch() {
        let mut processor = Processor::with_ports(None, None);
        let mut sink = RecordingSink::default();
        processor.set_shift(3);

        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 0x40, 0x64]);
        processor.set_shift(-20);
        feed(&mut processor, &mut sink, KEYBOARD, [0x80, 0x40, 0x00]);

        assert_eq!(
            sent_bytes(&sink),
            vec![vec![0x90, 0x43, 0x64], vec![0x80, 0x43, 0x00]]
        );
    }

    #[test]
    fn out_of_range_notes_leave_no_trace() {
        let mut processor = Processor::with_ports(None, None);
        let mut sink = RecordingSink::default();
        processor.set_shift(5);

        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 0x7F, 0x64]);
        feed(&mut processor, &mut sink, KEYBOARD, [0x80, 0x7F, 0x00]);

        assert!(sink.sent.is_empty());
        assert!(!processor.forwarded().is_sounding(0x7F));
    }

    #[test]
    fn spurious_note_offs_are_filtered() {
        let mut processor = Processor::with_ports(None, None);
        let mut sink = RecordingSink::default();

        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 0x30, 0x50]);
        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 0x30, 0x00]);
        feed(&mut processor, &mut sink, KEYBOARD, [0x80, 0x30, 0x00]);

        assert_eq!(
            sent_bytes(&sink),
            vec![vec![0x90, 0x30, 0x50], vec![0x90, 0x30, 0x00]]
        );
    }

    #[test]
    fn other_messages_pass_through() {
        let mut processor = Processor::with_ports(None, Some(VIRTUAL));
        let mut sink = RecordingSink::default();
        processor.set_shift(7);

        feed(&mut processor, &mut sink, KEYBOARD, [0xB0, 0x07, 0x64]);
        feed(&mut processor, &mut sink, KEYBOARD, [0xE0, 0x00, 0x40]);

        assert_eq!(
            sink.sent,
            vec![
                (Destination::Port(VIRTUAL), vec![0xB0, 0x07, 0x64]),
                (Destination::Port(VIRTUAL), vec![0xE0, 0x00, 0x40]),
            ]
        );
    }

    #[test]
    fn pedal_down_over_a_transition_chord_shifts_up() {
        let mut processor = Processor::with_ports(None, None);
        let mut sink = RecordingSink::default();

        // C#, F, G#: pitch classes 1, 5, 8 = 0x122
        for note in [0x31, 0x35, 0x38] {
            feed(&mut processor, &mut sink, KEYBOARD, [0x90, note, 0x64]);
        }
        sink.sent.clear();

        feed(&mut processor, &mut sink, KEYBOARD, [0xB3, 0x43, 0x7F]);
        assert!(processor.gesture().is_console());
        assert_eq!(processor.shift(), 2);
        assert!(sink.sent.is_empty());

        feed(&mut processor, &mut sink, KEYBOARD, [0xB3, 0x43, 0x00]);
        assert!(!processor.gesture().is_console());
        assert_eq!(processor.shift(), 2);
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn console_notes_are_swallowed_but_releases_still_forward() {
        let mut processor = Processor::with_ports(None, None);
        let mut sink = RecordingSink::default();

        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 0x40, 0x64]);
        feed(&mut processor, &mut sink, KEYBOARD, [0xB0, 0x43, 0x7F]);
        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 0x43, 0x64]);
        assert_eq!(processor.shift(), 3);

        feed(&mut processor, &mut sink, KEYBOARD, [0x80, 0x43, 0x00]);
        feed(&mut processor, &mut sink, KEYBOARD, [0x80, 0x40, 0x00]);
        feed(&mut processor, &mut sink, KEYBOARD, [0xB0, 0x43, 0x00]);
        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 0x40, 0x64]);

        assert_eq!(
            sent_bytes(&sink),
            vec![
                vec![0x90, 0x40, 0x64],
                vec![0x80, 0x40, 0x00],
                vec![0x90, 0x43, 0x64],
            ]
        );
    }

    #[test]
    fn console_exit_gestures_break_out() {
        for (note, exit) in [(48, Exit::Halt), (47, Exit::Quiet)] {
            let mut processor = Processor::with_ports(None, None);
            let mut sink = RecordingSink::default();

            feed(&mut processor, &mut sink, KEYBOARD, [0xB0, 0x43, 0x7F]);
            for _ in 0..4 {
                feed(&mut processor, &mut sink, KEYBOARD, [0x90, note, 0x64]);
            }

            let flow = processor
                .handle(msg(KEYBOARD, [0x90, note, 0x64]), &mut sink)
                .unwrap();
            assert_eq!(flow, ControlFlow::Break(exit));
            assert!(sink.sent.is_empty());
        }
    }

    #[test]
    fn pedal_release_cancels_a_pending_exit() {
        let mut processor = Processor::with_ports(None, None);
        let mut sink = RecordingSink::default();

        feed(&mut processor, &mut sink, KEYBOARD, [0xB0, 0x43, 0x7F]);
        for _ in 0..4 {
            feed(&mut processor, &mut sink, KEYBOARD, [0x90, 48, 0x64]);
        }
        feed(&mut processor, &mut sink, KEYBOARD, [0xB0, 0x43, 0x00]);
        feed(&mut processor, &mut sink, KEYBOARD, [0xB0, 0x43, 0x7F]);
        feed(&mut processor, &mut sink, KEYBOARD, [0x90, 48, 0x64]);

        assert_eq!(processor.gesture().exit_count(), 1);
    }

    #[test]
    fn beatstep_pad_selects_the_shift_and_repaints() {
        let mut processor = Processor::with_ports(Some(BEATSTEP), Some(VIRTUAL));
        let mut sink = RecordingSink::default();

        // note 0x28 is pad 12, value 5
        feed(&mut processor, &mut sink, BEATSTEP, [0x90, 0x28, 0x7F]);
        assert_eq!(processor.shift(), -7);
        assert!(sink.sent.is_empty());
        assert_eq!(sink.sysex.len(), 15);
        assert!(sink
            .sysex
            .iter()
            .all(|(destination, _)| *destination == Destination::Port(BEATSTEP)));

        // the matching pad is the one held down, so every painted pad is black
        assert!(sink.sysex.iter().all(|(_, data)| data[10] == 0x00));
        assert!(sink.sysex.iter().all(|(_, data)| data[9] != 0x7C));

        sink.sysex.clear();
        feed(&mut processor, &mut sink, BEATSTEP, [0x80, 0x28, 0x00]);
        assert_eq!(sink.sysex.len(), 16);
        let lit: Vec<_> = sink
            .sysex
            .iter()
            .filter(|(_, data)| data[10] == 0x10)
            .map(|(_, data)| data[9])
            .collect();
        assert_eq!(lit, vec![0x7C]);
    }

    #[test]
    fn unmapped_pads_only_repaint() {
        let mut processor = Processor::with_ports(Some(BEATSTEP), None);
        let mut sink = RecordingSink::default();
        processor.set_shift(2);

        // note 0x2C is pad 0
        feed(&mut processor, &mut sink, BEATSTEP, [0x90, 0x2C, 0x7F]);
        assert_eq!(processor.shift(), 2);
        assert_eq!(sink.sysex.len(), 15);
        let lit: Vec<_> = sink
            .sysex
            .iter()
            .filter(|(_, data)| data[10] == 0x10)
            .map(|(_, data)| data[9])
            .collect();
        assert_eq!(lit, vec![0x7F]);
    }

    #[test]
    fn beatstep_notes_never_sound() {
        let mut processor = Processor::with_ports(Some(BEATSTEP), None);
        let mut sink = RecordingSink::default();

        feed(&mut processor, &mut sink, BEATSTEP, [0x90, 0x10, 0x7F]);
        feed(&mut processor, &mut sink, BEATSTEP, [0x80, 0x10, 0x00]);
        assert!(sink.sent.is_empty());
        assert!(sink.sysex.is_empty());
    }

    #[test]
    fn beatstep_controls_are_broadcast_without_a_virtual_bus() {
        let mut processor = Processor::with_ports(Some(BEATSTEP), None);
        let mut sink = RecordingSink::default();

        feed(&mut processor, &mut sink, BEATSTEP, [0xB0, 0x0A, 0x40]);
        assert_eq!(
            sink.sent,
            vec![(Destination::Broadcast, vec![0xB0, 0x0A, 0x40])]
        );
    }

    #[test]
    fn beatstep_controls_stay_off_the_virtual_bus() {
        let mut processor = Processor::with_ports(Some(BEATSTEP), Some(VIRTUAL));
        let mut sink = RecordingSink::default();

        feed(&mut processor, &mut sink, BEATSTEP, [0xB0, 0x0A, 0x40]);
        assert!(sink.sent.is_empty());

        // the pedal still works from the controller
        feed(&mut processor, &mut sink, BEATSTEP, [0xB0, 0x43, 0x7F]);
        assert!(processor.gesture().is_console());
    }

    #[test]
    fn reference_scale_is_twelve_struck_notes() {
        let mut sink = RecordingSink::default();
        play_reference_scale(&mut sink, Duration::ZERO).unwrap();

        assert_eq!(sink.sent.len(), 24);
        assert!(sink
            .sent
            .iter()
            .all(|(destination, _)| *destination == Destination::Broadcast));
        assert_eq!(sink.sent[0].1, vec![0x90, 0x3C, 0x20]);
        assert_eq!(sink.sent[1].1, vec![0x90, 0x3C, 0x00]);
        assert_eq!(sink.sent[23].1, vec![0x90, 0x47, 0x00]);
    }

    fn keyboard_hub(inbox: Vec<Option<Message>>) -> Hub<FakeBackend> {
        let backend = FakeBackend {
            ports: vec![
                port(VIRTUAL, "Virtual Output", Capability::VIRTUAL_OUTPUT),
                port(KEYBOARD, "Keystation", Capability::DUPLEX),
            ],
            inbox: inbox.into(),
            ..Default::default()
        };
        Hub::open(backend).unwrap()
    }

    fn pump_until_hangup(hub: &mut Hub<FakeBackend>, processor: &mut Processor) {
        let result = hub.pump(|hub, message| processor.handle(message, hub));
        assert!(matches!(result, Err(HubError::Disconnected)));
    }

    #[test]
    fn two_byte_messages_are_never_padded_on_the_way_out() {
        let mut hub = keyboard_hub(vec![
            Message::from_packet(KEYBOARD, &[0xC0, 0x05]),
            Message::from_packet(KEYBOARD, &[0xD0, 0x40]),
        ]);
        let mut processor = Processor::new(&hub, &PortNames::default());

        pump_until_hangup(&mut hub, &mut processor);
        assert!(hub.backend().sent.is_empty());
    }

    #[test]
    fn a_truncated_read_does_not_eat_the_note_off() {
        let mut hub = keyboard_hub(vec![
            Message::new(KEYBOARD, &[0x90, 0x40, 0x64]),
            Message::new(KEYBOARD, &[0x90, 0x40]),
            Message::new(KEYBOARD, &[0x80, 0x40, 0x00]),
        ]);
        let mut processor = Processor::new(&hub, &PortNames::default());

        pump_until_hangup(&mut hub, &mut processor);
        assert_eq!(
            hub.backend().sent,
            vec![
                (VIRTUAL, vec![0x90, 0x40, 0x64]),
                (VIRTUAL, vec![0x80, 0x40, 0x00]),
            ]
        );
        assert!(!processor.forwarded().is_sounding(0x40));
    }

    #[test]
    fn drives_a_hub_end_to_end() {
        let backend = FakeBackend {
            ports: vec![
                port(0, "Virtual Output", Capability::VIRTUAL_OUTPUT),
                port(1, "Keystation", Capability::DUPLEX),
            ],
            inbox: [
                [0xB0, 0x43, 0x7F],
                [0x90, 0x3F, 0x64],
                [0xB0, 0x43, 0x00],
                [0x90, 0x3C, 0x64],
                [0x80, 0x3C, 0x00],
                [0xB0, 0x43, 0x7F],
                [0x90, 0x30, 0x64],
                [0x90, 0x30, 0x64],
                [0x90, 0x30, 0x64],
                [0x90, 0x30, 0x64],
                [0x90, 0x30, 0x64],
            ]
            .into_iter()
            .map(|bytes| Message::new(1, &bytes))
            .collect(),
            ..Default::default()
        };

        let mut hub = Hub::open(backend).unwrap();
        let mut processor = Processor::new(&hub, &PortNames::default());

        let exit = hub
            .pump(|hub, message| processor.handle(message, hub))
            .unwrap();
        assert_eq!(exit, Exit::Halt);
        assert_eq!(processor.shift(), -1);
    }
}

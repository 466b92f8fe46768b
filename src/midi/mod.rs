//! Short MIDI messages as they travel through the hub.
//!
//! A [`Message`] is one to three raw octets tagged with the index of the
//! port it came from. Only the status byte is interpreted here; everything
//! else is left to the processor.

use std::fmt;

pub const NOTE_OFF: u8 = 0x8;
pub const NOTE_ON: u8 = 0x9;
pub const CONTROL_CHANGE: u8 = 0xB;

/// Where an outbound message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Every open output-capable port.
    Broadcast,
    Port(usize),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Broadcast => write!(f, "-1"),
            Destination::Port(index) => write!(f, "{index}"),
        }
    }
}

/// Musical reading of a short message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    NoteOn { note: u8, velocity: u8 },
    /// Also produced by a note-on with zero velocity.
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    port: usize,
    bytes: [u8; 3],
    len: usize,
}

impl Message {
    /// Wraps 1 to 3 raw bytes received on `port`.
    pub fn new(port: usize, bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 3 {
            return None;
        }

        let mut buf = [0u8; 3];
        buf[..bytes.len()].copy_from_slice(bytes);

        Some(Self {
            port,
            bytes: buf,
            len: bytes.len(),
        })
    }

    /// Accepts a channel voice message from a driver packet, dropping
    /// anything else (sysex, clock, sensing...). The length is kept as
    /// received.
    pub fn from_packet(port: usize, bytes: &[u8]) -> Option<Self> {
        match bytes {
            [status, ..] if !(0x80..=0xEF).contains(status) => None,
            [_, _] | [_, _, _] => Self::new(port, bytes),
            _ => None,
        }
    }

    pub fn port(&self) -> usize {
        self.port
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    pub fn command(&self) -> u8 {
        (self.bytes[0] >> 4) & 0x0F
    }

    pub fn channel(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    /// Note or controller number, always in `0..128`.
    pub fn data1(&self) -> u8 {
        self.bytes[1] & 0x7F
    }

    pub fn data2(&self) -> u8 {
        self.bytes[2]
    }

    /// Status byte in the channel voice range (`0x80..=0xEF`).
    pub fn is_channel_voice(&self) -> bool {
        (0x80..=0xEF).contains(&self.status())
    }

    /// Same message with its first data byte replaced.
    pub fn with_data1(mut self, value: u8) -> Self {
        self.bytes[1] = value;
        self
    }

    /// Notes and controllers are only read from complete 3-byte messages;
    /// a truncated one is [`Event::Other`].
    pub fn event(&self) -> Event {
        let data2 = self.data2();
        match self.command() {
            NOTE_ON | NOTE_OFF | CONTROL_CHANGE if self.len != 3 => Event::Other,
            NOTE_ON if data2 != 0 => Event::NoteOn {
                note: self.data1(),
                velocity: data2,
            },
            NOTE_ON | NOTE_OFF => Event::NoteOff { note: self.data1() },
            CONTROL_CHANGE => Event::ControlChange {
                controller: self.data1(),
                value: data2,
            },
            _ => Event::Other,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.len {
            2 | 3 => write!(f, "{}: {}", self.port, format_hex(self.bytes())),
            _ => write!(f, "{}: ?", self.port),
        }
    }
}

/// Hex dump used for logging, e.g. `F0 00 20 6B`.
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

//! The MIDI hub multiplexes every open port into a single inbound stream
//! and routes outbound messages by port index or broadcast.
//!
//! Port discovery and the raw I/O belong to a [`Backend`]. Two exist:
//!
//! - [`push::MidirBackend`]: driver threads deliver input through `midir`
//!   callbacks, which only enqueue into a channel.
//! - [`pull::RawMidiBackend`] (Linux): one thread blocks in `poll(2)` over
//!   the raw MIDI character devices.
//!
//! Either way the hub is consumed from a single thread, so whatever the
//! message handler mutates needs no lock.

#[cfg(target_os = "linux")]
pub mod pull;
pub mod push;

use crate::midi::{format_hex, Destination, Message};
use std::{fmt, ops::ControlFlow};

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("device i/o error : {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to create midi client : {0}")]
    Init(#[from] midir::InitError),

    #[error("failed to connect to {port} : {reason}")]
    Connect { port: String, reason: String },

    #[error("failed to send midi : {0}")]
    Send(#[from] midir::SendError),

    #[error("midi input stream has hung up")]
    Disconnected,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub input: bool,
    pub output: bool,
    pub virtual_output: bool,
}

impl Capability {
    pub const INPUT: Self = Self {
        input: true,
        output: false,
        virtual_output: false,
    };

    pub const OUTPUT: Self = Self {
        input: false,
        output: true,
        virtual_output: false,
    };

    pub const DUPLEX: Self = Self {
        input: true,
        output: true,
        virtual_output: false,
    };

    pub const VIRTUAL_OUTPUT: Self = Self {
        input: false,
        output: false,
        virtual_output: true,
    };

    pub fn can_send(&self) -> bool {
        self.output || self.virtual_output
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.input, "input"),
            (self.output, "output"),
            (self.virtual_output, "virtual-output"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();

        write!(f, "{}", names.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub index: usize,
    pub name: String,
    pub capability: Capability,
}

/// A port directory: enumerates endpoints and moves raw bytes.
#[cfg_attr(test, mockall::automock)]
pub trait Backend {
    /// Enumerate the endpoints and get ready to receive. Called once.
    fn open(&mut self) -> Result<Vec<Port>, HubError>;

    /// Block until an input has data. `None` means a wake-up with nothing
    /// to deliver; the caller simply waits again.
    fn recv(&mut self) -> Result<Option<Message>, HubError>;

    fn send(&mut self, port: usize, bytes: &[u8]) -> Result<(), HubError>;

    fn send_sysex(&mut self, port: usize, data: &[u8]) -> Result<(), HubError>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn open(&mut self) -> Result<Vec<Port>, HubError> {
        (**self).open()
    }

    fn recv(&mut self) -> Result<Option<Message>, HubError> {
        (**self).recv()
    }

    fn send(&mut self, port: usize, bytes: &[u8]) -> Result<(), HubError> {
        (**self).send(port, bytes)
    }

    fn send_sysex(&mut self, port: usize, data: &[u8]) -> Result<(), HubError> {
        (**self).send_sysex(port, data)
    }
}

/// Outbound half of the hub, as seen by the processor.
pub trait MidiSink {
    fn send(&mut self, destination: Destination, bytes: &[u8]) -> Result<(), HubError>;
    fn send_sysex(&mut self, destination: Destination, data: &[u8]) -> Result<(), HubError>;
}

pub trait PortLookup {
    /// Index of the first port named exactly `name`.
    fn port_by_name(&self, name: &str) -> Option<usize>;
}

pub struct Hub<B> {
    backend: B,
    ports: Vec<Port>,
}

impl<B: Backend> Hub<B> {
    pub fn open(mut backend: B) -> Result<Self, HubError> {
        let ports = backend.open()?;

        for port in &ports {
            log::info!(
                "device {}: name={} ({})",
                port.index,
                port.name,
                port.capability
            );
        }

        Ok(Self { backend, ports })
    }

    pub fn ports(&self) -> &[Port] {
        self.ports.as_slice()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Block until the next channel voice message arrives.
    pub fn recv(&mut self) -> Result<Message, HubError> {
        loop {
            let Some(message) = self.backend.recv()? else {
                continue;
            };

            if message.is_channel_voice() {
                log::trace!("in  {message}");
                return Ok(message);
            }

            log::trace!("ignoring non voice message {message}");
        }
    }

    /// Feed every inbound message to `handler` until it breaks.
    pub fn pump<T, F>(&mut self, mut handler: F) -> Result<T, HubError>
    where
        F: FnMut(&mut Self, Message) -> Result<ControlFlow<T>, HubError>,
    {
        loop {
            let message = self.recv()?;
            if let ControlFlow::Break(value) = handler(self, message)? {
                return Ok(value);
            }
        }
    }

    fn is_output(&self, index: usize) -> bool {
        self.ports
            .get(index)
            .is_some_and(|port| port.capability.can_send())
    }
}

impl<B: Backend> MidiSink for Hub<B> {
    fn send(&mut self, destination: Destination, bytes: &[u8]) -> Result<(), HubError> {
        if bytes.len() != 3 {
            log::warn!(
                "output: ignoring unsupported message: {destination}: {}",
                format_hex(bytes)
            );
            return Ok(());
        }

        log::trace!("out {destination}: {}", format_hex(bytes));

        match destination {
            Destination::Broadcast => {
                for port in self.ports.iter().filter(|p| p.capability.can_send()) {
                    self.backend.send(port.index, bytes)?;
                }
            }
            Destination::Port(index) if self.is_output(index) => {
                self.backend.send(index, bytes)?;
            }
            Destination::Port(index) => log::debug!("no output port {index}, dropping"),
        }

        Ok(())
    }

    fn send_sysex(&mut self, destination: Destination, data: &[u8]) -> Result<(), HubError> {
        log::trace!("out {destination}: {}", format_hex(data));

        match destination {
            Destination::Broadcast => {
                for port in self.ports.iter().filter(|p| p.capability.can_send()) {
                    self.backend.send_sysex(port.index, data)?;
                }
            }
            Destination::Port(index) if self.is_output(index) => {
                self.backend.send_sysex(index, data)?;
            }
            Destination::Port(index) => log::debug!("no output port {index}, dropping sysex"),
        }

        Ok(())
    }
}

impl<B> PortLookup for Hub<B> {
    fn port_by_name(&self, name: &str) -> Option<usize> {
        self.ports
            .iter()
            .find(|port| port.name == name)
            .map(|port| port.index)
    }
}

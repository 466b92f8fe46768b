use super::{Backend, Capability, HubError, Port};
use crate::midi::Message;
use crossbeam::channel::{Receiver, Sender};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

const CLIENT_NAME: &str = "miditrick";
const VIRTUAL_SOURCE_NAME: &str = "Miditrick";
const MISSING_NAME: &str = "???";
const INGRESS_CAPACITY: usize = 1_000;

/// Port numbering for the `midir` directory, kept apart from the driver
/// connections so it can be exercised on its own.
#[derive(Debug, Default)]
struct PortTable {
    ports: Vec<Port>,
}

impl PortTable {
    fn push(&mut self, name: String, capability: Capability) -> usize {
        let index = self.ports.len();
        self.ports.push(Port {
            index,
            name,
            capability,
        });
        index
    }

    fn add_virtual(&mut self, name: String) -> usize {
        self.push(name, Capability::VIRTUAL_OUTPUT)
    }

    fn publishes_virtual(&self) -> bool {
        self.ports
            .first()
            .is_some_and(|port| port.capability.virtual_output)
    }

    /// `None` for our own virtual source, which would echo everything we
    /// send back in.
    fn add_source(&mut self, name: String) -> Option<usize> {
        if self.publishes_virtual() && name.contains(VIRTUAL_SOURCE_NAME) {
            log::debug!("push: skipping own source {name}");
            return None;
        }

        Some(self.push(name, Capability::INPUT))
    }

    /// A destination joins the first source of the same name that has no
    /// output yet, otherwise it gets a port of its own.
    fn add_destination(&mut self, name: String) -> usize {
        let joined = self.ports.iter_mut().find(|port| {
            port.name == name && port.capability.input && !port.capability.output
        });

        match joined {
            Some(port) => {
                port.capability.output = true;
                port.index
            }
            None => self.push(name, Capability::OUTPUT),
        }
    }
}

/// Callback body: keep channel voice packets, never block the driver thread.
///
/// When the consumer falls more than `INGRESS_CAPACITY` messages behind,
/// the packet is dropped and logged; a dropped note-off leaves that note
/// hanging on the receiver.
fn enqueue(sender: &Sender<Message>, port: usize, bytes: &[u8]) -> bool {
    let Some(message) = Message::from_packet(port, bytes) else {
        return false;
    };

    match sender.try_send(message) {
        Ok(()) => true,
        Err(e) => {
            log::error!("failed to push midi message {message} : {e}");
            false
        }
    }
}

/// `midir` backed port directory.
///
/// Every input endpoint is connected with a callback that runs on the
/// driver's own thread and only pushes the message into a bounded channel,
/// so the hub still consumes input from a single thread. Messages arriving
/// while the channel is full are lost.
///
/// On Unix a virtual source is published first, as port 0, under the
/// configured virtual output name.
pub struct MidirBackend {
    virtual_output: Option<String>,
    table: PortTable,
    outputs: Vec<Option<MidiOutputConnection>>,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    connections: Vec<MidiInputConnection<Sender<Message>>>,
}

impl MidirBackend {
    pub fn new(virtual_output: Option<String>) -> Self {
        let (sender, receiver) = crossbeam::channel::bounded(INGRESS_CAPACITY);

        Self {
            virtual_output,
            table: PortTable::default(),
            outputs: vec![],
            sender,
            receiver,
            connections: vec![],
        }
    }

    fn attach_output(&mut self, index: usize, connection: MidiOutputConnection) {
        if self.outputs.len() <= index {
            self.outputs.resize_with(index + 1, || None);
        }
        self.outputs[index] = Some(connection);
    }

    #[cfg(unix)]
    fn open_virtual_output(&mut self, name: String) -> Result<(), HubError> {
        use midir::os::unix::VirtualOutput;

        let connection = MidiOutput::new(CLIENT_NAME)?
            .create_virtual(VIRTUAL_SOURCE_NAME)
            .map_err(|e| HubError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        let index = self.table.add_virtual(name);
        self.attach_output(index, connection);
        Ok(())
    }

    #[cfg(not(unix))]
    fn open_virtual_output(&mut self, name: String) -> Result<(), HubError> {
        log::warn!("push: virtual ports are not supported here, {name} is disabled");
        Ok(())
    }

    fn open_inputs(&mut self) -> Result<(), HubError> {
        let midi_in = MidiInput::new(CLIENT_NAME)?;

        for port in midi_in.ports().iter() {
            let name = midi_in.port_name(port).unwrap_or_else(|e| {
                log::warn!("push: unnamed input : {e}");
                MISSING_NAME.to_owned()
            });
            log::debug!("push: source {name}");

            let Some(index) = self.table.add_source(name.clone()) else {
                continue;
            };

            let callback = move |_timestamp: u64, bytes: &[u8], sender: &mut Sender<Message>| {
                enqueue(sender, index, bytes);
            };

            let connection = MidiInput::new(CLIENT_NAME)?
                .connect(port, "miditrick-in", callback, self.sender.clone())
                .map_err(|e| HubError::Connect {
                    port: name,
                    reason: e.to_string(),
                })?;

            self.connections.push(connection);
        }

        Ok(())
    }

    fn open_outputs(&mut self) -> Result<(), HubError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        for port in midi_out.ports().iter() {
            let name = midi_out.port_name(port).unwrap_or_else(|e| {
                log::warn!("push: unnamed output : {e}");
                MISSING_NAME.to_owned()
            });
            log::debug!("push: destination {name}");

            let connection = MidiOutput::new(CLIENT_NAME)?
                .connect(port, "miditrick-out")
                .map_err(|e| HubError::Connect {
                    port: name.clone(),
                    reason: e.to_string(),
                })?;

            let index = self.table.add_destination(name);
            self.attach_output(index, connection);
        }

        Ok(())
    }

    fn output(&mut self, port: usize) -> Option<&mut MidiOutputConnection> {
        self.outputs.get_mut(port)?.as_mut()
    }
}

impl Backend for MidirBackend {
    fn open(&mut self) -> Result<Vec<Port>, HubError> {
        if let Some(name) = self.virtual_output.clone() {
            self.open_virtual_output(name)?;
        }

        self.open_inputs()?;
        self.open_outputs()?;

        Ok(self.table.ports.clone())
    }

    fn recv(&mut self) -> Result<Option<Message>, HubError> {
        self.receiver
            .recv()
            .map(Some)
            .map_err(|_| HubError::Disconnected)
    }

    fn send(&mut self, port: usize, bytes: &[u8]) -> Result<(), HubError> {
        if let Some(connection) = self.output(port) {
            connection.send(bytes)?;
        }
        Ok(())
    }

    fn send_sysex(&mut self, port: usize, data: &[u8]) -> Result<(), HubError> {
        // midir copies the buffer before handing it to the driver
        if let Some(connection) = self.output(port) {
            connection.send(data)?;
        }
        Ok(())
    }
}

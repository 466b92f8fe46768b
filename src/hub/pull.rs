use super::{Backend, Capability, HubError, Port};
use crate::midi::Message;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::fd::AsRawFd,
    path::PathBuf,
};

const MAX_CARDS: usize = 4;

struct RawDevice {
    file: File,
    name: String,
}

/// Raw MIDI character devices (`/dev/snd/midiC<n>D0`), read with a
/// blocking `poll(2)` over every opened device.
///
/// Each device is opened read-write and becomes one duplex port. When
/// several devices are readable at once only the lowest index is serviced
/// per wake-up.
pub struct RawMidiBackend {
    dev_dir: PathBuf,
    sys_dir: PathBuf,
    devices: Vec<RawDevice>,
}

impl Default for RawMidiBackend {
    fn default() -> Self {
        Self::with_dirs("/dev/snd", "/sys/class/sound")
    }
}

impl RawMidiBackend {
    pub fn with_dirs(dev_dir: impl Into<PathBuf>, sys_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
            sys_dir: sys_dir.into(),
            devices: vec![],
        }
    }

    fn card_id(&self, card: usize) -> String {
        let path = self
            .sys_dir
            .join(format!("midiC{card}D0"))
            .join("device")
            .join("id");

        match std::fs::read_to_string(&path) {
            Ok(id) => id.trim_end().to_owned(),
            Err(e) => {
                log::warn!("raw: no id for card {card} ({}) : {e}", path.display());
                String::new()
            }
        }
    }

    fn device(&mut self, port: usize) -> Result<&mut File, HubError> {
        self.devices
            .get_mut(port)
            .map(|device| &mut device.file)
            .ok_or_else(|| {
                HubError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no raw midi device at port {port}"),
                ))
            })
    }

    fn write(&mut self, port: usize, bytes: &[u8]) -> Result<(), HubError> {
        // write_all already retries on EINTR
        self.device(port)?.write_all(bytes)?;
        Ok(())
    }
}

impl Backend for RawMidiBackend {
    fn open(&mut self) -> Result<Vec<Port>, HubError> {
        for card in 0..MAX_CARDS {
            let path = self.dev_dir.join(format!("midiC{card}D0"));

            let file = match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(file) => file,
                Err(e) => {
                    log::debug!("raw: skipping {} : {e}", path.display());
                    continue;
                }
            };

            let name = self.card_id(card);
            log::info!("raw: open device {} ({name})", path.display());
            self.devices.push(RawDevice { file, name });
        }

        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(index, device)| Port {
                index,
                name: device.name.clone(),
                capability: Capability::DUPLEX,
            })
            .collect())
    }

    fn recv(&mut self) -> Result<Option<Message>, HubError> {
        let mut fds: Vec<libc::pollfd> = self
            .devices
            .iter()
            .map(|device| libc::pollfd {
                fd: device.file.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        loop {
            // SAFETY: `fds` is a live, correctly sized array of pollfd for the
            // duration of the call, and every descriptor is owned by `self`.
            let rv = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rv >= 0 {
                break;
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        }

        let Some(port) = fds.iter().position(|fd| fd.revents != 0) else {
            return Ok(None);
        };

        let mut buf = [0u8; 3];
        let len = loop {
            match self.devices[port].file.read(&mut buf) {
                Ok(0) => {
                    return Err(HubError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("device {} went away", self.devices[port].name),
                    )))
                }
                Ok(len) => break len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        Ok(Message::new(port, &buf[..len]))
    }

    fn send(&mut self, port: usize, bytes: &[u8]) -> Result<(), HubError> {
        self.write(port, bytes)
    }

    fn send_sysex(&mut self, port: usize, data: &[u8]) -> Result<(), HubError> {
        self.write(port, data)
    }
}

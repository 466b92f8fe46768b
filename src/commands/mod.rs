pub mod ports;
pub mod run;

use crate::hub::{push::MidirBackend, Backend, Hub};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
pub struct CommonOptions {
    /// Log every message in and out
    #[arg(long, default_value_t = false, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long, default_value_t = false)]
    pub quiet: bool,

    /// Path to log file to write to, defaults to `~/.miditrick/log/<command>.log`
    #[arg(long)]
    pub log: Option<PathBuf>,
}

impl CommonOptions {
    pub fn level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Trace
        } else if self.quiet {
            log::LevelFilter::Warn
        } else {
            log::LevelFilter::Debug
        }
    }

    pub fn log_file(&self, command: &str) -> Option<PathBuf> {
        self.log
            .clone()
            .or_else(|| crate::locations::log_file(command))
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Cross-platform driver callbacks (ALSA sequencer, CoreMIDI, WinMM)
    #[default]
    Midir,
    /// Linux raw MIDI devices under /dev/snd
    Raw,
}

#[derive(clap::Args, Debug)]
pub struct BackendOptions {
    /// Port directory to use
    #[arg(long, value_enum, default_value_t)]
    pub backend: BackendKind,

    /// Name of the virtual output port other software can listen to
    #[arg(long, default_value = "Virtual Output")]
    pub virtual_output: String,

    /// Do not publish a virtual output port
    #[arg(long, default_value_t = false)]
    pub no_virtual: bool,
}

impl BackendOptions {
    pub fn virtual_output(&self) -> Option<String> {
        (!self.no_virtual).then(|| self.virtual_output.clone())
    }

    pub fn open_hub(&self) -> anyhow::Result<Hub<Box<dyn Backend>>> {
        let backend: Box<dyn Backend> = match self.backend {
            BackendKind::Midir => Box::new(MidirBackend::new(self.virtual_output())),
            #[cfg(target_os = "linux")]
            BackendKind::Raw => Box::<crate::hub::pull::RawMidiBackend>::default(),
            #[cfg(not(target_os = "linux"))]
            BackendKind::Raw => anyhow::bail!("raw midi devices are only available on linux"),
        };

        Ok(Hub::open(backend)?)
    }
}

use super::{BackendOptions, CommonOptions};
use crate::{
    hub::{Backend, Hub},
    processor::{play_reference_scale, Exit, PortNames, Processor},
};
use std::time::Duration;

#[derive(Debug, clap::Parser)]
pub struct Options {
    #[command(flatten)]
    backend: BackendOptions,

    /// Name of the pad controller port, may be repeated, first match wins
    #[arg(long = "beatstep", default_values_t = [String::from("BeatStep"), String::from("Arturia BeatStep")])]
    beatstep: Vec<String>,

    /// Length in milliseconds of each note of the exit scale
    #[arg(long, default_value_t = 100)]
    scale_note_ms: u64,

    /// Do not echo the log to the console
    #[arg(long, default_value_t = false)]
    no_console: bool,
}

impl Options {
    fn port_names(&self) -> PortNames {
        PortNames {
            beatstep: self.beatstep.clone(),
            virtual_output: self.backend.virtual_output(),
        }
    }
}

/// Open the hub, transform messages until the performer asks to leave.
///
/// Only returns on an exit gesture or a fatal device error; the caller maps
/// both to the process exit status.
pub fn run(opts: Options, common: CommonOptions) -> anyhow::Result<Exit> {
    let log_file = common.log_file("miditrick");
    crate::logger::start("miditrick", log_file.as_deref(), common.level(), !opts.no_console)?;

    let mut hub = opts.backend.open_hub()?;
    drive(&mut hub, &opts.port_names(), Duration::from_millis(opts.scale_note_ms))
}

pub fn drive<B: Backend>(
    hub: &mut Hub<B>,
    names: &PortNames,
    scale_note: Duration,
) -> anyhow::Result<Exit> {
    let mut processor = Processor::new(&*hub, names);

    let exit = hub.pump(|hub, message| processor.handle(message, hub))?;

    if exit == Exit::Halt {
        log::info!("playing exit scale");
        play_reference_scale(hub, scale_note)?;
    }

    log::info!("exiting with status {}", exit.code());
    Ok(exit)
}

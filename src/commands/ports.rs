use super::{BackendOptions, CommonOptions};
use crate::hub::{Backend, Hub};
use std::io::Write;

#[derive(Debug, clap::Parser)]
pub struct Options {
    #[command(flatten)]
    backend: BackendOptions,
}

/// List every port the selected backend can see, one per line.
pub fn run(opts: Options, common: CommonOptions) -> anyhow::Result<()> {
    let log_file = common.log_file("ports");
    crate::logger::start("ports", log_file.as_deref(), common.level(), false)?;

    let hub = opts.backend.open_hub()?;
    list(&hub, &mut std::io::stdout())
}

fn list<B: Backend>(hub: &Hub<B>, out: &mut impl Write) -> anyhow::Result<()> {
    if hub.ports().is_empty() {
        writeln!(out, "no midi ports found")?;
        return Ok(());
    }

    for port in hub.ports() {
        writeln!(out, "{:>3}  {:<32} {}", port.index, port.name, port.capability)?;
    }

    out.flush()?;
    Ok(())
}

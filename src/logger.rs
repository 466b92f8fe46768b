use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Once,
    },
};

static INIT: Once = Once::new();
static IS_INITIALIZED: AtomicBool = AtomicBool::new(false);

pub fn is_active() -> bool {
    IS_INITIALIZED.load(Ordering::SeqCst)
}

/// Route `log` records to the console and, optionally, to a file.
pub fn start(
    id: &str,
    file: Option<&Path>,
    level: log::LevelFilter,
    console: bool,
) -> anyhow::Result<()> {
    if is_active() {
        anyhow::bail!("attempted to setup logger more than once");
    }

    let id = format!("{}:{}", id.to_owned(), std::process::id());

    let mut dispatch = fern::Dispatch::new()
        .format(move |out, msg, record| {
            let time = humantime::format_rfc3339_seconds(std::time::SystemTime::now());

            if cfg!(debug_assertions) {
                out.finish(format_args!(
                    "[ {id} ] : [ {time} ] : [ {} {} ] : {msg}",
                    record.target(),
                    record.level(),
                ))
            } else {
                out.finish(format_args!("[ {id} ] : [ {time} ] : {msg}"))
            }
        })
        .level(level);

    if console {
        dispatch = dispatch.chain(std::io::stdout());
    }

    if let Some(file) = file {
        if let Some(dir) = file.parent() {
            std::fs::create_dir_all(dir)?;
        }
        dispatch = dispatch.chain(fern::log_file(file)?);
    }

    dispatch.apply()?;

    log::trace!("started");

    INIT.call_once(|| IS_INITIALIZED.store(true, Ordering::SeqCst));
    Ok(())
}

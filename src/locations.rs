/// Default locations stored in `~/.miditrick`
///
/// .
/// └── log
///    └── miditrick.log
///
use std::path::PathBuf;

pub fn miditrick() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".miditrick"))
}

pub fn log() -> Option<PathBuf> {
    Some(miditrick()?.join("log"))
}

pub fn log_file(name: &str) -> Option<PathBuf> {
    Some(log()?.join(format!("{name}.log")))
}

//! Default values for configuration fields not given explicitly on disk or
//! on the command line.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

const ORGANIZATION: &str = "Lime Contributors";
const APPLICATION: &str = "lime";

pub const CONFIG_FILE: &str = "Lime.toml";

fn project_dirs() -> Result<ProjectDirs, anyhow::Error> {
    ProjectDirs::from("", ORGANIZATION, APPLICATION)
        .ok_or_else(|| anyhow::anyhow!("could not determine user's home directory"))
}

pub fn config_path() -> Result<PathBuf, anyhow::Error> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
}

pub const fn port() -> u16 {
    55321
}

pub const fn buffer_capacity() -> usize {
    8192
}

pub fn connection_timeout() -> Duration {
    Duration::from_secs(60)
}

pub fn handshake_timeout() -> Duration {
    Duration::from_secs(60)
}

pub const fn auto_reply_pings() -> bool {
    true
}

pub const fn fill_envelope_recipients() -> bool {
    true
}

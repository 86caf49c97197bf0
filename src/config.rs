use crate::error::ConfigError;
use crate::reflection::DEFAULT_STORE;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_IMAGE_DIR: &str = "image";
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const MAX_SESSIONS: usize = 256;

/// Runtime settings of the report server.
#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    /// Reflection store, relative to the working directory unless absolute.
    pub store_path: PathBuf,
    /// Directory served under `/image` (page icon and pictures).
    pub image_dir: PathBuf,
    pub chart_width: u32,
    pub chart_height: u32,
    pub max_upload_bytes: usize,
    /// Uploaded tables kept in memory; the least recently used is dropped first.
    pub max_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store_path: PathBuf::from(DEFAULT_STORE),
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            chart_width: 800,
            chart_height: 600,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            max_sessions: MAX_SESSIONS,
        }
    }
}

impl Config {
    /// Build a config from positional arguments: `[ADDR] [STORE_PATH]`.
    ///
    /// Missing arguments keep their defaults (`127.0.0.1:3000` and
    /// `student_thoughts.csv`).
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        if let Some(addr) = args.next() {
            config.addr = addr.parse().map_err(|source| ConfigError::Address {
                value: addr.clone(),
                source,
            })?;
        }
        if let Some(store) = args.next() {
            config.store_path = PathBuf::from(store);
        }
        if let Some(extra) = args.next() {
            return Err(ConfigError::UnexpectedArgument(extra));
        }

        Ok(config)
    }
}

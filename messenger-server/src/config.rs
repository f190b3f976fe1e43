use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Result};
use tracing::info;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Reads the environment. A first command line argument overrides the port.
    pub fn load() -> Result<Self> {
        let mut port: u16 = try_load("MESSENGER_PORT", "8000")?;
        if let Some(p) = env::args().nth(1) {
            port = p.parse().map_err(|e| anyhow!("Invalid port argument {p}: {e}"))?;
        }
        let default_db = format!("messenger-{port}.sled");
        Ok(Self {
            bind: try_load("MESSENGER_BIND", "127.0.0.1")?,
            port,
            db_path: try_load("MESSENGER_DB", &default_db)?,
            bcrypt_cost: try_load("MESSENGER_BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e| anyhow!("Invalid {key} value {raw}: {e}"))
}

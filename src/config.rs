use crate::error::{Error, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    /// Percentage of the possible points at which a manually graded answer counts as correct.
    pub manual_correct_threshold: Decimal,
    pub abandon_sweep_interval_secs: u64,
    pub log_json: bool,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let manual_correct_threshold: Decimal =
            get_env_parse_or("MANUAL_CORRECT_THRESHOLD", Decimal::from(50))?;
        if manual_correct_threshold < Decimal::ZERO
            || manual_correct_threshold > Decimal::ONE_HUNDRED
        {
            return Err(Error::Config(
                "MANUAL_CORRECT_THRESHOLD must be between 0 and 100".to_string(),
            ));
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            database_max_connections: get_env_parse_or("DATABASE_MAX_CONNECTIONS", 50)?,
            jwt_secret: get_env("JWT_SECRET")?,
            manual_correct_threshold,
            abandon_sweep_interval_secs: get_env_parse_or("ABANDON_SWEEP_INTERVAL_SECS", 60)?,
            log_json: get_env_parse_or("LOG_JSON", false)?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

/// A group of environment variables loaded together at startup.
pub trait EnvVars: Sized {
    fn load() -> Result<Self>;
    fn get_env_var(&self, key: &str) -> Option<String>;
}

/// Loads `.env` from the working directory if one exists. Missing files are fine.
pub fn load_dotenv() {
    let _ = dotenv::dotenv();
}

pub fn required_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("{} environment variable not set", key))
}

pub fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// `true`, `1` and `yes` (any case) are truthy; everything else, including unset, is false.
pub fn flag_var(key: &str) -> bool {
    optional_var(key)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

pub fn parsed_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

mod env;

pub use env::{flag_var, load_dotenv, optional_var, parse_flag, parsed_var, required_var, EnvVars};

pub fn get_current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

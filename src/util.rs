use std::path::PathBuf;

const CF_HOME: &str = "CF_HOME";

/// Base directory of the cf CLI configuration.
///
/// `CF_HOME` wins over the user's home directory.
pub fn cf_home() -> Option<PathBuf> {
    let home_from_env = std::env::var(CF_HOME).ok().filter(|h| !h.is_empty());
    home_from_env.map(PathBuf::from).or_else(dirs::home_dir)
}

/// Saturating conversion used for byte counters coming off the wire
pub fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

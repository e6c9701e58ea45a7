use std::path::PathBuf;

pub fn env_path(key: &str, default_val: &str) -> PathBuf {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default_val))
}

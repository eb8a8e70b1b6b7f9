use std::{
    fs,
    future::Future,
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tonic::transport::server::Router;
use tracing::info;

pub const DEFAULT_WORKER_ADDR: &str = "127.0.0.1:50061";
pub const WORKER_ADDR_ENV: &str = "BDW_WORKER_ADDR";
pub const TOKEN_ENV: &str = "BDW_TOKEN";
/// Status metadata key carrying the origin type of a transported failure.
pub const ORIGIN_METADATA_KEY: &str = "bdw-origin";

pub fn env_addr(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn worker_addr() -> String {
    env_addr(WORKER_ADDR_ENV, DEFAULT_WORKER_ADDR)
}

/// Reads a boolean switch from the environment; `1`, `true`, `yes` and `on`
/// count as set.
pub fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

pub fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/bdw")
    } else {
        PathBuf::from("/tmp/bdw")
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn state_file_path(file_name: &str) -> PathBuf {
    state_dir().join(file_name)
}

pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Splits a command line on `separator`, keeping quoted runs together and
/// dropping the quotes themselves.
pub fn split_honor_quotes(line: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in line.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == separator => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();
    Ok(())
}

/// Serves the router until `shutdown` resolves.
pub async fn serve_grpc_until<F>(
    app_name: &str,
    addr: &str,
    router: Router,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send,
{
    let addr: SocketAddr = addr.parse()?;
    info!("{app_name} listening on {addr}");
    router.serve_with_shutdown(addr, shutdown).await?;
    info!("{app_name} stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn split_keeps_quoted_runs() {
        let parts = split_honor_quotes(r#"-U "-Dname=a b" -o  'x y'"#, ' ');
        assert_eq!(parts, vec!["-U", "-Dname=a b", "-o", "x y"]);
    }

    #[test]
    fn split_of_blank_line_is_empty() {
        assert!(split_honor_quotes("   ", ' ').is_empty());
    }

    #[test]
    fn json_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        write_json_atomic(&path, &vec!["a"]).unwrap();
        write_json_atomic(&path, &vec!["b", "c"]).unwrap();
        let data = fs::read_to_string(&path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&data).unwrap();
        assert_eq!(parsed, vec!["b".to_string(), "c".to_string()]);
        assert!(!path.with_extension("json.tmp").exists());
    }
}

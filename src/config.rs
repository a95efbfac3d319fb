use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8350";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 86_400;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub session_ttl_seconds: i64,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.parse().expect("valid default bind address"),
            data_dir: PathBuf::from("daybook-data"),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            admin_username: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("DAYBOOK_ADDR")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.bind_addr);
        let data_dir = std::env::var("DAYBOOK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let session_ttl_seconds = std::env::var("DAYBOOK_SESSION_TTL_SECONDS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .filter(|ttl| *ttl > 0)
            .unwrap_or(defaults.session_ttl_seconds);
        let admin_username = std::env::var("DAYBOOK_ADMIN_USERNAME")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let admin_password = std::env::var("DAYBOOK_ADMIN_PASSWORD")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Self {
            bind_addr,
            data_dir,
            session_ttl_seconds,
            admin_username,
            admin_password,
        }
    }
}

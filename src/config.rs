//! Server configuration.
//!
//! Loaded from a JSON file whose path is the program's single CLI
//! argument. Every key has a default except `template_root` and
//! `static_root`, which the file must provide.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// Framework name, used for the `Server` and `User-Agent` headers.
pub const NAME: &str = "coserv";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_NUM_DB_CONN: usize = 10;
/// Request body cap.
pub const PAYLOAD_LIMIT: usize = 8 * 1024 * 1024;
/// Idle-read timeout per request, in seconds.
pub const EXPIRY_TIME_SECS: u64 = 30;
pub const LOG_ROTATION_SIZE: u64 = 8 * 1024 * 1024;
/// Default per-coroutine stack; platforms with small default stacks need
/// this much for nested handler calls.
pub const STACK_SIZE: usize = 1024 * 1024;
/// Lower bound enforced at server construction.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

fn default_name() -> String {
    NAME.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_thread_num() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_conn_num() -> usize {
    DEFAULT_NUM_DB_CONN
}

fn default_rotation_size() -> u64 {
    LOG_ROTATION_SIZE
}

fn default_stack_size() -> usize {
    STACK_SIZE
}

fn default_payload_limit() -> usize {
    PAYLOAD_LIMIT
}

fn default_read_timeout_secs() -> u64 {
    EXPIRY_TIME_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Scheduler threads.
    #[serde(rename = "thread-num", default = "default_thread_num")]
    pub thread_num: usize,
    /// Database pool size.
    #[serde(rename = "conn-num", default = "default_conn_num")]
    pub conn_num: usize,
    /// libpq-style connection string; empty disables the pool.
    #[serde(rename = "conn-str", default)]
    pub conn_str: String,
    /// Log directory; empty logs to stdout only.
    #[serde(rename = "log-dir", default)]
    pub log_dir: String,
    pub template_root: String,
    pub static_root: String,
    #[serde(rename = "rotation-size", default = "default_rotation_size")]
    pub rotation_size: u64,
    #[serde(rename = "stack-size", default = "default_stack_size")]
    pub stack_size: usize,
    #[serde(rename = "payload-limit", default = "default_payload_limit")]
    pub payload_limit: usize,
    #[serde(rename = "read-timeout-secs", default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: default_name(),
            port: default_port(),
            thread_num: default_thread_num(),
            conn_num: default_conn_num(),
            conn_str: String::new(),
            log_dir: String::new(),
            template_root: String::new(),
            static_root: String::new(),
            rotation_size: default_rotation_size(),
            stack_size: default_stack_size(),
            payload_limit: default_payload_limit(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"template_root": "templates", "static_root": "statics"}"#,
        )
        .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.conn_num, DEFAULT_NUM_DB_CONN);
        assert_eq!(config.name, NAME);
        assert!(config.conn_str.is_empty());
        assert_eq!(config.payload_limit, PAYLOAD_LIMIT);
    }

    #[test]
    fn kebab_keys() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "port": 9090,
                "thread-num": 2,
                "conn-num": 3,
                "conn-str": "dbname=app",
                "log-dir": "./log",
                "template_root": "t",
                "static_root": "s"
            }"#,
        )
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.thread_num, 2);
        assert_eq!(config.conn_num, 3);
        assert_eq!(config.conn_str, "dbname=app");
        assert_eq!(config.log_dir, "./log");
    }

    #[test]
    fn missing_roots_are_an_error() {
        assert!(serde_json::from_str::<ServerConfig>(r#"{"port": 1}"#).is_err());
    }
}

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use bdw_core::{ConsoleLevel, SessionSettings};
use bdw_util::{
    data_dir, env_flag, env_u64, expand_user, split_honor_quotes, state_file_path,
    DEFAULT_WORKER_ADDR, WORKER_ADDR_ENV,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

const WORKER_CONFIG_FILE: &str = "worker-config.json";
const POLL_INTERVAL_ENV: &str = "BDW_POLL_INTERVAL_MS";
const LOG_THRESHOLD_ENV: &str = "BDW_LOG_THRESHOLD";
const LOCAL_REPOSITORY_ENV: &str = "BDW_LOCAL_REPOSITORY";
const OFFLINE_ENV: &str = "BDW_OFFLINE";
const ENGINE_CLI_ARGS_ENV: &str = "BDW_ENGINE_CLI_ARGS";
const HOST_PID_ENV: &str = "BDW_HOST_PID";

const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct WorkerConfig {
    pub(crate) addr: String,
    pub(crate) poll_interval_ms: u64,
    pub(crate) log_threshold: String,
    pub(crate) local_repository: String,
    pub(crate) offline: bool,
    pub(crate) engine_cli_args: String,
    pub(crate) host_pid: Option<i32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            addr: std::env::var(WORKER_ADDR_ENV).unwrap_or_else(|_| DEFAULT_WORKER_ADDR.into()),
            poll_interval_ms: env_u64(POLL_INTERVAL_ENV).unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            log_threshold: std::env::var(LOG_THRESHOLD_ENV).unwrap_or_else(|_| "info".into()),
            local_repository: std::env::var(LOCAL_REPOSITORY_ENV).unwrap_or_default(),
            offline: env_flag(OFFLINE_ENV),
            engine_cli_args: std::env::var(ENGINE_CLI_ARGS_ENV).unwrap_or_default(),
            host_pid: std::env::var(HOST_PID_ENV)
                .ok()
                .and_then(|pid| pid.trim().parse().ok()),
        }
    }
}

impl WorkerConfig {
    /// Environment first; `worker-config.json` in the state dir fills what
    /// the environment leaves unset.
    pub(crate) fn load() -> Self {
        Self::load_from(&state_file_path(WORKER_CONFIG_FILE), |key| {
            std::env::var(key).is_ok()
        })
    }

    pub(crate) fn load_from(path: &Path, env_is_set: impl Fn(&str) -> bool) -> Self {
        let mut cfg = WorkerConfig::default();
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<WorkerConfig>(&data) {
                Ok(file_cfg) => cfg.fill_from(file_cfg, env_is_set),
                Err(err) => warn!("failed to parse {}: {err}", path.display()),
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("failed to read {}: {err}", path.display());
                }
            }
        }
        cfg
    }

    fn fill_from(&mut self, file_cfg: WorkerConfig, env_is_set: impl Fn(&str) -> bool) {
        if !env_is_set(WORKER_ADDR_ENV) && !file_cfg.addr.is_empty() {
            self.addr = file_cfg.addr;
        }
        if !env_is_set(POLL_INTERVAL_ENV) && file_cfg.poll_interval_ms > 0 {
            self.poll_interval_ms = file_cfg.poll_interval_ms;
        }
        if !env_is_set(LOG_THRESHOLD_ENV) && !file_cfg.log_threshold.is_empty() {
            self.log_threshold = file_cfg.log_threshold;
        }
        if !env_is_set(LOCAL_REPOSITORY_ENV) && !file_cfg.local_repository.is_empty() {
            self.local_repository = file_cfg.local_repository;
        }
        if !env_is_set(OFFLINE_ENV) {
            self.offline = file_cfg.offline;
        }
        if !env_is_set(ENGINE_CLI_ARGS_ENV) && !file_cfg.engine_cli_args.is_empty() {
            self.engine_cli_args = file_cfg.engine_cli_args;
        }
        if !env_is_set(HOST_PID_ENV) && file_cfg.host_pid.is_some() {
            self.host_pid = file_cfg.host_pid;
        }
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub(crate) fn log_threshold(&self) -> ConsoleLevel {
        ConsoleLevel::parse(&self.log_threshold).unwrap_or(ConsoleLevel::Info)
    }

    pub(crate) fn local_repository(&self) -> PathBuf {
        if self.local_repository.trim().is_empty() {
            data_dir().join("repository")
        } else {
            expand_user(self.local_repository.trim())
        }
    }

    /// Settings used for a session whose request leaves a field empty.
    pub(crate) fn session_defaults(&self) -> SessionSettings {
        SessionSettings {
            offline: self.offline,
            logging_threshold: self.log_threshold(),
            local_repository_path: Some(self.local_repository()),
            extra_cli_args: split_honor_quotes(&self.engine_cli_args, ' '),
            ..SessionSettings::default()
        }
    }
}

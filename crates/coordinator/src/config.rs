//! Node configuration.
//!
//! Every knob has a default; `NodeConfig::from_env` overrides them from
//! `HASHWORK_*` environment variables and `DATA_DIR`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use hashwork_core::wire::MAX_PAYLOAD_SIZE;

use crate::result::{DEFAULT_RELEASE_DELAY, DEFAULT_RESULTS_CAPACITY};
use crate::submit::DEFAULT_SUBMITS_CAPACITY;

pub const DEFAULT_MAX_DIFFICULTY: u8 = 23;
pub const DEFAULT_MAX_JOBS: usize = 3;
pub const DEFAULT_MAX_TIME_PER_JOB: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_PAYLOAD_SIZE: u16 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },

    #[error("{0}")]
    Inconsistent(String),
}

/// Limits and ledger sizing for one node.
#[derive(Debug, Clone)]
pub struct ServiceParams {
    /// Highest difficulty accepted; 0 makes the node a pure submitter.
    pub max_difficulty: u8,
    /// Maximum number of hashing jobs running at once.
    pub max_jobs: usize,
    pub max_time_per_job: Duration,
    /// Largest request payload accepted, between 1 and `MAX_PAYLOAD_SIZE`.
    pub max_payload_size: u16,
    pub submits_capacity: usize,
    pub results_capacity: usize,
    /// How long a computed result waits for acknowledgment.
    pub release_delay: Duration,
    pub auto_submit: Option<AutoSubmit>,
}

impl Default for ServiceParams {
    fn default() -> Self {
        Self {
            max_difficulty: DEFAULT_MAX_DIFFICULTY,
            max_jobs: DEFAULT_MAX_JOBS,
            max_time_per_job: DEFAULT_MAX_TIME_PER_JOB,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            submits_capacity: DEFAULT_SUBMITS_CAPACITY,
            results_capacity: DEFAULT_RESULTS_CAPACITY,
            release_delay: DEFAULT_RELEASE_DELAY,
            auto_submit: None,
        }
    }
}

/// Periodic submission of random jobs by nodes that don't hash.
#[derive(Debug, Clone)]
pub struct AutoSubmit {
    pub interval: Duration,
    pub data_size: usize,
    pub min_difficulty: u8,
    pub max_difficulty: u8,
}

impl Default for AutoSubmit {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            data_size: 32,
            min_difficulty: 8,
            max_difficulty: 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub api_addr: SocketAddr,
    pub p2p_addr: SocketAddr,
    pub bootnodes: Vec<SocketAddr>,
    pub data_dir: PathBuf,
    pub service: ServiceParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8545)),
            p2p_addr: SocketAddr::from(([0, 0, 0, 0], 30499)),
            bootnodes: Vec::new(),
            data_dir: PathBuf::from("."),
            service: ServiceParams::default(),
        }
    }
}

impl NodeConfig {
    /// Build the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `HASHWORK_API_ADDR`, `HASHWORK_P2P_ADDR`: listen addresses
    /// - `HASHWORK_BOOTNODES`: comma separated peer addresses to dial
    /// - `DATA_DIR`: where result files are written (default: `.`)
    /// - `HASHWORK_MAX_DIFFICULTY`, `HASHWORK_MAX_JOBS`,
    ///   `HASHWORK_MAX_TIME_MS`, `HASHWORK_MAX_PAYLOAD`: worker limits
    /// - `HASHWORK_SUBMITS_CAPACITY`, `HASHWORK_RESULTS_CAPACITY`,
    ///   `HASHWORK_RELEASE_DELAY_MS`: ledger sizing
    /// - `HASHWORK_SUBMIT_INTERVAL_MS` (presence enables auto-submit),
    ///   `HASHWORK_SUBMIT_DATA_SIZE`, `HASHWORK_SUBMIT_MIN_DIFFICULTY`,
    ///   `HASHWORK_SUBMIT_MAX_DIFFICULTY`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = NodeConfig::default();

        if let Some(addr) = parse_var("HASHWORK_API_ADDR")? {
            config.api_addr = addr;
        }
        if let Some(addr) = parse_var("HASHWORK_P2P_ADDR")? {
            config.p2p_addr = addr;
        }
        if let Ok(list) = std::env::var("HASHWORK_BOOTNODES") {
            config.bootnodes = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse().map_err(|_| ConfigError::Invalid {
                        var: "HASHWORK_BOOTNODES",
                        value: s.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Ok(dir) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        let service = &mut config.service;
        if let Some(v) = parse_var("HASHWORK_MAX_DIFFICULTY")? {
            service.max_difficulty = v;
        }
        if let Some(v) = parse_var("HASHWORK_MAX_JOBS")? {
            service.max_jobs = v;
        }
        if let Some(ms) = parse_var("HASHWORK_MAX_TIME_MS")? {
            service.max_time_per_job = Duration::from_millis(ms);
        }
        if let Some(v) = parse_var("HASHWORK_MAX_PAYLOAD")? {
            service.max_payload_size = v;
        }
        if let Some(v) = parse_var("HASHWORK_SUBMITS_CAPACITY")? {
            service.submits_capacity = v;
        }
        if let Some(v) = parse_var("HASHWORK_RESULTS_CAPACITY")? {
            service.results_capacity = v;
        }
        if let Some(ms) = parse_var("HASHWORK_RELEASE_DELAY_MS")? {
            service.release_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>("HASHWORK_SUBMIT_INTERVAL_MS")? {
            let mut auto = AutoSubmit {
                interval: Duration::from_millis(ms),
                ..AutoSubmit::default()
            };
            if let Some(v) = parse_var("HASHWORK_SUBMIT_DATA_SIZE")? {
                auto.data_size = v;
            }
            if let Some(v) = parse_var("HASHWORK_SUBMIT_MIN_DIFFICULTY")? {
                auto.min_difficulty = v;
            }
            if let Some(v) = parse_var("HASHWORK_SUBMIT_MAX_DIFFICULTY")? {
                auto.max_difficulty = v;
            }
            service.auto_submit = Some(auto);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let service = &self.service;
        if service.submits_capacity == 0 || service.results_capacity == 0 {
            return Err(ConfigError::Inconsistent(
                "ledger capacities must be positive".to_string(),
            ));
        }
        if service.max_payload_size == 0 || service.max_payload_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::Inconsistent(format!(
                "max payload size must be between 1 and {MAX_PAYLOAD_SIZE}"
            )));
        }
        if service.release_delay.is_zero() {
            return Err(ConfigError::Inconsistent(
                "release delay must be positive".to_string(),
            ));
        }
        if let Some(auto) = &service.auto_submit {
            if auto.min_difficulty > auto.max_difficulty {
                return Err(ConfigError::Inconsistent(format!(
                    "submit difficulty range {}..={} is empty",
                    auto.min_difficulty, auto.max_difficulty
                )));
            }
            if auto.interval.is_zero() {
                return Err(ConfigError::Inconsistent(
                    "submit interval must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(None),
    }
}

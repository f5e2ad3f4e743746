#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub scheduler_interval_secs: u64,
    pub retry_config_path: Option<String>,
    pub simulator_seed: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            scheduler_interval_secs: std::env::var("SCHEDULER_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(30),
            retry_config_path: std::env::var("RETRY_CONFIG_PATH").ok().filter(|s| !s.is_empty()),
            simulator_seed: std::env::var("SIMULATOR_SEED")
                .ok()
                .and_then(|s| s.parse::<u64>().ok()),
        }
    }
}

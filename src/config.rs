use anyhow::{bail, Result};

/// Runtime configuration, assembled from CLI flags. The exporter keeps no
/// state across restarts, so the flags are the whole config surface.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// TCP port for the metrics endpoint
    pub port: u16,
    /// Seconds between scrapes
    pub interval_secs: u64,
    /// One of DEBUG, INFO, WARNING, ERROR
    pub log_level: String,
    /// Helm binary to invoke
    pub helm_bin: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            interval_secs: 60,
            log_level: "INFO".to_string(),
            helm_bin: "helm".to_string(),
        }
    }
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("scrape interval must be at least 1 second");
        }
        if self.helm_bin.trim().is_empty() {
            bail!("helm binary must not be empty");
        }
        Ok(())
    }

    /// Default tracing filter directive for the configured level.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.to_ascii_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARNING" => "warn",
            "ERROR" => "error",
            _ => "info",
        }
    }
}

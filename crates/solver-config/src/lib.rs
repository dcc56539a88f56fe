//! Configuration loading for the solver.
//!
//! Reads a TOML file, substitutes `${VAR}` placeholders from the environment,
//! applies `SOLVER_*` overrides and validates the result.

use alloy::primitives::Address;
use regex::Regex;
use std::env;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "SOLVER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}

		let content = tokio::fs::read_to_string(file_path).await?;
		let mut config = self.parse(&content)?;

		self.apply_env_overrides(&mut config);
		validate_config(&config)?;

		Ok(config)
	}

	/// Parses configuration text after placeholder substitution.
	pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted = substitute_env_vars(content)?;
		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn apply_env_overrides(&self, config: &mut Config) {
		if let Ok(rpc_url) = env::var(format!("{}LEDGER_RPC_URL", self.env_prefix)) {
			config.ledger.rpc_url = rpc_url;
		}

		if let Ok(api_key) = env::var(format!("{}CUSTODY_API_KEY", self.env_prefix)) {
			config.custody.api_key = api_key;
		}
	}
}

fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let mut result = content.to_string();

	// ${VAR_NAME}
	let re = Regex::new(r"\$\{([^}]+)\}")
		.map_err(|e| ConfigError::ParseError(format!("Invalid placeholder pattern: {}", e)))?;

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

/// Checks values that deserialization alone cannot.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	let key = config.solver.private_key.trim();
	let key = key.strip_prefix("0x").unwrap_or(key);
	if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
		return Err(ConfigError::ValidationError(
			"solver.private_key must be 64 hex characters (32 bytes)".to_string(),
		));
	}

	Address::from_str(&config.ledger.contract_address).map_err(|e| {
		ConfigError::ValidationError(format!("ledger.contract_address is invalid: {}", e))
	})?;

	for (field, url) in [
		("ledger.rpc_url", &config.ledger.rpc_url),
		("custody.base_url", &config.custody.base_url),
	] {
		if !url.starts_with("http://") && !url.starts_with("https://") {
			return Err(ConfigError::ValidationError(format!(
				"{} must start with http:// or https://",
				field
			)));
		}
	}

	if config.discovery.poll_interval_secs == 0 {
		return Err(ConfigError::ValidationError(
			"discovery.poll_interval_secs must be greater than zero".to_string(),
		));
	}

	if config.settlement.poll_interval_secs == 0 {
		return Err(ConfigError::ValidationError(
			"settlement.poll_interval_secs must be greater than zero".to_string(),
		));
	}

	if config.settlement.max_poll_attempts == 0 {
		return Err(ConfigError::ValidationError(
			"settlement.max_poll_attempts must be greater than zero".to_string(),
		));
	}

	if let solver_types::BidPolicy::Discount { bps } = config.auction.bid_policy {
		if bps >= 10_000 {
			return Err(ConfigError::ValidationError(
				"auction.bid_policy.bps must be below 10000".to_string(),
			));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use solver_types::{BidPolicy, ConfirmationPolicy};
	use std::io::Write;

	const BASE_CONFIG: &str = r#"
[solver]
name = "test-solver"
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[ledger]
rpc_url = "http://localhost:8545"
contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[custody]
base_url = "https://custody.example.com"
api_key = "key"
workspace_id = "ws-1"
account_id = "acct-1"

[networks.ethereum]
custody_network = "ETH"
deposit_address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
"#;

	#[test]
	fn test_defaults_applied() {
		let config = ConfigLoader::new().parse(BASE_CONFIG).unwrap();
		validate_config(&config).unwrap();

		assert_eq!(config.solver.shutdown_grace_secs, 30);
		assert_eq!(config.ledger.gas_limit, 500_000);
		assert_eq!(config.discovery.poll_interval_secs, 3);
		assert_eq!(config.settlement.poll_interval_secs, 2);
		assert_eq!(config.settlement.max_poll_attempts, 60);
		assert_eq!(
			config.settlement.confirmation_policy,
			ConfirmationPolicy::RequireCompleted
		);
		assert_eq!(config.auction.bid_policy, BidPolicy::MaxPrice);
		assert_eq!(
			config.networks["ethereum"].custody_network.as_deref(),
			Some("ETH")
		);
	}

	#[test]
	fn test_policy_sections() {
		let content = format!(
			"{}\n[auction]\nbid_policy = {{ type = \"discount\", bps = 25 }}\n\n[settlement]\nconfirmation_policy = \"transaction_id_only\"\n",
			BASE_CONFIG
		);
		let config = ConfigLoader::new().parse(&content).unwrap();

		assert_eq!(config.auction.bid_policy, BidPolicy::Discount { bps: 25 });
		assert_eq!(
			config.settlement.confirmation_policy,
			ConfirmationPolicy::TransactionIdOnly
		);
	}

	#[test]
	fn test_env_substitution() {
		env::set_var("SOLVER_TEST_WORKSPACE_ID", "ws-from-env");
		let content = BASE_CONFIG.replace("\"ws-1\"", "\"${SOLVER_TEST_WORKSPACE_ID}\"");
		let config = ConfigLoader::new().parse(&content).unwrap();
		assert_eq!(config.custody.workspace_id, "ws-from-env");
	}

	#[test]
	fn test_missing_env_var() {
		let content = BASE_CONFIG.replace("\"ws-1\"", "\"${SOLVER_TEST_DEFINITELY_UNSET}\"");
		let err = ConfigLoader::new().parse(&content).unwrap_err();
		assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "SOLVER_TEST_DEFINITELY_UNSET"));
	}

	#[test]
	fn test_rejects_invalid_private_key() {
		let content = BASE_CONFIG.replace(
			"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
			"0x1234",
		);
		let config = ConfigLoader::new().parse(&content).unwrap();
		assert!(matches!(
			validate_config(&config),
			Err(ConfigError::ValidationError(_))
		));
	}

	#[test]
	fn test_rejects_zero_poll_attempts() {
		let content = format!("{}\n[settlement]\nmax_poll_attempts = 0\n", BASE_CONFIG);
		let config = ConfigLoader::new().parse(&content).unwrap();
		assert!(validate_config(&config).is_err());
	}

	#[tokio::test]
	async fn test_load_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(BASE_CONFIG.as_bytes()).unwrap();

		let config = ConfigLoader::new()
			.with_env_prefix("SOLVER_LOAD_TEST_")
			.with_file(file.path())
			.load()
			.await
			.unwrap();
		assert_eq!(config.solver.name, "test-solver");
		assert_eq!(config.custody.account_id, "acct-1");
	}

	#[tokio::test]
	async fn test_missing_file() {
		let err = ConfigLoader::new()
			.with_file("/nonexistent/solver.toml")
			.load()
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::FileNotFound(_)));
	}
}

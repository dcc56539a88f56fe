//! Token/asset resolution.
//!
//! Maps an order leg's `(network, token address)` to the payment API's asset
//! id and decimal precision. Both are immutable, so results are cached for
//! the process lifetime.

use crate::{CustodyError, CustodyInterface, NetworkDirectory};
use dashmap::DashMap;
use solver_types::{is_native_token, ResolvedAsset};
use std::sync::Arc;
use tracing::debug;

pub struct AssetResolver {
	custody: Arc<dyn CustodyInterface>,
	networks: Arc<NetworkDirectory>,
	cache: DashMap<(String, String), ResolvedAsset>,
}

impl AssetResolver {
	pub fn new(custody: Arc<dyn CustodyInterface>, networks: Arc<NetworkDirectory>) -> Self {
		Self {
			custody,
			networks,
			cache: DashMap::new(),
		}
	}

	/// Resolves a token on an order-ledger network.
	///
	/// Fails with [`CustodyError::AssetNotFound`] or
	/// [`CustodyError::AmbiguousAsset`] when the payment API has no unique
	/// match; neither is worth retrying.
	pub async fn resolve(
		&self,
		token_address: &str,
		network_id: &str,
	) -> Result<ResolvedAsset, CustodyError> {
		let key = (network_id.to_string(), token_address.trim().to_lowercase());
		if let Some(hit) = self.cache.get(&key) {
			return Ok(hit.clone());
		}

		let custody_network = self.networks.custody_network(network_id);
		let resolved = if is_native_token(token_address) {
			self.resolve_native(custody_network, token_address).await?
		} else {
			self.resolve_contract(custody_network, token_address).await?
		};

		debug!(
			network = %network_id,
			token = %token_address,
			asset_id = %resolved.asset_id,
			decimals = resolved.decimals,
			"Resolved asset"
		);
		self.cache.insert(key, resolved.clone());
		Ok(resolved)
	}

	async fn resolve_native(
		&self,
		custody_network: &str,
		token_address: &str,
	) -> Result<ResolvedAsset, CustodyError> {
		let not_found = || CustodyError::AssetNotFound {
			network: custody_network.to_string(),
			token: token_address.to_string(),
		};

		let asset_id = match self.custody.native_asset_id(custody_network).await {
			Ok(id) => id,
			Err(CustodyError::NotFound(_)) => return Err(not_found()),
			Err(e) => return Err(e),
		};
		let asset = match self.custody.asset(&asset_id).await {
			Ok(asset) => asset,
			Err(CustodyError::NotFound(_)) => return Err(not_found()),
			Err(e) => return Err(e),
		};

		Ok(ResolvedAsset {
			asset_id: asset.id,
			decimals: asset.decimals,
		})
	}

	async fn resolve_contract(
		&self,
		custody_network: &str,
		token_address: &str,
	) -> Result<ResolvedAsset, CustodyError> {
		let mut matches: Vec<_> = self
			.custody
			.find_assets(custody_network, token_address)
			.await?
			.into_iter()
			.filter(|asset| {
				asset
					.contract_address
					.as_deref()
					.is_some_and(|addr| addr.eq_ignore_ascii_case(token_address))
			})
			.collect();

		match matches.len() {
			0 => Err(CustodyError::AssetNotFound {
				network: custody_network.to_string(),
				token: token_address.to_string(),
			}),
			1 => {
				let asset = matches.remove(0);
				Ok(ResolvedAsset {
					asset_id: asset.id,
					decimals: asset.decimals,
				})
			}
			count => Err(CustodyError::AmbiguousAsset {
				network: custody_network.to_string(),
				token: token_address.to_string(),
				count,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::InMemoryCustody;
	use solver_types::Asset;
	use std::collections::HashMap;

	const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

	fn asset(id: &str, network: &str, contract: Option<&str>, decimals: u8) -> Asset {
		Asset {
			id: id.into(),
			network_id: network.into(),
			contract_address: contract.map(Into::into),
			decimals,
			symbol: None,
		}
	}

	fn resolver(custody: Arc<InMemoryCustody>) -> AssetResolver {
		let networks = Arc::new(NetworkDirectory::new(
			HashMap::new(),
			custody.clone(),
			"acct-1",
		));
		AssetResolver::new(custody, networks)
	}

	#[tokio::test]
	async fn test_resolves_native_asset() {
		let custody = Arc::new(InMemoryCustody::new());
		custody.add_native_asset(asset("ETH", "ethereum", None, 18));
		let resolver = resolver(custody);

		for token in ["", "native", "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"] {
			let resolved = resolver.resolve(token, "ethereum").await.unwrap();
			assert_eq!(resolved.asset_id, "ETH");
			assert_eq!(resolved.decimals, 18);
		}
	}

	#[tokio::test]
	async fn test_resolves_contract_case_insensitively_and_caches() {
		let custody = Arc::new(InMemoryCustody::new());
		custody.add_asset(asset("USDC_ETH", "ethereum", Some(USDC), 6));
		let resolver = resolver(custody.clone());

		let first = resolver.resolve(&USDC.to_lowercase(), "ethereum").await.unwrap();
		let second = resolver.resolve(USDC, "ethereum").await.unwrap();

		assert_eq!(first.asset_id, "USDC_ETH");
		assert_eq!(first, second);
		assert_eq!(custody.asset_lookups(), 1);
	}

	#[tokio::test]
	async fn test_unknown_asset() {
		let resolver = resolver(Arc::new(InMemoryCustody::new()));

		let err = resolver.resolve(USDC, "ethereum").await.unwrap_err();
		assert!(matches!(err, CustodyError::AssetNotFound { .. }));

		let err = resolver.resolve("native", "ethereum").await.unwrap_err();
		assert!(matches!(err, CustodyError::AssetNotFound { .. }));
	}

	#[tokio::test]
	async fn test_ambiguous_asset() {
		let custody = Arc::new(InMemoryCustody::new());
		custody.add_asset(asset("USDC_A", "ethereum", Some(USDC), 6));
		custody.add_asset(asset("USDC_B", "ethereum", Some(USDC), 6));
		let resolver = resolver(custody);

		let err = resolver.resolve(USDC, "ethereum").await.unwrap_err();
		assert!(matches!(err, CustodyError::AmbiguousAsset { count: 2, .. }));
	}
}

//! HTTP client for the custodial payment API.
//!
//! All routes live under `/v1/workspaces/{workspace}` and authenticate with a
//! bearer token. List endpoints wrap their items in a `data` array.

use crate::{CustodyError, CustodyInterface};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use solver_types::{truncate_id, Asset, WithdrawalJob, WithdrawalRequest};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
	data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NativeAssetResponse {
	asset_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositAddress {
	address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransactionBody<'a> {
	#[serde(rename = "type")]
	kind: &'static str,
	#[serde(flatten)]
	request: &'a WithdrawalRequest,
}

/// Payment API client over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpCustodyClient {
	client: Client,
	base_url: String,
	workspace_id: String,
	api_key: String,
}

impl HttpCustodyClient {
	pub fn new(
		base_url: &str,
		api_key: &str,
		workspace_id: &str,
		timeout: Duration,
	) -> Result<Self, CustodyError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| CustodyError::Network(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
			workspace_id: workspace_id.to_string(),
			api_key: api_key.to_string(),
		})
	}

	fn url(&self, path: &str) -> String {
		format!(
			"{}/v1/workspaces/{}/{}",
			self.base_url, self.workspace_id, path
		)
	}

	fn request(&self, method: Method, path: &str) -> RequestBuilder {
		self.client
			.request(method, self.url(path))
			.bearer_auth(&self.api_key)
	}

	async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CustodyError> {
		let response = request
			.send()
			.await
			.map_err(|e| CustodyError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(map_status_error(status, body));
		}

		response
			.json::<T>()
			.await
			.map_err(|e| CustodyError::Decode(e.to_string()))
	}
}

fn map_status_error(status: StatusCode, body: String) -> CustodyError {
	match status {
		StatusCode::CONFLICT => CustodyError::AlreadyExists(body),
		StatusCode::NOT_FOUND => CustodyError::NotFound(body),
		_ => CustodyError::Http {
			status: status.as_u16(),
			body,
		},
	}
}

#[async_trait]
impl CustodyInterface for HttpCustodyClient {
	async fn native_asset_id(&self, network_id: &str) -> Result<String, CustodyError> {
		let path = format!("networks/{}/native-asset", network_id);
		let response: NativeAssetResponse = self.send(self.request(Method::GET, &path)).await?;
		Ok(response.asset_id)
	}

	async fn asset(&self, asset_id: &str) -> Result<Asset, CustodyError> {
		let path = format!("assets/{}", asset_id);
		self.send(self.request(Method::GET, &path)).await
	}

	async fn find_assets(
		&self,
		network_id: &str,
		contract_address: &str,
	) -> Result<Vec<Asset>, CustodyError> {
		let request = self
			.request(Method::GET, "assets")
			.query(&[("networkId", network_id), ("contractAddress", contract_address)]);
		let response: ListResponse<Asset> = self.send(request).await?;

		// The filter is advisory on some deployments; match locally as well.
		Ok(response
			.data
			.into_iter()
			.filter(|asset| {
				asset.network_id == network_id
					&& asset
						.contract_address
						.as_deref()
						.is_some_and(|addr| addr.eq_ignore_ascii_case(contract_address))
			})
			.collect())
	}

	async fn create_transaction(
		&self,
		request: &WithdrawalRequest,
	) -> Result<WithdrawalJob, CustodyError> {
		debug!(
			external_id = %truncate_id(&request.external_id),
			asset_id = %request.asset_id,
			amount = %request.amount,
			"Creating withdrawal"
		);

		let body = CreateTransactionBody {
			kind: "withdrawal",
			request,
		};
		self.send(self.request(Method::POST, "transactions").json(&body))
			.await
	}

	async fn get_transactions(
		&self,
		account_id: &str,
		external_id: &str,
	) -> Result<Vec<WithdrawalJob>, CustodyError> {
		let request = self
			.request(Method::GET, "transactions")
			.query(&[("accountId", account_id), ("externalId", external_id)]);
		let response: ListResponse<WithdrawalJob> = self.send(request).await?;
		Ok(response.data)
	}

	async fn get_transaction(&self, transaction_id: &str) -> Result<WithdrawalJob, CustodyError> {
		let path = format!("transactions/{}", transaction_id);
		self.send(self.request(Method::GET, &path)).await
	}

	async fn deposit_address(
		&self,
		account_id: &str,
		network_id: &str,
	) -> Result<Option<String>, CustodyError> {
		let path = format!("accounts/{}/deposit-addresses", account_id);
		let request = self
			.request(Method::GET, &path)
			.query(&[("networkId", network_id)]);

		match self.send::<ListResponse<DepositAddress>>(request).await {
			Ok(response) => Ok(response.data.into_iter().next().map(|d| d.address)),
			Err(CustodyError::NotFound(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}
}

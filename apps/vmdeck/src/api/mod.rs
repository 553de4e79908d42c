//! Client for the VM management API: resolves where a VM's remote display
//! can be reached.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::console::ConnectionParams;
use crate::transport::Credential;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid api configuration: {0}")]
    InvalidConfig(String),
    #[error("no auth token found")]
    MissingToken,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    base_url: Url,
    bearer_token: Option<String>,
}

impl ApiConfig {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ApiError> {
        let mut base = base_url.as_ref().trim().to_string();
        if base.is_empty() {
            return Err(ApiError::InvalidConfig("api base url cannot be empty".into()));
        }
        if !base.contains("://") {
            base = format!("{}{base}", infer_scheme(&base));
        }
        let base_url = Url::parse(&base)
            .map_err(|err| ApiError::InvalidConfig(format!("invalid api base url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidConfig(format!("{base} cannot be a base url")));
        }
        Ok(Self {
            base_url,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidConfig("api base url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn infer_scheme(base: &str) -> &'static str {
    let host = base
        .split('/')
        .next()
        .unwrap_or(base)
        .trim_start_matches('[')
        .split(']')
        .next()
        .unwrap_or(base)
        .to_ascii_lowercase();
    let private = host.starts_with("localhost")
        || host.starts_with("127.")
        || host.starts_with("10.")
        || host.starts_with("192.168.")
        || host.starts_with("::1")
        || host
            .strip_prefix("172.")
            .and_then(|rest| rest.split('.').next())
            .and_then(|octet| octet.parse::<u8>().ok())
            .is_some_and(|octet| (16..32).contains(&octet));
    if private { "http://" } else { "https://" }
}

/// `GET /api/virt/domain/{vm}/spice` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiceConnectionInfo {
    pub spice_port: u16,
    pub ws_port: u16,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl SpiceConnectionInfo {
    /// The console talks to the websocket proxy, not the raw display port.
    pub fn into_params(self) -> ConnectionParams {
        ConnectionParams::new(self.host, self.ws_port)
            .with_credential(self.password.map(Credential::new))
    }
}

/// Supplies the mount parameters for a VM's console.
#[async_trait]
pub trait ConnectionParamsResolver: Send + Sync {
    async fn resolve(&self, vm_name: &str) -> Result<ConnectionParams, ApiError>;
}

#[derive(Clone)]
pub struct VmApiClient {
    config: ApiConfig,
    client: reqwest::Client,
}

impl VmApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub async fn spice_connection(&self, vm_name: &str) -> Result<SpiceConnectionInfo, ApiError> {
        let token = self.config.bearer_token().ok_or(ApiError::MissingToken)?;
        let endpoint = self
            .config
            .endpoint(&["api", "virt", "domain", vm_name, "spice"])?;
        debug!(target: "vmdeck::api", vm = vm_name, url = %endpoint, "requesting display connection");
        let response = self.client.get(endpoint).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status()));
        }
        Ok(response.json::<SpiceConnectionInfo>().await?)
    }
}

#[async_trait]
impl ConnectionParamsResolver for VmApiClient {
    async fn resolve(&self, vm_name: &str) -> Result<ConnectionParams, ApiError> {
        self.spice_connection(vm_name)
            .await
            .map(SpiceConnectionInfo::into_params)
    }
}

//! HomematicIP Cloud client.
//!
//! Implements the [`HomeClient`] boundary against the cloud access point:
//!
//! ```text
//! ┌────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  Host lookup   │────>│  REST session   │────>│ getCurrentState  │
//! │  (getHost)     │     │  (auth headers) │     │  snapshot fetch  │
//! └────────────────┘     └─────────────────┘     └──────────────────┘
//!                                │
//!                                └──────> websocket push stream ──> mpsc
//! ```
//!
//! Session bootstrap resolves the access point's REST and websocket hosts
//! once; every request carries the pairing auth token plus the CLIENTAUTH
//! digest derived from the access point id.

mod parse;
mod push;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha512};
use tokio::sync::mpsc;
use tracing::{debug, info};

use hmip_common::client::HomeClient;
use hmip_common::config::CloudConfig;
use hmip_common::error::{Error, Result};
use hmip_common::model::{ChangeEvent, Group};

use crate::push::PushListener;

/// API version sent with every request.
const API_VERSION: &str = "12";

/// Fixed salt the cloud expects in the CLIENTAUTH digest.
const CLIENT_AUTH_SALT: &str = "jiLpVitHvWnIGD1yo7MA";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct HostLookup {
    #[serde(rename = "urlREST")]
    url_rest: String,
    #[serde(rename = "urlWebSocket")]
    url_websocket: String,
}

/// Client for one HomematicIP cloud access point.
pub struct CloudClient {
    http: reqwest::Client,
    rest_url: String,
    ws_url: String,
    auth_token: String,
    client_auth: String,
    access_point_id: String,
}

impl CloudClient {
    /// Resolve the access point's hosts and prepare an authenticated session.
    ///
    /// Fails when credentials are missing or the lookup endpoint cannot be
    /// reached; callers treat this as a fatal startup condition.
    pub async fn connect(config: &CloudConfig) -> Result<Self> {
        if config.auth_token.is_empty() || config.access_point_id.is_empty() {
            return Err(Error::Config(
                "auth_token and access_point_id are required".to_string(),
            ));
        }

        let access_point_id = normalize_access_point_id(&config.access_point_id);
        let client_auth = client_auth_token(&access_point_id);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Session(format!("Failed to build HTTP client: {}", e)))?;

        let lookup: HostLookup = http
            .post(&config.lookup_url)
            .json(&api_request_body(&access_point_id))
            .send()
            .await
            .map_err(|e| Error::Session(format!("Host lookup failed: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::Session(format!("Host lookup rejected: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::Session(format!("Host lookup response: {}", e)))?;

        info!(
            rest = %lookup.url_rest,
            websocket = %lookup.url_websocket,
            "Resolved cloud hosts"
        );

        Ok(Self {
            http,
            rest_url: lookup.url_rest,
            ws_url: lookup.url_websocket,
            auth_token: config.auth_token.clone(),
            client_auth,
            access_point_id,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<String> {
        let url = format!("{}{}", self.rest_url, path);

        let response = self
            .http
            .post(&url)
            .header("VERSION", API_VERSION)
            .header("AUTHTOKEN", &self.auth_token)
            .header("CLIENTAUTH", &self.client_auth)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{}: {}", path, e)))?
            .error_for_status()
            .map_err(|e| Error::Transport(format!("{}: {}", path, e)))?;

        response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl HomeClient for CloudClient {
    async fn fetch_current_state(&self) -> Result<Vec<Group>> {
        let body = self
            .post("/hmip/home/getCurrentState", api_request_body(&self.access_point_id))
            .await?;

        let groups = parse::groups_from_state(&body)?;
        debug!(groups = groups.len(), "Fetched current state");
        Ok(groups)
    }

    async fn subscribe_changes(&self, buffer: usize) -> Result<mpsc::Receiver<Vec<ChangeEvent>>> {
        let (tx, rx) = mpsc::channel(buffer);

        let listener = PushListener::new(
            self.ws_url.clone(),
            self.auth_token.clone(),
            self.client_auth.clone(),
        );
        tokio::spawn(listener.run(tx));

        Ok(rx)
    }
}

fn api_request_body(access_point_id: &str) -> Value {
    json!({
        "clientCharacteristics": {
            "apiVersion": API_VERSION,
            "applicationIdentifier": "hmip-exporter",
            "applicationVersion": env!("CARGO_PKG_VERSION"),
            "deviceManufacturer": "none",
            "deviceType": "Computer",
            "language": "en_US",
            "osType": std::env::consts::OS,
            "osVersion": "unknown",
        },
        "id": access_point_id,
    })
}

/// Access point ids are entered with or without dashes; the cloud expects
/// the undashed uppercase form.
fn normalize_access_point_id(raw: &str) -> String {
    raw.replace('-', "").to_uppercase()
}

fn client_auth_token(access_point_id: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(access_point_id.as_bytes());
    hasher.update(CLIENT_AUTH_SALT.as_bytes());
    hex::encode_upper(hasher.finalize())
}

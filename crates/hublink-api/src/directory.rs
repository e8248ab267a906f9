// ── Device directory collaborator ──
//
// Post-login enumeration of the account's devices. The engine consumes the
// records this produces; it never fetches them itself. Directory layout on
// the wire: `GET {base}/hubs` lists the account's hubs, then
// `GET {base}/hubs/{id}/devices` lists each hub's devices with their
// current attribute states.

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::auth::{body_is_unauthorized, error_message};
use crate::config::HubConfig;
use crate::error::Error;

/// One attribute's last-known state as the directory reports it.
///
/// States arrive string-typed regardless of the attribute's real type;
/// [`AttributeValue::parse`](crate::frame::AttributeValue::parse) coerces
/// them on the consumer side.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeRecord {
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
}

/// One device as the directory reports it: the `{topic-id, kind,
/// initial-attributes}` record the session engine consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRecord {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<AttributeRecord>,
}

#[derive(Debug, Deserialize)]
struct HubRecord {
    id: String,
}

/// Client for the hub's device directory endpoints.
///
/// Holds the bearer token from a completed login; a stale token surfaces
/// as [`Error::Authentication`] so the caller can refresh and retry.
pub struct DirectoryClient {
    http: reqwest::Client,
    config: HubConfig,
    access_token: String,
}

impl DirectoryClient {
    pub fn new(config: HubConfig, access_token: impl Into<String>) -> Result<Self, Error> {
        let http = config.build_http()?;
        Ok(Self {
            http,
            config,
            access_token: access_token.into(),
        })
    }

    /// Create a directory client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        config: HubConfig,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            config,
            access_token: access_token.into(),
        }
    }

    /// Enumerate every device across all of the account's hubs.
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let hubs: Vec<HubRecord> = self.get(self.config.endpoint("hubs")?).await?;
        debug!(hubs = hubs.len(), "listing devices");

        let mut devices = Vec::new();
        for hub in &hubs {
            let url = self.config.endpoint(&format!("hubs/{}/devices", hub.id))?;
            let mut hub_devices: Vec<DeviceRecord> = self.get(url).await?;

            for device in &hub_devices {
                info!(id = device.id, name = %device.name, kind = %device.kind, "found device");
            }
            devices.append(&mut hub_devices);
        }

        Ok(devices)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {url}");

        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: error_message(resp).await,
            });
        }

        // Some deployments report auth failures as 200-adjacent errors with
        // an `unauthorized` code in the envelope; check before giving up.
        let body = resp.text().await.unwrap_or_default();
        if body_is_unauthorized(&body) {
            return Err(Error::Authentication { message: body });
        }

        Err(Error::Api {
            message: body,
            status: status.as_u16(),
        })
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::{
    config::Config,
    error::{Context, Result},
    format_err,
};

/// Page size used when walking the pin list. Pinata caps it at 1000.
const PIN_LIST_PAGE_LIMIT: usize = 1000;

/// A pinned document as reported by the pinning service.
#[derive(Clone, Debug, PartialEq)]
pub struct PinHandle {
    pub cid: String,
    pub keyvalues: Map<String, Value>,
}

/// Operations this service needs from the pinning service and its gateway.
#[async_trait]
pub trait PinningService: Send + Sync + 'static {
    /// Lists every pinned document whose metadata name equals `name`.
    async fn list_pinned(&self, name: &str) -> Result<Vec<PinHandle>>;

    /// Fetches a document body from the gateway.
    /// Responds `NOT_FOUND` when the gateway does not know the CID.
    async fn fetch_document(&self, cid: &str) -> Result<Value>;

    /// Pins a JSON document and returns its CID.
    async fn pin_json(
        &self,
        name: &str,
        content: Value,
        keyvalues: Map<String, Value>,
    ) -> Result<String>;

    async fn pin_keyvalues(&self, cid: &str) -> Result<Map<String, Value>>;

    /// Replaces the key-value metadata of a pin. The document body is untouched.
    async fn update_keyvalues(&self, cid: &str, keyvalues: Map<String, Value>) -> Result<()>;
}

/// URL of `cid` on the gateway. `gateway` is a bare host served over https,
/// or a full base URL.
pub fn gateway_url(gateway: &str, cid: &str) -> Result<Url> {
    let base = if gateway.contains("://") {
        gateway.to_string()
    } else {
        format!("https://{}", gateway)
    };
    let mut url =
        Url::parse(&base).context_internal_server_error("failed to construct gateway URL")?;
    // The CID is a single escaped segment, it can never leave `/ipfs/`.
    url.path_segments_mut()
        .map_err(|_| format_err!(INTERNAL_SERVER_ERROR, "gateway URL cannot be a base"))?
        .pop_if_empty()
        .push("ipfs")
        .push(cid);
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct PinListResp {
    rows: Vec<PinListRow>,
}

#[derive(Debug, Deserialize)]
struct PinListRow {
    ipfs_pin_hash: String,
    #[serde(default)]
    metadata: PinListRowMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct PinListRowMetadata {
    // Pinata sends `null` for pins without key-values.
    #[serde(default)]
    keyvalues: Option<Map<String, Value>>,
}

impl From<PinListRow> for PinHandle {
    fn from(row: PinListRow) -> Self {
        Self {
            cid: row.ipfs_pin_hash,
            keyvalues: row.metadata.keyvalues.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PinJsonReq<'a> {
    pinata_content: Value,
    pinata_metadata: PinJsonReqMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct PinJsonReqMetadata<'a> {
    name: &'a str,
    keyvalues: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct PinJsonResp {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HashMetadataReq<'a> {
    ipfs_pin_hash: &'a str,
    keyvalues: Map<String, Value>,
}

/// Pinata API client. Documents are read back through the configured gateway.
pub struct Pinata {
    http_client: reqwest::Client,
    api_url: Url,
    jwt: String,
    gateway: String,
}

impl Pinata {
    pub fn new(http_client: reqwest::Client, config: &Config) -> anyhow::Result<Self> {
        let jwt = config
            .pinata_jwt
            .clone()
            .ok_or_else(|| anyhow::anyhow!("PINATA_JWT is not set"))?;
        Ok(Self {
            http_client,
            api_url: config.pinata_api_url.clone(),
            jwt,
            gateway: config.pinata_gateway.clone(),
        })
    }

    fn api(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .context_internal_server_error("failed to construct Pinata API URL")
    }

    async fn pin_list(&self, query: &[(&str, String)]) -> Result<Vec<PinHandle>> {
        let url = self.api("data/pinList")?;
        let mut pins = Vec::new();
        let mut offset = 0;
        loop {
            let resp = self
                .http_client
                .get(url.clone())
                .bearer_auth(&self.jwt)
                .query(query)
                .query(&[
                    ("pageLimit", PIN_LIST_PAGE_LIMIT),
                    ("pageOffset", offset),
                ])
                .send()
                .await
                .context_internal_server_error("failed to request Pinata")?
                .error_for_status()
                .context_internal_server_error("Pinata responded with error")?
                .json::<PinListResp>()
                .await
                .context_internal_server_error("malformed Pinata pin list")?;
            let len = resp.rows.len();
            pins.extend(resp.rows.into_iter().map(PinHandle::from));
            if len < PIN_LIST_PAGE_LIMIT {
                break;
            }
            offset += len;
        }
        Ok(pins)
    }
}

#[async_trait]
impl PinningService for Pinata {
    #[tracing::instrument(skip(self))]
    async fn list_pinned(&self, name: &str) -> Result<Vec<PinHandle>> {
        let pins = self
            .pin_list(&[
                ("status", "pinned".to_string()),
                ("metadata[name]", name.to_string()),
            ])
            .await?;
        tracing::debug!(count = pins.len(), "listed pins");
        Ok(pins)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_document(&self, cid: &str) -> Result<Value> {
        let url = gateway_url(&self.gateway, cid)?;
        let resp = self
            .http_client
            .get(url)
            .send()
            .await
            .context_internal_server_error("failed to request gateway")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(format_err!(NOT_FOUND, "document {} not found on gateway", cid));
        }
        resp.error_for_status()
            .context_internal_server_error("gateway responded with error")?
            .json::<Value>()
            .await
            .context_internal_server_error("malformed document")
    }

    #[tracing::instrument(skip(self, content))]
    async fn pin_json(
        &self,
        name: &str,
        content: Value,
        keyvalues: Map<String, Value>,
    ) -> Result<String> {
        let req = PinJsonReq {
            pinata_content: content,
            pinata_metadata: PinJsonReqMetadata { name, keyvalues },
        };
        let resp = self
            .http_client
            .post(self.api("pinning/pinJSONToIPFS")?)
            .bearer_auth(&self.jwt)
            .json(&req)
            .send()
            .await
            .context_internal_server_error("failed to request Pinata")?
            .error_for_status()
            .context_internal_server_error("Pinata responded with error")?
            .json::<PinJsonResp>()
            .await
            .context_internal_server_error("malformed Pinata pin response")?;
        Ok(resp.ipfs_hash)
    }

    #[tracing::instrument(skip(self))]
    async fn pin_keyvalues(&self, cid: &str) -> Result<Map<String, Value>> {
        let pin = self
            .pin_list(&[
                ("status", "pinned".to_string()),
                ("hashContains", cid.to_string()),
            ])
            .await?
            .into_iter()
            .find(|pin| pin.cid == cid)
            .context_not_found("pin not found")?;
        Ok(pin.keyvalues)
    }

    #[tracing::instrument(skip(self))]
    async fn update_keyvalues(&self, cid: &str, keyvalues: Map<String, Value>) -> Result<()> {
        self.http_client
            .put(self.api("pinning/hashMetadata")?)
            .bearer_auth(&self.jwt)
            .json(&HashMetadataReq {
                ipfs_pin_hash: cid,
                keyvalues,
            })
            .send()
            .await
            .context_internal_server_error("failed to request Pinata")?
            .error_for_status()
            .context_internal_server_error("Pinata responded with error")?;
        Ok(())
    }
}

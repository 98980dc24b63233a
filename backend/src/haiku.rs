use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::{
    entity_impl::haiku_like::LikeStore,
    error::{Context, Result},
    pinata::{PinHandle, PinningService},
    state::AppState,
};

/// Metadata name every haiku document is pinned under.
pub const HAIKU_METADATA_NAME: &str = "haiku_metadata.json";

/// Short image identifiers mapped to image CIDs.
/// Entries that are not strings are kept but never resolve.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ImageMap(Map<String, Value>);

impl ImageMap {
    /// Unmapped identifiers are assumed to be CIDs already.
    pub fn resolve(&self, image: &str) -> String {
        match self.0.get(image).and_then(Value::as_str) {
            Some(cid) if !cid.is_empty() => cid.to_string(),
            _ => image.to_string(),
        }
    }
}

impl FromIterator<(String, Value)> for ImageMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[tracing::instrument(skip(pinning))]
pub async fn fetch_image_map(pinning: &dyn PinningService, cid: &str) -> Result<ImageMap> {
    let document = pinning
        .fetch_document(cid)
        .await
        .map_err(|e| e.context("failed to fetch image map"))?;
    serde_json::from_value(document).context_internal_server_error("malformed image map")
}

/// Haiku document as pinned. Older documents disagree on field types,
/// so the loosely typed fields are kept as raw JSON.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HaikuDocument {
    pub text: Value,
    pub image: Value,
    pub timestamp: Value,
    pub user_id: Value,
    pub display_name: Value,
    #[serde(rename = "photoURL")]
    pub photo_url: Value,
    pub tags: Value,
    pub likes: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Haiku {
    /// CID of the haiku document.
    pub id: String,
    pub text: String,
    /// CID of the image.
    pub image: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub tags: Vec<String>,
    pub likes: u64,
}

impl Haiku {
    pub fn from_document(id: String, document: HaikuDocument, image_map: &ImageMap) -> Self {
        let image = parse_string(document.image)
            .map(|image| image_map.resolve(&image))
            .unwrap_or_default();
        Self {
            id,
            text: parse_string(document.text).unwrap_or_default(),
            image,
            timestamp: parse_integer(&document.timestamp),
            user_id: parse_string(document.user_id),
            display_name: parse_string(document.display_name),
            photo_url: parse_string(document.photo_url),
            tags: decode_tags(&document.tags),
            likes: parse_integer(&document.likes).max(0) as u64,
        }
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag))
    }
}

/// Lenient string parsing. Numbers become their decimal text, anything else is absent.
pub fn parse_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lenient integer parsing; anything unparsable is 0.
pub fn parse_integer(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Tags are stored comma-joined, but lists are accepted too.
pub fn decode_tags(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => split_tags(s),
        Value::Array(tags) => tags
            .iter()
            .filter_map(Value::as_str)
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Splits a comma separated tag list into lowercase, trimmed tags.
pub fn split_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Newest first, then by CID so equal timestamps keep a stable order.
pub fn sort_by_recent(haikus: &mut [Haiku]) {
    haikus.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Most liked first, newest first among equals.
pub fn sort_by_likes(haikus: &mut [Haiku]) {
    haikus.sort_by(|a, b| {
        b.likes
            .cmp(&a.likes)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct FetchFailure {
    /// CID of the document that could not be loaded.
    pub id: String,
    pub error: String,
}

/// Haikus that loaded, and the ones that did not.
#[derive(Debug, Default)]
pub struct Batch {
    pub haikus: Vec<Haiku>,
    pub failures: Vec<FetchFailure>,
}

pub async fn fetch_haiku(
    pinning: &dyn PinningService,
    cid: &str,
    image_map: &ImageMap,
) -> Result<Haiku> {
    let document = pinning.fetch_document(cid).await?;
    let document: HaikuDocument =
        serde_json::from_value(document).context_internal_server_error("malformed haiku")?;
    Ok(Haiku::from_document(cid.to_string(), document, image_map))
}

/// Fetches every pin's document, at most `concurrency` at a time.
/// A failing document is recorded in the batch instead of failing the whole fetch.
pub async fn fetch_haikus(
    pinning: &dyn PinningService,
    pins: Vec<PinHandle>,
    image_map: &ImageMap,
    concurrency: usize,
) -> Batch {
    let results = stream::iter(pins)
        .map(|pin| async move {
            let res = fetch_haiku(pinning, &pin.cid, image_map).await;
            (pin.cid, res)
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut batch = Batch::default();
    for (cid, res) in results {
        match res {
            Ok(haiku) => batch.haikus.push(haiku),
            Err(e) => {
                tracing::warn!(%cid, "failed to fetch haiku: {:#}", e.inner);
                batch.failures.push(FetchFailure {
                    id: cid,
                    error: format!("{:#}", e.inner),
                });
            }
        }
    }
    batch
}

/// Overwrites like counts with the authoritative ones.
pub async fn merge_likes(likes: &dyn LikeStore, haikus: &mut [Haiku]) -> Result<()> {
    let ids = haikus.iter().map(|haiku| haiku.id.clone()).collect::<Vec<_>>();
    let counts = likes.counts(&ids).await?;
    for haiku in haikus {
        haiku.likes = counts.get(&haiku.id).copied().unwrap_or(0);
    }
    Ok(())
}

/// Loads every pinned haiku with resolved images and authoritative likes.
#[tracing::instrument(skip(state))]
pub async fn load_haikus(state: &AppState) -> Result<Batch> {
    let image_map = fetch_image_map(&*state.pinning, &state.config.image_map_cid).await?;
    let pins = state.pinning.list_pinned(HAIKU_METADATA_NAME).await?;
    tracing::info!(count = pins.len(), "found pins");

    let mut batch = fetch_haikus(
        &*state.pinning,
        pins,
        &image_map,
        state.config.fetch_concurrency,
    )
    .await;
    merge_likes(&*state.likes, &mut batch.haikus).await?;
    Ok(batch)
}

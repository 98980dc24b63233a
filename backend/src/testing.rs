//! In-memory stand-ins for the pinning service and the like store.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Map, Value};
use tower::ServiceExt;
use ulid::Ulid;

use crate::{
    config::Config,
    entity_impl::haiku_like::LikeStore,
    error::Result,
    format_err,
    haiku::HAIKU_METADATA_NAME,
    pinata::{PinHandle, PinningService},
    state::AppState,
};

struct Pin {
    name: String,
    keyvalues: Map<String, Value>,
}

#[derive(Default)]
pub struct FakePinning {
    // Gateway contents, pinned or not.
    documents: Mutex<HashMap<String, Value>>,
    pins: Mutex<BTreeMap<String, Pin>>,
    broken: Mutex<HashSet<String>>,
    fail_updates: AtomicBool,
}

impl FakePinning {
    /// Starts with an empty image map at the default CID.
    pub fn new() -> Arc<Self> {
        let this = Self::default();
        this.set_image_map(json!({}));
        Arc::new(this)
    }

    pub fn set_image_map(&self, map: Value) {
        self.add_document(&Config::default().image_map_cid, map);
    }

    pub fn add_document(&self, cid: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(cid.to_string(), document);
    }

    pub fn add_haiku(&self, cid: &str, document: Value) {
        self.add_document(cid, document);
        let mut keyvalues = Map::new();
        keyvalues.insert("likes".to_string(), json!(0));
        self.pins.lock().unwrap().insert(
            cid.to_string(),
            Pin {
                name: HAIKU_METADATA_NAME.to_string(),
                keyvalues,
            },
        );
    }

    /// Gateway requests for `cid` fail from now on.
    pub fn break_document(&self, cid: &str) {
        self.broken.lock().unwrap().insert(cid.to_string());
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub fn keyvalues(&self, cid: &str) -> Map<String, Value> {
        self.pins.lock().unwrap()[cid].keyvalues.clone()
    }

    pub fn document(&self, cid: &str) -> Option<Value> {
        self.documents.lock().unwrap().get(cid).cloned()
    }

    pub fn pinned_cids(&self) -> Vec<String> {
        self.pins.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl PinningService for FakePinning {
    async fn list_pinned(&self, name: &str) -> Result<Vec<PinHandle>> {
        Ok(self
            .pins
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, pin)| pin.name == name)
            .map(|(cid, pin)| PinHandle {
                cid: cid.clone(),
                keyvalues: pin.keyvalues.clone(),
            })
            .collect())
    }

    async fn fetch_document(&self, cid: &str) -> Result<Value> {
        if self.broken.lock().unwrap().contains(cid) {
            return Err(format_err!(INTERNAL_SERVER_ERROR, "gateway timed out"));
        }
        self.document(cid)
            .ok_or_else(|| format_err!(NOT_FOUND, "document {} not found on gateway", cid))
    }

    async fn pin_json(
        &self,
        name: &str,
        content: Value,
        keyvalues: Map<String, Value>,
    ) -> Result<String> {
        let cid = format!("bafy{}", Ulid::new().to_string().to_lowercase());
        self.add_document(&cid, content);
        self.pins.lock().unwrap().insert(
            cid.clone(),
            Pin {
                name: name.to_string(),
                keyvalues,
            },
        );
        Ok(cid)
    }

    async fn pin_keyvalues(&self, cid: &str) -> Result<Map<String, Value>> {
        self.pins
            .lock()
            .unwrap()
            .get(cid)
            .map(|pin| pin.keyvalues.clone())
            .ok_or_else(|| format_err!(NOT_FOUND, "pin not found"))
    }

    async fn update_keyvalues(&self, cid: &str, keyvalues: Map<String, Value>) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(format_err!(INTERNAL_SERVER_ERROR, "Pinata responded with error"));
        }
        let mut pins = self.pins.lock().unwrap();
        let pin = pins
            .get_mut(cid)
            .ok_or_else(|| format_err!(NOT_FOUND, "pin not found"))?;
        pin.keyvalues = keyvalues;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLikeStore {
    likes: Mutex<HashSet<(String, String)>>,
}

impl MemoryLikeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_likes(likes: &[(&str, &str)]) -> Arc<Self> {
        let likes = likes
            .iter()
            .map(|(haiku_id, user_id)| (haiku_id.to_string(), user_id.to_string()))
            .collect();
        Arc::new(Self {
            likes: Mutex::new(likes),
        })
    }

    pub fn recorded(&self) -> usize {
        self.likes.lock().unwrap().len()
    }
}

#[async_trait]
impl LikeStore for MemoryLikeStore {
    async fn insert_like(&self, haiku_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .likes
            .lock()
            .unwrap()
            .insert((haiku_id.to_string(), user_id.to_string())))
    }

    async fn count(&self, haiku_id: &str) -> Result<u64> {
        Ok(self
            .likes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == haiku_id)
            .count() as u64)
    }

    async fn counts(&self, haiku_ids: &[String]) -> Result<HashMap<String, u64>> {
        let mut counts = self.all_counts().await?;
        counts.retain(|id, _| haiku_ids.contains(id));
        Ok(counts)
    }

    async fn all_counts(&self) -> Result<HashMap<String, u64>> {
        let mut counts = HashMap::new();
        for (haiku_id, _) in self.likes.lock().unwrap().iter() {
            *counts.entry(haiku_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

pub fn test_state(pinning: Arc<FakePinning>, likes: Arc<MemoryLikeStore>) -> AppState {
    AppState {
        config: Arc::new(Config::default()),
        pinning,
        likes,
    }
}

pub fn haiku_doc(text: &str, timestamp: i64, user_id: &str, tags: &str) -> Value {
    json!({
        "text": text,
        "image": "1",
        "timestamp": timestamp,
        "userId": user_id,
        "displayName": format!("{} san", user_id),
        "photoURL": format!("https://example.com/{}.png", user_id),
        "tags": tags,
        "likes": 0,
    })
}

/// Sends one request through the router and returns the status and JSON body.
pub async fn send(
    router: Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri);
    let req = if let Some(body) = body {
        req.header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
    } else {
        req.body(Body::empty())
    }
    .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

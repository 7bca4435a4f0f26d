//! In-memory store for narration assets, keyed by story id.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::body::Bytes;

use dreamytales_core::types::StoryId;

/// Shared, cloneable map of story id → encoded audio.
#[derive(Clone, Default)]
pub struct AssetStore {
    inner: Arc<RwLock<HashMap<StoryId, Arc<[u8]>>>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: StoryId, audio: Arc<[u8]>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, audio);
    }

    pub fn get(&self, id: &str) -> Option<Arc<[u8]>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// The asset as a body that shares the stored buffer.
    pub fn bytes(&self, id: &str) -> Option<Bytes> {
        self.get(id).map(Bytes::from_owner)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Route the HTTP API serves a story's audio from.
pub fn audio_uri(id: &str) -> String {
    format!("/stories/{id}/audio")
}

//! Volume-level registry
//!
//! The registry is the volume-level cache: the single owner of loaded
//! volumes, keyed by id. Decache releases a volume here; in-flight frame
//! work holds only `Weak` handles, so a released volume is dropped as soon
//! as its last in-flight request finishes draining.

use crate::volume::Volume;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Registry of live volumes, keyed by volume id
#[derive(Default)]
pub struct VolumeRegistry {
    volumes: RwLock<HashMap<String, Arc<Volume>>>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a volume under its own id, replacing any previous entry
    pub fn insert(&self, volume: Arc<Volume>) {
        let id = volume.id().to_string();
        debug!(volume_id = %id, "registering volume");
        self.volumes.write().unwrap().insert(id, volume);
    }

    /// Look up a volume by id
    pub fn get(&self, volume_id: &str) -> Option<Arc<Volume>> {
        self.volumes.read().unwrap().get(volume_id).cloned()
    }

    /// Release a volume
    ///
    /// The returned handle is the registry's last strong reference; dropping
    /// it frees the scalar buffers once in-flight weak holders are done.
    pub fn remove(&self, volume_id: &str) -> Option<Arc<Volume>> {
        debug!(volume_id, "releasing volume");
        self.volumes.write().unwrap().remove(volume_id)
    }

    pub fn contains(&self, volume_id: &str) -> bool {
        self.volumes.read().unwrap().contains_key(volume_id)
    }

    pub fn len(&self) -> usize {
        self.volumes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.read().unwrap().is_empty()
    }
}

//! Call group registry
//!
//! Owned map of active call groups: created at application startup, passed by
//! handle to whatever accepts connections, emptied at shutdown. Replaces any
//! ambient global table of live calls.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::GroupError;
use crate::group::call::{CallGroup, ParticipantId};
use crate::sink::RecordingSink;

/// Registry of active call groups
pub struct GroupRegistry {
    groups: DashMap<Uuid, Arc<CallGroup>>,
    config: EngineConfig,
}

impl GroupRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            groups: DashMap::new(),
            config,
        }
    }

    /// Declare a new call group
    pub fn create(
        &self,
        uid: Uuid,
        participants: impl IntoIterator<Item = ParticipantId>,
        recorder: Arc<dyn RecordingSink>,
    ) -> Result<Arc<CallGroup>, GroupError> {
        if self.groups.contains_key(&uid) {
            return Err(GroupError::GroupExists(uid));
        }
        let group = CallGroup::new(uid, participants, recorder, self.config.clone());
        self.groups.insert(uid, group.clone());
        Ok(group)
    }

    pub fn get(&self, uid: &Uuid) -> Option<Arc<CallGroup>> {
        self.groups.get(uid).map(|entry| entry.value().clone())
    }

    /// End a call and drop it from the registry
    pub async fn end(&self, uid: &Uuid) -> Result<Option<std::time::Duration>, GroupError> {
        let (_, group) = self
            .groups
            .remove(uid)
            .ok_or(GroupError::GroupNotFound(*uid))?;
        group.end().await
    }

    /// End every remaining call
    pub async fn shutdown(&self) {
        let uids: Vec<Uuid> = self.groups.iter().map(|entry| *entry.key()).collect();
        info!(groups = uids.len(), "registry shutting down");
        for uid in uids {
            if let Some((_, group)) = self.groups.remove(&uid) {
                let _ = group.end().await;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

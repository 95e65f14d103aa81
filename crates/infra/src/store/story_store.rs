//! Story storage. At most one story exists per job.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use datastory_core::{JobId, StoryId};
use datastory_jobs::Story;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoryStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Insert `story` unless its job already has one.
    ///
    /// Returns the stored story and whether this call created it.
    async fn insert_for_job(&self, story: Story) -> Result<(Story, bool), StoryStoreError>;

    async fn get(&self, story_id: StoryId) -> Result<Option<Story>, StoryStoreError>;

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Story>, StoryStoreError>;

    async fn remove(&self, story_id: StoryId) -> Result<(), StoryStoreError>;
}

#[derive(Debug, Default)]
struct Stories {
    by_id: HashMap<StoryId, Story>,
    by_job: HashMap<JobId, StoryId>,
}

/// In-memory story store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStoryStore {
    inner: RwLock<Stories>,
}

impl InMemoryStoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.by_id.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoryStoreError {
    StoryStoreError::Storage("story map lock poisoned".to_string())
}

#[async_trait]
impl StoryStore for InMemoryStoryStore {
    async fn insert_for_job(&self, story: Story) -> Result<(Story, bool), StoryStoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(existing) = inner.by_job.get(&story.job_id).and_then(|id| inner.by_id.get(id)) {
            return Ok((existing.clone(), false));
        }
        inner.by_job.insert(story.job_id, story.id);
        inner.by_id.insert(story.id, story.clone());
        Ok((story, true))
    }

    async fn get(&self, story_id: StoryId) -> Result<Option<Story>, StoryStoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.by_id.get(&story_id).cloned())
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Story>, StoryStoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .by_job
            .get(&job_id)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn remove(&self, story_id: StoryId) -> Result<(), StoryStoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(story) = inner.by_id.remove(&story_id) {
            inner.by_job.remove(&story.job_id);
        }
        Ok(())
    }
}

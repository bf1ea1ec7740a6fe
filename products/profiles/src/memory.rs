use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use entity::profiles;
use platform_db::{DbError, DbResult};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    model::{NewProfile, Profile, ProfilePatch},
    store::ProfileStore,
};

/// Process-local store with the same uniqueness rules as the `profiles`
/// table. Backs the server's dev mode and the test suites.
#[derive(Clone, Debug, Default)]
pub struct MemoryProfileStore {
    rows: Arc<RwLock<HashMap<Uuid, profiles::Model>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `profile` under its own id without any ability check. Fixture
    /// seam for tests; production writes go through `ProfileService`.
    pub async fn insert(&self, profile: Profile) -> DbResult<Profile> {
        let mut rows = self.rows.write().await;
        let row = profiles::Model::from(profile);
        ensure_unique(&rows, &row)?;
        rows.insert(row.id, row.clone());
        Ok(row.into())
    }

    /// Number of rows, soft-deleted ones included.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn ensure_unique(
    rows: &HashMap<Uuid, profiles::Model>,
    candidate: &profiles::Model,
) -> DbResult<()> {
    for row in rows.values().filter(|row| row.id != candidate.id) {
        if row.user_id == candidate.user_id {
            return Err(DbError::Conflict("profiles.user_id".into()));
        }
        if row.username == candidate.username {
            return Err(DbError::Conflict("profiles.username".into()));
        }
    }
    Ok(())
}

fn live(row: &profiles::Model) -> bool {
    row.deleted_at.is_none()
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Profile>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id).filter(|row| live(row)).cloned().map(Profile::from))
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> DbResult<Option<Profile>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|row| row.user_id == user_id && live(row))
            .cloned()
            .map(Profile::from))
    }

    async fn create(&self, input: NewProfile) -> DbResult<Profile> {
        let now = Utc::now().into();
        let row = profiles::Model {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            username: input.username,
            first_name: input.name.first,
            last_name: input.name.last,
            preferred_name: input.name.preferred,
            avatar_url: input.avatar_url,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let mut rows = self.rows.write().await;
        ensure_unique(&rows, &row)?;
        rows.insert(row.id, row.clone());
        Ok(row.into())
    }

    async fn update(&self, id: Uuid, patch: ProfilePatch) -> DbResult<Profile> {
        let mut rows = self.rows.write().await;
        let mut row = rows
            .get(&id)
            .filter(|row| live(row))
            .cloned()
            .ok_or(DbError::NotFound(id))?;
        patch.apply(&mut row);
        row.updated_at = Utc::now().into();
        ensure_unique(&rows, &row)?;
        rows.insert(id, row.clone());
        Ok(row.into())
    }

    async fn soft_delete(&self, id: Uuid) -> DbResult<Profile> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&id)
            .filter(|row| live(row))
            .ok_or(DbError::NotFound(id))?;
        let now = Utc::now().into();
        row.deleted_at = Some(now);
        row.updated_at = now;
        Ok(row.clone().into())
    }
}

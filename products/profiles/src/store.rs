use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use entity::profiles;
use platform_db::{DbError, DbPool, DbResult};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ActiveValue::Unchanged, ColumnTrait, EntityTrait,
    QueryFilter,
};
use uuid::Uuid;

use crate::model::{NewProfile, Profile, ProfilePatch};

/// Persistence for profiles. Soft-deleted rows are invisible to every
/// lookup.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Profile>>;

    async fn find_by_user_id(&self, user_id: Uuid) -> DbResult<Option<Profile>>;

    async fn create(&self, input: NewProfile) -> DbResult<Profile>;

    /// Applies `patch` and returns the row as stored afterwards.
    async fn update(&self, id: Uuid, patch: ProfilePatch) -> DbResult<Profile>;

    async fn soft_delete(&self, id: Uuid) -> DbResult<Profile>;
}

#[async_trait]
impl<T: ProfileStore + ?Sized> ProfileStore for Arc<T> {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Profile>> {
        (**self).find_by_id(id).await
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> DbResult<Option<Profile>> {
        (**self).find_by_user_id(user_id).await
    }

    async fn create(&self, input: NewProfile) -> DbResult<Profile> {
        (**self).create(input).await
    }

    async fn update(&self, id: Uuid, patch: ProfilePatch) -> DbResult<Profile> {
        (**self).update(id, patch).await
    }

    async fn soft_delete(&self, id: Uuid) -> DbResult<Profile> {
        (**self).soft_delete(id).await
    }
}

#[derive(Clone, Debug)]
pub struct SeaOrmProfileStore {
    db: DbPool,
}

impl SeaOrmProfileStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn live_row(&self, id: Uuid) -> DbResult<profiles::Model> {
        profiles::Entity::find_by_id(id)
            .filter(profiles::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or(DbError::NotFound(id))
    }
}

#[async_trait]
impl ProfileStore for SeaOrmProfileStore {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<Profile>> {
        let row = profiles::Entity::find_by_id(id)
            .filter(profiles::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(row.map(Profile::from))
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> DbResult<Option<Profile>> {
        let row = profiles::Entity::find()
            .filter(profiles::Column::UserId.eq(user_id))
            .filter(profiles::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(row.map(Profile::from))
    }

    async fn create(&self, input: NewProfile) -> DbResult<Profile> {
        let now = Utc::now().into();
        let row = profiles::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(input.user_id),
            username: Set(input.username),
            first_name: Set(input.name.first),
            last_name: Set(input.name.last),
            preferred_name: Set(input.name.preferred),
            avatar_url: Set(input.avatar_url),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn update(&self, id: Uuid, patch: ProfilePatch) -> DbResult<Profile> {
        let mut row = self.live_row(id).await?;
        patch.apply(&mut row);
        let row = profiles::ActiveModel {
            id: Unchanged(row.id),
            user_id: Unchanged(row.user_id),
            username: Set(row.username),
            first_name: Set(row.first_name),
            last_name: Set(row.last_name),
            preferred_name: Set(row.preferred_name),
            avatar_url: Set(row.avatar_url),
            created_at: Unchanged(row.created_at),
            updated_at: Set(Utc::now().into()),
            deleted_at: Unchanged(row.deleted_at),
        }
        .update(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn soft_delete(&self, id: Uuid) -> DbResult<Profile> {
        let row = self.live_row(id).await?;
        let mut active: profiles::ActiveModel = row.into();
        let now = Utc::now().into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        let row = active.update(&self.db).await?;
        Ok(row.into())
    }
}

use std::{fmt, str::FromStr};

use platform_api::{ApiError, ApiResponse, ApiResult};
use platform_authn::Claims;
use platform_authz::{Ability, Action, Target};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    model::{NewProfile, Profile, ProfilePatch},
    policy::profile_ability,
    store::ProfileStore,
};

pub const FORBIDDEN_READ: &str = "User is forbidden from reading this profile.";
pub const FORBIDDEN_CREATE: &str = "User is forbidden from creating profiles.";
pub const FORBIDDEN_UPDATE: &str = "User is forbidden from updating this profile.";
pub const FORBIDDEN_DELETE: &str = "User is forbidden from deleting this profile.";
pub const FETCH_FAILED: &str = "Something went wrong when fetching profile";
pub const CREATE_FAILED: &str = "An unexpected error occurred when trying to create a profile.";
pub const UPDATE_FAILED: &str = "An unexpected error occurred when trying to update a profile.";
pub const DELETE_FAILED: &str = "An unexpected error occurred when trying to delete a profile.";
pub const NOT_IMPLEMENTED: &str = "Method not implemented.";

/// Builds the ability a caller gets for profiles.
pub type AbilityFactory = fn(&Claims) -> Ability<Profile>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProfileDetails {
    pub profile: Profile,
}

pub type ProfileResponse = ApiResponse<ProfileDetails>;

/// What `delete` does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeleteMode {
    /// Every delete fails as not implemented.
    #[default]
    Disabled,
    /// Authorized deletes stamp `deletedAt`; the row stays and keeps its
    /// unique username and user id.
    Soft,
}

#[derive(Debug, Error)]
#[error("unknown delete mode {0:?} (expected \"disabled\" or \"soft\")")]
pub struct UnknownDeleteMode(String);

impl FromStr for DeleteMode {
    type Err = UnknownDeleteMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "" => Ok(DeleteMode::Disabled),
            "soft" => Ok(DeleteMode::Soft),
            _ => Err(UnknownDeleteMode(value.to_string())),
        }
    }
}

impl fmt::Display for DeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteMode::Disabled => f.write_str("disabled"),
            DeleteMode::Soft => f.write_str("soft"),
        }
    }
}

/// Profile CRUD guarded by the caller's ability. Each method builds a
/// fresh ability from the claims and makes at most one store mutation.
pub struct ProfileService<S> {
    store: S,
    abilities: AbilityFactory,
    delete_mode: DeleteMode,
}

impl<S: ProfileStore> ProfileService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            abilities: profile_ability,
            delete_mode: DeleteMode::default(),
        }
    }

    pub fn with_abilities(mut self, abilities: AbilityFactory) -> Self {
        self.abilities = abilities;
        self
    }

    pub fn with_delete_mode(mut self, delete_mode: DeleteMode) -> Self {
        self.delete_mode = delete_mode;
        self
    }

    pub fn delete_mode(&self) -> DeleteMode {
        self.delete_mode
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn ability(&self, claims: &Claims) -> Ability<Profile> {
        (self.abilities)(claims)
    }

    async fn fetch(&self, id: Uuid) -> ApiResult<Profile> {
        let result = self.store.find_by_id(id).await;
        match result {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(fetch_failed(
                json!({ "profileId": id, "error": "profile not found" }),
            )),
            Err(err) => {
                error!(error = %err, "profile lookup failed");
                Err(fetch_failed(json!({ "profileId": id, "error": err.to_string() })))
            }
        }
    }

    async fn fetch_by_user_id(&self, user_id: Uuid) -> ApiResult<Profile> {
        let result = self.store.find_by_user_id(user_id).await;
        match result {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(fetch_failed(
                json!({ "userId": user_id, "error": "profile not found" }),
            )),
            Err(err) => {
                error!(error = %err, "profile lookup failed");
                Err(fetch_failed(json!({ "userId": user_id, "error": err.to_string() })))
            }
        }
    }

    #[instrument(
        name = "profiles.get",
        skip_all,
        fields(sub = %claims.sub, role = %claims.role, profile_id = %id)
    )]
    pub async fn get(&self, claims: &Claims, id: Uuid) -> ApiResult<ProfileResponse> {
        let profile = self.fetch(id).await?;
        authorize(&self.ability(claims), Action::Read, &profile, FORBIDDEN_READ)?;
        Ok(ProfileResponse::ok(ProfileDetails { profile }))
    }

    #[instrument(
        name = "profiles.get_by_user_id",
        skip_all,
        fields(sub = %claims.sub, role = %claims.role, user_id = %user_id)
    )]
    pub async fn get_by_user_id(
        &self,
        claims: &Claims,
        user_id: Uuid,
    ) -> ApiResult<ProfileResponse> {
        let profile = self.fetch_by_user_id(user_id).await?;
        authorize(&self.ability(claims), Action::Read, &profile, FORBIDDEN_READ)?;
        Ok(ProfileResponse::ok(ProfileDetails { profile }))
    }

    /// Checked against the bare subject type: nothing exists yet to
    /// evaluate conditions on.
    #[instrument(
        name = "profiles.create",
        skip_all,
        fields(sub = %claims.sub, role = %claims.role)
    )]
    pub async fn create(&self, claims: &Claims, input: NewProfile) -> ApiResult<ProfileResponse> {
        authorize(&self.ability(claims), Action::Create, Target::Type, FORBIDDEN_CREATE)?;
        let profile = self.store.create(input).await.map_err(|err| {
            error!(error = %err, "profile create failed");
            ApiError::internal(CREATE_FAILED, json!({ "error": err.to_string() }))
        })?;
        Ok(ProfileResponse::ok(ProfileDetails { profile }))
    }

    /// Authorizes against the row as it stands before the patch.
    #[instrument(
        name = "profiles.update",
        skip_all,
        fields(sub = %claims.sub, role = %claims.role, profile_id = %id)
    )]
    pub async fn update(
        &self,
        claims: &Claims,
        id: Uuid,
        patch: ProfilePatch,
    ) -> ApiResult<ProfileResponse> {
        let current = self.fetch(id).await?;
        authorize(&self.ability(claims), Action::Update, &current, FORBIDDEN_UPDATE)?;
        let profile = self.store.update(id, patch).await.map_err(|err| {
            error!(error = %err, "profile update failed");
            ApiError::internal(UPDATE_FAILED, json!({ "profileId": id, "error": err.to_string() }))
        })?;
        Ok(ProfileResponse::ok(ProfileDetails { profile }))
    }

    #[instrument(
        name = "profiles.delete",
        skip_all,
        fields(
            sub = %claims.sub,
            role = %claims.role,
            profile_id = %id,
            mode = %self.delete_mode,
        )
    )]
    pub async fn delete(&self, claims: &Claims, id: Uuid) -> ApiResult<ProfileResponse> {
        match self.delete_mode {
            DeleteMode::Disabled => Err(ApiError::internal(NOT_IMPLEMENTED, json!({}))),
            DeleteMode::Soft => {
                let current = self.fetch(id).await?;
                authorize(&self.ability(claims), Action::Delete, &current, FORBIDDEN_DELETE)?;
                let profile = self.store.soft_delete(id).await.map_err(|err| {
                    error!(error = %err, "profile delete failed");
                    ApiError::internal(
                        DELETE_FAILED,
                        json!({ "profileId": id, "error": err.to_string() }),
                    )
                })?;
                Ok(ProfileResponse::ok(ProfileDetails { profile }))
            }
        }
    }
}

fn fetch_failed(details: serde_json::Value) -> ApiError {
    ApiError::internal(FETCH_FAILED, details)
}

fn authorize<'a>(
    ability: &Ability<Profile>,
    action: Action,
    target: impl Into<Target<'a, Profile>>,
    message: &'static str,
) -> ApiResult<()> {
    ability.ensure(action, target).map_err(|err| {
        warn!(%err, "profile access denied");
        ApiError::forbidden(message)
    })
}

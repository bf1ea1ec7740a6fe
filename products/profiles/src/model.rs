use chrono::{DateTime, FixedOffset};
use entity::profiles;
use platform_authz::{FieldValue, Subject};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Subject type tag used by every profile rule.
pub const PROFILE: &str = "Profile";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileName {
    pub first: String,
    pub last: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub name: ProfileName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl From<profiles::Model> for Profile {
    fn from(model: profiles::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            username: model.username,
            name: ProfileName {
                first: model.first_name,
                last: model.last_name,
                preferred: model.preferred_name,
            },
            avatar_url: model.avatar_url,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<Profile> for profiles::Model {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            user_id: profile.user_id,
            username: profile.username,
            first_name: profile.name.first,
            last_name: profile.name.last,
            preferred_name: profile.name.preferred,
            avatar_url: profile.avatar_url,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
            deleted_at: None,
        }
    }
}

impl Subject for Profile {
    const SUBJECT_TYPE: &'static str = PROFILE;

    fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "id" => self.id.into(),
            "userId" => self.user_id.into(),
            "username" => self.username.as_str().into(),
            "name.first" => self.name.first.as_str().into(),
            "name.last" => self.name.last.as_str().into(),
            "name.preferred" => self.name.preferred.clone().into(),
            "avatarUrl" => self.avatar_url.clone().into(),
            _ => return None,
        };
        Some(value)
    }
}

/// Body of a create request. The store assigns `id` and timestamps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub user_id: Uuid,
    pub username: String,
    pub name: ProfileName,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Outer `None` means the key was absent, `Some(None)` an explicit `null`.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePatch {
    pub first: Option<String>,
    pub last: Option<String>,
    /// `null` clears the preferred name.
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub preferred: Option<Option<String>>,
}

/// Body of an update request. Unknown keys (including `id` and `userId`)
/// are ignored, so neither can be changed through a patch. Nullable
/// columns are cleared by an explicit `null`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub name: Option<NamePatch>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_url: Option<Option<String>>,
}

impl ProfilePatch {
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn apply(self, row: &mut profiles::Model) {
        if let Some(username) = self.username {
            row.username = username;
        }
        if let Some(name) = self.name {
            if let Some(first) = name.first {
                row.first_name = first;
            }
            if let Some(last) = name.last {
                row.last_name = last;
            }
            if let Some(preferred) = name.preferred {
                row.preferred_name = preferred;
            }
        }
        if let Some(avatar_url) = self.avatar_url {
            row.avatar_url = avatar_url;
        }
    }
}

use anyhow::{Result, anyhow};
use platform_authn::{Claims, Role};
use products_profiles::{
    NewProfile, Profile, ProfileName, ProfileService, ProfileStore, SYSTEM_USERNAME,
};
use tracing::info;
use uuid::Uuid;

/// User id the `System` profile belongs to.
pub const SYSTEM_USER_ID: Uuid = Uuid::nil();

/// Creates the `System` profile unless it already exists. The insert goes
/// through the service as the system caller.
pub async fn ensure_system_profile<S: ProfileStore>(
    service: &ProfileService<S>,
) -> Result<Profile> {
    if let Some(existing) = service.store().find_by_user_id(SYSTEM_USER_ID).await? {
        info!(profile_id = %existing.id, "system profile present");
        return Ok(existing);
    }

    let caller = Claims::new(SYSTEM_USER_ID, Role::System);
    let input = NewProfile {
        user_id: SYSTEM_USER_ID,
        username: SYSTEM_USERNAME.to_string(),
        name: ProfileName {
            first: SYSTEM_USERNAME.to_string(),
            last: "User".to_string(),
            preferred: None,
        },
        avatar_url: None,
    };
    let created = service
        .create(&caller, input)
        .await
        .map_err(|err| anyhow!("seeding system profile failed: {err}"))?;
    let profile = created.details.profile;
    info!(profile_id = %profile.id, "system profile created");
    Ok(profile)
}

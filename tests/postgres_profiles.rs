use anyhow::Result;
use platform_authn::{Claims, Role};
use platform_db::DbError;
use products_profiles::{
    DeleteMode, NewProfile, ProfileName, ProfilePatch, ProfileService, ProfileStore,
    SYSTEM_USERNAME,
};
use profile_tests::PgTestContext;
use uuid::Uuid;

fn new_profile(user_id: Uuid, username: &str) -> NewProfile {
    NewProfile {
        user_id,
        username: username.to_string(),
        name: ProfileName {
            first: username.to_string(),
            last: "User".into(),
            preferred: None,
        },
        avatar_url: None,
    }
}

#[tokio::test]
async fn unique_indexes_hold_on_postgres() -> Result<()> {
    let Some(ctx) = PgTestContext::new().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return Ok(());
    };
    let store = ctx.store();

    let first = store.create(new_profile(Uuid::new_v4(), "Taken")).await?;
    let err = store
        .create(new_profile(Uuid::new_v4(), "Taken"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)), "got {err:?}");

    let err = store
        .create(new_profile(first.user_id, "Fresh"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)), "got {err:?}");

    ctx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn service_flow_on_postgres() -> Result<()> {
    let Some(ctx) = PgTestContext::new().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return Ok(());
    };
    let svc = ProfileService::new(ctx.store()).with_delete_mode(DeleteMode::Soft);
    let system = Claims::new(Uuid::nil(), Role::System);
    let researcher = Claims::new(Uuid::new_v4(), Role::Researcher);

    let sys_profile = svc
        .create(&system, new_profile(Uuid::nil(), SYSTEM_USERNAME))
        .await?
        .details
        .profile;
    let own = svc
        .create(&system, new_profile(researcher.sub, "Researcher"))
        .await?
        .details
        .profile;

    let updated = svc
        .update(&researcher, own.id, ProfilePatch::username("NewName"))
        .await?;
    assert_eq!(updated.details.profile.username, "NewName");

    let err = svc
        .update(&system, sys_profile.id, ProfilePatch::username("Other"))
        .await
        .unwrap_err();
    assert_eq!(err.status().as_u16(), 403);

    svc.delete(&system, own.id).await?;
    assert_eq!(svc.store().find_by_id(own.id).await?, None);
    let err = svc.get_by_user_id(&researcher, researcher.sub).await.unwrap_err();
    assert_eq!(err.status().as_u16(), 500);

    ctx.cleanup().await;
    Ok(())
}

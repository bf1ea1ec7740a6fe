//! Who may do what to a profile.
//!
//! The table is read top to bottom per role and the last matching entry
//! wins, so each `cannot` below must stay after the `manage` grant it
//! narrows.

use platform_authn::{Claims, Role};
use platform_authz::{Ability, AbilityBuilder, Action, OpDecl, Operand, RuleDecl};

use crate::model::{PROFILE, Profile};

/// Username of the profile owned by the platform itself.
pub const SYSTEM_USERNAME: &str = "System";

const SYSTEM_PROFILE: &[(&str, OpDecl)] =
    &[("username", OpDecl::Eq(Operand::Str(SYSTEM_USERNAME)))];

const OWN_PROFILE: &[(&str, OpDecl)] = &[("userId", OpDecl::Eq(Operand::CallerId))];

pub static PROFILE_RULES: &[RuleDecl<Role>] = &[
    // system
    RuleDecl {
        role: Role::System,
        action: Action::Manage,
        subject: PROFILE,
        condition: &[],
        inverted: false,
    },
    RuleDecl {
        role: Role::System,
        action: Action::Update,
        subject: PROFILE,
        condition: SYSTEM_PROFILE,
        inverted: true,
    },
    RuleDecl {
        role: Role::System,
        action: Action::Delete,
        subject: PROFILE,
        condition: SYSTEM_PROFILE,
        inverted: true,
    },
    // admin
    RuleDecl {
        role: Role::Admin,
        action: Action::Manage,
        subject: PROFILE,
        condition: &[],
        inverted: false,
    },
    RuleDecl {
        role: Role::Admin,
        action: Action::Update,
        subject: PROFILE,
        condition: SYSTEM_PROFILE,
        inverted: true,
    },
    RuleDecl {
        role: Role::Admin,
        action: Action::Delete,
        subject: PROFILE,
        condition: SYSTEM_PROFILE,
        inverted: true,
    },
    // researcher: read everything, update their own
    RuleDecl {
        role: Role::Researcher,
        action: Action::Read,
        subject: PROFILE,
        condition: &[],
        inverted: false,
    },
    RuleDecl {
        role: Role::Researcher,
        action: Action::Update,
        subject: PROFILE,
        condition: OWN_PROFILE,
        inverted: false,
    },
    // annotator: read only
    RuleDecl {
        role: Role::Annotator,
        action: Action::Read,
        subject: PROFILE,
        condition: &[],
        inverted: false,
    },
];

/// Builds the caller's profile ability from [`PROFILE_RULES`].
pub fn profile_ability(claims: &Claims) -> Ability<Profile> {
    AbilityBuilder::from_table(PROFILE_RULES, claims.role().as_ref(), claims.sub).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProfileName;
    use chrono::Utc;
    use platform_authz::Target;
    use uuid::Uuid;

    fn profile(username: &str, user_id: Uuid) -> Profile {
        let now = Utc::now().into();
        Profile {
            id: Uuid::new_v4(),
            user_id,
            username: username.to_string(),
            name: ProfileName {
                first: username.to_string(),
                last: "User".into(),
                preferred: None,
            },
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn ability(role: Role) -> (Claims, Ability<Profile>) {
        let claims = Claims::new(Uuid::new_v4(), role);
        let ability = profile_ability(&claims);
        (claims, ability)
    }

    fn samples(caller: Uuid) -> Vec<Profile> {
        vec![
            profile(SYSTEM_USERNAME, Uuid::nil()),
            profile("Admin", Uuid::new_v4()),
            profile("NewUser", Uuid::new_v4()),
            profile("Mine", caller),
        ]
    }

    #[test]
    fn only_system_and_admin_create() {
        for role in Role::ALL {
            let (_, ability) = ability(role);
            let expected = matches!(role, Role::System | Role::Admin);
            assert_eq!(ability.can(Action::Create, Target::Type), expected, "{role}");
        }
    }

    #[test]
    fn every_role_reads_every_profile() {
        for role in Role::ALL {
            let (claims, ability) = ability(role);
            for target in samples(claims.sub) {
                assert!(ability.can(Action::Read, &target), "{role} {}", target.username);
            }
        }
    }

    #[test]
    fn system_and_admin_update_all_but_the_system_profile() {
        for role in [Role::System, Role::Admin] {
            let (claims, ability) = ability(role);
            for target in samples(claims.sub) {
                let expected = target.username != SYSTEM_USERNAME;
                assert_eq!(ability.can(Action::Update, &target), expected, "{role}");
                assert_eq!(ability.can(Action::Delete, &target), expected, "{role}");
            }
        }
    }

    #[test]
    fn researcher_updates_only_own_profile() {
        let (claims, ability) = ability(Role::Researcher);
        for target in samples(claims.sub) {
            let expected = target.user_id == claims.sub;
            assert_eq!(ability.can(Action::Update, &target), expected);
            assert!(!ability.can(Action::Delete, &target));
        }
    }

    #[test]
    fn annotator_never_writes() {
        let (claims, ability) = ability(Role::Annotator);
        for target in samples(claims.sub) {
            assert!(!ability.can(Action::Update, &target));
            assert!(!ability.can(Action::Delete, &target));
        }
        assert!(!ability.can(Action::Create, Target::Type));
    }

    #[test]
    fn unknown_roles_get_no_rules() {
        let mut claims = Claims::new(Uuid::new_v4(), Role::Admin);
        claims.role = "superuser".into();
        let ability = profile_ability(&claims);
        assert!(ability.rules().is_empty());
        for target in samples(claims.sub) {
            assert!(!ability.can(Action::Read, &target));
        }
    }

    #[test]
    fn system_exceptions_follow_the_manage_grant() {
        for role in [Role::System, Role::Admin] {
            let declared: Vec<_> = PROFILE_RULES.iter().filter(|rule| rule.role == role).collect();
            assert_eq!(declared[0].action, Action::Manage);
            assert!(!declared[0].inverted);
            assert!(declared[1..].iter().all(|rule| rule.inverted));
        }
    }
}

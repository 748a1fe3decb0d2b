//! Property-based tests for the resolution decision table

use proptest::prelude::*;

use whogofixam::client::sync::resolution::{fallback, plan, Plan};
use whogofixam::client::{FallbackSource, Identity, PendingWrite, ProfileUpdate};
use whogofixam::shared::{UserProfile, UserRole};

fn role() -> impl Strategy<Value = Option<UserRole>> {
    prop_oneof![
        Just(None),
        Just(Some(UserRole::Learner)),
        Just(Some(UserRole::SkilledProfessional)),
        Just(Some(UserRole::Customer)),
    ]
}

fn cached() -> impl Strategy<Value = Option<UserProfile>> {
    proptest::option::of(role().prop_map(|role| UserProfile::new("u1").with_role(role)))
}

proptest! {
    #[test]
    fn test_role_bearing_cache_is_always_presented(
        cached in cached(),
        fresh in any::<bool>(),
        offline in any::<bool>(),
    ) {
        let has_role = cached.as_ref().and_then(|p| p.role).is_some();
        match plan(cached, fresh, offline) {
            Plan::UseCache { profile, refresh } => {
                prop_assert!(has_role);
                prop_assert!(profile.role.is_some());
                prop_assert_eq!(refresh, !fresh && !offline);
            }
            Plan::Offline { cached } => {
                prop_assert!(!has_role && offline);
                prop_assert!(cached.map_or(true, |p| p.role.is_none()));
            }
            Plan::Fetch { .. } => prop_assert!(!has_role && !offline),
        }
    }

    #[test]
    fn test_fallback_prefers_cache(cached in cached()) {
        let identity = Identity::new("u1").with_email("a@x.com");
        let expected = cached.clone();
        let (profile, source) = fallback(cached, &identity);
        match expected {
            Some(entry) => {
                prop_assert_eq!(source, FallbackSource::Cache);
                prop_assert_eq!(profile, entry);
            }
            None => {
                prop_assert_eq!(source, FallbackSource::BasicProfile);
                prop_assert_eq!(profile.role, None);
                prop_assert_eq!(profile.email.as_deref(), Some("a@x.com"));
            }
        }
    }

    #[test]
    fn test_pending_writes_keep_latest_role(roles in proptest::collection::vec(
        prop_oneof![
            Just(UserRole::Learner),
            Just(UserRole::SkilledProfessional),
            Just(UserRole::Customer),
        ],
        1..6,
    )) {
        let mut pending: Option<PendingWrite> = None;
        for role in &roles {
            let write = PendingWrite::Update { update: ProfileUpdate::role(*role) };
            pending = Some(match pending {
                Some(earlier) => earlier.merge(write),
                None => write,
            });
        }
        match pending {
            Some(PendingWrite::Update { update }) => {
                prop_assert_eq!(update.role, roles.last().copied());
            }
            other => prop_assert!(false, "unexpected pending write {:?}", other),
        }
    }
}

//! Property-based tests for bazaar-core types.

use proptest::prelude::*;

use crate::spec::fixtures::sample_spec;
use crate::{
    Environment, SemanticVersion, Service, ServiceId, ServiceStatus, ServiceValidator,
    StatusChange,
};

fn validator() -> ServiceValidator {
    ServiceValidator::new(Environment::Production)
}

/// Strategy for generating release versions.
fn version_strategy() -> impl Strategy<Value = (u64, u64, u64)> {
    (0u64..50, 0u64..50, 0u64..50)
}

/// Strategy for generating pre-release identifier lists.
fn pre_release_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("(alpha|beta|rc|[1-9][0-9]{0,2})", 1..4)
}

fn status_strategy() -> impl Strategy<Value = ServiceStatus> {
    prop::sample::select(ServiceStatus::ALL.to_vec())
}

proptest! {
    /// Valid catalog names are never rejected for their shape.
    #[test]
    fn valid_names_accepted(name in "[a-z][a-z0-9-]{2,40}") {
        let mut spec = sample_spec();
        spec.name = name;
        prop_assert!(!validator().validate(&spec).errors.has_field("name"));
    }

    /// Names starting with a digit or containing uppercase are rejected.
    #[test]
    fn invalid_names_rejected(name in "([0-9][a-z]{3,10}|[a-z]{2,8}[A-Z][a-z]{1,5})") {
        let mut spec = sample_spec();
        spec.name = name;
        prop_assert!(validator().validate(&spec).errors.has_field("name"));
    }

    /// The update rule accepts exactly the strictly greater versions.
    #[test]
    fn version_update_matches_ordering(a in version_strategy(), b in version_strategy()) {
        let old = format!("{}.{}.{}", a.0, a.1, a.2);
        let new = format!("{}.{}.{}", b.0, b.1, b.2);
        let report = validator().validate_version_update(&old, &new);
        prop_assert_eq!(report.valid, b > a);
    }

    /// A pre-release always sorts below its release.
    #[test]
    fn pre_release_below_release(v in version_strategy(), pre in pre_release_strategy()) {
        let release = SemanticVersion::new(v.0, v.1, v.2);
        let pre_release = SemanticVersion::parse(&format!("{release}-{}", pre.join("."))).unwrap();
        prop_assert!(pre_release < release);
    }

    /// Display output parses back to an equal version.
    #[test]
    fn version_display_parses(v in version_strategy(), pre in prop::option::of(pre_release_strategy())) {
        let text = match pre {
            Some(pre) => format!("{}.{}.{}-{}", v.0, v.1, v.2, pre.join(".")),
            None => format!("{}.{}.{}", v.0, v.1, v.2),
        };
        let parsed = SemanticVersion::parse(&text).unwrap();
        prop_assert_eq!(parsed.to_string(), text);
    }

    /// Availability is accepted exactly within (0, 100].
    #[test]
    fn availability_range(availability in -50.0f64..150.0) {
        let mut spec = sample_spec();
        spec.sla.availability = availability;
        let in_range = availability > 0.0 && availability <= 100.0;
        prop_assert_eq!(
            !validator().validate(&spec).errors.has_field("sla.availability"),
            in_range
        );
    }

    /// A rejected status change never mutates the record.
    #[test]
    fn rejected_transition_leaves_record_unchanged(
        from in status_strategy(),
        to in status_strategy(),
        administrative in any::<bool>(),
    ) {
        let mut service = Service::new(ServiceId::generate(), "provider-1", sample_spec(), None);
        service.status = from;
        let before = service.clone();

        let change = if administrative {
            StatusChange::administrative(to)
        } else {
            StatusChange::to(to)
        };

        match service.apply_status(change) {
            Ok(()) => prop_assert_eq!(service.status, to),
            Err(_) => prop_assert_eq!(service, before),
        }
    }

    /// Terminal statuses accept no transition at all.
    #[test]
    fn terminal_is_final(to in status_strategy(), administrative in any::<bool>()) {
        for from in [ServiceStatus::Retired, ServiceStatus::FailedValidation] {
            let change = if administrative {
                StatusChange::administrative(to)
            } else {
                StatusChange::to(to)
            };
            prop_assert!(from.check_transition(change).is_err());
        }
    }
}

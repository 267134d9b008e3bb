//! Property tests for environment merging.

use proptest::prelude::*;
use samrun::credentials::AwsCredentials;
use samrun::launcher::merge_env;
use std::collections::BTreeMap;

fn env_key() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,15}"
}

proptest! {
    /// Every user variable survives the merge unmodified, even when it
    /// collides with an injected key.
    #[test]
    fn user_vars_always_win(
        user in proptest::collection::btree_map(env_key(), "[ -~]{0,20}", 0..8),
        region in "[a-z]{2}-[a-z]{4,9}-[1-9]",
    ) {
        let creds = AwsCredentials::basic("Access", "ItsASecret");
        let merged: BTreeMap<String, String> =
            merge_env(&user, Some(&creds), &region).into_iter().collect();

        for (key, value) in &user {
            prop_assert_eq!(merged.get(key), Some(value));
        }
    }

    /// Injected credential and region keys are present whenever the user
    /// did not override them.
    #[test]
    fn injections_present_unless_overridden(
        user in proptest::collection::btree_map(env_key(), "[ -~]{0,20}", 0..8),
    ) {
        let creds = AwsCredentials::basic("Access", "ItsASecret");
        let merged: BTreeMap<String, String> =
            merge_env(&user, Some(&creds), "us-east-1").into_iter().collect();

        for key in ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_REGION"] {
            if !user.contains_key(key) {
                prop_assert!(merged.contains_key(key), "missing {}", key);
            }
        }
    }

    /// Merging is deterministic: same inputs, same ordered output.
    #[test]
    fn merge_is_deterministic(
        user in proptest::collection::btree_map(env_key(), "[ -~]{0,20}", 0..8),
    ) {
        let creds = AwsCredentials::basic("Access", "ItsASecret");
        let first = merge_env(&user, Some(&creds), "us-east-1");
        let second = merge_env(&user, Some(&creds), "us-east-1");
        prop_assert_eq!(first, second);
    }
}

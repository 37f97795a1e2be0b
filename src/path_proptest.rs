//! Property-based tests for destination path functions.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{
        encode_path_component, normalize_destination, validate_destination, validate_source,
    };
    use proptest::prelude::*;

    // ============================================================================
    // encode_path_component property tests
    // ============================================================================

    proptest! {
        /// Property: encode_path_component never produces filesystem-unsafe characters
        #[test]
        fn encode_never_produces_unsafe_chars(input in ".*") {
            let result = encode_path_component(&input);
            let unsafe_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
            for ch in unsafe_chars {
                prop_assert!(
                    !result.contains(ch),
                    "encode_path_component produced unsafe character '{}' from input '{}'",
                    ch,
                    input
                );
            }
        }

        /// Property: output is plain ASCII from a small safe alphabet
        #[test]
        fn encode_uses_safe_alphabet(input in ".*") {
            let result = encode_path_component(&input);
            prop_assert!(result
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '%')));
        }

        /// Property: distinct inputs never share an encoding
        #[test]
        fn encode_is_injective(a in "[a-z/_ @%-]{0,12}", b in "[a-z/_ @%-]{0,12}") {
            prop_assume!(a != b);
            prop_assert_ne!(encode_path_component(&a), encode_path_component(&b));
        }
    }

    // ============================================================================
    // normalize / validate property tests
    // ============================================================================

    proptest! {
        /// Property: normalization is idempotent
        #[test]
        fn normalize_is_idempotent(input in "[a-z./\\\\]{0,24}") {
            let once = normalize_destination(&input);
            let twice = normalize_destination(&once);
            prop_assert_eq!(once, twice);
        }

        /// Property: anything containing a `..` segment is rejected
        #[test]
        fn parent_segments_always_rejected(
            prefix in "([a-z]{1,6}/){0,3}",
            suffix in "(/[a-z]{1,6}){0,3}",
        ) {
            let path = format!("{}..{}", prefix, suffix);
            prop_assert!(validate_destination("v", &path).is_err());
        }

        /// Property: a source with a `..` segment never reaches the checkout
        #[test]
        fn parent_segments_in_sources_rejected(
            prefix in "([a-z]{1,6}/){0,3}",
            suffix in "(/[a-z]{1,6}){0,3}",
        ) {
            let path = format!("{}..{}", prefix, suffix);
            prop_assert!(validate_source("v", &path).is_err());
        }

        /// Property: anything starting with a separator is rejected
        #[test]
        fn absolute_paths_always_rejected(rest in "[a-z/]{0,20}") {
            let path = format!("/{}", rest);
            prop_assert!(validate_destination("v", &path).is_err());
        }

        /// Property: accepted destinations are already normalized and stay relative
        #[test]
        fn accepted_paths_are_normalized(input in "([a-z0-9_-]{1,8}/){0,4}[a-z0-9_.-]{1,8}") {
            if let Ok(normalized) = validate_destination("v", &input) {
                prop_assert_eq!(normalize_destination(&normalized), normalized.clone());
                prop_assert!(!normalized.starts_with('/'));
                prop_assert!(!normalized.split('/').any(|s| s == ".."));
            }
        }
    }
}

//! Bidirectional canonical-name / snake_case alias table
//!
//! Mini-app forms and persisted task payloads often spell canonical fields
//! in snake_case. Instead of converting names by string manipulation, every
//! pair is listed here once. The table is checked for duplicates on either
//! side at compile time.

/// `(canonical, snake_case alias)` pairs
pub const FIELD_NAME_TABLE: &[(&str, &str)] = &[
    ("productName", "product_name"),
    ("productDescription", "product_description"),
    ("targetAudience", "target_audience"),
    ("brandVoice", "brand_voice"),
    ("industry", "industry"),
    ("businessType", "business_type"),
    ("marketingBudget", "marketing_budget"),
    ("primaryGoal", "primary_goal"),
    ("uniqueValueProposition", "unique_value_proposition"),
    ("keyFeatures", "key_features"),
    ("competitors", "competitors"),
    ("websiteUrl", "website_url"),
    ("contactEmail", "contact_email"),
    ("callToAction", "call_to_action"),
    ("keywords", "keywords"),
    ("contentTopic", "content_topic"),
    ("contentLength", "content_length"),
    ("wordCount", "word_count"),
    ("includeEmojis", "include_emojis"),
];

const fn str_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn table_is_bijective(table: &[(&str, &str)]) -> bool {
    let mut i = 0;
    while i < table.len() {
        let mut j = i + 1;
        while j < table.len() {
            if str_eq(table[i].0, table[j].0) || str_eq(table[i].1, table[j].1) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    table_is_bijective(FIELD_NAME_TABLE),
    "FIELD_NAME_TABLE must not repeat a canonical name or an alias"
);

/// snake_case alias for a canonical name
pub fn alias_of(canonical: &str) -> Option<&'static str> {
    FIELD_NAME_TABLE
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, alias)| *alias)
}

/// Canonical name for a snake_case alias
pub fn canonical_for_alias(alias: &str) -> Option<&'static str> {
    FIELD_NAME_TABLE
        .iter()
        .find(|(_, a)| *a == alias)
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldRegistry;

    #[test]
    fn lookups_are_inverse() {
        for (canonical, alias) in FIELD_NAME_TABLE {
            assert_eq!(alias_of(canonical), Some(*alias));
            assert_eq!(canonical_for_alias(alias), Some(*canonical));
        }
    }

    #[test]
    fn table_matches_builtin_registry() {
        let registry = FieldRegistry::builtin();
        let mut registered: Vec<&str> = registry.names().collect();
        let mut listed: Vec<&str> = FIELD_NAME_TABLE.iter().map(|(c, _)| *c).collect();
        registered.sort_unstable();
        listed.sort_unstable();
        assert_eq!(registered, listed);
    }

    #[test]
    fn unknown_alias() {
        assert_eq!(canonical_for_alias("custom_x"), None);
        assert_eq!(alias_of("custom_x"), None);
    }

    #[test]
    fn detects_duplicates() {
        assert!(!table_is_bijective(&[("a", "x"), ("b", "x")]));
        assert!(!table_is_bijective(&[("a", "x"), ("a", "y")]));
        assert!(table_is_bijective(&[("a", "x"), ("b", "y")]));
    }
}

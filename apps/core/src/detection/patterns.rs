//! Built-in entity patterns.
//!
//! Order matters: detection output follows this list, then match order.

use regex::Regex;
use std::sync::LazyLock;

pub struct EntityPattern {
    /// Entity type reported for matches; also the name of the seeded system entity.
    pub entity_type: &'static str,
    pub regex: Regex,
}

// NOTE: expect() is acceptable here, the patterns are constants.
pub static ENTITY_PATTERNS: LazyLock<Vec<EntityPattern>> = LazyLock::new(|| {
    vec![
        EntityPattern {
            entity_type: "email",
            regex: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
                .expect("Invalid regex: email pattern"),
        },
        EntityPattern {
            entity_type: "phone_number",
            regex: Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b")
                .expect("Invalid regex: phone pattern"),
        },
        EntityPattern {
            entity_type: "url",
            regex: Regex::new(r"\bhttps?://[^\s]*[^\s.,;:!?)\]]")
                .expect("Invalid regex: url pattern"),
        },
        EntityPattern {
            entity_type: "date",
            regex: Regex::new(
                r"(?i)\b(?:today|tomorrow|yesterday|tonight|next (?:week|month|year|monday|tuesday|wednesday|thursday|friday|saturday|sunday)|this (?:week|weekend|morning|afternoon|evening)|monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
            )
            .expect("Invalid regex: relative date pattern"),
        },
        EntityPattern {
            entity_type: "location",
            regex: Regex::new(
                r"(?i)\b(?:New York|Los Angeles|San Francisco|Chicago|London|Paris|Berlin|Tokyo|Sydney|Toronto|Madrid|Rome|Amsterdam|Dubai|Singapore)\b",
            )
            .expect("Invalid regex: city pattern"),
        },
        EntityPattern {
            entity_type: "person",
            regex: Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").expect("Invalid regex: name pattern"),
        },
        EntityPattern {
            entity_type: "number",
            regex: Regex::new(r"\b\d+\b").expect("Invalid regex: integer pattern"),
        },
    ]
});

//! Property-based invariant tests for the property path parser.
//!
//! 1. Parsing is idempotent through the canonical spelling.
//! 2. Canonical spelling is a fixed point.
//! 3. The parser never panics on arbitrary input.
//! 4. Segment count matches the generated structure.
//! 5. The cache returns paths equal to uncached parses.

use fbind_core::{Path, PathSegment};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

fn ident() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_]{0,6}"
}

fn quoted() -> impl Strategy<Value = String> {
    "[a-z \"'\\\\]{0,6}".prop_map(|raw| {
        let mut out = String::from("\"");
        for c in raw.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    })
}

fn literal() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i64>().prop_map(|n| n.to_string()),
        (-1.0e6f64..1.0e6).prop_map(|x| format!("{x:?}")),
        quoted(),
        Just("true".to_owned()),
        Just("false".to_owned()),
        Just("null".to_owned()),
    ]
}

fn nested_path() -> impl Strategy<Value = String> {
    proptest::collection::vec(ident(), 1..=3).prop_map(|parts| parts.join("."))
}

fn arg() -> impl Strategy<Value = String> {
    prop_oneof![3 => literal(), 1 => nested_path()]
}

fn indexer() -> impl Strategy<Value = String> {
    proptest::collection::vec(arg(), 1..=3).prop_map(|args| format!("[{}]", args.join(",")))
}

/// Generated path text plus its expected segment count.
fn path_text() -> impl Strategy<Value = (String, usize)> {
    let step = prop_oneof![
        ident().prop_map(|name| format!(" . {name}")),
        indexer(),
    ];
    (ident(), proptest::collection::vec(step, 0..=5)).prop_map(|(first, steps)| {
        let count = 1 + steps.len();
        (format!("{first}{}", steps.concat()), count)
    })
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Canonical spelling
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn parse_is_idempotent((text, _) in path_text()) {
        let parsed = Path::parse_uncached(&text).unwrap();
        let reparsed = Path::parse_uncached(&parsed.to_text()).unwrap();
        prop_assert_eq!(&parsed, &reparsed);
    }

    #[test]
    fn canonical_text_is_fixed_point((text, _) in path_text()) {
        let canonical = Path::parse_uncached(&text).unwrap().to_text();
        let again = Path::parse_uncached(&canonical).unwrap().to_text();
        prop_assert_eq!(canonical, again);
    }

    // ═════════════════════════════════════════════════════════════════════
    // 3. Robustness
    // ═════════════════════════════════════════════════════════════════════

    #[test]
    fn arbitrary_input_never_panics(text in "\\PC{0,24}") {
        if let Ok(parsed) = Path::parse_uncached(&text) {
            let reparsed = Path::parse_uncached(&parsed.to_text()).unwrap();
            prop_assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn bracket_soup_never_panics(text in "[A-Za-z0-9\\.\\[\\], '\"-]{0,16}") {
        let _ = Path::parse_uncached(&text);
    }

    // ═════════════════════════════════════════════════════════════════════
    // 4-5. Structure and cache
    // ═════════════════════════════════════════════════════════════════════

    #[test]
    fn segment_count_matches((text, count) in path_text()) {
        let parsed = Path::parse_uncached(&text).unwrap();
        prop_assert_eq!(parsed.len(), count);
        prop_assert!(matches!(parsed.segments()[0], PathSegment::Member(_)));
    }

    #[test]
    fn cached_parse_matches_uncached((text, _) in path_text()) {
        let cached = Path::parse(&text).unwrap();
        let fresh = Path::parse_uncached(&text).unwrap();
        prop_assert_eq!(&*cached, &fresh);
    }
}

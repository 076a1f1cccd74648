#![no_main]

use fbind_core::Path;
use libfuzzer_sys::fuzz_target;

// Arbitrary text never panics the parser, and whatever parses survives a
// trip through its canonical spelling.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = Path::parse_uncached(text) else {
        return;
    };
    let canonical = path.to_text();
    let reparsed = Path::parse_uncached(&canonical)
        .unwrap_or_else(|err| panic!("canonical text {canonical:?} rejected: {err}"));
    assert_eq!(path, reparsed, "canonical text {canonical:?} changed meaning");
});

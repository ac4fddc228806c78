#![no_main]

//! Fuzz target for manifest parsing
//!
//! Parses arbitrary text; whatever parses must serialize back to text that
//! parses to the same manifest.

use libfuzzer_sys::fuzz_target;
use scoped_injector::{DiError, Manifest};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    match Manifest::parse(text) {
        Ok(manifest) => {
            let emitted = manifest.to_string();
            let reparsed = Manifest::parse(&emitted).expect("emitted manifest must parse");
            assert_eq!(manifest, reparsed);

            for (component, scope) in manifest.iter() {
                assert!(!component.is_empty());
                assert_eq!(manifest.scope_of(component), Some(scope));
                assert!(manifest.components_in(scope).any(|c| c == component));
            }
        }
        Err(DiError::Manifest { line, .. }) => {
            assert!(line >= 1 && line <= text.lines().count().max(1));
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
});

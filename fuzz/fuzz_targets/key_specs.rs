//! Fuzz target for sort and index key spec parsing.
//!
//! Specs usually come straight from request parameters, so the parsers must
//! reject bad input with an error rather than panic.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_key_specs
//! ```

#![no_main]

use arbitrary::Arbitrary;
use dbhandle_mongodb::query::{index_keys, sort_document};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct KeySpecs {
    sort: String,
    index: Vec<String>,
}

fuzz_target!(|input: KeySpecs| {
    if let Ok(Some(sort)) = sort_document(&input.sort) {
        assert!(!sort.is_empty());
    }

    if let Ok(keys) = index_keys(input.index.as_slice()) {
        assert!(!keys.is_empty());
        assert!(keys.len() <= input.index.len());
    }
});

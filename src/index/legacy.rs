//! Legacy (version 1) blinding.
//!
//! The first-generation algorithm signs raw UTF-8 bytes with the HMAC, no
//! SHA-256 preprocessing and no name salting, and joins compound inputs
//! with ASCII `:`. Values canonicalize as plain `JSON.stringify` output
//! (object members in insertion order), not RFC 8785 form. Documents
//! blinded this way still exist on servers, so these outputs must stay
//! bit-exact for one-shot migration; never unify this with the current
//! algorithm.

use serde_json::Value;

use crate::index::blind::SignInputs;

/// `JSON.stringify`-shaped canonicalization: minimal separators,
/// insertion-ordered members.
pub fn legacy_stringify(value: &Value) -> String {
    value.to_string()
}

/// Sign inputs for a simple attribute.
pub fn legacy_simple_inputs(name: &str, value: &Value, unique: bool) -> SignInputs {
    SignInputs {
        name: name.as_bytes().to_vec(),
        value: legacy_stringify(value).into_bytes(),
        unique,
    }
}

/// Sign inputs for a compound prefix: names and stringified values are
/// each joined with `:` before signing.
pub fn legacy_compound_inputs(names: &[&str], values: &[String], unique: bool) -> SignInputs {
    SignInputs {
        name: names.join(":").into_bytes(),
        value: values.join(":").into_bytes(),
        unique,
    }
}

/// The name bytes signed for a compound prefix, used by `has` queries.
pub fn legacy_compound_name(names: &[&str]) -> Vec<u8> {
    names.join(":").into_bytes()
}

//! Hash and blind stages of index construction.
//!
//! Stage one is HMAC-independent: attribute names and canonicalized
//! values become SHA-256 digests. Stage two signs those digests through
//! an HMAC identity; the value digest is salted with the name digest
//! first, so the same plaintext indexed under two different names cannot
//! be cross-correlated.

use serde_json::Value;

use crate::config::HMAC_SIZE;
use crate::primitives::{canonicalize, sha256, sha256_concat};

/// Stage-one output for one attribute occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedAttribute {
    pub name: [u8; HMAC_SIZE],
    pub value: [u8; HMAC_SIZE],
}

/// The exact byte inputs handed to the HMAC for one index record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignInputs {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub unique: bool,
}

/// Hashes one `(name, value)` pair.
///
/// The value is canonicalized first so equivalent JSON values produce
/// identical digests.
pub fn hash_attribute(name: &str, value: &Value) -> HashedAttribute {
    HashedAttribute {
        name: sha256(name.as_bytes()),
        value: sha256(canonicalize(value).as_bytes()),
    }
}

/// Salts a value digest with its name digest.
fn salted_value(name: &[u8; HMAC_SIZE], value: &[u8; HMAC_SIZE]) -> [u8; HMAC_SIZE] {
    sha256_concat(&[name, value])
}

/// Sign inputs for a simple attribute.
pub fn simple_inputs(hashed: &HashedAttribute, unique: bool) -> SignInputs {
    SignInputs {
        name: hashed.name.to_vec(),
        value: salted_value(&hashed.name, &hashed.value).to_vec(),
        unique,
    }
}

/// The compound name digest for a prefix of name digests.
pub fn compound_name(names: &[[u8; HMAC_SIZE]]) -> [u8; HMAC_SIZE] {
    let refs: Vec<&[u8]> = names.iter().map(<[u8; HMAC_SIZE]>::as_slice).collect();
    sha256_concat(&refs)
}

/// Sign inputs for a compound prefix of two or more hashed attributes.
///
/// The prefix's name and value digests are concatenated and re-hashed,
/// then blinded exactly like a simple pair.
pub fn compound_inputs(prefix: &[&HashedAttribute], unique: bool) -> SignInputs {
    let names: Vec<[u8; HMAC_SIZE]> = prefix.iter().map(|h| h.name).collect();
    let name = compound_name(&names);
    let values: Vec<&[u8]> = prefix.iter().map(|h| h.value.as_slice()).collect();
    let value = sha256_concat(&values);
    SignInputs {
        name: name.to_vec(),
        value: salted_value(&name, &value).to_vec(),
        unique,
    }
}

/// Every combination choosing one hashed value per list, in list order.
pub fn cross_product<'a>(lists: &'a [Vec<HashedAttribute>]) -> Vec<Vec<&'a HashedAttribute>> {
    let mut combos: Vec<Vec<&HashedAttribute>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for combo in &combos {
            for item in list {
                let mut extended = combo.clone();
                extended.push(item);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_hash_is_canonical() {
        let a = hash_attribute("content.k", &serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap());
        let b = hash_attribute("content.k", &serde_json::from_str(r#"{"a":2, "b":1}"#).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_salting_isolates_names() {
        let v = json!("same value");
        let a = simple_inputs(&hash_attribute("content.a", &v), false);
        let b = simple_inputs(&hash_attribute("content.b", &v), false);
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn test_simple_inputs_deterministic() {
        let h = hash_attribute("content.k", &json!("v"));
        assert_eq!(simple_inputs(&h, false), simple_inputs(&h, false));
    }

    #[test]
    fn test_compound_prefix_lengths_differ() {
        let a = hash_attribute("content.a", &json!(1));
        let b = hash_attribute("content.b", &json!(2));
        let c = hash_attribute("content.c", &json!(3));

        let two = compound_inputs(&[&a, &b], false);
        let three = compound_inputs(&[&a, &b, &c], false);
        assert_ne!(two.name, three.name);
        assert_ne!(two.value, three.value);
    }

    #[test]
    fn test_compound_differs_from_simple() {
        let a = hash_attribute("content.a", &json!(1));
        // A compound of one is still re-hashed and so differs from the
        // simple encoding; callers use the simple form at length 1.
        assert_ne!(compound_inputs(&[&a], false).name, simple_inputs(&a, false).name);
    }

    #[test]
    fn test_cross_product_counts() {
        let lists = vec![
            vec![hash_attribute("a", &json!(1)), hash_attribute("a", &json!(2))],
            vec![hash_attribute("b", &json!(1))],
            vec![hash_attribute("c", &json!(1)), hash_attribute("c", &json!(2))],
        ];
        assert_eq!(cross_product(&lists[..1]).len(), 2);
        assert_eq!(cross_product(&lists[..2]).len(), 2);
        assert_eq!(cross_product(&lists[..3]).len(), 4);
    }
}

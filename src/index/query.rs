//! Blinded query construction.
//!
//! `equals` clauses blind every name/value pair, then replace runs that
//! match the leading attributes of a declared compound index with a
//! single compound token. `has` clauses blind names only; the server
//! checks existence. Exactly one of the two may be supplied.

use std::collections::BTreeMap;

use hashbrown::HashSet;

use crate::config::HMAC_SIZE;
use crate::error::{Error, Result};
use crate::index::attribute::AttributePath;
use crate::index::blind::{
    HashedAttribute, SignInputs, compound_inputs, compound_name, hash_attribute, simple_inputs,
};
use crate::index::legacy::{legacy_compound_inputs, legacy_compound_name, legacy_simple_inputs, legacy_stringify};
use crate::index::{IndexHelper, IndexVersion};
use crate::keys::HmacSigner;
use crate::primitives::encoding::base64url_encode;
use crate::primitives::sha256;
use crate::transport::Query;
use crate::types::JsonObject;

impl IndexHelper {
    /// Builds the blinded query for one HMAC identity.
    ///
    /// # Errors
    /// `InvalidArgument` unless exactly one of `equals`/`has` is given,
    /// or when a clause names an invalid attribute path.
    pub async fn build_query(
        &self,
        hmac: &dyn HmacSigner,
        equals: Option<&[JsonObject]>,
        has: Option<&[String]>,
        count: bool,
        limit: Option<u32>,
    ) -> Result<Query> {
        if equals.is_some() == has.is_some() {
            return Err(Error::invalid_argument(
                "exactly one of equals or has is required",
            ));
        }

        let mut query = Query {
            index: hmac.id().to_string(),
            count,
            limit,
            ..Query::default()
        };

        if let Some(clauses) = equals {
            for clause in clauses {
                query.equals.push(self.equals_clause(hmac, clause).await?);
            }
        }
        if let Some(names) = has {
            query.has = self.has_names(hmac, names).await?;
        }
        Ok(query)
    }

    async fn equals_clause(
        &self,
        hmac: &dyn HmacSigner,
        clause: &JsonObject,
    ) -> Result<BTreeMap<String, String>> {
        let inputs = match self.version() {
            IndexVersion::V2 => equals_inputs_v2(self, clause)?,
            IndexVersion::V1 => equals_inputs_v1(self, clause)?,
        };

        let mut out = BTreeMap::new();
        for input in inputs {
            out.insert(
                base64url_encode(&self.signed(hmac, &input.name).await?),
                base64url_encode(&self.signed(hmac, &input.value).await?),
            );
        }
        Ok(out)
    }

    async fn has_names(&self, hmac: &dyn HmacSigner, names: &[String]) -> Result<Vec<String>> {
        let tokens = match self.version() {
            IndexVersion::V2 => has_inputs_v2(self, names)?,
            IndexVersion::V1 => has_inputs_v1(self, names)?,
        };

        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            out.push(base64url_encode(&self.signed(hmac, &token).await?));
        }
        Ok(out)
    }
}

fn equals_inputs_v2(helper: &IndexHelper, clause: &JsonObject) -> Result<Vec<SignInputs>> {
    let mut hashed: Vec<(String, HashedAttribute)> = Vec::with_capacity(clause.len());
    for (name, value) in clause {
        AttributePath::parse(name)?;
        hashed.push((name.clone(), hash_attribute(name, value)));
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut inputs: Vec<SignInputs> = Vec::new();

    for compound in helper.compound_declarations() {
        let prefix = matching_prefix(&compound, |name| hashed.iter().any(|(n, _)| n == name));
        if prefix < 2 {
            continue;
        }
        let attrs: Vec<&HashedAttribute> = compound[..prefix]
            .iter()
            .map(|name| {
                hashed
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, h)| h)
                    .expect("prefix attributes are present in the clause")
            })
            .collect();
        inputs.push(compound_inputs(&attrs, false));
        used.extend(compound[..prefix].iter().cloned());
    }

    for (name, h) in &hashed {
        if !used.contains(name) {
            inputs.push(simple_inputs(h, false));
        }
    }
    Ok(inputs)
}

fn equals_inputs_v1(helper: &IndexHelper, clause: &JsonObject) -> Result<Vec<SignInputs>> {
    for name in clause.keys() {
        AttributePath::parse(name)?;
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut inputs: Vec<SignInputs> = Vec::new();

    for compound in helper.compound_declarations() {
        let prefix = matching_prefix(&compound, |name| clause.contains_key(name));
        if prefix < 2 {
            continue;
        }
        let names: Vec<&str> = compound[..prefix].iter().map(String::as_str).collect();
        let values: Vec<String> = names
            .iter()
            .map(|name| legacy_stringify(&clause[*name]))
            .collect();
        inputs.push(legacy_compound_inputs(&names, &values, false));
        used.extend(compound[..prefix].iter().cloned());
    }

    for (name, value) in clause {
        if !used.contains(name) {
            inputs.push(legacy_simple_inputs(name, value, false));
        }
    }
    Ok(inputs)
}

fn has_inputs_v2(helper: &IndexHelper, names: &[String]) -> Result<Vec<Vec<u8>>> {
    let mut hashed: Vec<(String, [u8; HMAC_SIZE])> = Vec::with_capacity(names.len());
    for name in names {
        AttributePath::parse(name)?;
        hashed.push((name.clone(), sha256(name.as_bytes())));
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut tokens: Vec<Vec<u8>> = Vec::new();

    for compound in helper.compound_declarations() {
        let prefix = matching_prefix(&compound, |name| hashed.iter().any(|(n, _)| n == name));
        if prefix < 2 {
            continue;
        }
        let name_hashes: Vec<[u8; HMAC_SIZE]> = compound[..prefix]
            .iter()
            .map(|name| {
                hashed
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, h)| *h)
                    .expect("prefix attributes are present in the name list")
            })
            .collect();
        tokens.push(compound_name(&name_hashes).to_vec());
        used.extend(compound[..prefix].iter().cloned());
    }

    for (name, h) in &hashed {
        if !used.contains(name) {
            tokens.push(h.to_vec());
        }
    }
    Ok(tokens)
}

fn has_inputs_v1(helper: &IndexHelper, names: &[String]) -> Result<Vec<Vec<u8>>> {
    for name in names {
        AttributePath::parse(name)?;
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut tokens: Vec<Vec<u8>> = Vec::new();

    for compound in helper.compound_declarations() {
        let prefix = matching_prefix(&compound, |name| names.iter().any(|n| n == name));
        if prefix < 2 {
            continue;
        }
        let prefix_names: Vec<&str> = compound[..prefix].iter().map(String::as_str).collect();
        tokens.push(legacy_compound_name(&prefix_names));
        used.extend(compound[..prefix].iter().cloned());
    }

    for name in names {
        if !used.contains(name) {
            tokens.push(name.as_bytes().to_vec());
        }
    }
    Ok(tokens)
}

/// How many leading attributes of `compound` satisfy `present`.
fn matching_prefix(compound: &[String], present: impl Fn(&str) -> bool) -> usize {
    compound.iter().take_while(|name| present(name)).count()
}

//! Keyword profiles
//!
//! A profile is a named JSON document (`config/<NAME>.json`) holding the keyword
//! lists used by the make-ready matcher plus a handful of processing switches.
//! Keyword lists are stored the way operators type them: one comma separated
//! string per list. Arrays are accepted too.

use crate::error::{Error, Result};
use crate::types::{AuxSlot, Category};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Keys older tool versions wrote into profile files
const LEGACY_KEYS: &[&str] = &["configurations", "selected_config", "0", "1"];

pub const DEFAULT_POWER_LABEL: &str = "POWER";

/// Split a comma separated string into trimmed, non-empty keywords
pub fn parse_keywords(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|kw| !kw.is_empty())
        .map(str::to_string)
        .collect()
}

mod keyword_list {
    use super::parse_keywords;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Csv(String),
        List(Vec<String>),
        Null(()),
    }

    pub fn serialize<S: Serializer>(keywords: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&keywords.join(", "))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Csv(s) => parse_keywords(&s),
            Raw::List(items) => items
                .iter()
                .flat_map(|item| parse_keywords(item))
                .collect(),
            Raw::Null(()) => Vec::new(),
        })
    }
}

/// The four keyword lists driving Aux Data 4 and 5
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    #[serde(default, alias = "comm_owners", with = "keyword_list")]
    pub comm_keywords: Vec<String>,
    #[serde(default, alias = "power_owners", with = "keyword_list")]
    pub power_keywords: Vec<String>,
    #[serde(default, with = "keyword_list")]
    pub pco_keywords: Vec<String>,
    #[serde(default, with = "keyword_list")]
    pub aux5_keywords: Vec<String>,
}

/// Custom assignment: when any keyword occurs in the notes, `slot` gets `value`.
/// Rules are evaluated in declared order and the first hit claims the slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub slot: AuxSlot,
    #[serde(with = "keyword_list")]
    pub keywords: Vec<String>,
    pub value: String,
}

fn default_power_label() -> String {
    DEFAULT_POWER_LABEL.to_string()
}

fn default_owner() -> String {
    AuxSlot::OWNER.default_value().unwrap_or_default().to_string()
}

/// Job profile (e.g. `OPPD.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, alias = "comm_owners", with = "keyword_list")]
    pub comm_keywords: Vec<String>,

    #[serde(default, alias = "power_owners", with = "keyword_list")]
    pub power_keywords: Vec<String>,

    #[serde(default, with = "keyword_list")]
    pub pco_keywords: Vec<String>,

    #[serde(default, with = "keyword_list")]
    pub aux5_keywords: Vec<String>,

    /// Replaces "POWER" in Aux Data 4 output (e.g. "OPPD MAKE READY")
    #[serde(default = "default_power_label")]
    pub power_label: String,

    /// Fill Aux Data 1 from `pole_tag_company`
    #[serde(default)]
    pub auto_fill_aux1: bool,

    /// Fill Aux Data 2 from `pole_tag_tagtext`
    #[serde(default)]
    pub auto_fill_aux2: bool,

    /// Comma separated words stripped from the SCID to build the pole number
    #[serde(default)]
    pub ignore_scid_keywords: String,

    /// Manually entered values, keyed `aux_data_<n>`
    #[serde(default)]
    pub last_aux_values: BTreeMap<String, String>,

    /// Owner written by the fill-details rule set when the sheet has none
    #[serde(default = "default_owner")]
    pub default_owner: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<KeywordRule>,

    /// Per-category keyword overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<Category, KeywordSet>,

    /// Keys this version does not interpret (kept on save)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            comm_keywords: Vec::new(),
            power_keywords: Vec::new(),
            pco_keywords: Vec::new(),
            aux5_keywords: Vec::new(),
            power_label: default_power_label(),
            auto_fill_aux1: false,
            auto_fill_aux2: false,
            ignore_scid_keywords: String::new(),
            last_aux_values: BTreeMap::new(),
            default_owner: default_owner(),
            rules: Vec::new(),
            categories: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl Profile {
    /// Parse a profile document, dropping legacy keys
    pub fn from_json(json: &str) -> Result<Self> {
        let mut profile: Self = serde_json::from_str(json)?;
        for key in LEGACY_KEYS {
            profile.extra.remove(*key);
        }
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject rules the matcher cannot honour
    pub fn validate(&self) -> Result<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            let number = rule.slot.number();
            if number == AuxSlot::CONDITION.number() {
                return Err(Error::Profile(format!(
                    "rule {} targets Aux Data 3, which always holds the category",
                    index + 1
                )));
            }
            if !AuxSlot::matched().any(|slot| slot == rule.slot) {
                return Err(Error::Profile(format!(
                    "rule {} targets Aux Data {}, only 1-5 are matched",
                    index + 1,
                    number
                )));
            }
            if rule.keywords.is_empty() {
                return Err(Error::Profile(format!("rule {} has no keywords", index + 1)));
            }
        }
        Ok(())
    }

    /// Base keyword lists shared by both categories
    pub fn base_keywords(&self) -> KeywordSet {
        KeywordSet {
            comm_keywords: self.comm_keywords.clone(),
            power_keywords: self.power_keywords.clone(),
            pco_keywords: self.pco_keywords.clone(),
            aux5_keywords: self.aux5_keywords.clone(),
        }
    }

    /// Keyword lists for one category (override when present)
    pub fn keywords_for(&self, category: Category) -> KeywordSet {
        self.categories
            .get(&category)
            .cloned()
            .unwrap_or_else(|| self.base_keywords())
    }

    /// Manually entered value for a slot. Aux Data 3 is never manual.
    pub fn manual_value(&self, slot: AuxSlot) -> Option<&str> {
        if slot == AuxSlot::CONDITION {
            return None;
        }
        self.last_aux_values
            .get(&format!("aux_data_{}", slot.number()))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Set one top-level key. Text keys take `raw` as is; other keys take it
    /// as JSON, falling back to a bare string.
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut doc = serde_json::to_value(&*self)?;
        if let Value::Object(map) = &mut doc {
            let value = match map.get(key) {
                Some(Value::String(_)) => Value::String(raw.to_string()),
                _ => serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
            };
            map.insert(key.to_string(), value);
        }
        let updated: Profile = serde_json::from_value(doc)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

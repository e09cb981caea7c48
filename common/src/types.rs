//! Core domain types
//!
//! - AuxSlot: one of the numbered "Aux Data" fields on a pole
//! - Category: EXISTING / PROPOSED structure set
//! - FieldChange: a single before/after mutation on a structure

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of aux fields filled by the matcher
pub const AUX_FIELD_COUNT: u8 = 5;

/// Highest aux slot a PPLX pole can carry
pub const MAX_AUX_SLOT: u8 = 8;

/// Value reported for an aux field that is missing or empty
pub const UNSET: &str = "Unset";

/// Pole tag used when the nodes sheet has no tag text
pub const POLE_TAG_BLANK: &str = "NO TAG";

/// Aux Data field number (1-8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AuxSlot(u8);

impl AuxSlot {
    pub const OWNER: AuxSlot = AuxSlot(1);
    pub const POLE_TAG: AuxSlot = AuxSlot(2);
    pub const CONDITION: AuxSlot = AuxSlot(3);
    pub const MAKE_READY: AuxSlot = AuxSlot(4);
    pub const FLAG: AuxSlot = AuxSlot(5);

    pub fn new(number: u8) -> Result<Self> {
        if (1..=MAX_AUX_SLOT).contains(&number) {
            Ok(Self(number))
        } else {
            Err(Error::InvalidAuxSlot(number))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// `NAME` attribute of the VALUE element holding this slot
    pub fn field_name(self) -> String {
        format!("Aux Data {}", self.0)
    }

    /// Slots 1..=5, the ones the matcher fills
    pub fn matched() -> impl Iterator<Item = AuxSlot> {
        (1..=AUX_FIELD_COUNT).map(AuxSlot)
    }

    /// Default value used by the fill-details rule set
    pub fn default_value(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("XCEL"),
            2 => Some(POLE_TAG_BLANK),
            3 => Some("EXISTING"),
            4 => Some("NO MAKE READY"),
            5 => Some("NO"),
            _ => None,
        }
    }
}

impl TryFrom<u8> for AuxSlot {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        AuxSlot::new(value)
    }
}

impl From<AuxSlot> for u8 {
    fn from(slot: AuxSlot) -> u8 {
        slot.0
    }
}

impl fmt::Display for AuxSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aux Data {}", self.0)
    }
}

/// Structure category. Files are grouped by the folder they come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Existing,
    Proposed,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Existing, Category::Proposed];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Existing => "EXISTING",
            Category::Proposed => "PROPOSED",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "EXISTING" | "E" => Ok(Category::Existing),
            "PROPOSED" | "P" => Ok(Category::Proposed),
            _ => Err(Error::InvalidCategory(s.to_string())),
        }
    }
}

/// One field actually changed on a structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// `NAME` of the VALUE element (e.g. "Aux Data 4", "Owner")
    pub field: String,
    /// Previous text, `None` when the element was created
    pub before: Option<String>,
    pub after: String,
}

impl FieldChange {
    pub fn before_display(&self) -> &str {
        self.before.as_deref().unwrap_or(UNSET)
    }
}

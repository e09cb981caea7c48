//! Aux Data assignment
//!
//! Decides the values of Aux Data 1-5 for one structure from three inputs: the
//! active profile, the structure's category, and the node row the SCID resolved to.
//!
//! Precedence per slot (later steps override earlier ones):
//! 1. manual values stored in the profile
//! 2. data-driven values (category, node sheet columns, make-ready keywords)
//! 3. custom keyword rules, first matching rule per slot in declared order
//!
//! Assignment is a pure function of its inputs, so running it twice on the same
//! notes and profile always yields the same values.

use crate::profile::{KeywordSet, Profile};
use crate::types::{AuxSlot, Category, POLE_TAG_BLANK};
use std::collections::BTreeMap;
use std::fmt;

pub const NO_MAKE_READY: &str = "NO MAKE READY";
pub const PCO: &str = "PCO";

/// Fields of a node row the matcher looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFacts {
    pub company: String,
    pub tag_text: String,
    pub mr_note: String,
}

/// Why a slot got its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentSource {
    Manual,
    Category,
    NodeData,
    Keyword,
    CustomRule(usize),
    Fallback,
    Default,
}

impl fmt::Display for AssignmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentSource::Manual => f.write_str("Set (manual)"),
            AssignmentSource::Category => f.write_str("Auto-set"),
            AssignmentSource::NodeData | AssignmentSource::Keyword => f.write_str("Auto-filled"),
            AssignmentSource::CustomRule(i) => write!(f, "Rule {}", i + 1),
            AssignmentSource::Fallback => f.write_str("Set (fallback)"),
            AssignmentSource::Default => f.write_str("Default"),
        }
    }
}

/// Final value per slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxAssignment {
    values: BTreeMap<AuxSlot, (String, AssignmentSource)>,
}

impl AuxAssignment {
    fn set(&mut self, slot: AuxSlot, value: impl Into<String>, source: AssignmentSource) {
        self.values.insert(slot, (value.into(), source));
    }

    pub fn get(&self, slot: AuxSlot) -> Option<&str> {
        self.values.get(&slot).map(|(v, _)| v.as_str())
    }

    pub fn source(&self, slot: AuxSlot) -> Option<AssignmentSource> {
        self.values.get(&slot).map(|(_, s)| *s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AuxSlot, &str, AssignmentSource)> {
        self.values.iter().map(|(slot, (v, s))| (*slot, v.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pole tag used in the output file name
    pub fn pole_tag(&self) -> &str {
        self.get(AuxSlot::POLE_TAG).unwrap_or(POLE_TAG_BLANK)
    }

    pub fn is_pco(&self) -> bool {
        self.get(AuxSlot::MAKE_READY) == Some(PCO)
    }
}

fn normalize(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|kw| kw.trim().to_uppercase())
        .filter(|kw| !kw.is_empty())
        .collect()
}

fn any_hit(haystack_upper: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|kw| haystack_upper.contains(kw.as_str()))
}

/// Aux Data 4 and 5 from a make-ready note. Both values are upper case.
///
/// PCO keywords win over everything else; otherwise comm and power keywords
/// combine. `power_label` replaces "POWER" in the output.
pub fn analyze_mr_note(mr_note: &str, keywords: &KeywordSet, power_label: &str) -> (String, String) {
    if mr_note.trim().is_empty() {
        return (NO_MAKE_READY.to_string(), "NO".to_string());
    }

    let note = mr_note.to_uppercase();
    let label = power_label.trim().to_uppercase();
    let comm = normalize(&keywords.comm_keywords);
    let power = normalize(&keywords.power_keywords);
    let pco = normalize(&keywords.pco_keywords);
    let aux5 = normalize(&keywords.aux5_keywords);

    let aux4 = if any_hit(&note, &pco) {
        PCO.to_string()
    } else {
        match (any_hit(&note, &comm), any_hit(&note, &power)) {
            (true, true) => format!("{} & COMM MAKE READY", label),
            (true, false) => "COMM MAKE READY".to_string(),
            (false, true) => format!("{} MAKE READY", label),
            (false, false) => NO_MAKE_READY.to_string(),
        }
    };

    let aux5 = if any_hit(&note, &aux5) { "YES" } else { "NO" };
    (aux4, aux5.to_string())
}

fn apply_rules(profile: &Profile, note: &str, assignment: &mut AuxAssignment) {
    let note = note.to_uppercase();
    let mut claimed: Vec<AuxSlot> = Vec::new();
    for (index, rule) in profile.rules.iter().enumerate() {
        if claimed.contains(&rule.slot) {
            continue;
        }
        if any_hit(&note, &normalize(&rule.keywords)) {
            assignment.set(rule.slot, rule.value.trim().to_uppercase(), AssignmentSource::CustomRule(index));
            claimed.push(rule.slot);
        }
    }
}

/// Aux values for one structure in a processing run
pub fn assign(profile: &Profile, category: Category, facts: Option<&NodeFacts>) -> AuxAssignment {
    let mut assignment = AuxAssignment::default();

    for slot in AuxSlot::matched() {
        if let Some(value) = profile.manual_value(slot) {
            assignment.set(slot, value, AssignmentSource::Manual);
        }
    }

    assignment.set(AuxSlot::CONDITION, category.as_str(), AssignmentSource::Category);

    let manual_tag = profile
        .manual_value(AuxSlot::POLE_TAG)
        .unwrap_or(POLE_TAG_BLANK)
        .to_string();

    match facts {
        Some(facts) => {
            if profile.auto_fill_aux1 && !facts.company.trim().is_empty() {
                assignment.set(AuxSlot::OWNER, facts.company.trim(), AssignmentSource::NodeData);
            }

            if profile.auto_fill_aux2 {
                let tag = facts.tag_text.trim();
                let tag = if tag.is_empty() { POLE_TAG_BLANK } else { tag };
                assignment.set(AuxSlot::POLE_TAG, tag, AssignmentSource::NodeData);
            } else {
                assignment.set(AuxSlot::POLE_TAG, manual_tag, AssignmentSource::Manual);
            }

            let keywords = profile.keywords_for(category);
            let (aux4, aux5) = analyze_mr_note(&facts.mr_note, &keywords, &profile.power_label);
            assignment.set(AuxSlot::MAKE_READY, aux4, AssignmentSource::Keyword);
            assignment.set(AuxSlot::FLAG, aux5, AssignmentSource::Keyword);

            apply_rules(profile, &facts.mr_note, &mut assignment);
        }
        None => {
            let tag = if profile.auto_fill_aux2 {
                POLE_TAG_BLANK.to_string()
            } else {
                manual_tag
            };
            assignment.set(AuxSlot::POLE_TAG, tag, AssignmentSource::Fallback);
        }
    }

    assignment
}

/// Default-value rule set used by the fill-details export: every slot 1-5 gets a
/// value, falling back to the documented defaults.
pub fn fill_details_values(profile: &Profile, facts: Option<&NodeFacts>) -> AuxAssignment {
    let mut assignment = AuxAssignment::default();
    let empty = NodeFacts::default();
    let facts = facts.unwrap_or(&empty);

    let owner = facts.company.trim();
    if owner.is_empty() {
        assignment.set(AuxSlot::OWNER, profile.default_owner.as_str(), AssignmentSource::Default);
    } else {
        assignment.set(AuxSlot::OWNER, owner, AssignmentSource::NodeData);
    }

    let tag = facts.tag_text.trim();
    if tag.is_empty() || tag.eq_ignore_ascii_case("nan") {
        assignment.set(AuxSlot::POLE_TAG, POLE_TAG_BLANK, AssignmentSource::Default);
    } else {
        assignment.set(AuxSlot::POLE_TAG, tag, AssignmentSource::NodeData);
    }

    assignment.set(AuxSlot::CONDITION, Category::Existing.as_str(), AssignmentSource::Default);

    let (aux4, aux5) = analyze_mr_note(&facts.mr_note, &profile.base_keywords(), &profile.power_label);
    assignment.set(AuxSlot::MAKE_READY, aux4, AssignmentSource::Keyword);
    assignment.set(AuxSlot::FLAG, aux5, AssignmentSource::Keyword);
    apply_rules(profile, &facts.mr_note, &mut assignment);

    assignment
}

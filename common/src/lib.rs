//! PPLX Common Library
//!
//! Domain types and rules shared by the batch editor: aux-data slots, structure
//! categories, keyword profiles, the make-ready matcher and SCID helpers.

pub mod types;
pub mod error;
pub mod profile;
pub mod matcher;
pub mod scid;

pub use types::{AuxSlot, Category, FieldChange, AUX_FIELD_COUNT, MAX_AUX_SLOT, POLE_TAG_BLANK, UNSET};
pub use error::{Error, Result};
pub use profile::{parse_keywords, KeywordRule, KeywordSet, Profile};
pub use matcher::{analyze_mr_note, assign, fill_details_values, AssignmentSource, AuxAssignment, NodeFacts};
pub use scid::{
    clean_scid_keywords, extract_scid_from_filename, leading_int, normalize_scid_for_lookup,
    safe_filename_part, scid_lookup_candidates,
};

//! PPLX document handler
//!
//! A PPLX file is XML: the root holds a `PPLScene` whose `ATTRIBUTES` carry scene
//! level `VALUE` elements, and one or more `WoodPole` elements, each with its own
//! `ATTRIBUTES/VALUE` list (`Aux Data 1`..`Aux Data 8`, `Owner`, `Pole Number`, ...).
//! Spans live anywhere under the scene as `Span` elements.

mod tree;

pub use tree::{Element, TreeError, XmlNode, XmlTree};

use crate::error::{PplxError, Result};
use pplx_common::{AuxSlot, FieldChange, UNSET};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const WOOD_POLE: &str = "WoodPole";
const SPAN: &str = "Span";
const ATTRIBUTES: &str = "ATTRIBUTES";
const VALUE: &str = "VALUE";
const SCENE: &str = "PPLScene";

/// One attribute of a pole
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoleAttribute {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: String,
}

/// Header data of a file
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileInfo {
    pub date: Option<String>,
    pub user: Option<String>,
    pub workstation: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub elevation: Option<String>,
    pub ppl_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanInfo {
    /// Position among all spans in document order
    pub index: usize,
    pub span_type: Option<String>,
    pub conductor_type: Option<String>,
    pub length_inches: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanLength {
    pub length_inches: f64,
    pub conductor_type: String,
}

#[derive(Debug, Clone)]
pub struct PplxDocument {
    source: String,
    tree: XmlTree,
}

fn value_element<'a>(attributes: &'a Element, name: &str) -> Option<&'a Element> {
    attributes
        .children_named(VALUE)
        .find(|v| v.attr("NAME").as_deref() == Some(name))
}

fn value_element_mut<'a>(attributes: &'a mut Element, name: &str) -> Option<&'a mut Element> {
    attributes
        .children_named_mut(VALUE)
        .find(|v| v.attr("NAME").as_deref() == Some(name))
}

fn value_text(owner: &Element, name: &str) -> Option<String> {
    owner
        .child(ATTRIBUTES)
        .and_then(|attrs| value_element(attrs, name))
        .and_then(Element::text)
}

/// Write `value` into the named VALUE, creating it when absent.
/// Returns the change, or `None` when the value was already there.
fn upsert_value(attributes: &mut Element, name: &str, value: &str) -> Option<FieldChange> {
    if let Some(existing) = value_element_mut(attributes, name) {
        let before = existing.text();
        if before.as_deref() == Some(value) {
            return None;
        }
        existing.set_text(value);
        return Some(FieldChange {
            field: name.to_string(),
            before,
            after: value.to_string(),
        });
    }

    let mut created = Element::new(VALUE)
        .with_attr("NAME", name)
        .with_attr("TYPE", "String");
    created.set_text(value);
    attributes.append_child(created);
    Some(FieldChange {
        field: name.to_string(),
        before: None,
        after: value.to_string(),
    })
}

impl PplxDocument {
    /// Parse a document. `source` names it in errors and logs.
    pub fn parse(source: &str, bytes: &[u8]) -> Result<Self> {
        let tree = XmlTree::parse(bytes).map_err(|e| PplxError::parse(source, e))?;
        let doc = Self {
            source: source.to_string(),
            tree,
        };
        if doc.pole_paths().is_empty() {
            return Err(PplxError::MissingStructure {
                file: source.to_string(),
                element: WOOD_POLE.to_string(),
            });
        }
        debug!(file = source, poles = doc.wood_pole_count(), "parsed PPLX");
        Ok(doc)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PplxError::FileNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        Self::parse(&path.display().to_string(), &bytes)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.tree
            .to_bytes()
            .map_err(|e| PplxError::parse(&self.source, e))
    }

    /// Write to `path` through a sibling temp file so a failed write never
    /// leaves a truncated document behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output.pplx".to_string());
        let tmp = path.with_file_name(format!(".{}.tmp", file_name));
        std::fs::write(&tmp, &bytes)?;
        if let Err(err) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn pole_paths(&self) -> Vec<Vec<usize>> {
        self.tree.root().descendant_paths(WOOD_POLE)
    }

    fn span_paths(&self) -> Vec<Vec<usize>> {
        self.tree.root().descendant_paths(SPAN)
    }

    fn scene(&self) -> Option<&Element> {
        let root = self.tree.root();
        if root.name() == SCENE {
            return Some(root);
        }
        let path = root.descendant_paths(SCENE).into_iter().next()?;
        root.at_path(&path)
    }

    pub fn wood_pole_count(&self) -> usize {
        self.pole_paths().len()
    }

    fn pole(&self, index: usize) -> Result<&Element> {
        let paths = self.pole_paths();
        let count = paths.len();
        paths
            .get(index)
            .and_then(|path| self.tree.root().at_path(path))
            .ok_or(PplxError::PoleOutOfRange { index, count })
    }

    fn pole_attributes_mut(&mut self, index: usize) -> Result<&mut Element> {
        let paths = self.pole_paths();
        let count = paths.len();
        let source = self.source.clone();
        let pole = paths
            .get(index)
            .and_then(|path| self.tree.root_mut().at_path_mut(path))
            .ok_or(PplxError::PoleOutOfRange { index, count })?;
        pole.child_mut(ATTRIBUTES).ok_or(PplxError::MissingStructure {
            file: source,
            element: format!("{}/{}", WOOD_POLE, ATTRIBUTES),
        })
    }

    pub fn file_info(&self) -> FileInfo {
        let root = self.tree.root();
        let scene = self.scene();
        let scene_value = |name: &str| scene.and_then(|s| value_text(s, name));
        FileInfo {
            date: root.attr("DATE"),
            user: root.attr("USER"),
            workstation: root.attr("WORKSTATION"),
            latitude: scene_value("Latitude"),
            longitude: scene_value("Longitude"),
            elevation: scene_value("ElevationMetersAboveMSL"),
            ppl_version: scene_value("PPLVersion"),
        }
    }

    pub fn scene_lat_lon(&self) -> (Option<f64>, Option<f64>) {
        let info = self.file_info();
        let parse = |v: Option<String>| v.and_then(|s| s.trim().parse::<f64>().ok());
        (parse(info.latitude), parse(info.longitude))
    }

    /// `Aux Data N` values of a pole; empty values read as `Unset`
    pub fn aux_data(&self, pole: usize) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        if let Some(attrs) = self.pole(pole)?.child(ATTRIBUTES) {
            for value in attrs.children_named(VALUE) {
                let Some(name) = value.attr("NAME") else { continue };
                if name.starts_with("Aux Data") {
                    let text = value.text().filter(|t| !t.is_empty()).unwrap_or_else(|| UNSET.to_string());
                    out.insert(name, text);
                }
            }
        }
        Ok(out)
    }

    pub fn aux_value(&self, slot: AuxSlot, pole: usize) -> Result<Option<String>> {
        Ok(value_text(self.pole(pole)?, &slot.field_name()))
    }

    /// Set `Aux Data N` on a pole. Slot 1 also writes `Owner`.
    /// Returns only the fields whose text actually changed.
    pub fn set_aux_data(&mut self, slot: AuxSlot, value: &str, pole: usize) -> Result<Vec<FieldChange>> {
        let attrs = self.pole_attributes_mut(pole)?;
        let mut changes = Vec::new();
        changes.extend(upsert_value(attrs, &slot.field_name(), value));
        if slot == AuxSlot::OWNER {
            changes.extend(upsert_value(attrs, "Owner", value));
        }
        Ok(changes)
    }

    /// Update an existing aux field only; absent fields are left absent
    pub fn update_existing_aux(&mut self, slot: AuxSlot, value: &str, pole: usize) -> Result<Option<FieldChange>> {
        let attrs = self.pole_attributes_mut(pole)?;
        if value_element(attrs, &slot.field_name()).is_none() {
            return Ok(None);
        }
        Ok(upsert_value(attrs, &slot.field_name(), value))
    }

    pub fn pole_attributes(&self, pole: usize) -> Result<Vec<PoleAttribute>> {
        let Some(attrs) = self.pole(pole)?.child(ATTRIBUTES) else {
            return Ok(Vec::new());
        };
        Ok(attrs
            .children_named(VALUE)
            .filter_map(|v| {
                Some(PoleAttribute {
                    name: v.attr("NAME")?,
                    value: v.text().unwrap_or_default(),
                    value_type: v.attr("TYPE").unwrap_or_default(),
                })
            })
            .collect())
    }

    /// Set an attribute that must already exist on the pole
    pub fn set_pole_attribute(&mut self, name: &str, value: &str, pole: usize) -> Result<Option<FieldChange>> {
        let attrs = self.pole_attributes_mut(pole)?;
        if value_element(attrs, name).is_none() {
            return Err(PplxError::AttributeNotFound(name.to_string()));
        }
        Ok(upsert_value(attrs, name, value))
    }

    /// Count of every element name in the document
    pub fn element_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        self.tree.root().walk(&mut |el| {
            *counts.entry(el.name().to_string()).or_insert(0) += 1;
        });
        counts
    }

    /// Element tree as JSON: tag, attributes, trimmed text and children
    pub fn structure_json(&self) -> Value {
        fn convert(el: &Element) -> Value {
            let attributes: serde_json::Map<String, Value> = el
                .attrs()
                .map(|(k, v)| (k.to_string(), Value::String(v)))
                .collect();
            let mut node = json!({ "tag": el.name(), "attributes": attributes });
            if let Some(text) = el.text().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
                node["text"] = Value::String(text);
            }
            let children: Vec<Value> = el.child_elements().map(convert).collect();
            if !children.is_empty() {
                node["children"] = Value::Array(children);
            }
            node
        }
        convert(self.tree.root())
    }

    fn span_info(index: usize, span: &Element) -> SpanInfo {
        SpanInfo {
            index,
            span_type: value_text(span, "SpanType"),
            conductor_type: value_text(span, "Type"),
            length_inches: value_text(span, "SpanDistanceInInches").and_then(|v| v.trim().parse().ok()),
        }
    }

    pub fn spans(&self) -> Vec<SpanInfo> {
        let root = self.tree.root();
        self.span_paths()
            .iter()
            .filter_map(|path| root.at_path(path))
            .enumerate()
            .map(|(index, span)| Self::span_info(index, span))
            .collect()
    }

    pub fn spans_by_type(&self, span_type: &str) -> Vec<SpanInfo> {
        self.spans()
            .into_iter()
            .filter(|s| s.span_type.as_deref() == Some(span_type))
            .collect()
    }

    pub fn span_conductor_type(&self, index: usize) -> Option<String> {
        self.spans().into_iter().nth(index).and_then(|s| s.conductor_type)
    }

    pub fn span_length_inches(&self, index: usize) -> Option<f64> {
        self.spans().into_iter().nth(index).and_then(|s| s.length_inches)
    }

    pub fn set_span_conductor_type(&mut self, index: usize, conductor: &str) -> Result<Option<FieldChange>> {
        let paths = self.span_paths();
        let source = self.source.clone();
        let span = paths
            .get(index)
            .and_then(|path| self.tree.root_mut().at_path_mut(path))
            .ok_or_else(|| PplxError::MissingStructure {
                file: source.clone(),
                element: format!("{}[{}]", SPAN, index),
            })?;
        let attrs = span.child_mut(ATTRIBUTES).ok_or(PplxError::MissingStructure {
            file: source,
            element: format!("{}/{}", SPAN, ATTRIBUTES),
        })?;
        Ok(upsert_value(attrs, "Type", conductor))
    }

    /// Spans grouped by span type, each with its (length, conductor) pairs.
    /// Spans without a length are left out; identical pairs are listed once.
    pub fn spans_by_type_and_length(&self) -> BTreeMap<String, Vec<SpanLength>> {
        let mut grouped: BTreeMap<String, Vec<SpanLength>> = BTreeMap::new();
        for span in self.spans() {
            let Some(length) = span.length_inches else { continue };
            let entry = SpanLength {
                length_inches: length,
                conductor_type: span.conductor_type.unwrap_or_else(|| "Unknown".to_string()),
            };
            let group = grouped
                .entry(span.span_type.unwrap_or_else(|| "Unknown".to_string()))
                .or_default();
            if !group.contains(&entry) {
                group.push(entry);
            }
        }
        grouped
    }
}

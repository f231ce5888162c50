//! In-memory keypoint document
//!
//! The document is kept as a generic JSON value so fields this crate does not know
//! about (`version`, `part_candidates`, per-person ids, ...) survive the rewrite.

use crate::keypoints::{GroupLookup, KeypointGroup};
use crate::types::Keypoint3D;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors raised while reading or writing a keypoint document.
#[derive(Debug, Error)]
pub enum KeypointError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed keypoint document: {0}")]
    Malformed(String),

    #[error("Person index {index} out of range ({count} people)")]
    PersonOutOfRange { index: usize, count: usize },
}

/// A parsed keypoint file.
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointDocument {
    root: JsonValue,
}

impl KeypointDocument {
    /// Parse a keypoint file body.
    ///
    /// A missing `people` field reads as zero people; any other shape problem at
    /// the top level is an error.
    pub fn parse(text: &str) -> Result<Self, KeypointError> {
        let root: JsonValue = serde_json::from_str(text)?;

        let object = root
            .as_object()
            .ok_or_else(|| KeypointError::Malformed("top level is not an object".into()))?;

        match object.get("people") {
            None | Some(JsonValue::Null) | Some(JsonValue::Array(_)) => {}
            Some(_) => {
                return Err(KeypointError::Malformed("'people' is not an array".into()));
            }
        }

        if let Some(JsonValue::Array(people)) = object.get("people") {
            if let Some(i) = people.iter().position(|p| !p.is_object()) {
                return Err(KeypointError::Malformed(format!(
                    "person {} is not an object",
                    i
                )));
            }
        }

        Ok(Self { root })
    }

    /// Number of people in the document.
    pub fn person_count(&self) -> usize {
        self.people().map_or(0, |people| people.len())
    }

    /// Look up one keypoint group of one person.
    pub fn lookup(&self, person: usize, group: KeypointGroup) -> GroupLookup {
        match self.people().and_then(|people| people.get(person)) {
            Some(record) => GroupLookup::from_field(group, record.get(group.field_2d())),
            None => GroupLookup::Absent,
        }
    }

    /// Attach the lifted 3D keypoints for `group` to a person record.
    pub fn attach(
        &mut self,
        person: usize,
        group: KeypointGroup,
        points: &[Keypoint3D],
    ) -> Result<(), KeypointError> {
        let count = self.person_count();
        let record = self
            .root
            .get_mut("people")
            .and_then(JsonValue::as_array_mut)
            .and_then(|people| people.get_mut(person))
            .and_then(JsonValue::as_object_mut)
            .ok_or(KeypointError::PersonOutOfRange {
                index: person,
                count,
            })?;

        let flat: Vec<JsonValue> = points
            .iter()
            .flat_map(|p| p.to_quad())
            .map(JsonValue::from)
            .collect();

        record.insert(group.field_3d().to_string(), JsonValue::Array(flat));
        Ok(())
    }

    /// Serialize with four-space indentation and a trailing newline.
    pub fn to_pretty_json(&self) -> Result<String, KeypointError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.root.serialize(&mut serializer)?;
        buf.push(b'\n');
        String::from_utf8(buf).map_err(|e| KeypointError::Malformed(e.to_string()))
    }

    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &JsonValue {
        &self.root
    }

    fn people(&self) -> Option<&Vec<JsonValue>> {
        self.root.get("people").and_then(JsonValue::as_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use serde_json::json;

    fn body_only() -> String {
        let pose: Vec<f64> = (0..75).map(|_| 0.0).collect();
        json!({
            "version": 1.3,
            "people": [{ "person_id": [-1], "pose_keypoints_2d": pose }]
        })
        .to_string()
    }

    #[test]
    fn test_parse_rejects_partial_write() {
        let text = body_only();
        let partial = &text[..text.len() / 2];
        assert!(matches!(
            KeypointDocument::parse(partial),
            Err(KeypointError::Json(_))
        ));
        assert!(KeypointDocument::parse("").is_err());
    }

    #[test]
    fn test_parse_without_people_has_zero_people() {
        let doc = KeypointDocument::parse(r#"{"version": 1.3}"#).unwrap();
        assert_eq!(doc.person_count(), 0);
    }

    #[test]
    fn test_parse_rejects_non_array_people() {
        assert!(matches!(
            KeypointDocument::parse(r#"{"people": 3}"#),
            Err(KeypointError::Malformed(_))
        ));
        assert!(matches!(
            KeypointDocument::parse(r#"[1, 2]"#),
            Err(KeypointError::Malformed(_))
        ));
    }

    #[test]
    fn test_lookup_body_and_missing_face() {
        let doc = KeypointDocument::parse(&body_only()).unwrap();
        assert_eq!(doc.person_count(), 1);
        assert!(doc.lookup(0, KeypointGroup::Body).is_present());
        assert_eq!(doc.lookup(0, KeypointGroup::Face), GroupLookup::Absent);
        assert_eq!(doc.lookup(5, KeypointGroup::Body), GroupLookup::Absent);
    }

    #[test]
    fn test_attach_writes_flat_quads_and_keeps_unknown_fields() {
        let mut doc = KeypointDocument::parse(&body_only()).unwrap();
        let points = vec![Keypoint3D::new(Vec3::new(0.5, 0.25, 2.0), 0.5); 25];
        doc.attach(0, KeypointGroup::Body, &points).unwrap();

        let person = &doc.as_value()["people"][0];
        let flat = person["pose_keypoints_3d"].as_array().unwrap();
        assert_eq!(flat.len(), 100);
        assert_eq!(flat[2].as_f64(), Some(2.0));
        assert_eq!(flat[3].as_f64(), Some(0.5));
        assert_eq!(person["person_id"], json!([-1]));
        assert_eq!(doc.as_value()["version"], json!(1.3));
    }

    #[test]
    fn test_attach_out_of_range_person() {
        let mut doc = KeypointDocument::parse(&body_only()).unwrap();
        let err = doc.attach(3, KeypointGroup::Body, &[]).unwrap_err();
        assert!(matches!(
            err,
            KeypointError::PersonOutOfRange { index: 3, count: 1 }
        ));
    }

    #[test]
    fn test_pretty_json_uses_four_space_indent() {
        let doc = KeypointDocument::parse(r#"{"people":[]}"#).unwrap();
        let text = doc.to_pretty_json().unwrap();
        assert_eq!(text, "{\n    \"people\": []\n}\n");
    }

    #[test]
    fn test_pretty_json_reparses_to_same_document() {
        let mut doc = KeypointDocument::parse(&body_only()).unwrap();
        doc.attach(0, KeypointGroup::Body, &vec![Keypoint3D::absent(); 25])
            .unwrap();
        let reparsed = KeypointDocument::parse(&doc.to_pretty_json().unwrap()).unwrap();
        assert_eq!(reparsed, doc);
    }
}

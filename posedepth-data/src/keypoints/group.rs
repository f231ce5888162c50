//! Keypoint groups and the outcome of looking one up in a person record.

use crate::types::Keypoint2D;
use serde_json::Value as JsonValue;

/// One of the four keypoint groups a pose estimator can emit per person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeypointGroup {
    Body,
    Face,
    LeftHand,
    RightHand,
}

impl KeypointGroup {
    /// All groups, in the order they are fused.
    pub const ALL: [KeypointGroup; 4] = [
        KeypointGroup::Body,
        KeypointGroup::LeftHand,
        KeypointGroup::RightHand,
        KeypointGroup::Face,
    ];

    /// Field holding the flat `[x, y, confidence]` triples.
    pub fn field_2d(&self) -> &'static str {
        match self {
            KeypointGroup::Body => "pose_keypoints_2d",
            KeypointGroup::Face => "face_keypoints_2d",
            KeypointGroup::LeftHand => "hand_left_keypoints_2d",
            KeypointGroup::RightHand => "hand_right_keypoints_2d",
        }
    }

    /// Field written with the flat `[x, y, z, confidence]` quadruples.
    pub fn field_3d(&self) -> &'static str {
        match self {
            KeypointGroup::Body => "pose_keypoints_3d",
            KeypointGroup::Face => "face_keypoints_3d",
            KeypointGroup::LeftHand => "hand_left_keypoints_3d",
            KeypointGroup::RightHand => "hand_right_keypoints_3d",
        }
    }

    /// Number of keypoints fused for this group.
    pub fn point_count(&self) -> usize {
        match self {
            KeypointGroup::Body => 25,
            KeypointGroup::Face => 69,
            KeypointGroup::LeftHand | KeypointGroup::RightHand => 21,
        }
    }

    /// Body output is always written; the other groups only when present in the source.
    pub fn is_required(&self) -> bool {
        matches!(self, KeypointGroup::Body)
    }
}

impl std::fmt::Display for KeypointGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeypointGroup::Body => "body",
            KeypointGroup::Face => "face",
            KeypointGroup::LeftHand => "left hand",
            KeypointGroup::RightHand => "right hand",
        };
        f.write_str(name)
    }
}

/// Result of reading one group out of a person record.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupLookup {
    /// The group exists and has at least `point_count` well-formed triples.
    Present(Vec<Keypoint2D>),
    /// The field is missing or null.
    Absent,
    /// The field exists but cannot be read as keypoints.
    Malformed(String),
}

impl GroupLookup {
    /// Interpret the raw field value for `group`.
    ///
    /// Extra trailing triples are ignored; too few is malformed.
    pub fn from_field(group: KeypointGroup, field: Option<&JsonValue>) -> Self {
        let values = match field {
            None | Some(JsonValue::Null) => return GroupLookup::Absent,
            Some(JsonValue::Array(values)) => values,
            Some(other) => {
                return GroupLookup::Malformed(format!(
                    "'{}' is not an array (found {})",
                    group.field_2d(),
                    json_kind(other)
                ));
            }
        };

        let needed = group.point_count() * 3;
        if values.len() < needed {
            return GroupLookup::Malformed(format!(
                "'{}' has {} values, expected at least {}",
                group.field_2d(),
                values.len(),
                needed
            ));
        }

        let mut points = Vec::with_capacity(group.point_count());
        for (i, chunk) in values[..needed].chunks_exact(3).enumerate() {
            let mut triple = [0.0; 3];
            for (slot, value) in triple.iter_mut().zip(chunk) {
                match value.as_f64() {
                    Some(v) => *slot = v,
                    None => {
                        return GroupLookup::Malformed(format!(
                            "'{}' keypoint {} has a non-numeric value",
                            group.field_2d(),
                            i
                        ));
                    }
                }
            }
            points.push(Keypoint2D::from_triple(triple));
        }

        GroupLookup::Present(points)
    }

    /// True when the group was found and parsed.
    pub fn is_present(&self) -> bool {
        matches!(self, GroupLookup::Present(_))
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

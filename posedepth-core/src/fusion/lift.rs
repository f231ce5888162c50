//! Lifting 2D keypoints onto the vertex map

use crate::geometry::{pixel_in_frame, round_half_up};
use crate::reconstruction::VertexMap;
use posedepth_data::{GroupLookup, KeypointDocument, KeypointError, KeypointGroup};
use posedepth_data::{Keypoint2D, Keypoint3D};
use tracing::{debug, warn};

/// Look up the 3D point under a 2D keypoint.
///
/// The pixel coordinate is rounded half-up. Anything on row or column zero, or
/// past the far edge, has no 3D data and comes back as the zero sentinel.
pub fn lift_keypoint(keypoint: &Keypoint2D, map: &VertexMap) -> Keypoint3D {
    let x = round_half_up(keypoint.x);
    let y = round_half_up(keypoint.y);
    if !pixel_in_frame(x, y, map.width(), map.height()) {
        return Keypoint3D::absent();
    }
    match map.get(x as u32, y as u32) {
        Some(position) => Keypoint3D::new(position, keypoint.confidence),
        None => Keypoint3D::absent(),
    }
}

/// Lift every keypoint of one group.
pub fn lift_group(keypoints: &[Keypoint2D], map: &VertexMap) -> Vec<Keypoint3D> {
    keypoints.iter().map(|kp| lift_keypoint(kp, map)).collect()
}

/// What a fuse pass attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionSummary {
    pub people: usize,
    /// Groups written across all people.
    pub groups_attached: usize,
    /// Optional groups left out because the source lacked them.
    pub groups_omitted: usize,
    /// Keypoints that landed on valid depth.
    pub points_with_depth: usize,
}

/// Attach 3D keypoints for every person and group in `document`.
///
/// Body output is always written, as all zeros when the source body is missing
/// or unreadable. Face and hands are written only when present and well formed.
pub fn fuse_document(
    document: &mut KeypointDocument,
    map: &VertexMap,
) -> Result<FusionSummary, KeypointError> {
    let mut summary = FusionSummary {
        people: document.person_count(),
        ..Default::default()
    };

    for person in 0..summary.people {
        for group in KeypointGroup::ALL {
            let lifted = match document.lookup(person, group) {
                GroupLookup::Present(points) => lift_group(&points, map),
                GroupLookup::Absent if group.is_required() => {
                    warn!(person, "No {} keypoints, writing zeros", group);
                    vec![Keypoint3D::absent(); group.point_count()]
                }
                GroupLookup::Malformed(reason) if group.is_required() => {
                    warn!(person, "Unreadable {} keypoints ({}), writing zeros", group, reason);
                    vec![Keypoint3D::absent(); group.point_count()]
                }
                GroupLookup::Absent => {
                    summary.groups_omitted += 1;
                    continue;
                }
                GroupLookup::Malformed(reason) => {
                    debug!(person, "Omitting {} keypoints: {}", group, reason);
                    summary.groups_omitted += 1;
                    continue;
                }
            };

            summary.points_with_depth += lifted.iter().filter(|p| p.position.z > 0.0).count();
            document.attach(person, group, &lifted)?;
            summary.groups_attached += 1;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use serde_json::json;

    const W: u32 = 1280;
    const H: u32 = 720;

    fn map_with(x: u32, y: u32, point: Vec3) -> VertexMap {
        let mut vertices = vec![Vec3::ZERO; (W * H) as usize];
        vertices[(y * W + x) as usize] = point;
        VertexMap::from_vertices(W, H, 1, vertices).unwrap()
    }

    fn triples(n: usize, first: [f64; 3]) -> Vec<f64> {
        let mut values = vec![0.0; n * 3];
        values[..3].copy_from_slice(&first);
        values
    }

    #[test]
    fn test_lift_rounds_onto_vertex() {
        let map = map_with(640, 360, Vec3::new(0.12, -0.05, 1.8));
        let lifted = lift_keypoint(&Keypoint2D::new(640.3, 359.6, 0.91), &map);

        assert!((lifted.position - Vec3::new(0.12, -0.05, 1.8)).length() < 1e-6);
        assert_eq!(lifted.confidence, 0.91);
    }

    #[test]
    fn test_lift_origin_keypoint_is_absent() {
        let map = map_with(0, 0, Vec3::new(1.0, 1.0, 1.0));
        let lifted = lift_keypoint(&Keypoint2D::new(0.0, 0.0, 0.0), &map);
        assert_eq!(lifted.to_quad(), [0.0; 4]);
    }

    #[test]
    fn test_lift_border_and_outside_are_absent() {
        let map = map_with(640, 360, Vec3::ONE);
        for kp in [
            Keypoint2D::new(0.4, 360.0, 0.8),
            Keypoint2D::new(640.0, 0.2, 0.8),
            Keypoint2D::new(1279.5, 360.0, 0.8),
            Keypoint2D::new(640.0, 719.5, 0.8),
            Keypoint2D::new(-3.0, 360.0, 0.8),
        ] {
            assert!(lift_keypoint(&kp, &map).is_absent(), "{:?}", kp);
        }
    }

    #[test]
    fn test_lift_keeps_confidence_without_depth() {
        let map = VertexMap::empty(W, H);
        let lifted = lift_keypoint(&Keypoint2D::new(10.0, 10.0, 0.7), &map);
        assert_eq!(lifted.position, Vec3::ZERO);
        assert_eq!(lifted.confidence, 0.7);
    }

    #[test]
    fn test_fuse_body_only_person() {
        let map = map_with(640, 360, Vec3::new(0.12, -0.05, 1.8));
        let text = json!({
            "people": [{ "pose_keypoints_2d": triples(25, [640.3, 359.6, 0.91]) }]
        })
        .to_string();
        let mut doc = KeypointDocument::parse(&text).unwrap();

        let summary = fuse_document(&mut doc, &map).unwrap();
        assert_eq!(summary.people, 1);
        assert_eq!(summary.groups_attached, 1);
        assert_eq!(summary.groups_omitted, 3);
        assert_eq!(summary.points_with_depth, 1);

        let person = &doc.as_value()["people"][0];
        let pose = person["pose_keypoints_3d"].as_array().unwrap();
        assert_eq!(pose.len(), 100);
        assert!((pose[2].as_f64().unwrap() - 1.8).abs() < 1e-6);
        assert_eq!(pose[3].as_f64(), Some(0.91));
        assert!(pose[4..].iter().all(|v| v.as_f64() == Some(0.0)));
        assert!(person.get("face_keypoints_3d").is_none());
        assert!(person.get("hand_left_keypoints_3d").is_none());
        assert!(person.get("hand_right_keypoints_3d").is_none());
    }

    #[test]
    fn test_fuse_hands_are_independent() {
        let map = VertexMap::empty(W, H);
        let text = json!({
            "people": [{
                "pose_keypoints_2d": triples(25, [1.0, 1.0, 0.5]),
                "hand_left_keypoints_2d": triples(21, [2.0, 2.0, 0.5]),
                "hand_right_keypoints_2d": [1.0, 2.0],
                "face_keypoints_2d": triples(70, [3.0, 3.0, 0.5]),
            }]
        })
        .to_string();
        let mut doc = KeypointDocument::parse(&text).unwrap();
        fuse_document(&mut doc, &map).unwrap();

        let person = &doc.as_value()["people"][0];
        assert_eq!(person["hand_left_keypoints_3d"].as_array().unwrap().len(), 84);
        assert!(person.get("hand_right_keypoints_3d").is_none());
        assert_eq!(person["face_keypoints_3d"].as_array().unwrap().len(), 276);
    }

    #[test]
    fn test_fuse_missing_body_writes_zeros() {
        let map = VertexMap::empty(W, H);
        let mut doc = KeypointDocument::parse(r#"{"people": [{}]}"#).unwrap();
        let summary = fuse_document(&mut doc, &map).unwrap();

        assert_eq!(summary.groups_attached, 1);
        let pose = doc.as_value()["people"][0]["pose_keypoints_3d"].as_array().unwrap();
        assert_eq!(pose.len(), 100);
        assert!(pose.iter().all(|v| v.as_f64() == Some(0.0)));
    }

    #[test]
    fn test_fuse_no_people() {
        let mut doc = KeypointDocument::parse(r#"{"version": 1.3, "people": []}"#).unwrap();
        let summary = fuse_document(&mut doc, &VertexMap::empty(W, H)).unwrap();
        assert_eq!(summary, FusionSummary::default());
    }
}

//! Keypoint filename protocol
//!
//! Raw files are `<index>_keypoints.json` with the index zero-padded to twelve
//! digits. Processed files insert a single `D` before the extension:
//! `<index>_keypointsD.json`.

/// Width of the zero-padded frame index.
pub const FRAME_DIGITS: usize = 12;
/// Stem shared by raw and processed names, after the index.
pub const KEYPOINT_STEM: &str = "_keypoints";
/// Marker inserted into processed filenames ("depth", "done").
pub const PROCESSED_MARKER: char = 'D';
/// File extension shared by raw and processed names.
pub const EXTENSION: &str = ".json";

/// Name of the file the pose estimator writes for frame `index`.
pub fn raw_file_name(index: u64) -> String {
    format!("{:0width$}{}{}", index, KEYPOINT_STEM, EXTENSION, width = FRAME_DIGITS)
}

/// Name of the depth-augmented file written for frame `index`.
pub fn processed_file_name(index: u64) -> String {
    format!(
        "{:0width$}{}{}{}",
        index,
        KEYPOINT_STEM,
        PROCESSED_MARKER,
        EXTENSION,
        width = FRAME_DIGITS
    )
}

/// A recognized keypoint filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameName {
    pub index: u64,
    pub processed: bool,
}

/// Recognize a raw or processed keypoint filename.
pub fn parse_frame_index(name: &str) -> Option<FrameName> {
    let (digits, rest) = name.split_at_checked(FRAME_DIGITS)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok()?;

    let rest = rest.strip_prefix(KEYPOINT_STEM)?.strip_suffix(EXTENSION)?;
    let processed = match rest {
        "" => false,
        marker if marker.len() == PROCESSED_MARKER.len_utf8()
            && marker.starts_with(PROCESSED_MARKER) =>
        {
            true
        }
        _ => return None,
    };

    Some(FrameName { index, processed })
}

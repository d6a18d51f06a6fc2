//! Persisted feature table: a comma-separated text table with a fixed 24-column layout.
//!
//! Layout:
//! - First row: column labels ([`COLUMNS`]).
//! - One row per pose sample, in database order.
//! - Numbers use Rust's `Display` for `f32` (shortest round-trip, `.` decimal
//!   point, no grouping), so the output does not depend on the host locale.
//! - A missing root orientation is written as `0,0,0,0`.
//!
//! Trajectory anchors are not persisted. Decoding re-derives them from the root
//! position and orientation; trajectory windows are rebuilt downstream.

use std::io::{BufRead, Write};

use hashbrown::HashMap;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use crate::error::{MatchError, Result};
use crate::features::{ClipEntry, FeatureSet, PoseSample};
use crate::ids::ClipId;

pub const COLUMNS: [&str; 24] = [
    "ClipName",
    "Frame",
    "RootT.x",
    "RootT.y",
    "RootT.z",
    "RootQ.x",
    "RootQ.y",
    "RootQ.z",
    "RootQ.w",
    "FootLeftT.x",
    "FootLeftT.y",
    "FootLeftT.z",
    "FootRightT.x",
    "FootRightT.y",
    "FootRightT.z",
    "FootLeftV.x",
    "FootLeftV.y",
    "FootLeftV.z",
    "FootRightV.x",
    "FootRightV.y",
    "FootRightV.z",
    "RootV.x",
    "RootV.y",
    "RootV.z",
];

/// Header label of column `index`.
pub fn column_label(index: usize) -> Result<&'static str> {
    COLUMNS
        .get(index)
        .copied()
        .ok_or(MatchError::OutOfRangeLookup {
            what: "column",
            index,
            len: COLUMNS.len(),
        })
}

/// Column position of a header label (exact match).
pub fn column_index(label: &str) -> Option<usize> {
    COLUMNS.iter().position(|c| *c == label)
}

/// Write the header and one row per pose sample.
pub fn encode<W: Write>(set: &FeatureSet, mut out: W) -> Result<()> {
    writeln!(out, "{}", COLUMNS.join(","))?;
    for (idx, pose) in set.poses.iter().enumerate() {
        let line = idx + 2;
        let clip = set
            .clips
            .get(pose.clip.index())
            .ok_or(MatchError::OutOfRangeLookup {
                what: "clip",
                index: pose.clip.index(),
                len: set.clips.len(),
            })?;
        if clip.name.is_empty() || clip.name.contains(|c: char| matches!(c, ',' | '\n' | '\r')) {
            return Err(MatchError::malformed(
                line,
                format!("clip name {:?} is not a bare token", clip.name),
            ));
        }
        let q = pose
            .root_orientation
            .map(|q| [q.i, q.j, q.k, q.w])
            .unwrap_or([0.0; 4]);

        let mut row = Vec::with_capacity(COLUMNS.len());
        row.push(clip.name.clone());
        row.push(pose.frame.to_string());
        push_vec3(&mut row, &pose.root_position);
        row.extend(q.iter().map(|v| v.to_string()));
        push_vec3(&mut row, &pose.left_foot_position);
        push_vec3(&mut row, &pose.right_foot_position);
        push_vec3(&mut row, &pose.left_foot_velocity);
        push_vec3(&mut row, &pose.right_foot_velocity);
        push_vec3(&mut row, &pose.root_velocity);
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()?;
    Ok(())
}

pub fn encode_to_string(set: &FeatureSet) -> Result<String> {
    let mut buf = Vec::new();
    encode(set, &mut buf)?;
    String::from_utf8(buf).map_err(|e| MatchError::Serialization {
        reason: e.to_string(),
    })
}

fn push_vec3(row: &mut Vec<String>, v: &Vector3<f32>) {
    row.push(v.x.to_string());
    row.push(v.y.to_string());
    row.push(v.z.to_string());
}

/// Decode a table. Clip ids are assigned in order of first appearance and
/// anchors are derived with `forward_axis`.
///
/// Zero data rows (or an empty stream) decode to an empty set. Any bad row
/// fails the whole decode; no partial set is returned.
pub fn decode<R: BufRead>(reader: R, forward_axis: &Vector3<f32>) -> Result<FeatureSet> {
    let mut set = FeatureSet::default();
    let mut clip_ids: HashMap<String, ClipId> = HashMap::new();
    let mut header_len: Option<usize> = None;
    let mut blank_at: Option<usize> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() {
            blank_at.get_or_insert(line_no);
            continue;
        }
        if let Some(blank) = blank_at {
            return Err(MatchError::malformed(
                line_no,
                format!("row follows blank line {blank}"),
            ));
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let Some(expected) = header_len else {
            if fields.len() != COLUMNS.len() {
                return Err(MatchError::malformed(
                    line_no,
                    format!(
                        "header has {} labels, expected {}",
                        fields.len(),
                        COLUMNS.len()
                    ),
                ));
            }
            if let Some((col, label)) = fields
                .iter()
                .enumerate()
                .find(|(col, label)| **label != COLUMNS[*col])
            {
                return Err(MatchError::malformed(
                    line_no,
                    format!("column {col} is {label:?}, expected {:?}", COLUMNS[col]),
                ));
            }
            header_len = Some(fields.len());
            continue;
        };

        if fields.len() < expected {
            return Err(MatchError::malformed(
                line_no,
                format!("expected {expected} fields, found {}", fields.len()),
            ));
        }

        let name = fields[0];
        if name.is_empty() {
            return Err(MatchError::malformed(line_no, "empty clip name"));
        }
        let frame: u32 = fields[1].parse().map_err(|_| {
            MatchError::malformed(line_no, format!("Frame: invalid frame index {:?}", fields[1]))
        })?;

        let mut nums = [0.0f32; 22];
        for (i, slot) in nums.iter_mut().enumerate() {
            let col = i + 2;
            *slot = fields[col].parse().map_err(|_| {
                MatchError::malformed(
                    line_no,
                    format!("{}: invalid number {:?}", COLUMNS[col], fields[col]),
                )
            })?;
        }
        let v3 = |at: usize| Vector3::new(nums[at], nums[at + 1], nums[at + 2]);

        let clip = match clip_ids.get(name) {
            Some(id) => *id,
            None => {
                let id = ClipId(set.clips.len() as u32);
                clip_ids.insert(name.to_string(), id);
                set.clips.push(ClipEntry {
                    name: name.to_string(),
                    frame_count: 0,
                    frame_rate: None,
                });
                id
            }
        };
        let end = frame
            .checked_add(1)
            .ok_or_else(|| MatchError::malformed(line_no, "Frame: index out of range"))?;
        let entry = &mut set.clips[clip.index()];
        entry.frame_count = entry.frame_count.max(end);

        let q = Quaternion::new(nums[6], nums[3], nums[4], nums[5]);
        let root_orientation = if q.norm() == 0.0 {
            None
        } else {
            Some(UnitQuaternion::new_normalize(q))
        };

        let pose = PoseSample {
            clip,
            frame,
            root_position: v3(0),
            root_orientation,
            left_foot_position: v3(7),
            right_foot_position: v3(10),
            left_foot_velocity: v3(13),
            right_foot_velocity: v3(16),
            root_velocity: v3(19),
        };
        set.anchors.push(pose.anchor_point(forward_axis));
        set.poses.push(pose);
    }

    Ok(set)
}

pub fn decode_str(s: &str, forward_axis: &Vector3<f32>) -> Result<FeatureSet> {
    decode(s.as_bytes(), forward_axis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward() -> Vector3<f32> {
        Vector3::z()
    }

    fn row(name: &str, frame: u32) -> String {
        let mut fields = vec![name.to_string(), frame.to_string()];
        fields.extend((0..22).map(|i| format!("{}.5", i)));
        fields.join(",")
    }

    #[test]
    fn header_is_24_columns_in_contract_order() {
        assert_eq!(COLUMNS.len(), 24);
        assert_eq!(column_label(0).unwrap(), "ClipName");
        assert_eq!(column_label(8).unwrap(), "RootQ.w");
        assert_eq!(column_label(23).unwrap(), "RootV.z");
        assert_eq!(column_index("FootRightV.x"), Some(18));
        assert!(matches!(
            column_label(24),
            Err(MatchError::OutOfRangeLookup { index: 24, len: 24, .. })
        ));
    }

    #[test]
    fn empty_input_and_header_only_decode_to_empty_set() {
        assert!(decode_str("", &forward()).unwrap().is_empty());
        let header_only = format!("{}\n\n\n", COLUMNS.join(","));
        let set = decode_str(&header_only, &forward()).unwrap();
        assert!(set.is_empty());
        assert!(set.clips.is_empty());
    }

    #[test]
    fn columns_map_to_fields() {
        let text = format!("{}\n{}\n", COLUMNS.join(","), row("walk", 4));
        let set = decode_str(&text, &forward()).unwrap();
        let pose = &set.poses[0];
        assert_eq!(pose.frame, 4);
        assert_eq!(pose.root_position, Vector3::new(0.5, 1.5, 2.5));
        assert_eq!(pose.left_foot_position, Vector3::new(7.5, 8.5, 9.5));
        assert_eq!(pose.right_foot_position, Vector3::new(10.5, 11.5, 12.5));
        assert_eq!(pose.left_foot_velocity, Vector3::new(13.5, 14.5, 15.5));
        assert_eq!(pose.right_foot_velocity, Vector3::new(16.5, 17.5, 18.5));
        assert_eq!(pose.root_velocity, Vector3::new(19.5, 20.5, 21.5));
        assert!(pose.root_orientation.is_some());
        assert_eq!(set.clips[0].frame_count, 5);
        assert_eq!(set.anchors.len(), 1);
    }

    #[test]
    fn short_row_is_malformed() {
        let mut short: Vec<String> = row("walk", 0).split(',').map(String::from).collect();
        short.truncate(20);
        let text = format!("{}\n{}\n{}\n", COLUMNS.join(","), row("walk", 0), short.join(","));
        match decode_str(&text, &forward()) {
            Err(MatchError::MalformedRecord { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("found 20"), "{reason}");
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn unparsable_number_names_the_column() {
        let bad = row("walk", 0).replacen("2.5", "abc", 1);
        let text = format!("{}\n{}\n", COLUMNS.join(","), bad);
        let err = decode_str(&text, &forward()).unwrap_err();
        assert!(err.to_string().contains("RootT.z"), "{err}");
    }

    #[test]
    fn rows_after_blank_line_are_rejected() {
        let text = format!("{}\n{}\n\n{}\n", COLUMNS.join(","), row("a", 0), row("a", 1));
        assert!(matches!(
            decode_str(&text, &forward()),
            Err(MatchError::MalformedRecord { line: 4, .. })
        ));
    }

    #[test]
    fn frame_at_u32_max_is_malformed() {
        let text = format!("{}\n{}\n", COLUMNS.join(","), row("walk", u32::MAX));
        match decode_str(&text, &forward()) {
            Err(MatchError::MalformedRecord { line, reason }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("Frame"), "{reason}");
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn header_labels_must_match_column_order() {
        let mut labels = COLUMNS;
        labels.swap(2, 4);
        let text = format!("{}\n{}\n", labels.join(","), row("walk", 0));
        match decode_str(&text, &forward()) {
            Err(MatchError::MalformedRecord { line, reason }) => {
                assert_eq!(line, 1);
                assert!(reason.contains("RootT.z"), "{reason}");
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let text = format!("{}\r\n{}\r\n", COLUMNS.join(","), row("a", 0));
        assert_eq!(decode_str(&text, &forward()).unwrap().len(), 1);
    }

    #[test]
    fn zero_quaternion_round_trips_as_absent_orientation() {
        let set = FeatureSet {
            clips: vec![ClipEntry {
                name: "idle".into(),
                frame_count: 1,
                frame_rate: None,
            }],
            poses: vec![PoseSample::zeroed(ClipId(0), 0)],
            anchors: Vec::new(),
        };
        let text = encode_to_string(&set).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("idle,0,0,0,0,0,0,0,0,"));
        let back = decode_str(&text, &forward()).unwrap();
        assert_eq!(back.poses[0].root_orientation, None);
        assert_eq!(back.anchors[0].forward, Vector3::zeros());
    }

    #[test]
    fn clip_names_with_commas_are_refused() {
        let set = FeatureSet {
            clips: vec![ClipEntry {
                name: "walk,fast".into(),
                frame_count: 1,
                frame_rate: None,
            }],
            poses: vec![PoseSample::zeroed(ClipId(0), 0)],
            anchors: Vec::new(),
        };
        assert!(matches!(
            encode_to_string(&set),
            Err(MatchError::MalformedRecord { line: 2, .. })
        ));
    }
}

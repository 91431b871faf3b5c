//! Import and export of item poses as bone name and delta pairs.
//!
//! The text format has one line per bone:
//! ```text
//! bone name: rx ry rz px py pz
//! ```
//! Rotations are in degrees. Older files have no names and store three rotations
//! in radians on each line for every bone in order.
use std::fmt::Write;

use glam::Vec3;
use log::warn;

use crate::{
    error::PoseError,
    item::{BoneOverride, ItemPoseState},
    scene::{ItemId, Scene},
    skeleton::BoneDescriptor,
};

/// The changes to a single bone by name.
#[derive(Debug, PartialEq, Clone)]
pub struct BonePose {
    pub bone_name: String,
    pub position_delta: Vec3,
    /// XNALara Euler angles in radians.
    pub rotation_delta: Vec3,
}

/// The pose for every bone of an item in bone order.
pub fn export_pose(item: &ItemPoseState, skip_unused: bool) -> Vec<BonePose> {
    item.model()
        .bones
        .iter()
        .enumerate()
        .filter(|(_, bone)| !(skip_unused && bone.is_unused()))
        .map(|(i, bone)| {
            let o = item.bone_override(i);
            BonePose {
                bone_name: bone.name.clone(),
                position_delta: o.position_delta,
                rotation_delta: o.rotation_delta,
            }
        })
        .collect()
}

/// The pose for an item and every item attached to it.
/// See [combined_bones](Scene::combined_bones).
pub fn export_combined_pose(
    scene: &Scene,
    id: ItemId,
    skip_unused: bool,
) -> Result<Vec<BonePose>, PoseError> {
    let mut pose = Vec::new();
    for (item_id, bone_index) in scene.combined_bones(id)? {
        let item = scene.item(item_id)?;
        let bone = &item.model().bones[bone_index];
        if skip_unused && bone.is_unused() {
            continue;
        }
        let o = item.bone_override(bone_index);
        pose.push(BonePose {
            bone_name: bone.name.clone(),
            position_delta: o.position_delta,
            rotation_delta: o.rotation_delta,
        });
    }
    Ok(pose)
}

/// Set the overrides for each bone in `pose` by name and return the number of bones changed.
///
/// Bones not in the pose keep their current values.
/// Names not found in the model are ignored.
pub fn apply_pose(item: &mut ItemPoseState, pose: &[BonePose]) -> Result<usize, PoseError> {
    let mut count = 0;
    for bone_pose in pose {
        match item.model().bone_index(&bone_pose.bone_name) {
            Some(index) => {
                item.set_bone_override(
                    index,
                    BoneOverride {
                        position_delta: bone_pose.position_delta,
                        rotation_delta: bone_pose.rotation_delta,
                    },
                )?;
                count += 1;
            }
            None => warn!("Skipping pose for unknown bone {:?}.", bone_pose.bone_name),
        }
    }
    Ok(count)
}

/// Write the pose text format with rotations in degrees and CRLF line endings.
pub fn write_pose(pose: &[BonePose]) -> String {
    let mut text = String::new();
    for bone in pose {
        let r = bone.rotation_delta;
        let p = bone.position_delta;
        // Writing to a String can't fail.
        let _ = write!(
            text,
            "{}: {} {} {} {} {} {}\r\n",
            bone.bone_name,
            r.x.to_degrees(),
            r.y.to_degrees(),
            r.z.to_degrees(),
            p.x,
            p.y,
            p.z
        );
    }
    text
}

/// Parse pose text for a model with `bones`.
///
/// Text without any `:` uses the older format with one line per bone in bone order.
/// A final line break does not count as an extra line.
/// Missing values on a line are `0.0` for both formats.
pub fn parse_pose(text: &str, bones: &[BoneDescriptor]) -> Result<Vec<BonePose>, PoseError> {
    if text.contains(':') {
        parse_named_pose(text)
    } else {
        parse_legacy_pose(text, bones)
    }
}

fn parse_named_pose(text: &str) -> Result<Vec<BonePose>, PoseError> {
    let mut pose = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let Some((name, values)) = line.split_once(':') else {
            continue;
        };

        let values = parse_values(values, i + 1)?;
        let value = |index: usize| values.get(index).copied().unwrap_or_default();
        pose.push(BonePose {
            bone_name: name.to_string(),
            rotation_delta: Vec3::new(value(0), value(1), value(2)).map(f32::to_radians),
            position_delta: Vec3::new(value(3), value(4), value(5)),
        });
    }
    Ok(pose)
}

fn parse_legacy_pose(text: &str, bones: &[BoneDescriptor]) -> Result<Vec<BonePose>, PoseError> {
    let lines: Vec<_> = text.lines().collect();
    if lines.len() != bones.len() {
        return Err(PoseError::BoneCountMismatch {
            line_count: lines.len(),
            bone_count: bones.len(),
        });
    }

    lines
        .iter()
        .zip(bones)
        .enumerate()
        .map(|(i, (line, bone))| {
            let values = parse_values(line, i + 1)?;
            let value = |index: usize| values.get(index).copied().unwrap_or_default();
            Ok(BonePose {
                bone_name: bone.name.clone(),
                position_delta: Vec3::ZERO,
                rotation_delta: Vec3::new(value(0), value(1), value(2)),
            })
        })
        .collect()
}

fn parse_values(text: &str, line: usize) -> Result<Vec<f32>, PoseError> {
    text.split_whitespace()
        .map(|v| {
            v.parse().map_err(|_| PoseError::InvalidPoseLine {
                line,
                reason: format!("invalid number {v:?}"),
            })
        })
        .collect()
}

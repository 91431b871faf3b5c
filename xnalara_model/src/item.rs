//! Per item pose and mesh settings on top of a shared [ModelDescriptor].
//!
//! Overrides are sparse. Bones and meshes without an override use the model's values.
use std::{collections::BTreeMap, sync::Arc};

use glam::{Mat4, Vec3};
use indexmap::IndexMap;

use crate::{
    error::PoseError,
    mesh::{CullFaceMode, RenderParameterValue, TextureAssignment},
    model::ModelDescriptor,
    scene::ItemId,
    skeleton::descendants,
    transform::normalize_angles,
};

/// Changes to a bone relative to its rest pose.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct BoneOverride {
    pub position_delta: Vec3,
    /// XNALara Euler angles in radians from `0.0` to `TAU`.
    pub rotation_delta: Vec3,
}

impl BoneOverride {
    pub fn is_identity(&self) -> bool {
        self.position_delta == Vec3::ZERO && self.rotation_delta == Vec3::ZERO
    }
}

/// Changes to a mesh's default material settings.
/// `None` and missing entries use the mesh's value.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct MeshOverride {
    pub visible: Option<bool>,
    pub cull_face_mode: Option<CullFaceMode>,
    pub render_parameters: IndexMap<String, RenderParameterValue>,
    pub textures: IndexMap<String, TextureAssignment>,
}

/// The bone of another item that an item's root bones are placed under.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Attachment {
    pub parent: ItemId,
    pub bone_index: usize,
}

/// The pose and settings of a single placed instance of a model.
///
/// Every change that affects bone transforms increments the [revision](Self::revision)
/// so a [Scene](crate::scene::Scene) can tell when cached transforms are stale.
#[derive(Debug, Clone)]
pub struct ItemPoseState {
    model: Arc<ModelDescriptor>,
    bone_overrides: BTreeMap<usize, BoneOverride>,
    mesh_overrides: BTreeMap<usize, MeshOverride>,
    attachment: Option<Attachment>,
    revision: u64,
}

impl ItemPoseState {
    pub fn new(model: Arc<ModelDescriptor>) -> Self {
        Self {
            model,
            bone_overrides: BTreeMap::new(),
            mesh_overrides: BTreeMap::new(),
            attachment: None,
            revision: 0,
        }
    }

    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    /// Replace the model while keeping overrides for bones and meshes that still exist.
    pub fn set_model(&mut self, model: Arc<ModelDescriptor>) {
        let bone_count = model.bones.len();
        let mesh_count = model.meshes.len();
        self.bone_overrides.retain(|i, _| *i < bone_count);
        self.mesh_overrides.retain(|i, _| *i < mesh_count);
        self.model = model;
        self.changed();
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn changed(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.attachment
    }

    pub(crate) fn set_attachment(&mut self, attachment: Option<Attachment>) {
        self.attachment = attachment;
        self.changed();
    }

    fn check_bone(&self, bone_index: usize) -> Result<(), PoseError> {
        let bone_count = self.model.bones.len();
        if bone_index < bone_count {
            Ok(())
        } else {
            Err(PoseError::InvalidBoneIndex {
                bone_index,
                bone_count,
            })
        }
    }

    /// The override for `bone_index` or no changes if the bone has no override.
    pub fn bone_override(&self, bone_index: usize) -> BoneOverride {
        self.bone_overrides
            .get(&bone_index)
            .copied()
            .unwrap_or_default()
    }

    /// Bone indices and their overrides in ascending order.
    pub fn bone_overrides(&self) -> impl Iterator<Item = (usize, &BoneOverride)> {
        self.bone_overrides.iter().map(|(i, o)| (*i, o))
    }

    pub fn set_bone_override(
        &mut self,
        bone_index: usize,
        bone_override: BoneOverride,
    ) -> Result<(), PoseError> {
        self.check_bone(bone_index)?;
        let bone_override = BoneOverride {
            rotation_delta: normalize_angles(bone_override.rotation_delta),
            ..bone_override
        };
        if bone_override.is_identity() {
            self.bone_overrides.remove(&bone_index);
        } else {
            self.bone_overrides.insert(bone_index, bone_override);
        }
        self.changed();
        Ok(())
    }

    pub fn set_bone_position_delta(
        &mut self,
        bone_index: usize,
        position_delta: Vec3,
    ) -> Result<(), PoseError> {
        let current = self.bone_override(bone_index);
        self.set_bone_override(
            bone_index,
            BoneOverride {
                position_delta,
                ..current
            },
        )
    }

    /// Set the rotation in radians. Angles are wrapped to the range `0.0` to `TAU`.
    pub fn set_bone_rotation_delta(
        &mut self,
        bone_index: usize,
        rotation_delta: Vec3,
    ) -> Result<(), PoseError> {
        let current = self.bone_override(bone_index);
        self.set_bone_override(
            bone_index,
            BoneOverride {
                rotation_delta,
                ..current
            },
        )
    }

    /// Clear the override for a single bone.
    pub fn reset_bone(&mut self, bone_index: usize) -> Result<(), PoseError> {
        self.check_bone(bone_index)?;
        self.bone_overrides.remove(&bone_index);
        self.changed();
        Ok(())
    }

    /// Clear the overrides for a bone and its descendants.
    /// Bones of attached items are not affected.
    pub fn reset_bone_recursive(&mut self, bone_index: usize) -> Result<(), PoseError> {
        self.check_bone(bone_index)?;
        for i in descendants(&self.model.bones, bone_index) {
            self.bone_overrides.remove(&i);
        }
        self.changed();
        Ok(())
    }

    pub fn reset_pose(&mut self) {
        self.bone_overrides.clear();
        self.changed();
    }

    pub fn mesh_override(&self, mesh_index: usize) -> Option<&MeshOverride> {
        self.mesh_overrides.get(&mesh_index)
    }

    /// The override for `mesh_index`, inserting an empty override if needed.
    /// Returns `None` if the model has no mesh at `mesh_index`.
    pub fn mesh_override_mut(&mut self, mesh_index: usize) -> Option<&mut MeshOverride> {
        if mesh_index < self.model.meshes.len() {
            Some(self.mesh_overrides.entry(mesh_index).or_default())
        } else {
            None
        }
    }

    pub fn reset_mesh(&mut self, mesh_index: usize) {
        self.mesh_overrides.remove(&mesh_index);
    }

    pub fn mesh_visible(&self, mesh_index: usize) -> bool {
        self.mesh_override(mesh_index)
            .and_then(|o| o.visible)
            .or_else(|| self.model.meshes.get(mesh_index).map(|m| m.initially_visible))
            .unwrap_or_default()
    }

    pub fn mesh_cull_face_mode(&self, mesh_index: usize) -> CullFaceMode {
        self.mesh_override(mesh_index)
            .and_then(|o| o.cull_face_mode)
            .or_else(|| self.model.meshes.get(mesh_index).map(|m| m.cull_face_mode))
            .unwrap_or_default()
    }

    pub fn mesh_render_parameter(
        &self,
        mesh_index: usize,
        name: &str,
    ) -> Option<RenderParameterValue> {
        self.mesh_override(mesh_index)
            .and_then(|o| o.render_parameters.get(name))
            .or_else(|| {
                self.model
                    .meshes
                    .get(mesh_index)?
                    .render_parameter_defaults
                    .get(name)
            })
            .copied()
    }

    /// The mesh's default render parameters with any overridden values replaced.
    pub fn mesh_render_parameters(
        &self,
        mesh_index: usize,
    ) -> IndexMap<String, RenderParameterValue> {
        let mut parameters = self
            .model
            .meshes
            .get(mesh_index)
            .map(|m| m.render_parameter_defaults.clone())
            .unwrap_or_default();
        if let Some(o) = self.mesh_override(mesh_index) {
            parameters.extend(o.render_parameters.clone());
        }
        parameters
    }

    /// The mesh's textures by role with any overridden textures replaced.
    pub fn mesh_textures(&self, mesh_index: usize) -> IndexMap<String, TextureAssignment> {
        let mut textures = self
            .model
            .meshes
            .get(mesh_index)
            .map(|m| m.textures.clone())
            .unwrap_or_default();
        if let Some(o) = self.mesh_override(mesh_index) {
            textures.extend(o.textures.clone());
        }
        textures
    }

    /// The transform of each bone relative to its parent including overrides.
    pub fn relative_transforms(&self) -> Vec<Mat4> {
        self.model
            .bones
            .iter()
            .enumerate()
            .map(|(i, bone)| {
                let o = self.bone_override(i);
                bone.relative_transform(o.position_delta, o.rotation_delta)
            })
            .collect()
    }

    /// See [compute_global_transforms].
    pub fn compute_global_transforms(&self, root_transform: Mat4) -> Vec<Mat4> {
        compute_global_transforms(&self.model, &self.bone_overrides, root_transform)
    }
}

/// The model space transform of each bone with `overrides` applied.
///
/// Root bones are placed under `root_transform`,
/// which is the identity for items that are not attached to another item.
pub fn compute_global_transforms(
    model: &ModelDescriptor,
    overrides: &BTreeMap<usize, BoneOverride>,
    root_transform: Mat4,
) -> Vec<Mat4> {
    let mut transforms = vec![Mat4::IDENTITY; model.bones.len()];
    for i in model.evaluation_order.iter().copied() {
        let Some(bone) = model.bones.get(i) else {
            continue;
        };
        let o = overrides.get(&i).copied().unwrap_or_default();
        let relative = bone.relative_transform(o.position_delta, o.rotation_delta);
        let parent_transform = match bone.parent_index {
            Some(p) => transforms[p],
            None => root_transform,
        };
        transforms[i] = parent_transform * relative;
    }
    transforms
}

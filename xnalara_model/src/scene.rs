//! Items and their attachments with cached bone transforms.
//!
//! Items are stored in an arena and referenced by [ItemId].
//! An item attached to a bone of another item has its root bones placed under that bone.
//!
//! Global transforms are computed on demand.
//! Each item's cache stores the [revision](ItemPoseState::revision) it was computed from
//! and the stamp of the parent's transforms, so changes to a parent
//! invalidate every item attached to it without explicit notifications.
use std::{collections::VecDeque, sync::Arc};

use glam::{Mat4, Vec3};
use log::error;

use crate::{
    error::PoseError,
    item::{Attachment, ItemPoseState},
    mesh::MAX_BONES_PER_MESH,
    model::ModelDescriptor,
};

/// A handle to an item in a [Scene].
/// Handles to removed items are never reused.
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct ItemId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<ItemEntry>,
}

#[derive(Debug)]
struct ItemEntry {
    state: ItemPoseState,
    cache: Option<TransformCache>,
}

#[derive(Debug)]
struct TransformCache {
    transforms: Vec<Mat4>,
    revision: u64,
    parent_stamp: Option<u64>,
    stamp: u64,
}

/// A collection of posed items.
#[derive(Debug, Default)]
pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_stamp: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, model: Arc<ModelDescriptor>) -> ItemId {
        let entry = ItemEntry {
            state: ItemPoseState::new(model),
            cache: None,
        };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                ItemId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ItemId {
                    index: self.slots.len() as u32 - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Remove an item and detach any items attached to it.
    pub fn remove_item(&mut self, id: ItemId) -> Result<ItemPoseState, PoseError> {
        self.entry(id)?;
        for child in self.children(id) {
            if let Ok(entry) = self.entry_mut(child) {
                entry.state.set_attachment(None);
            }
        }

        let slot = &mut self.slots[id.index as usize];
        let entry = slot.entry.take().ok_or(PoseError::InvalidItem(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(entry.state)
    }

    /// The ids of all items in arena order.
    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entry.as_ref().map(|_| ItemId {
                index: i as u32,
                generation: slot.generation,
            })
        })
    }

    pub fn item(&self, id: ItemId) -> Result<&ItemPoseState, PoseError> {
        self.entry(id).map(|e| &e.state)
    }

    /// Changes to the item's pose are detected the next time transforms are read.
    pub fn item_mut(&mut self, id: ItemId) -> Result<&mut ItemPoseState, PoseError> {
        self.entry_mut(id).map(|e| &mut e.state)
    }

    fn entry(&self, id: ItemId) -> Result<&ItemEntry, PoseError> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
            .ok_or(PoseError::InvalidItem(id))
    }

    fn entry_mut(&mut self, id: ItemId) -> Result<&mut ItemEntry, PoseError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_mut())
            .ok_or(PoseError::InvalidItem(id))
    }

    /// Place the root bones of `child` under bone `bone_index` of `parent`.
    pub fn attach(
        &mut self,
        child: ItemId,
        parent: ItemId,
        bone_index: usize,
    ) -> Result<(), PoseError> {
        self.entry(child)?;
        let bone_count = self.entry(parent)?.state.model().bones.len();
        if bone_index >= bone_count {
            return Err(PoseError::InvalidBoneIndex {
                bone_index,
                bone_count,
            });
        }

        // The child can't be an ancestor of the parent.
        let mut current = Some(parent);
        while let Some(id) = current {
            if id == child {
                return Err(PoseError::AttachmentCycle { child, parent });
            }
            current = self.entry(id)?.state.attachment().map(|a| a.parent);
        }

        self.entry_mut(child)?
            .state
            .set_attachment(Some(Attachment { parent, bone_index }));
        Ok(())
    }

    pub fn detach(&mut self, child: ItemId) -> Result<(), PoseError> {
        self.entry_mut(child)?.state.set_attachment(None);
        Ok(())
    }

    /// The items directly attached to `id`.
    pub fn children(&self, id: ItemId) -> Vec<ItemId> {
        self.items()
            .filter(|child| {
                self.entry(*child)
                    .ok()
                    .and_then(|e| e.state.attachment())
                    .is_some_and(|a| a.parent == id)
            })
            .collect()
    }

    /// Recompute the transforms for `id` and any items it is attached to if needed.
    pub fn resolve(&mut self, id: ItemId) -> Result<(), PoseError> {
        self.resolve_item(id, 0).map(|_| ())
    }

    fn resolve_item(&mut self, id: ItemId, depth: usize) -> Result<u64, PoseError> {
        let attachment = self.entry(id)?.state.attachment();
        if depth > self.slots.len() {
            let parent = attachment.map(|a| a.parent).unwrap_or(id);
            error!("Attachment cycle detected while resolving {id:?}.");
            return Err(PoseError::AttachmentCycle { child: id, parent });
        }

        let (root_transform, parent_stamp) = match attachment {
            Some(Attachment { parent, bone_index }) => {
                let stamp = self.resolve_item(parent, depth + 1)?;
                let parent_cache = self.entry(parent)?.cache.as_ref();
                let root_transform = parent_cache
                    .and_then(|c| c.transforms.get(bone_index).copied())
                    .ok_or(PoseError::InvalidBoneIndex {
                        bone_index,
                        bone_count: parent_cache.map(|c| c.transforms.len()).unwrap_or_default(),
                    })?;
                (root_transform, Some(stamp))
            }
            None => (Mat4::IDENTITY, None),
        };

        let stamp = self.next_stamp;
        let entry = self.entry_mut(id)?;
        if let Some(cache) = &entry.cache
            && cache.revision == entry.state.revision()
            && cache.parent_stamp == parent_stamp
        {
            return Ok(cache.stamp);
        }

        entry.cache = Some(TransformCache {
            transforms: entry.state.compute_global_transforms(root_transform),
            revision: entry.state.revision(),
            parent_stamp,
            stamp,
        });
        self.next_stamp += 1;
        Ok(stamp)
    }

    /// Resolve every item with parents before the items attached to them.
    #[tracing::instrument(skip_all)]
    pub fn resolve_all(&mut self) -> Result<(), PoseError> {
        for id in self.resolve_order()? {
            self.resolve(id)?;
        }
        Ok(())
    }

    /// A topological order of the attachment graph.
    pub fn resolve_order(&self) -> Result<Vec<ItemId>, PoseError> {
        let ids: Vec<_> = self.items().collect();

        let mut queue: VecDeque<_> = ids
            .iter()
            .copied()
            .filter(|id| self.attachment_parent(*id).is_none())
            .collect();

        let mut order = Vec::with_capacity(ids.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.children(id));
        }

        if order.len() < ids.len() {
            let child = ids
                .iter()
                .copied()
                .find(|id| !order.contains(id))
                .ok_or(PoseError::InvalidItem(ids[0]))?;
            let parent = self.attachment_parent(child).unwrap_or(child);
            return Err(PoseError::AttachmentCycle { child, parent });
        }
        Ok(order)
    }

    fn attachment_parent(&self, id: ItemId) -> Option<ItemId> {
        let parent = self.entry(id).ok()?.state.attachment()?.parent;
        // Items attached to removed items act as top level items.
        self.entry(parent).ok().map(|_| parent)
    }

    /// The model space transform for each bone of an item including any attachment.
    pub fn global_transforms(&mut self, id: ItemId) -> Result<&[Mat4], PoseError> {
        self.resolve(id)?;
        self.entry(id)?
            .cache
            .as_ref()
            .map(|c| c.transforms.as_slice())
            .ok_or(PoseError::InvalidItem(id))
    }

    pub fn global_transform(&mut self, id: ItemId, bone_index: usize) -> Result<Mat4, PoseError> {
        let transforms = self.global_transforms(id)?;
        transforms
            .get(bone_index)
            .copied()
            .ok_or(PoseError::InvalidBoneIndex {
                bone_index,
                bone_count: transforms.len(),
            })
    }

    /// The translation of a bone's global transform.
    pub fn global_position(&mut self, id: ItemId, bone_index: usize) -> Result<Vec3, PoseError> {
        self.global_transform(id, bone_index)
            .map(|t| t.w_axis.truncate())
    }

    /// Transforms that move vertices from the rest pose to the current pose for each bone.
    pub fn skinning_transforms(&mut self, id: ItemId) -> Result<Vec<Mat4>, PoseError> {
        let model = self.item(id)?.model().clone();
        let transforms = self.global_transforms(id)?;
        Ok(transforms
            .iter()
            .zip(&model.bones)
            .map(|(t, b)| *t * b.inverse_local_matrix)
            .collect())
    }

    /// The skinning transforms indexed by a mesh's vertex bone indices.
    ///
    /// Meshes without a bone index remap use the model's bone indices directly.
    pub fn mesh_bone_matrices(
        &mut self,
        id: ItemId,
        mesh_index: usize,
    ) -> Result<Vec<Mat4>, PoseError> {
        let model = self.item(id)?.model().clone();
        let skinning = self.skinning_transforms(id)?;

        let Some(mesh) = model.meshes.get(mesh_index) else {
            return Ok(Vec::new());
        };
        if mesh.bone_index_remap.is_empty() {
            return Ok(skinning);
        }

        Ok(mesh
            .bone_index_remap
            .iter()
            .take(MAX_BONES_PER_MESH)
            .map(|i| skinning.get(*i).copied().unwrap_or(Mat4::IDENTITY))
            .collect())
    }

    /// The average global position of the bones for a camera target
    /// or `None` if none of the bones exist.
    pub fn camera_target_position(
        &mut self,
        id: ItemId,
        target: &str,
    ) -> Result<Option<Vec3>, PoseError> {
        let bone_indices = self.item(id)?.model().camera_target_bone_indices(target);
        if bone_indices.is_empty() {
            return Ok(None);
        }

        let transforms = self.global_transforms(id)?;
        let sum: Vec3 = bone_indices
            .iter()
            .filter_map(|i| transforms.get(*i))
            .map(|t| t.w_axis.truncate())
            .sum();
        Ok(Some(sum / bone_indices.len() as f32))
    }

    /// The bones of an item followed by the bones of every item attached to it in depth first order.
    pub fn combined_bones(&self, id: ItemId) -> Result<Vec<(ItemId, usize)>, PoseError> {
        let mut bones = Vec::new();
        let mut stack = vec![id];
        let mut visited = Vec::new();
        while let Some(current) = stack.pop() {
            if visited.contains(&current) {
                return Err(PoseError::AttachmentCycle {
                    child: current,
                    parent: id,
                });
            }
            visited.push(current);

            let bone_count = self.item(current)?.model().bones.len();
            bones.extend((0..bone_count).map(|i| (current, i)));
            stack.extend(self.children(current).into_iter().rev());
        }
        Ok(bones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{f32::consts::FRAC_PI_2, path::PathBuf};

    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use xnalara_lib::xps::Version;

    use crate::{params::ModelParams, skeleton::BoneDescriptor};

    fn model(bones: Vec<BoneDescriptor>) -> Arc<ModelDescriptor> {
        Arc::new(ModelDescriptor {
            root_bone_indices: crate::skeleton::root_bone_indices(&bones),
            evaluation_order: crate::skeleton::evaluation_order(&bones),
            bones,
            meshes: Vec::new(),
            camera_targets: IndexMap::from([(
                "hands".to_string(),
                vec!["mid".to_string(), "tip".to_string(), "missing".to_string()],
            )]),
            base_path: PathBuf::new(),
            header: None,
        })
    }

    fn chain() -> Arc<ModelDescriptor> {
        model(vec![
            BoneDescriptor::new("root".to_string(), None, Vec3::ZERO, Vec3::ZERO),
            BoneDescriptor::new("mid".to_string(), Some(0), Vec3::X, Vec3::ZERO),
            BoneDescriptor::new("tip".to_string(), Some(1), Vec3::new(2.0, 0.0, 0.0), Vec3::X),
        ])
    }

    fn single_bone() -> Arc<ModelDescriptor> {
        model(vec![BoneDescriptor::new(
            "handle".to_string(),
            None,
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::ZERO,
        )])
    }

    #[test]
    fn transform_cascade() {
        let mut scene = Scene::new();
        let id = scene.add_item(chain());

        let before = scene.global_transforms(id).unwrap().to_vec();
        let relative = scene.item(id).unwrap().relative_transforms();
        assert_matrix_relative_eq!(before[0] * relative[1] * relative[2], before[2]);

        scene
            .item_mut(id)
            .unwrap()
            .set_bone_position_delta(0, Vec3::new(0.0, 5.0, 0.0))
            .unwrap();
        let after = scene.global_transforms(id).unwrap().to_vec();

        assert_eq!(
            before[2].w_axis.truncate() + Vec3::new(0.0, 5.0, 0.0),
            after[2].w_axis.truncate()
        );
        assert_eq!(before[1].x_axis, after[1].x_axis);
        assert_eq!(before[1].y_axis, after[1].y_axis);
        assert_eq!(before[1].z_axis, after[1].z_axis);
    }

    #[test]
    fn attachment_composition() {
        let mut scene = Scene::new();
        let a = scene.add_item(chain());
        let b = scene.add_item(single_bone());
        scene.attach(b, a, 2).unwrap();

        scene
            .item_mut(a)
            .unwrap()
            .set_bone_rotation_delta(1, Vec3::new(0.0, 0.0, FRAC_PI_2))
            .unwrap();

        let hand = scene.global_transform(a, 2).unwrap();
        let relative = scene.item(b).unwrap().relative_transforms();
        let handle = scene.global_transform(b, 0).unwrap();
        assert_matrix_relative_eq!(hand * relative[0], handle);

        let position = scene.global_position(b, 0).unwrap();
        assert_relative_eq!(1.0, position.x, epsilon = 0.0001);
        assert_relative_eq!(1.0, position.y, epsilon = 0.0001);
        assert_relative_eq!(1.0, position.z, epsilon = 0.0001);
    }

    #[test]
    fn parent_changes_invalidate_children() {
        let mut scene = Scene::new();
        let a = scene.add_item(chain());
        let b = scene.add_item(single_bone());
        scene.attach(b, a, 0).unwrap();
        assert_eq!(Vec3::new(0.0, 0.0, 1.0), scene.global_position(b, 0).unwrap());

        scene
            .item_mut(a)
            .unwrap()
            .set_bone_position_delta(0, Vec3::new(3.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(Vec3::new(3.0, 0.0, 1.0), scene.global_position(b, 0).unwrap());

        scene.detach(b).unwrap();
        assert_eq!(Vec3::new(0.0, 0.0, 1.0), scene.global_position(b, 0).unwrap());
    }

    #[test]
    fn attachment_cycle() {
        let mut scene = Scene::new();
        let a = scene.add_item(chain());
        let b = scene.add_item(chain());
        scene.attach(b, a, 0).unwrap();
        assert_eq!(
            Err(PoseError::AttachmentCycle {
                child: a,
                parent: b
            }),
            scene.attach(a, b, 0)
        );
        assert_eq!(
            Err(PoseError::AttachmentCycle {
                child: a,
                parent: a
            }),
            scene.attach(a, a, 1)
        );
        assert_eq!(vec![a, b], scene.resolve_order().unwrap());
        scene.resolve_all().unwrap();
    }

    #[test]
    fn attach_invalid_bone() {
        let mut scene = Scene::new();
        let a = scene.add_item(single_bone());
        let b = scene.add_item(single_bone());
        assert_eq!(
            Err(PoseError::InvalidBoneIndex {
                bone_index: 1,
                bone_count: 1
            }),
            scene.attach(b, a, 1)
        );
    }

    #[test]
    fn removed_items() {
        let mut scene = Scene::new();
        let a = scene.add_item(chain());
        let b = scene.add_item(single_bone());
        scene.attach(b, a, 2).unwrap();

        scene.remove_item(a).unwrap();
        assert_eq!(Err(PoseError::InvalidItem(a)), scene.item(a).map(|_| ()));
        assert_eq!(None, scene.item(b).unwrap().attachment());

        // The slot is reused with a new handle.
        let c = scene.add_item(chain());
        assert_ne!(a, c);
        assert_eq!(vec![c, b], scene.items().collect::<Vec<_>>());
    }

    #[test]
    fn skinning_transforms_rest_pose() {
        let mut scene = Scene::new();
        let id = scene.add_item(chain());
        for transform in scene.skinning_transforms(id).unwrap() {
            assert_matrix_relative_eq!(Mat4::IDENTITY, transform);
        }
    }

    #[test]
    fn camera_target_average() {
        let mut scene = Scene::new();
        let id = scene.add_item(chain());
        assert_eq!(
            Some(Vec3::new(1.5, 0.0, 0.0)),
            scene.camera_target_position(id, "hands").unwrap()
        );
        assert_eq!(None, scene.camera_target_position(id, "feet").unwrap());
    }

    #[test]
    fn combined_bones_hierarchy() {
        let mut scene = Scene::new();
        let a = scene.add_item(chain());
        let b = scene.add_item(single_bone());
        let c = scene.add_item(single_bone());
        scene.attach(c, b, 0).unwrap();
        scene.attach(b, a, 1).unwrap();

        assert_eq!(
            vec![(a, 0), (a, 1), (a, 2), (b, 0), (c, 0)],
            scene.combined_bones(a).unwrap()
        );
        assert_eq!(vec![a, b, c], scene.resolve_order().unwrap());
    }

    #[test]
    fn binary_file_end_to_end() {
        let text = indoc::indoc! {"
            2
            root
            -1
            0 0 0
            arm
            0
            1 0 0
            1
            body
            1
            0
            3
            0 0 0
            0 0 1
            255 255 255 255
            0 0
            1 0 0 0
            1 0 0 0
            1 0 0
            0 0 1
            255 255 255 255
            1 0
            1 0 0 0
            1 0 0 0
            0 1 0
            0 0 1
            255 255 255 255
            0 1
            1 0 0 0
            1 0 0 0
            1
            0 1 2
        "};
        let bytes = ModelDescriptor::load_ascii(text, &ModelParams::default(), PathBuf::new(), None)
            .unwrap()
            .write_binary(Version::V3)
            .unwrap();
        let model =
            ModelDescriptor::load_binary(&bytes, &ModelParams::default(), PathBuf::new()).unwrap();

        let mut scene = Scene::new();
        let id = scene.add_item(Arc::new(model));
        scene
            .item_mut(id)
            .unwrap()
            .set_bone_position_delta(0, Vec3::new(0.0, 5.0, 0.0))
            .unwrap();

        assert_eq!(Vec3::new(1.0, 5.0, 0.0), scene.global_position(id, 1).unwrap());

        // Every vertex is weighted to the arm, so the skinned mesh moves with it.
        let matrices = scene.mesh_bone_matrices(id, 0).unwrap();
        assert_eq!(
            Vec3::new(1.0, 6.0, 0.0),
            matrices[1].transform_point3(Vec3::new(1.0, 1.0, 0.0))
        );
    }
}

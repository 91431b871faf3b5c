//! Bone hierarchies stored as a flat list with parent indices.
//!
//! Bones never store references to other bones.
//! Navigation functions like [parent] and [children] take the owning bone list
//! and return indices into it.
use glam::{Mat4, Vec3};
use log::warn;

use crate::{error::LoadModelError, transform::rotation_matrix};

/// A single bone in the rest pose of a model.
#[derive(Debug, PartialEq, Clone)]
pub struct BoneDescriptor {
    /// The name used by poses and camera targets to identify this bone.
    pub name: String,
    /// The index of the parent bone in the model's bones or `None` if this is a root bone.
    pub parent_index: Option<usize>,
    /// The rest position in model space as stored in the file.
    pub position: Vec3,
    /// The rest offset from the parent bone's position.
    pub rest_position: Vec3,
    /// Moves vertices from the origin to the bone's rest position.
    pub local_matrix: Mat4,
    /// Moves vertices from the bone's rest position to the origin.
    pub inverse_local_matrix: Mat4,
}

impl BoneDescriptor {
    /// Create bones from file data after checking parent indices and cycles.
    pub fn from_xps_bones(bones: &[xnalara_lib::xps::Bone]) -> Result<Vec<Self>, LoadModelError> {
        let bone_count = bones.len();
        for (i, bone) in bones.iter().enumerate() {
            if let Some(parent_index) = bone.parent_index.map(usize::from)
                && parent_index >= bone_count
            {
                return Err(LoadModelError::ParentIndexOutOfRange {
                    bone: i,
                    parent_index,
                    bone_count,
                });
            }
        }

        let parent_indices: Vec<_> = bones
            .iter()
            .map(|b| b.parent_index.map(usize::from))
            .collect();
        if let Some(i) = find_cycle(&parent_indices) {
            return Err(LoadModelError::CircularReference {
                bone: bones[i].name.clone(),
            });
        }

        Ok(bones
            .iter()
            .zip(&parent_indices)
            .map(|(bone, parent_index)| {
                let position = Vec3::from_array(bone.position);
                let parent_position = parent_index
                    .map(|p| Vec3::from_array(bones[p].position))
                    .unwrap_or(Vec3::ZERO);
                Self::new(bone.name.clone(), *parent_index, position, parent_position)
            })
            .collect())
    }

    pub fn new(
        name: String,
        parent_index: Option<usize>,
        position: Vec3,
        parent_position: Vec3,
    ) -> Self {
        Self {
            name,
            parent_index,
            position,
            rest_position: position - parent_position,
            local_matrix: Mat4::from_translation(position),
            inverse_local_matrix: Mat4::from_translation(-position),
        }
    }

    /// The transform relative to the parent bone with the given pose deltas applied.
    pub fn relative_transform(&self, position_delta: Vec3, rotation_delta: Vec3) -> Mat4 {
        Mat4::from_translation(self.rest_position + position_delta)
            * rotation_matrix(rotation_delta)
    }

    /// Bones with names starting with "unused" are placeholders in many XNALara models.
    pub fn is_unused(&self) -> bool {
        self.name.starts_with("unused")
    }
}

/// The first bone that is its own ancestor.
/// A parent chain longer than the bone count must contain a cycle.
fn find_cycle(parent_indices: &[Option<usize>]) -> Option<usize> {
    (0..parent_indices.len()).find(|i| {
        let mut current = *i;
        for _ in 0..parent_indices.len() {
            match parent_indices[current] {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        true
    })
}

pub fn parent(bones: &[BoneDescriptor], index: usize) -> Option<usize> {
    bones.get(index).and_then(|b| b.parent_index)
}

/// The direct children of the bone at `index` in bone order.
pub fn children(bones: &[BoneDescriptor], index: usize) -> Vec<usize> {
    bones
        .iter()
        .enumerate()
        .filter_map(|(i, b)| (b.parent_index == Some(index)).then_some(i))
        .collect()
}

pub fn root_bone_indices(bones: &[BoneDescriptor]) -> Vec<usize> {
    bones
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.parent_index.is_none().then_some(i))
        .collect()
}

/// The bone at `index` followed by all of its descendants in depth first order.
pub fn descendants(bones: &[BoneDescriptor], index: usize) -> Vec<usize> {
    BoneHierarchy::new(bones).descendants(index)
}

/// An order where every bone appears after its parent.
///
/// Files usually store bones in this order already,
/// so this matches the bone order in most cases.
pub fn evaluation_order(bones: &[BoneDescriptor]) -> Vec<usize> {
    let hierarchy = BoneHierarchy::new(bones);
    let order: Vec<_> = root_bone_indices(bones)
        .into_iter()
        .flat_map(|root| hierarchy.descendants(root))
        .collect();

    if order.iter().enumerate().any(|(i, b)| i != *b) {
        warn!("Bones do not appear after their parents and will be evaluated out of order.");
    }
    order
}

/// Cached child indices for repeated navigation of the same bones.
#[derive(Debug, PartialEq, Clone)]
pub struct BoneHierarchy {
    children: Vec<Vec<usize>>,
}

impl BoneHierarchy {
    pub fn new(bones: &[BoneDescriptor]) -> Self {
        let mut children = vec![Vec::new(); bones.len()];
        for (i, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent_index.and_then(|p| children.get_mut(p)) {
                parent.push(i);
            }
        }
        Self { children }
    }

    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn descendants(&self, index: usize) -> Vec<usize> {
        if index >= self.children.len() {
            return Vec::new();
        }

        let mut result = Vec::new();
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            result.push(i);
            // Reverse to visit children in bone order.
            stack.extend(self.children[i].iter().rev());
        }
        result
    }
}

/// The closest ancestor that is not [unused](BoneDescriptor::is_unused).
pub fn parent_skipping_unused(bones: &[BoneDescriptor], index: usize) -> Option<usize> {
    let mut current = parent(bones, index);
    // Bones are acyclic, so the chain has at most one entry per bone.
    for _ in 0..bones.len() {
        match current {
            Some(p) if bones[p].is_unused() => current = parent(bones, p),
            _ => break,
        }
    }
    current
}

/// The closest descendants that are not [unused](BoneDescriptor::is_unused).
/// Children of unused bones are treated as children of the unused bone's parent.
pub fn children_skipping_unused(bones: &[BoneDescriptor], index: usize) -> Vec<usize> {
    let hierarchy = BoneHierarchy::new(bones);
    let mut result = Vec::new();
    let mut stack: Vec<_> = hierarchy.children(index).iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        if bones[i].is_unused() {
            stack.extend(hierarchy.children(i).iter().rev());
        } else {
            result.push(i);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use xnalara_lib::xps::Bone;

    fn bone(name: &str, parent_index: Option<u16>, position: [f32; 3]) -> Bone {
        Bone {
            name: name.to_string(),
            parent_index,
            position,
        }
    }

    fn bones() -> Vec<BoneDescriptor> {
        // root -> unused a -> b, root -> c -> d
        BoneDescriptor::from_xps_bones(&[
            bone("root", None, [0.0, 0.0, 0.0]),
            bone("unused a", Some(0), [1.0, 0.0, 0.0]),
            bone("b", Some(1), [1.0, 2.0, 0.0]),
            bone("c", Some(0), [0.0, 0.0, 3.0]),
            bone("d", Some(3), [0.0, 1.0, 3.0]),
        ])
        .unwrap()
    }

    #[test]
    fn rest_positions_relative_to_parent() {
        let bones = bones();
        assert_eq!(Vec3::new(0.0, 2.0, 0.0), bones[2].rest_position);
        assert_eq!(Vec3::new(1.0, 2.0, 0.0), bones[2].position);
        assert_eq!(
            Mat4::from_translation(Vec3::new(-1.0, -2.0, 0.0)),
            bones[2].inverse_local_matrix
        );
    }

    #[test]
    fn navigation() {
        let bones = bones();
        assert_eq!(None, parent(&bones, 0));
        assert_eq!(Some(3), parent(&bones, 4));
        assert_eq!(vec![1, 3], children(&bones, 0));
        assert_eq!(vec![0], root_bone_indices(&bones));
        assert_eq!(vec![3, 4], descendants(&bones, 3));
        assert_eq!(vec![0, 1, 2, 3, 4], evaluation_order(&bones));
    }

    #[test]
    fn navigation_skipping_unused() {
        let bones = bones();
        assert_eq!(Some(0), parent_skipping_unused(&bones, 2));
        assert_eq!(vec![2, 3], children_skipping_unused(&bones, 0));
        assert!(bones[1].is_unused());
    }

    #[test]
    fn evaluation_order_parents_after_children() {
        let bones = BoneDescriptor::from_xps_bones(&[
            bone("tip", Some(2), [0.0; 3]),
            bone("mid", Some(2), [0.0; 3]),
            bone("root", None, [0.0; 3]),
        ])
        .unwrap();
        assert_eq!(vec![2, 0, 1], evaluation_order(&bones));
    }

    #[test]
    fn parent_out_of_range() {
        let result = BoneDescriptor::from_xps_bones(&[bone("a", Some(1), [0.0; 3])]);
        assert!(matches!(
            result,
            Err(LoadModelError::ParentIndexOutOfRange {
                bone: 0,
                parent_index: 1,
                bone_count: 1
            })
        ));
    }

    #[test]
    fn circular_reference() {
        let result = BoneDescriptor::from_xps_bones(&[
            bone("root", None, [0.0; 3]),
            bone("a", Some(2), [0.0; 3]),
            bone("b", Some(1), [0.0; 3]),
        ]);
        assert!(matches!(
            result,
            Err(LoadModelError::CircularReference { bone }) if bone == "a"
        ));
    }

    #[test]
    fn self_parent() {
        let result = BoneDescriptor::from_xps_bones(&[bone("a", Some(0), [0.0; 3])]);
        assert!(matches!(
            result,
            Err(LoadModelError::CircularReference { .. })
        ));
    }

    #[test]
    fn parent_chains_terminate() {
        let bones = bones();
        for i in 0..bones.len() {
            let mut current = Some(i);
            let mut steps = 0;
            while let Some(c) = current {
                current = parent(&bones, c);
                steps += 1;
            }
            assert!(steps <= bones.len());
        }
    }
}

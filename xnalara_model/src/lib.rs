//! # xnalara_model
//! xnalara_model provides high level access to XNALara models and posing.
//!
//! Models are loaded once into an immutable [ModelDescriptor] and shared between any number
//! of items. Each item stores its own sparse bone and mesh overrides in an [ItemPoseState].
//! A [Scene] attaches items to bones of other items and computes global bone transforms.
//!
//! # Getting Started
//! ```rust no_run
//! use std::sync::Arc;
//!
//! use glam::Vec3;
//! use xnalara_model::{ModelCache, Scene, params::ParamsLibrary};
//!
//! let library = ParamsLibrary::from_folder("data/parameters")?;
//! let cache = ModelCache::new();
//! let model = cache.get_or_load("data/lara/lara.mesh", &library)?;
//!
//! let mut scene = Scene::new();
//! let lara = scene.add_item(model.clone());
//! if let Some(head) = model.bone_index("head neck upper") {
//!     scene.item_mut(lara)?.set_bone_rotation_delta(head, Vec3::new(0.0, 0.5, 0.0))?;
//!     println!("{}", scene.global_position(lara, head)?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[cfg(test)]
macro_rules! assert_matrix_relative_eq {
    ($a:expr, $b:expr) => {
        assert!(
            $a.to_cols_array()
                .iter()
                .zip($b.to_cols_array().iter())
                .all(|(a, b)| approx::relative_eq!(a, b, epsilon = 0.0001f32)),
            "Matrices not equal to within 0.0001.\nleft = {:?}\nright = {:?}",
            $a,
            $b
        )
    };
}

pub mod cache;
pub mod error;
pub mod item;
pub mod mesh;
pub mod model;
pub mod params;
pub mod pose;
pub mod scene;
pub mod skeleton;
pub mod transform;
pub mod vertex;

pub use cache::ModelCache;
pub use item::{BoneOverride, ItemPoseState, MeshOverride};
pub use mesh::MeshDescriptor;
pub use model::ModelDescriptor;
pub use scene::{ItemId, Scene};
pub use skeleton::BoneDescriptor;

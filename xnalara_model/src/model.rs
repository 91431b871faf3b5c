//! Loading and saving complete models with bones and meshes.
//!
//! # Getting Started
//! ```rust no_run
//! use xnalara_model::{ModelDescriptor, params::ParamsLibrary};
//!
//! let library = ParamsLibrary::from_folder("data/parameters")?;
//! let model = ModelDescriptor::from_file("data/lara/lara.mesh", &library)?;
//!
//! for mesh in &model.meshes {
//!     println!("{} {:?}", mesh.display_name, mesh.shader_name);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use glam::Vec3;
use indexmap::IndexMap;
use log::warn;
use rayon::prelude::*;
use xnalara_lib::{
    mtl::{Material, Mtl},
    obj::Obj,
    vertex::{AttributeDescriptor, ComponentType, ElementWidth, Semantic, VertexFlags},
    xps::{Bone, Header, Mesh, Texture, Version, Xps},
};

use crate::{
    error::{LoadModelError, SaveModelError},
    mesh::{MeshDescriptor, RenderParameterValue, TextureAssignment},
    params::{ModelParameters, ParamsLibrary},
    skeleton::{BoneDescriptor, evaluation_order, root_bone_indices},
    vertex::AccessorSet,
};

/// The shader used for all meshes from OBJ files.
pub const OBJ_SHADER_NAME: &str = "ObjDefault";

/// The single bone of models from OBJ files.
pub const OBJ_ROOT_BONE_NAME: &str = "Root bone";

const DEFAULT_TOOL_AUTHOR: &str = "XNAaraL";

/// A fully loaded model that is never modified after loading.
///
/// Models are shared between any number of [items](crate::item::ItemPoseState)
/// and can be cached with a [ModelCache](crate::cache::ModelCache).
#[derive(Debug, PartialEq, Clone)]
pub struct ModelDescriptor {
    pub bones: Vec<BoneDescriptor>,
    pub root_bone_indices: Vec<usize>,
    /// Bone indices where every bone appears after its parent.
    pub evaluation_order: Vec<usize>,
    pub meshes: Vec<MeshDescriptor>,
    /// Bone names for each camera target name.
    pub camera_targets: IndexMap<String, Vec<String>>,
    /// The folder for resolving texture names.
    pub base_path: PathBuf,
    /// The header of binary files if present.
    pub header: Option<Header>,
}

impl ModelDescriptor {
    /// Load a model from the binary `.mesh` or `.xps` format.
    #[tracing::instrument(skip_all)]
    pub fn load_binary(
        bytes: &[u8],
        parameters: &dyn ModelParameters,
        base_path: PathBuf,
    ) -> Result<Self, LoadModelError> {
        let xps = Xps::from_bytes(bytes)?;
        Self::from_xps(&xps, parameters, base_path)
    }

    /// Load a model from the `.mesh.ascii` text format.
    ///
    /// Bones with the same name as a bone in `parent` use the parent's rest position,
    /// so parts exported separately line up with the model they were made for.
    #[tracing::instrument(skip_all)]
    pub fn load_ascii(
        text: &str,
        parameters: &dyn ModelParameters,
        base_path: PathBuf,
        parent: Option<&ModelDescriptor>,
    ) -> Result<Self, LoadModelError> {
        let mut xps = Xps::from_ascii(text)?;
        if let Some(parent) = parent {
            use_parent_bones(&mut xps.bones, parent);
        }
        Self::from_xps(&xps, parameters, base_path)
    }

    /// Validate and convert file data and apply settings from `parameters`.
    #[tracing::instrument(skip_all)]
    pub fn from_xps(
        xps: &Xps,
        parameters: &dyn ModelParameters,
        base_path: PathBuf,
    ) -> Result<Self, LoadModelError> {
        let bones = BoneDescriptor::from_xps_bones(&xps.bones)?;

        // Collect all results first so the first invalid mesh in file order is reported.
        let results: Vec<_> = xps
            .meshes
            .par_iter()
            .map(|m| MeshDescriptor::from_xps_mesh(m, bones.len(), parameters))
            .collect();
        let mut meshes = Vec::new();
        for result in results {
            meshes.extend(result?);
        }

        let mesh_names: Vec<_> = xps.meshes.iter().map(|m| m.name.clone()).collect();
        let camera_targets = parameters.camera_targets(&mesh_names);

        Ok(Self {
            root_bone_indices: root_bone_indices(&bones),
            evaluation_order: evaluation_order(&bones),
            bones,
            meshes,
            camera_targets,
            base_path,
            header: xps.header.clone(),
        })
    }

    /// Load an OBJ model using the text of its material libraries.
    ///
    /// Later libraries replace materials with the same name from earlier libraries.
    /// See [read_material_libraries] for loading the libraries an OBJ file references.
    #[tracing::instrument(skip_all)]
    pub fn load_obj(
        text: &str,
        material_libraries: &[&str],
        base_path: PathBuf,
    ) -> Result<Self, LoadModelError> {
        let obj = Obj::parse(text)?;

        let mut mtl = Mtl::default();
        for library in material_libraries {
            mtl.materials.extend(Mtl::parse(library)?.materials);
        }

        Self::from_obj(&obj, &mtl, base_path)
    }

    /// Create one mesh for each material range with a single root bone.
    pub fn from_obj(obj: &Obj, mtl: &Mtl, base_path: PathBuf) -> Result<Self, LoadModelError> {
        let bones = vec![BoneDescriptor::new(
            OBJ_ROOT_BONE_NAME.to_string(),
            None,
            Vec3::ZERO,
            Vec3::ZERO,
        )];

        let meshes = obj
            .material_ranges
            .iter()
            .filter(|range| range.start < range.end)
            .enumerate()
            .map(|(i, range)| {
                let mut mesh = obj_mesh(obj, &obj.indices[range.start..range.end], i)?;
                if let Some(material) = mtl.materials.get(&range.material) {
                    apply_material(&mut mesh, material);
                } else if !range.material.is_empty() {
                    warn!("Material {:?} not found in material libraries.", range.material);
                }
                Ok(mesh)
            })
            .collect::<Result<Vec<_>, LoadModelError>>()?;

        Ok(Self {
            root_bone_indices: vec![0],
            evaluation_order: vec![0],
            bones,
            meshes,
            camera_targets: IndexMap::new(),
            base_path,
            header: None,
        })
    }

    /// Load a model based on the file extension using the parameters for its file name.
    ///
    /// Errors include the path of the file.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        library: &ParamsLibrary,
    ) -> Result<Self, LoadModelError> {
        Self::from_file_with_parent(path, library, None)
    }

    /// Load a model attached to `parent`. See [load_ascii](Self::load_ascii).
    ///
    /// Only the ASCII format uses `parent`.
    pub fn from_file_with_parent<P: AsRef<Path>>(
        path: P,
        library: &ParamsLibrary,
        parent: Option<&ModelDescriptor>,
    ) -> Result<Self, LoadModelError> {
        let path = path.as_ref();
        Self::from_file_inner(path, library, parent).map_err(|e| LoadModelError::File {
            path: path.to_owned(),
            source: Box::new(e),
        })
    }

    fn from_file_inner(
        path: &Path,
        library: &ParamsLibrary,
        parent: Option<&ModelDescriptor>,
    ) -> Result<Self, LoadModelError> {
        let base_path = path.parent().map(Path::to_owned).unwrap_or_default();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        match extension.as_str() {
            "mesh" | "xps" => {
                let parameters = library.parameters_for_path(path)?;
                let bytes = std::fs::read(path)?;
                Self::load_binary(&bytes, parameters.as_ref(), base_path)
            }
            "ascii" => {
                let parameters = library.parameters_for_path(path)?;
                let text = std::fs::read_to_string(path)?;
                Self::load_ascii(&text, parameters.as_ref(), base_path, parent)
            }
            "obj" => {
                let text = std::fs::read_to_string(path)?;
                let obj = Obj::parse(&text)?;
                let mtl = read_material_libraries(&obj, &base_path)?;
                Self::from_obj(&obj, &mtl, base_path)
            }
            _ => Err(LoadModelError::FileTypeNotSupported { extension }),
        }
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// The bone indices for the camera target `name` skipping any unknown bone names.
    pub fn camera_target_bone_indices(&self, name: &str) -> Vec<usize> {
        self.camera_targets
            .get(name)
            .map(|bones| bones.iter().filter_map(|b| self.bone_index(b)).collect())
            .unwrap_or_default()
    }

    /// Convert to file data using the vertex layout for `version`.
    /// Version 0 files have no header.
    pub fn to_xps(&self, version: Version) -> Xps {
        let header = version.header_major().map(|major_version| {
            let mut header = self.header.clone().unwrap_or_else(|| Header {
                major_version,
                minor_version: 0,
                tool_author: DEFAULT_TOOL_AUTHOR.to_string(),
                aux_strings: Default::default(),
                settings: Vec::new(),
            });
            header.major_version = major_version;
            header
        });

        let mut xps = Xps {
            header,
            bones: self.xps_bones(),
            meshes: Vec::new(),
        };
        xps.meshes = self
            .meshes
            .iter()
            .map(|m| xps_mesh(m, |count| xps.binary_vertex_flags(count)))
            .collect();
        xps
    }

    pub fn write_binary(&self, version: Version) -> Result<Vec<u8>, SaveModelError> {
        Ok(self.to_xps(version).to_bytes()?)
    }

    pub fn write_ascii(&self) -> Result<String, SaveModelError> {
        let mut xps = Xps {
            header: None,
            bones: self.xps_bones(),
            meshes: Vec::new(),
        };
        xps.meshes = self
            .meshes
            .iter()
            .map(|m| xps_mesh(m, |count| xps.ascii_vertex_flags(count)))
            .collect();
        Ok(xps.to_ascii()?)
    }

    /// Save to `path` as text if the extension is `.ascii` and as binary otherwise.
    pub fn save<P: AsRef<Path>>(&self, path: P, version: Version) -> Result<(), SaveModelError> {
        let path = path.as_ref();
        if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("ascii"))
        {
            std::fs::write(path, self.write_ascii()?)?;
        } else {
            std::fs::write(path, self.write_binary(version)?)?;
        }
        Ok(())
    }

    fn xps_bones(&self) -> Vec<Bone> {
        self.bones
            .iter()
            .map(|b| Bone {
                name: b.name.clone(),
                parent_index: b.parent_index.map(|p| p as u16),
                position: b.position.to_array(),
            })
            .collect()
    }
}

/// Read and combine the material libraries referenced by `obj` relative to `base_path`.
/// Missing libraries are skipped.
pub fn read_material_libraries(obj: &Obj, base_path: &Path) -> Result<Mtl, LoadModelError> {
    let mut mtl = Mtl::default();
    for library in &obj.material_libraries {
        let path = base_path.join(library);
        match std::fs::read_to_string(&path) {
            Ok(text) => mtl.materials.extend(Mtl::parse(&text)?.materials),
            Err(e) => warn!("Skipping material library {path:?}: {e}"),
        }
    }
    Ok(mtl)
}

// The parent indices from the file are kept since they index into this model's bones.
fn use_parent_bones(bones: &mut [Bone], parent: &ModelDescriptor) {
    for bone in bones {
        if let Some(parent_bone) = parent.bones.iter().find(|b| b.name == bone.name) {
            bone.position = parent_bone.position.to_array();
        }
    }
}

fn xps_mesh(
    mesh: &MeshDescriptor,
    flags: impl Fn(u32) -> VertexFlags,
) -> Mesh {
    let flags = flags(mesh.uv_layer_count);
    let format = flags.format(ElementWidth::U32);
    Mesh {
        name: mesh.name.clone(),
        flags,
        textures: mesh
            .textures
            .values()
            .map(|t| Texture {
                name: t.name.clone(),
                uv_layer: t.uv_layer,
            })
            .collect(),
        vertex_count: mesh.vertex_count as u32,
        vertex_data: mesh.accessors.interleaved(&format),
        indices: mesh.element_indices(),
    }
}

fn obj_mesh(obj: &Obj, indices: &[u32], index: usize) -> Result<MeshDescriptor, LoadModelError> {
    // Only include the vertices used by this material.
    let mut remap = AHashMap::new();
    let mut vertices = Vec::new();
    let indices: Vec<u32> = indices
        .iter()
        .map(|i| {
            *remap.entry(*i).or_insert_with(|| {
                vertices.push(&obj.vertices[*i as usize]);
                vertices.len() as u32 - 1
            })
        })
        .collect();

    let attribute =
        |semantic, count| AttributeDescriptor::new(semantic, 0, ComponentType::F32, count);
    let positions: Vec<_> = vertices
        .iter()
        .map(|v| [v.position[0], v.position[1], v.position[2], 0.0])
        .collect();
    let normals: Vec<_> = vertices
        .iter()
        .map(|v| [v.normal[0], v.normal[1], v.normal[2], 0.0])
        .collect();
    let colors: Vec<_> = vertices.iter().map(|v| v.color).collect();
    let tex_coords: Vec<_> = vertices
        .iter()
        .map(|v| [v.tex_coord[0], 1.0 - v.tex_coord[1], 0.0, 0.0])
        .collect();

    let accessors = AccessorSet::from_values(attribute(Semantic::Position, 3), &positions)
        .combine(&AccessorSet::from_values(attribute(Semantic::Normal, 3), &normals))
        .combine(&AccessorSet::from_values(attribute(Semantic::Color, 4), &colors))
        .combine(&AccessorSet::from_values(attribute(Semantic::TexCoord, 2), &tex_coords));

    let mut mesh =
        MeshDescriptor::from_geometry(format!("Mesh {}", index + 1), accessors, &indices, 1)?;
    mesh.shader_name = Some(OBJ_SHADER_NAME.to_string());
    mesh.uses_alpha_blending = true;
    Ok(mesh)
}

fn apply_material(mesh: &mut MeshDescriptor, material: &Material) {
    let color = |c: [f32; 3]| RenderParameterValue::Color([c[0], c[1], c[2], 1.0]);
    let colors = [
        ("ambientColor", material.ambient),
        ("diffuseColor", material.diffuse),
        ("specularColor", material.specular),
    ];
    for (name, value) in colors {
        if let Some(value) = value {
            mesh.render_parameter_defaults
                .insert(name.to_string(), color(value));
        }
    }
    if let Some(exponent) = material.specular_exponent {
        mesh.render_parameter_defaults.insert(
            "specularExponent".to_string(),
            RenderParameterValue::Float(exponent),
        );
    }

    let textures = [
        ("diffuseTexture", &material.diffuse_texture),
        ("specularTexture", &material.specular_texture),
        ("bumpTexture", &material.bump_texture),
    ];
    for (role, name) in textures {
        if let Some(name) = name {
            mesh.textures.insert(
                role.to_string(),
                TextureAssignment {
                    name: name.clone(),
                    uv_layer: 0,
                },
            );
        }
    }
}

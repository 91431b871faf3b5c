//! Drawable meshes with validated vertex data and material settings.
//!
//! Meshes from model files are checked for out of range indices
//! before any other processing reads the vertex data.
//! Invalid bone weights and missing tangents are repaired instead of failing the load.
use ahash::AHashMap;
use glam::{Vec3, Vec4};
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use xnalara_lib::{
    error::AttributeNotFound,
    vertex::{ElementWidth, Semantic, VertexFormat},
    xps::{Mesh, Texture},
};

use crate::{
    error::{LoadModelError, VertexDataError},
    params::{MeshSplitter, ModelParameters},
    vertex::{AccessorSet, tangent_attribute},
};

/// The maximum length of [bone_index_remap](struct.MeshDescriptor.html#structfield.bone_index_remap)
/// due to the size of the bone matrix array in shaders.
pub const MAX_BONES_PER_MESH: usize = 59;

/// Weights that differ from a sum of `1.0` by more than this are renormalized.
const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default, Serialize, Deserialize)]
pub enum CullFaceMode {
    #[default]
    CounterClockwise,
    Clockwise,
    None,
}

/// A named shader input for a mesh.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenderParameterValue {
    Float(f32),
    /// RGBA color components from `0.0` to `1.0`.
    Color([f32; 4]),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TextureAssignment {
    /// The file name relative to the model's [base_path](crate::ModelDescriptor::base_path).
    pub name: String,
    pub uv_layer: u32,
}

/// A single drawable mesh of a [ModelDescriptor](crate::ModelDescriptor).
#[derive(Debug, PartialEq, Clone)]
pub struct MeshDescriptor {
    /// The name as stored in the file.
    pub name: String,
    /// The name to show to users.
    pub display_name: String,
    /// The layout of [vertex_data](#method.vertex_data) and the width of each element.
    pub vertex_format: VertexFormat,
    pub accessors: AccessorSet,
    pub vertex_count: usize,
    /// Triangle list indices with the width from [vertex_format](#structfield.vertex_format)
    /// or `None` to draw vertices in order.
    pub elements: Option<Vec<u8>>,
    pub element_count: usize,
    /// Maps the bone indices of each vertex to model bone indices.
    /// Empty if vertices already use model bone indices.
    pub bone_index_remap: Vec<usize>,
    /// Textures by their role in the shader like "diffuseTexture".
    pub textures: IndexMap<String, TextureAssignment>,
    pub uv_layer_count: u32,
    pub shader_name: Option<String>,
    pub uses_alpha_blending: bool,
    pub cull_face_mode: CullFaceMode,
    pub render_parameter_defaults: IndexMap<String, RenderParameterValue>,
    /// The path of optional part names used to show or hide groups of meshes.
    pub optional_part_names: Vec<String>,
    pub mesh_groups: Vec<String>,
    pub initially_visible: bool,
}

impl MeshDescriptor {
    /// Create a mesh with repaired bone weights and tangents for any UV layers without tangents.
    /// Material settings use default values.
    pub fn from_geometry(
        name: String,
        accessors: AccessorSet,
        indices: &[u32],
        uv_layer_count: u32,
    ) -> Result<Self, AttributeNotFound> {
        let accessors = normalize_bone_weights_in_vertices(&accessors);
        let accessors = calculate_tangents(&accessors, indices, uv_layer_count)?;

        let vertex_count = accessors.vertex_count();
        let element_width = ElementWidth::for_vertex_count(vertex_count);

        Ok(Self {
            display_name: name.clone(),
            name,
            vertex_format: accessors.vertex_format(element_width),
            accessors,
            vertex_count,
            elements: Some(encode_elements(indices, element_width)),
            element_count: indices.len(),
            bone_index_remap: Vec::new(),
            textures: IndexMap::new(),
            uv_layer_count,
            shader_name: None,
            uses_alpha_blending: false,
            cull_face_mode: CullFaceMode::default(),
            render_parameter_defaults: IndexMap::new(),
            optional_part_names: Vec::new(),
            mesh_groups: Vec::new(),
            initially_visible: true,
        })
    }

    /// Validate and convert a mesh from a model file.
    ///
    /// The result contains more than one mesh if `parameters` splits the mesh into parts.
    pub fn from_xps_mesh(
        mesh: &Mesh,
        bone_count: usize,
        parameters: &dyn ModelParameters,
    ) -> Result<Vec<Self>, LoadModelError> {
        let format = mesh.flags.format(ElementWidth::U32);
        let vertex_count = mesh.vertex_count as usize;
        let accessors =
            AccessorSet::from_interleaved(&format, mesh.vertex_data.clone().into(), vertex_count);

        validate_vertex_data(&accessors, &mesh.indices, &[], bone_count).map_err(|source| {
            LoadModelError::VertexData {
                mesh: mesh.name.clone(),
                source,
            }
        })?;

        let geometry = Self::from_geometry(
            mesh.name.clone(),
            accessors,
            &mesh.indices,
            mesh.flags.uv_layer_count,
        )?;

        let splitters = parameters.mesh_splitters(&mesh.name);
        let mut meshes = if splitters.is_empty() {
            vec![geometry]
        } else {
            let parts: Vec<_> = splitters
                .iter()
                .map(|s| geometry.partial_mesh_from_splitter(s))
                .collect();

            let part_elements: usize = parts.iter().map(|p| p.element_count).sum();
            if part_elements < geometry.element_count {
                warn!(
                    "Splitting mesh {:?} dropped {} triangles outside every part.",
                    mesh.name,
                    (geometry.element_count - part_elements) / 3
                );
            }
            parts
        };

        for m in &mut meshes {
            m.apply_parameters(&mesh.textures, parameters);
        }
        Ok(meshes)
    }

    fn apply_parameters(&mut self, textures: &[Texture], parameters: &dyn ModelParameters) {
        let params = parameters.mesh_params(&self.name);

        let texture_roles = params
            .shader
            .as_ref()
            .map(|s| s.texture_roles.as_slice())
            .unwrap_or_default();

        self.textures = textures
            .iter()
            .enumerate()
            .map(|(i, texture)| {
                let role = texture_roles.get(i).cloned().unwrap_or_else(|| {
                    warn!(
                        "No texture role for texture {i} of mesh {:?}. Using a placeholder.",
                        self.name
                    );
                    format!("texture{i}")
                });
                let assignment = TextureAssignment {
                    name: texture_file_name(&texture.name),
                    uv_layer: texture.uv_layer,
                };
                (role, assignment)
            })
            .collect();

        self.shader_name = params.shader.map(|s| s.base_name);
        self.display_name = params.display_name;
        self.initially_visible = params.visible;
        self.optional_part_names = params.optional_part_names;
        self.mesh_groups = params.mesh_groups;
        self.uses_alpha_blending = params.uses_alpha_blending;
        self.render_parameter_defaults = params.render_parameters;
    }

    /// Check the vertex and element data against the accessors and `bone_count`.
    pub fn validate(&self, bone_count: usize) -> Result<(), VertexDataError> {
        validate_vertex_data(
            &self.accessors,
            &self.element_indices(),
            &self.bone_index_remap,
            bone_count,
        )
    }

    /// Decode the element buffer or generate sequential indices if there is no element buffer.
    pub fn element_indices(&self) -> Vec<u32> {
        match &self.elements {
            Some(elements) => decode_elements(elements, self.vertex_format.element_width()),
            None => (0..self.vertex_count as u32).collect(),
        }
    }

    /// The interleaved vertex buffer using [vertex_format](#structfield.vertex_format).
    pub fn vertex_data(&self) -> Vec<u8> {
        self.accessors.interleaved(&self.vertex_format)
    }

    /// A new mesh with only the triangles whose vertices are all inside the splitter's bounds.
    ///
    /// Unused vertices are removed.
    /// Triangles crossing the bounds are excluded instead of being clipped.
    pub fn partial_mesh_from_splitter(&self, splitter: &MeshSplitter) -> MeshDescriptor {
        let positions = self.accessors.positions().unwrap_or_default();
        let (min, max) = (splitter.min(), splitter.max());
        let is_inside = |i: u32| {
            positions
                .get(i as usize)
                .map(|p| p.cmpge(min).all() && p.cmple(max).all())
                .unwrap_or_default()
        };

        let mut new_indices = AHashMap::new();
        let mut gathered = Vec::new();
        let mut indices = Vec::new();
        for triangle in self.element_indices().chunks_exact(3) {
            if triangle.iter().all(|i| is_inside(*i)) {
                for i in triangle {
                    let index = *new_indices.entry(*i).or_insert_with(|| {
                        gathered.push(*i as usize);
                        gathered.len() as u32 - 1
                    });
                    indices.push(index);
                }
            }
        }

        let accessors = self.accessors.gather(&gathered);
        let element_width = ElementWidth::for_vertex_count(gathered.len());
        MeshDescriptor {
            name: splitter.split_part_name.clone(),
            display_name: splitter.split_part_name.clone(),
            vertex_format: accessors.vertex_format(element_width),
            accessors,
            vertex_count: gathered.len(),
            elements: Some(encode_elements(&indices, element_width)),
            element_count: indices.len(),
            ..self.clone()
        }
    }
}

/// Check that every element and bone index is in range
/// and the buffers contain every vertex.
///
/// Bone indices are converted using `bone_index_remap` if it is not empty.
pub fn validate_vertex_data(
    accessors: &AccessorSet,
    elements: &[u32],
    bone_index_remap: &[usize],
    bone_count: usize,
) -> Result<(), VertexDataError> {
    for accessor in accessors.accessors() {
        let expected = accessor.required_len();
        if expected > accessor.buffer.len() {
            return Err(VertexDataError::PrematureEndOfFile {
                expected,
                actual: accessor.buffer.len(),
            });
        }
    }

    let vertex_count = accessors.vertex_count();
    if let Some(index) = elements.iter().find(|i| **i as usize >= vertex_count) {
        return Err(VertexDataError::IndexOutOfRange {
            index: *index,
            vertex_count,
        });
    }

    if bone_count > 0
        && let Some(bone_indices) = accessors.bone_indices()
    {
        for (vertex, indices) in bone_indices.iter().enumerate() {
            for index in indices.to_array() {
                let index = index as usize;
                let bone_index = if bone_index_remap.is_empty() {
                    index
                } else {
                    *bone_index_remap.get(index).ok_or(
                        VertexDataError::BoneIndexOutOfRange {
                            vertex,
                            bone_index: index,
                            bone_count: bone_index_remap.len(),
                        },
                    )?
                };

                if bone_index >= bone_count {
                    return Err(VertexDataError::BoneIndexOutOfRange {
                        vertex,
                        bone_index,
                        bone_count,
                    });
                }
            }
        }
    }

    Ok(())
}

/// Rescale weights that do not sum to `1.0`.
/// Weights with a sum of zero assign the vertex fully to the first bone.
///
/// Returns the number of modified weights.
pub fn normalize_bone_weights(weights: &mut [Vec4]) -> usize {
    let mut count = 0;
    for weight in weights {
        let sum = weight.element_sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            *weight = if sum > 0.0 { *weight / sum } else { Vec4::X };
            count += 1;
        }
    }
    count
}

/// Apply [normalize_bone_weights] to the weights in `accessors` if present.
pub fn normalize_bone_weights_in_vertices(accessors: &AccessorSet) -> AccessorSet {
    let Some(accessor) = accessors.accessor(Semantic::BoneWeights, 0) else {
        return accessors.clone();
    };
    let Some(mut weights) = accessors.bone_weights() else {
        return accessors.clone();
    };

    let count = normalize_bone_weights(&mut weights);
    if count == 0 {
        return accessors.clone();
    }

    warn!("Renormalized bone weights for {count} vertices.");
    let values: Vec<_> = weights.iter().map(|w| w.to_array()).collect();
    accessors.replace(&AccessorSet::from_values(accessor.attribute, &values))
}

/// Calculate tangents for each UV layer without tangents in `accessors`.
///
/// Tangents are accumulated from each triangle and orthogonalized against the normal.
/// Vertices without a valid tangent use an arbitrary vector perpendicular to the normal.
/// The W component stores the handedness of the bitangent.
pub fn calculate_tangents(
    accessors: &AccessorSet,
    indices: &[u32],
    uv_layer_count: u32,
) -> Result<AccessorSet, AttributeNotFound> {
    let missing_layers: Vec<_> = (0..uv_layer_count)
        .filter(|layer| accessors.accessor(Semantic::Tangent, *layer).is_none())
        .collect();
    if missing_layers.is_empty() {
        return Ok(accessors.clone());
    }

    let positions = accessors.positions()?;
    let normals = accessors
        .normals()
        .unwrap_or_else(|| vec![Vec3::ZERO; positions.len()]);

    let mut result = accessors.clone();
    for layer in missing_layers {
        let Some(tex_coords) = accessors.tex_coords(layer) else {
            continue;
        };

        let mut tangents = vec![Vec3::ZERO; positions.len()];
        let mut bitangents = vec![Vec3::ZERO; positions.len()];
        for triangle in indices.chunks_exact(3) {
            let [i0, i1, i2] = [
                triangle[0] as usize,
                triangle[1] as usize,
                triangle[2] as usize,
            ];
            if [i0, i1, i2].iter().any(|i| *i >= positions.len()) {
                continue;
            }

            let q1 = positions[i1] - positions[i0];
            let q2 = positions[i2] - positions[i0];
            let st1 = tex_coords[i1] - tex_coords[i0];
            let st2 = tex_coords[i2] - tex_coords[i0];

            let d = st1.x * st2.y - st2.x * st1.y;
            if d == 0.0 || !d.is_finite() {
                continue;
            }
            let r = 1.0 / d;
            let tangent = (q1 * st2.y - q2 * st1.y) * r;
            let bitangent = (q2 * st1.x - q1 * st2.x) * r;

            for i in [i0, i1, i2] {
                tangents[i] += tangent;
                bitangents[i] += bitangent;
            }
        }

        let mut degenerate_count = 0;
        let values: Vec<_> = normals
            .iter()
            .zip(tangents.iter().zip(&bitangents))
            .map(|(n, (t, b))| {
                // Gram-Schmidt orthogonalization.
                let tangent = (*t - *n * n.dot(*t)).try_normalize().unwrap_or_else(|| {
                    degenerate_count += 1;
                    fallback_tangent(*n)
                });
                let w = if n.cross(tangent).dot(*b) < 0.0 {
                    -1.0
                } else {
                    1.0
                };
                tangent.extend(w).to_array()
            })
            .collect();

        if degenerate_count > 0 {
            warn!(
                "Using fallback tangents for {degenerate_count} vertices without valid texture coordinates in layer {layer}."
            );
        }

        result = result.combine(&AccessorSet::from_values(tangent_attribute(layer), &values));
    }

    Ok(result)
}

fn fallback_tangent(normal: Vec3) -> Vec3 {
    normal
        .try_normalize()
        .map(|n| n.any_orthonormal_vector())
        .unwrap_or(Vec3::X)
}

/// The last component of a Windows style path like `textures\body.png`.
pub fn texture_file_name(name: &str) -> String {
    name.rsplit('\\').next().unwrap_or(name).to_string()
}

fn encode_elements(indices: &[u32], width: ElementWidth) -> Vec<u8> {
    match width {
        ElementWidth::None => Vec::new(),
        ElementWidth::U8 => indices.iter().map(|i| *i as u8).collect(),
        ElementWidth::U16 => indices
            .iter()
            .flat_map(|i| (*i as u16).to_le_bytes())
            .collect(),
        ElementWidth::U32 => indices.iter().flat_map(|i| i.to_le_bytes()).collect(),
    }
}

fn decode_elements(elements: &[u8], width: ElementWidth) -> Vec<u32> {
    match width {
        ElementWidth::None => Vec::new(),
        ElementWidth::U8 => elements.iter().map(|i| *i as u32).collect(),
        ElementWidth::U16 => elements
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as u32)
            .collect(),
        ElementWidth::U32 => elements
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}

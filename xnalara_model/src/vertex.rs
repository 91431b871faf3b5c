//! Strided views over raw vertex buffers.
//!
//! Each [VertexAttributeAccessor] reads a single attribute from a shared byte buffer.
//! An [AccessorSet] groups the accessors for all attributes of a mesh
//! and converts between interleaved buffers and per attribute values.
use std::sync::Arc;

use glam::{UVec4, Vec2, Vec3, Vec4};
use xnalara_lib::{
    error::AttributeNotFound,
    vertex::{AttributeDescriptor, ComponentType, ElementWidth, Semantic, VertexFormat},
};

/// A read only view of one attribute in a buffer of `count` elements.
#[derive(Debug, PartialEq, Clone)]
pub struct VertexAttributeAccessor {
    pub attribute: AttributeDescriptor,
    pub buffer: Arc<[u8]>,
    /// The byte offset of the first element in [buffer](#structfield.buffer).
    pub offset: usize,
    /// The byte distance between consecutive elements.
    pub stride: usize,
    pub count: usize,
}

impl VertexAttributeAccessor {
    /// The bytes for the element at `index`.
    ///
    /// # Panics
    /// Panics if `index` is not less than [count](#structfield.count).
    pub fn element_at(&self, index: usize) -> &[u8] {
        assert!(
            index < self.count,
            "element {index} is out of range for {} elements",
            self.count
        );
        let start = self.offset + index * self.stride;
        &self.buffer[start..start + self.attribute.size_in_bytes()]
    }

    /// Decode the element at `index` with missing components set to [default_values].
    pub fn read(&self, index: usize) -> [f32; 4] {
        self.attribute
            .decode(self.element_at(index), default_values(self.attribute.semantic))
    }

    /// The number of bytes needed by [buffer](#structfield.buffer) to hold every element.
    pub fn required_len(&self) -> usize {
        match self.count {
            0 => 0,
            n => self.offset + (n - 1) * self.stride + self.attribute.size_in_bytes(),
        }
    }
}

/// The values used for attributes or components not present in a buffer.
pub fn default_values(semantic: Semantic) -> [f32; 4] {
    match semantic {
        Semantic::Color => [1.0; 4],
        Semantic::BoneWeights => [1.0, 0.0, 0.0, 0.0],
        _ => [0.0; 4],
    }
}

/// The vertex attributes for a mesh.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct AccessorSet {
    accessors: Vec<VertexAttributeAccessor>,
    vertex_count: usize,
}

impl AccessorSet {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            accessors: Vec::new(),
            vertex_count,
        }
    }

    /// Create accessors for each attribute in `format` from interleaved `buffer`.
    /// Use [validate_vertex_data](crate::mesh::validate_vertex_data) to check the buffer size.
    pub fn from_interleaved(format: &VertexFormat, buffer: Arc<[u8]>, vertex_count: usize) -> Self {
        let mut offset = 0;
        let accessors = format
            .attributes()
            .iter()
            .map(|attribute| {
                let accessor = VertexAttributeAccessor {
                    attribute: *attribute,
                    buffer: buffer.clone(),
                    offset,
                    stride: format.stride(),
                    count: vertex_count,
                };
                offset += attribute.size_in_bytes();
                accessor
            })
            .collect();

        Self {
            accessors,
            vertex_count,
        }
    }

    /// Encode `values` into a tightly packed buffer for a single attribute.
    pub fn from_values(attribute: AttributeDescriptor, values: &[[f32; 4]]) -> Self {
        let mut buffer = Vec::with_capacity(values.len() * attribute.size_in_bytes());
        for value in values {
            attribute.encode(*value, &mut buffer);
        }

        Self {
            accessors: vec![VertexAttributeAccessor {
                attribute,
                buffer: buffer.into(),
                offset: 0,
                stride: attribute.size_in_bytes(),
                count: values.len(),
            }],
            vertex_count: values.len(),
        }
    }

    pub fn accessors(&self) -> &[VertexAttributeAccessor] {
        &self.accessors
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn accessor(&self, semantic: Semantic, layer: u32) -> Option<&VertexAttributeAccessor> {
        self.accessors
            .iter()
            .find(|a| a.attribute.semantic == semantic && a.attribute.layer == layer)
    }

    pub fn try_accessor(
        &self,
        semantic: Semantic,
        layer: u32,
    ) -> Result<&VertexAttributeAccessor, AttributeNotFound> {
        self.accessor(semantic, layer)
            .ok_or(AttributeNotFound { semantic, layer })
    }

    /// The union of both sets with accessors from `self` taking priority.
    ///
    /// # Panics
    /// Panics if the vertex counts differ.
    pub fn combine(&self, other: &AccessorSet) -> AccessorSet {
        assert_eq!(
            self.vertex_count, other.vertex_count,
            "combined accessor sets must have the same vertex count"
        );

        let mut accessors = self.accessors.clone();
        for accessor in &other.accessors {
            let attribute = accessor.attribute;
            if self.accessor(attribute.semantic, attribute.layer).is_none() {
                accessors.push(accessor.clone());
            }
        }

        Self {
            accessors,
            vertex_count: self.vertex_count,
        }
    }

    /// Replace the accessors from `other` in place and append any new attributes.
    pub fn replace(&self, other: &AccessorSet) -> AccessorSet {
        let mut result = other.combine(self);
        // Preserve the original attribute order.
        result.accessors.sort_by_key(|a| {
            self.accessors
                .iter()
                .position(|b| {
                    a.attribute.semantic == b.attribute.semantic
                        && a.attribute.layer == b.attribute.layer
                })
                .unwrap_or(usize::MAX)
        });
        result
    }

    /// A tightly packed set with the vertices at `indices` in order.
    pub fn gather(&self, indices: &[usize]) -> AccessorSet {
        let accessors = self
            .accessors
            .iter()
            .map(|accessor| {
                let size = accessor.attribute.size_in_bytes();
                let mut buffer = Vec::with_capacity(indices.len() * size);
                for i in indices {
                    buffer.extend_from_slice(accessor.element_at(*i));
                }
                VertexAttributeAccessor {
                    attribute: accessor.attribute,
                    buffer: buffer.into(),
                    offset: 0,
                    stride: size,
                    count: indices.len(),
                }
            })
            .collect();

        Self {
            accessors,
            vertex_count: indices.len(),
        }
    }

    /// The layout of [interleaved](#method.interleaved) data for these accessors.
    pub fn vertex_format(&self, element_width: ElementWidth) -> VertexFormat {
        VertexFormat::new(
            self.accessors.iter().map(|a| a.attribute).collect(),
            element_width,
        )
    }

    /// Interleave the vertices using the layout from `format`.
    /// Attributes without an accessor use [default_values].
    pub fn interleaved(&self, format: &VertexFormat) -> Vec<u8> {
        let accessors: Vec<_> = format
            .attributes()
            .iter()
            .map(|a| self.accessor(a.semantic, a.layer))
            .collect();

        let mut buffer = Vec::with_capacity(format.stride() * self.vertex_count);
        for i in 0..self.vertex_count {
            for (attribute, accessor) in format.attributes().iter().zip(&accessors) {
                let values = match accessor {
                    Some(accessor) => accessor.read(i),
                    None => default_values(attribute.semantic),
                };
                attribute.encode(values, &mut buffer);
            }
        }
        buffer
    }

    fn values(&self, semantic: Semantic, layer: u32) -> Option<impl Iterator<Item = [f32; 4]>> {
        let accessor = self.accessor(semantic, layer)?;
        Some((0..accessor.count).map(|i| accessor.read(i)))
    }

    pub fn positions(&self) -> Result<Vec<Vec3>, AttributeNotFound> {
        let accessor = self.try_accessor(Semantic::Position, 0)?;
        Ok((0..accessor.count)
            .map(|i| Vec4::from_array(accessor.read(i)).truncate())
            .collect())
    }

    pub fn normals(&self) -> Option<Vec<Vec3>> {
        self.values(Semantic::Normal, 0)
            .map(|values| values.map(|v| Vec4::from_array(v).truncate()).collect())
    }

    /// Vertex colors as floats or white if there are no colors.
    pub fn colors(&self) -> Vec<Vec4> {
        match self.values(Semantic::Color, 0) {
            Some(values) => values.map(Vec4::from_array).collect(),
            None => vec![Vec4::ONE; self.vertex_count],
        }
    }

    pub fn tex_coords(&self, layer: u32) -> Option<Vec<Vec2>> {
        self.values(Semantic::TexCoord, layer)
            .map(|values| values.map(|v| Vec2::new(v[0], v[1])).collect())
    }

    pub fn tangents(&self, layer: u32) -> Option<Vec<Vec4>> {
        self.values(Semantic::Tangent, layer)
            .map(|values| values.map(Vec4::from_array).collect())
    }

    pub fn bone_indices(&self) -> Option<Vec<UVec4>> {
        self.values(Semantic::BoneIndices, 0).map(|values| {
            values
                .map(|v| UVec4::new(v[0] as u32, v[1] as u32, v[2] as u32, v[3] as u32))
                .collect()
        })
    }

    pub fn bone_weights(&self) -> Option<Vec<Vec4>> {
        self.values(Semantic::BoneWeights, 0)
            .map(|values| values.map(Vec4::from_array).collect())
    }
}

/// The attribute used for calculated tangents.
pub const fn tangent_attribute(layer: u32) -> AttributeDescriptor {
    AttributeDescriptor::new(Semantic::Tangent, layer, ComponentType::F32, 4)
}

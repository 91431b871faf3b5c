//! Vertex attribute and per-vertex layout descriptions.
//!
//! A [VertexFormat] describes interleaved vertex data as an ordered list of attributes.
//! The fixed layouts used by each model file version are created with [VertexFlags].
use crate::error::AttributeNotFound;

/// The meaning of a vertex attribute.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Semantic {
    Position,
    Normal,
    Color,
    /// Texture coordinates with one attribute per UV layer.
    TexCoord,
    /// Tangents with one attribute per UV layer.
    Tangent,
    BoneIndices,
    BoneWeights,
    /// Unused bytes in some file versions.
    Padding,
}

/// The type of each component of an attribute.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ComponentType {
    U8,
    /// Unsigned bytes mapped to the range `0.0` to `1.0`.
    U8Normalized,
    U16,
    F16,
    F32,
    /// Four unsigned normalized components packed as 10, 10, 10, and 2 bits.
    Packed1010102,
}

impl ComponentType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ComponentType::U8 | ComponentType::U8Normalized => 1,
            ComponentType::U16 | ComponentType::F16 => 2,
            ComponentType::F32 => 4,
            ComponentType::Packed1010102 => 4,
        }
    }
}

/// A single attribute in a [VertexFormat].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct AttributeDescriptor {
    pub semantic: Semantic,
    /// The UV layer for texture coordinates and tangents and `0` otherwise.
    pub layer: u32,
    pub component_type: ComponentType,
    /// The number of components from 1 to 4.
    pub count: usize,
}

impl AttributeDescriptor {
    pub const fn new(
        semantic: Semantic,
        layer: u32,
        component_type: ComponentType,
        count: usize,
    ) -> Self {
        Self {
            semantic,
            layer,
            component_type,
            count,
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        match self.component_type {
            // All components share a single 32-bit value.
            ComponentType::Packed1010102 => 4,
            t => t.size_in_bytes() * self.count,
        }
    }

    /// Decode the components of a single element to floats.
    /// Components past [count](#structfield.count) are filled from `defaults`.
    pub fn decode(&self, bytes: &[u8], defaults: [f32; 4]) -> [f32; 4] {
        assert!(
            bytes.len() >= self.size_in_bytes(),
            "element of {} bytes is too small for {self:?}",
            bytes.len()
        );

        let mut values = defaults;
        match self.component_type {
            ComponentType::U8 => {
                for (i, value) in values.iter_mut().take(self.count).enumerate() {
                    *value = bytes[i] as f32;
                }
            }
            ComponentType::U8Normalized => {
                for (i, value) in values.iter_mut().take(self.count).enumerate() {
                    *value = bytes[i] as f32 / 255.0;
                }
            }
            ComponentType::U16 => {
                for (i, value) in values.iter_mut().take(self.count).enumerate() {
                    *value = u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]) as f32;
                }
            }
            ComponentType::F16 => {
                for (i, value) in values.iter_mut().take(self.count).enumerate() {
                    let bits = u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
                    *value = half::f16::from_bits(bits).to_f32();
                }
            }
            ComponentType::F32 => {
                for (i, value) in values.iter_mut().take(self.count).enumerate() {
                    *value = f32::from_le_bytes([
                        bytes[i * 4],
                        bytes[i * 4 + 1],
                        bytes[i * 4 + 2],
                        bytes[i * 4 + 3],
                    ]);
                }
            }
            ComponentType::Packed1010102 => {
                let packed = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                values[0] = (packed & 0x3FF) as f32 / 1023.0;
                values[1] = ((packed >> 10) & 0x3FF) as f32 / 1023.0;
                values[2] = ((packed >> 20) & 0x3FF) as f32 / 1023.0;
                values[3] = (packed >> 30) as f32 / 3.0;
            }
        }
        values
    }

    /// Encode the first [count](#structfield.count) values and append them to `output`.
    /// Integer types are rounded and clamped to their valid range.
    pub fn encode(&self, values: [f32; 4], output: &mut Vec<u8>) {
        let values = &values[..self.count.min(4)];
        match self.component_type {
            ComponentType::U8 => {
                output.extend(values.iter().map(|v| v.round().clamp(0.0, 255.0) as u8))
            }
            ComponentType::U8Normalized => output.extend(
                values
                    .iter()
                    .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8),
            ),
            ComponentType::U16 => {
                for v in values {
                    output.extend((v.round().clamp(0.0, 65535.0) as u16).to_le_bytes());
                }
            }
            ComponentType::F16 => {
                for v in values {
                    output.extend(half::f16::from_f32(*v).to_bits().to_le_bytes());
                }
            }
            ComponentType::F32 => {
                for v in values {
                    output.extend(v.to_le_bytes());
                }
            }
            ComponentType::Packed1010102 => {
                let unorm = |v: f32, max: f32| (v.clamp(0.0, 1.0) * max).round() as u32;
                let component = |i: usize| values.get(i).copied().unwrap_or_default();
                let packed = unorm(component(0), 1023.0)
                    | (unorm(component(1), 1023.0) << 10)
                    | (unorm(component(2), 1023.0) << 20)
                    | (unorm(component(3), 3.0) << 30);
                output.extend(packed.to_le_bytes());
            }
        }
    }
}

/// The size of each index in an element buffer.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ElementWidth {
    /// There is no element buffer and vertices are drawn in order.
    None,
    U8,
    U16,
    U32,
}

impl ElementWidth {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ElementWidth::None => 0,
            ElementWidth::U8 => 1,
            ElementWidth::U16 => 2,
            ElementWidth::U32 => 4,
        }
    }

    /// The smallest width that can index `vertex_count` vertices.
    /// The maximum value of each width is reserved as a primitive restart index.
    pub fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count < u16::MAX as usize {
            ElementWidth::U16
        } else {
            ElementWidth::U32
        }
    }
}

/// The layout of a single vertex.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct VertexFormat {
    attributes: Vec<AttributeDescriptor>,
    stride: usize,
    element_width: ElementWidth,
}

impl VertexFormat {
    /// Create a format from `attributes` in order with no padding between attributes.
    ///
    /// # Panics
    /// Panics if the same semantic and layer appear more than once.
    pub fn new(attributes: Vec<AttributeDescriptor>, element_width: ElementWidth) -> Self {
        for (i, a) in attributes.iter().enumerate() {
            assert!(
                !attributes[..i]
                    .iter()
                    .any(|b| a.semantic == b.semantic && a.layer == b.layer),
                "duplicate {:?} attribute for layer {}",
                a.semantic,
                a.layer
            );
        }

        let stride = attributes.iter().map(|a| a.size_in_bytes()).sum();
        Self {
            attributes,
            stride,
            element_width,
        }
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// The size in bytes of a single vertex.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn element_width(&self) -> ElementWidth {
        self.element_width
    }

    pub fn attribute(&self, semantic: Semantic, layer: u32) -> Option<&AttributeDescriptor> {
        self.attributes
            .iter()
            .find(|a| a.semantic == semantic && a.layer == layer)
    }

    /// The byte offset of the attribute from the start of each vertex.
    pub fn offset_of(&self, semantic: Semantic, layer: u32) -> Result<usize, AttributeNotFound> {
        let mut offset = 0;
        for a in &self.attributes {
            if a.semantic == semantic && a.layer == layer {
                return Ok(offset);
            }
            offset += a.size_in_bytes();
        }
        Err(AttributeNotFound { semantic, layer })
    }
}

/// Version specific indicators that determine the vertex layout in a model file.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct VertexFlags {
    pub uv_layer_count: u32,
    /// Tangents for each UV layer follow the texture coordinates.
    pub tangents: bool,
    /// A 2 byte value follows the texture coordinates instead of tangents.
    pub padding: bool,
    /// Bone indices and weights are present when the model has bones.
    pub bone_weights: bool,
    /// Colors are stored as floats instead of normalized bytes.
    pub float_color: bool,
}

impl VertexFlags {
    /// The attributes of a single vertex in the order they are stored in the file.
    pub fn attributes(&self) -> Vec<AttributeDescriptor> {
        let mut attributes = vec![
            AttributeDescriptor::new(Semantic::Position, 0, ComponentType::F32, 3),
            AttributeDescriptor::new(Semantic::Normal, 0, ComponentType::F32, 3),
            if self.float_color {
                AttributeDescriptor::new(Semantic::Color, 0, ComponentType::F32, 4)
            } else {
                AttributeDescriptor::new(Semantic::Color, 0, ComponentType::U8Normalized, 4)
            },
        ];
        attributes.extend(
            (0..self.uv_layer_count)
                .map(|i| AttributeDescriptor::new(Semantic::TexCoord, i, ComponentType::F32, 2)),
        );
        if self.tangents {
            attributes.extend(
                (0..self.uv_layer_count)
                    .map(|i| AttributeDescriptor::new(Semantic::Tangent, i, ComponentType::F32, 4)),
            );
        } else if self.padding {
            attributes.push(AttributeDescriptor::new(
                Semantic::Padding,
                0,
                ComponentType::U16,
                1,
            ));
        }
        if self.bone_weights {
            attributes.push(AttributeDescriptor::new(
                Semantic::BoneIndices,
                0,
                ComponentType::U16,
                4,
            ));
            attributes.push(AttributeDescriptor::new(
                Semantic::BoneWeights,
                0,
                ComponentType::F32,
                4,
            ));
        }
        attributes
    }

    pub fn format(&self, element_width: ElementWidth) -> VertexFormat {
        VertexFormat::new(self.attributes(), element_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hexlit::hex;

    #[test]
    fn stride_binary_version_0() {
        let flags = VertexFlags {
            uv_layer_count: 2,
            tangents: true,
            padding: false,
            bone_weights: true,
            float_color: false,
        };
        let format = flags.format(ElementWidth::U16);
        // 12 + 12 + 4 + 2 * 8 + 2 * 16 + 8 + 16
        assert_eq!(100, format.stride());
        assert_eq!(28, format.offset_of(Semantic::TexCoord, 0).unwrap());
        assert_eq!(36, format.offset_of(Semantic::TexCoord, 1).unwrap());
        assert_eq!(44, format.offset_of(Semantic::Tangent, 0).unwrap());
        assert_eq!(76, format.offset_of(Semantic::BoneIndices, 0).unwrap());
        assert_eq!(84, format.offset_of(Semantic::BoneWeights, 0).unwrap());
    }

    #[test]
    fn stride_binary_version_4() {
        let flags = VertexFlags {
            uv_layer_count: 1,
            tangents: false,
            padding: true,
            bone_weights: false,
            float_color: false,
        };
        let format = flags.format(ElementWidth::U32);
        assert_eq!(12 + 12 + 4 + 8 + 2, format.stride());
        assert!(format.attribute(Semantic::Padding, 0).is_some());
        assert!(format.attribute(Semantic::Tangent, 0).is_none());
        assert_eq!(ElementWidth::U32, format.element_width());
    }

    #[test]
    fn offset_of_missing_attribute() {
        let format = VertexFormat::new(
            vec![AttributeDescriptor::new(
                Semantic::Position,
                0,
                ComponentType::F32,
                3,
            )],
            ElementWidth::None,
        );
        let error = format.offset_of(Semantic::TexCoord, 1).unwrap_err();
        assert_eq!(Semantic::TexCoord, error.semantic);
        assert_eq!(1, error.layer);
    }

    #[test]
    #[should_panic]
    fn duplicate_attributes() {
        VertexFormat::new(
            vec![
                AttributeDescriptor::new(Semantic::TexCoord, 0, ComponentType::F32, 2),
                AttributeDescriptor::new(Semantic::TexCoord, 0, ComponentType::F16, 2),
            ],
            ElementWidth::None,
        );
    }

    #[test]
    fn element_width_for_vertex_count() {
        assert_eq!(ElementWidth::U16, ElementWidth::for_vertex_count(3));
        assert_eq!(ElementWidth::U16, ElementWidth::for_vertex_count(65534));
        assert_eq!(ElementWidth::U32, ElementWidth::for_vertex_count(65535));
    }

    #[test]
    fn decode_components() {
        let color = AttributeDescriptor::new(Semantic::Color, 0, ComponentType::U8Normalized, 4);
        assert_eq!([1.0, 0.0, 1.0, 0.0], color.decode(&hex!(ff00ff00), [0.0; 4]));

        let indices = AttributeDescriptor::new(Semantic::BoneIndices, 0, ComponentType::U16, 4);
        assert_eq!(
            [1.0, 2.0, 3.0, 258.0],
            indices.decode(&hex!(0100 0200 0300 0201), [0.0; 4])
        );

        let uv = AttributeDescriptor::new(Semantic::TexCoord, 0, ComponentType::F16, 2);
        assert_eq!([1.0, 0.5, 0.0, 1.0], uv.decode(&hex!(003c 0038), [0.0, 0.0, 0.0, 1.0]));

        let normal = AttributeDescriptor::new(Semantic::Normal, 0, ComponentType::Packed1010102, 4);
        assert_eq!([1.0, 0.0, 1.0, 1.0], normal.decode(&hex!(ff03f0ff), [0.0; 4]));
    }

    #[test]
    fn encode_components() {
        let color = AttributeDescriptor::new(Semantic::Color, 0, ComponentType::U8Normalized, 4);
        let mut bytes = Vec::new();
        color.encode([1.0, 0.0, 2.0, -1.0], &mut bytes);
        assert_eq!(hex!(ff00ff00), &bytes[..]);

        let position = AttributeDescriptor::new(Semantic::Position, 0, ComponentType::F32, 3);
        let mut bytes = Vec::new();
        position.encode([1.0, 2.0, 3.0, 4.0], &mut bytes);
        assert_eq!(hex!(0000803f 00000040 00004040), &bytes[..]);
    }
}

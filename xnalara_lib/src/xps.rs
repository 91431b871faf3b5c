//! The XNALara `.mesh` and `.xps` binary model format and its `.mesh.ascii` text mirror.
//!
//! Both formats store the same fields in the same order.
//! Binary files may start with a [Header] that selects the [Version] and vertex layout.
//! Text files never have a header and always omit tangents.
//!
//! Parsing is implemented once for any [SequentialReader]
//! and writing once for any [SequentialWriter].
use std::{
    io::{Cursor, Seek, Write},
    path::Path,
};

use binrw::BinResult;

use crate::{
    error::{Location, ReadFailure, ReadXpsError},
    reader::{AsciiReader, BinaryReader, SequentialReader},
    vertex::{AttributeDescriptor, ComponentType, Semantic, VertexFlags},
    writer::{AsciiWriter, BinaryWriter, SequentialWriter},
};

/// The first value of binary files with a [Header].
pub const HEADER_MAGIC: u32 = 323232;

/// The smallest possible size in bytes of a bone in a binary file.
const MIN_BONE_SIZE: u64 = 15;

/// Versions of the binary format that affect the vertex layout.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Version {
    /// Files without a [Header].
    V0,
    V2,
    V3,
    V4,
}

impl Version {
    pub fn from_header_major(major: u16) -> Option<Self> {
        match major {
            1 => Some(Version::V2),
            2 => Some(Version::V3),
            3 => Some(Version::V4),
            _ => None,
        }
    }

    pub fn header_major(&self) -> Option<u16> {
        match self {
            Version::V0 => None,
            Version::V2 => Some(1),
            Version::V3 => Some(2),
            Version::V4 => Some(3),
        }
    }

    /// Tangents for each UV layer are stored in the file.
    pub fn has_tangents(&self) -> bool {
        matches!(self, Version::V0 | Version::V2)
    }

    /// Two unused bytes are stored in place of tangents.
    pub fn has_padding(&self) -> bool {
        matches!(self, Version::V4)
    }
}

/// Optional file metadata written by newer exporters.
#[derive(Debug, PartialEq, Clone)]
pub struct Header {
    pub major_version: u16,
    pub minor_version: u16,
    /// Usually "XNAaraL".
    pub tool_author: String,
    /// Machine, user, and file names from the exporting tool.
    pub aux_strings: [String; 3],
    /// Opaque exporter settings preserved as is.
    pub settings: Vec<u32>,
}

impl Header {
    pub fn version(&self) -> Option<Version> {
        Version::from_header_major(self.major_version)
    }

    /// Read the remaining header fields after the version.
    fn read(reader: &mut BinaryReader, major_version: u16, minor_version: u16) -> Self {
        let tool_author = reader.read_string();
        let settings_count = reader.read_u32();
        let aux_strings = [
            reader.read_string(),
            reader.read_string(),
            reader.read_string(),
        ];

        let mut settings = Vec::new();
        for _ in 0..settings_count {
            if !reader.is_valid() {
                break;
            }
            settings.push(reader.read_u32());
        }

        Self {
            major_version,
            minor_version,
            tool_author,
            aux_strings,
            settings,
        }
    }

    fn write<W: SequentialWriter>(&self, writer: &mut W) -> BinResult<()> {
        writer.write_u32(HEADER_MAGIC)?;
        writer.write_u16(self.major_version)?;
        writer.write_u16(self.minor_version)?;
        writer.write_string(&self.tool_author)?;
        writer.write_u32(self.settings.len() as u32)?;
        for s in &self.aux_strings {
            writer.write_string(s)?;
        }
        for value in &self.settings {
            writer.write_u32(*value)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Xps {
    pub header: Option<Header>,
    pub bones: Vec<Bone>,
    pub meshes: Vec<Mesh>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Bone {
    pub name: String,
    /// The index of the parent bone or `None` for root bones.
    /// Stored as `0xFFFF` or `-1` in the file.
    pub parent_index: Option<u16>,
    /// The rest position in model space.
    pub position: [f32; 3],
}

#[derive(Debug, PartialEq, Clone)]
pub struct Texture {
    /// The file name or path exactly as stored in the file.
    pub name: String,
    pub uv_layer: u32,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Mesh {
    pub name: String,
    /// The layout of each vertex in [vertex_data](#structfield.vertex_data).
    pub flags: VertexFlags,
    pub textures: Vec<Texture>,
    pub vertex_count: u32,
    /// Interleaved vertices using the attributes from [VertexFlags::attributes].
    pub vertex_data: Vec<u8>,
    /// Triangle list vertex indices.
    pub indices: Vec<u32>,
}

impl Xps {
    /// Parse a binary `.mesh` or `.xps` file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReadXpsError> {
        let mut reader = BinaryReader::new(bytes);

        let first = reader.read_u32();
        check(&reader, "header")?;

        let (header, version) = if first == HEADER_MAGIC {
            let major = reader.read_u16();
            let minor = reader.read_u16();
            check(&reader, "header")?;

            // Unknown versions may use a different header layout.
            let version = Version::from_header_major(major)
                .ok_or(ReadXpsError::UnsupportedVersion { major, minor })?;

            let header = Header::read(&mut reader, major, minor);
            check(&reader, "header")?;
            (Some(header), version)
        } else {
            (None, Version::V0)
        };

        let bone_count = if header.is_some() {
            reader.read_u32()
        } else {
            first
        };
        check(&reader, "bone count")?;

        // Reject impossible counts before allocating anything.
        if bone_count as u64 * MIN_BONE_SIZE > reader.remaining() {
            return Err(ReadXpsError::PrematureEndOfFile {
                section: "bones",
                reason: ReadFailure::EndOfData,
                location: Location::Offset(reader.position()),
            });
        }

        let flags = VertexFlags {
            uv_layer_count: 0,
            tangents: version.has_tangents(),
            padding: version.has_padding(),
            bone_weights: bone_count > 0,
            float_color: false,
        };
        let (bones, meshes) = read_bones_meshes(&mut reader, bone_count, flags)?;

        Ok(Self {
            header,
            bones,
            meshes,
        })
    }

    /// Parse the text of a `.mesh.ascii` file.
    pub fn from_ascii(text: &str) -> Result<Self, ReadXpsError> {
        let mut reader = AsciiReader::new(text);

        let bone_count = reader.read_u32();
        check(&reader, "bone count")?;

        let flags = VertexFlags {
            uv_layer_count: 0,
            tangents: false,
            padding: false,
            bone_weights: bone_count > 0,
            float_color: false,
        };
        let (bones, meshes) = read_bones_meshes(&mut reader, bone_count, flags)?;

        Ok(Self {
            header: None,
            bones,
            meshes,
        })
    }

    /// Read a binary file from `path` using a fully buffered reader for performance.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReadXpsError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// The version from the header or [Version::V0] if there is no header.
    pub fn version(&self) -> Version {
        self.header
            .as_ref()
            .and_then(|h| h.version())
            .unwrap_or(Version::V0)
    }

    /// Vertex layout flags for a mesh with `uv_layer_count` layers in a binary file of this version.
    pub fn binary_vertex_flags(&self, uv_layer_count: u32) -> VertexFlags {
        let version = self.version();
        VertexFlags {
            uv_layer_count,
            tangents: version.has_tangents(),
            padding: version.has_padding(),
            bone_weights: !self.bones.is_empty(),
            float_color: false,
        }
    }

    /// Vertex layout flags for a mesh with `uv_layer_count` layers in an ASCII file.
    pub fn ascii_vertex_flags(&self, uv_layer_count: u32) -> VertexFlags {
        VertexFlags {
            uv_layer_count,
            tangents: false,
            padding: false,
            bone_weights: !self.bones.is_empty(),
            float_color: false,
        }
    }

    /// Write the binary format.
    /// Each mesh is written using its own [flags](struct.Mesh.html#structfield.flags).
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        let mut writer = BinaryWriter::new(writer);
        match &self.header {
            Some(header) => {
                header.write(&mut writer)?;
                writer.write_u32(self.bones.len() as u32)?;
            }
            None => writer.write_u32(self.bones.len() as u32)?,
        }
        self.write_bones_meshes(&mut writer)
    }

    pub fn to_bytes(&self) -> BinResult<Vec<u8>> {
        let mut writer = Cursor::new(Vec::new());
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }

    /// Write the ASCII format. The header is not part of the text format.
    pub fn write_ascii<W: Write>(&self, writer: &mut W) -> BinResult<()> {
        let mut writer = AsciiWriter::new(writer);
        writer.write_u32(self.bones.len() as u32)?;
        writer.end_line()?;
        self.write_bones_meshes(&mut writer)
    }

    pub fn to_ascii(&self) -> BinResult<String> {
        let mut bytes = Vec::new();
        self.write_ascii(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| binrw::Error::Custom {
            pos: 0,
            err: Box::new(e),
        })
    }

    fn write_bones_meshes<W: SequentialWriter>(&self, writer: &mut W) -> BinResult<()> {
        for bone in &self.bones {
            bone.write(writer)?;
        }
        writer.write_u32(self.meshes.len() as u32)?;
        writer.end_line()?;
        for mesh in &self.meshes {
            mesh.write(writer)?;
        }
        Ok(())
    }
}

fn read_bones_meshes<R: SequentialReader>(
    reader: &mut R,
    bone_count: u32,
    flags: VertexFlags,
) -> Result<(Vec<Bone>, Vec<Mesh>), ReadXpsError> {
    let mut bones = Vec::new();
    for _ in 0..bone_count {
        bones.push(Bone::read(reader));
        check(reader, "bone")?;
    }

    let mesh_count = reader.read_u32();
    check(reader, "mesh count")?;

    let mut meshes = Vec::new();
    for _ in 0..mesh_count {
        meshes.push(Mesh::read(reader, flags));
        check(reader, "mesh")?;
    }

    Ok((bones, meshes))
}

fn check<R: SequentialReader>(reader: &R, section: &'static str) -> Result<(), ReadXpsError> {
    match reader.failure() {
        Some((reason, location)) => Err(ReadXpsError::PrematureEndOfFile {
            section,
            reason,
            location,
        }),
        None => Ok(()),
    }
}

impl Bone {
    pub fn read<R: SequentialReader>(reader: &mut R) -> Self {
        let name = reader.read_string();
        let parent = reader.read_i16();
        let position = [reader.read_f32(), reader.read_f32(), reader.read_f32()];
        Self {
            name,
            // Some exporters use i16::MAX instead of -1 for root bones.
            parent_index: (parent >= 0 && parent != i16::MAX).then_some(parent as u16),
            position,
        }
    }

    pub fn write<W: SequentialWriter>(&self, writer: &mut W) -> BinResult<()> {
        writer.write_string(&self.name)?;
        writer.write_i16(self.parent_index.map(|i| i as i16).unwrap_or(-1))?;
        writer.end_line()?;
        for value in self.position {
            writer.write_f32(value)?;
        }
        writer.end_line()
    }
}

impl Mesh {
    /// Read a mesh with the vertex layout from `flags` and the UV layer count from the file.
    pub fn read<R: SequentialReader>(reader: &mut R, flags: VertexFlags) -> Self {
        let name = reader.read_string();
        let uv_layer_count = reader.read_u32();

        let texture_count = reader.read_u32();
        let mut textures = Vec::new();
        for _ in 0..texture_count {
            if !reader.is_valid() {
                break;
            }
            textures.push(Texture {
                name: reader.read_string(),
                uv_layer: reader.read_u32(),
            });
        }

        let flags = VertexFlags {
            uv_layer_count,
            ..flags
        };
        let attributes = flags.attributes();

        let vertex_count = reader.read_u32();
        let mut vertex_data = Vec::new();
        for _ in 0..vertex_count {
            if !reader.is_valid() {
                break;
            }
            for attribute in &attributes {
                read_attribute(reader, attribute, &mut vertex_data);
            }
        }

        let triangle_count = reader.read_u32();
        let mut indices = Vec::new();
        for _ in 0..triangle_count {
            if !reader.is_valid() {
                break;
            }
            indices.extend([reader.read_u32(), reader.read_u32(), reader.read_u32()]);
        }

        Self {
            name,
            flags,
            textures,
            vertex_count,
            vertex_data,
            indices,
        }
    }

    pub fn write<W: SequentialWriter>(&self, writer: &mut W) -> BinResult<()> {
        writer.write_string(&self.name)?;
        writer.write_u32(self.flags.uv_layer_count)?;
        writer.end_line()?;

        writer.write_u32(self.textures.len() as u32)?;
        writer.end_line()?;
        for texture in &self.textures {
            writer.write_string(&texture.name)?;
            writer.write_u32(texture.uv_layer)?;
            writer.end_line()?;
        }

        writer.write_u32(self.vertex_count)?;
        writer.end_line()?;

        let attributes = self.flags.attributes();
        let stride: usize = attributes.iter().map(|a| a.size_in_bytes()).sum();
        for vertex in self
            .vertex_data
            .chunks_exact(stride)
            .take(self.vertex_count as usize)
        {
            let mut offset = 0;
            for attribute in &attributes {
                let size = attribute.size_in_bytes();
                write_attribute(writer, attribute, &vertex[offset..offset + size])?;
                writer.end_line()?;
                offset += size;
            }
        }

        writer.write_u32((self.indices.len() / 3) as u32)?;
        writer.end_line()?;
        for triangle in self.indices.chunks_exact(3) {
            for index in triangle {
                writer.write_u32(*index)?;
            }
            writer.end_line()?;
        }
        Ok(())
    }
}

fn read_attribute<R: SequentialReader>(
    reader: &mut R,
    attribute: &AttributeDescriptor,
    output: &mut Vec<u8>,
) {
    // Text files can end skinning values early and omit the remaining zeros.
    let allow_short_line = matches!(
        attribute.semantic,
        Semantic::BoneIndices | Semantic::BoneWeights
    );

    let component_size = attribute.size_in_bytes() / attribute.count.max(1);
    for i in 0..attribute.count {
        if allow_short_line && i > 0 && reader.consume_newline() {
            output.extend(std::iter::repeat_n(
                0u8,
                (attribute.count - i) * component_size,
            ));
            break;
        }

        match attribute.component_type {
            ComponentType::U8 | ComponentType::U8Normalized => output.push(reader.read_u8()),
            ComponentType::U16 | ComponentType::F16 => {
                output.extend(reader.read_u16().to_le_bytes())
            }
            ComponentType::F32 => output.extend(reader.read_f32().to_le_bytes()),
            ComponentType::Packed1010102 => {
                output.extend(reader.read_u32().to_le_bytes());
                break;
            }
        }
    }
}

fn write_attribute<W: SequentialWriter>(
    writer: &mut W,
    attribute: &AttributeDescriptor,
    bytes: &[u8],
) -> BinResult<()> {
    match attribute.component_type {
        ComponentType::U8 | ComponentType::U8Normalized => {
            for value in bytes {
                writer.write_u8(*value)?;
            }
        }
        ComponentType::U16 | ComponentType::F16 => {
            for value in bytes.chunks_exact(2) {
                writer.write_u16(u16::from_le_bytes([value[0], value[1]]))?;
            }
        }
        ComponentType::F32 => {
            for value in bytes.chunks_exact(4) {
                writer.write_f32(f32::from_le_bytes([value[0], value[1], value[2], value[3]]))?;
            }
        }
        ComponentType::Packed1010102 => {
            writer.write_u32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use hexlit::hex;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    // Header for version 3 with one bone and one mesh with a single vertex.
    const VERSION3: [u8; 158] = hex!(
        a0ee0400 0200 0f00 0x07584e416172614c 01000000 0161 00 00 2a000000
        01000000
        04726f6f74 ffff 00000000 00000000 00000000
        01000000
        04626f6479 01000000 01000000 0x05612e706e67 00000000
        01000000
        0000803f 00000040 00004040
        00000000 00000000 0000803f
        ff800000
        0000003f 0x0000803e
        0000 0000 0000 0000
        0000803f 00000000 00000000 00000000
        01000000 00000000 00000000 00000000
    );

    #[test]
    fn read_version3() {
        let xps = Xps::from_bytes(&VERSION3).unwrap();
        assert_eq!(
            Some(Header {
                major_version: 2,
                minor_version: 15,
                tool_author: "XNAaraL".to_string(),
                aux_strings: ["a".to_string(), String::new(), String::new()],
                settings: vec![42],
            }),
            xps.header
        );
        assert_eq!(Version::V3, xps.version());
        assert_eq!(
            vec![Bone {
                name: "root".to_string(),
                parent_index: None,
                position: [0.0; 3],
            }],
            xps.bones
        );

        let mesh = &xps.meshes[0];
        assert_eq!("body", mesh.name);
        assert_eq!(
            VertexFlags {
                uv_layer_count: 1,
                tangents: false,
                padding: false,
                bone_weights: true,
                float_color: false,
            },
            mesh.flags
        );
        assert_eq!(
            vec![Texture {
                name: "a.png".to_string(),
                uv_layer: 0
            }],
            mesh.textures
        );
        assert_eq!(1, mesh.vertex_count);
        assert_eq!(60, mesh.vertex_data.len());
        assert_eq!(vec![0, 0, 0], mesh.indices);
    }

    #[test]
    fn write_version3() {
        let xps = Xps::from_bytes(&VERSION3).unwrap();
        assert_eq!(&VERSION3[..], &xps.to_bytes().unwrap()[..]);
    }

    #[test]
    fn read_unsupported_version() {
        let bytes = hex!(a0ee0400 0400 0000);
        assert!(matches!(
            Xps::from_bytes(&bytes),
            Err(ReadXpsError::UnsupportedVersion { major: 4, minor: 0 })
        ));
    }

    #[test]
    fn read_unsupported_version_full_header() {
        // The version is rejected before reading the author string.
        let bytes = hex!(a0ee0400 0900 0100 03 616263 00000000);
        assert!(matches!(
            Xps::from_bytes(&bytes),
            Err(ReadXpsError::UnsupportedVersion { major: 9, minor: 1 })
        ));
    }

    #[test]
    fn read_truncated_header() {
        let bytes = hex!(a0ee0400 0200);
        assert!(matches!(
            Xps::from_bytes(&bytes),
            Err(ReadXpsError::PrematureEndOfFile {
                section: "header",
                ..
            })
        ));
    }

    #[test]
    fn read_too_many_bones() {
        // 2 bones need at least 30 bytes.
        let bytes = hex!(02000000 00ffff00000000000000000000000000);
        assert!(matches!(
            Xps::from_bytes(&bytes),
            Err(ReadXpsError::PrematureEndOfFile {
                section: "bones",
                location: Location::Offset(4),
                ..
            })
        ));
    }

    #[test]
    fn read_empty_file() {
        assert!(matches!(
            Xps::from_bytes(&[0]),
            Err(ReadXpsError::PrematureEndOfFile {
                section: "header",
                ..
            })
        ));
    }

    #[test]
    fn read_truncated_mesh() {
        let bytes = &VERSION3[..VERSION3.len() - 6];
        assert!(matches!(
            Xps::from_bytes(bytes),
            Err(ReadXpsError::PrematureEndOfFile {
                section: "mesh",
                reason: ReadFailure::EndOfData,
                ..
            })
        ));
    }

    #[test]
    fn read_version0_tangents() {
        let bytes = hex!(
            00000000
            01000000
            00 01000000 00000000
            01000000
            00000000 00000000 00000000
            00000000 00000000 0000803f
            ffffffff
            00000000 00000000
            0000803f 00000000 00000000 0000803f
            00000000
        );
        let xps = Xps::from_bytes(&bytes).unwrap();
        assert_eq!(None, xps.header);
        assert!(xps.bones.is_empty());

        let mesh = &xps.meshes[0];
        assert!(mesh.flags.tangents);
        assert!(!mesh.flags.bone_weights);
        assert_eq!(12 + 12 + 4 + 8 + 16, mesh.vertex_data.len());
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn read_ascii() {
        let text = indoc! {"
            2 # bones
            root
            -1
            0 0 0
            arm
            0
            1 0 0
            1 # meshes
            body
            1
            1
            textures\\a.png
            0
            3
            0 0 0
            0 0 1
            255 255 255 255
            0 0
            1 0
            1
            1 0 0
            0 0 1
            255 255 255 255
            1 0
            1
            1
            0 1 0
            0 0 1
            255 255 255 255
            0 1
            0 1
            0.5 0.5 0 0
            1
            0 1 2
        "};
        let xps = Xps::from_ascii(text).unwrap();
        assert_eq!(
            vec![
                Bone {
                    name: "root".to_string(),
                    parent_index: None,
                    position: [0.0; 3],
                },
                Bone {
                    name: "arm".to_string(),
                    parent_index: Some(0),
                    position: [1.0, 0.0, 0.0],
                }
            ],
            xps.bones
        );

        let mesh = &xps.meshes[0];
        assert_eq!("textures\\a.png", mesh.textures[0].name);
        assert_eq!(3, mesh.vertex_count);
        assert_eq!(vec![0, 1, 2], mesh.indices);

        let format = mesh.flags.format(crate::vertex::ElementWidth::U16);
        assert_eq!(60, format.stride());
        assert_eq!(3 * 60, mesh.vertex_data.len());

        let indices_offset = format.offset_of(Semantic::BoneIndices, 0).unwrap();
        let weights_offset = format.offset_of(Semantic::BoneWeights, 0).unwrap();
        let indices = format.attribute(Semantic::BoneIndices, 0).unwrap();
        let weights = format.attribute(Semantic::BoneWeights, 0).unwrap();

        let vertex = |i: usize| &mesh.vertex_data[i * 60..(i + 1) * 60];
        assert_eq!(
            [1.0, 0.0, 0.0, 0.0],
            indices.decode(&vertex(0)[indices_offset..], [0.0; 4])
        );
        assert_eq!(
            [1.0, 0.0, 0.0, 0.0],
            weights.decode(&vertex(1)[weights_offset..], [0.0; 4])
        );
        assert_eq!(
            [0.0, 1.0, 0.0, 0.0],
            indices.decode(&vertex(2)[indices_offset..], [0.0; 4])
        );
        assert_eq!(
            [0.5, 0.5, 0.0, 0.0],
            weights.decode(&vertex(2)[weights_offset..], [0.0; 4])
        );
    }

    #[test]
    fn read_ascii_invalid_token() {
        let text = "1\nroot\n-1\n0 0 zero\n0\n";
        assert!(matches!(
            Xps::from_ascii(text),
            Err(ReadXpsError::PrematureEndOfFile {
                section: "bone",
                reason: ReadFailure::InvalidToken,
                location: Location::Line(4),
            })
        ));
    }

    #[test]
    fn write_ascii_read_ascii() {
        let xps = Xps {
            header: None,
            bones: vec![Bone {
                name: "root bone".to_string(),
                parent_index: None,
                position: [0.1, -2.5, 3.0],
            }],
            meshes: vec![Mesh {
                name: "1_body_0.5".to_string(),
                flags: VertexFlags {
                    uv_layer_count: 1,
                    tangents: false,
                    padding: false,
                    bone_weights: true,
                    float_color: false,
                },
                textures: vec![Texture {
                    name: "body.dds".to_string(),
                    uv_layer: 0,
                }],
                vertex_count: 1,
                vertex_data: hex!(
                    cdcccc3d 00000040 00004040
                    00000000 00000000 0000803f
                    01020304
                    0000003f 0x0000803e
                    0000 0100 0000 0000
                    0000403f 0x0000803e 00000000 00000000
                )
                .to_vec(),
                indices: vec![0, 0, 0],
            }],
        };

        let text = xps.to_ascii().unwrap();
        assert_eq!(xps, Xps::from_ascii(&text).unwrap());
    }
}

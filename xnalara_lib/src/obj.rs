//! Wavefront OBJ geometry with the XNALara `vc` vertex color extension.
//!
//! Faces are triangulated as a fan with reversed winding.
//! Each unique combination of position, texture coordinate, normal, and color
//! indices becomes a single vertex.
use ahash::AHashMap;
use log::warn;

use crate::error::ParseObjError;

#[derive(Debug, PartialEq, Clone)]
pub struct Obj {
    /// Unique vertices referenced by [indices](#structfield.indices).
    pub vertices: Vec<ObjVertex>,
    /// Triangle list indices into [vertices](#structfield.vertices).
    pub indices: Vec<u32>,
    /// Ranges of [indices](#structfield.indices) drawn with the same material.
    pub material_ranges: Vec<MaterialRange>,
    /// The `mtllib` paths in the order they appear.
    pub material_libraries: Vec<String>,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ObjVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// The texture coordinate exactly as stored in the file.
    pub tex_coord: [f32; 2],
    /// Defaults to white if the face does not reference a `vc` color.
    pub color: [f32; 4],
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MaterialRange {
    /// The name from `usemtl` or an empty string for faces without a material.
    pub material: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
struct IndexSet {
    position: usize,
    tex_coord: usize,
    normal: usize,
    color: Option<usize>,
}

#[derive(Default)]
struct ObjParser {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    tex_coords: Vec<[f32; 2]>,
    colors: Vec<[f32; 4]>,
    vertices: Vec<ObjVertex>,
    unique_vertices: AHashMap<IndexSet, u32>,
    indices: Vec<u32>,
}

impl Obj {
    pub fn parse(text: &str) -> Result<Self, ParseObjError> {
        let mut parser = ObjParser::default();
        let mut material_ranges = Vec::new();
        let mut material_libraries = Vec::new();

        // Faces before the first usemtl share a range with the first material.
        let mut active_material: Option<(String, usize)> = None;

        for (i, line) in text.lines().enumerate() {
            let line_number = i + 1;
            let line = line.trim();
            let (directive, arguments) = line
                .split_once(char::is_whitespace)
                .map(|(d, a)| (d, a.trim()))
                .unwrap_or((line, ""));

            match directive {
                "" => (),
                d if d.starts_with('#') => (),
                "v" => {
                    let [x, y, z] = parse_floats(arguments, line_number)?;
                    parser.positions.push([x, y, z]);
                }
                "vn" => {
                    let [x, y, z] = parse_floats(arguments, line_number)?;
                    parser.normals.push([x, y, z]);
                }
                "vt" => {
                    let [u, v] = parse_floats(arguments, line_number)?;
                    parser.tex_coords.push([u, v]);
                }
                "vc" => {
                    let color = parse_color(arguments, line_number)?;
                    parser.colors.push(color);
                }
                "f" => parser.parse_face(arguments, line_number)?,
                "mtllib" => material_libraries.push(file_name(arguments)),
                "usemtl" => {
                    let start = match active_material.take() {
                        Some((material, start)) => {
                            material_ranges.push(MaterialRange {
                                material,
                                start,
                                end: parser.indices.len(),
                            });
                            parser.indices.len()
                        }
                        None => 0,
                    };
                    active_material = Some((arguments.to_string(), start));
                }
                "o" | "g" | "s" => (),
                _ => warn!("Ignoring unsupported OBJ directive {directive:?} on line {line_number}"),
            }
        }

        let (material, start) = active_material.unwrap_or_default();
        material_ranges.push(MaterialRange {
            material,
            start,
            end: parser.indices.len(),
        });

        Ok(Self {
            vertices: parser.vertices,
            indices: parser.indices,
            material_ranges,
            material_libraries,
        })
    }
}

impl ObjParser {
    fn parse_face(&mut self, arguments: &str, line: usize) -> Result<(), ParseObjError> {
        let sets: Vec<_> = arguments
            .split_whitespace()
            .map(|corner| self.parse_index_set(corner, line))
            .collect::<Result<_, _>>()?;

        if sets.len() < 3 {
            return Err(ParseObjError::InvalidArgument {
                line,
                reason: format!("face has {} vertices but at least 3 are required", sets.len()),
            });
        }

        // Triangle fan with reversed winding.
        for i in 2..sets.len() {
            for set in [sets[0], sets[i], sets[i - 1]] {
                let index = self.unified_index(set);
                self.indices.push(index);
            }
        }
        Ok(())
    }

    fn parse_index_set(&self, corner: &str, line: usize) -> Result<IndexSet, ParseObjError> {
        let mut parts = corner.split('/');
        let mut next = |name: &str| {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ParseObjError::InvalidArgument {
                    line,
                    reason: format!("face vertex {corner:?} is missing a {name} index"),
                })
        };
        let position = next("position")?;
        let tex_coord = next("texture coordinate")?;
        let normal = next("normal")?;
        let color = parts.next().filter(|p| !p.is_empty());

        Ok(IndexSet {
            position: resolve_index(position, self.positions.len(), "position", line)?,
            tex_coord: resolve_index(tex_coord, self.tex_coords.len(), "texture coordinate", line)?,
            normal: resolve_index(normal, self.normals.len(), "normal", line)?,
            color: color
                .map(|c| resolve_index(c, self.colors.len(), "color", line))
                .transpose()?,
        })
    }

    fn unified_index(&mut self, set: IndexSet) -> u32 {
        if let Some(index) = self.unique_vertices.get(&set) {
            return *index;
        }

        let index = self.vertices.len() as u32;
        self.vertices.push(ObjVertex {
            position: self.positions[set.position],
            normal: self.normals[set.normal],
            tex_coord: self.tex_coords[set.tex_coord],
            color: set.color.map(|c| self.colors[c]).unwrap_or([1.0; 4]),
        });
        self.unique_vertices.insert(set, index);
        index
    }
}

/// Convert 1-based or negative relative indices to 0-based indices.
fn resolve_index(
    value: &str,
    count: usize,
    kind: &'static str,
    line: usize,
) -> Result<usize, ParseObjError> {
    let index: i64 = value.parse().map_err(|_| ParseObjError::InvalidArgument {
        line,
        reason: format!("{value:?} is not a valid {kind} index"),
    })?;

    let resolved = if index > 0 {
        index - 1
    } else {
        count as i64 + index
    };

    if index == 0 || resolved < 0 || resolved >= count as i64 {
        Err(ParseObjError::IndexOutOfRange {
            line,
            kind,
            index,
            count,
        })
    } else {
        Ok(resolved as usize)
    }
}

fn parse_floats<const N: usize>(arguments: &str, line: usize) -> Result<[f32; N], ParseObjError> {
    let mut values = [0.0; N];
    let mut parts = arguments.split_whitespace();
    for value in &mut values {
        *value = parse_float(parts.next(), line)?;
    }
    Ok(values)
}

fn parse_color(arguments: &str, line: usize) -> Result<[f32; 4], ParseObjError> {
    let parts: Vec<_> = arguments.split_whitespace().collect();
    match parts.len() {
        3 | 4 => {
            let mut color = [1.0; 4];
            for (c, part) in color.iter_mut().zip(&parts) {
                *c = parse_float(Some(*part), line)?;
            }
            Ok(color)
        }
        n => Err(ParseObjError::InvalidArgument {
            line,
            reason: format!("vertex color has {n} components but 3 or 4 are required"),
        }),
    }
}

fn parse_float(value: Option<&str>, line: usize) -> Result<f32, ParseObjError> {
    let value = value.ok_or_else(|| ParseObjError::InvalidArgument {
        line,
        reason: "expected more values".to_string(),
    })?;
    value.parse().map_err(|_| ParseObjError::InvalidArgument {
        line,
        reason: format!("{value:?} is not a valid number"),
    })
}

/// The path with only the last component kept for absolute Windows paths like `C:\textures\a.png`.
pub fn file_name(path: &str) -> String {
    let path = path.trim();
    let bytes = path.as_bytes();
    let is_windows_path =
        bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\';
    if is_windows_path {
        path.rsplit('\\').next().unwrap_or(path).trim().to_string()
    } else {
        path.to_string()
    }
}

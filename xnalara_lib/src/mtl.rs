//! Wavefront MTL material libraries referenced by [Obj](crate::obj::Obj) files.
use indexmap::IndexMap;
use log::warn;

use crate::{error::ParseMtlError, obj::file_name};

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Mtl {
    /// Materials in the order they are defined.
    pub materials: IndexMap<String, Material>,
}

/// Colors and texture paths for a single `newmtl` block.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Material {
    /// `Ka`
    pub ambient: Option<[f32; 3]>,
    /// `Kd`
    pub diffuse: Option<[f32; 3]>,
    /// `Ks`
    pub specular: Option<[f32; 3]>,
    /// `Ns`
    pub specular_exponent: Option<f32>,
    /// `map_Kd`
    pub diffuse_texture: Option<String>,
    /// `map_Ks`
    pub specular_texture: Option<String>,
    /// `map_Kn`, `bump`, or `map_bump`
    pub bump_texture: Option<String>,
}

impl Mtl {
    pub fn parse(text: &str) -> Result<Self, ParseMtlError> {
        let mut materials = IndexMap::new();
        let mut current: Option<(String, Material)> = None;

        for (i, line) in text.lines().enumerate() {
            let line_number = i + 1;
            let line = line.trim();
            let (directive, arguments) = line
                .split_once(char::is_whitespace)
                .map(|(d, a)| (d, a.trim()))
                .unwrap_or((line, ""));

            if directive.is_empty() || directive.starts_with('#') {
                continue;
            }

            if directive == "newmtl" {
                if let Some((name, material)) = current.take() {
                    materials.insert(name, material);
                }
                current = Some((arguments.to_string(), Material::default()));
                continue;
            }

            let Some((_, material)) = current.as_mut() else {
                return Err(ParseMtlError::InvalidArgument {
                    line: line_number,
                    reason: format!("{directive:?} appears before any newmtl"),
                });
            };

            match directive {
                "Ka" => material.ambient = Some(parse_color(arguments, line_number)?),
                "Kd" => material.diffuse = Some(parse_color(arguments, line_number)?),
                "Ks" => material.specular = Some(parse_color(arguments, line_number)?),
                "Ns" => material.specular_exponent = Some(parse_float(arguments, line_number)?),
                "map_Kd" => material.diffuse_texture = Some(file_name(arguments)),
                "map_Ks" => material.specular_texture = Some(file_name(arguments)),
                "map_Kn" | "bump" | "map_bump" => material.bump_texture = Some(file_name(arguments)),
                _ => warn!("Ignoring unsupported MTL directive {directive:?} on line {line_number}"),
            }
        }

        if let Some((name, material)) = current {
            materials.insert(name, material);
        }

        Ok(Self { materials })
    }
}

/// Colors use either a single value for all channels or one value per channel.
fn parse_color(arguments: &str, line: usize) -> Result<[f32; 3], ParseMtlError> {
    let values = arguments
        .split_whitespace()
        .map(|v| parse_float(v, line))
        .collect::<Result<Vec<_>, _>>()?;
    match values[..] {
        [v] => Ok([v; 3]),
        [r, g, b] => Ok([r, g, b]),
        _ => Err(ParseMtlError::InvalidArgument {
            line,
            reason: format!("color has {} values but 1 or 3 are required", values.len()),
        }),
    }
}

fn parse_float(value: &str, line: usize) -> Result<f32, ParseMtlError> {
    value.parse().map_err(|_| ParseMtlError::InvalidArgument {
        line,
        reason: format!("{value:?} is not a valid number"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_materials() {
        let text = indoc! {"
            # two materials
            newmtl skin
            Ka 0.5
            Kd 1 0.5 0.25
            Ks 0 0 0
            Ns 32
            map_Kd C:\\Users\\lara\\skin.png
            map_bump skin_bump.png
            illum 2

            newmtl hair
            map_Ks textures/hair_spec.png
        "};
        let mtl = Mtl::parse(text).unwrap();
        assert_eq!(
            vec!["skin", "hair"],
            mtl.materials.keys().map(String::as_str).collect::<Vec<_>>()
        );
        assert_eq!(
            Material {
                ambient: Some([0.5; 3]),
                diffuse: Some([1.0, 0.5, 0.25]),
                specular: Some([0.0; 3]),
                specular_exponent: Some(32.0),
                diffuse_texture: Some("skin.png".to_string()),
                specular_texture: None,
                bump_texture: Some("skin_bump.png".to_string()),
            },
            mtl.materials["skin"]
        );
        assert_eq!(
            Some("textures/hair_spec.png".to_string()),
            mtl.materials["hair"].specular_texture
        );
    }

    #[test]
    fn parse_color_two_values() {
        let text = "newmtl a\nKd 1 1\n";
        assert!(matches!(
            Mtl::parse(text),
            Err(ParseMtlError::InvalidArgument { line: 2, .. })
        ));
    }

    #[test]
    fn parse_before_newmtl() {
        assert!(matches!(
            Mtl::parse("Kd 1 1 1"),
            Err(ParseMtlError::InvalidArgument { line: 1, .. })
        ));
    }

    #[test]
    fn parse_empty() {
        assert_eq!(Mtl::default(), Mtl::parse("# nothing\n").unwrap());
    }
}

//! Model specific shader, material, and mesh settings.
//!
//! XNALara hardcodes settings like shaders and render parameters for each supported model.
//! These settings are stored in JSON files with the extension `.modelparams.json`
//! and loaded into a [ParamsLibrary].
//!
//! Models named `generic_item`, `character`, or `outfit` and all `.xps` files
//! encode their settings in each mesh name instead.
//! These use the mesh name convention described in [parse_generic_mesh_name].
use std::{
    path::Path,
    sync::Arc,
};

use glam::Vec3;
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LoadModelError, LoadParamsError},
    mesh::RenderParameterValue,
};

/// The file name suffix for parameter files in a [ParamsLibrary] folder.
pub const PARAMS_EXTENSION: &str = ".modelparams.json";

/// The parameters used as the base for generic items.
pub const GENERIC_ITEM_BASE: &str = "lara";

/// Settings for a single mesh.
#[derive(Debug, PartialEq, Clone)]
pub struct MeshParams {
    pub mesh_groups: Vec<String>,
    pub display_name: String,
    pub visible: bool,
    pub optional_part_names: Vec<String>,
    pub shader: Option<ShaderDescription>,
    pub uses_alpha_blending: bool,
    pub render_parameters: IndexMap<String, RenderParameterValue>,
    pub splitters: Vec<MeshSplitter>,
    /// The camera target name and bone names encoded in a generic item mesh name.
    pub camera_target: Option<(String, Vec<String>)>,
}

impl MeshParams {
    fn new(mesh_name: &str) -> Self {
        Self {
            mesh_groups: Vec::new(),
            display_name: mesh_name.to_string(),
            visible: true,
            optional_part_names: Vec::new(),
            shader: None,
            uses_alpha_blending: false,
            render_parameters: IndexMap::new(),
            splitters: Vec::new(),
            camera_target: None,
        }
    }
}

/// A read only lookup of settings by mesh name used when loading a model.
pub trait ModelParameters: Sync {
    fn mesh_params(&self, mesh_name: &str) -> MeshParams;

    /// Camera target names and their bone names for a model with the given meshes.
    fn camera_targets(&self, mesh_names: &[String]) -> IndexMap<String, Vec<String>>;

    fn display_name(&self, mesh_name: &str) -> String {
        self.mesh_params(mesh_name).display_name
    }

    fn initially_visible(&self, mesh_name: &str) -> bool {
        self.mesh_params(mesh_name).visible
    }

    /// The shader name and whether the shader uses alpha blending.
    fn shader_for(&self, mesh_name: &str) -> (Option<String>, bool) {
        let params = self.mesh_params(mesh_name);
        (params.shader.map(|s| s.base_name), params.uses_alpha_blending)
    }

    fn render_parameter_defaults(&self, mesh_name: &str) -> IndexMap<String, RenderParameterValue> {
        self.mesh_params(mesh_name).render_parameters
    }

    fn mesh_splitters(&self, mesh_name: &str) -> Vec<MeshSplitter> {
        self.mesh_params(mesh_name).splitters
    }

    fn camera_target_bone_names(&self, mesh_names: &[String], target: &str) -> Vec<String> {
        self.camera_targets(mesh_names)
            .swap_remove(target)
            .unwrap_or_default()
    }
}

/// A shader and the order of its inputs as used by XNALara mesh groups.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShaderDescription {
    pub base_name: String,
    /// The role of each texture of a mesh in order.
    pub texture_roles: Vec<String>,
    /// The render parameter names for each value in a generic item mesh name.
    pub parameters_in_order: Vec<Vec<String>>,
    pub solid_mesh_groups: Vec<String>,
    pub alpha_mesh_groups: Vec<String>,
}

/// Bounds for a part of a mesh created by [partial_mesh_from_splitter](crate::MeshDescriptor::partial_mesh_from_splitter).
/// Missing bounds are unlimited.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSplitter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_z: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_z: Option<f32>,
    pub split_part_name: String,
}

impl MeshSplitter {
    pub fn min(&self) -> Vec3 {
        let bound = |v: Option<f32>| v.unwrap_or(f32::NEG_INFINITY);
        Vec3::new(bound(self.min_x), bound(self.min_y), bound(self.min_z))
    }

    pub fn max(&self) -> Vec3 {
        let bound = |v: Option<f32>| v.unwrap_or(f32::INFINITY);
        Vec3::new(bound(self.max_x), bound(self.max_y), bound(self.max_z))
    }
}

/// The contents of a parameters file.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamsData {
    /// The name of the parameters to use for anything not defined here.
    pub base: Option<String>,
    /// Mesh names for each mesh group.
    pub mesh_group_names: IndexMap<String, Vec<String>>,
    /// The mesh group for meshes not in any mesh group.
    pub default_mesh_group: Option<String>,
    /// Render parameter values for specific meshes.
    pub render_parameters: IndexMap<String, IndexMap<String, RenderParameterValue>>,
    pub default_render_parameters: IndexMap<String, RenderParameterValue>,
    pub camera_targets: IndexMap<String, Vec<String>>,
    pub mesh_splitters: IndexMap<String, Vec<MeshSplitter>>,
    pub xna_lara_shader_descriptions: IndexMap<String, ShaderDescription>,
}

/// [ModelParameters] from a parameters file or the mesh names of a generic item.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ModelParams {
    data: ParamsData,
    base: Option<Arc<ModelParams>>,
    generic_item: bool,
}

impl ModelParams {
    pub fn new(data: ParamsData, base: Option<Arc<ModelParams>>) -> Self {
        Self {
            data,
            base,
            generic_item: false,
        }
    }

    /// Parameters that read settings from mesh names and use `base` for everything else.
    pub fn generic_item(base: Arc<ModelParams>) -> Self {
        Self {
            data: ParamsData::default(),
            base: Some(base),
            generic_item: true,
        }
    }

    /// Deserialize parameters and resolve the base from `library`.
    pub fn from_json(json: &str, library: &ParamsLibrary) -> Result<Self, LoadParamsError> {
        let data: ParamsData = serde_json::from_str(json)?;
        let base = match &data.base {
            Some(name) => Some(library.params.get(name).cloned().ok_or_else(|| {
                LoadParamsError::BaseNotFound { name: name.clone() }
            })?),
            None => None,
        };
        Ok(Self::new(data, base))
    }

    pub fn data(&self) -> &ParamsData {
        &self.data
    }

    pub fn base(&self) -> Option<&ModelParams> {
        self.base.as_deref()
    }

    pub fn is_generic_item(&self) -> bool {
        self.generic_item
    }

    fn shader_and_alpha(&self, mesh_group: &str) -> Option<(&ShaderDescription, bool)> {
        for shader in self.data.xna_lara_shader_descriptions.values() {
            if shader.solid_mesh_groups.iter().any(|g| g == mesh_group) {
                return Some((shader, false));
            }
            if shader.alpha_mesh_groups.iter().any(|g| g == mesh_group) {
                return Some((shader, true));
            }
        }
        self.base.as_ref()?.shader_and_alpha(mesh_group)
    }

    fn first_shader_and_alpha(&self, mesh_groups: &[String]) -> Option<(&ShaderDescription, bool)> {
        mesh_groups.iter().find_map(|g| self.shader_and_alpha(g))
    }

    fn generic_item_mesh_params(&self, mesh_name: &str) -> MeshParams {
        let mut params = MeshParams::new(mesh_name);
        let base_params = self.base.as_ref().map(|b| b.mesh_params(mesh_name));

        let Some(generic) = parse_generic_mesh_name(mesh_name) else {
            // Use any settings for the name from the base instead.
            if let Some(base_params) = base_params {
                if let Some((shader, alpha)) = self.first_shader_and_alpha(&base_params.mesh_groups)
                {
                    params.shader = Some(shader.clone());
                    params.uses_alpha_blending = alpha;
                }
                params.mesh_groups = base_params.mesh_groups;
                params.render_parameters = base_params.render_parameters;
            }
            return params;
        };

        let mesh_group = format!("MeshGroup{}", generic.mesh_group);
        params.mesh_groups = vec![mesh_group.clone()];
        params.visible = generic.visible;
        params.optional_part_names = generic.optional_part_names;
        params.display_name = generic.display_name;

        let (shader, alpha) = match self.shader_and_alpha(&mesh_group) {
            Some((shader, alpha)) => (Some(shader.clone()), alpha),
            None => (None, true),
        };

        // Lowest to highest priority.
        let mut render_parameters = base_params
            .map(|p| p.render_parameters)
            .unwrap_or_default();
        render_parameters.extend(self.data.default_render_parameters.clone());
        if let Some(shader) = &shader {
            for (i, names) in shader.parameters_in_order.iter().enumerate() {
                let value = generic.values.get(i).copied().unwrap_or_default();
                for name in names {
                    render_parameters.insert(name.clone(), RenderParameterValue::Float(value));
                }
            }
        }

        params.shader = shader;
        params.uses_alpha_blending = alpha;
        params.render_parameters = render_parameters;
        params.camera_target = generic.camera_target;
        params
    }

    fn file_mesh_params(&self, mesh_name: &str) -> MeshParams {
        let mut params = MeshParams::new(mesh_name);
        let base_params = self.base.as_ref().map(|b| b.mesh_params(mesh_name));

        let mut mesh_groups: Vec<_> = self
            .data
            .mesh_group_names
            .iter()
            .filter(|(_, meshes)| meshes.iter().any(|m| m == mesh_name))
            .map(|(group, _)| group.clone())
            .collect();
        if let Some(base_params) = &base_params {
            mesh_groups.extend(base_params.mesh_groups.iter().cloned());
        }
        if mesh_groups.is_empty()
            && let Some(group) = &self.data.default_mesh_group
        {
            mesh_groups.push(group.clone());
        }

        // Lowest to highest priority.
        let mut render_parameters = base_params
            .as_ref()
            .map(|p| p.render_parameters.clone())
            .unwrap_or_default();
        render_parameters.extend(self.data.default_render_parameters.clone());
        if let Some(specific) = self.data.render_parameters.get(mesh_name) {
            render_parameters.extend(specific.clone());
        }

        let mut splitters = self
            .data
            .mesh_splitters
            .get(mesh_name)
            .cloned()
            .unwrap_or_default();
        if let Some(base_params) = base_params {
            splitters.extend(base_params.splitters);
        }

        if let Some((shader, alpha)) = self.first_shader_and_alpha(&mesh_groups) {
            params.shader = Some(shader.clone());
            params.uses_alpha_blending = alpha;
        }
        params.mesh_groups = mesh_groups;
        params.render_parameters = render_parameters;
        params.splitters = splitters;
        params
    }
}

impl ModelParameters for ModelParams {
    fn mesh_params(&self, mesh_name: &str) -> MeshParams {
        if self.generic_item {
            self.generic_item_mesh_params(mesh_name)
        } else {
            self.file_mesh_params(mesh_name)
        }
    }

    fn camera_targets(&self, mesh_names: &[String]) -> IndexMap<String, Vec<String>> {
        let mut targets: IndexMap<String, Vec<String>> = IndexMap::new();
        if self.generic_item {
            for mesh_name in mesh_names {
                if let Some((name, bones)) = self.mesh_params(mesh_name).camera_target {
                    targets.entry(name).or_default().extend(bones);
                }
            }
        }

        for (name, bones) in &self.data.camera_targets {
            targets
                .entry(name.clone())
                .or_default()
                .extend(bones.iter().cloned());
        }

        if let Some(base) = &self.base {
            for (name, bones) in base.camera_targets(mesh_names) {
                targets.entry(name).or_insert(bones);
            }
        }
        targets
    }
}

/// The settings encoded in a generic item mesh name.
#[derive(Debug, PartialEq, Clone)]
pub struct GenericMeshName {
    /// The number for the `MeshGroup` like "1" or "P1".
    pub mesh_group: String,
    pub display_name: String,
    pub visible: bool,
    pub optional_part_names: Vec<String>,
    /// Render parameter values in the order defined by the shader.
    pub values: Vec<f32>,
    pub camera_target: Option<(String, Vec<String>)>,
}

/// Parse a generic item mesh name of the form
/// `group_name[_value[_value[_value[_camera[_bone]*]]]]` with an optional trailing `_`.
///
/// The group has one or two characters from `0-9` and `P`.
/// Names starting with `+` or `-` are optional parts that are initially visible or hidden.
/// Optional part names are separated by `|` and end at the first `.`
/// followed by the display name.
/// Parts of the name after the first do not contain digits.
pub fn parse_generic_mesh_name(mesh_name: &str) -> Option<GenericMeshName> {
    let mesh_name = mesh_name.strip_suffix('_').unwrap_or(mesh_name);
    let (mesh_group, remainder) = mesh_name.split_once('_')?;
    if mesh_group.is_empty()
        || mesh_group.len() > 2
        || !mesh_group.chars().all(|c| c.is_ascii_digit() || c == 'P')
    {
        return None;
    }

    let mut tokens = remainder.split('_').peekable();
    let first = tokens.next().filter(|t| !t.is_empty())?;
    let mut name_parts = vec![first];
    while let Some(token) = tokens.next_if(|t| !t.is_empty() && !t.contains(|c: char| c.is_ascii_digit())) {
        name_parts.push(token);
    }
    let name = name_parts.join("_");

    let is_value = |t: &&str| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit() || c == '.');
    let mut values = Vec::new();
    while values.len() < 3 {
        match tokens.next_if(is_value) {
            Some(token) => values.push(token.parse().unwrap_or_default()),
            None => break,
        }
    }

    let camera_target = if values.len() == 3 {
        match tokens.next() {
            Some(camera) => {
                let bones: Vec<_> = tokens.by_ref().map(str::to_string).collect();
                if camera.is_empty() || bones.iter().any(|b| b.is_empty()) {
                    return None;
                }
                Some((camera.to_string(), bones))
            }
            None => None,
        }
    } else {
        None
    };

    // Anything left over does not match the convention.
    if tokens.next().is_some() {
        return None;
    }

    let (visible, optional_part_names, display_name) = match name.strip_prefix(['+', '-']) {
        Some(parts) => {
            let (parts, display_name) = match parts.split_once('.') {
                Some((parts, display_name)) => (parts, display_name.to_string()),
                None => (parts, String::new()),
            };
            let optional_part_names: Vec<_> = parts.split('|').map(str::to_string).collect();
            let display_name = if display_name.is_empty() {
                optional_part_names.last().cloned().unwrap_or_default()
            } else {
                display_name
            };
            (name.starts_with('+'), optional_part_names, display_name)
        }
        None => (true, Vec::new(), name.clone()),
    };

    Some(GenericMeshName {
        mesh_group: mesh_group.to_string(),
        display_name,
        visible,
        optional_part_names,
        values,
        camera_target,
    })
}

/// Named parameters for every supported model.
#[derive(Debug, Default)]
pub struct ParamsLibrary {
    params: IndexMap<String, Arc<ModelParams>>,
}

impl ParamsLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.modelparams.json` file in `folder`.
    /// Each file's name without the extension is the name of its parameters.
    pub fn from_folder<P: AsRef<Path>>(folder: P) -> Result<Self, LoadParamsError> {
        let mut data = IndexMap::new();
        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.to_lowercase().strip_suffix(PARAMS_EXTENSION).map(str::to_string))
            else {
                continue;
            };

            let json = std::fs::read_to_string(&path)?;
            let params: ParamsData = serde_json::from_str(&json)?;
            data.insert(name, params);
        }
        // Make the order independent of the file system.
        data.sort_keys();

        let mut library = Self::new();
        for name in data.keys() {
            library.resolve(name, &data, &mut Vec::new())?;
        }
        Ok(library)
    }

    fn resolve(
        &mut self,
        name: &str,
        data: &IndexMap<String, ParamsData>,
        visiting: &mut Vec<String>,
    ) -> Result<Arc<ModelParams>, LoadParamsError> {
        if let Some(params) = self.params.get(name) {
            return Ok(params.clone());
        }
        if visiting.iter().any(|v| v == name) {
            return Err(LoadParamsError::CircularBase {
                name: name.to_string(),
            });
        }

        let params_data = data
            .get(name)
            .ok_or_else(|| LoadParamsError::BaseNotFound {
                name: name.to_string(),
            })?;

        visiting.push(name.to_string());
        let base = match &params_data.base {
            Some(base) => Some(self.resolve(base, data, visiting)?),
            None => None,
        };
        visiting.pop();

        Ok(self.insert(name, ModelParams::new(params_data.clone(), base)))
    }

    pub fn insert(&mut self, name: &str, params: ModelParams) -> Arc<ModelParams> {
        let params = Arc::new(params);
        self.params.insert(name.to_lowercase(), params.clone());
        params
    }

    /// Deserialize and insert parameters with a base that is already in the library.
    pub fn insert_json(
        &mut self,
        name: &str,
        json: &str,
    ) -> Result<Arc<ModelParams>, LoadParamsError> {
        let params = ModelParams::from_json(json, self)?;
        Ok(self.insert(name, params))
    }

    pub fn parameters(&self, name: &str) -> Result<Arc<ModelParams>, LoadModelError> {
        self.params
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| LoadModelError::ParametersNotFound {
                name: name.to_string(),
            })
    }

    /// Find the parameters for a model file based on its name.
    pub fn parameters_for_path(&self, path: &Path) -> Result<Arc<ModelParams>, LoadModelError> {
        let is_xps = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("xps"));

        // Remove both extensions from names like "generic_item.mesh.ascii".
        let name = path
            .file_stem()
            .map(Path::new)
            .and_then(|p| p.file_stem())
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();

        if is_xps || matches!(name.as_str(), "generic_item" | "character" | "outfit") {
            let base = self.parameters(GENERIC_ITEM_BASE)?;
            Ok(Arc::new(ModelParams::generic_item(base)))
        } else {
            self.parameters(&name).inspect_err(|_| {
                warn!("No parameters found for {path:?}.");
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const LARA: &str = indoc! {r#"
        {
            "meshGroupNames": {
                "MeshGroup1": ["body", "face"],
                "MeshGroup5": ["hair"]
            },
            "defaultMeshGroup": "MeshGroup2",
            "renderParameters": {
                "body": { "bumpSpecularAmount": 0.5 }
            },
            "defaultRenderParameters": {
                "bumpSpecularAmount": 0.1,
                "bump1UVScale": 1.0
            },
            "cameraTargets": {
                "head": ["head bone", "neck"]
            },
            "meshSplitters": {
                "body": [
                    { "maxX": 0.0, "splitPartName": "body left" },
                    { "minX": 0.0, "splitPartName": "body right" }
                ]
            },
            "xnaLaraShaderDescriptions": {
                "diffuse": {
                    "baseName": "DiffuseLighting",
                    "textureRoles": ["diffuseTexture", "lightmapTexture"],
                    "solidMeshGroups": ["MeshGroup2", "MeshGroup1"],
                    "alphaMeshGroups": ["MeshGroup5"]
                },
                "bumpDetail": {
                    "baseName": "BumpDetail",
                    "textureRoles": ["diffuseTexture", "lightmapTexture", "bumpTexture"],
                    "parametersInOrder": [
                        ["bumpSpecularAmount"],
                        ["bump1UVScale"],
                        ["bump2UVScale"]
                    ],
                    "solidMeshGroups": ["MeshGroup4"],
                    "alphaMeshGroups": ["MeshGroup7"]
                }
            }
        }
    "#};

    fn library() -> ParamsLibrary {
        let mut library = ParamsLibrary::new();
        library.insert_json("lara", LARA).unwrap();
        library
            .insert_json("lara_jungle", r#"{ "base": "lara", "meshGroupNames": { "MeshGroup4": ["vines"] } }"#)
            .unwrap();
        library
    }

    #[test]
    fn file_mesh_params() {
        let lara = library().parameters("lara").unwrap();

        let body = lara.mesh_params("body");
        assert_eq!(vec!["MeshGroup1".to_string()], body.mesh_groups);
        assert_eq!("body", body.display_name);
        assert_eq!(
            (Some("DiffuseLighting".to_string()), false),
            lara.shader_for("body")
        );
        assert_eq!(
            IndexMap::from([
                ("bumpSpecularAmount".to_string(), RenderParameterValue::Float(0.5)),
                ("bump1UVScale".to_string(), RenderParameterValue::Float(1.0)),
            ]),
            body.render_parameters
        );
        assert_eq!(2, body.splitters.len());
        assert_eq!(Vec3::new(0.0, f32::NEG_INFINITY, f32::NEG_INFINITY), body.splitters[1].min());

        assert_eq!((Some("DiffuseLighting".to_string()), true), lara.shader_for("hair"));

        // Meshes without a group use the default group.
        let other = lara.mesh_params("other");
        assert_eq!(vec!["MeshGroup2".to_string()], other.mesh_groups);
        assert!(lara.initially_visible("other"));
    }

    #[test]
    fn base_mesh_params() {
        let jungle = library().parameters("lara_jungle").unwrap();
        // The base puts meshes without a group in its default group.
        assert_eq!(
            vec!["MeshGroup4".to_string(), "MeshGroup2".to_string()],
            jungle.mesh_params("vines").mesh_groups
        );
        assert_eq!((Some("BumpDetail".to_string()), false), jungle.shader_for("vines"));

        // Groups from the base are added after the model's own groups.
        assert_eq!(vec!["MeshGroup1".to_string()], jungle.mesh_params("body").mesh_groups);
        assert_eq!(2, jungle.mesh_splitters("body").len());
        assert_eq!(
            vec!["head bone".to_string(), "neck".to_string()],
            jungle.camera_target_bone_names(&[], "head")
        );
    }

    #[test]
    fn parse_generic_name_full() {
        assert_eq!(
            Some(GenericMeshName {
                mesh_group: "4".to_string(),
                display_name: "Long Hair".to_string(),
                visible: true,
                optional_part_names: vec!["hair".to_string(), "long".to_string()],
                values: vec![0.2, 2.0, 3.0],
                camera_target: Some((
                    "head".to_string(),
                    vec!["head bone".to_string(), "neck".to_string()]
                )),
            }),
            parse_generic_mesh_name("4_+hair|long.Long Hair_0.2_2_3_head_head bone_neck")
        );
    }

    #[test]
    fn parse_generic_name_simple() {
        assert_eq!(
            Some(GenericMeshName {
                mesh_group: "P1".to_string(),
                display_name: "left_arm".to_string(),
                visible: true,
                optional_part_names: Vec::new(),
                values: vec![0.5],
                camera_target: None,
            }),
            parse_generic_mesh_name("P1_left_arm_0.5_")
        );
    }

    #[test]
    fn parse_generic_name_hidden_part() {
        let name = parse_generic_mesh_name("20_-armor|helmet").unwrap();
        assert!(!name.visible);
        assert_eq!("helmet", name.display_name);
        assert_eq!(vec!["armor", "helmet"], name.optional_part_names);
        assert!(name.values.is_empty());
    }

    #[test]
    fn parse_generic_name_invalid() {
        assert_eq!(None, parse_generic_mesh_name("body"));
        assert_eq!(None, parse_generic_mesh_name("123_body"));
        assert_eq!(None, parse_generic_mesh_name("1__body"));
        assert_eq!(None, parse_generic_mesh_name("1_body_arm2"));
        assert_eq!(None, parse_generic_mesh_name("1_body_0.5_1_camera"));
    }

    #[test]
    fn generic_item_mesh_params() {
        let library = library();
        let params = library
            .parameters_for_path(Path::new("models/generic_item.mesh.ascii"))
            .unwrap();
        assert!(params.is_generic_item());

        let hair = params.mesh_params("4_+hair|long.Long Hair_0.2_2_3_head_head bone_neck");
        assert_eq!(vec!["MeshGroup4".to_string()], hair.mesh_groups);
        assert_eq!("Long Hair", hair.display_name);
        assert_eq!(Some("BumpDetail"), hair.shader.as_ref().map(|s| s.base_name.as_str()));
        assert!(!hair.uses_alpha_blending);
        assert_eq!(
            IndexMap::from([
                ("bumpSpecularAmount".to_string(), RenderParameterValue::Float(0.2)),
                ("bump1UVScale".to_string(), RenderParameterValue::Float(2.0)),
                ("bump2UVScale".to_string(), RenderParameterValue::Float(3.0)),
            ]),
            hair.render_parameters
        );

        // Unknown groups have no shader and use alpha blending.
        let unknown = params.mesh_params("9_thing");
        assert_eq!(None, unknown.shader);
        assert!(unknown.uses_alpha_blending);

        // Names that don't match use the base settings.
        let body = params.mesh_params("body");
        assert_eq!(vec!["MeshGroup1".to_string()], body.mesh_groups);
        assert_eq!(Some("DiffuseLighting"), body.shader.as_ref().map(|s| s.base_name.as_str()));
    }

    #[test]
    fn generic_item_camera_targets() {
        let library = library();
        let params = library.parameters_for_path(Path::new("item.xps")).unwrap();
        let targets = params.camera_targets(&[
            "1_a_1_1_1_head_jaw".to_string(),
            "1_b_1_1_1_head_nose".to_string(),
            "1_c".to_string(),
        ]);
        assert_eq!(
            IndexMap::from([(
                "head".to_string(),
                vec!["jaw".to_string(), "nose".to_string()]
            )]),
            targets
        );
    }

    #[test]
    fn parameters_for_path_by_name() {
        let library = library();
        let params = library
            .parameters_for_path(Path::new("data/Lara_Jungle.mesh"))
            .unwrap();
        assert!(!params.is_generic_item());
        assert!(params.base().is_some());

        assert!(matches!(
            library.parameters_for_path(Path::new("data/unknown.mesh")),
            Err(LoadModelError::ParametersNotFound { name }) if name == "unknown"
        ));
    }

    #[test]
    fn generic_item_without_base() {
        assert!(matches!(
            ParamsLibrary::new().parameters_for_path(Path::new("generic_item.mesh")),
            Err(LoadModelError::ParametersNotFound { name }) if name == "lara"
        ));
    }

    #[test]
    fn missing_base() {
        let mut library = ParamsLibrary::new();
        assert!(matches!(
            library.insert_json("a", r#"{ "base": "b" }"#),
            Err(LoadParamsError::BaseNotFound { name }) if name == "b"
        ));
    }

    #[test]
    fn invalid_json() {
        let mut library = ParamsLibrary::new();
        assert!(matches!(
            library.insert_json("a", r#"{ "meshGroupNames": 5 }"#),
            Err(LoadParamsError::Json(_))
        ));
    }
}

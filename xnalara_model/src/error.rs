use std::path::PathBuf;

use thiserror::Error;
use xnalara_lib::error::{AttributeNotFound, ParseMtlError, ParseObjError, ReadXpsError};

use crate::scene::ItemId;

#[derive(Debug, Error)]
pub enum LoadModelError {
    #[error("error reading model file")]
    Read(#[from] ReadXpsError),

    #[error("error parsing OBJ file")]
    Obj(#[from] ParseObjError),

    #[error("error parsing MTL file")]
    Mtl(#[from] ParseMtlError),

    #[error("invalid vertex data for mesh {mesh:?}")]
    VertexData {
        mesh: String,
        #[source]
        source: VertexDataError,
    },

    #[error("bone {bone} has parent index {parent_index} but the model has {bone_count} bones")]
    ParentIndexOutOfRange {
        bone: usize,
        parent_index: usize,
        bone_count: usize,
    },

    #[error("bone {bone:?} is its own ancestor")]
    CircularReference { bone: String },

    #[error("file type {extension:?} is not supported")]
    FileTypeNotSupported { extension: String },

    #[error("no model parameters found for {name:?}")]
    ParametersNotFound { name: String },

    #[error("error accessing vertex attribute")]
    AttributeNotFound(#[from] AttributeNotFound),

    #[error("error reading file")]
    Io(#[from] std::io::Error),

    #[error("error loading {path:?}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<LoadModelError>,
    },
}

/// Errors for vertex and element data that is inconsistent with the rest of the model.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum VertexDataError {
    #[error("vertex index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("vertex {vertex} references bone {bone_index} but only {bone_count} bones are available")]
    BoneIndexOutOfRange {
        vertex: usize,
        bone_index: usize,
        bone_count: usize,
    },

    #[error("expected {expected} bytes of vertex data but found {actual}")]
    PrematureEndOfFile { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum SaveModelError {
    #[error("error writing model data")]
    Binrw(#[from] binrw::Error),

    #[error("error writing file")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LoadParamsError {
    #[error("error reading parameters file")]
    Io(#[from] std::io::Error),

    #[error("error deserializing JSON parameters")]
    Json(#[from] serde_json::Error),

    #[error("base parameters {name:?} not found")]
    BaseNotFound { name: String },

    #[error("parameters {name:?} inherit from themselves")]
    CircularBase { name: String },
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum PoseError {
    #[error("item {0:?} does not exist")]
    InvalidItem(ItemId),

    #[error("attaching {child:?} to {parent:?} would create a cycle")]
    AttachmentCycle { child: ItemId, parent: ItemId },

    #[error("bone index {bone_index} is out of range for {bone_count} bones")]
    InvalidBoneIndex { bone_index: usize, bone_count: usize },

    #[error("pose has {line_count} lines but the model has {bone_count} bones")]
    BoneCountMismatch { line_count: usize, bone_count: usize },

    #[error("invalid pose on line {line}: {reason}")]
    InvalidPoseLine { line: usize, reason: String },
}

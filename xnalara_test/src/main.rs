use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use rayon::prelude::*;
use xnalara_lib::{obj::Obj, xps::Xps};
use xnalara_model::{
    ModelDescriptor,
    model::read_material_libraries,
    params::{ModelParams, ParamsLibrary},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// The root folder to search for .mesh, .xps, .mesh.ascii, and .obj files.
    root_folder: String,
    /// The folder with .modelparams.json files.
    /// Models without parameters are loaded with default settings.
    #[arg(long)]
    params: Option<String>,
    /// Check that writing and reading each model produces the same data.
    #[arg(long)]
    round_trip: bool,
    /// Print the time spent in each loading step.
    #[arg(long)]
    trace: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
            .init();
    } else {
        simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Warn)
            .init()?;
    }

    let library = match &cli.params {
        Some(folder) => ParamsLibrary::from_folder(folder)
            .with_context(|| format!("failed to load parameters from {folder:?}"))?,
        None => ParamsLibrary::new(),
    };

    let start = std::time::Instant::now();

    let paths: Vec<PathBuf> = globwalk::GlobWalkerBuilder::from_patterns(
        &cli.root_folder,
        &["*.mesh", "*.xps", "*.mesh.ascii", "*.obj"],
    )
    .case_insensitive(true)
    .build()?
    .filter_map(|e| e.map(|e| e.path().to_owned()).ok())
    .collect();

    let failed = paths
        .par_iter()
        .filter(|path| match check_model(path, &library, cli.round_trip) {
            Ok(()) => false,
            Err(e) => {
                println!("Error checking {path:?}: {e:?}");
                true
            }
        })
        .count();

    println!(
        "Checked {} files with {} errors in {:?}",
        paths.len(),
        failed,
        start.elapsed()
    );
    Ok(())
}

fn check_model(path: &Path, library: &ParamsLibrary, round_trip: bool) -> anyhow::Result<()> {
    let base_path = path.parent().map(Path::to_owned).unwrap_or_default();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    // Check file parsing even without the matching parameters.
    let parameters = library
        .parameters_for_path(path)
        .unwrap_or_else(|_| Arc::new(ModelParams::default()));

    match extension.as_str() {
        "mesh" | "xps" => {
            let bytes = std::fs::read(path)?;
            let model =
                ModelDescriptor::load_binary(&bytes, parameters.as_ref(), base_path.clone())?;
            if round_trip {
                check_binary_round_trip(&bytes, &model, parameters.as_ref(), base_path)?;
            }
        }
        "ascii" => {
            let text = std::fs::read_to_string(path)?;
            let model =
                ModelDescriptor::load_ascii(&text, parameters.as_ref(), base_path.clone(), None)?;
            if round_trip {
                let new_text = model.write_ascii()?;
                let new_model =
                    ModelDescriptor::load_ascii(&new_text, parameters.as_ref(), base_path, None)?;
                check_equal(&model, &new_model, "ASCII")?;
            }
        }
        "obj" => {
            let obj = Obj::parse(&std::fs::read_to_string(path)?)?;
            let mtl = read_material_libraries(&obj, &base_path)?;
            ModelDescriptor::from_obj(&obj, &mtl, base_path)?;
        }
        _ => (),
    }
    Ok(())
}

fn check_binary_round_trip(
    bytes: &[u8],
    model: &ModelDescriptor,
    parameters: &ModelParams,
    base_path: PathBuf,
) -> anyhow::Result<()> {
    // Write using the same version to preserve the vertex layout.
    let version = Xps::from_bytes(bytes)?.version();
    let new_bytes = model.write_binary(version)?;

    let xps = model.to_xps(version);
    let new_xps = Xps::from_bytes(&new_bytes)?;
    if xps != new_xps {
        anyhow::bail!("binary data not 1:1 for version {version:?}");
    }

    let new_model = ModelDescriptor::load_binary(&new_bytes, parameters, base_path)?;
    check_equal(model, &new_model, "binary")
}

fn check_equal(
    model: &ModelDescriptor,
    new_model: &ModelDescriptor,
    format: &str,
) -> anyhow::Result<()> {
    if model.bones != new_model.bones {
        anyhow::bail!("bones not 1:1 after {format} round trip");
    }
    for (mesh, new_mesh) in model.meshes.iter().zip(&new_model.meshes) {
        if mesh.vertex_data() != new_mesh.vertex_data()
            || mesh.element_indices() != new_mesh.element_indices()
        {
            anyhow::bail!("mesh {:?} not 1:1 after {format} round trip", mesh.name);
        }
    }
    Ok(())
}

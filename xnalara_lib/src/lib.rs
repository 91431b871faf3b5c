//! A library for reading and writing XNALara model file formats.
//!
//! The binary `.mesh` and `.xps` formats and the `.mesh.ascii` text format are supported
//! along with Wavefront `.obj` and `.mtl` files.
//!
//! # Getting Started
//! Each format has its own module based on the name of the type representing the root of the file.
//!
//! ```rust no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Read from disk.
//! let xps = xnalara_lib::xps::Xps::from_file("generic_item.mesh")?;
//! println!("{xps:#?}");
//!
//! // Save to disk after making any changes.
//! std::fs::write("out.mesh", xps.to_bytes()?)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! xnalara_lib only describes the structure of each file.
//! Vertex data is kept as interleaved bytes described by a [vertex::VertexFormat].
//! Higher level constraints like indices being in range are checked by xnalara_model.
pub mod error;
pub mod mtl;
pub mod obj;
pub mod reader;
pub mod vertex;
pub mod writer;
pub mod xps;

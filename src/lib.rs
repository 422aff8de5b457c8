//! # logomotion
//!
//! Turns a layered SVG logo into an animation and exports it frame by frame.
//!
//! This crate re-exports the workspace members:
//! - [`schema`]: wire and session data model.
//! - [`engine`]: scene mount, Rhai sandbox, compositor, exporter and the `Studio` controller.
//! - [`llm`]: remote analysis and code-generation collaborators.

pub use logomotion_core as engine;
pub use logomotion_llm as llm;
pub use logomotion_schema as schema;

pub use logomotion_core::{
    ExportArtifact, ExportError, ExportVariant, Studio, StudioConfig, StudioError, TimelineHandle,
};

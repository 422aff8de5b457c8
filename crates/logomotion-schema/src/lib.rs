//! # logomotion-schema
//!
//! Wire and session data model shared by the engine, the remote collaborators and the CLI.
//!
//! All structs serialize with `camelCase` keys, which is the shape the analysis and
//! code-generation services speak.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One addressable sub-element of an uploaded vector document.
///
/// `id` is stable across re-mounts and always appears as an `id` attribute in the
/// annotated document that produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SceneElement {
    pub id: String,
    pub name: String,
    /// Standalone SVG markup containing only this element.
    #[serde(alias = "svgContent")]
    pub content: String,
}

/// Result of the extraction step: the element list plus the id-annotated document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub elements: Vec<SceneElement>,
    pub annotated_document: String,
}

/// Semantic role of an element in the composition.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Primary,
    Secondary,
    Text,
    Background,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementAnalysis {
    pub id: String,
    #[serde(alias = "type")]
    pub category: Category,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub animation_suggestion: String,
}

/// Elements that should move together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Grouping {
    pub name: String,
    pub element_ids: BTreeSet<String>,
    #[serde(default)]
    pub reason: String,
}

/// Semantic breakdown of an uploaded document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub elements: Vec<ElementAnalysis>,
    #[serde(default)]
    pub groupings: Vec<Grouping>,
    #[serde(default)]
    pub concept_description: String,
}

impl Analysis {
    /// Ids referenced by element entries or groupings that are absent from `known`.
    pub fn unknown_ids<'a>(&'a self, known: &[SceneElement]) -> Vec<&'a str> {
        let known: BTreeSet<&str> = known.iter().map(|e| e.id.as_str()).collect();
        let mut missing: Vec<&str> = self
            .elements
            .iter()
            .map(|e| e.id.as_str())
            .chain(
                self.groupings
                    .iter()
                    .flat_map(|g| g.element_ids.iter().map(String::as_str)),
            )
            .filter(|id| !known.contains(id))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}

/// Body of an analysis request.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(alias = "svgLayers")]
    pub elements: Vec<SceneElement>,
}

/// Body of an analysis response. Failure bodies carry `error` instead of `analysis`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of a code-generation request.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CodegenRequest {
    pub analysis: Analysis,
    #[serde(alias = "svgLayers")]
    pub elements: Vec<SceneElement>,
}

/// Body of a code-generation response.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CodegenResponse {
    #[serde(default)]
    pub animation_code: Option<String>,
    #[serde(default)]
    pub concept_description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

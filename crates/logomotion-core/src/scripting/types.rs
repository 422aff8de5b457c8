//! # Scripting Types
//!
//! Handle types for Rhai scripting integration.
//!
//! ## Responsibilities
//! - **Container**: The mounted scene as passed to a script run
//! - **Selection**: Result of a selector query, usable as `targets`
//! - **Stagger**: Per-target delay produced by `anime::stagger`

use crate::animation::Delay;
use crate::scene::{lock_scene, SceneHandle, SelectorError};
use crate::types::NodeId;

/// The Scene Mount container, exposed to scripts as `container`.
#[derive(Clone, Debug)]
pub struct Container {
    pub scene: SceneHandle,
}

impl Container {
    pub fn query(&self, selector: &str) -> Result<Selection, SelectorError> {
        let nodes = lock_scene(&self.scene).query(selector)?;
        Ok(Selection {
            scene: self.scene.clone(),
            nodes,
        })
    }
}

/// Nodes matched by a selector, in document order.
#[derive(Clone, Debug)]
pub struct Selection {
    pub scene: SceneHandle,
    pub nodes: Vec<NodeId>,
}

impl Selection {
    pub fn ids(&self) -> Vec<String> {
        let graph = lock_scene(&self.scene);
        self.nodes
            .iter()
            .filter_map(|&n| graph.get_node(n).and_then(|node| node.id()).map(str::to_string))
            .collect()
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        let mut graph = lock_scene(&self.scene);
        for &n in &self.nodes {
            if let Some(node) = graph.get_node_mut(n) {
                node.set_attribute(name, value);
            }
        }
    }
}

/// Per-target delay value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stagger(pub Delay);

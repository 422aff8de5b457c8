use super::{lock_scene, SceneGraph, SceneHandle};
use crate::timeline::TimelineHandle;
use crate::types::OverlayTransform;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Holds the single live copy of the annotated document.
///
/// The container handle never changes identity; `reset` swaps its contents in place so
/// anything holding the handle (adapter root, compositor) sees the new scene.
#[derive(Debug)]
pub struct SceneMount {
    container: Option<SceneHandle>,
    overlay: OverlayTransform,
    viewport: Option<(u32, u32)>,
    document: Option<String>,
    generation: u64,
}

impl Default for SceneMount {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneMount {
    pub fn new() -> Self {
        Self {
            container: Some(Arc::new(Mutex::new(SceneGraph::new()))),
            overlay: OverlayTransform::default(),
            viewport: None,
            document: None,
            generation: 0,
        }
    }

    /// A mount with no container to draw into. Every reset is a logged no-op.
    pub fn detached() -> Self {
        Self {
            container: None,
            ..Self::new()
        }
    }

    /// Forces the measured size instead of deriving it from the document.
    pub fn with_viewport(mut self, viewport: Option<(u32, u32)>) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn container(&self) -> Option<&SceneHandle> {
        self.container.as_ref()
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn overlay(&self) -> OverlayTransform {
        self.overlay
    }

    pub fn set_overlay(&mut self, overlay: OverlayTransform) {
        self.overlay = overlay;
    }

    /// Incremented on every successful reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Tears down mounted content, retires `current`, and mounts `document`.
    ///
    /// Returns whether a new scene was mounted. Empty input, an unavailable container or an
    /// unparsable document leave everything untouched and only log.
    pub fn reset(&mut self, document: &str, current: &mut Option<TimelineHandle>) -> bool {
        let Some(container) = self.container.clone() else {
            warn!("Scene container is unavailable, cannot reset scene");
            return false;
        };
        if document.trim().is_empty() {
            warn!("No document to mount, skipping scene reset");
            return false;
        }
        let graph = match SceneGraph::parse(document) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(error = %e, "Annotated document could not be mounted");
                return false;
            }
        };

        if let Some(previous) = current.take() {
            previous.pause();
            debug!("Retired previous timeline");
        }

        *lock_scene(&container) = graph;
        self.document = Some(document.to_string());
        self.generation += 1;
        debug!(
            generation = self.generation,
            scale = self.overlay.scale(),
            "Scene mounted"
        );
        true
    }

    /// Remounts the last document, dropping every animated override.
    pub fn remount(&mut self, current: &mut Option<TimelineHandle>) -> bool {
        match self.document.clone() {
            Some(document) => self.reset(&document, current),
            None => false,
        }
    }

    /// Ids currently addressable in the mounted scene.
    pub fn addressable_ids(&self) -> Vec<String> {
        self.container
            .as_ref()
            .map(|c| lock_scene(c).addressable_ids())
            .unwrap_or_default()
    }

    /// Waits for the mounted element set to become queryable.
    ///
    /// Yields at least one scheduler tick, then re-checks up to `attempts` times.
    pub async fn settle(&self, attempts: u32) -> Vec<String> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            tokio::task::yield_now().await;
            let ids = self.addressable_ids();
            if !ids.is_empty() {
                debug!(attempt, count = ids.len(), "Scene settled");
                return ids;
            }
        }
        info!(attempts, "Scene has no addressable elements after settling");
        Vec::new()
    }

    /// Pixel size of the container: the configured viewport, else the document's own size.
    pub fn measure(&self) -> (u32, u32) {
        if let Some(viewport) = self.viewport {
            return viewport;
        }
        self.container
            .as_ref()
            .map(|c| lock_scene(c).measure())
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineParams;

    const DOC: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20">
        <rect id="layer-1" width="5" height="5"/><circle id="layer-2" r="3"/>
    </svg>"#;

    #[test]
    fn reset_is_idempotent() {
        let mut mount = SceneMount::new();
        let mut current = None;
        assert!(mount.reset(DOC, &mut current));
        let first = mount.addressable_ids();
        let snapshot = lock_scene(mount.container().unwrap()).clone();
        assert!(mount.reset(DOC, &mut current));
        assert_eq!(mount.addressable_ids(), first);
        assert_eq!(*lock_scene(mount.container().unwrap()), snapshot);
        assert_eq!(mount.generation(), 2);
    }

    #[test]
    fn reset_retires_current_timeline() {
        let mut mount = SceneMount::new();
        let mut current = None;
        mount.reset(DOC, &mut current);
        let tl = TimelineHandle::new(mount.container().unwrap().clone(), TimelineParams::default());
        tl.play();
        current = Some(tl.clone());
        mount.reset(DOC, &mut current);
        assert!(current.is_none());
        assert!(!tl.is_playing());
    }

    #[test]
    fn failures_are_no_ops() {
        let mut mount = SceneMount::new();
        let mut current = None;
        mount.reset(DOC, &mut current);
        assert!(!mount.reset("", &mut current));
        assert!(!mount.reset("<svg", &mut current));
        assert_eq!(mount.addressable_ids(), vec!["layer-1", "layer-2"]);

        let mut detached = SceneMount::detached();
        assert!(!detached.reset(DOC, &mut current));
        assert_eq!(detached.measure(), (0, 0));
    }

    #[test]
    fn viewport_overrides_measurement() {
        let mut mount = SceneMount::new();
        mount.reset(DOC, &mut None);
        assert_eq!(mount.measure(), (40, 20));
        let mount = SceneMount::new().with_viewport(Some((300, 200)));
        assert_eq!(mount.measure(), (300, 200));
    }

    #[tokio::test]
    async fn settle_returns_ids() {
        let mut mount = SceneMount::new();
        assert!(mount.settle(2).await.is_empty());
        mount.reset(DOC, &mut None);
        assert_eq!(mount.settle(2).await.len(), 2);
    }
}

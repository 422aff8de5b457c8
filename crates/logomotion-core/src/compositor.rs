//! # Compositor Module
//!
//! Rasterizes the mounted scene and layers it over the background for each export frame.
//!
//! ## Responsibilities
//! - **Snapshotter**: Renders a scene to a transparent pixmap (`ResvgSnapshotter` by default).
//! - **FrameCompositor**: Owns the raster surface; media frame or flat fill first, scene on top.

use crate::errors::CompositeError;
use crate::media::VideoFrame;
use crate::scene::SceneGraph;
use crate::types::{Color, OverlayTransform};
use std::sync::Arc;
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};
use tracing::trace;

/// Renders a scene subtree into a raster of the requested size.
pub trait Snapshotter: Send + Sync {
    /// The returned pixmap has a transparent background.
    fn snapshot(&self, scene: &SceneGraph, width: u32, height: u32) -> Result<Pixmap, CompositeError>;
}

/// usvg + resvg rasterizer.
#[derive(Clone)]
pub struct ResvgSnapshotter {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl ResvgSnapshotter {
    /// Uses the fonts installed on the system for `<text>`.
    pub fn new() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        Self::with_fonts(db)
    }

    pub fn with_fonts(db: usvg::fontdb::Database) -> Self {
        Self {
            fontdb: Arc::new(db),
        }
    }

    /// No fonts at all; text elements render nothing.
    pub fn without_fonts() -> Self {
        Self::with_fonts(usvg::fontdb::Database::new())
    }
}

impl Default for ResvgSnapshotter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResvgSnapshotter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResvgSnapshotter")
            .field("faces", &self.fontdb.len())
            .finish()
    }
}

impl Snapshotter for ResvgSnapshotter {
    fn snapshot(&self, scene: &SceneGraph, width: u32, height: u32) -> Result<Pixmap, CompositeError> {
        let svg = scene.to_svg_string(true);
        let opts = usvg::Options {
            fontdb: self.fontdb.clone(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(&svg, &opts)?;

        let mut pixmap = Pixmap::new(width, height).ok_or(CompositeError::SurfaceFailure(width, height))?;
        let size = tree.size();
        let transform = Transform::from_scale(
            width as f32 / size.width(),
            height as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());
        Ok(pixmap)
    }
}

/// The export raster surface and the rules for filling it each frame.
pub struct FrameCompositor {
    snapshotter: Arc<dyn Snapshotter>,
    surface: Pixmap,
    background: Color,
}

impl FrameCompositor {
    pub fn new(
        snapshotter: Arc<dyn Snapshotter>,
        width: u32,
        height: u32,
        background: Color,
    ) -> Result<Self, CompositeError> {
        let surface = Pixmap::new(width, height).ok_or(CompositeError::SurfaceFailure(width, height))?;
        Ok(Self {
            snapshotter,
            surface,
            background,
        })
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Draws one frame.
    ///
    /// With `media`, its frame is stretched over the whole surface; otherwise the surface is
    /// filled with the background colour. The scene snapshot goes on top through `overlay`.
    pub fn composite(
        &mut self,
        scene: &SceneGraph,
        media: Option<&VideoFrame>,
        overlay: OverlayTransform,
    ) -> Result<&Pixmap, CompositeError> {
        let (w, h) = (self.surface.width(), self.surface.height());

        match media {
            Some(media) => {
                let frame = media.to_pixmap().ok_or(CompositeError::InvalidMediaFrame {
                    width: media.width,
                    height: media.height,
                    bytes: media.rgba.len(),
                })?;
                self.surface.fill(tiny_skia::Color::BLACK);
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..Default::default()
                };
                let fit = Transform::from_scale(
                    w as f32 / frame.width() as f32,
                    h as f32 / frame.height() as f32,
                );
                self.surface.draw_pixmap(0, 0, frame.as_ref(), &paint, fit, None);
            }
            None => self.surface.fill(self.background.to_tiny_skia()),
        }

        let snapshot = self.snapshotter.snapshot(scene, w, h)?;
        let placement = overlay.to_tiny_skia(w as f32, h as f32);
        trace!(?placement, "Compositing scene snapshot");
        self.surface.draw_pixmap(
            0,
            0,
            snapshot.as_ref(),
            &PixmapPaint::default(),
            placement,
            None,
        );
        Ok(&self.surface)
    }

    pub fn surface(&self) -> &Pixmap {
        &self.surface
    }

    /// Straight-alpha RGBA copy of the surface.
    pub fn rgba(&self) -> Vec<u8> {
        pixmap_to_rgba(&self.surface)
    }
}

pub fn pixmap_to_rgba(pixmap: &Pixmap) -> Vec<u8> {
    pixmap
        .pixels()
        .iter()
        .flat_map(|px| {
            let c = px.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect()
}

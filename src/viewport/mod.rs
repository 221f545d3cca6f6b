//! Viewer layout and coordinate mapping
//!
//! Placement rectangles are in normalized viewer coordinates: origin at the
//! centre, both axes spanning [-1, 1], y pointing up. The viewer is split into
//! a main area on top and a thumbnail band at the bottom whose height is
//! `panel_ratio` of the viewer; the band holds a grid with one cell per
//! tracked window.

use serde::{Deserialize, Serialize};

/// Viewer size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1) }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Viewer pixel (origin top-left, y down) to normalized coordinates
    pub fn to_viewer(&self, px: f32, py: f32) -> ViewerPoint {
        ViewerPoint {
            x: 2.0 * px / self.width as f32 - 1.0,
            y: 1.0 - 2.0 * py / self.height as f32,
        }
    }

    /// Normalized coordinates back to viewer pixels
    pub fn to_pixels(&self, point: ViewerPoint) -> (f32, f32) {
        (
            (point.x + 1.0) * self.width as f32 / 2.0,
            (1.0 - point.y) * self.height as f32 / 2.0,
        )
    }
}

/// Point in normalized viewer coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerPoint {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned rectangle in normalized viewer coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementRect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl PlacementRect {
    /// The whole viewer
    pub const FULL: PlacementRect = PlacementRect { left: -1.0, bottom: -1.0, right: 1.0, top: 1.0 };

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    pub fn center(&self) -> ViewerPoint {
        ViewerPoint {
            x: (self.left + self.right) / 2.0,
            y: (self.bottom + self.top) / 2.0,
        }
    }

    pub fn contains(&self, p: ViewerPoint) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.bottom && p.y <= self.top
    }

    /// Shared area with `other`, zero when disjoint
    pub fn overlap_area(&self, other: &PlacementRect) -> f32 {
        let w = self.right.min(other.right) - self.left.max(other.left);
        let h = self.top.min(other.top) - self.bottom.max(other.bottom);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    fn inset(&self, amount: f32) -> PlacementRect {
        PlacementRect {
            left: self.left + amount,
            bottom: self.bottom + amount,
            right: self.right - amount,
            top: self.top - amount,
        }
    }
}

/// Fit content of `content` pixels inside `area`, preserving its aspect
/// ratio and centring it. One axis fills the area, the other is scaled down.
pub fn letterbox(area: PlacementRect, viewport: ViewportSize, content: (u32, u32)) -> PlacementRect {
    let (cw, ch) = content;
    if cw == 0 || ch == 0 {
        return area;
    }
    let area_aspect = area.width() / area.height() * viewport.aspect();
    let content_aspect = cw as f32 / ch as f32;

    let (sx, sy) = if content_aspect > area_aspect {
        (1.0, area_aspect / content_aspect)
    } else {
        (content_aspect / area_aspect, 1.0)
    };

    let c = area.center();
    let half_w = area.width() / 2.0 * sx;
    let half_h = area.height() / 2.0 * sy;
    PlacementRect {
        left: c.x - half_w,
        bottom: c.y - half_h,
        right: c.x + half_w,
        top: c.y + half_h,
    }
}

/// Rounding slack so f32 error at an exact pixel boundary lands on the
/// boundary pixel rather than the one before it
const PIXEL_SNAP: f32 = 1e-3;

/// Map a viewer point inside `rect` to pixel coordinates of a surface of
/// `size`, clamped to the surface. Row 0 is at the top of `rect`.
pub fn to_local(point: ViewerPoint, rect: PlacementRect, size: (u32, u32)) -> (u32, u32) {
    let (w, h) = size;
    if w == 0 || h == 0 {
        return (0, 0);
    }
    let lx = (point.x - rect.left) / rect.width();
    let ly = (point.y - rect.bottom) / rect.height();
    let x = (lx * w as f32 + PIXEL_SNAP).floor().clamp(0.0, (w - 1) as f32);
    let y = ((1.0 - ly) * h as f32 + PIXEL_SNAP).floor().clamp(0.0, (h - 1) as f32);
    (x as u32, y as u32)
}

/// Layout request for `ViewportMapper::placement_for`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One window letterboxed into the whole viewer
    Single { content: (u32, u32) },
    /// `count` equal cells tiling the thumbnail band
    Grid { count: usize },
}

/// Cell geometry for a grid of `count` windows: the two-way relation between
/// cell index and rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub count: usize,
    pub rows: u32,
    pub cols: u32,
    pub band: PlacementRect,
    pub cell_width: f32,
    pub cell_height: f32,
    /// Seam between neighbouring cells
    pub gap: f32,
}

impl GridGeometry {
    pub fn new(count: usize, rows: u32, band: PlacementRect, gap: f32) -> Self {
        let rows = rows.max(1);
        let cols = (count as u32).div_ceil(rows);
        let cell_width = if cols > 0 { band.width() / cols as f32 } else { 0.0 };
        let cell_height = band.height() / rows as f32;
        let gap = gap.max(0.0).min(cell_width.min(cell_height) * 0.5);
        Self { count, rows, cols, band, cell_width, cell_height, gap }
    }

    /// Rectangle of cell `index`, row 0 at the top of the band
    pub fn cell(&self, index: usize) -> Option<PlacementRect> {
        if index >= self.count {
            return None;
        }
        let row = (index / self.cols as usize) as f32;
        let col = (index % self.cols as usize) as f32;
        let left = self.band.left + col * self.cell_width;
        let top = self.band.top - row * self.cell_height;
        let cell = PlacementRect {
            left,
            bottom: top - self.cell_height,
            right: left + self.cell_width,
            top,
        };
        Some(cell.inset(self.gap / 2.0))
    }

    pub fn cells(&self) -> Vec<PlacementRect> {
        (0..self.count).filter_map(|i| self.cell(i)).collect()
    }

    /// Index of the cell under `p`, `None` outside every cell or on a seam
    pub fn hit_test(&self, p: ViewerPoint) -> Option<usize> {
        if self.count == 0 || p.x < self.band.left || p.y > self.band.top {
            return None;
        }
        let col = ((p.x - self.band.left) / self.cell_width).floor();
        let row = ((self.band.top - p.y) / self.cell_height).floor();
        if col < 0.0 || row < 0.0 || col >= self.cols as f32 || row >= self.rows as f32 {
            return None;
        }
        let index = row as usize * self.cols as usize + col as usize;
        let cell = self.cell(index)?;
        if self.gap > 0.0 && !cell.contains(p) {
            return None;
        }
        Some(index)
    }
}

/// Layout parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Rows in the thumbnail grid
    pub grid_rows: u32,
    /// Share of the viewer height given to the thumbnail band, in (0, 1]
    pub panel_ratio: f32,
    /// Normalized seam between cells
    pub cell_gap: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid_rows: 1,
            panel_ratio: 0.12,
            cell_gap: 0.0,
        }
    }
}

/// Computes placements for the current viewer size and maps points back
#[derive(Debug, Clone)]
pub struct ViewportMapper {
    viewport: ViewportSize,
    layout: LayoutConfig,
}

impl ViewportMapper {
    pub fn new(viewport: ViewportSize, layout: LayoutConfig) -> Self {
        Self { viewport, layout }
    }

    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: ViewportSize) {
        self.viewport = viewport;
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Normalized point for a viewer pixel
    pub fn point(&self, px: f32, py: f32) -> ViewerPoint {
        self.viewport.to_viewer(px, py)
    }

    /// The thumbnail band along the bottom of the viewer
    pub fn band(&self) -> PlacementRect {
        let ratio = self.layout.panel_ratio.clamp(f32::EPSILON, 1.0);
        PlacementRect { top: -1.0 + 2.0 * ratio, ..PlacementRect::FULL }
    }

    /// Everything above the band
    pub fn main_area(&self) -> PlacementRect {
        PlacementRect { bottom: self.band().top, ..PlacementRect::FULL }
    }

    /// Single layout: `content` letterboxed into the whole viewer
    pub fn single(&self, content: (u32, u32)) -> PlacementRect {
        letterbox(PlacementRect::FULL, self.viewport, content)
    }

    /// `content` letterboxed into the main area
    pub fn main(&self, content: (u32, u32)) -> PlacementRect {
        letterbox(self.main_area(), self.viewport, content)
    }

    /// Grid of `count` cells over the band
    pub fn grid(&self, count: usize) -> GridGeometry {
        GridGeometry::new(count, self.layout.grid_rows, self.band(), self.layout.cell_gap)
    }

    pub fn placement_for(&self, layout: Layout) -> Vec<PlacementRect> {
        match layout {
            Layout::Single { content } => vec![self.single(content)],
            Layout::Grid { count } => self.grid(count).cells(),
        }
    }

    /// Cell index under `point` for a grid of `count` windows
    pub fn hit_test(&self, count: usize, point: ViewerPoint) -> Option<usize> {
        self.grid(count).hit_test(point)
    }

    /// Surface pixel under `point` for content drawn in `rect`
    pub fn to_local(&self, point: ViewerPoint, rect: PlacementRect, size: (u32, u32)) -> (u32, u32) {
        to_local(point, rect, size)
    }
}

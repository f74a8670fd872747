use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("field must have positive extents, got {0}x{1}")]
    InvalidField(f32, f32),
    #[error("grid must have at least one column and row, got {0}x{1}")]
    EmptyGrid(u32, u32),
    #[error("grid cell size must be positive, got {0}")]
    NonPositiveCell(f32),
    #[error("slot layout needs a positive row pitch, got {0}")]
    NonPositivePitch(f32),
}

/// The playfield the choreography runs in. Anchors, grid cells and slot
/// columns are all expressed against this rectangle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FieldSpec {
    pub width: f32,
    pub height: f32,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self { width: 1920.0, height: 1080.0 }
    }
}

impl FieldSpec {
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(GeometryError::InvalidField(self.width, self.height));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.height * 0.5)
    }
}

/// `count` unit directions evenly spaced and symmetric about `base`,
/// spanning `total_spread` radians. `count == 1` fires straight along `base`.
pub fn cone_directions(base: Vec2, count: usize, total_spread: f32) -> SmallVec<[Vec2; 8]> {
    let mut out = SmallVec::new();
    if count == 0 {
        return out;
    }
    let base = base.normalize_or_zero();
    if count == 1 {
        out.push(base);
        return out;
    }
    let start = -total_spread * 0.5;
    let step = total_spread / (count - 1) as f32;
    for i in 0..count {
        let angle = start + step * i as f32;
        out.push(Vec2::from_angle(angle).rotate(base));
    }
    out
}

/// Horizontal displacement of a serpentine path at time `t`: the head
/// weaves about `anchor_x` while the vertical advance stays constant.
#[inline(always)]
pub fn serpentine_x(anchor_x: f32, amplitude: f32, frequency: f32, t: f32) -> f32 {
    anchor_x + amplitude * (frequency * t).sin()
}

/// Cell layout for grid-placed hazards. The grid spans the field width from
/// `margin_x` and is centered vertically.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GridSpec {
    pub cols: u32,
    pub rows: u32,
    pub cell_size: f32,
    pub gap_x: f32,
    pub gap_y: f32,
    pub margin_x: f32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { cols: 13, rows: 8, cell_size: 120.0, gap_x: 30.0, gap_y: 15.0, margin_x: 67.5 }
    }
}

impl GridSpec {
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(GeometryError::EmptyGrid(self.cols, self.rows));
        }
        if !(self.cell_size > 0.0) {
            return Err(GeometryError::NonPositiveCell(self.cell_size));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn cell_count(&self) -> u32 {
        self.cols * self.rows
    }
}

/// World position of the center of cell `(col, row)`.
pub fn grid_cell_center(col: u32, row: u32, grid: &GridSpec, field: &FieldSpec) -> Vec2 {
    let total_height =
        grid.rows as f32 * grid.cell_size + (grid.rows - 1) as f32 * grid.gap_y;
    let start_y = (field.height - total_height) * 0.5;
    let x = grid.margin_x + col as f32 * (grid.cell_size + grid.gap_x) + grid.cell_size * 0.5;
    let y = start_y + row as f32 * (grid.cell_size + grid.gap_y) + grid.cell_size * 0.5;
    Vec2::new(x, y)
}

/// Edge-hugging slot columns: slots `0..per_side` run down the left edge
/// facing right, `per_side..2*per_side` down the right edge facing left.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SlotSpec {
    pub per_side: u32,
    pub row_pitch: f32,
    pub edge_inset: f32,
}

impl Default for SlotSpec {
    fn default() -> Self {
        Self { per_side: 8, row_pitch: 135.0, edge_inset: 60.0 }
    }
}

impl SlotSpec {
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(self.row_pitch > 0.0) {
            return Err(GeometryError::NonPositivePitch(self.row_pitch));
        }
        Ok(())
    }
}

/// Anchor position and outward-facing volley direction for `slot`.
pub fn slot_anchor(slot: u32, spec: &SlotSpec, field: &FieldSpec) -> (Vec2, Vec2) {
    let left = slot < spec.per_side;
    let row = if left { slot } else { slot - spec.per_side };
    let y = row as f32 * spec.row_pitch + spec.row_pitch * 0.5;
    if left {
        (Vec2::new(spec.edge_inset, y), Vec2::X)
    } else {
        (Vec2::new(field.width - spec.edge_inset, y), -Vec2::X)
    }
}

/// Collidable shape primitive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    Rect { half_extents: Vec2 },
}

/// A shape placed relative to a hazard anchor. `offset` is expressed in the
/// hitbox's local frame and rotates with it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hitbox {
    pub shape: Shape,
    pub offset: Vec2,
    pub rotation: f32,
}

impl Hitbox {
    pub fn circle(radius: f32) -> Self {
        Self { shape: Shape::Circle { radius }, offset: Vec2::ZERO, rotation: 0.0 }
    }

    pub fn rect(half_extents: Vec2, offset: Vec2, rotation: f32) -> Self {
        Self { shape: Shape::Rect { half_extents }, offset, rotation }
    }

    /// Tests the hitbox, anchored at `anchor`, against a probe circle.
    pub fn overlaps_circle(&self, anchor: Vec2, probe_center: Vec2, probe_radius: f32) -> bool {
        let rot = Vec2::from_angle(self.rotation);
        let center = anchor + rot.rotate(self.offset);
        match self.shape {
            Shape::Circle { radius } => {
                probe_center.distance_squared(center)
                    <= (radius + probe_radius) * (radius + probe_radius)
            }
            Shape::Rect { half_extents } => {
                // Transform the probe into the rect's local frame, then
                // clamp to find the closest point on the rect.
                let local = Vec2::from_angle(-self.rotation).rotate(probe_center - center);
                let closest = local.clamp(-half_extents, half_extents);
                local.distance_squared(closest) <= probe_radius * probe_radius
            }
        }
    }
}

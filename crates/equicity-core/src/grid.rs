//! Regular lattice tessellation of a bounding box.

use geo::{point, polygon};

use crate::crs::Crs;
use crate::models::{BoundingBox, GridCell, Tessellation};
use crate::spatial::{cell_steps_deg, half_open_count};

/// Cell size used when callers do not pick one.
pub const DEFAULT_CELL_SIZE_M: f64 = 500.0;

/// Largest grid `tessellate` will build.
pub const MAX_GRID_CELLS: usize = 5_000_000;

/// Number of cells `tessellate` would produce, without building them.
pub fn estimate_cell_count(bounds: &BoundingBox, cell_size_m: f64) -> usize {
    match lattice(bounds, cell_size_m) {
        Some(lattice) => lattice.nx.saturating_mul(lattice.ny),
        None => 0,
    }
}

/// Cover `bounds` with axis-aligned cells of roughly `cell_size_m` meters.
///
/// Columns start at `min_x` and step east until `max_x` (exclusive); rows
/// likewise from `min_y` to `max_y`. Cells are ordered column by column,
/// south to north within each column. Degenerate input, and grids above
/// [`MAX_GRID_CELLS`], yield an empty tessellation.
pub fn tessellate(bounds: &BoundingBox, cell_size_m: f64) -> Tessellation {
    tessellate_with_limit(bounds, cell_size_m, MAX_GRID_CELLS)
}

/// [`tessellate`] with a caller-chosen cell limit.
pub fn tessellate_with_limit(
    bounds: &BoundingBox,
    cell_size_m: f64,
    max_cells: usize,
) -> Tessellation {
    let empty = Tessellation {
        crs: Crs::WGS84,
        cells: Vec::new(),
    };
    let Some(lattice) = lattice(bounds, cell_size_m) else {
        return empty;
    };

    let Lattice { dx, dy, nx, ny } = lattice;
    let count = nx.saturating_mul(ny);
    if count > max_cells {
        tracing::warn!(
            "Refusing to tessellate {} into {} cells (limit {})",
            bounds,
            count,
            max_cells
        );
        return empty;
    }
    let mut cells = Vec::with_capacity(count);
    for i in 0..nx {
        let x = bounds.min_x + i as f64 * dx;
        for j in 0..ny {
            let y = bounds.min_y + j as f64 * dy;
            cells.push(GridCell {
                geometry: polygon![
                    (x: x, y: y),
                    (x: x + dx, y: y),
                    (x: x + dx, y: y + dy),
                    (x: x, y: y + dy),
                ],
                centroid: point!(x: x + dx / 2.0, y: y + dy / 2.0),
            });
        }
    }

    Tessellation {
        crs: Crs::WGS84,
        cells,
    }
}

#[derive(Debug, Clone, Copy)]
struct Lattice {
    dx: f64,
    dy: f64,
    nx: usize,
    ny: usize,
}

fn lattice(bounds: &BoundingBox, cell_size_m: f64) -> Option<Lattice> {
    if !bounds.is_finite() || bounds.is_empty() {
        return None;
    }
    if !cell_size_m.is_finite() || cell_size_m <= 0.0 {
        return None;
    }
    let (dx, dy) = cell_steps_deg(bounds, cell_size_m);
    let nx = half_open_count(bounds.min_x, bounds.max_x, dx);
    let ny = half_open_count(bounds.min_y, bounds.max_y, dy);
    if nx == 0 || ny == 0 {
        return None;
    }
    Some(Lattice { dx, dy, nx, ny })
}

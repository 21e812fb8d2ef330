/*
 * Occupancy Grid Module
 *
 * This module defines the OccupancyGrid used for trail marking and
 * environment repulsion. It divides the field into square cells of `scale`
 * world units and records, per cell, whether any agent has visited it.
 *
 * Layout follows a flat row-major vector (`j * width + i`) so neighbourhood
 * scans walk contiguous memory row by row.
 */

use nannou::prelude::{pt2, Point2};

use crate::agent::AgentKey;
use crate::error::{ConfigError, ValidationError};
use crate::geometry::{ensure_finite, FieldBounds};

/// Integer cell coordinates `(i, j)` along x and y.
pub type CellIndex = (usize, usize);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    pub exists: bool,
    /// Last agent that marked the cell through [`OccupancyGrid::assign`].
    pub last_writer: Option<AgentKey>,
}

#[derive(Debug, Clone)]
struct GridLayout {
    bounds: FieldBounds,
    scale: f32,
    width: usize,
    height: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OccupancyGrid {
    layout: Option<GridLayout>,
    cells: Vec<Cell>,
}

impl OccupancyGrid {
    /// Uninitialized grid; every query fails until [`OccupancyGrid::init`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(bounds: FieldBounds, scale: f32) -> Result<Self, ConfigError> {
        let mut grid = Self::new();
        grid.init(bounds, scale)?;
        Ok(grid)
    }

    /// Fix bounds and cell size and allocate an empty grid.
    pub fn init(&mut self, bounds: FieldBounds, scale: f32) -> Result<(), ConfigError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                field: "grid_scale",
                value: scale as f64,
                reason: "must be positive and finite",
            });
        }
        let width = (bounds.width() / scale).ceil() as usize;
        let height = (bounds.height() / scale).ceil() as usize;

        self.cells = vec![Cell::default(); width * height];
        self.layout = Some(GridLayout {
            bounds,
            scale,
            width,
            height,
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.layout.is_some()
    }

    fn layout(&self) -> Result<&GridLayout, ValidationError> {
        self.layout
            .as_ref()
            .ok_or(ValidationError::Uninitialized { component: "occupancy grid" })
    }

    pub fn scale(&self) -> Result<f32, ValidationError> {
        Ok(self.layout()?.scale)
    }

    /// Cell counts `(width, height)`.
    pub fn size(&self) -> Result<(usize, usize), ValidationError> {
        let layout = self.layout()?;
        Ok((layout.width, layout.height))
    }

    // Unchecked cell coordinates; may be negative or past the last cell
    fn raw_index(layout: &GridLayout, position: Point2) -> (i64, i64) {
        let mut i = ((position.x - layout.bounds.x_min) / layout.scale).floor() as i64;
        let mut j = ((position.y - layout.bounds.y_min) / layout.scale).floor() as i64;
        // The max edge itself belongs to the last cell
        if i == layout.width as i64 && position.x <= layout.bounds.x_max {
            i -= 1;
        }
        if j == layout.height as i64 && position.y <= layout.bounds.y_max {
            j -= 1;
        }
        (i, j)
    }

    fn checked(layout: &GridLayout, (i, j): (i64, i64)) -> Result<CellIndex, ValidationError> {
        if i < 0 || j < 0 || i >= layout.width as i64 || j >= layout.height as i64 {
            return Err(ValidationError::CellOutOfRange {
                i,
                j,
                width: layout.width,
                height: layout.height,
            });
        }
        Ok((i as usize, j as usize))
    }

    #[inline]
    fn flat(layout: &GridLayout, (i, j): CellIndex) -> usize {
        j * layout.width + i
    }

    /// Cell containing a world position.
    pub fn index(&self, position: Point2) -> Result<CellIndex, ValidationError> {
        let layout = self.layout()?;
        ensure_finite("grid position", position)?;
        Self::checked(layout, Self::raw_index(layout, position))
    }

    /// World position of a cell's centre.
    pub fn cell_center(&self, (i, j): CellIndex) -> Result<Point2, ValidationError> {
        let layout = self.layout()?;
        Self::checked(layout, (i as i64, j as i64))?;
        Ok(pt2(
            layout.bounds.x_min + (i as f32 + 0.5) * layout.scale,
            layout.bounds.y_min + (j as f32 + 0.5) * layout.scale,
        ))
    }

    pub fn cell(&self, index: CellIndex) -> Result<&Cell, ValidationError> {
        let layout = self.layout()?;
        let index = Self::checked(layout, (index.0 as i64, index.1 as i64))?;
        Ok(&self.cells[Self::flat(layout, index)])
    }

    /// Mark the cell under `position` as visited.
    pub fn mark_visited(&mut self, position: Point2) -> Result<CellIndex, ValidationError> {
        let index = self.index(position)?;
        let flat = Self::flat(self.layout()?, index);
        self.cells[flat].exists = true;
        Ok(index)
    }

    /// Mark the cell and remember who marked it. Returns whether the cell
    /// was unvisited before.
    pub fn assign(&mut self, agent: AgentKey, position: Point2) -> Result<bool, ValidationError> {
        let index = self.index(position)?;
        let flat = Self::flat(self.layout()?, index);
        let cell = &mut self.cells[flat];
        let fresh = !cell.exists;
        cell.exists = true;
        cell.last_writer = Some(agent);
        Ok(fresh)
    }

    pub fn is_occupied(&self, position: Point2) -> Result<bool, ValidationError> {
        let index = self.index(position)?;
        Ok(self.cells[Self::flat(self.layout()?, index)].exists)
    }

    /// Occupied cells in the square window of `±floor(radius / scale)` cells
    /// around `position`, limited to the field.
    pub fn neighborhood(&self, position: Point2, radius: f32) -> Result<Vec<CellIndex>, ValidationError> {
        let layout = self.layout()?;
        ensure_finite("grid position", position)?;
        if !radius.is_finite() || radius < 0.0 {
            return Err(ValidationError::InvalidArgument { what: "neighbourhood radius", value: radius });
        }

        let (ci, cj) = Self::raw_index(layout, position);
        // A window wider than the grid sees the same cells as the whole grid
        let span = layout.width.max(layout.height) as i64;
        let reach = ((radius / layout.scale).floor() as i64).min(span);

        let i_lo = ci.saturating_sub(reach).max(0);
        let i_hi = ci.saturating_add(reach).min(layout.width as i64 - 1);
        let j_lo = cj.saturating_sub(reach).max(0);
        let j_hi = cj.saturating_add(reach).min(layout.height as i64 - 1);

        let mut result = Vec::new();
        for j in j_lo..=j_hi {
            let row = j as usize * layout.width;
            for i in i_lo..=i_hi {
                if self.cells[row + i as usize].exists {
                    result.push((i as usize, j as usize));
                }
            }
        }
        Ok(result)
    }

    /// Forget every visit.
    pub fn clear(&mut self) -> Result<(), ValidationError> {
        self.layout()?;
        self.cells.fill(Cell::default());
        Ok(())
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.exists).count()
    }

    /// Fraction of cells visited so far, in [0, 1].
    pub fn coverage(&self) -> Result<f32, ValidationError> {
        self.layout()?;
        if self.cells.is_empty() {
            return Ok(0.0);
        }
        Ok(self.occupied_count() as f32 / self.cells.len() as f32)
    }

    /// Iterate `(index, cell)` over occupied cells, row by row.
    pub fn occupied_cells(&self) -> Result<impl Iterator<Item = (CellIndex, &Cell)> + '_, ValidationError> {
        let width = self.layout()?.width;
        Ok(self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.exists)
            .map(move |(flat, cell)| ((flat % width, flat / width), cell)))
    }
}

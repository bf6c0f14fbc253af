/// Grid store - the on/off state of every tile
///
/// Rows are pitch lanes, columns are steps. Out-of-range coordinates are
/// ignored everywhere instead of failing, because they arrive from pointer
/// input and from the pattern assistant.
use serde::Deserialize;

use crate::config::{MAX_GRID_SIZE, MIN_GRID_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub column: usize,
}

impl CellPos {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// What a toggle does regardless of the cell's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedMode {
    Activate,
    Deactivate,
}

#[derive(Debug, Clone)]
pub struct Grid {
    cells: Vec<bool>,
    size: usize,
    max_size: usize,
}

impl Grid {
    pub fn new(size: usize, max_size: usize) -> Self {
        let max_size = max_size.clamp(MIN_GRID_SIZE, MAX_GRID_SIZE);
        let size = size.clamp(MIN_GRID_SIZE, max_size);
        Self {
            cells: vec![false; size * size],
            size,
            max_size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.size && col < self.size).then(|| row * self.size + col)
    }

    pub fn is_active(&self, row: usize, col: usize) -> bool {
        self.index(row, col)
            .and_then(|i| self.cells.get(i))
            .copied()
            .unwrap_or(false)
    }

    /// Reallocates to `new_size` x `new_size`, all inactive. Returns the size
    /// actually applied.
    pub fn resize(&mut self, new_size: usize) -> usize {
        let size = new_size.clamp(MIN_GRID_SIZE, self.max_size);
        if size != new_size {
            log::debug!("grid size {} clamped to {}", new_size, size);
        }
        self.size = size;
        self.cells = vec![false; size * size];
        size
    }

    /// Returns whether the cell changed.
    pub fn set_active(&mut self, row: usize, col: usize, active: bool) -> bool {
        match self.index(row, col) {
            Some(i) => {
                let changed = self.cells[i] != active;
                self.cells[i] = active;
                changed
            }
            None => false,
        }
    }

    /// Flips the cell, or forces it on/off when `mode` is given. Returns
    /// whether the cell changed.
    pub fn toggle(&mut self, row: usize, col: usize, mode: Option<ForcedMode>) -> bool {
        if self.index(row, col).is_none() {
            return false;
        }
        let active = match mode {
            Some(ForcedMode::Activate) => true,
            Some(ForcedMode::Deactivate) => false,
            None => !self.is_active(row, col),
        };
        self.set_active(row, col, active)
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = false;
        }
    }

    /// Clears, then activates every in-range cell. Returns how many cells
    /// were taken from `cells`.
    pub fn bulk_load(&mut self, cells: &[CellPos]) -> usize {
        self.clear();
        let mut applied = 0;
        for pos in cells {
            if self.index(pos.row, pos.column).is_some() {
                self.set_active(pos.row, pos.column, true);
                applied += 1;
            } else {
                log::debug!("dropping out-of-range cell ({}, {})", pos.row, pos.column);
            }
        }
        applied
    }

    pub fn active_cells(&self) -> impl Iterator<Item = CellPos> + '_ {
        let size = self.size;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
            .map(move |(i, _)| CellPos::new(i / size, i % size))
    }

    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }
}

/// State of an in-progress pointer drag across the grid.
///
/// The first cell touched decides the mode for the whole gesture: starting on
/// an active tile erases, starting on an inactive one paints. Later cells get
/// that mode no matter what state they are in, so a drag across mixed tiles
/// does not flicker.
#[derive(Debug, Clone, Default)]
pub struct DragGesture {
    mode: Option<ForcedMode>,
}

impl DragGesture {
    pub fn is_active(&self) -> bool {
        self.mode.is_some()
    }

    pub fn mode(&self) -> Option<ForcedMode> {
        self.mode
    }

    /// Starts a gesture on `(row, col)` and applies it there. Returns whether
    /// the cell changed; a cell outside the grid starts nothing.
    pub fn begin(&mut self, grid: &mut Grid, row: usize, col: usize) -> bool {
        if row >= grid.size() || col >= grid.size() {
            self.mode = None;
            return false;
        }
        let mode = if grid.is_active(row, col) {
            ForcedMode::Deactivate
        } else {
            ForcedMode::Activate
        };
        self.mode = Some(mode);
        grid.toggle(row, col, Some(mode))
    }

    pub fn extend(&mut self, grid: &mut Grid, row: usize, col: usize) -> bool {
        match self.mode {
            Some(mode) => grid.toggle(row, col, Some(mode)),
            None => false,
        }
    }

    pub fn end(&mut self) {
        self.mode = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new(8, 64);
        assert_eq!(grid.size(), 8);
        assert_eq!(grid.active_count(), 0);
    }

    #[test]
    fn test_resize_yields_empty_square() {
        let mut grid = Grid::new(8, 64);
        for n in 4..=64 {
            grid.set_active(0, 0, true);
            assert_eq!(grid.resize(n), n);
            assert_eq!(grid.size(), n);
            assert_eq!(grid.active_count(), 0);
            assert!(!grid.is_active(n - 1, n - 1));
        }
    }

    #[test]
    fn test_resize_clamps() {
        let mut grid = Grid::new(8, 32);
        assert_eq!(grid.resize(1), 4);
        assert_eq!(grid.resize(100), 32);
    }

    #[test]
    fn test_max_size_never_exceeds_limit() {
        let mut grid = Grid::new(8, 1000);
        assert_eq!(grid.max_size(), MAX_GRID_SIZE);
        assert_eq!(grid.resize(100), 64);
        assert_eq!(Grid::new(200, 1000).size(), 64);
        assert_eq!(Grid::new(8, 1).max_size(), MIN_GRID_SIZE);
    }

    #[test]
    fn test_set_active_reports_change() {
        let mut grid = Grid::new(4, 64);
        assert!(grid.set_active(1, 2, true));
        assert!(!grid.set_active(1, 2, true));
        assert!(grid.is_active(1, 2));
        assert!(!grid.set_active(4, 0, true));
        assert!(!grid.set_active(0, 4, true));
    }

    #[test]
    fn test_grid_toggle() {
        let mut grid = Grid::new(4, 64);
        assert!(grid.toggle(0, 0, None));
        assert!(grid.is_active(0, 0));
        grid.toggle(0, 0, None);
        assert!(!grid.is_active(0, 0));
    }

    #[test]
    fn test_forced_toggle_is_idempotent() {
        let mut grid = Grid::new(4, 64);
        grid.toggle(2, 3, Some(ForcedMode::Activate));
        assert!(!grid.toggle(2, 3, Some(ForcedMode::Activate)));
        assert!(grid.is_active(2, 3));

        grid.toggle(2, 3, Some(ForcedMode::Deactivate));
        grid.toggle(2, 3, Some(ForcedMode::Deactivate));
        assert!(!grid.is_active(2, 3));
    }

    #[test]
    fn test_bulk_load_drops_out_of_range() {
        let mut grid = Grid::new(8, 64);
        grid.set_active(5, 5, true);
        let applied = grid.bulk_load(&[
            CellPos::new(0, 0),
            CellPos::new(99, 0),
            CellPos::new(3, 8),
            CellPos::new(7, 7),
        ]);
        assert_eq!(applied, 2);
        let active: Vec<_> = grid.active_cells().collect();
        assert_eq!(active, vec![CellPos::new(0, 0), CellPos::new(7, 7)]);
    }

    #[test]
    fn test_drag_mode_sticks_from_first_cell() {
        let mut grid = Grid::new(4, 64);
        grid.set_active(0, 1, true);
        grid.set_active(0, 3, true);

        let mut drag = DragGesture::default();
        assert!(drag.begin(&mut grid, 0, 0));
        assert_eq!(drag.mode(), Some(ForcedMode::Activate));
        drag.extend(&mut grid, 0, 1);
        drag.extend(&mut grid, 0, 2);
        drag.extend(&mut grid, 0, 1);
        drag.end();
        assert!((0..4).all(|c| grid.is_active(0, c)));

        assert!(drag.begin(&mut grid, 0, 2));
        assert_eq!(drag.mode(), Some(ForcedMode::Deactivate));
        drag.extend(&mut grid, 0, 3);
        drag.end();
        assert!(!grid.is_active(0, 2));
        assert!(!grid.is_active(0, 3));
        assert!(grid.is_active(0, 0));
    }

    #[test]
    fn test_drag_outside_grid_starts_nothing() {
        let mut grid = Grid::new(4, 64);
        let mut drag = DragGesture::default();
        assert!(!drag.begin(&mut grid, 9, 0));
        assert!(!drag.is_active());
        assert!(!drag.extend(&mut grid, 0, 0));
        assert_eq!(grid.active_count(), 0);
    }
}

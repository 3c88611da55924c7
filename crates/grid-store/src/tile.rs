//! Partitioning a grid into rectangular tiles.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A half-open block of rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Tile {
    pub fn new(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Self {
        Self {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    /// The tile covering a whole `rows` x `cols` grid.
    pub fn whole(rows: usize, cols: usize) -> Self {
        Self::new(0, rows, 0, cols)
    }

    pub fn rows(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn cols(&self) -> usize {
        self.col_end - self.col_start
    }

    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the tile lies inside a `rows` x `cols` grid.
    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        self.row_start < self.row_end && self.col_start < self.col_end && self.row_end <= rows && self.col_end <= cols
    }
}

impl std::fmt::Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows {}..{}, cols {}..{}",
            self.row_start, self.row_end, self.col_start, self.col_end
        )
    }
}

/// Split `rows` x `cols` into tiles of at most `row_chunk` x `col_chunk`,
/// row-major. `None` means no split along that axis.
pub fn partition(rows: usize, cols: usize, row_chunk: Option<usize>, col_chunk: Option<usize>) -> Result<Vec<Tile>> {
    let row_chunk = chunk_or_whole(row_chunk, rows, "row")?;
    let col_chunk = chunk_or_whole(col_chunk, cols, "column")?;

    let mut tiles = Vec::with_capacity(rows.div_ceil(row_chunk) * cols.div_ceil(col_chunk));
    for row_start in (0..rows).step_by(row_chunk) {
        let row_end = (row_start + row_chunk).min(rows);
        for col_start in (0..cols).step_by(col_chunk) {
            let col_end = (col_start + col_chunk).min(cols);
            tiles.push(Tile::new(row_start, row_end, col_start, col_end));
        }
    }
    Ok(tiles)
}

fn chunk_or_whole(chunk: Option<usize>, extent: usize, axis: &str) -> Result<usize> {
    match chunk {
        Some(0) => Err(StoreError::InvalidChunk(format!("{axis} chunk must be > 0"))),
        Some(n) => Ok(n),
        None => Ok(extent.max(1)),
    }
}

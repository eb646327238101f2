
use crate::error::MatrixError;

type Result<T> = std::result::Result<T, MatrixError>;

/// A dense 2-d matrix of arbitrary cell values, stored row-major.
///
/// This is the "uncompressed" input shape for the tree constructors: every
/// cell is materialised, including the null ones. For anything genuinely
/// sparse, prefer the adjacency-list or pair-list constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Matrix<T> {
  /// Number of rows.
  pub rows: usize,
  /// Number of columns.
  pub cols: usize,
  cells: Vec<T>,
}
impl<T: Clone> Matrix<T> {
  /// Creates a matrix of the given dimensions with every cell set to `value`.
  pub fn filled(rows: usize, cols: usize, value: T) -> Self {
    Matrix {
      rows,
      cols,
      cells: vec![value; rows * cols],
    }
  }
  /// Builds a matrix from a list of rows.
  ///
  /// The column count is the length of the longest row; shorter rows are
  /// padded with `fill` on the right.
  pub fn from_rows(rows: Vec<Vec<T>>, fill: T) -> Self {
    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut cells = Vec::with_capacity(rows.len() * cols);
    let height = rows.len();
    for mut row in rows {
      let missing = cols - row.len();
      cells.append(&mut row);
      cells.extend(std::iter::repeat(fill.clone()).take(missing));
    }
    Matrix {
      rows: height,
      cols,
      cells,
    }
  }
  /// Returns the cell at a specific coordinate.
  pub fn get(&self, i: usize, j: usize) -> Result<&T> {
    if i >= self.rows || j >= self.cols {
      return Err(MatrixError::OutOfBounds {
        i_j: [i, j],
        max_i_j: [self.rows.wrapping_sub(1), self.cols.wrapping_sub(1)],
      })
    }
    Ok(&self.cells[i * self.cols + j])
  }
  /// Replaces the cell at a specific coordinate.
  pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<()> {
    if i >= self.rows || j >= self.cols {
      return Err(MatrixError::OutOfBounds {
        i_j: [i, j],
        max_i_j: [self.rows.wrapping_sub(1), self.cols.wrapping_sub(1)],
      })
    }
    self.cells[i * self.cols + j] = value;
    Ok(())
  }
  /// Returns a row as a contiguous slice.
  pub fn row(&self, i: usize) -> Result<&[T]> {
    if i >= self.rows {
      return Err(MatrixError::OutOfBounds {
        i_j: [i, 0],
        max_i_j: [self.rows.wrapping_sub(1), self.cols.wrapping_sub(1)],
      })
    }
    Ok(&self.cells[i * self.cols..(i + 1) * self.cols])
  }
  /// Returns the cells of a column, top to bottom.
  pub fn column(&self, j: usize) -> Result<Vec<T>> {
    if j >= self.cols {
      return Err(MatrixError::OutOfBounds {
        i_j: [0, j],
        max_i_j: [self.rows.wrapping_sub(1), self.cols.wrapping_sub(1)],
      })
    }
    Ok((0..self.rows).map(|i| self.cells[i * self.cols + j].clone()).collect())
  }
  /// Consumes the matrix to produce its cells as a flat row-major vec.
  pub fn into_cells(self) -> Vec<T> {
    self.cells
  }
}
impl<T> std::ops::Index<(usize, usize)> for Matrix<T> {
  type Output = T;
  /// Panics when the coordinate is out of bounds; use [`Matrix::get`] for a
  /// checked lookup.
  fn index(&self, (i, j): (usize, usize)) -> &T {
    assert!(i < self.rows && j < self.cols);
    &self.cells[i * self.cols + j]
  }
}

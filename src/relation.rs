/*!
The query surface shared by the relation representations in this library.

Every tree variant compresses the same logical object, a rectangular matrix of
cells with one designated null value, and answers the same questions about it.
[`Relation`] is that capability set; [`RelationTag`] tells callers which
concrete representation they are holding when they need to dispatch on it.
*/

use crate::error::K2TreeError;

type Result<T> = std::result::Result<T, K2TreeError>;

/// A position in the relation matrix together with the value stored there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValuedPosition<T> {
  /// Row of the cell.
  pub row: usize,
  /// Column of the cell.
  pub col: usize,
  /// Value of the cell.
  pub value: T,
}
impl<T> ValuedPosition<T> {
  /// Bundles a coordinate pair with its value.
  pub fn new(row: usize, col: usize, value: T) -> Self {
    ValuedPosition { row, col, value }
  }
}

/// A list of cell positions, `(row, col)`.
pub type Positions = Vec<(usize, usize)>;

/// One row of an adjacency-list input: `(column, value)` entries sorted by
/// column.
pub type RelationList<T> = Vec<(usize, T)>;

/// Identifies the concrete representation behind a [`Relation`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationTag {
  /// Rectangular tree with generic cell values.
  Rectangular,
  /// Rectangular tree specialised to boolean cells with packed leaves.
  RectangularBits,
}

/// Operations supported by every compressed relation representation.
///
/// The coordinate-taking queries are fallible: coordinates are validated
/// against the *padded* dimensions (`num_rows` x `num_cols`), and padded
/// cells beyond the original input simply read as null. Enumerations return
/// the same multiset across representations, but the order in which a row's
/// cells appear is representation-specific.
pub trait Relation<T> {
  /// Which representation this is.
  fn tag(&self) -> RelationTag;
  /// Number of rows of the padded relation matrix.
  fn num_rows(&self) -> usize;
  /// Number of columns of the padded relation matrix.
  fn num_cols(&self) -> usize;
  /// The designated null value.
  fn null_value(&self) -> T;
  /// Whether the cell `(i, j)` holds a non-null value.
  fn is_not_null(&self, i: usize, j: usize) -> Result<bool>;
  /// The value of cell `(i, j)`, null included.
  fn get_element(&self, i: usize, j: usize) -> Result<T>;
  /// Values of the non-null cells in row `i`.
  fn successor_elements(&self, i: usize) -> Result<Vec<T>>;
  /// Columns of the non-null cells in row `i`.
  fn successor_positions(&self, i: usize) -> Result<Vec<usize>>;
  /// Positions and values of the non-null cells in row `i`.
  fn successor_valued_positions(&self, i: usize) -> Result<Vec<ValuedPosition<T>>>;
  /// Values of the non-null cells in column `j`.
  fn predecessor_elements(&self, j: usize) -> Result<Vec<T>>;
  /// Rows of the non-null cells in column `j`.
  fn predecessor_positions(&self, j: usize) -> Result<Vec<usize>>;
  /// Positions and values of the non-null cells in column `j`.
  fn predecessor_valued_positions(&self, j: usize) -> Result<Vec<ValuedPosition<T>>>;
  /// Values of the non-null cells in `[i1..=i2] x [j1..=j2]`.
  fn elements_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Vec<T>>;
  /// Positions of the non-null cells in `[i1..=i2] x [j1..=j2]`.
  fn positions_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Positions>;
  /// Positions and values of the non-null cells in `[i1..=i2] x [j1..=j2]`.
  fn valued_positions_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Vec<ValuedPosition<T>>>;
  /// Whether `[i1..=i2] x [j1..=j2]` contains at least one non-null cell.
  ///
  /// May report stale positives after [`Relation::set_null`]; see there.
  fn contains_element(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<bool>;
  /// Number of non-null cells in the whole relation.
  fn count_elements(&self) -> usize;
  /// Smallest column `j` such that `(i, j)` is non-null, or `num_cols` if
  /// row `i` is empty.
  fn first_successor(&self, i: usize) -> Result<usize>;
  /// Overwrites the cell `(i, j)` with null.
  ///
  /// This only touches the leaf storage. The internal child-presence bits are
  /// left as they were, so range-membership queries over a region whose only
  /// non-null cell was cleared may keep reporting the region as non-empty.
  /// Point lookups and [`Relation::count_elements`] stay exact.
  fn set_null(&mut self, i: usize, j: usize) -> Result<()>;

  /// Values of every non-null cell.
  fn all_elements(&self) -> Vec<T> {
    self
      .elements_in_range(0, self.num_rows() - 1, 0, self.num_cols() - 1)
      .unwrap_or_default()
  }
  /// Positions of every non-null cell.
  fn all_positions(&self) -> Positions {
    self
      .positions_in_range(0, self.num_rows() - 1, 0, self.num_cols() - 1)
      .unwrap_or_default()
  }
  /// Positions and values of every non-null cell.
  fn all_valued_positions(&self) -> Vec<ValuedPosition<T>> {
    self
      .valued_positions_in_range(0, self.num_rows() - 1, 0, self.num_cols() - 1)
      .unwrap_or_default()
  }

  /* Method aliases using relation nomenclature */

  /// Alias for [`Relation::is_not_null`].
  fn are_related(&self, i: usize, j: usize) -> Result<bool> {
    self.is_not_null(i, j)
  }
  /// Alias for [`Relation::successor_positions`].
  fn successors(&self, i: usize) -> Result<Vec<usize>> {
    self.successor_positions(i)
  }
  /// Alias for [`Relation::predecessor_positions`].
  fn predecessors(&self, j: usize) -> Result<Vec<usize>> {
    self.predecessor_positions(j)
  }
  /// Alias for [`Relation::positions_in_range`].
  fn range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Positions> {
    self.positions_in_range(i1, i2, j1, j2)
  }
  /// Alias for [`Relation::contains_element`].
  fn contains_link(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<bool> {
    self.contains_element(i1, i2, j1, j2)
  }
  /// Alias for [`Relation::count_elements`].
  fn count_links(&self) -> usize {
    self.count_elements()
  }
}

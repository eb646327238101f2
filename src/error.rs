/*!
These are all the custom errors that this library could return.

All failures are construction-time or bounds-related input errors; there is
nothing retryable in here. `K2TreeError` covers the tree family, while
`MatrixError` belongs to the dense input matrix and is kept separate so that
matrix users don't drag in the tree vocabulary.
*/

/// Errors produced as a result of interactions with the tree types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum K2TreeError {
  /// Produced when a user attempts to create a tree with a row or column
  /// arity below 2.
  ArityTooSmall {
    ///
    kr: usize,
    ///
    kc: usize,
  },
  /// Produced when a windowed constructor is given a submatrix whose side
  /// lengths are not powers of the arities with a common exponent.
  InvalidParameters {
    /// Requested number of rows of the submatrix.
    nr: usize,
    /// Requested number of columns of the submatrix.
    nc: usize,
    ///
    kr: usize,
    ///
    kc: usize,
    /// The height derived from the request.
    h: usize,
    /// The padded row count `kr^h` the request would lead to.
    num_rows: usize,
    /// The padded column count `kc^h` the request would lead to.
    num_cols: usize,
  },
  /// Produced when a user attempts to access a coordinate outside the padded
  /// bounds of the matrix a tree represents.
  OutOfBounds {
    ///
    i_j: [usize; 2],
    ///
    max_i_j: [usize; 2],
  },
  /// Produced when a range query is given a descending interval.
  InvertedRange {
    ///
    low: usize,
    ///
    high: usize,
  },
}
impl std::error::Error for K2TreeError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    None
  }
}
impl std::fmt::Display for K2TreeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    use K2TreeError::*;
    match self {
      ArityTooSmall{kr, kc} => write!(f, "Attempt to create a tree with arities kr = {} and kc = {}, below the minimum of 2.", kr, kc),
      InvalidParameters{nr, nc, kr, kc, h, num_rows, num_cols} => write!(
        f,
        "Unsuitable parameters: the numbers of rows (nr = {}) and columns (nc = {}) have to be powers of kr = {} resp. kc = {} with a common exponent, but h = {} leads to {} rows and {} columns.",
        nr, nc, kr, kc, h, num_rows, num_cols
      ),
      OutOfBounds {
        i_j: [i, j],
        max_i_j: [max_i, max_j]
      } => write!(f, "Attempt to access a cell at coordinates ({}, {}) which are not in the range of the matrix represented by the tree: (0, 0) -> ({}, {})", i, j, max_i, max_j),
      InvertedRange{low, high} => write!(f, "Attempt to query a descending range: {} -> {}", low, high),
    }
  }
}

/// Errors produced as a result of interactions with the Matrix object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatrixError {
  /// Produced when a user attempts to read or write a cell outside of the
  /// valid range.
  OutOfBounds {
    ///
    i_j: [usize; 2],
    ///
    max_i_j: [usize; 2],
  }
}
impl std::error::Error for MatrixError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    None
  }
}
impl std::fmt::Display for MatrixError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    use MatrixError::*;
    match self {
      OutOfBounds {
        i_j: [i, j],
        max_i_j: [max_i, max_j],
      } => write!(f, "Attempt to access a cell at coordinates ({}, {}) which are not in the range of the matrix: (0, 0) -> ({}, {})", i, j, max_i, max_j),
    }
  }
}

#[cfg(test)]
mod display {
  use super::*;
  #[test]
  fn invalid_parameters_names_every_value() {
    let err = K2TreeError::InvalidParameters {
      nr: 6, nc: 6, kr: 2, kc: 2, h: 3, num_rows: 8, num_cols: 8,
    };
    let msg = err.to_string();
    for needle in ["nr = 6", "nc = 6", "kr = 2", "kc = 2", "h = 3", "8 rows", "8 columns"] {
      assert!(msg.contains(needle), "missing {:?} in {:?}", needle, msg);
    }
  }
  #[test]
  fn out_of_bounds() {
    let err = K2TreeError::OutOfBounds {
      i_j: [9, 1],
      max_i_j: [7, 7],
    };
    assert!(err.to_string().contains("(9, 1)"));
  }
}

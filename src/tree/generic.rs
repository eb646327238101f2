use {
  bitvec::vec::BitVec,
  std::collections::VecDeque,
  crate::bits::RankIndex,
  crate::error::K2TreeError as Error,
  crate::matrix::Matrix,
  crate::relation::{Positions, Relation, RelationList, RelationTag, ValuedPosition},
  super::*,
};

type Result<T> = std::result::Result<T, Error>;

/// Selects the algorithm used by the adjacency-list constructors.
///
/// All three produce bit-identical trees; they differ in running time and in
/// how much transient memory construction needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListBuildMode {
  /// Depth-first subdivision driven by one cursor per row. Peak memory is
  /// the output itself plus one buffer per level.
  Recursive,
  /// Builds an explicit pointer tree first, then emits it breadth-first.
  /// Fastest per inserted cell, but the scratch tree holds every non-null
  /// cell at once.
  ScratchTree,
  /// Inserts pair by pair into a growing bit vector guided by a naive
  /// dynamic rank. Mostly of historical interest; quadratic in the worst
  /// case but needs no per-level buffers.
  DynamicBitmaps,
}

/// A static rectangular K2-tree over cells of type `T` with a designated
/// null value.
///
/// The represented matrix is subdivided by independent row and column
/// arities `kr` and `kc`, so the padded dimensions are `kr^h x kc^h` for a
/// common height `h`. The tree is built once from a dense matrix, from
/// adjacency lists or from a flat pair list, and is immutable afterwards
/// except for [`KrKcTree::set_null`].
///
/// ```
/// use k2_rect::{matrix::Matrix, KrKcTree};
/// let mut mat = Matrix::filled(4, 4, 0u8);
/// mat.set(0, 1, 7).unwrap();
/// mat.set(3, 3, 9).unwrap();
/// let tree = KrKcTree::from_matrix(&mat, 2, 2, 0).unwrap();
/// assert_eq!(7, tree.get(0, 1).unwrap());
/// assert_eq!(0, tree.get(2, 2).unwrap());
/// assert_eq!(2, tree.count_elements());
/// assert_eq!(vec![3], tree.successor_positions(3).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct KrKcTree<T> {
  /// Height of the tree.
  pub h: usize,
  /// Row arity.
  pub kr: usize,
  /// Column arity.
  pub kc: usize,
  /// Padded number of rows, `kr^h`.
  pub num_rows: usize,
  /// Padded number of columns, `kc^h`.
  pub num_cols: usize,
  /// The designated null value.
  pub null: T,
  /// Child-presence bits of all internal levels, concatenated in level
  /// order.
  pub stems: BitVec,
  /// Cell values of the non-empty leaf blocks, in the same order.
  pub leaves: Vec<T>,
  /// Rank index over the stems. A cached view: it is rebuilt whenever the
  /// stems are replaced.
  pub ranks: RankIndex,
}

/* Construction */
impl<T: Clone + PartialEq> KrKcTree<T> {
  fn with_shape(h: usize, kr: usize, kc: usize, null: T) -> Self {
    KrKcTree {
      h,
      kr,
      kc,
      num_rows: kr.pow(h as u32),
      num_cols: kc.pow(h as u32),
      null,
      stems: BitVec::new(),
      leaves: Vec::new(),
      ranks: RankIndex::new(&BitVec::new()),
    }
  }
  fn reseat_ranks(&mut self) {
    self.ranks = RankIndex::new(&self.stems);
  }

  /// Builds a tree from a dense matrix. Cells equal to `null` are the absent
  /// ones.
  pub fn from_matrix(mat: &Matrix<T>, kr: usize, kc: usize, null: T) -> Result<Self> {
    check_arities(kr, kc)?;
    let h = std::cmp::max(1, std::cmp::max(log_k(mat.rows, kr), log_k(mat.cols, kc)));
    let mut tree = Self::with_shape(h, kr, kc, null);
    tree.build_from_matrix(mat, 0, 0);
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Like [`KrKcTree::from_matrix`], but only the `nr x nc` submatrix whose
  /// upper-left cell is `(x, y)` is represented.
  ///
  /// `nr` and `nc` must be `kr^h` resp. `kc^h` for the height derived from
  /// them, otherwise construction fails with
  /// [`InvalidParameters`](crate::error::K2TreeError::InvalidParameters).
  #[allow(clippy::too_many_arguments)]
  pub fn from_matrix_window(
    mat: &Matrix<T>,
    x: usize,
    y: usize,
    nr: usize,
    nc: usize,
    kr: usize,
    kc: usize,
    null: T,
  ) -> Result<Self> {
    check_arities(kr, kc)?;
    let h = std::cmp::max(1, std::cmp::max(log_k(nr, kr), log_k(nc, kc)));
    let mut tree = Self::with_shape(h, kr, kc, null);
    check_window(nr, nc, kr, kc, h, tree.num_rows, tree.num_cols)?;
    tree.build_from_matrix(mat, x, y);
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Builds a tree from row-wise adjacency lists: one `(column, value)` list
  /// per row, sorted by column.
  pub fn from_lists(
    lists: &[RelationList<T>],
    kr: usize,
    kc: usize,
    mode: ListBuildMode,
    null: T,
  ) -> Result<Self> {
    check_arities(kr, kc)?;
    let mut max_col = 0;
    for row in lists {
      for &(col, _) in row {
        max_col = std::cmp::max(max_col, col);
      }
    }
    let h = std::cmp::max(1, std::cmp::max(log_k(lists.len(), kr), log_k(max_col + 1, kc)));
    let mut tree = Self::with_shape(h, kr, kc, null);
    tree.build_from_lists(lists, 0, 0, mode);
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Windowed form of [`KrKcTree::from_lists`]; column indices in the lists
  /// stay absolute, entries outside the window are ignored.
  #[allow(clippy::too_many_arguments)]
  pub fn from_lists_window(
    lists: &[RelationList<T>],
    x: usize,
    y: usize,
    nr: usize,
    nc: usize,
    kr: usize,
    kc: usize,
    mode: ListBuildMode,
    null: T,
  ) -> Result<Self> {
    check_arities(kr, kc)?;
    let h = std::cmp::max(1, std::cmp::max(log_k(nr, kr), log_k(nc, kc)));
    let mut tree = Self::with_shape(h, kr, kc, null);
    check_window(nr, nc, kr, kc, h, tree.num_rows, tree.num_cols)?;
    tree.build_from_lists(lists, x, y, mode);
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Builds a tree from a flat pair list in arbitrary order.
  ///
  /// The slice is partitioned in place by a breadth-first counting sort; on
  /// return it is reordered but holds the same pairs.
  pub fn from_pairs(pairs: &mut [ValuedPosition<T>], kr: usize, kc: usize, null: T) -> Result<Self> {
    check_arities(kr, kc)?;
    let mut max_row = 0;
    let mut max_col = 0;
    for pair in pairs.iter() {
      max_row = std::cmp::max(max_row, pair.row);
      max_col = std::cmp::max(max_col, pair.col);
    }
    let h = std::cmp::max(1, std::cmp::max(log_k(max_row + 1, kr), log_k(max_col + 1, kc)));
    let mut tree = Self::with_shape(h, kr, kc, null);
    if !pairs.is_empty() {
      let right = pairs.len();
      tree.build_from_pairs(pairs, 0, 0, tree.num_rows, tree.num_cols, 0, right);
    }
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Windowed form of [`KrKcTree::from_pairs`]: only the pair range
  /// `[left, right)` is used, and every pair in it must lie inside the
  /// `nr x nc` window at `(x, y)`. Positions are absolute; the resulting
  /// tree addresses the window relative to its upper-left corner.
  #[allow(clippy::too_many_arguments)]
  pub fn from_pairs_window(
    pairs: &mut [ValuedPosition<T>],
    x: usize,
    y: usize,
    nr: usize,
    nc: usize,
    left: usize,
    right: usize,
    kr: usize,
    kc: usize,
    null: T,
  ) -> Result<Self> {
    check_arities(kr, kc)?;
    let h = std::cmp::max(1, std::cmp::max(log_k(nr, kr), log_k(nc, kc)));
    let mut tree = Self::with_shape(h, kr, kc, null);
    check_window(nr, nc, kr, kc, h, tree.num_rows, tree.num_cols)?;
    if left != right {
      tree.build_from_pairs(pairs, x, y, nr, nc, left, right);
    }
    tree.reseat_ranks();
    Ok(tree)
  }

  fn finish_levels(&mut self, levels: Vec<BitVec>) {
    let total: usize = levels.iter().map(|level| level.len()).sum();
    let mut stems = BitVec::with_capacity(total);
    for level in levels {
      stems.extend_from_bitslice(&level);
    }
    self.stems = stems;
  }

  /* Construction from a dense matrix */

  fn build_from_matrix(&mut self, mat: &Matrix<T>, x: usize, y: usize) {
    let mut levels = vec![BitVec::new(); self.h - 1];
    self.matrix_block(mat, &mut levels, self.num_rows, self.num_cols, 1, x, y);
    self.finish_levels(levels);
  }
  fn matrix_block(
    &mut self,
    mat: &Matrix<T>,
    levels: &mut [BitVec],
    num_rows: usize,
    num_cols: usize,
    l: usize,
    p: usize,
    q: usize,
  ) -> bool {
    if l == self.h {
      let mut block = Vec::with_capacity(self.kr * self.kc);
      for i in 0..self.kr {
        for j in 0..self.kc {
          block.push(if p + i < mat.rows && q + j < mat.cols {
            mat[(p + i, q + j)].clone()
          } else {
            self.null.clone()
          });
        }
      }
      if is_all(&block, &self.null) {
        false
      } else {
        self.leaves.extend(block);
        true
      }
    } else {
      let nr = num_rows / self.kr;
      let nc = num_cols / self.kc;
      let mut block: BitVec = BitVec::with_capacity(self.kr * self.kc);
      for i in 0..self.kr {
        for j in 0..self.kc {
          block.push(self.matrix_block(mat, levels, nr, nc, l + 1, p + i * nr, q + j * nc));
        }
      }
      if block.not_any() {
        false
      } else {
        levels[l - 1].extend_from_bitslice(&block);
        true
      }
    }
  }

  /* Construction from adjacency lists */

  fn build_from_lists(&mut self, lists: &[RelationList<T>], x: usize, y: usize, mode: ListBuildMode) {
    match mode {
      ListBuildMode::Recursive => self.build_from_lists_cursors(lists, x, y),
      ListBuildMode::ScratchTree => self.build_from_lists_via_tree(lists, x, y),
      ListBuildMode::DynamicBitmaps => self.build_from_lists_dynamic(lists, x, y),
    }
  }
  fn build_from_lists_cursors(&mut self, lists: &[RelationList<T>], x: usize, y: usize) {
    let mut levels = vec![BitVec::new(); self.h - 1];
    let mut cursors: Vec<usize> = lists
      .iter()
      .map(|row| {
        let mut c = 0;
        while c < row.len() && row[c].0 < y {
          c += 1;
        }
        c
      })
      .collect();
    self.lists_block(lists, &mut cursors, &mut levels, self.num_rows, self.num_cols, 1, x, y);
    self.finish_levels(levels);
  }
  #[allow(clippy::too_many_arguments)]
  fn lists_block(
    &mut self,
    lists: &[RelationList<T>],
    cursors: &mut [usize],
    levels: &mut [BitVec],
    num_rows: usize,
    num_cols: usize,
    l: usize,
    p: usize,
    q: usize,
  ) -> bool {
    if l == self.h {
      let mut block = Vec::with_capacity(self.kr * self.kc);
      for i in 0..self.kr {
        for j in 0..self.kc {
          let row = p + i;
          let mut value = self.null.clone();
          if row < lists.len()
          && cursors[row] < lists[row].len()
          && lists[row][cursors[row]].0 == q + j {
            value = lists[row][cursors[row]].1.clone();
            if value != self.null {
              cursors[row] += 1;
            }
          }
          block.push(value);
        }
      }
      if is_all(&block, &self.null) {
        false
      } else {
        self.leaves.extend(block);
        true
      }
    } else {
      let nr = num_rows / self.kr;
      let nc = num_cols / self.kc;
      let mut block: BitVec = BitVec::with_capacity(self.kr * self.kc);
      for i in 0..self.kr {
        for j in 0..self.kc {
          block.push(self.lists_block(lists, cursors, levels, nr, nc, l + 1, p + i * nr, q + j * nc));
        }
      }
      if block.not_any() {
        false
      } else {
        levels[l - 1].extend_from_bitslice(&block);
        true
      }
    }
  }
  fn build_from_lists_via_tree(&mut self, lists: &[RelationList<T>], x: usize, y: usize) {
    let mut root = ScratchNode::Leaf(self.null.clone());
    for i in x..std::cmp::min(x + self.num_rows, lists.len()) {
      for &(col, ref val) in &lists[i] {
        if y <= col && col < y + self.num_cols {
          scratch_insert(
            &mut root,
            self.num_rows,
            self.num_cols,
            self.kr,
            self.kc,
            i - x,
            col - y,
            val.clone(),
            &self.null,
          );
        }
      }
    }
    if !root.is_leaf() {
      let mut stems = BitVec::new();
      let mut queue: VecDeque<&ScratchNode<T>> = VecDeque::new();
      queue.push_back(&root);
      while let Some(node) = queue.pop_front() {
        for slot in 0..self.kr * self.kc {
          match node.child(slot) {
            Some(ScratchNode::Leaf(value)) => self.leaves.push(value.clone()),
            Some(child) => {
              stems.push(true);
              queue.push_back(child);
            },
            None => stems.push(false),
          }
        }
      }
      self.stems = stems;
    }
  }
  fn build_from_lists_dynamic(&mut self, lists: &[RelationList<T>], x: usize, y: usize) {
    if self.h == 1 {
      let mut block = vec![self.null.clone(); self.kr * self.kc];
      for i in x..std::cmp::min(x + self.num_rows, lists.len()) {
        for &(col, ref val) in &lists[i] {
          if y <= col && col < y + self.num_cols {
            block[(i - x) * self.kc + (col - y)] = val.clone();
          }
        }
      }
      if !is_all(&block, &self.null) {
        self.leaves = block;
      }
    } else {
      let mut stems = BitVec::new();
      let mut ranks = NaiveDynamicRank::new_zeroed(0);
      for i in x..std::cmp::min(x + self.num_rows, lists.len()) {
        for &(col, ref val) in &lists[i] {
          if y <= col && col < y + self.num_cols {
            self.insert_dynamic(&mut stems, &mut ranks, i - x, col - y, val.clone());
          }
        }
      }
      self.stems = stems;
    }
  }
  fn insert_dynamic(&mut self, stems: &mut BitVec, ranks: &mut NaiveDynamicRank, p: usize, q: usize, val: T) {
    if stems.is_empty() {
      *stems = BitVec::repeat(false, self.kr * self.kc);
      *ranks = NaiveDynamicRank::new_zeroed(self.kr * self.kc);
    }
    let nr = self.num_rows / self.kr;
    let nc = self.num_cols / self.kc;
    let z = (p / nr) * self.kc + q / nc;
    self.insert_dynamic_at(stems, ranks, nr, nc, p % nr, q % nc, val, z, 1);
  }
  #[allow(clippy::too_many_arguments)]
  fn insert_dynamic_at(
    &mut self,
    stems: &mut BitVec,
    ranks: &mut NaiveDynamicRank,
    num_rows: usize,
    num_cols: usize,
    p: usize,
    q: usize,
    val: T,
    z: usize,
    l: usize,
  ) {
    let block = self.kr * self.kc;
    let nr = num_rows / self.kr;
    let nc = num_cols / self.kc;
    if !stems[z] {
      stems.set(z, true);
      ranks.increase_from(z + 1);
      let y = ranks.rank(z + 1) * block + (p / nr) * self.kc + q / nc;
      if l + 1 == self.h {
        let at = ranks.rank(z + 1) * block - stems.len();
        for _ in 0..block {
          self.leaves.insert(at, self.null.clone());
        }
        self.leaves[y - stems.len()] = val;
      } else {
        let at = ranks.rank(z + 1) * block;
        for _ in 0..block {
          stems.insert(at, false);
        }
        ranks.insert(at + 1, block);
        self.insert_dynamic_at(stems, ranks, nr, nc, p % nr, q % nc, val, y, l + 1);
      }
    } else {
      let y = ranks.rank(z + 1) * block + (p / nr) * self.kc + q / nc;
      if l + 1 == self.h {
        self.leaves[y - stems.len()] = val;
      } else {
        self.insert_dynamic_at(stems, ranks, nr, nc, p % nr, q % nc, val, y, l + 1);
      }
    }
  }

  /* In-place construction from a pair list */

  #[allow(clippy::too_many_arguments)]
  fn build_from_pairs(
    &mut self,
    pairs: &mut [ValuedPosition<T>],
    x: usize,
    y: usize,
    nr: usize,
    nc: usize,
    left: usize,
    right: usize,
  ) {
    let block = self.kr * self.kc;
    let mut queue = VecDeque::new();
    let mut intervals = vec![(0usize, 0usize); block];
    let mut stems = BitVec::new();
    queue.push_back(Subproblem::new(x, x + nr - 1, y, y + nc - 1, left, right));
    while let Some(sp) = queue.pop_front() {
      let s_r = sp.last_row - sp.first_row + 1;
      let s_c = sp.last_col - sp.first_col + 1;
      if s_r > self.kr {
        self.counting_sort(pairs, &mut intervals, &sp, s_r / self.kr, s_c / self.kc);
        for i in 0..block {
          let (start, end) = intervals[i];
          if start < end {
            stems.push(true);
            queue.push_back(Subproblem::new(
              sp.first_row + (i / self.kc) * (s_r / self.kr),
              sp.first_row + (i / self.kc + 1) * (s_r / self.kr) - 1,
              sp.first_col + (i % self.kc) * (s_c / self.kc),
              sp.first_col + (i % self.kc + 1) * (s_c / self.kc) - 1,
              sp.left + start,
              sp.left + end,
            ));
          } else {
            stems.push(false);
          }
        }
      } else {
        let mut values = vec![self.null.clone(); block];
        for pair in &pairs[sp.left..sp.right] {
          values[(pair.row - sp.first_row) * self.kc + (pair.col - sp.first_col)] = pair.value.clone();
        }
        self.leaves.extend(values);
      }
    }
    self.stems = stems;
  }
  /// Stable counting sort of `pairs[sp.left..sp.right]` by child key, filling
  /// `intervals` with the half-open range of each key relative to `sp.left`.
  fn counting_sort(
    &self,
    pairs: &mut [ValuedPosition<T>],
    intervals: &mut [(usize, usize)],
    sp: &Subproblem,
    width_row: usize,
    width_col: usize,
  ) {
    let key = |pair: &ValuedPosition<T>| {
      ((pair.row - sp.first_row) / width_row) * self.kc + (pair.col - sp.first_col) / width_col
    };
    let mut counts = vec![0usize; self.kr * self.kc];
    for pair in &pairs[sp.left..sp.right] {
      counts[key(pair)] += 1;
    }
    let mut total = 0;
    for (k, interval) in intervals.iter_mut().enumerate() {
      let count = counts[k];
      counts[k] = total;
      total += count;
      *interval = (counts[k], total);
    }
    let slice = pairs[sp.left..sp.right].to_vec();
    for pair in slice {
      let k = key(&pair);
      pairs[sp.left + counts[k]] = pair;
      counts[k] += 1;
    }
  }
}

/* Queries */
impl<T: Clone + PartialEq> KrKcTree<T> {
  fn check_coords(&self, i: usize, j: usize) -> Result<()> {
    if i >= self.num_rows || j >= self.num_cols {
      return Err(Error::OutOfBounds {
        i_j: [i, j],
        max_i_j: [self.num_rows - 1, self.num_cols - 1],
      })
    }
    Ok(())
  }
  fn check_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<()> {
    if i1 > i2 {
      return Err(Error::InvertedRange { low: i1, high: i2 })
    }
    if j1 > j2 {
      return Err(Error::InvertedRange { low: j1, high: j2 })
    }
    self.check_coords(i2, j2)
  }
  /// Walks the navigation algebra to the leaf slot holding `(p, q)`, or
  /// `None` if the descent dies on a cleared child-presence bit.
  fn leaf_slot(&self, num_rows: usize, num_cols: usize, p: usize, q: usize, z: usize) -> Option<usize> {
    if z >= self.stems.len() {
      Some(z - self.stems.len())
    } else if self.stems[z] {
      let nr = num_rows / self.kr;
      let nc = num_cols / self.kc;
      self.leaf_slot(
        nr,
        nc,
        p % nr,
        q % nc,
        self.ranks.rank(&self.stems, z + 1) * self.kr * self.kc + (p / nr) * self.kc + q / nc,
      )
    } else {
      None
    }
  }
  fn top_leaf_slot(&self, i: usize, j: usize) -> Option<usize> {
    if self.leaves.is_empty() {
      return None
    }
    let nr = self.num_rows / self.kr;
    let nc = self.num_cols / self.kc;
    self.leaf_slot(nr, nc, i % nr, j % nc, (i / nr) * self.kc + j / nc)
  }

  /// The value of cell `(i, j)`. Padded cells read as null.
  pub fn get(&self, i: usize, j: usize) -> Result<T> {
    self.check_coords(i, j)?;
    Ok(match self.top_leaf_slot(i, j) {
      Some(slot) => self.leaves[slot].clone(),
      None => self.null.clone(),
    })
  }
  /// Whether cell `(i, j)` holds a non-null value.
  pub fn is_not_null(&self, i: usize, j: usize) -> Result<bool> {
    self.check_coords(i, j)?;
    Ok(match self.top_leaf_slot(i, j) {
      Some(slot) => self.leaves[slot] != self.null,
      None => false,
    })
  }
  /// Overwrites cell `(i, j)` with null.
  ///
  /// Only the leaf value is touched: the child-presence bits above it keep
  /// claiming a non-null descendant, so [`KrKcTree::contains_element`] over
  /// a region whose last non-null cell was cleared may stay `true`. Point
  /// lookups and [`KrKcTree::count_elements`] remain exact.
  pub fn set_null(&mut self, i: usize, j: usize) -> Result<()> {
    self.check_coords(i, j)?;
    if let Some(slot) = self.top_leaf_slot(i, j) {
      self.leaves[slot] = self.null.clone();
    }
    Ok(())
  }
  /// Number of non-null cells.
  pub fn count_elements(&self) -> usize {
    self.leaves.iter().filter(|value| **value != self.null).count()
  }

  /* Row successors */

  /// Leaf hits of row `p` as `(column, leaf slot)`, via the iterative
  /// level-queue walk. Columns come out in increasing order.
  fn row_leaf_hits(&self, p: usize) -> Vec<(usize, usize)> {
    let mut hits = Vec::new();
    if self.leaves.is_empty() {
      return hits
    }
    let len_t = self.stems.len();
    if len_t == 0 {
      let offset = p * self.num_cols;
      for j in 0..self.num_cols {
        if self.leaves[offset + j] != self.null {
          hits.push((j, offset + j));
        }
      }
      return hits
    }
    let block = self.kr * self.kc;
    let mut queue: VecDeque<SubrowInfo> = VecDeque::new();
    let mut next_level: VecDeque<SubrowInfo> = VecDeque::new();
    let mut nr = self.num_rows / self.kr;
    let mut nc = self.num_cols / self.kc;
    let mut rel_p = p;
    let z = self.kc * (rel_p / nr);
    for j in 0..self.kc {
      queue.push_back(SubrowInfo { dq: j * nc, z: z + j });
    }
    rel_p %= nr;
    nr /= self.kr;
    nc /= self.kc;
    while nr > 1 {
      while let Some(cur) = queue.pop_front() {
        if self.stems[cur.z] {
          let y = self.ranks.rank(&self.stems, cur.z + 1) * block + self.kc * (rel_p / nr);
          for j in 0..self.kc {
            next_level.push_back(SubrowInfo { dq: cur.dq + j * nc, z: y + j });
          }
        }
      }
      std::mem::swap(&mut queue, &mut next_level);
      rel_p %= nr;
      nr /= self.kr;
      nc /= self.kc;
    }
    while let Some(cur) = queue.pop_front() {
      if self.stems[cur.z] {
        let y = self.ranks.rank(&self.stems, cur.z + 1) * block + self.kc * (rel_p / nr) - len_t;
        for j in 0..self.kc {
          if self.leaves[y + j] != self.null {
            hits.push((cur.dq + j * nc, y + j));
          }
        }
      }
    }
    hits
  }
  /// Values of the non-null cells in row `i`, in column order.
  pub fn successor_elements(&self, i: usize) -> Result<Vec<T>> {
    self.check_coords(i, 0)?;
    Ok(
      self
        .row_leaf_hits(i)
        .into_iter()
        .map(|(_, slot)| self.leaves[slot].clone())
        .collect(),
    )
  }
  /// Columns of the non-null cells in row `i`, in increasing order.
  pub fn successor_positions(&self, i: usize) -> Result<Vec<usize>> {
    self.check_coords(i, 0)?;
    Ok(self.row_leaf_hits(i).into_iter().map(|(col, _)| col).collect())
  }
  /// Positions and values of the non-null cells in row `i`.
  pub fn successor_valued_positions(&self, i: usize) -> Result<Vec<ValuedPosition<T>>> {
    self.check_coords(i, 0)?;
    Ok(
      self
        .row_leaf_hits(i)
        .into_iter()
        .map(|(col, slot)| ValuedPosition::new(i, col, self.leaves[slot].clone()))
        .collect(),
    )
  }
  /// Smallest column `j` with `(i, j)` non-null, or `num_cols` for an empty
  /// row. Stack-based, visits columns left to right and stops at the first
  /// hit.
  pub fn first_successor(&self, i: usize) -> Result<usize> {
    self.check_coords(i, 0)?;
    if self.leaves.is_empty() {
      return Ok(self.num_cols)
    }
    if self.stems.is_empty() {
      let offset = i * self.num_cols;
      for j in 0..self.num_cols {
        if self.leaves[offset + j] != self.null {
          return Ok(j)
        }
      }
      return Ok(self.num_cols)
    }
    let block = self.kr * self.kc;
    let nr = self.num_rows / self.kr;
    let nc = self.num_cols / self.kc;
    let mut stack = vec![SubrowFrame {
      nr,
      nc,
      p: i % nr,
      dq: 0,
      z: self.kc * (i / nr),
      j: 0,
    }];
    while let Some(cur) = stack.last_mut() {
      if cur.j == self.kc {
        stack.pop();
        continue
      }
      let frame = *cur;
      cur.dq += cur.nc;
      cur.z += 1;
      cur.j += 1;
      if frame.z >= self.stems.len() {
        if self.leaves[frame.z - self.stems.len()] != self.null {
          return Ok(frame.dq)
        }
      } else if self.stems[frame.z] {
        let nr = frame.nr / self.kr;
        stack.push(SubrowFrame {
          nr,
          nc: frame.nc / self.kc,
          p: frame.p % nr,
          dq: frame.dq,
          z: self.ranks.rank(&self.stems, frame.z + 1) * block + self.kc * (frame.p / nr),
          j: 0,
        });
      }
    }
    Ok(self.num_cols)
  }

  /* Column predecessors */

  /// Leaf hits of column `q` as `(row, leaf slot)`, rows in increasing
  /// order.
  fn col_leaf_hits(&self, q: usize) -> Vec<(usize, usize)> {
    let mut hits = Vec::new();
    if self.leaves.is_empty() {
      return hits
    }
    let nr = self.num_rows / self.kr;
    let nc = self.num_cols / self.kc;
    let y = q / nc;
    for i in 0..self.kr {
      self.col_hits_at(&mut hits, nr, nc, q % nc, nr * i, y + i * self.kc);
    }
    hits
  }
  fn col_hits_at(&self, hits: &mut Vec<(usize, usize)>, num_rows: usize, num_cols: usize, q: usize, p: usize, z: usize) {
    if z >= self.stems.len() {
      let slot = z - self.stems.len();
      if self.leaves[slot] != self.null {
        hits.push((p, slot));
      }
    } else if self.stems[z] {
      let nr = num_rows / self.kr;
      let nc = num_cols / self.kc;
      let y = self.ranks.rank(&self.stems, z + 1) * self.kr * self.kc + q / nc;
      for i in 0..self.kr {
        self.col_hits_at(hits, nr, nc, q % nc, p + nr * i, y + i * self.kc);
      }
    }
  }
  /// Values of the non-null cells in column `j`, in row order.
  pub fn predecessor_elements(&self, j: usize) -> Result<Vec<T>> {
    self.check_coords(0, j)?;
    Ok(
      self
        .col_leaf_hits(j)
        .into_iter()
        .map(|(_, slot)| self.leaves[slot].clone())
        .collect(),
    )
  }
  /// Rows of the non-null cells in column `j`, in increasing order.
  pub fn predecessor_positions(&self, j: usize) -> Result<Vec<usize>> {
    self.check_coords(0, j)?;
    Ok(self.col_leaf_hits(j).into_iter().map(|(row, _)| row).collect())
  }
  /// Positions and values of the non-null cells in column `j`.
  pub fn predecessor_valued_positions(&self, j: usize) -> Result<Vec<ValuedPosition<T>>> {
    self.check_coords(0, j)?;
    Ok(
      self
        .col_leaf_hits(j)
        .into_iter()
        .map(|(row, slot)| ValuedPosition::new(row, j, self.leaves[slot].clone()))
        .collect(),
    )
  }

  /* Range queries */

  /// Leaf hits inside `[p1..=p2] x [q1..=q2]` as `(row, col, leaf slot)`.
  fn range_leaf_hits(&self, p1: usize, p2: usize, q1: usize, q2: usize) -> Vec<(usize, usize, usize)> {
    let mut hits = Vec::new();
    if self.leaves.is_empty() {
      return hits
    }
    let nr = self.num_rows / self.kr;
    let nc = self.num_cols / self.kc;
    for i in p1 / nr..=p2 / nr {
      let p1p = if i == p1 / nr { p1 % nr } else { 0 };
      let p2p = if i == p2 / nr { p2 % nr } else { nr - 1 };
      for j in q1 / nc..=q2 / nc {
        let q1p = if j == q1 / nc { q1 % nc } else { 0 };
        let q2p = if j == q2 / nc { q2 % nc } else { nc - 1 };
        self.range_hits_at(&mut hits, nr, nc, p1p, p2p, q1p, q2p, nr * i, nc * j, self.kc * i + j);
      }
    }
    hits
  }
  #[allow(clippy::too_many_arguments)]
  fn range_hits_at(
    &self,
    hits: &mut Vec<(usize, usize, usize)>,
    num_rows: usize,
    num_cols: usize,
    p1: usize,
    p2: usize,
    q1: usize,
    q2: usize,
    dp: usize,
    dq: usize,
    z: usize,
  ) {
    if z >= self.stems.len() {
      let slot = z - self.stems.len();
      if self.leaves[slot] != self.null {
        hits.push((dp, dq, slot));
      }
    } else if self.stems[z] {
      let y = self.ranks.rank(&self.stems, z + 1) * self.kr * self.kc;
      let nr = num_rows / self.kr;
      let nc = num_cols / self.kc;
      for i in p1 / nr..=p2 / nr {
        let p1p = if i == p1 / nr { p1 % nr } else { 0 };
        let p2p = if i == p2 / nr { p2 % nr } else { nr - 1 };
        for j in q1 / nc..=q2 / nc {
          let q1p = if j == q1 / nc { q1 % nc } else { 0 };
          let q2p = if j == q2 / nc { q2 % nc } else { nc - 1 };
          self.range_hits_at(
            hits,
            nr,
            nc,
            p1p,
            p2p,
            q1p,
            q2p,
            dp + nr * i,
            dq + nc * j,
            y + self.kc * i + j,
          );
        }
      }
    }
  }
  /// Values of the non-null cells in `[i1..=i2] x [j1..=j2]`.
  pub fn elements_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Vec<T>> {
    self.check_range(i1, i2, j1, j2)?;
    Ok(
      self
        .range_leaf_hits(i1, i2, j1, j2)
        .into_iter()
        .map(|(_, _, slot)| self.leaves[slot].clone())
        .collect(),
    )
  }
  /// Positions of the non-null cells in `[i1..=i2] x [j1..=j2]`.
  pub fn positions_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Positions> {
    self.check_range(i1, i2, j1, j2)?;
    Ok(
      self
        .range_leaf_hits(i1, i2, j1, j2)
        .into_iter()
        .map(|(row, col, _)| (row, col))
        .collect(),
    )
  }
  /// Positions and values of the non-null cells in `[i1..=i2] x [j1..=j2]`.
  pub fn valued_positions_in_range(
    &self,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
  ) -> Result<Vec<ValuedPosition<T>>> {
    self.check_range(i1, i2, j1, j2)?;
    Ok(
      self
        .range_leaf_hits(i1, i2, j1, j2)
        .into_iter()
        .map(|(row, col, slot)| ValuedPosition::new(row, col, self.leaves[slot].clone()))
        .collect(),
    )
  }
  /// Whether `[i1..=i2] x [j1..=j2]` contains a non-null cell, stopping at
  /// the first hit. An internal node wholly inside the range answers `true`
  /// without descending further, which is where stale positives after
  /// [`KrKcTree::set_null`] come from.
  pub fn contains_element(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<bool> {
    self.check_range(i1, i2, j1, j2)?;
    if self.leaves.is_empty() {
      return Ok(false)
    }
    if i1 == 0 && j1 == 0 && i2 == self.num_rows - 1 && j2 == self.num_cols - 1 {
      return Ok(true)
    }
    let nr = self.num_rows / self.kr;
    let nc = self.num_cols / self.kc;
    for i in i1 / nr..=i2 / nr {
      let p1p = if i == i1 / nr { i1 % nr } else { 0 };
      let p2p = if i == i2 / nr { i2 % nr } else { nr - 1 };
      for j in j1 / nc..=j2 / nc {
        let q1p = if j == j1 / nc { j1 % nc } else { 0 };
        let q2p = if j == j2 / nc { j2 % nc } else { nc - 1 };
        if self.contains_at(nr, nc, p1p, p2p, q1p, q2p, self.kc * i + j) {
          return Ok(true)
        }
      }
    }
    Ok(false)
  }
  #[allow(clippy::too_many_arguments)]
  fn contains_at(&self, num_rows: usize, num_cols: usize, p1: usize, p2: usize, q1: usize, q2: usize, z: usize) -> bool {
    if z >= self.stems.len() {
      return self.leaves[z - self.stems.len()] != self.null
    }
    if self.stems[z] {
      if p1 == 0 && q1 == 0 && p2 == num_rows - 1 && q2 == num_cols - 1 {
        return true
      }
      let y = self.ranks.rank(&self.stems, z + 1) * self.kr * self.kc;
      let nr = num_rows / self.kr;
      let nc = num_cols / self.kc;
      for i in p1 / nr..=p2 / nr {
        let p1p = if i == p1 / nr { p1 % nr } else { 0 };
        let p2p = if i == p2 / nr { p2 % nr } else { nr - 1 };
        for j in q1 / nc..=q2 / nc {
          let q1p = if j == q1 / nc { q1 % nc } else { 0 };
          let q2p = if j == q2 / nc { q2 % nc } else { nc - 1 };
          if self.contains_at(nr, nc, p1p, p2p, q1p, q2p, y + self.kc * i + j) {
            return true
          }
        }
      }
    }
    false
  }
}

/* Traits */
impl<T: PartialEq> PartialEq for KrKcTree<T> {
  fn eq(&self, other: &Self) -> bool {
    self.kr == other.kr
    && self.kc == other.kc
    && self.num_rows == other.num_rows
    && self.num_cols == other.num_cols
    && self.null == other.null
    && self.stems == other.stems
    && self.leaves == other.leaves
  }
}
impl<T: Eq> Eq for KrKcTree<T> {}
impl<T: std::hash::Hash> std::hash::Hash for KrKcTree<T> {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.kr.hash(state);
    self.kc.hash(state);
    self.num_rows.hash(state);
    self.num_cols.hash(state);
    self.stems.hash(state);
    self.leaves.hash(state);
  }
}

impl<T: Clone + PartialEq> Relation<T> for KrKcTree<T> {
  fn tag(&self) -> RelationTag {
    RelationTag::Rectangular
  }
  fn num_rows(&self) -> usize {
    self.num_rows
  }
  fn num_cols(&self) -> usize {
    self.num_cols
  }
  fn null_value(&self) -> T {
    self.null.clone()
  }
  fn is_not_null(&self, i: usize, j: usize) -> Result<bool> {
    KrKcTree::is_not_null(self, i, j)
  }
  fn get_element(&self, i: usize, j: usize) -> Result<T> {
    KrKcTree::get(self, i, j)
  }
  fn successor_elements(&self, i: usize) -> Result<Vec<T>> {
    KrKcTree::successor_elements(self, i)
  }
  fn successor_positions(&self, i: usize) -> Result<Vec<usize>> {
    KrKcTree::successor_positions(self, i)
  }
  fn successor_valued_positions(&self, i: usize) -> Result<Vec<ValuedPosition<T>>> {
    KrKcTree::successor_valued_positions(self, i)
  }
  fn predecessor_elements(&self, j: usize) -> Result<Vec<T>> {
    KrKcTree::predecessor_elements(self, j)
  }
  fn predecessor_positions(&self, j: usize) -> Result<Vec<usize>> {
    KrKcTree::predecessor_positions(self, j)
  }
  fn predecessor_valued_positions(&self, j: usize) -> Result<Vec<ValuedPosition<T>>> {
    KrKcTree::predecessor_valued_positions(self, j)
  }
  fn elements_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Vec<T>> {
    KrKcTree::elements_in_range(self, i1, i2, j1, j2)
  }
  fn positions_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Positions> {
    KrKcTree::positions_in_range(self, i1, i2, j1, j2)
  }
  fn valued_positions_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Vec<ValuedPosition<T>>> {
    KrKcTree::valued_positions_in_range(self, i1, i2, j1, j2)
  }
  fn contains_element(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<bool> {
    KrKcTree::contains_element(self, i1, i2, j1, j2)
  }
  fn count_elements(&self) -> usize {
    KrKcTree::count_elements(self)
  }
  fn first_successor(&self, i: usize) -> Result<usize> {
    KrKcTree::first_successor(self, i)
  }
  fn set_null(&mut self, i: usize, j: usize) -> Result<()> {
    KrKcTree::set_null(self, i, j)
  }
}

/* Recursive query twins, kept to cross-check the iterative walks */
#[cfg(test)]
impl<T: Clone + PartialEq> KrKcTree<T> {
  fn row_leaf_hits_recursive(&self, p: usize) -> Vec<(usize, usize)> {
    let mut hits = Vec::new();
    if self.leaves.is_empty() {
      return hits
    }
    let nr = self.num_rows / self.kr;
    let nc = self.num_cols / self.kc;
    let y = self.kc * (p / nr);
    for j in 0..self.kc {
      self.row_hits_at(&mut hits, nr, nc, p % nr, nc * j, y + j);
    }
    hits
  }
  fn row_hits_at(&self, hits: &mut Vec<(usize, usize)>, num_rows: usize, num_cols: usize, p: usize, q: usize, z: usize) {
    if z >= self.stems.len() {
      let slot = z - self.stems.len();
      if self.leaves[slot] != self.null {
        hits.push((q, slot));
      }
    } else if self.stems[z] {
      let nr = num_rows / self.kr;
      let nc = num_cols / self.kc;
      let y = self.ranks.rank(&self.stems, z + 1) * self.kr * self.kc + self.kc * (p / nr);
      for j in 0..self.kc {
        self.row_hits_at(hits, nr, nc, p % nr, q + nc * j, y + j);
      }
    }
  }
  fn first_successor_recursive(&self, p: usize) -> usize {
    let mut pos = self.num_cols;
    if !self.leaves.is_empty() {
      let nr = self.num_rows / self.kr;
      let nc = self.num_cols / self.kc;
      let y = self.kc * (p / nr);
      for j in 0..self.kc {
        if pos != self.num_cols {
          break
        }
        pos = self.first_successor_at(nr, nc, p % nr, nc * j, y + j);
      }
    }
    pos
  }
  fn first_successor_at(&self, num_rows: usize, num_cols: usize, p: usize, q: usize, z: usize) -> usize {
    let mut pos = self.num_cols;
    if z >= self.stems.len() {
      if self.leaves[z - self.stems.len()] != self.null {
        pos = q;
      }
    } else if self.stems[z] {
      let nr = num_rows / self.kr;
      let nc = num_cols / self.kc;
      let y = self.ranks.rank(&self.stems, z + 1) * self.kr * self.kc + self.kc * (p / nr);
      for j in 0..self.kc {
        if pos != self.num_cols {
          break
        }
        pos = self.first_successor_at(nr, nc, p % nr, q + nc * j, y + j);
      }
    }
    pos
  }
}

/* Public Interface Tests */

#[cfg(test)]
mod misc {
  use super::*;
  use rand::Rng;

  #[test]
  fn flood() -> Result<()> {
    let mut rng = rand::thread_rng();
    for &(kr, kc) in &[(2, 2), (2, 3), (3, 2)] {
      let rows = 20;
      let cols = 26;
      let mut mat = Matrix::filled(rows, cols, 0u16);
      for _ in 0..60 {
        let i = rng.gen_range(0..rows);
        let j = rng.gen_range(0..cols);
        mat.set(i, j, rng.gen_range(1..=u16::MAX)).unwrap();
      }
      let lists: Vec<RelationList<u16>> = (0..rows)
        .map(|i| (0..cols).filter(|&j| mat[(i, j)] != 0).map(|j| (j, mat[(i, j)])).collect())
        .collect();
      let mut pairs: Vec<ValuedPosition<u16>> = lists
        .iter()
        .enumerate()
        .flat_map(|(i, row)| row.iter().map(move |&(j, v)| ValuedPosition::new(i, j, v)))
        .collect();
      let trees = vec![
        KrKcTree::from_matrix(&mat, kr, kc, 0).unwrap(),
        KrKcTree::from_lists(&lists, kr, kc, ListBuildMode::Recursive, 0).unwrap(),
        KrKcTree::from_lists(&lists, kr, kc, ListBuildMode::ScratchTree, 0).unwrap(),
        KrKcTree::from_lists(&lists, kr, kc, ListBuildMode::DynamicBitmaps, 0).unwrap(),
        KrKcTree::from_pairs(&mut pairs, kr, kc, 0).unwrap(),
      ];
      let expected_count = lists.iter().map(Vec::len).sum::<usize>();
      for tree in &trees {
        assert_eq!(&trees[0].stems, &tree.stems);
        assert_eq!(&trees[0].leaves, &tree.leaves);
        assert_eq!(expected_count, tree.count_elements());
        assert_eq!(0, tree.stems.len() % (kr * kc));
        assert_eq!(0, tree.leaves.len() % (kr * kc));
        assert_eq!(tree.stems.count_ones(), tree.ranks.rank(&tree.stems, tree.stems.len()));
        for i in 0..rows {
          for j in 0..cols {
            assert_eq!(mat[(i, j)], tree.get(i, j)?);
          }
        }
        for i in 0..tree.num_rows {
          let expected: Vec<usize> = (0..cols)
            .filter(|&j| i < rows && mat[(i, j)] != 0)
            .collect();
          assert_eq!(expected, tree.successor_positions(i)?);
        }
      }
    }
    Ok(())
  }
  #[test]
  fn is_send_and_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<KrKcTree<u64>>();
    assert_sync::<KrKcTree<u64>>();
  }
}

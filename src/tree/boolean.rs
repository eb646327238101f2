use {
  bitvec::vec::BitVec,
  std::collections::VecDeque,
  crate::bits::RankIndex,
  crate::error::K2TreeError as Error,
  crate::matrix::Matrix,
  crate::relation::{Positions, Relation, RelationTag, ValuedPosition},
  crate::tree::generic::ListBuildMode,
  super::*,
};

type Result<T> = std::result::Result<T, Error>;

/// Boolean specialisation of [`KrKcTree`](crate::KrKcTree).
///
/// Behaves exactly like the generic tree with `T = bool` and `null = false`,
/// but packs the leaf level into the same kind of bit vector as the stems, so
/// a cell costs one bit instead of one byte. "Non-null" and "true" coincide;
/// the element variants of the enumeration queries therefore only ever yield
/// `true` and counting reduces to a popcount.
#[derive(Debug, Clone)]
pub struct KrKcBitTree {
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
  /// Child-presence bits of all internal levels, concatenated in level
  /// order.
  pub stems: BitVec,
  /// Packed cell bits of the non-empty leaf blocks, in the same order.
  pub leaves: BitVec,
  /// Rank index over the stems. A cached view: it is rebuilt whenever the
  /// stems are replaced.
  pub ranks: RankIndex,
}

/* Construction */
impl KrKcBitTree {
  fn with_shape(h: usize, kr: usize, kc: usize) -> Self {
    KrKcBitTree {
      h,
      kr,
      kc,
      num_rows: kr.pow(h as u32),
      num_cols: kc.pow(h as u32),
      stems: BitVec::new(),
      leaves: BitVec::new(),
      ranks: RankIndex::new(&BitVec::new()),
    }
  }
  fn reseat_ranks(&mut self) {
    self.ranks = RankIndex::new(&self.stems);
  }

  /// Builds a tree from a dense boolean matrix.
  pub fn from_matrix(mat: &Matrix<bool>, kr: usize, kc: usize) -> Result<Self> {
    check_arities(kr, kc)?;
    let h = std::cmp::max(1, std::cmp::max(log_k(mat.rows, kr), log_k(mat.cols, kc)));
    let mut tree = Self::with_shape(h, kr, kc);
    tree.build_from_matrix(mat, 0, 0);
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Windowed form of [`KrKcBitTree::from_matrix`].
  #[allow(clippy::too_many_arguments)]
  pub fn from_matrix_window(
    mat: &Matrix<bool>,
    x: usize,
    y: usize,
    nr: usize,
    nc: usize,
    kr: usize,
    kc: usize,
  ) -> Result<Self> {
    check_arities(kr, kc)?;
    let h = std::cmp::max(1, std::cmp::max(log_k(nr, kr), log_k(nc, kc)));
    let mut tree = Self::with_shape(h, kr, kc);
    check_window(nr, nc, kr, kc, h, tree.num_rows, tree.num_cols)?;
    tree.build_from_matrix(mat, x, y);
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Builds a tree from row-wise lists of set columns, sorted ascending.
  pub fn from_lists(lists: &[Vec<usize>], kr: usize, kc: usize, mode: ListBuildMode) -> Result<Self> {
    check_arities(kr, kc)?;
    let mut max_col = 0;
    for row in lists {
      for &col in row {
        max_col = std::cmp::max(max_col, col);
      }
    }
    let h = std::cmp::max(1, std::cmp::max(log_k(lists.len(), kr), log_k(max_col + 1, kc)));
    let mut tree = Self::with_shape(h, kr, kc);
    tree.build_from_lists(lists, 0, 0, mode);
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Windowed form of [`KrKcBitTree::from_lists`]; column indices stay
  /// absolute, entries outside the window are ignored.
  #[allow(clippy::too_many_arguments)]
  pub fn from_lists_window(
    lists: &[Vec<usize>],
    x: usize,
    y: usize,
    nr: usize,
    nc: usize,
    kr: usize,
    kc: usize,
    mode: ListBuildMode,
  ) -> Result<Self> {
    check_arities(kr, kc)?;
    let h = std::cmp::max(1, std::cmp::max(log_k(nr, kr), log_k(nc, kc)));
    let mut tree = Self::with_shape(h, kr, kc);
    check_window(nr, nc, kr, kc, h, tree.num_rows, tree.num_cols)?;
    tree.build_from_lists(lists, x, y, mode);
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Builds a tree from a flat list of set positions in arbitrary order.
  /// The slice is reordered in place.
  pub fn from_pairs(pairs: &mut [(usize, usize)], kr: usize, kc: usize) -> Result<Self> {
    check_arities(kr, kc)?;
    let mut max_row = 0;
    let mut max_col = 0;
    for &(row, col) in pairs.iter() {
      max_row = std::cmp::max(max_row, row);
      max_col = std::cmp::max(max_col, col);
    }
    let h = std::cmp::max(1, std::cmp::max(log_k(max_row + 1, kr), log_k(max_col + 1, kc)));
    let mut tree = Self::with_shape(h, kr, kc);
    if !pairs.is_empty() {
      let right = pairs.len();
      tree.build_from_pairs(pairs, 0, 0, tree.num_rows, tree.num_cols, 0, right);
    }
    tree.reseat_ranks();
    Ok(tree)
  }
  /// Windowed form of [`KrKcBitTree::from_pairs`]: only the pair range
  /// `[left, right)` is used, and every pair in it must lie inside the
  /// `nr x nc` window at `(x, y)`.
  #[allow(clippy::too_many_arguments)]
  pub fn from_pairs_window(
    pairs: &mut [(usize, usize)],
    x: usize,
    y: usize,
    nr: usize,
    nc: usize,
    left: usize,
    right: usize,
    kr: usize,
    kc: usize,
  ) -> Result<Self> {
    check_arities(kr, kc)?;
    let h = std::cmp::max(1, std::cmp::max(log_k(nr, kr), log_k(nc, kc)));
    let mut tree = Self::with_shape(h, kr, kc);
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

  fn build_from_matrix(&mut self, mat: &Matrix<bool>, x: usize, y: usize) {
    let mut levels = vec![BitVec::new(); self.h - 1];
    self.matrix_block(mat, &mut levels, self.num_rows, self.num_cols, 1, x, y);
    self.finish_levels(levels);
  }
  fn matrix_block(
    &mut self,
    mat: &Matrix<bool>,
    levels: &mut [BitVec],
    num_rows: usize,
    num_cols: usize,
    l: usize,
    p: usize,
    q: usize,
  ) -> bool {
    if l == self.h {
      let mut block: BitVec = BitVec::with_capacity(self.kr * self.kc);
      for i in 0..self.kr {
        for j in 0..self.kc {
          block.push(p + i < mat.rows && q + j < mat.cols && mat[(p + i, q + j)]);
        }
      }
      if block.not_any() {
        false
      } else {
        self.leaves.extend_from_bitslice(&block);
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

  fn build_from_lists(&mut self, lists: &[Vec<usize>], x: usize, y: usize, mode: ListBuildMode) {
    match mode {
      ListBuildMode::Recursive => self.build_from_lists_cursors(lists, x, y),
      ListBuildMode::ScratchTree => self.build_from_lists_via_tree(lists, x, y),
      ListBuildMode::DynamicBitmaps => self.build_from_lists_dynamic(lists, x, y),
    }
  }
  fn build_from_lists_cursors(&mut self, lists: &[Vec<usize>], x: usize, y: usize) {
    let mut levels = vec![BitVec::new(); self.h - 1];
    let mut cursors: Vec<usize> = lists
      .iter()
      .map(|row| {
        let mut c = 0;
        while c < row.len() && row[c] < y {
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
    lists: &[Vec<usize>],
    cursors: &mut [usize],
    levels: &mut [BitVec],
    num_rows: usize,
    num_cols: usize,
    l: usize,
    p: usize,
    q: usize,
  ) -> bool {
    if l == self.h {
      let mut block: BitVec = BitVec::with_capacity(self.kr * self.kc);
      for i in 0..self.kr {
        for j in 0..self.kc {
          let row = p + i;
          let set = row < lists.len()
            && cursors[row] < lists[row].len()
            && lists[row][cursors[row]] == q + j;
          if set {
            cursors[row] += 1;
          }
          block.push(set);
        }
      }
      if block.not_any() {
        false
      } else {
        self.leaves.extend_from_bitslice(&block);
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
  fn build_from_lists_via_tree(&mut self, lists: &[Vec<usize>], x: usize, y: usize) {
    let mut root = ScratchNode::Leaf(false);
    for i in x..std::cmp::min(x + self.num_rows, lists.len()) {
      for &col in &lists[i] {
        if y <= col && col < y + self.num_cols {
          scratch_insert(
            &mut root,
            self.num_rows,
            self.num_cols,
            self.kr,
            self.kc,
            i - x,
            col - y,
            true,
            &false,
          );
        }
      }
    }
    if !root.is_leaf() {
      let mut stems = BitVec::new();
      let mut queue: VecDeque<&ScratchNode<bool>> = VecDeque::new();
      queue.push_back(&root);
      while let Some(node) = queue.pop_front() {
        for slot in 0..self.kr * self.kc {
          match node.child(slot) {
            Some(ScratchNode::Leaf(bit)) => self.leaves.push(*bit),
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
  fn build_from_lists_dynamic(&mut self, lists: &[Vec<usize>], x: usize, y: usize) {
    if self.h == 1 {
      let mut block = BitVec::repeat(false, self.kr * self.kc);
      for i in x..std::cmp::min(x + self.num_rows, lists.len()) {
        for &col in &lists[i] {
          if y <= col && col < y + self.num_cols {
            block.set((i - x) * self.kc + (col - y), true);
          }
        }
      }
      if block.any() {
        self.leaves = block;
      }
    } else {
      let mut stems = BitVec::new();
      let mut ranks = NaiveDynamicRank::new_zeroed(0);
      for i in x..std::cmp::min(x + self.num_rows, lists.len()) {
        for &col in &lists[i] {
          if y <= col && col < y + self.num_cols {
            self.insert_dynamic(&mut stems, &mut ranks, i - x, col - y);
          }
        }
      }
      self.stems = stems;
    }
  }
  fn insert_dynamic(&mut self, stems: &mut BitVec, ranks: &mut NaiveDynamicRank, p: usize, q: usize) {
    if stems.is_empty() {
      *stems = BitVec::repeat(false, self.kr * self.kc);
      *ranks = NaiveDynamicRank::new_zeroed(self.kr * self.kc);
    }
    let nr = self.num_rows / self.kr;
    let nc = self.num_cols / self.kc;
    let z = (p / nr) * self.kc + q / nc;
    self.insert_dynamic_at(stems, ranks, nr, nc, p % nr, q % nc, z, 1);
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
          self.leaves.insert(at, false);
        }
        self.leaves.set(y - stems.len(), true);
      } else {
        let at = ranks.rank(z + 1) * block;
        for _ in 0..block {
          stems.insert(at, false);
        }
        ranks.insert(at + 1, block);
        self.insert_dynamic_at(stems, ranks, nr, nc, p % nr, q % nc, y, l + 1);
      }
    } else {
      let y = ranks.rank(z + 1) * block + (p / nr) * self.kc + q / nc;
      if l + 1 == self.h {
        self.leaves.set(y - stems.len(), true);
      } else {
        self.insert_dynamic_at(stems, ranks, nr, nc, p % nr, q % nc, y, l + 1);
      }
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn build_from_pairs(
    &mut self,
    pairs: &mut [(usize, usize)],
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
        let mut bits: BitVec = BitVec::repeat(false, block);
        for &(row, col) in &pairs[sp.left..sp.right] {
          bits.set((row - sp.first_row) * self.kc + (col - sp.first_col), true);
        }
        self.leaves.extend_from_bitslice(&bits);
      }
    }
    self.stems = stems;
  }
  fn counting_sort(
    &self,
    pairs: &mut [(usize, usize)],
    intervals: &mut [(usize, usize)],
    sp: &Subproblem,
    width_row: usize,
    width_col: usize,
  ) {
    let key = |&(row, col): &(usize, usize)| {
      ((row - sp.first_row) / width_row) * self.kc + (col - sp.first_col) / width_col
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
impl KrKcBitTree {
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

  /// The bit at cell `(i, j)`. Padded cells read as false.
  pub fn get(&self, i: usize, j: usize) -> Result<bool> {
    self.check_coords(i, j)?;
    Ok(match self.top_leaf_slot(i, j) {
      Some(slot) => self.leaves[slot],
      None => false,
    })
  }
  /// Identical to [`KrKcBitTree::get`]: a cell is non-null iff its bit is
  /// set.
  pub fn is_not_null(&self, i: usize, j: usize) -> Result<bool> {
    self.get(i, j)
  }
  /// Clears the bit at cell `(i, j)` without touching the child-presence
  /// bits above it; the same staleness caveat as for the generic tree
  /// applies.
  pub fn set_null(&mut self, i: usize, j: usize) -> Result<()> {
    self.check_coords(i, j)?;
    if let Some(slot) = self.top_leaf_slot(i, j) {
      self.leaves.set(slot, false);
    }
    Ok(())
  }
  /// Number of set cells, a popcount over the leaves.
  pub fn count_elements(&self) -> usize {
    self.leaves.count_ones()
  }

  /* Row successors */

  fn row_leaf_hits(&self, p: usize) -> Vec<usize> {
    let mut hits = Vec::new();
    if self.leaves.is_empty() {
      return hits
    }
    let len_t = self.stems.len();
    if len_t == 0 {
      let offset = p * self.num_cols;
      for j in 0..self.num_cols {
        if self.leaves[offset + j] {
          hits.push(j);
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
          if self.leaves[y + j] {
            hits.push(cur.dq + j * nc);
          }
        }
      }
    }
    hits
  }
  /// `true` once per set cell of row `i`; kept for parity with the generic
  /// element queries.
  pub fn successor_elements(&self, i: usize) -> Result<Vec<bool>> {
    Ok(vec![true; self.successor_positions(i)?.len()])
  }
  /// Columns of the set cells in row `i`, in increasing order.
  pub fn successor_positions(&self, i: usize) -> Result<Vec<usize>> {
    self.check_coords(i, 0)?;
    Ok(self.row_leaf_hits(i))
  }
  /// Positions of the set cells in row `i`, with `true` values.
  pub fn successor_valued_positions(&self, i: usize) -> Result<Vec<ValuedPosition<bool>>> {
    Ok(
      self
        .successor_positions(i)?
        .into_iter()
        .map(|col| ValuedPosition::new(i, col, true))
        .collect(),
    )
  }
  /// Smallest set column of row `i`, or `num_cols` for an empty row.
  pub fn first_successor(&self, i: usize) -> Result<usize> {
    self.check_coords(i, 0)?;
    if self.leaves.is_empty() {
      return Ok(self.num_cols)
    }
    if self.stems.is_empty() {
      let offset = i * self.num_cols;
      for j in 0..self.num_cols {
        if self.leaves[offset + j] {
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
        if self.leaves[frame.z - self.stems.len()] {
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

  fn col_leaf_hits(&self, q: usize) -> Vec<usize> {
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
  fn col_hits_at(&self, hits: &mut Vec<usize>, num_rows: usize, num_cols: usize, q: usize, p: usize, z: usize) {
    if z >= self.stems.len() {
      if self.leaves[z - self.stems.len()] {
        hits.push(p);
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
  /// `true` once per set cell of column `j`.
  pub fn predecessor_elements(&self, j: usize) -> Result<Vec<bool>> {
    Ok(vec![true; self.predecessor_positions(j)?.len()])
  }
  /// Rows of the set cells in column `j`, in increasing order.
  pub fn predecessor_positions(&self, j: usize) -> Result<Vec<usize>> {
    self.check_coords(0, j)?;
    Ok(self.col_leaf_hits(j))
  }
  /// Positions of the set cells in column `j`, with `true` values.
  pub fn predecessor_valued_positions(&self, j: usize) -> Result<Vec<ValuedPosition<bool>>> {
    Ok(
      self
        .predecessor_positions(j)?
        .into_iter()
        .map(|row| ValuedPosition::new(row, j, true))
        .collect(),
    )
  }

  /* Range queries */

  fn range_leaf_hits(&self, p1: usize, p2: usize, q1: usize, q2: usize) -> Positions {
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
    hits: &mut Positions,
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
      if self.leaves[z - self.stems.len()] {
        hits.push((dp, dq));
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
  /// `true` once per set cell in the range.
  pub fn elements_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Vec<bool>> {
    Ok(vec![true; self.positions_in_range(i1, i2, j1, j2)?.len()])
  }
  /// Positions of the set cells in `[i1..=i2] x [j1..=j2]`.
  pub fn positions_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Positions> {
    self.check_range(i1, i2, j1, j2)?;
    Ok(self.range_leaf_hits(i1, i2, j1, j2))
  }
  /// Positions of the set cells in the range, with `true` values.
  pub fn valued_positions_in_range(
    &self,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
  ) -> Result<Vec<ValuedPosition<bool>>> {
    Ok(
      self
        .positions_in_range(i1, i2, j1, j2)?
        .into_iter()
        .map(|(row, col)| ValuedPosition::new(row, col, true))
        .collect(),
    )
  }
  /// Whether the range contains a set cell, with the same whole-node
  /// short-circuit (and post-`set_null` staleness) as the generic tree.
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
      return self.leaves[z - self.stems.len()]
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
impl PartialEq for KrKcBitTree {
  fn eq(&self, other: &Self) -> bool {
    self.kr == other.kr
    && self.kc == other.kc
    && self.num_rows == other.num_rows
    && self.num_cols == other.num_cols
    && self.stems == other.stems
    && self.leaves == other.leaves
  }
}
impl Eq for KrKcBitTree {}
impl std::hash::Hash for KrKcBitTree {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.kr.hash(state);
    self.kc.hash(state);
    self.num_rows.hash(state);
    self.num_cols.hash(state);
    self.stems.hash(state);
    self.leaves.hash(state);
  }
}

impl Relation<bool> for KrKcBitTree {
  fn tag(&self) -> RelationTag {
    RelationTag::RectangularBits
  }
  fn num_rows(&self) -> usize {
    self.num_rows
  }
  fn num_cols(&self) -> usize {
    self.num_cols
  }
  fn null_value(&self) -> bool {
    false
  }
  fn is_not_null(&self, i: usize, j: usize) -> Result<bool> {
    KrKcBitTree::is_not_null(self, i, j)
  }
  fn get_element(&self, i: usize, j: usize) -> Result<bool> {
    KrKcBitTree::get(self, i, j)
  }
  fn successor_elements(&self, i: usize) -> Result<Vec<bool>> {
    KrKcBitTree::successor_elements(self, i)
  }
  fn successor_positions(&self, i: usize) -> Result<Vec<usize>> {
    KrKcBitTree::successor_positions(self, i)
  }
  fn successor_valued_positions(&self, i: usize) -> Result<Vec<ValuedPosition<bool>>> {
    KrKcBitTree::successor_valued_positions(self, i)
  }
  fn predecessor_elements(&self, j: usize) -> Result<Vec<bool>> {
    KrKcBitTree::predecessor_elements(self, j)
  }
  fn predecessor_positions(&self, j: usize) -> Result<Vec<usize>> {
    KrKcBitTree::predecessor_positions(self, j)
  }
  fn predecessor_valued_positions(&self, j: usize) -> Result<Vec<ValuedPosition<bool>>> {
    KrKcBitTree::predecessor_valued_positions(self, j)
  }
  fn elements_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Vec<bool>> {
    KrKcBitTree::elements_in_range(self, i1, i2, j1, j2)
  }
  fn positions_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Positions> {
    KrKcBitTree::positions_in_range(self, i1, i2, j1, j2)
  }
  fn valued_positions_in_range(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Vec<ValuedPosition<bool>>> {
    KrKcBitTree::valued_positions_in_range(self, i1, i2, j1, j2)
  }
  fn contains_element(&self, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<bool> {
    KrKcBitTree::contains_element(self, i1, i2, j1, j2)
  }
  fn count_elements(&self) -> usize {
    KrKcBitTree::count_elements(self)
  }
  fn first_successor(&self, i: usize) -> Result<usize> {
    KrKcBitTree::first_successor(self, i)
  }
  fn set_null(&mut self, i: usize, j: usize) -> Result<()> {
    KrKcBitTree::set_null(self, i, j)
  }
}

/* Public Interface Tests */
#[cfg(test)]
mod api {
  use super::*;
  use crate::KrKcTree;
  use bitvec::prelude::*;

  fn bit_matrix(cells: &[(usize, usize)], rows: usize, cols: usize) -> Matrix<bool> {
    let mut mat = Matrix::filled(rows, cols, false);
    for &(i, j) in cells {
      mat.set(i, j, true).unwrap();
    }
    mat
  }
  fn all_modes(mat: &Matrix<bool>, kr: usize, kc: usize) -> Vec<KrKcBitTree> {
    let lists: Vec<Vec<usize>> = (0..mat.rows)
      .map(|i| (0..mat.cols).filter(|&j| mat[(i, j)]).collect())
      .collect();
    let mut pairs: Vec<(usize, usize)> = (0..mat.rows)
      .flat_map(|i| (0..mat.cols).filter(move |&j| mat[(i, j)]).map(move |j| (i, j)))
      .collect();
    vec![
      KrKcBitTree::from_matrix(mat, kr, kc).unwrap(),
      KrKcBitTree::from_lists(&lists, kr, kc, ListBuildMode::Recursive).unwrap(),
      KrKcBitTree::from_lists(&lists, kr, kc, ListBuildMode::ScratchTree).unwrap(),
      KrKcBitTree::from_lists(&lists, kr, kc, ListBuildMode::DynamicBitmaps).unwrap(),
      KrKcBitTree::from_pairs(&mut pairs, kr, kc).unwrap(),
    ]
  }

  #[test]
  fn two_level_tree_single_cell() -> Result<()> {
    let mat = bit_matrix(&[(3, 3)], 4, 4);
    let tree = KrKcBitTree::from_matrix(&mat, 2, 2)?;
    assert_eq!(2, tree.h);
    assert_eq!(bitvec![0, 0, 0, 1], tree.stems);
    assert_eq!(bitvec![0, 0, 0, 1], tree.leaves);
    assert!(tree.get(3, 3)?);
    assert!(!tree.get(0, 0)?);
    assert_eq!(vec![3], tree.successor_positions(3)?);
    assert_eq!(vec![3], tree.predecessor_positions(3)?);
    assert_eq!(1, tree.count_elements());
    Ok(())
  }
  #[test]
  fn empty_relation() -> Result<()> {
    let mat = Matrix::filled(4, 4, false);
    for tree in all_modes(&mat, 2, 2) {
      assert!(tree.stems.is_empty());
      assert!(tree.leaves.is_empty());
      assert_eq!(0, tree.count_elements());
      assert!(!tree.contains_element(0, 3, 0, 3)?);
      assert_eq!(4, tree.first_successor(0)?);
    }
    Ok(())
  }
  #[test]
  fn mode_equivalence() -> Result<()> {
    let mat = bit_matrix(&[(0, 0), (0, 1), (2, 3), (3, 2), (5, 7)], 8, 8);
    let trees = all_modes(&mat, 2, 2);
    for tree in &trees {
      assert_eq!(trees[0].stems, tree.stems);
      assert_eq!(trees[0].leaves, tree.leaves);
      assert_eq!(5, tree.count_elements());
      for i in 0..8 {
        for j in 0..8 {
          assert_eq!(mat[(i, j)], tree.get(i, j)?);
        }
        let expected: Vec<usize> = (0..8).filter(|&j| mat[(i, j)]).collect();
        assert_eq!(expected, tree.successor_positions(i)?);
        assert_eq!(expected.first().copied().unwrap_or(8), tree.first_successor(i)?);
      }
    }
    Ok(())
  }
  #[test]
  fn matches_generic_bool_tree() -> Result<()> {
    let mat = bit_matrix(&[(0, 5), (1, 4), (1, 7), (4, 0), (5, 4), (2, 6)], 8, 8);
    let packed = KrKcBitTree::from_matrix(&mat, 2, 2)?;
    let generic = KrKcTree::from_matrix(&mat, 2, 2, false)?;
    assert_eq!(generic.stems, packed.stems);
    assert_eq!(generic.leaves.len(), packed.leaves.len());
    for (slot, &value) in generic.leaves.iter().enumerate() {
      assert_eq!(value, packed.leaves[slot]);
    }
    assert_eq!(generic.count_elements(), packed.count_elements());
    for i in 0..8 {
      assert_eq!(generic.successor_positions(i)?, packed.successor_positions(i)?);
      assert_eq!(generic.first_successor(i)?, packed.first_successor(i)?);
      assert_eq!(generic.predecessor_positions(i)?, packed.predecessor_positions(i)?);
      for j in 0..8 {
        assert_eq!(generic.get(i, j)?, packed.get(i, j)?);
      }
    }
    let mut generic_range = generic.positions_in_range(1, 6, 2, 7)?;
    let mut packed_range = packed.positions_in_range(1, 6, 2, 7)?;
    generic_range.sort_unstable();
    packed_range.sort_unstable();
    assert_eq!(generic_range, packed_range);
    Ok(())
  }
  #[test]
  fn set_null_clears_bit_but_not_structure() -> Result<()> {
    let mat = bit_matrix(&[(2, 2), (2, 3)], 4, 4);
    let mut tree = KrKcBitTree::from_matrix(&mat, 2, 2)?;
    tree.set_null(2, 2)?;
    tree.set_null(2, 3)?;
    assert_eq!(0, tree.count_elements());
    assert!(tree.positions_in_range(2, 3, 2, 3)?.is_empty());
    // the quadrant's presence bit is still set
    assert!(tree.contains_element(2, 3, 2, 3)?);
    Ok(())
  }
  #[test]
  fn windowed_construction() -> Result<()> {
    let mat = bit_matrix(&[(0, 0), (1, 1), (2, 4), (4, 4), (5, 5)], 6, 6);
    let tree = KrKcBitTree::from_matrix_window(&mat, 1, 1, 4, 4, 2, 2)?;
    for i in 0..4 {
      for j in 0..4 {
        assert_eq!(mat[(1 + i, 1 + j)], tree.get(i, j)?);
      }
    }
    assert_eq!(3, tree.count_elements());
    assert!(KrKcBitTree::from_matrix_window(&mat, 1, 1, 5, 5, 2, 2).is_err());
    Ok(())
  }
  #[test]
  fn relation_trait_surface() -> Result<()> {
    let mat = bit_matrix(&[(1, 2)], 4, 4);
    let mut tree = KrKcBitTree::from_matrix(&mat, 2, 2)?;
    let relation: &mut dyn Relation<bool> = &mut tree;
    assert_eq!(RelationTag::RectangularBits, relation.tag());
    assert!(!relation.null_value());
    assert!(relation.are_related(1, 2)?);
    assert_eq!(vec![2], relation.successors(1)?);
    assert_eq!(vec![(1, 2)], relation.range(0, 3, 0, 3)?);
    assert_eq!(vec![true], relation.all_elements());
    assert_eq!(1, relation.count_links());
    Ok(())
  }
}

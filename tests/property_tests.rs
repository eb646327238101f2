use k2_rect::matrix::Matrix;
use k2_rect::relation::{Relation, RelationList, ValuedPosition};
use k2_rect::{KrKcBitTree, KrKcTree, ListBuildMode};
use proptest::prelude::*;

fn sparse_matrix(rows: usize, cols: usize, cells: &[(usize, usize, u8)]) -> Matrix<u8> {
  let mut mat = Matrix::filled(rows, cols, 0u8);
  for &(i, j, v) in cells {
    mat.set(i % rows, j % cols, v).unwrap();
  }
  mat
}

fn build_all_modes(mat: &Matrix<u8>, kr: usize, kc: usize) -> Vec<KrKcTree<u8>> {
  let lists: Vec<RelationList<u8>> = (0..mat.rows)
    .map(|i| {
      (0..mat.cols)
        .filter(|&j| mat[(i, j)] != 0)
        .map(|j| (j, mat[(i, j)]))
        .collect()
    })
    .collect();
  let mut pairs: Vec<ValuedPosition<u8>> = lists
    .iter()
    .enumerate()
    .flat_map(|(i, row)| row.iter().map(move |&(j, v)| ValuedPosition::new(i, j, v)))
    .collect();
  vec![
    KrKcTree::from_matrix(mat, kr, kc, 0).unwrap(),
    KrKcTree::from_lists(&lists, kr, kc, ListBuildMode::Recursive, 0).unwrap(),
    KrKcTree::from_lists(&lists, kr, kc, ListBuildMode::ScratchTree, 0).unwrap(),
    KrKcTree::from_lists(&lists, kr, kc, ListBuildMode::DynamicBitmaps, 0).unwrap(),
    KrKcTree::from_pairs(&mut pairs, kr, kc, 0).unwrap(),
  ]
}

proptest! {
  #[test]
  fn every_mode_round_trips_every_cell(
    rows in 1..18usize,
    cols in 1..18usize,
    kr in 2..5usize,
    kc in 2..5usize,
    cells in prop::collection::vec((any::<usize>(), any::<usize>(), 1..=255u8), 0..48),
  ) {
    let mat = sparse_matrix(rows, cols, &cells);
    let trees = build_all_modes(&mat, kr, kc);
    let expected_count = (0..rows)
      .flat_map(|i| (0..cols).map(move |j| (i, j)))
      .filter(|&(i, j)| mat[(i, j)] != 0)
      .count();
    for tree in &trees {
      // identical packed output regardless of the construction algorithm
      prop_assert_eq!(&trees[0].stems, &tree.stems);
      prop_assert_eq!(&trees[0].leaves, &tree.leaves);
      // rank invariant and block-aligned leaves
      prop_assert_eq!(
        tree.stems.count_ones(),
        tree.ranks.rank(&tree.stems, tree.stems.len())
      );
      prop_assert_eq!(0, tree.leaves.len() % (kr * kc));
      prop_assert_eq!(expected_count, tree.count_elements());
      // per-cell round trip, padding included
      for i in 0..tree.num_rows {
        for j in 0..tree.num_cols {
          let expected = if i < rows && j < cols { mat[(i, j)] } else { 0 };
          prop_assert_eq!(expected, tree.get(i, j).unwrap());
        }
      }
    }
  }

  #[test]
  fn neighbourhoods_match_the_matrix(
    rows in 1..18usize,
    cols in 1..18usize,
    kr in 2..4usize,
    kc in 2..4usize,
    cells in prop::collection::vec((any::<usize>(), any::<usize>(), 1..=255u8), 0..40),
  ) {
    let mat = sparse_matrix(rows, cols, &cells);
    let tree = KrKcTree::from_matrix(&mat, kr, kc, 0).unwrap();
    for i in 0..tree.num_rows {
      let expected: Vec<usize> = (0..cols)
        .filter(|&j| i < rows && mat[(i, j)] != 0)
        .collect();
      prop_assert_eq!(&expected, &tree.successor_positions(i).unwrap());
      let first = expected.first().copied().unwrap_or(tree.num_cols);
      prop_assert_eq!(first, tree.first_successor(i).unwrap());
    }
    for j in 0..tree.num_cols {
      let expected: Vec<usize> = (0..rows)
        .filter(|&i| j < cols && mat[(i, j)] != 0)
        .collect();
      prop_assert_eq!(&expected, &tree.predecessor_positions(j).unwrap());
    }
  }

  #[test]
  fn ranges_match_the_matrix(
    rows in 1..18usize,
    cols in 1..18usize,
    corners in (any::<usize>(), any::<usize>(), any::<usize>(), any::<usize>()),
    cells in prop::collection::vec((any::<usize>(), any::<usize>(), 1..=255u8), 0..40),
  ) {
    let mat = sparse_matrix(rows, cols, &cells);
    let tree = KrKcTree::from_matrix(&mat, 2, 2, 0).unwrap();
    let (a, b, c, d) = corners;
    let (i1, i2) = {
      let (a, b) = (a % tree.num_rows, b % tree.num_rows);
      (a.min(b), a.max(b))
    };
    let (j1, j2) = {
      let (c, d) = (c % tree.num_cols, d % tree.num_cols);
      (c.min(d), c.max(d))
    };
    let mut expected: Vec<(usize, usize)> = (i1..=i2)
      .flat_map(|i| (j1..=j2).map(move |j| (i, j)))
      .filter(|&(i, j)| i < rows && j < cols && mat[(i, j)] != 0)
      .collect();
    expected.sort_unstable();
    let mut got = tree.positions_in_range(i1, i2, j1, j2).unwrap();
    got.sort_unstable();
    prop_assert_eq!(&expected, &got);
    // membership agrees with enumeration
    prop_assert_eq!(
      !expected.is_empty(),
      tree.contains_element(i1, i2, j1, j2).unwrap()
    );
    for vp in tree.valued_positions_in_range(i1, i2, j1, j2).unwrap() {
      prop_assert_eq!(mat[(vp.row, vp.col)], vp.value);
    }
  }

  #[test]
  fn packed_bool_tree_matches_generic(
    rows in 1..18usize,
    cols in 1..18usize,
    kr in 2..4usize,
    kc in 2..4usize,
    cells in prop::collection::vec((any::<usize>(), any::<usize>()), 0..40),
  ) {
    let mut mat = Matrix::filled(rows, cols, false);
    for &(i, j) in &cells {
      mat.set(i % rows, j % cols, true).unwrap();
    }
    let lists: Vec<Vec<usize>> = (0..rows)
      .map(|i| (0..cols).filter(|&j| mat[(i, j)]).collect())
      .collect();
    let generic = KrKcTree::from_matrix(&mat, kr, kc, false).unwrap();
    for packed in [
      KrKcBitTree::from_matrix(&mat, kr, kc).unwrap(),
      KrKcBitTree::from_lists(&lists, kr, kc, ListBuildMode::Recursive).unwrap(),
      KrKcBitTree::from_lists(&lists, kr, kc, ListBuildMode::ScratchTree).unwrap(),
      KrKcBitTree::from_lists(&lists, kr, kc, ListBuildMode::DynamicBitmaps).unwrap(),
    ] {
      prop_assert_eq!(&generic.stems, &packed.stems);
      prop_assert_eq!(generic.count_elements(), packed.count_elements());
      for i in 0..generic.num_rows {
        prop_assert_eq!(
          generic.successor_positions(i).unwrap(),
          packed.successor_positions(i).unwrap()
        );
        for j in 0..generic.num_cols {
          prop_assert_eq!(generic.get(i, j).unwrap(), packed.get(i, j).unwrap());
        }
      }
    }
  }
}

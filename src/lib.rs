#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]

/*!
Succinct rectangular K2-trees for sparse two-dimensional relations.

A K2-tree compresses a sparse matrix by recursively subdividing it and
storing one presence bit per subdivision, so empty regions collapse into
single zero bits. The variant in this crate generalises the classic structure
in two directions:

- the subdivision arities are independent per axis (`kr` rows, `kc` columns),
  so the represented matrix may be rectangular;
- cells carry arbitrary values of a type `T` with one designated *null*
  value, not just bits.

**Note:** this library heavily relies upon [bitvec](https://docs.rs/bitvec)
to store its internal structure. Always try to compile with optimisations;
bit-addressed code is very slow without them!
*/

/*!
# How it works

A `4x4` matrix with two non-null cells (null = 0), `kr = kc = 2`:

```ignore
7 0 | 0 0
0 0 | 0 0
---------
0 0 | 0 0
0 0 | 0 9
```

The matrix is split into `kr * kc` quadrants; each quadrant holding at least
one non-null cell gets a 1 bit, the rest collapse into 0 bits:

```ignore
stems: [1 0 0 1]
```

Non-empty quadrants are subdivided again until the quadrants are single
cells, whose values are appended to the leaf storage block by block:

```ignore
leaves: [7 0 0 0, 0 0 0 9]
```

Queries walk from the top bits down to the leaves, using a constant-time
rank over the stems to locate each node's children; nothing is ever
decompressed.
*/

/*!
# Choosing an input shape

The same tree can be built from a dense [`matrix::Matrix`], from row-wise
adjacency lists, or from a flat pair list; all constructors produce
bit-identical trees. Use the pair-list form for large inputs, it partitions
the pairs in place and never materialises the dense matrix.

```
use k2_rect::{relation::ValuedPosition, KrKcTree};
let mut pairs = vec![
  ValuedPosition::new(0, 1, 7u8),
  ValuedPosition::new(3, 3, 9),
];
let tree = KrKcTree::from_pairs(&mut pairs, 2, 2, 0).unwrap();
assert_eq!(7, tree.get(0, 1).unwrap());
assert_eq!(vec![3], tree.successor_positions(3).unwrap());
```

For relations that are plain bits, [`KrKcBitTree`] packs the leaf level into
a bit vector as well.
*/

pub use tree::{KrKcBitTree, KrKcTree, ListBuildMode};
pub use relation::Relation;

/// Tree structures and associated types.
pub mod tree;

/// Library error types.
pub mod error;

/// Dense input matrix.
pub mod matrix;

/// Bit-vector rank index.
pub mod bits;

/// The shared relation query surface.
pub mod relation;

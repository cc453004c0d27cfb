//! Grid environment: static geography plus the evolving hazard field

pub mod cell;
pub mod environment;
pub mod scenario;

// Re-export main types
pub use cell::*;
pub use environment::*;
pub use scenario::*;

/// 4-neighbourhood of a cell in ascending cell-id order
pub(crate) fn orthogonal_neighbours(
    coord: Coord,
    width: usize,
    height: usize,
) -> impl Iterator<Item = Coord> {
    let Coord { row, col } = coord;
    [
        (row > 0).then(|| Coord::new(row - 1, col)),
        (col > 0).then(|| Coord::new(row, col - 1)),
        (col + 1 < width).then(|| Coord::new(row, col + 1)),
        (row + 1 < height).then(|| Coord::new(row + 1, col)),
    ]
    .into_iter()
    .flatten()
}

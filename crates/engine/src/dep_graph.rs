//! Dependency graph maintenance for formula cells.
//!
//! Edges live on the cells themselves as position sets, owned by the grid:
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** B ∈ A.dependents iff A ∈ B.precedents.
//! 2. **Resolvable edges:** every position in either set has a present cell.
//! 3. **Acyclic:** no cell reaches itself along precedent edges.
//!    `would_create_cycle` must be consulted before every `replace_edges`.
//!
//! `replace_edges` is the only function that writes both directions.

use cellgraph_core::Position;
use rustc_hash::FxHashSet;

use crate::grid::Grid;

/// Precedents of `pos` in row-major order, empty when the slot is absent.
fn sorted_precedents(grid: &Grid, pos: Position) -> Vec<Position> {
    let mut cells: Vec<Position> = grid
        .get(pos)
        .map(|c| c.precedents().collect())
        .unwrap_or_default();
    cells.sort_unstable();
    cells
}

/// Check whether giving `cell` the precedents `new_preds` would close a cycle.
///
/// Does not modify the grid. Returns the offending path, starting and ending
/// at `cell`, or `None` when the edges are safe.
///
/// # Algorithm
///
/// Depth-first search from each prospective precedent along existing
/// precedent edges. `path` holds the cells on the current DFS stack and is
/// seeded with `cell`; meeting a member of `path` is a cycle. `visited` holds
/// cells already proven cycle-free and is shared across all roots of one
/// check. `cell`'s own current precedents are never followed since they are
/// about to be replaced.
pub fn would_create_cycle(
    grid: &Grid,
    cell: Position,
    new_preds: &[Position],
) -> Option<Vec<Position>> {
    if new_preds.contains(&cell) {
        return Some(vec![cell, cell]);
    }

    // Iterative DFS so long reference chains cannot overflow the call stack.
    struct DfsFrame {
        cell: Position,
        neighbours: Vec<Position>,
        next_idx: usize,
    }

    let mut path: FxHashSet<Position> = FxHashSet::default();
    let mut visited: FxHashSet<Position> = FxHashSet::default();
    path.insert(cell);

    let mut roots = new_preds.to_vec();
    roots.sort_unstable();
    roots.dedup();

    for root in roots {
        if !visited.insert(root) {
            continue;
        }
        path.insert(root);

        let mut dfs_stack = vec![DfsFrame {
            cell: root,
            neighbours: sorted_precedents(grid, root),
            next_idx: 0,
        }];

        while let Some(frame) = dfs_stack.last_mut() {
            if frame.next_idx < frame.neighbours.len() {
                let w = frame.neighbours[frame.next_idx];
                frame.next_idx += 1;

                if path.contains(&w) {
                    let mut cycle = vec![cell];
                    cycle.extend(dfs_stack.iter().map(|f| f.cell));
                    cycle.push(w);
                    return Some(cycle);
                }
                if visited.insert(w) {
                    path.insert(w);
                    dfs_stack.push(DfsFrame {
                        cell: w,
                        neighbours: sorted_precedents(grid, w),
                        next_idx: 0,
                    });
                }
            } else {
                // All neighbours explored
                path.remove(&frame.cell);
                dfs_stack.pop();
            }
        }
    }

    None
}

/// Replace all precedent edges of `cell` atomically.
///
/// 1. Removes `cell` from every old precedent's dependent set
/// 2. Materializes each new precedent (as Empty when absent)
/// 3. Adds the mutual edge for each new precedent
///
/// Pass an empty slice to clear all edges for this cell.
pub fn replace_edges(grid: &mut Grid, cell: Position, new_preds: &[Position]) {
    let old_preds = grid
        .get_mut(cell)
        .map(|c| std::mem::take(&mut c.precedents))
        .unwrap_or_default();

    for pred in old_preds {
        if let Some(p) = grid.get_mut(pred) {
            p.dependents.remove(&cell);
        }
    }

    if new_preds.is_empty() {
        return;
    }

    for &pred in new_preds {
        grid.materialize(pred).dependents.insert(cell);
    }
    grid.materialize(cell).precedents = new_preds.iter().copied().collect();
}

/// Drop every precedent edge of `cell` (its content is being cleared).
pub fn detach(grid: &mut Grid, cell: Position) {
    replace_edges(grid, cell, &[]);
}

/// Drop the cached results of everything downstream of `cell`.
///
/// Walks dependent edges outward. A dependent without a cache is not
/// descended through: anything below it was already invalidated or never
/// evaluated through it. Terminates because the graph is acyclic.
///
/// Returns the number of caches dropped.
pub fn invalidate_dependents(grid: &Grid, cell: Position) -> usize {
    let mut dropped = 0;
    let mut worklist: Vec<Position> = grid
        .get(cell)
        .map(|c| c.dependents().collect())
        .unwrap_or_default();

    while let Some(pos) = worklist.pop() {
        let Some(dependent) = grid.get(pos) else {
            continue;
        };
        if !dependent.content.has_cache() {
            continue;
        }
        dependent.content.wipe_cache();
        dropped += 1;
        worklist.extend(dependent.dependents());
    }

    log::trace!("invalidated {} cached result(s) downstream of {}", dropped, cell);
    dropped
}

/// Formulas that must be evaluated before `root` can be read, precedents
/// first and `root` last.
///
/// Only formulas without a cached result are listed. Descent stops at cached
/// formulas and at non-formula cells, whose values are already known. The
/// graph is acyclic, so DFS post-order is a valid evaluation order.
pub fn evaluation_order(grid: &Grid, root: Position) -> Vec<Position> {
    let pending = |pos: Position| {
        grid.get(pos)
            .map_or(false, |c| c.content.needs_evaluation())
    };

    let mut order = Vec::new();
    if !pending(root) {
        return order;
    }

    // Explicit stack: chains can be as long as a column.
    struct DfsFrame {
        cell: Position,
        neighbours: Vec<Position>,
        next_idx: usize,
    }

    let mut visited: FxHashSet<Position> = FxHashSet::default();
    visited.insert(root);
    let mut dfs_stack = vec![DfsFrame {
        cell: root,
        neighbours: sorted_precedents(grid, root),
        next_idx: 0,
    }];

    while let Some(frame) = dfs_stack.last_mut() {
        if frame.next_idx < frame.neighbours.len() {
            let w = frame.neighbours[frame.next_idx];
            frame.next_idx += 1;

            if pending(w) && visited.insert(w) {
                dfs_stack.push(DfsFrame {
                    cell: w,
                    neighbours: sorted_precedents(grid, w),
                    next_idx: 0,
                });
            }
        } else {
            order.push(frame.cell);
            dfs_stack.pop();
        }
    }

    order
}

/// Check all graph invariants. Panics if any are violated.
///
/// Only available in test builds.
#[cfg(test)]
pub fn assert_consistent(grid: &Grid) {
    for (pos, cell) in grid.iter() {
        for pred in cell.precedents() {
            let p = grid
                .get(pred)
                .unwrap_or_else(|| panic!("{} has dangling precedent {}", pos, pred));
            assert!(
                p.dependents.contains(&pos),
                "Missing dependent edge: {} should list {}",
                pred,
                pos
            );
        }
        for dep in cell.dependents() {
            let d = grid
                .get(dep)
                .unwrap_or_else(|| panic!("{} has dangling dependent {}", pos, dep));
            assert!(
                d.precedents.contains(&pos),
                "Missing precedent edge: {} should list {}",
                dep,
                pos
            );
        }
        let mut refs = cell.content.referenced_cells();
        refs.sort_unstable();
        let mut preds: Vec<Position> = cell.precedents().collect();
        preds.sort_unstable();
        assert_eq!(refs, preds, "precedents of {} disagree with its formula", pos);

        assert!(
            would_create_cycle(grid, pos, &preds).is_none(),
            "{} lies on a cycle",
            pos
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellContent;

    fn pos(a1: &str) -> Position {
        Position::from_a1(a1)
    }

    /// Install a formula and its edges without going through the sheet.
    fn set_formula(grid: &mut Grid, at: &str, formula: &str) {
        let content = CellContent::from_input(formula).unwrap();
        let refs = content.referenced_cells();
        grid.materialize(pos(at)).content = content;
        replace_edges(grid, pos(at), &refs);
    }

    #[test]
    fn test_replace_edges_is_bidirectional() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "C1", "=A1+B1");

        let c1 = grid.get(pos("C1")).unwrap();
        assert_eq!(c1.precedents.len(), 2);
        assert!(grid.get(pos("A1")).unwrap().dependents.contains(&pos("C1")));
        assert!(grid.get(pos("B1")).unwrap().dependents.contains(&pos("C1")));
        assert_consistent(&grid);
    }

    #[test]
    fn test_replace_edges_removes_old_edges() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "C1", "=A1+B1");
        set_formula(&mut grid, "C1", "=B1");

        assert!(grid.get(pos("A1")).unwrap().dependents.is_empty());
        assert!(grid.get(pos("B1")).unwrap().dependents.contains(&pos("C1")));
        assert_consistent(&grid);
    }

    #[test]
    fn test_detach() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "B1", "=A1");
        grid.materialize(pos("B1")).content = CellContent::Empty;
        detach(&mut grid, pos("B1"));

        assert!(grid.get(pos("B1")).unwrap().precedents.is_empty());
        assert!(grid.get(pos("A1")).unwrap().dependents.is_empty());
        assert_consistent(&grid);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let grid = Grid::new();
        assert_eq!(
            would_create_cycle(&grid, pos("A1"), &[pos("A1")]),
            Some(vec![pos("A1"), pos("A1")])
        );
    }

    #[test]
    fn test_two_cell_cycle() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "A1", "=B1");
        assert_eq!(
            would_create_cycle(&grid, pos("B1"), &[pos("A1")]),
            Some(vec![pos("B1"), pos("A1"), pos("B1")])
        );
    }

    #[test]
    fn test_long_cycle_path() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "A1", "=A2");
        set_formula(&mut grid, "A2", "=A3");
        set_formula(&mut grid, "A3", "=A4");

        let path = would_create_cycle(&grid, pos("A4"), &[pos("B1"), pos("A1")]).unwrap();
        assert_eq!(
            path,
            vec![pos("A4"), pos("A1"), pos("A2"), pos("A3"), pos("A4")]
        );
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "B1", "=A1");
        set_formula(&mut grid, "C1", "=A1");
        assert!(would_create_cycle(&grid, pos("D1"), &[pos("B1"), pos("C1")]).is_none());
    }

    #[test]
    fn test_replacing_own_edges_is_not_a_cycle() {
        // A1 currently reads B1; rewriting A1 to read C1 only looks at C1's chain
        let mut grid = Grid::new();
        set_formula(&mut grid, "A1", "=B1");
        set_formula(&mut grid, "C1", "=B1");
        assert!(would_create_cycle(&grid, pos("A1"), &[pos("C1")]).is_none());
    }

    #[test]
    fn test_cycle_check_does_not_modify_grid() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "A1", "=B1");
        let (rows, cols) = (grid.row_count(), grid.col_count());
        assert!(would_create_cycle(&grid, pos("B1"), &[pos("A1"), pos("Z99")]).is_some());
        assert_eq!((grid.row_count(), grid.col_count()), (rows, cols));
        assert!(!grid.contains(pos("Z99")));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let mut grid = Grid::new();
        for row in 1..5000 {
            let at = Position::new(row, 0);
            let prev = Position::new(row - 1, 0);
            grid.materialize(at);
            replace_edges(&mut grid, at, &[prev]);
        }
        let tail = Position::new(4999, 0);
        assert!(would_create_cycle(&grid, Position::new(0, 0), &[tail]).is_some());
        assert!(would_create_cycle(&grid, Position::new(0, 1), &[tail]).is_none());
    }

    #[test]
    fn test_evaluation_order_is_precedents_first() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "A1", "=B1+C1");
        set_formula(&mut grid, "B1", "=C1*2");
        set_formula(&mut grid, "C1", "=D1");
        grid.materialize(pos("D1")).content = CellContent::from_input("4").unwrap();

        assert_eq!(
            evaluation_order(&grid, pos("A1")),
            vec![pos("C1"), pos("B1"), pos("A1")]
        );
        // Non-formula roots need nothing
        assert!(evaluation_order(&grid, pos("D1")).is_empty());
        assert!(evaluation_order(&grid, pos("Z9")).is_empty());
    }

    #[test]
    fn test_evaluation_order_stops_at_cached_formulas() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "A1", "=B1");
        set_formula(&mut grid, "B1", "=C1");
        set_formula(&mut grid, "C1", "=1");

        let zero = |_: Position| -> Result<f64, crate::value::FormulaError> { Ok(0.0) };
        grid.get(pos("B1")).unwrap().content.value(&zero, true);

        assert_eq!(evaluation_order(&grid, pos("A1")), vec![pos("A1")]);
    }

    #[test]
    fn test_evaluation_order_on_long_chain() {
        let mut grid = Grid::new();
        for row in 0..15_000 {
            let at = Position::new(row, 0);
            grid.materialize(at).content = CellContent::from_input("=1").unwrap();
            if row > 0 {
                replace_edges(&mut grid, at, &[Position::new(row - 1, 0)]);
            }
        }
        let order = evaluation_order(&grid, Position::new(14_999, 0));
        assert_eq!(order.len(), 15_000);
        assert_eq!(order[0], Position::new(0, 0));
        assert_eq!(order[14_999], Position::new(14_999, 0));
    }

    #[test]
    fn test_invalidation_walks_cached_dependents() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "B1", "=A1");
        set_formula(&mut grid, "C1", "=B1");
        set_formula(&mut grid, "D1", "=C1");

        let zero = |_: Position| -> Result<f64, crate::value::FormulaError> { Ok(0.0) };
        for at in ["B1", "C1", "D1"] {
            grid.get(pos(at)).unwrap().content.value(&zero, true);
        }

        assert_eq!(invalidate_dependents(&grid, pos("A1")), 3);
        for at in ["B1", "C1", "D1"] {
            assert!(!grid.get(pos(at)).unwrap().content.has_cache());
        }
        // Nothing left to drop
        assert_eq!(invalidate_dependents(&grid, pos("A1")), 0);
    }

    #[test]
    fn test_invalidation_stops_at_uncached_dependent() {
        let mut grid = Grid::new();
        set_formula(&mut grid, "B1", "=A1");
        set_formula(&mut grid, "C1", "=B1");

        let zero = |_: Position| -> Result<f64, crate::value::FormulaError> { Ok(0.0) };
        grid.get(pos("C1")).unwrap().content.value(&zero, true);

        // B1 holds no cache, so C1 is not reached through it
        assert_eq!(invalidate_dependents(&grid, pos("A1")), 0);
        assert!(grid.get(pos("C1")).unwrap().content.has_cache());
    }
}

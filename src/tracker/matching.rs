//! Cost evaluation and gated one-to-one assignment.

use ndarray::{Array2, ArrayView1};

use crate::error::{Error, Result};
use crate::tracker::config::{AssignmentSolver, MatchConfig};

/// Cost given to forbidden and padding cells of the square solver matrix.
/// Gated costs must stay strictly below it.
pub(crate) const FORBIDDEN_COST: f64 = 1e4;

/// `1 - cos(a, b)`, in `[0, 2]`. Empty or all-zero features have distance 0.
pub fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::FeatureDimension {
            expected: a.len(),
            found: b.len(),
        });
    }
    let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norm <= f32::EPSILON {
        return Ok(0.0);
    }
    Ok((1.0 - a.dot(&b) / norm).clamp(0.0, 2.0))
}

/// Combined cost of pairing a cluster with a known object, or `None` when the
/// pair is outside the gate.
///
/// `extra` is added before the cost gate is applied.
pub(crate) fn gated_cost(
    config: &MatchConfig,
    distance: f32,
    same_class: bool,
    feature_distance: f32,
    extra: f32,
) -> Option<f32> {
    if distance > config.max_distance {
        return None;
    }
    let class_penalty = match (same_class, config.class_mismatch_penalty) {
        (true, _) => 0.0,
        (false, Some(penalty)) => penalty,
        (false, None) => return None,
    };
    let cost = config.distance_weight * distance
        + config.feature_weight * feature_distance
        + class_penalty
        + extra;
    (cost <= config.max_cost).then_some(cost)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    /// `(previous, current)` index pairs.
    pub matches: Vec<(usize, usize)>,
    pub unmatched_previous: Vec<usize>,
    pub unmatched_current: Vec<usize>,
}

/// Resolve a `previous x current` cost matrix into one-to-one matches.
///
/// Non-finite cells are never matched.
pub fn linear_assignment(cost_matrix: &Array2<f32>, solver: AssignmentSolver) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_previous: (0..num_rows).collect(),
            unmatched_current: (0..num_cols).collect(),
        };
    }

    let matches = match solver {
        AssignmentSolver::Greedy => greedy_matches(cost_matrix),
        AssignmentSolver::Optimal => optimal_matches(cost_matrix),
    };

    let mut previous_free = vec![true; num_rows];
    let mut current_free = vec![true; num_cols];
    for &(row, col) in &matches {
        previous_free[row] = false;
        current_free[col] = false;
    }

    AssignmentResult {
        matches,
        unmatched_previous: free_indices(&previous_free),
        unmatched_current: free_indices(&current_free),
    }
}

fn free_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &free)| if free { Some(i) } else { None })
        .collect()
}

fn greedy_matches(cost_matrix: &Array2<f32>) -> Vec<(usize, usize)> {
    let (num_rows, num_cols) = cost_matrix.dim();

    let mut pairs: Vec<(f32, usize, usize)> = cost_matrix
        .indexed_iter()
        .filter(|(_, cost)| cost.is_finite())
        .map(|((row, col), &cost)| (cost, row, col))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut row_taken = vec![false; num_rows];
    let mut col_taken = vec![false; num_cols];
    let mut matches = Vec::new();
    for (_, row, col) in pairs {
        if row_taken[row] || col_taken[col] {
            continue;
        }
        row_taken[row] = true;
        col_taken[col] = true;
        matches.push((row, col));
    }
    matches.sort_by_key(|&(_, col)| col);
    matches
}

fn optimal_matches(cost_matrix: &Array2<f32>) -> Vec<(usize, usize)> {
    let (num_rows, num_cols) = cost_matrix.dim();
    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), FORBIDDEN_COST);

    for ((row, col), &cost) in cost_matrix.indexed_iter() {
        if cost.is_finite() {
            padded[[row, col]] = f64::from(cost);
        }
    }

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            let mut matches: Vec<(usize, usize)> = row_to_col
                .iter()
                .enumerate()
                .filter(|&(row, &col)| {
                    row < num_rows && col < num_cols && cost_matrix[[row, col]].is_finite()
                })
                .map(|(row, &col)| (row, col))
                .collect();
            prefer_smaller_previous(cost_matrix, &mut matches);
            matches
        }
        Err(err) => {
            log::warn!("lapjv failed ({err:?}), falling back to greedy assignment");
            greedy_matches(cost_matrix)
        }
    }
}

/// Rewrite an optimal assignment so that, among assignments of the same total
/// cost, each current index takes the smallest previous index it can.
///
/// Every step lowers the previous index of some current index and leaves all
/// earlier current indices untouched, so the loop terminates. Leaves `matches`
/// sorted by column.
fn prefer_smaller_previous(cost_matrix: &Array2<f32>, matches: &mut [(usize, usize)]) {
    let cost = |row: usize, col: usize| f64::from(cost_matrix[[row, col]]);
    matches.sort_by_key(|&(_, col)| col);

    let mut row_taken = vec![false; cost_matrix.nrows()];
    for &(row, _) in matches.iter() {
        row_taken[row] = true;
    }

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..matches.len() {
            let (row_i, col_i) = matches[i];

            // An unmatched previous index with the same cost
            let tied_free_row =
                (0..row_i).find(|&r| !row_taken[r] && cost(r, col_i) == cost(row_i, col_i));
            if let Some(free) = tied_free_row {
                row_taken[row_i] = false;
                row_taken[free] = true;
                matches[i].0 = free;
                changed = true;
                continue;
            }

            // A later current index holding a smaller previous index at equal total
            for j in i + 1..matches.len() {
                let (row_j, col_j) = matches[j];
                if row_j > row_i {
                    continue;
                }
                let swapped = cost(row_j, col_i) + cost(row_i, col_j);
                if swapped.is_finite() && swapped == cost(row_i, col_i) + cost(row_j, col_j) {
                    matches[i].0 = row_j;
                    matches[j].0 = row_i;
                    changed = true;
                    break;
                }
            }
        }
    }
}

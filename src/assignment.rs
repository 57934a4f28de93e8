use munkres::{solve_assignment, Position, WeightMatrix};

use crate::config::MatchingStrategy;
use crate::error::Error;

/// Cost of a forbidden pair. Any real cost is far below it, so the solver
/// only lands on it when a row or column has nothing else to take.
pub const GATED_COST: f32 = 1.0e5;

// Per-column bias making equal costs resolve toward the lower detection index.
const TIE_BREAK: f64 = 1.0e-7;

/// Rows are tracks, columns are detections.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl CostMatrix {
    pub fn gated(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![GATED_COST; rows * cols],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, cost: f32) {
        self.data[row * self.cols + col] = cost;
    }

    #[inline]
    pub fn is_gated(&self, row: usize, col: usize) -> bool {
        self.get(row, col) >= GATED_COST
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// `(row, col, cost)`, sorted by row
    pub matches: Vec<(usize, usize, f32)>,
    pub unmatched_rows: Vec<usize>,
    pub unmatched_cols: Vec<usize>,
}

impl Assignment {
    fn unmatched(rows: usize, cols: usize) -> Self {
        Self {
            matches: Vec::new(),
            unmatched_rows: (0..rows).collect(),
            unmatched_cols: (0..cols).collect(),
        }
    }

    fn from_matches(rows: usize, cols: usize, mut matches: Vec<(usize, usize, f32)>) -> Self {
        matches.sort_unstable_by_key(|&(r, _, _)| r);

        let mut row_used = vec![false; rows];
        let mut col_used = vec![false; cols];
        for &(r, c, _) in &matches {
            row_used[r] = true;
            col_used[c] = true;
        }

        Self {
            matches,
            unmatched_rows: (0..rows).filter(|&r| !row_used[r]).collect(),
            unmatched_cols: (0..cols).filter(|&c| !col_used[c]).collect(),
        }
    }
}

/// One-to-one matching minimizing the total cost; gated pairs are never returned.
///
/// An empty matrix is a trivial, error-free "no matches". A matrix holding
/// non-finite costs, or one the solver rejects, is reported as
/// `AssignmentDegenerate`.
pub fn solve(costs: &CostMatrix, strategy: MatchingStrategy) -> Result<Assignment, Error> {
    if costs.data.len() != costs.rows * costs.cols {
        return Err(Error::AssignmentDegenerate(format!(
            "{} costs for a {}x{} matrix",
            costs.data.len(),
            costs.rows,
            costs.cols
        )));
    }

    if costs.is_empty() {
        return Ok(Assignment::unmatched(costs.rows, costs.cols));
    }

    if let Some(pos) = costs.data.iter().position(|c| c.is_nan() || *c < 0.0) {
        return Err(Error::AssignmentDegenerate(format!(
            "cost {} at ({}, {})",
            costs.data[pos],
            pos / costs.cols,
            pos % costs.cols
        )));
    }

    match strategy {
        MatchingStrategy::Hungarian => hungarian(costs),
        MatchingStrategy::Greedy => Ok(greedy(costs)),
    }
}

fn hungarian(costs: &CostMatrix) -> Result<Assignment, Error> {
    let (rows, cols) = (costs.rows, costs.cols);
    let n = rows.max(cols);

    let mut weights = WeightMatrix::from_fn(n, |(r, c)| {
        if r < rows && c < cols && !costs.is_gated(r, c) {
            costs.get(r, c) as f64 + TIE_BREAK * c as f64
        } else {
            GATED_COST as f64
        }
    });

    let solution = solve_assignment(&mut weights)
        .map_err(|err| Error::AssignmentDegenerate(format!("{:?}", err)))?;

    let matches = solution
        .into_iter()
        .filter(|&Position { row, column }| row < rows && column < cols)
        .filter(|&Position { row, column }| !costs.is_gated(row, column))
        .map(|Position { row, column }| (row, column, costs.get(row, column)))
        .collect();

    Ok(Assignment::from_matches(rows, cols, matches))
}

fn greedy(costs: &CostMatrix) -> Assignment {
    let (rows, cols) = (costs.rows, costs.cols);

    let mut pairs: Vec<(usize, usize, f32)> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .filter(|&(r, c)| !costs.is_gated(r, c))
        .map(|(r, c)| (r, c, costs.get(r, c)))
        .collect();

    pairs.sort_by(|a, b| {
        a.2.total_cmp(&b.2)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut row_used = vec![false; rows];
    let mut col_used = vec![false; cols];
    let mut matches = Vec::new();

    for (r, c, cost) in pairs {
        if !row_used[r] && !col_used[c] {
            row_used[r] = true;
            col_used[c] = true;
            matches.push((r, c, cost));
        }
    }

    Assignment::from_matches(rows, cols, matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: usize, cols: usize, values: &[f32]) -> CostMatrix {
        let mut m = CostMatrix::gated(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                m.set(r, c, values[r * cols + c]);
            }
        }
        m
    }

    fn pairs(a: &Assignment) -> Vec<(usize, usize)> {
        a.matches.iter().map(|&(r, c, _)| (r, c)).collect()
    }

    #[test]
    fn hungarian_beats_greedy() {
        // greedy grabs (0,0)=0.1 and is forced into (1,1)=0.9
        let m = matrix(2, 2, &[0.1, 0.2, 0.3, 0.9]);

        let opt = solve(&m, MatchingStrategy::Hungarian).unwrap();
        assert_eq!(pairs(&opt), vec![(0, 1), (1, 0)]);

        let grd = solve(&m, MatchingStrategy::Greedy).unwrap();
        assert_eq!(pairs(&grd), vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn gated_pairs_are_never_matched() {
        let m = matrix(2, 2, &[0.5, GATED_COST, GATED_COST, GATED_COST]);

        for strategy in [MatchingStrategy::Hungarian, MatchingStrategy::Greedy] {
            let a = solve(&m, strategy).unwrap();
            assert_eq!(pairs(&a), vec![(0, 0)]);
            assert_eq!(a.unmatched_rows, vec![1]);
            assert_eq!(a.unmatched_cols, vec![1]);
        }
    }

    #[test]
    fn rectangular_matrices() {
        let m = matrix(1, 3, &[0.7, 0.2, 0.4]);
        let a = solve(&m, MatchingStrategy::Hungarian).unwrap();
        assert_eq!(pairs(&a), vec![(0, 1)]);
        assert_eq!(a.unmatched_cols, vec![0, 2]);

        let m = matrix(3, 1, &[0.7, 0.2, 0.4]);
        let a = solve(&m, MatchingStrategy::Hungarian).unwrap();
        assert_eq!(pairs(&a), vec![(1, 0)]);
        assert_eq!(a.unmatched_rows, vec![0, 2]);
    }

    #[test]
    fn ties_prefer_lower_detection_index() {
        let m = matrix(1, 3, &[0.3, 0.3, 0.3]);

        for strategy in [MatchingStrategy::Hungarian, MatchingStrategy::Greedy] {
            let a = solve(&m, strategy).unwrap();
            assert_eq!(pairs(&a), vec![(0, 0)]);
        }
    }

    #[test]
    fn empty_is_trivial() {
        let a = solve(&CostMatrix::gated(0, 4), MatchingStrategy::Hungarian).unwrap();
        assert!(a.matches.is_empty());
        assert_eq!(a.unmatched_cols, vec![0, 1, 2, 3]);

        let a = solve(&CostMatrix::gated(2, 0), MatchingStrategy::Hungarian).unwrap();
        assert_eq!(a.unmatched_rows, vec![0, 1]);
    }

    #[test]
    fn malformed_costs_are_degenerate() {
        let m = matrix(1, 2, &[f32::NAN, 0.1]);

        assert!(matches!(
            solve(&m, MatchingStrategy::Hungarian),
            Err(Error::AssignmentDegenerate(_))
        ));
    }

    #[test]
    fn one_to_one_on_dense_matrix() {
        let n = 6;
        let values: Vec<f32> = (0..n * n).map(|i| ((i * 7919) % 97) as f32 / 97.0).collect();
        let m = matrix(n, n, &values);
        let a = solve(&m, MatchingStrategy::Hungarian).unwrap();

        let mut rows: Vec<_> = a.matches.iter().map(|m| m.0).collect();
        let mut cols: Vec<_> = a.matches.iter().map(|m| m.1).collect();
        rows.dedup();
        cols.sort_unstable();
        cols.dedup();

        assert_eq!(rows.len(), n);
        assert_eq!(cols.len(), n);
    }
}

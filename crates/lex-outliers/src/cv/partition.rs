use rand::prelude::*;

use crate::error::CvError;

/// Row-to-fold mapping for one cross-validation pass.
///
/// Row indices are shuffled with a seeded `StdRng`, then dealt round-robin
/// into `K` folds. The result depends only on `(n, K, seed)`, and every fold
/// gets either `n / K` or `n / K + 1` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    /// `folds[row]` is the fold id of `row`.
    folds: Vec<usize>,
    num_folds: usize,
}

impl FoldAssignment {
    /// Assign `n` rows to `num_folds` folds.
    pub fn assign(n: usize, num_folds: usize, seed: u64) -> Result<Self, CvError> {
        if num_folds < 2 {
            return Err(CvError::InvalidFolds(num_folds));
        }
        if n < num_folds {
            return Err(CvError::InsufficientRows {
                rows: n,
                folds: num_folds,
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);

        let mut folds = vec![0; n];
        for (position, row) in order.into_iter().enumerate() {
            folds[row] = position % num_folds;
        }

        Ok(Self { folds, num_folds })
    }

    pub fn num_folds(&self) -> usize {
        self.num_folds
    }

    /// Number of rows covered.
    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    pub fn fold_of(&self, row: usize) -> Option<usize> {
        self.folds.get(row).copied()
    }

    /// Row indices held out by `fold`, ascending.
    pub fn indices_in(&self, fold: usize) -> Vec<usize> {
        self.folds
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f == fold)
            .map(|(row, _)| row)
            .collect()
    }

    pub fn fold_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_folds];
        for &fold in &self.folds {
            sizes[fold] += 1;
        }
        sizes
    }

    /// The permutation produced by concatenating folds `0..K` in order.
    ///
    /// Entry `i` is the original row index of the `i`-th record when per-fold
    /// outputs are appended fold by fold. Inverting it puts the records back
    /// in row order.
    pub fn original_order(&self) -> Vec<usize> {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.num_folds];
        for (row, &fold) in self.folds.iter().enumerate() {
            buckets[fold].push(row);
        }
        buckets.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_assign_rejects_too_few_rows() {
        let err = FoldAssignment::assign(3, 5, 1).unwrap_err();
        assert!(matches!(err, CvError::InsufficientRows { rows: 3, folds: 5 }));
    }

    #[test]
    fn test_assign_rejects_single_fold() {
        assert!(matches!(
            FoldAssignment::assign(10, 1, 1),
            Err(CvError::InvalidFolds(1))
        ));
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let a = FoldAssignment::assign(50, 7, 42).unwrap();
        let b = FoldAssignment::assign(50, 7, 42).unwrap();
        assert_eq!(a, b);

        let c = FoldAssignment::assign(50, 7, 43).unwrap();
        assert_ne!(a, c, "different seeds should shuffle differently");
    }

    #[test]
    fn test_exactly_k_rows_gives_singleton_folds() {
        let assignment = FoldAssignment::assign(4, 4, 9).unwrap();
        assert_eq!(assignment.fold_sizes(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_indices_in_matches_fold_of() {
        let assignment = FoldAssignment::assign(23, 5, 3).unwrap();
        for fold in 0..5 {
            for row in assignment.indices_in(fold) {
                assert_eq!(assignment.fold_of(row), Some(fold));
            }
        }
        assert_eq!(assignment.fold_of(23), None);
    }

    proptest! {
        #[test]
        fn every_row_lands_in_exactly_one_balanced_fold(
            n in 2usize..200,
            k in 2usize..12,
            seed in any::<u64>(),
        ) {
            prop_assume!(n >= k);
            let assignment = FoldAssignment::assign(n, k, seed).unwrap();

            prop_assert_eq!(assignment.len(), n);
            let sizes = assignment.fold_sizes();
            prop_assert_eq!(sizes.iter().sum::<usize>(), n);
            let min = *sizes.iter().min().unwrap();
            let max = *sizes.iter().max().unwrap();
            prop_assert!(min >= 1);
            prop_assert!(max - min <= 1);

            let mut order = assignment.original_order();
            order.sort_unstable();
            prop_assert_eq!(order, (0..n).collect::<Vec<_>>());
        }
    }
}

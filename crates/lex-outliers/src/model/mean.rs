use anyhow::{Result, bail};

use super::Model;
use crate::types::Row;

/// Baseline model: predicts the mean target of its training rows.
#[derive(Debug, Clone, Default)]
pub struct MeanModel {
    mean: Option<f64>,
}

impl MeanModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Model for MeanModel {
    fn fit(&mut self, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            bail!("cannot fit mean model on zero rows");
        }
        let sum: f64 = rows.iter().map(|row| row.target).sum();
        self.mean = Some(sum / rows.len() as f64);
        Ok(())
    }

    fn predict(&self, _row: &Row) -> Result<f64> {
        match self.mean {
            Some(mean) => Ok(mean),
            None => bail!("mean model has not been fitted"),
        }
    }

    fn clone_model(&self) -> Box<dyn Model> {
        Box::new(MeanModel::new())
    }

    fn name(&self) -> &str {
        "mean"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_model_predicts_training_mean() {
        let mut model = MeanModel::new();
        let rows = vec![
            Row::new(vec![0.0], 1.0),
            Row::new(vec![0.0], 2.0),
            Row::new(vec![0.0], 6.0),
        ];
        model.fit(&rows).unwrap();
        assert_eq!(model.predict(&Row::new(vec![9.0], 0.0)).unwrap(), 3.0);
    }

    #[test]
    fn test_mean_model_requires_fit() {
        let model = MeanModel::new();
        assert!(model.predict(&Row::new(vec![], 0.0)).is_err());
        assert!(MeanModel::new().fit(&[]).is_err());
    }

    #[test]
    fn test_clone_model_is_untrained() {
        let mut model = MeanModel::new();
        model.fit(&[Row::new(vec![], 5.0)]).unwrap();
        let fresh = model.clone_model();
        assert!(fresh.predict(&Row::new(vec![], 0.0)).is_err());
    }
}

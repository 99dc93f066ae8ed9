use std::collections::BTreeMap;

use crate::features::FeatureFrame;

/// Per-column standardization fitted on history.
///
/// Missing values are ignored when fitting. The spread is the population
/// standard deviation; a constant column scales by one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardScaler {
    params: BTreeMap<String, ScaleParams>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    pub mean: f64,
    pub scale: f64,
}

impl StandardScaler {
    /// Fit on the `columns` present in `frame`; columns with no values are skipped.
    pub fn fit<'a>(frame: &FeatureFrame, columns: impl IntoIterator<Item = &'a str>) -> Self {
        let params = columns
            .into_iter()
            .filter_map(|column| {
                let values: Vec<f64> = frame
                    .numeric(column)?
                    .iter()
                    .flatten()
                    .copied()
                    .filter(|v| v.is_finite())
                    .collect();
                if values.is_empty() {
                    return None;
                }

                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                let scale = if std == 0.0 { 1.0 } else { std };

                Some((column.to_string(), ScaleParams { mean, scale }))
            })
            .collect();

        Self { params }
    }

    /// Standardize `value` for `column`; unfitted columns pass through.
    pub fn transform(&self, column: &str, value: f64) -> f64 {
        match self.params.get(column) {
            Some(p) => (value - p.mean) / p.scale,
            None => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn frame(columns: &[(&str, Vec<Option<f64>>)]) -> FeatureFrame {
        let len = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let t = DateTime::parse_from_rfc3339("2025-11-18T10:00:00+07:00").unwrap();
        let mut frame = FeatureFrame::new(vec![t; len]);
        for (name, values) in columns {
            frame.insert_numeric(name, values.clone());
        }
        frame
    }

    #[test]
    fn test_population_std_ignoring_missing() {
        let frame = frame(&[("lux", vec![Some(2.0), None, Some(4.0), Some(4.0), Some(4.0), Some(5.0), Some(5.0), Some(7.0), Some(9.0)])]);
        let scaler = StandardScaler::fit(&frame, ["lux"]);

        let params = scaler.params["lux"];
        assert_eq!(params.mean, 5.0);
        assert_eq!(params.scale, 2.0);
        assert_eq!(scaler.transform("lux", 9.0), 2.0);
    }

    #[test]
    fn test_constant_and_unknown_columns() {
        let frame = frame(&[
            ("Temp", vec![Some(27.0), Some(27.0)]),
            ("Humidity", vec![None, None]),
        ]);
        let scaler = StandardScaler::fit(&frame, ["Temp", "Humidity", "absent"]);

        assert_eq!(scaler.transform("Temp", 28.0), 1.0);
        assert!(!scaler.params.contains_key("Humidity"));
        assert_eq!(scaler.transform("absent", 3.0), 3.0);
    }
}

//! Reducing frame series to a fixed number of JSON-safe points.

/// Averages `values` into at most `target` buckets. Non-finite values are
/// skipped inside a bucket; a bucket with no finite value becomes `None`.
pub fn downsample(values: &[f32], target: usize) -> Vec<Option<f64>> {
    if target == 0 {
        return Vec::new();
    }
    if values.len() <= target {
        return values.iter().map(|v| finite(*v)).collect();
    }
    (0..target)
        .map(|b| {
            let start = b * values.len() / target;
            let end = (b + 1) * values.len() / target;
            let finite_values: Vec<f64> = values[start..end]
                .iter()
                .filter(|v| v.is_finite())
                .map(|v| *v as f64)
                .collect();
            if finite_values.is_empty() {
                None
            } else {
                Some(finite_values.iter().sum::<f64>() / finite_values.len() as f64)
            }
        })
        .collect()
}

/// Downsamples every column of a frame-major matrix, returning one series
/// per column.
pub fn downsample_columns<R: AsRef<[f32]>>(rows: &[R], target: usize) -> Vec<Vec<Option<f64>>> {
    let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
    (0..width)
        .map(|c| {
            let column: Vec<f32> = rows.iter().map(|r| r.as_ref()[c]).collect();
            downsample(&column, target)
        })
        .collect()
}

/// Downsamples a time axis the same way as its values.
pub fn downsample_times(times: &[f32], target: usize) -> Vec<f64> {
    downsample(times, target)
        .into_iter()
        .map(|t| t.unwrap_or(0.0))
        .collect()
}

fn finite(value: f32) -> Option<f64> {
    value.is_finite().then_some(value as f64)
}

pub fn finite_or_zero(value: f32) -> f64 {
    if value.is_finite() {
        value as f64
    } else {
        0.0
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_series_pass_through() {
        assert_eq!(downsample(&[1.0, 2.0], 150), vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn long_series_are_bucket_means() {
        let values: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let reduced = downsample(&values, 150);
        assert_eq!(reduced.len(), 150);
        assert_eq!(reduced[0], Some(2.5));

        let odd: Vec<f32> = (0..151).map(|i| i as f32).collect();
        assert!(downsample(&odd, 150).len() <= 150);
    }

    #[test]
    fn nan_becomes_null() {
        let values = vec![f32::NAN; 400];
        let reduced = downsample(&values, 150);
        assert!(reduced.iter().all(Option::is_none));

        let json = serde_json::to_string(&downsample(&[f32::NAN, 1.0], 150)).unwrap();
        assert_eq!(json, "[null,1.0]");

        let mut mixed = vec![1.0f32; 300];
        mixed[0] = f32::NAN;
        assert_eq!(downsample(&mixed, 150)[0], Some(1.0));
    }

    #[test]
    fn scalars_default_to_zero() {
        assert_eq!(finite_or_zero(f32::NAN), 0.0);
        assert_eq!(finite_or_zero(f32::INFINITY), 0.0);
        assert_eq!(finite_or_zero(1.5), 1.5);
    }

    #[test]
    fn columns_become_series() {
        let rows = vec![[1.0f32, 10.0], [3.0, 30.0]];
        assert_eq!(
            downsample_columns(&rows, 1),
            vec![vec![Some(2.0)], vec![Some(20.0)]]
        );
    }

    #[test]
    fn rounds() {
        assert_eq!(round_to(183.04567, 2), 183.05);
    }
}

use crate::config::{TEMPERATURE_BOUNDS, TOP_P_BOUNDS, check_range};
use crate::error::ConfigurationError;
use crate::model::{ParameterPoint, SweepPoint};

/// Cartesian product of the two ranges, temperature-major, numbered from 1.
pub fn build_sweep(
    temperature_range: &[f64],
    top_p_range: &[f64],
) -> Result<Vec<SweepPoint>, ConfigurationError> {
    check_range("temperature_range", temperature_range, TEMPERATURE_BOUNDS)?;
    check_range("top_p_range", top_p_range, TOP_P_BOUNDS)?;

    let points = temperature_range
        .iter()
        .flat_map(|temperature| {
            top_p_range.iter().map(move |top_p| ParameterPoint {
                temperature: *temperature,
                top_p: *top_p,
            })
        })
        .enumerate()
        .map(|(index, point)| SweepPoint {
            sequence: index + 1,
            point,
        })
        .collect();

    Ok(points)
}

pub fn chunk_count(points: usize, batch_size: usize) -> usize {
    points.div_ceil(batch_size.max(1))
}

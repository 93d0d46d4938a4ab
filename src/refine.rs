use crate::config::MattingConfig;
use crate::tensor::Mask;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefineParams {
    /// Values below this are treated as background.
    pub threshold: f32,
    /// Exponent applied to values at or above the threshold.
    pub gamma: f32,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            gamma: 0.8,
        }
    }
}

impl From<&MattingConfig> for RefineParams {
    fn from(config: &MattingConfig) -> Self {
        Self {
            threshold: config.mask_threshold,
            gamma: config.mask_gamma,
        }
    }
}

#[inline]
pub fn refine_value(value: f32, params: RefineParams) -> f32 {
    let value = value.clamp(0.0, 1.0);
    if value < params.threshold {
        0.0
    } else {
        value.powf(params.gamma)
    }
}

/// Clamps every cell to `[0, 1]`, zeroes cells under the threshold and
/// gamma-corrects the rest.
pub fn refine(mask: &Mask, params: RefineParams) -> Mask {
    mask.map(|v| refine_value(v, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_and_gamma() {
        let params = RefineParams::default();
        assert_eq!(refine_value(0.39, params), 0.0);
        assert_eq!(refine_value(-3.0, params), 0.0);
        assert_eq!(refine_value(1.0, params), 1.0);
        assert_eq!(refine_value(7.5, params), 1.0);
        assert!((refine_value(0.5, params) - 0.5f32.powf(0.8)).abs() < 1e-6);
        assert!(refine_value(0.4, params) > 0.4);
    }

    #[test]
    fn test_refine_is_monotonic() {
        let params_set = [
            RefineParams::default(),
            RefineParams {
                threshold: 0.0,
                gamma: 2.2,
            },
            RefineParams {
                threshold: 0.9,
                gamma: 0.3,
            },
        ];
        for params in params_set {
            let mut previous = f32::NEG_INFINITY;
            for step in -200..=1200 {
                let refined = refine_value(step as f32 / 1000.0, params);
                assert!(refined >= previous, "{params:?} decreased at {step}");
                assert!((0.0..=1.0).contains(&refined));
                previous = refined;
            }
        }
    }

    #[test]
    fn test_refine_produces_new_mask() {
        let mask = Mask::from_fn(4, |x, _| x as f32 / 3.0);
        let refined = refine(&mask, RefineParams::default());
        assert_eq!(refined.size(), 4);
        assert_eq!(refined.get(0, 2), 0.0);
        assert_eq!(refined.get(3, 2), 1.0);
        assert_eq!(mask.get(0, 2), 0.0);
        assert!((mask.get(2, 0) - 2.0 / 3.0).abs() < 1e-6);
    }
}

//! Adaptive Runge–Kutta integration for compartment models.
//!
//! `solve_ivp` integrates an autonomous or time-dependent system with the
//! Dormand–Prince 5(4) embedded pair. Steps are shortened to land exactly on
//! every requested evaluation time, so no interpolation is involved.
//!
//! Numerical trouble is never hidden: a non-finite state, a compartment that
//! goes negative beyond tolerance, a vanishing step size or an exhausted step
//! budget all return an `OdeError`.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, OdeError};

// Dormand–Prince tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order solution weights (also row 7 of the tableau).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between the 5th- and 4th-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339_200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Integrator tolerances and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Relative tolerance of the local error estimate.
    pub rtol: f64,
    /// Absolute tolerance of the local error estimate.
    pub atol: f64,
    /// Maximum number of attempted steps per call.
    pub max_steps: usize,
    /// A compartment below `-negative_tolerance * max(1, |y|_inf)` is an error.
    pub negative_tolerance: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            max_steps: 100_000,
            negative_tolerance: 1e-6,
        }
    }
}

impl IntegratorConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for non-positive tolerances or step budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: format!("integrator: {reason}"),
            })
        };
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return invalid("rtol must be positive");
        }
        if !(self.atol.is_finite() && self.atol >= 0.0) {
            return invalid("atol must be non-negative");
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be positive");
        }
        if !(self.negative_tolerance.is_finite() && self.negative_tolerance >= 0.0) {
            return invalid("negative_tolerance must be non-negative");
        }
        Ok(())
    }
}

/// Integrates `dy/dt = rhs(t, y)` from `t = 0` with `y(0) = y0`.
///
/// `rhs` writes the derivative into its third argument. `t_eval` must be
/// ascending and non-negative; the returned states line up with it.
///
/// # Errors
///
/// Returns an `OdeError` if the solution blows up, turns negative, or the
/// step size or step budget runs out.
pub fn solve_ivp<F>(
    rhs: F,
    y0: &[f64],
    t_eval: &[f64],
    config: &IntegratorConfig,
) -> Result<Vec<Vec<f64>>, OdeError>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    let n = y0.len();
    let mut out = Vec::with_capacity(t_eval.len());
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(OdeError::NonFinite { t: 0.0 });
    }

    let mut t = 0.0_f64;
    let mut y = y0.to_vec();
    let mut next = 0;
    while next < t_eval.len() && t_eval[next] <= t {
        out.push(y.clone());
        next += 1;
    }
    if next == t_eval.len() {
        return Ok(out);
    }

    let mut k1 = vec![0.0; n];
    let mut k2 = vec![0.0; n];
    let mut k3 = vec![0.0; n];
    let mut k4 = vec![0.0; n];
    let mut k5 = vec![0.0; n];
    let mut k6 = vec![0.0; n];
    let mut k7 = vec![0.0; n];
    let mut stage = vec![0.0; n];
    let mut y_new = vec![0.0; n];

    rhs(t, &y, &mut k1);
    let t_end = t_eval[t_eval.len() - 1];
    let mut h = initial_step(&y, &k1, t_end, config);
    let mut steps = 0;

    while next < t_eval.len() {
        if steps >= config.max_steps {
            return Err(OdeError::TooManySteps {
                max_steps: config.max_steps,
            });
        }
        steps += 1;

        let target = t_eval[next];
        let proposed = h;
        let landing = h >= target - t;
        if landing {
            h = target - t;
        }
        let min_step = 16.0 * f64::EPSILON * t.abs().max(1.0);

        for i in 0..n {
            stage[i] = y[i] + h * A21 * k1[i];
        }
        rhs(t + C2 * h, &stage, &mut k2);
        for i in 0..n {
            stage[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        rhs(t + C3 * h, &stage, &mut k3);
        for i in 0..n {
            stage[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        rhs(t + C4 * h, &stage, &mut k4);
        for i in 0..n {
            stage[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        rhs(t + C5 * h, &stage, &mut k5);
        for i in 0..n {
            stage[i] = y[i]
                + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        rhs(t + h, &stage, &mut k6);
        for i in 0..n {
            y_new[i] = y[i] + h * (B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
        }
        rhs(t + h, &y_new, &mut k7);

        if y_new.iter().chain(k7.iter()).any(|v| !v.is_finite()) {
            h *= MIN_FACTOR;
            if h < min_step {
                return Err(OdeError::NonFinite { t });
            }
            continue;
        }

        let mut sum = 0.0;
        for i in 0..n {
            let local = h
                * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let scale = config.atol + config.rtol * y[i].abs().max(y_new[i].abs());
            let ratio = if scale > 0.0 { local / scale } else { 0.0 };
            sum += ratio * ratio;
        }
        let err = if n == 0 { 0.0 } else { (sum / n as f64).sqrt() };

        if err <= 1.0 {
            t = if landing { target } else { t + h };
            std::mem::swap(&mut y, &mut y_new);
            std::mem::swap(&mut k1, &mut k7);
            check_non_negative(&y, t, config.negative_tolerance)?;

            while next < t_eval.len() && t_eval[next] <= t {
                out.push(y.clone());
                next += 1;
            }

            let factor = if err == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };
            // A landing step may have been truncated; never shrink below the proposal.
            h = if landing { (h * factor).max(proposed) } else { h * factor };
        } else {
            h *= (SAFETY * err.powf(-0.2)).max(MIN_FACTOR);
            if h < min_step {
                return Err(OdeError::StepSizeUnderflow { t, h });
            }
        }
    }

    Ok(out)
}

fn initial_step(y: &[f64], f0: &[f64], t_end: f64, config: &IntegratorConfig) -> f64 {
    let n = y.len().max(1) as f64;
    let mut d0 = 0.0;
    let mut d1 = 0.0;
    for (yi, fi) in y.iter().zip(f0) {
        let scale = config.atol + config.rtol * yi.abs();
        if scale > 0.0 {
            d0 += (yi / scale).powi(2);
            d1 += (fi / scale).powi(2);
        }
    }
    let d0 = (d0 / n).sqrt();
    let d1 = (d1 / n).sqrt();
    let h = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };
    h.min(t_end.abs().max(1e-6))
}

fn check_non_negative(y: &[f64], t: f64, tolerance: f64) -> Result<(), OdeError> {
    let magnitude = y.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let floor = -tolerance * magnitude;
    match y.iter().position(|&v| v < floor) {
        Some(index) => Err(OdeError::NegativeCompartment {
            index,
            value: y[index],
            t,
        }),
        None => Ok(()),
    }
}

/// Transposes a `[time][compartment]` trajectory into per-compartment series.
#[must_use]
pub fn by_compartment(states: &[Vec<f64>], compartments: usize) -> Vec<Vec<f64>> {
    (0..compartments)
        .map(|c| states.iter().map(|row| row[c]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: usize) -> Vec<f64> {
        (1..=n).map(|d| d as f64).collect()
    }

    #[test]
    fn test_exponential_decay_matches_closed_form() {
        let states = solve_ivp(
            |_, y, dy| dy[0] = -0.5 * y[0],
            &[100.0],
            &days(10),
            &IntegratorConfig::default(),
        )
        .unwrap();
        assert_eq!(states.len(), 10);
        for (i, state) in states.iter().enumerate() {
            let expected = 100.0 * (-0.5 * (i + 1) as f64).exp();
            assert!((state[0] - expected).abs() < 1e-3 * expected.max(1.0), "day {}", i + 1);
        }
    }

    #[test]
    fn test_constant_system_is_exact() {
        let states = solve_ivp(
            |_, _, dy| dy.fill(0.0),
            &[1.0, 0.0, 3.0],
            &days(5),
            &IntegratorConfig::default(),
        )
        .unwrap();
        assert!(states.iter().all(|s| s == &vec![1.0, 0.0, 3.0]));
    }

    #[test]
    fn test_eval_at_zero_returns_initial_state() {
        let states = solve_ivp(|_, _, dy| dy[0] = 1.0, &[2.0], &[0.0, 1.0], &IntegratorConfig::default()).unwrap();
        assert_eq!(states[0], vec![2.0]);
        assert!((states[1][0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_eval_returns_nothing() {
        let states = solve_ivp(|_, _, dy| dy[0] = 1.0, &[2.0], &[], &IntegratorConfig::default()).unwrap();
        assert!(states.is_empty());
    }

    #[test]
    fn test_negative_compartment_is_reported() {
        let err = solve_ivp(|_, _, dy| dy[0] = -1.0, &[0.5], &days(2), &IntegratorConfig::default()).unwrap_err();
        assert!(matches!(err, OdeError::NegativeCompartment { index: 0, .. }));
    }

    #[test]
    fn test_blow_up_is_reported() {
        // y' = y^2 with y(0) = 1 diverges at t = 1.
        let result = solve_ivp(|_, y, dy| dy[0] = y[0] * y[0], &[1.0], &days(2), &IntegratorConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_step_budget_is_enforced() {
        let config = IntegratorConfig {
            max_steps: 2,
            rtol: 1e-10,
            atol: 1e-12,
            ..IntegratorConfig::default()
        };
        let err = solve_ivp(|t, _, dy| dy[0] = t.sin(), &[1.0], &days(50), &config).unwrap_err();
        assert_eq!(err, OdeError::TooManySteps { max_steps: 2 });
    }

    #[test]
    fn test_validate() {
        assert!(IntegratorConfig::default().validate().is_ok());
        let bad = IntegratorConfig {
            rtol: 0.0,
            ..IntegratorConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_by_compartment() {
        let series = by_compartment(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2);
        assert_eq!(series, vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
    }
}

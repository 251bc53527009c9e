//! Linear trend of the annual reappointment proportions.
//!
//! Uses t-distribution critical values and p-values from `statrs`.

use log::{debug, info};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

use std::cmp::Ordering;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::config::*;

/// Residual sums of squares below this fraction of the total sum of squares
/// are rounding noise: the points are on a line.
const PERFECT_FIT_TOLERANCE: f64 = 1e-20;

/// Above this size, Jarque-Bera replaces Shapiro-Wilk.
const SHAPIRO_WILK_MAX_N: usize = 50;

/// Fits the annual proportions against the years and runs the diagnostics.
///
/// Only the years with at least one appointment are used: a year without
/// appointments has no proportion, it is not a 0% year. At least
/// three such years are needed.
pub fn analyze_trend(series: &[AnnualAggregate]) -> Result<TrendAnalysis, AnalysisError> {
    let mut valid: Vec<(i32, f64)> = series
        .iter()
        .filter_map(|a| match a.proportion {
            Some(p) if a.total_appointments > 0 && p.is_finite() => Some((a.year, p)),
            _ => None,
        })
        .collect();
    valid.sort_by_key(|(y, _)| *y);
    info!(
        "analyze_trend: {} annual points, {} usable",
        series.len(),
        valid.len()
    );
    for a in series.iter() {
        if a.total_appointments == 0 {
            debug!("analyze_trend: {} has no appointments, excluded", a.year);
        }
    }

    if valid.len() < MIN_REGRESSION_POINTS {
        return Err(AnalysisError::InsufficientData {
            valid_points: valid.len(),
            required: MIN_REGRESSION_POINTS,
        });
    }

    let years: Vec<i32> = valid.iter().map(|(y, _)| *y).collect();
    let proportions: Vec<f64> = valid.iter().map(|(_, p)| *p).collect();
    let xs: Vec<f64> = years.iter().map(|y| *y as f64).collect();

    let regression = fit_ols(&xs, &proportions)?;

    let normality = if regression.standardized_residuals.iter().all(|z| *z == 0.0) {
        None
    } else if regression.n <= SHAPIRO_WILK_MAX_N {
        shapiro_wilk(&regression.residuals)
    } else {
        jarque_bera(&regression.residuals)
    };
    if let Some(nc) = normality.as_ref() {
        debug!(
            "analyze_trend: {} on residuals: statistic {:.4}, p-value {:.4}",
            nc.test, nc.statistic, nc.p_value
        );
    }

    let year_span = years[years.len() - 1] as f64 - years[0] as f64;
    let direction = if regression.slope > 0.0 {
        TrendDirection::Increasing
    } else if regression.slope < 0.0 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    let res = TrendAnalysis {
        autocorrelation: Autocorrelation::from_durbin_watson(regression.durbin_watson),
        normality,
        annual_change_pp: regression.slope * 100.0,
        total_change_pp: regression.slope * year_span * 100.0,
        significant: regression.p_value < SIGNIFICANCE_LEVEL,
        direction,
        years,
        proportions,
        regression,
    };
    info!(
        "analyze_trend: slope {:.6} (p-value {:.6}), {} trend, significant: {}",
        res.regression.slope, res.regression.p_value, res.direction, res.significant
    );
    Ok(res)
}

/// Ordinary least squares fit of `ys = slope * xs + intercept`.
///
/// Returns the fit with its standard errors, 95% confidence intervals
/// (t-distribution, n - 2 degrees of freedom), the residuals and their
/// diagnostics (Durbin-Watson, standardized residuals, outliers).
pub fn fit_ols(xs: &[f64], ys: &[f64]) -> Result<RegressionResult, AnalysisError> {
    debug_assert_eq!(xs.len(), ys.len(), "fit_ols: mismatched series");
    // Extra values of the longer series are ignored.
    let n = xs.len().min(ys.len());
    let (xs, ys) = (&xs[..n], &ys[..n]);
    if n < MIN_REGRESSION_POINTS {
        return Err(AnalysisError::InsufficientData {
            valid_points: n,
            required: MIN_REGRESSION_POINTS,
        });
    }
    let nf = n as f64;
    let x_mean = xs.iter().sum::<f64>() / nf;
    let y_mean = ys.iter().sum::<f64>() / nf;
    let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    let syy: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    if sxx <= 0.0 || !sxx.is_finite() {
        return Err(AnalysisError::DegenerateYears {
            year: xs[0].round() as i32,
        });
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    // A constant series has no measurable correlation.
    let r = if syy > 0.0 {
        sxy / (sxx * syy).sqrt()
    } else {
        0.0
    };

    let residuals: Vec<f64> = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| y - (slope * x + intercept))
        .collect();
    let raw_sse: f64 = residuals.iter().map(|e| e * e).sum();
    let perfect = raw_sse <= PERFECT_FIT_TOLERANCE * syy;
    let sse = if perfect { 0.0 } else { raw_sse };
    debug!(
        "fit_ols: n {}, sxx {:.6}, sxy {:.6}, syy {:.6}, sse {:.6e}, perfect fit: {}",
        n, sxx, sxy, syy, sse, perfect
    );

    let df = nf - 2.0;
    let s2 = sse / df;
    let standard_error = (s2 / sxx).sqrt();
    let standard_error_intercept = (s2 * (1.0 / nf + x_mean * x_mean / sxx)).sqrt();
    let t_statistic = slope / standard_error;
    let p_value = two_tailed_p_value(t_statistic, df);
    let t_crit = t_critical_value(df);
    let confidence_interval_slope = (
        slope - t_crit * standard_error,
        slope + t_crit * standard_error,
    );
    let confidence_interval_intercept = (
        intercept - t_crit * standard_error_intercept,
        intercept + t_crit * standard_error_intercept,
    );

    let durbin_watson = if sse > 0.0 {
        let num: f64 = residuals.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        num / raw_sse
    } else {
        f64::NAN
    };

    let standardized_residuals = standardize(&residuals, perfect);
    let outlier_flags: Vec<bool> = standardized_residuals
        .iter()
        .map(|z| z.abs() > OUTLIER_THRESHOLD)
        .collect();

    Ok(RegressionResult {
        n,
        slope,
        intercept,
        r,
        r_squared: r * r,
        p_value,
        t_statistic,
        standard_error,
        standard_error_intercept,
        confidence_interval_slope,
        confidence_interval_intercept,
        durbin_watson,
        residuals,
        standardized_residuals,
        outlier_flags,
    })
}

// Residuals divided by their sample standard deviation.
fn standardize(residuals: &[f64], perfect: bool) -> Vec<f64> {
    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let var = residuals.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = var.sqrt();
    if perfect || sd <= 0.0 || !sd.is_finite() {
        return vec![0.0; residuals.len()];
    }
    residuals.iter().map(|e| e / sd).collect()
}

fn two_tailed_p_value(t: f64, df: f64) -> f64 {
    // 0 / 0: flat series without any residual, no evidence of a slope.
    if t.is_nan() {
        return 1.0;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

fn t_critical_value(df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => dist.inverse_cdf(0.975),
        Err(_) => f64::NAN,
    }
}

/// Shapiro-Wilk test (Royston 1992 approximation), for 3 <= n <= 5000.
///
/// Returns None when the values have no spread.
pub fn shapiro_wilk(values: &[f64]) -> Option<NormalityCheck> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let mut x = values.to_vec();
    x.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let nf = n as f64;
    let mean = x.iter().sum::<f64>() / nf;
    let ss: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
    if ss <= 0.0 || !ss.is_finite() {
        return None;
    }
    let normal = Normal::new(0.0, 1.0).ok()?;

    let a = shapiro_wilk_coefficients(n, &normal);
    let num: f64 = a.iter().zip(x.iter()).map(|(ai, xi)| ai * xi).sum();
    let w = ((num * num) / ss).clamp(0.0, 1.0);

    let p_value = if n == 3 {
        (6.0 / PI * (w.sqrt().asin() - (0.75f64).sqrt().asin())).clamp(0.0, 1.0)
    } else if w >= 1.0 {
        1.0
    } else if n <= 11 {
        let gamma = 0.459 * nf - 2.273;
        let w1 = -(gamma - (1.0 - w).ln()).ln();
        let mu = 0.5440 - 0.39978 * nf + 0.025054 * nf.powi(2) - 0.0006714 * nf.powi(3);
        let sigma = (1.3822 - 0.77857 * nf + 0.062767 * nf.powi(2) - 0.0020322 * nf.powi(3)).exp();
        normal.sf((w1 - mu) / sigma)
    } else {
        let ln_n = nf.ln();
        let w1 = (1.0 - w).ln();
        let mu = -1.5861 - 0.31082 * ln_n - 0.083751 * ln_n.powi(2) + 0.0038915 * ln_n.powi(3);
        let sigma = (-0.4803 - 0.082676 * ln_n + 0.0030302 * ln_n.powi(2)).exp();
        normal.sf((w1 - mu) / sigma)
    };

    Some(NormalityCheck {
        test: NormalityTest::ShapiroWilk,
        statistic: w,
        p_value,
    })
}

fn shapiro_wilk_coefficients(n: usize, normal: &Normal) -> Vec<f64> {
    if n == 3 {
        return vec![-FRAC_1_SQRT_2, 0.0, FRAC_1_SQRT_2];
    }
    let nf = n as f64;
    let m: Vec<f64> = (1..=n)
        .map(|i| normal.inverse_cdf((i as f64 - 0.375) / (nf + 0.25)))
        .collect();
    let mm: f64 = m.iter().map(|v| v * v).sum();
    let u = 1.0 / nf.sqrt();
    let poly = |c: [f64; 5]| c[0] * u + c[1] * u.powi(2) + c[2] * u.powi(3) + c[3] * u.powi(4) + c[4] * u.powi(5);

    let mut a = vec![0.0; n];
    let a_n = m[n - 1] / mm.sqrt() + poly([0.221157, -0.147981, -2.071190, 4.434685, -2.706056]);
    a[n - 1] = a_n;
    a[0] = -a_n;
    if n > 5 {
        let a_n1 =
            m[n - 2] / mm.sqrt() + poly([0.042981, -0.293762, -1.752461, 5.682633, -3.582633]);
        let phi = (mm - 2.0 * m[n - 1].powi(2) - 2.0 * m[n - 2].powi(2))
            / (1.0 - 2.0 * a_n.powi(2) - 2.0 * a_n1.powi(2));
        a[n - 2] = a_n1;
        a[1] = -a_n1;
        for i in 2..n - 2 {
            a[i] = m[i] / phi.sqrt();
        }
    } else {
        let phi = (mm - 2.0 * m[n - 1].powi(2)) / (1.0 - 2.0 * a_n.powi(2));
        for i in 1..n - 1 {
            a[i] = m[i] / phi.sqrt();
        }
    }
    a
}

/// Jarque-Bera test, the large-sample alternative to Shapiro-Wilk.
pub fn jarque_bera(values: &[f64]) -> Option<NormalityCheck> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf;
    if m2 <= 0.0 || !m2.is_finite() {
        return None;
    }
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / nf;
    let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / nf;
    let skewness = m3 / m2.powf(1.5);
    let kurtosis = m4 / (m2 * m2);
    let jb = nf / 6.0 * (skewness.powi(2) + (kurtosis - 3.0).powi(2) / 4.0);
    let chi2 = ChiSquared::new(2.0).ok()?;
    Some(NormalityCheck {
        test: NormalityTest::JarqueBera,
        statistic: jb,
        p_value: chi2.sf(jb),
    })
}

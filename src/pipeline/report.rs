// The step 9 report and its JSON summary.

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::pipeline::*;

fn fmt_f64(x: f64, digits: usize) -> String {
    if x.is_nan() {
        "undefined".to_string()
    } else {
        format!("{:.*}", digits, x)
    }
}

fn fmt_p_value(p: f64) -> String {
    if p < 1e-4 {
        format!("{:.3e}", p)
    } else {
        format!("{:.6}", p)
    }
}

/// The human-readable report of the trend analysis.
pub fn render_report(analysis: &TrendAnalysis) -> String {
    let reg = &analysis.regression;
    let first_year = analysis.years.first().copied().unwrap_or_default();
    let last_year = analysis.years.last().copied().unwrap_or_default();
    let mut lines: Vec<String> = vec![
        "Reappointment trend analysis".to_string(),
        "============================".to_string(),
        String::new(),
        format!(
            "Period: {}-{} ({} years with appointments)",
            first_year, last_year, reg.n
        ),
        String::new(),
        "Year  Proportion  Predicted  Residual  Std. residual".to_string(),
    ];
    for (idx, year) in analysis.years.iter().enumerate() {
        let observed = analysis.proportions[idx];
        let residual = reg.residuals[idx];
        let flag = if reg.outlier_flags[idx] { "  outlier" } else { "" };
        lines.push(format!(
            "{}  {:>9.4}%  {:>8.4}%  {:>8.4}  {:>13.3}{}",
            year,
            observed * 100.0,
            (observed - residual) * 100.0,
            residual,
            reg.standardized_residuals[idx],
            flag
        ));
    }
    lines.push(String::new());
    lines.push("Regression (proportion ~ year)".to_string());
    lines.push(format!(
        "  Slope:      {} (SE {}, 95% CI [{}, {}])",
        fmt_f64(reg.slope, 6),
        fmt_f64(reg.standard_error, 6),
        fmt_f64(reg.confidence_interval_slope.0, 6),
        fmt_f64(reg.confidence_interval_slope.1, 6)
    ));
    lines.push(format!(
        "  Intercept:  {} (SE {}, 95% CI [{}, {}])",
        fmt_f64(reg.intercept, 4),
        fmt_f64(reg.standard_error_intercept, 4),
        fmt_f64(reg.confidence_interval_intercept.0, 4),
        fmt_f64(reg.confidence_interval_intercept.1, 4)
    ));
    lines.push(format!("  R:          {}", fmt_f64(reg.r, 4)));
    lines.push(format!("  R squared:  {}", fmt_f64(reg.r_squared, 4)));
    lines.push(format!(
        "  t ({} df):  {}",
        reg.n.saturating_sub(2),
        fmt_f64(reg.t_statistic, 4)
    ));
    lines.push(format!("  p-value:    {}", fmt_p_value(reg.p_value)));
    lines.push(String::new());
    lines.push("Diagnostics".to_string());
    lines.push(format!(
        "  Durbin-Watson: {} ({})",
        fmt_f64(reg.durbin_watson, 3),
        analysis.autocorrelation
    ));
    match &analysis.normality {
        Some(check) => lines.push(format!(
            "  {} normality test: statistic {}, p-value {} ({})",
            check.test,
            fmt_f64(check.statistic, 4),
            fmt_p_value(check.p_value),
            if check.looks_normal() {
                "residuals consistent with normality"
            } else {
                "residuals not normal"
            }
        )),
        None => lines.push("  Normality test: not computed (residuals have no variance)".to_string()),
    }
    let outliers: Vec<String> = analysis
        .years
        .iter()
        .zip(reg.outlier_flags.iter())
        .filter(|(_, o)| **o)
        .map(|(y, _)| y.to_string())
        .collect();
    if outliers.is_empty() {
        lines.push("  Outliers (|z| > 2): none".to_string());
    } else {
        lines.push(format!("  Outliers (|z| > 2): {}", outliers.join(", ")));
    }
    lines.push(String::new());
    lines.push("Conclusion".to_string());
    lines.push(format!(
        "  Annual change: {:+.3} percentage points per year",
        analysis.annual_change_pp
    ));
    lines.push(format!(
        "  Total change over {}-{}: {:+.3} percentage points",
        first_year, last_year, analysis.total_change_pp
    ));
    let verdict = if analysis.significant {
        format!(
            "  The reappointment proportion is {} (statistically significant, p < 0.05).",
            analysis.direction
        )
    } else {
        format!(
            "  No statistically significant trend (p >= 0.05); the fitted direction is {}.",
            analysis.direction
        )
    };
    lines.push(verdict);
    lines.push(String::new());
    lines.join("\n")
}

fn pair_js(p: (f64, f64)) -> JSValue {
    json!([p.0, p.1])
}

/// The analysis as JSON. Undefined statistics are written as `null`.
pub fn summary_json(analysis: &TrendAnalysis) -> JSValue {
    let reg = &analysis.regression;
    let normality = match &analysis.normality {
        Some(check) => json!({
            "test": check.test.to_string(),
            "statistic": check.statistic,
            "pValue": check.p_value,
        }),
        None => JSValue::Null,
    };
    json!({
        "years": analysis.years,
        "proportions": analysis.proportions,
        "regression": {
            "n": reg.n,
            "slope": reg.slope,
            "intercept": reg.intercept,
            "r": reg.r,
            "rSquared": reg.r_squared,
            "pValue": reg.p_value,
            "tStatistic": reg.t_statistic,
            "standardError": reg.standard_error,
            "standardErrorIntercept": reg.standard_error_intercept,
            "confidenceIntervalSlope": pair_js(reg.confidence_interval_slope),
            "confidenceIntervalIntercept": pair_js(reg.confidence_interval_intercept),
            "durbinWatson": reg.durbin_watson,
            "residuals": reg.residuals,
            "standardizedResiduals": reg.standardized_residuals,
            "outliers": reg.outlier_flags,
        },
        "autocorrelation": analysis.autocorrelation.to_string(),
        "normality": normality,
        "annualChangePp": analysis.annual_change_pp,
        "totalChangePp": analysis.total_change_pp,
        "significant": analysis.significant,
        "direction": analysis.direction.to_string(),
    })
}

/// The JSON summary, pretty-printed.
pub fn render_summary(analysis: &TrendAnalysis) -> PipelineResult<String> {
    serde_json::to_string_pretty(&summary_json(analysis)).context(SerializingJsonSnafu {})
}

pub fn write_report(path: &str, contents: &str) -> PipelineResult<()> {
    fs::write(path, contents).context(WritingReportSnafu { path })?;
    info!("Wrote {:?}", path);
    Ok(())
}

/// Compares the pretty-printed summary with a reference file.
///
/// The differences are printed as a line diff.
pub fn check_reference(path: &str, pretty_summary: &str) -> PipelineResult<()> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let _: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("check_reference: reference: {:?}", contents);
    if contents.trim_end() != pretty_summary.trim_end() {
        warn!("Found differences with the reference {:?}", path);
        print_diff(contents.trim_end(), pretty_summary.trim_end(), "\n");
        return ReferenceMismatchSnafu { path }.fail();
    }
    Ok(())
}

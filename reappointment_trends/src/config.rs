// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// One appointment, as read from a row of the source tables.
///
/// The `reappointed` flag is either given by the source or derived by
/// [`crate::detect_reappointments`].
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct AppointmentRecord {
    pub name: String,
    pub position: String,
    pub organization: String,
    /// Unknown years are kept and sorted after every known year.
    pub year: Option<i32>,
    pub reappointed: bool,
}

impl AppointmentRecord {
    pub fn new(name: &str, position: &str, organization: &str, year: Option<i32>) -> Self {
        AppointmentRecord {
            name: name.to_string(),
            position: position.to_string(),
            organization: organization.to_string(),
            year,
            reappointed: false,
        }
    }

    pub fn flagged(mut self) -> Self {
        self.reappointed = true;
        self
    }
}

// ******** Output data structures *********

/// Appointment and reappointment totals for one organization in one year.
#[derive(PartialEq, Debug, Clone)]
pub struct OrgYearAggregate {
    pub organization: String,
    pub year: i32,
    pub total_appointments: u64,
    pub reappointments: u64,
    /// None when there are no appointments. An undefined rate is not a 0% rate.
    pub rate: Option<f64>,
}

/// The organization with the highest reappointment rate in a year.
#[derive(PartialEq, Debug, Clone)]
pub struct YearlyMaximum {
    pub year: i32,
    pub organization: String,
    pub rate: f64,
    pub total_appointments: u64,
    pub reappointments: u64,
}

/// Government-wide totals for one year.
#[derive(PartialEq, Debug, Clone)]
pub struct AnnualAggregate {
    pub year: i32,
    pub total_appointments: u64,
    pub total_reappointments: u64,
    /// None when there are no appointments in this year.
    pub proportion: Option<f64>,
}

impl AnnualAggregate {
    pub fn new(year: i32, total_appointments: u64, total_reappointments: u64) -> Self {
        let proportion = if total_appointments > 0 {
            Some(total_reappointments as f64 / total_appointments as f64)
        } else {
            None
        };
        AnnualAggregate {
            year,
            total_appointments,
            total_reappointments,
            proportion,
        }
    }
}

/// Ordinary least squares fit of a series, with its diagnostics.
#[derive(PartialEq, Debug, Clone)]
pub struct RegressionResult {
    pub n: usize,
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient.
    pub r: f64,
    pub r_squared: f64,
    /// Two-tailed p-value for H0: slope = 0, with n - 2 degrees of freedom.
    pub p_value: f64,
    pub t_statistic: f64,
    /// Standard error of the slope.
    pub standard_error: f64,
    pub standard_error_intercept: f64,
    pub confidence_interval_slope: (f64, f64),
    pub confidence_interval_intercept: (f64, f64),
    /// Undefined (NaN) when all the residuals are zero.
    pub durbin_watson: f64,
    pub residuals: Vec<f64>,
    pub standardized_residuals: Vec<f64>,
    pub outlier_flags: Vec<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Autocorrelation {
    Positive,
    Negative,
    NotSignificant,
    /// The statistic could not be computed (perfect fit).
    Undefined,
}

impl Autocorrelation {
    pub fn from_durbin_watson(dw: f64) -> Autocorrelation {
        if !dw.is_finite() {
            Autocorrelation::Undefined
        } else if dw < 1.5 {
            Autocorrelation::Positive
        } else if dw > 2.5 {
            Autocorrelation::Negative
        } else {
            Autocorrelation::NotSignificant
        }
    }
}

impl Display for Autocorrelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Autocorrelation::Positive => "positive autocorrelation",
            Autocorrelation::Negative => "negative autocorrelation",
            Autocorrelation::NotSignificant => "no significant autocorrelation",
            Autocorrelation::Undefined => "undefined (residuals are all zero)",
        };
        write!(f, "{}", s)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum NormalityTest {
    ShapiroWilk,
    JarqueBera,
}

impl Display for NormalityTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalityTest::ShapiroWilk => write!(f, "Shapiro-Wilk"),
            NormalityTest::JarqueBera => write!(f, "Jarque-Bera"),
        }
    }
}

/// A normality check of the residuals. Informational only.
#[derive(PartialEq, Debug, Clone)]
pub struct NormalityCheck {
    pub test: NormalityTest,
    pub statistic: f64,
    pub p_value: f64,
}

impl NormalityCheck {
    pub fn looks_normal(&self) -> bool {
        self.p_value >= 0.05
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// The full outcome of the trend analysis over the annual proportions.
#[derive(PartialEq, Debug, Clone)]
pub struct TrendAnalysis {
    pub regression: RegressionResult,
    /// The years that entered the fit, in increasing order.
    pub years: Vec<i32>,
    pub proportions: Vec<f64>,
    pub autocorrelation: Autocorrelation,
    pub normality: Option<NormalityCheck>,
    /// Slope expressed in percentage points per year.
    pub annual_change_pp: f64,
    /// Change over the whole fitted period, in percentage points.
    pub total_change_pp: f64,
    pub significant: bool,
    pub direction: TrendDirection,
}

// ********* Data quality **********

/// Non-fatal conditions found while aggregating.
///
/// They are returned next to the (best-effort) output so that the caller
/// can surface them.
#[derive(PartialEq, Debug, Clone)]
pub enum DataQualityWarning {
    /// A record dated outside of the analysed period. It was excluded.
    YearOutOfRange { year: i32, count: u64 },
    /// Records without a year. They were excluded from the yearly totals.
    MissingYear { count: u64 },
    /// More reappointments than appointments. The rate was clamped to 1.0.
    ReappointmentsExceedTotal {
        organization: String,
        year: i32,
        reappointments: u64,
        total_appointments: u64,
    },
    /// A rate above 100% found in an input table. It was clamped to 1.0.
    RateAboveOne {
        organization: String,
        year: i32,
        rate: f64,
    },
}

impl Display for DataQualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataQualityWarning::YearOutOfRange { year, count } => write!(
                f,
                "{} record(s) dated {} are outside of the analysed period and were excluded",
                count, year
            ),
            DataQualityWarning::MissingYear { count } => {
                write!(f, "{} record(s) have no year and were excluded", count)
            }
            DataQualityWarning::ReappointmentsExceedTotal {
                organization,
                year,
                reappointments,
                total_appointments,
            } => write!(
                f,
                "{} in {}: {} reappointments for {} appointments, rate clamped to 100%",
                organization, year, reappointments, total_appointments
            ),
            DataQualityWarning::RateAboveOne {
                organization,
                year,
                rate,
            } => write!(
                f,
                "{} in {}: rate {:.4} above 100%, clamped",
                organization, year, rate
            ),
        }
    }
}

/// Errors that prevent the trend analysis from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AnalysisError {
    /// Fewer valid points than needed for a regression with diagnostics.
    InsufficientData { valid_points: usize, required: usize },
    /// All the valid points share the same year: the slope is undefined.
    DegenerateYears { year: i32 },
}

impl Error for AnalysisError {}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::InsufficientData {
                valid_points,
                required,
            } => write!(
                f,
                "InsufficientDataError: {} valid point(s) for the regression, at least {} required",
                valid_points, required
            ),
            AnalysisError::DegenerateYears { year } => write!(
                f,
                "all the valid points are in year {}, the trend is undefined",
                year
            ),
        }
    }
}

// ********* Configuration **********

/// The tokens dropped from the start and the end of a name before grouping.
///
/// How aggressively names are normalized is a policy: the table can be
/// extended or emptied from the configuration file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NormalizationRules {
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

impl NormalizationRules {
    pub const DEFAULT_PREFIXES: [&'static str; 5] = ["dr", "mr", "mrs", "ms", "prof"];
    pub const DEFAULT_SUFFIXES: [&'static str; 8] = ["jr", "sr", "ii", "iii", "iv", "v", "phd", "qc"];

    pub fn new(prefixes: &[String], suffixes: &[String]) -> Self {
        NormalizationRules {
            prefixes: prefixes.iter().map(|s| rule_token(s)).collect(),
            suffixes: suffixes.iter().map(|s| rule_token(s)).collect(),
        }
    }

    /// No honorific or suffix is dropped: only case, spacing and punctuation.
    pub fn minimal() -> Self {
        NormalizationRules {
            prefixes: Vec::new(),
            suffixes: Vec::new(),
        }
    }
}

impl Default for NormalizationRules {
    fn default() -> Self {
        NormalizationRules {
            prefixes: Self::DEFAULT_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            suffixes: Self::DEFAULT_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// Entries are matched against punctuation-free, lowercase tokens.
fn rule_token(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Minimum number of valid annual points for the regression.
pub const MIN_REGRESSION_POINTS: usize = 3;

/// Standardized residuals above this magnitude are flagged as outliers.
pub const OUTLIER_THRESHOLD: f64 = 2.0;

/// Significance level of the slope test.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

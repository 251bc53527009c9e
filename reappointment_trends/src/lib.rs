/*!
Reappointment detection and trend analysis for public appointment records.

The crate has two parts:
- [`detect_reappointments`] flags, for every person holding the same position
  in the same organization, all the appointments that follow the first one.
- [`analyze_trend`] fits a linear trend to the yearly proportion of
  reappointments and runs the usual regression diagnostics.

The aggregation helpers in between ([`appointment_counts`],
[`org_year_aggregates`], [`yearly_maximums`], [`annual_aggregates`]) build the
organization-by-year tables and the annual series. No function here performs
any I/O: reading and writing the tables is left to the caller.

```
use reappointment_trends::*;

let records = vec![
    AppointmentRecord::new("Jane Doe", "Board Member", "Dept X", Some(2015)),
    AppointmentRecord::new("jane doe", "board member", "dept x", Some(2019)),
];
let detection = detect_reappointments(&records, &NormalizationRules::default());
assert!(!detection.records[0].reappointed);
assert!(detection.records[1].reappointed);

let (annual, warnings) = annual_aggregates(&detection.records, Some(2015..=2019));
assert!(warnings.is_empty());
// Only two years have appointments: not enough for a trend.
assert!(analyze_trend(&annual).is_err());
```

See the [manual] for the policies applied at each step.
*/

mod aggregate;
mod config;
mod detector;
pub mod manual;
mod normalize;
mod trend;

pub use crate::aggregate::{
    annual_aggregates, annual_totals, appointment_counts, check_rates, org_year_aggregates,
    reappointment_counts, yearly_maximums, OrgYearCounts,
};
pub use crate::config::*;
pub use crate::detector::{detect_reappointments, Detection, DetectionStats};
pub use crate::normalize::{normalize_name, normalize_text, IdentityKey};
pub use crate::trend::{analyze_trend, fit_ols, jarque_bera, shapiro_wilk};

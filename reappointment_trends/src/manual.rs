/*!

This is the long-form manual for `reappointment_trends` and `reappoint`.

## Pipeline

The analysis runs as nine steps. Each step reads the output of an earlier
step and writes one file in the output directory (`analysis_data` by
default):

| step | command | output |
|------|---------|--------|
| 1 | `reappoint combine` | `step1_combined_appointments.csv` |
| 2 | `reappoint extract` | `step2_key_columns_data.csv` |
| 3 | `reappoint detect` | `step3_repeats_marked.csv` |
| 4 | `reappoint counts` | `step4_appointment_counts.csv` |
| 5 | `reappoint reappointment-counts` | `step5_reappointment_counts.csv` |
| 6 | `reappoint rates` | `step6_reappointment_rates.csv` |
| 7 | `reappoint max-rates` | `step7_yearly_max_rates.csv` |
| 8 | `reappoint annual-proportions` | `step8_annual_proportions.csv` |
| 9 | `reappoint regression` | `step9_regression_results.txt` |

`reappoint` without a command, or `reappoint all`, runs the nine steps in order.

The raw files are expected in `raw_data/appointments_<year>.csv`, one per year
from 2013 to 2024. A missing year is reported and skipped.

## Identity and reappointments

Two appointments belong to the same identity when their name, position and
organization are equal after normalization:
- letters are lowercased and punctuation is removed,
- whitespace is collapsed,
- for names only, leading honorifics (`dr`, `mr`, `mrs`, `ms`, `prof`) and
  trailing suffixes (`jr`, `sr`, `ii`, `iii`, `iv`, `v`, `phd`, `qc`) are dropped.

The honorific and suffix lists are configurable (see below). An empty list
turns the corresponding stripping off.

Inside an identity, the appointments are sorted by year. The first one is the
original appointment, every other one is a reappointment. Appointments without
a year are placed after all the dated ones. When two appointments share the
same year, the one that comes first in the input is the original.

A record with an empty name, position or organization cannot be matched with
anything: it is never flagged by the detection. A flag already set in the
source data is always kept.

## Rates and maxima

The rate of an organization in a year is the number of reappointments divided
by the number of appointments. When there is no appointment, the rate is
undefined (an empty cell), which is not the same as a 0% rate.

When several organizations share the highest rate of a year, the one with
the most appointments is selected, then the first one in alphabetical order.

## Trend

The annual proportion is the total number of reappointments divided by the
total number of appointments, across all the organizations. Years without any
appointment are left out of the regression. At least three years are
required.

The regression reports the slope, intercept, r², the p-value of the slope
(two-tailed t-test), standard errors and 95% confidence intervals, the
Durbin-Watson statistic, the residuals flagged as outliers (standardized
residual above 2 in absolute value) and a normality test of the residuals
(Shapiro-Wilk up to 50 points, Jarque-Bera above). The trend is significant
when the p-value is below 0.05.

## Configuration

All the settings have defaults. They can be changed with a JSON file passed
with `--config`:

```text
{
  "rawDataDirectory": "raw_data",
  "outputDirectory": "analysis_data",
  "firstYear": 2013,
  "lastYear": 2024,
  "columns": {
    "name": ["name"],
    "position": ["position", "appointment"],
    "organization": ["org", "organization", "department"],
    "year": ["year"],
    "reappointed": ["reappointed", "reappointment"]
  },
  "normalization": {
    "prefixes": ["dr", "mr", "mrs", "ms", "prof"],
    "suffixes": ["jr", "sr", "ii", "iii", "iv", "v", "phd", "qc"]
  }
}
```

`columns` maps each field to the header names accepted in the raw files. The
comparison ignores case and surrounding spaces. The first header found wins.
The `reappointed` column is optional: without it, no record is flagged by the
source.

 */

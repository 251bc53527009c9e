use log::{debug, info, warn};

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use crate::config::*;
use crate::normalize::normalize_text;

/// Counts per (organization, year).
///
/// This is the organization-by-year table: organizations as rows, years as
/// columns, and zero for the cells without any record.
///
/// Organizations are matched on their normalized text, like in the identity
/// keys: `Dept X` and `dept x` share one row. A row is displayed with the
/// first spelling seen.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct OrgYearCounts {
    counts: BTreeMap<(String, i32), u64>,
    // Normalized organization -> displayed name.
    names: BTreeMap<String, String>,
    /// Records that could not be placed in the table (no organization or no year).
    pub skipped: u64,
}

impl OrgYearCounts {
    pub fn new() -> OrgYearCounts {
        OrgYearCounts::default()
    }

    fn register(&mut self, organization: &str) -> Option<String> {
        let key = normalize_text(organization);
        if key.is_empty() {
            return None;
        }
        self.names
            .entry(key.clone())
            .or_insert_with(|| organization.trim().to_string());
        Some(key)
    }

    /// Adds to a cell. Organizations without any letter or digit are ignored.
    pub fn add(&mut self, organization: &str, year: i32, count: u64) {
        if let Some(key) = self.register(organization) {
            *self.counts.entry((key, year)).or_insert(0) += count;
        }
    }

    pub fn get(&self, organization: &str, year: i32) -> u64 {
        self.counts
            .get(&(normalize_text(organization), year))
            .cloned()
            .unwrap_or(0)
    }

    /// The name displayed for an organization, in any of its spellings.
    pub fn display_name(&self, organization: &str) -> Option<&str> {
        self.names
            .get(&normalize_text(organization))
            .map(|s| s.as_str())
    }

    fn name_of<'a>(&'a self, key: &'a str) -> &'a str {
        self.names.get(key).map(|s| s.as_str()).unwrap_or(key)
    }

    /// The years with at least one cell, in increasing order.
    pub fn years(&self) -> Vec<i32> {
        let ys: BTreeSet<i32> = self.counts.keys().map(|(_, y)| *y).collect();
        ys.into_iter().collect()
    }

    /// The organizations with at least one cell, ordered by their normalized name.
    pub fn organizations(&self) -> Vec<String> {
        let os: BTreeSet<&String> = self.counts.keys().map(|(o, _)| o).collect();
        os.into_iter()
            .map(|k| self.name_of(k).to_string())
            .collect()
    }

    /// The non-empty cells, ordered by organization then year.
    pub fn cells(&self) -> impl Iterator<Item = (&str, i32, u64)> + '_ {
        self.counts
            .iter()
            .map(move |((o, y), c)| (self.name_of(o), *y, *c))
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

// Every dated record registers the spelling of its organization, so that the
// appointment and reappointment tables display the same names.
fn count_records(
    records: &[AppointmentRecord],
    include: impl Fn(&AppointmentRecord) -> bool,
) -> OrgYearCounts {
    let mut res = OrgYearCounts::new();
    for r in records.iter() {
        let key = match r.year {
            Some(_) => res.register(&r.organization),
            None => None,
        };
        if !include(r) {
            continue;
        }
        match (key, r.year) {
            (Some(key), Some(y)) => *res.counts.entry((key, y)).or_insert(0) += 1,
            _ => res.skipped += 1,
        }
    }
    res
}

/// Number of appointments per organization and year.
pub fn appointment_counts(records: &[AppointmentRecord]) -> OrgYearCounts {
    let res = count_records(records, |_| true);
    info!(
        "appointment_counts: {} appointments in {} organizations over {} years ({} skipped)",
        res.total(),
        res.organizations().len(),
        res.years().len(),
        res.skipped
    );
    res
}

/// Number of flagged reappointments per organization and year.
pub fn reappointment_counts(records: &[AppointmentRecord]) -> OrgYearCounts {
    let res = count_records(records, |r| r.reappointed);
    info!(
        "reappointment_counts: {} reappointments in {} organizations ({} skipped)",
        res.total(),
        res.organizations().len(),
        res.skipped
    );
    res
}

/// Joins the appointment and reappointment tables and computes the rates.
///
/// Every (organization, year) present in either table produces one row.
/// Missing reappointment cells count as zero. The rate is undefined when
/// there is no appointment, and clamped to 1.0 (with a warning) when there
/// are more reappointments than appointments.
pub fn org_year_aggregates(
    appointments: &OrgYearCounts,
    reappointments: &OrgYearCounts,
) -> (Vec<OrgYearAggregate>, Vec<DataQualityWarning>) {
    let keys: BTreeSet<(String, i32)> = appointments
        .counts
        .keys()
        .chain(reappointments.counts.keys())
        .cloned()
        .collect();
    let mut warnings: Vec<DataQualityWarning> = Vec::new();
    let mut res: Vec<OrgYearAggregate> = Vec::new();
    for (key, year) in keys.into_iter() {
        let total = appointments.counts.get(&(key.clone(), year)).cloned().unwrap_or(0);
        let reapps = reappointments
            .counts
            .get(&(key.clone(), year))
            .cloned()
            .unwrap_or(0);
        let organization = appointments
            .names
            .get(&key)
            .or_else(|| reappointments.names.get(&key))
            .cloned()
            .unwrap_or_else(|| key.clone());
        if reapps > total {
            warnings.push(DataQualityWarning::ReappointmentsExceedTotal {
                organization: organization.clone(),
                year,
                reappointments: reapps,
                total_appointments: total,
            });
        }
        let rate = if total > 0 {
            Some((reapps as f64 / total as f64).min(1.0))
        } else {
            None
        };
        res.push(OrgYearAggregate {
            organization,
            year,
            total_appointments: total,
            reappointments: reapps,
            rate,
        });
    }
    for w in warnings.iter() {
        warn!("org_year_aggregates: {}", w);
    }
    debug!("org_year_aggregates: {} rows", res.len());
    (res, warnings)
}

/// Clamps the rates read back from a table, warning about impossible ones.
pub fn check_rates(aggregates: &mut [OrgYearAggregate]) -> Vec<DataQualityWarning> {
    let mut warnings = Vec::new();
    for a in aggregates.iter_mut() {
        if a.total_appointments == 0 {
            a.rate = None;
            continue;
        }
        if let Some(rate) = a.rate {
            if rate > 1.0 {
                warnings.push(DataQualityWarning::RateAboveOne {
                    organization: a.organization.clone(),
                    year: a.year,
                    rate,
                });
                a.rate = Some(1.0);
            }
        }
    }
    warnings
}

// Higher rate first, then more appointments, then alphabetical.
fn compare_for_maximum(a: &OrgYearAggregate, b: &OrgYearAggregate) -> Ordering {
    let ra = a.rate.unwrap_or(f64::NEG_INFINITY);
    let rb = b.rate.unwrap_or(f64::NEG_INFINITY);
    rb.partial_cmp(&ra)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.total_appointments.cmp(&a.total_appointments))
        .then_with(|| a.organization.cmp(&b.organization))
}

/// For every year, the organization with the highest reappointment rate.
///
/// Only rows with appointments and a defined rate compete. Ties are broken
/// by the larger number of appointments, then by the organization name in
/// alphabetical order. Years without any defined rate produce no row.
pub fn yearly_maximums(aggregates: &[OrgYearAggregate]) -> Vec<YearlyMaximum> {
    let mut by_year: BTreeMap<i32, Vec<&OrgYearAggregate>> = BTreeMap::new();
    for a in aggregates.iter() {
        match a.rate {
            Some(r) if a.total_appointments > 0 && r.is_finite() => {
                by_year.entry(a.year).or_default().push(a);
            }
            _ => {}
        }
    }

    let mut res: Vec<YearlyMaximum> = Vec::new();
    for (year, mut candidates) in by_year.into_iter() {
        candidates.sort_by(|a, b| compare_for_maximum(a, b));
        let best = candidates[0];
        let tied = candidates
            .iter()
            .filter(|c| c.rate == best.rate)
            .count();
        if tied > 1 {
            debug!(
                "yearly_maximums: {}: {} organizations tied at {:?}, picked {}",
                year, tied, best.rate, best.organization
            );
        }
        res.push(YearlyMaximum {
            year,
            organization: best.organization.clone(),
            rate: best.rate.unwrap_or(0.0),
            total_appointments: best.total_appointments,
            reappointments: best.reappointments,
        });
    }
    res
}

/// Government-wide totals for every year.
///
/// With a range, one aggregate is produced for every year of the range (years
/// without data have no defined proportion), and records outside of it are
/// excluded with a warning. Without a range, the years found in the records
/// are used.
pub fn annual_aggregates(
    records: &[AppointmentRecord],
    years: Option<RangeInclusive<i32>>,
) -> (Vec<AnnualAggregate>, Vec<DataQualityWarning>) {
    let mut totals: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
    if let Some(range) = years.clone() {
        for y in range {
            totals.insert(y, (0, 0));
        }
    }
    let mut out_of_range: BTreeMap<i32, u64> = BTreeMap::new();
    let mut undated: u64 = 0;
    for r in records.iter() {
        let y = match r.year {
            Some(y) => y,
            None => {
                undated += 1;
                continue;
            }
        };
        if let Some(range) = years.as_ref() {
            if !range.contains(&y) {
                *out_of_range.entry(y).or_insert(0) += 1;
                continue;
            }
        }
        let e = totals.entry(y).or_insert((0, 0));
        e.0 += 1;
        if r.reappointed {
            e.1 += 1;
        }
    }

    let mut warnings: Vec<DataQualityWarning> = out_of_range
        .into_iter()
        .map(|(year, count)| DataQualityWarning::YearOutOfRange { year, count })
        .collect();
    if undated > 0 {
        warnings.push(DataQualityWarning::MissingYear { count: undated });
    }
    for w in warnings.iter() {
        warn!("annual_aggregates: {}", w);
    }

    let res: Vec<AnnualAggregate> = totals
        .into_iter()
        .map(|(year, (total, reapps))| AnnualAggregate::new(year, total, reapps))
        .collect();
    for a in res.iter() {
        debug!(
            "annual_aggregates: {}: {} / {} -> {:?}",
            a.year, a.total_reappointments, a.total_appointments, a.proportion
        );
    }
    (res, warnings)
}

/// Folds organization rows back into yearly totals.
pub fn annual_totals(aggregates: &[OrgYearAggregate]) -> Vec<AnnualAggregate> {
    let mut totals: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
    for a in aggregates.iter() {
        let e = totals.entry(a.year).or_insert((0, 0));
        e.0 += a.total_appointments;
        e.1 += a.reappointments;
    }
    totals
        .into_iter()
        .map(|(year, (total, reapps))| AnnualAggregate::new(year, total, reapps))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(org: &str, year: i32, reappointed: bool) -> AppointmentRecord {
        let r = AppointmentRecord::new("A B", "Member", org, Some(year));
        if reappointed {
            r.flagged()
        } else {
            r
        }
    }

    fn agg(org: &str, year: i32, total: u64, reapps: u64) -> OrgYearAggregate {
        OrgYearAggregate {
            organization: org.to_string(),
            year,
            total_appointments: total,
            reappointments: reapps,
            rate: if total > 0 {
                Some(reapps as f64 / total as f64)
            } else {
                None
            },
        }
    }

    #[test]
    fn counts_skip_records_without_org_or_year() {
        let mut records = vec![rec("Org", 2015, false), rec(" Org ", 2015, true)];
        records.push(AppointmentRecord::new("A", "B", "", Some(2015)));
        records.push(AppointmentRecord::new("A", "B", "Org", None));
        let c = appointment_counts(&records);
        assert_eq!(c.get("Org", 2015), 2);
        assert_eq!(c.skipped, 2);
        assert_eq!(c.organizations(), vec!["Org".to_string()]);
        let r = reappointment_counts(&records);
        assert_eq!(r.get("Org", 2015), 1);
        assert_eq!(r.get("Org", 2016), 0);
    }

    #[test]
    fn organization_spellings_share_one_row() {
        let records = vec![
            AppointmentRecord::new("Jane Doe", "Board Member", "Dept X", Some(2015)),
            AppointmentRecord::new("jane doe", "board member", "dept x", Some(2019)).flagged(),
            AppointmentRecord::new("John Roe", "Chair", "DEPT. X", Some(2019)),
        ];
        let apps = appointment_counts(&records);
        let reapps = reappointment_counts(&records);
        assert_eq!(apps.organizations(), vec!["Dept X".to_string()]);
        assert_eq!(reapps.organizations(), vec!["Dept X".to_string()]);
        assert_eq!(apps.get("dept x", 2019), 2);
        assert_eq!(apps.display_name("DEPT X"), Some("Dept X"));

        let (rows, warnings) = org_year_aggregates(&apps, &reapps);
        assert!(warnings.is_empty());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.organization == "Dept X"));
        assert_eq!(rows[1].year, 2019);
        assert_eq!(rows[1].rate, Some(0.5));
    }

    #[test]
    fn reappointments_are_zero_filled() {
        let records = vec![rec("A", 2015, false), rec("B", 2015, true)];
        let (rows, warnings) =
            org_year_aggregates(&appointment_counts(&records), &reappointment_counts(&records));
        assert!(warnings.is_empty());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].organization, "A");
        assert_eq!(rows[0].reappointments, 0);
        assert_eq!(rows[0].rate, Some(0.0));
        assert_eq!(rows[1].rate, Some(1.0));
    }

    #[test]
    fn rate_is_undefined_without_appointments() {
        let apps = OrgYearCounts::new();
        let mut reapps = OrgYearCounts::new();
        reapps.add("A", 2016, 2);
        let (rows, warnings) = org_year_aggregates(&apps, &reapps);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rate, None);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn impossible_rate_is_clamped_with_a_warning() {
        let mut apps = OrgYearCounts::new();
        apps.add("A", 2016, 2);
        let mut reapps = OrgYearCounts::new();
        reapps.add("A", 2016, 3);
        let (rows, warnings) = org_year_aggregates(&apps, &reapps);
        assert_eq!(rows[0].rate, Some(1.0));
        assert!(matches!(
            warnings[0],
            DataQualityWarning::ReappointmentsExceedTotal {
                reappointments: 3,
                total_appointments: 2,
                ..
            }
        ));
    }

    #[test]
    fn check_rates_clamps_and_clears() {
        let mut rows = vec![agg("A", 2015, 4, 1), agg("B", 2015, 0, 0)];
        rows[0].rate = Some(1.5);
        rows[1].rate = Some(0.2);
        let warnings = check_rates(&mut rows);
        assert_eq!(warnings.len(), 1);
        assert_eq!(rows[0].rate, Some(1.0));
        assert_eq!(rows[1].rate, None);
    }

    #[test]
    fn yearly_maximum_picks_the_highest_rate() {
        let rows = vec![
            agg("A", 2015, 10, 2),
            agg("B", 2015, 10, 5),
            agg("C", 2015, 0, 0),
            agg("A", 2016, 4, 1),
        ];
        let maxes = yearly_maximums(&rows);
        assert_eq!(maxes.len(), 2);
        assert_eq!(maxes[0].year, 2015);
        assert_eq!(maxes[0].organization, "B");
        assert_eq!(maxes[0].rate, 0.5);
        assert_eq!(maxes[1].organization, "A");
    }

    #[test]
    fn yearly_maximum_tie_break() {
        // Same rate: more appointments wins, then alphabetical order.
        let rows = vec![
            agg("Zeta", 2015, 4, 2),
            agg("Beta", 2015, 2, 1),
            agg("Alpha", 2015, 4, 2),
        ];
        let maxes = yearly_maximums(&rows);
        assert_eq!(maxes[0].organization, "Alpha");
        assert_eq!(maxes[0].total_appointments, 4);
    }

    #[test]
    fn year_without_defined_rate_has_no_maximum() {
        let rows = vec![agg("A", 2015, 0, 0)];
        assert!(yearly_maximums(&rows).is_empty());
    }

    #[test]
    fn annual_aggregates_fill_the_range() {
        let records = vec![
            rec("A", 2013, false),
            rec("A", 2013, true),
            rec("B", 2015, false),
            rec("B", 2030, true),
            AppointmentRecord::new("A", "B", "C", None),
        ];
        let (rows, warnings) = annual_aggregates(&records, Some(2013..=2015));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].proportion, Some(0.5));
        assert_eq!(rows[1].total_appointments, 0);
        assert_eq!(rows[1].proportion, None);
        assert_eq!(rows[2].proportion, Some(0.0));
        assert_eq!(
            warnings,
            vec![
                DataQualityWarning::YearOutOfRange {
                    year: 2030,
                    count: 1
                },
                DataQualityWarning::MissingYear { count: 1 },
            ]
        );
    }

    #[test]
    fn annual_aggregates_without_range_use_observed_years() {
        let records = vec![rec("A", 2014, true), rec("A", 2017, false)];
        let (rows, warnings) = annual_aggregates(&records, None);
        assert!(warnings.is_empty());
        let years: Vec<i32> = rows.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2014, 2017]);
    }

    #[test]
    fn rates_survive_a_round_trip_through_totals() {
        let rows = vec![
            agg("A", 2015, 7, 3),
            agg("B", 2015, 11, 2),
            agg("A", 2016, 13, 5),
        ];
        let totals = annual_totals(&rows);
        assert_eq!(totals.len(), 2);
        let p2015 = totals[0].proportion.unwrap();
        assert!((p2015 - 5.0 / 18.0).abs() < 1e-12);

        // Recovering each row's reappointments from its rate gives back the same totals.
        let recovered: u64 = rows
            .iter()
            .filter(|r| r.year == 2015)
            .map(|r| (r.rate.unwrap() * r.total_appointments as f64).round() as u64)
            .sum();
        assert_eq!(recovered, totals[0].total_reappointments);
        for r in rows.iter() {
            let recomputed = r.reappointments as f64 / r.total_appointments as f64;
            assert!((recomputed - r.rate.unwrap()).abs() < 1e-12);
        }
    }
}

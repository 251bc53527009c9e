use log::{debug, info};

use std::collections::HashMap;

use crate::config::{AppointmentRecord, NormalizationRules};
use crate::normalize::IdentityKey;

/// Counters collected while flagging the reappointments.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct DetectionStats {
    pub records: usize,
    /// Number of distinct complete identity keys.
    pub groups: usize,
    /// Groups with more than one appointment.
    pub repeated_groups: usize,
    /// Records whose key misses a name, a position or an organization.
    pub incomplete_keys: usize,
    pub undated: usize,
    /// Records flagged in the source.
    pub already_flagged: usize,
    /// Records flagged by this pass that were not flagged before.
    pub newly_flagged: usize,
    pub total_flagged: usize,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Detection {
    /// The input records, in the input order, with their flag updated.
    pub records: Vec<AppointmentRecord>,
    pub stats: DetectionStats,
}

/// Flags every appointment that is not the earliest one of its identity group.
///
/// Records are grouped by their normalized (name, position, organization)
/// key. Inside a group, records are ordered by year, with unknown years
/// last and ties resolved by input order. All the records except the first
/// one are reappointments.
///
/// The flags only ever go from `false` to `true`: a record flagged by the
/// source stays flagged. Records whose key is missing a component are never
/// flagged by this pass.
///
/// Arguments:
/// * `records` the appointments, in any order
/// * `rules` the honorifics and suffixes dropped from the names
pub fn detect_reappointments(
    records: &[AppointmentRecord],
    rules: &NormalizationRules,
) -> Detection {
    info!("detect_reappointments: processing {} records", records.len());
    let mut stats = DetectionStats {
        records: records.len(),
        ..DetectionStats::default()
    };

    // Group members are kept in input order.
    let mut groups: HashMap<IdentityKey, Vec<usize>> = HashMap::new();
    for (idx, r) in records.iter().enumerate() {
        if r.year.is_none() {
            stats.undated += 1;
        }
        if r.reappointed {
            stats.already_flagged += 1;
        }
        let key = IdentityKey::new(r, rules);
        if !key.is_complete() {
            debug!(
                "detect_reappointments: record {} has an incomplete key {:?}, skipping",
                idx, key
            );
            stats.incomplete_keys += 1;
            continue;
        }
        groups.entry(key).or_default().push(idx);
    }
    stats.groups = groups.len();

    let mut marked: Vec<bool> = vec![false; records.len()];
    for (key, members) in groups.iter() {
        if members.len() < 2 {
            continue;
        }
        stats.repeated_groups += 1;
        let mut ordered = members.clone();
        // Stable sort: equal years keep the input order.
        ordered.sort_by_key(|&idx| year_order(records[idx].year));
        debug!(
            "detect_reappointments: {:?}: original {} followed by {:?}",
            key,
            ordered[0],
            &ordered[1..]
        );
        for &idx in ordered.iter().skip(1) {
            marked[idx] = true;
        }
    }

    let annotated: Vec<AppointmentRecord> = records
        .iter()
        .zip(marked.iter())
        .map(|(r, &m)| {
            if m && !r.reappointed {
                stats.newly_flagged += 1;
            }
            AppointmentRecord {
                reappointed: r.reappointed || m,
                ..r.clone()
            }
        })
        .collect();
    stats.total_flagged = annotated.iter().filter(|r| r.reappointed).count();

    info!(
        "detect_reappointments: {} groups ({} repeated), {} newly flagged, {} flagged in total",
        stats.groups, stats.repeated_groups, stats.newly_flagged, stats.total_flagged
    );
    if stats.incomplete_keys > 0 {
        info!(
            "detect_reappointments: {} records without a complete identity were left as is",
            stats.incomplete_keys
        );
    }
    Detection {
        records: annotated,
        stats,
    }
}

// Known years first, in increasing order.
fn year_order(year: Option<i32>) -> (bool, i32) {
    match year {
        Some(y) => (false, y),
        None => (true, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn flags(d: &Detection) -> Vec<bool> {
        d.records.iter().map(|r| r.reappointed).collect()
    }

    #[test]
    fn later_appointment_is_flagged() {
        init();
        let records = vec![
            AppointmentRecord::new("Jane Doe", "Board Member", "Dept X", Some(2015)),
            AppointmentRecord::new("jane doe", "board member", "dept x", Some(2019)),
        ];
        let d = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(flags(&d), vec![false, true]);
        assert_eq!(d.stats.newly_flagged, 1);
        assert_eq!(d.stats.repeated_groups, 1);
    }

    #[test]
    fn input_order_does_not_matter() {
        let records = vec![
            AppointmentRecord::new("Jane Doe", "Chair", "Dept X", Some(2019)),
            AppointmentRecord::new("Jane Doe", "Chair", "Dept X", Some(2021)),
            AppointmentRecord::new("Dr. Jane Doe", "Chair", "Dept X", Some(2014)),
        ];
        let d = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(flags(&d), vec![true, true, false]);
    }

    #[test]
    fn exactly_one_original_per_group() {
        let mut records = Vec::new();
        for y in 2013..2020 {
            records.push(AppointmentRecord::new("A B", "Member", "Org", Some(y)));
            records.push(AppointmentRecord::new("C D", "Chair", "Org", Some(2030 - y)));
        }
        let d = detect_reappointments(&records, &NormalizationRules::default());
        let originals: Vec<&AppointmentRecord> =
            d.records.iter().filter(|r| !r.reappointed).collect();
        assert_eq!(originals.len(), 2);
        assert!(originals
            .iter()
            .any(|r| r.name == "A B" && r.year == Some(2013)));
        assert!(originals
            .iter()
            .any(|r| r.name == "C D" && r.year == Some(2011)));
        assert_eq!(d.stats.total_flagged, records.len() - 2);
    }

    #[test]
    fn same_year_ties_keep_input_order() {
        let records = vec![
            AppointmentRecord::new("A B", "Member", "Org", Some(2016)),
            AppointmentRecord::new("A B", "Member", "Org", Some(2016)),
        ];
        let d = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(flags(&d), vec![false, true]);
    }

    #[test]
    fn undated_records_sort_last() {
        let records = vec![
            AppointmentRecord::new("A B", "Member", "Org", None),
            AppointmentRecord::new("A B", "Member", "Org", Some(2020)),
        ];
        let d = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(flags(&d), vec![true, false]);
        assert_eq!(d.stats.undated, 1);
    }

    #[test]
    fn all_undated_group_keeps_the_first_in_input_order() {
        let records = vec![
            AppointmentRecord::new("A B", "Member", "Org", None),
            AppointmentRecord::new("A B", "Member", "Org", None),
        ];
        let d = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(flags(&d), vec![false, true]);
    }

    #[test]
    fn singletons_and_incomplete_keys_are_never_flagged() {
        let records = vec![
            AppointmentRecord::new("A B", "Member", "Org", Some(2015)),
            AppointmentRecord::new("", "Member", "Org", Some(2015)),
            AppointmentRecord::new("", "Member", "Org", Some(2016)),
            AppointmentRecord::new("C D", "", "Org", Some(2016)),
            AppointmentRecord::new("C D", "", "Org", Some(2017)),
        ];
        let d = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(flags(&d), vec![false; 5]);
        assert_eq!(d.stats.incomplete_keys, 4);
        assert_eq!(d.stats.groups, 1);
    }

    #[test]
    fn source_flags_are_kept() {
        let records = vec![
            AppointmentRecord::new("A B", "Member", "Org", Some(2015)).flagged(),
            AppointmentRecord::new("A B", "Member", "Org", Some(2016)),
            AppointmentRecord::new("", "Member", "Org", Some(2016)).flagged(),
        ];
        let d = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(flags(&d), vec![true, true, true]);
        assert_eq!(d.stats.already_flagged, 2);
        assert_eq!(d.stats.newly_flagged, 1);
    }

    #[test]
    fn detection_is_idempotent() {
        let records = vec![
            AppointmentRecord::new("Mr. A B", "Member", "Org", Some(2018)),
            AppointmentRecord::new("a b", "MEMBER", "org", Some(2015)),
            AppointmentRecord::new("A B", "Member", "Org", None),
            AppointmentRecord::new("E F", "Chair", "Other", Some(2015)),
            AppointmentRecord::new("E F", "Chair", "Other", Some(2015)),
        ];
        let rules = NormalizationRules::default();
        let first = detect_reappointments(&records, &rules);
        let second = detect_reappointments(&first.records, &rules);
        assert_eq!(first.records, second.records);
        assert_eq!(second.stats.newly_flagged, 0);
    }

    #[test]
    fn input_is_not_modified() {
        let records = vec![
            AppointmentRecord::new("A B", "Member", "Org", Some(2015)),
            AppointmentRecord::new("A B", "Member", "Org", Some(2016)),
        ];
        let copy = records.clone();
        let _ = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(records, copy);
    }

    #[test]
    fn normalization_policy_changes_the_groups() {
        let records = vec![
            AppointmentRecord::new("Dr. A B", "Member", "Org", Some(2015)),
            AppointmentRecord::new("A B", "Member", "Org", Some(2016)),
        ];
        let d = detect_reappointments(&records, &NormalizationRules::minimal());
        assert_eq!(flags(&d), vec![false, false]);
        let d = detect_reappointments(&records, &NormalizationRules::default());
        assert_eq!(flags(&d), vec![false, true]);
    }
}

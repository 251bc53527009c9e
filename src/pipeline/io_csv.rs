// Reading and writing the CSV tables exchanged between the steps.

use csv::StringRecord;

use crate::pipeline::{config_reader::ColumnMapping, io_common::*, *};

/// A table read in memory: the header and the rows, with their line number.
#[derive(Debug, Clone)]
pub struct Table {
    pub path: String,
    pub headers: Vec<String>,
    pub rows: Vec<(u64, StringRecord)>,
}

impl Table {
    pub fn column(&self, accepted: &[String]) -> Option<usize> {
        find_column(&self.headers, accepted)
    }

    pub fn required_column(&self, field: &str, accepted: &[String]) -> PipelineResult<usize> {
        self.column(accepted).context(MissingRequiredColumnSnafu {
            path: self.path.clone(),
            field,
            accepted: accepted.to_vec(),
            found: self.headers.clone(),
        })
    }
}

/// The first accepted name found in the headers, ignoring case and surrounding spaces.
pub fn find_column(headers: &[String], accepted: &[String]) -> Option<usize> {
    accepted.iter().find_map(|a| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(a.trim()))
    })
}

pub fn read_table(path: &str) -> PipelineResult<Table> {
    ensure!(
        Path::new(path).is_file(),
        MissingInputFileSnafu { path }
    );
    info!("Reading table {:?}", path);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let headers: Vec<String> = rdr
        .headers()
        .context(CsvOpenSnafu { path })?
        .iter()
        // Byte order mark left by spreadsheet exports.
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let mut rows: Vec<(u64, StringRecord)> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        // The header is line 1.
        let lineno = idx as u64 + 2;
        let line = line_r.context(CsvRecordSnafu { path, lineno })?;
        rows.push((lineno, line));
    }
    debug!("read_table: {:?}: {} rows", path, rows.len());
    Ok(Table {
        path: path.to_string(),
        headers,
        rows,
    })
}

pub fn write_table(path: &str, headers: &[String], rows: &[Vec<String>]) -> PipelineResult<()> {
    let mut wtr = csv::Writer::from_path(path).context(CsvWriteSnafu { path })?;
    wtr.write_record(headers).context(CsvWriteSnafu { path })?;
    for row in rows.iter() {
        wtr.write_record(row).context(CsvWriteSnafu { path })?;
    }
    wtr.flush()
        .map_err(csv::Error::from)
        .context(CsvWriteSnafu { path })?;
    info!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}

fn cell(line: &StringRecord, idx: usize) -> &str {
    line.get(idx).unwrap_or("")
}

fn parse_cell<T>(
    table: &Table,
    lineno: u64,
    line: &StringRecord,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> PipelineResult<T> {
    let value = cell(line, idx);
    parse(value).context(InvalidNumberSnafu {
        path: table.path.clone(),
        lineno,
        column: table.headers.get(idx).cloned().unwrap_or_default(),
        value,
    })
}

// ******** Appointment records (steps 2 and 3) *********

pub fn records_headers() -> Vec<String> {
    [
        REAPPOINTED_COLUMN,
        NAME_COLUMN,
        POSITION_COLUMN,
        ORG_COLUMN,
        YEAR_COLUMN,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Reads the appointments through the given column mapping.
///
/// Name, position, organization and year columns are required. Unreadable
/// years are kept as unknown and unreadable flags as `false`; both are logged.
pub fn read_records(path: &str, mapping: &ColumnMapping) -> PipelineResult<Vec<AppointmentRecord>> {
    let table = read_table(path)?;
    let name_idx = table.required_column("name", &mapping.name)?;
    let position_idx = table.required_column("position", &mapping.position)?;
    let org_idx = table.required_column("organization", &mapping.organization)?;
    let year_idx = table.required_column("year", &mapping.year)?;
    let reapp_idx = table.column(&mapping.reappointed);
    if reapp_idx.is_none() {
        warn!(
            "{:?}: no reappointment column (accepted: {:?}), every record starts as not reappointed",
            path, mapping.reappointed
        );
    }
    debug!(
        "read_records: columns name {} position {} org {} year {} reappointed {:?}",
        name_idx, position_idx, org_idx, year_idx, reapp_idx
    );

    let mut bad_years: u64 = 0;
    let mut res: Vec<AppointmentRecord> = Vec::new();
    for (lineno, line) in table.rows.iter() {
        let year_s = cell(line, year_idx);
        let year = parse_year(year_s);
        if year.is_none() && !year_s.trim().is_empty() {
            debug!("{:?}: line {}: unreadable year {:?}", path, lineno, year_s);
            bad_years += 1;
        }
        let reappointed = match reapp_idx {
            Some(idx) => {
                let s = cell(line, idx);
                parse_flag(s).unwrap_or_else(|| {
                    debug!("{:?}: line {}: unreadable flag {:?}", path, lineno, s);
                    false
                })
            }
            None => false,
        };
        res.push(AppointmentRecord {
            name: cell(line, name_idx).trim().to_string(),
            position: cell(line, position_idx).trim().to_string(),
            organization: cell(line, org_idx).trim().to_string(),
            year,
            reappointed,
        });
    }
    if bad_years > 0 {
        warn!(
            "{:?}: {} record(s) with an unreadable year kept without a year",
            path, bad_years
        );
    }
    Ok(res)
}

pub fn write_records(path: &str, records: &[AppointmentRecord]) -> PipelineResult<()> {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.reappointed.to_string(),
                r.name.clone(),
                r.position.clone(),
                r.organization.clone(),
                format_year(r.year),
            ]
        })
        .collect();
    write_table(path, &records_headers(), &rows)
}

// ******** Organization by year tables (steps 4 and 5) *********

/// Writes the organization rows and one column per year, zero-filled.
pub fn write_counts(path: &str, counts: &OrgYearCounts, years: &[i32]) -> PipelineResult<()> {
    let mut headers = vec![ORG_COLUMN.to_string()];
    headers.extend(years.iter().map(|y| y.to_string()));
    let rows: Vec<Vec<String>> = counts
        .organizations()
        .iter()
        .map(|org| {
            let mut row = vec![org.clone()];
            row.extend(years.iter().map(|y| counts.get(org, *y).to_string()));
            row
        })
        .collect();
    write_table(path, &headers, &rows)
}

pub fn read_counts(path: &str) -> PipelineResult<OrgYearCounts> {
    let table = read_table(path)?;
    let org_idx = table.required_column("organization", &[ORG_COLUMN.to_string()])?;
    let mut year_cols: Vec<(usize, i32)> = Vec::new();
    for (idx, h) in table.headers.iter().enumerate() {
        if idx == org_idx {
            continue;
        }
        let y = parse_year(h).context(InvalidNumberSnafu {
            path,
            lineno: 1u64,
            column: h.clone(),
            value: h.clone(),
        })?;
        year_cols.push((idx, y));
    }
    let mut res = OrgYearCounts::new();
    for (lineno, line) in table.rows.iter() {
        let org = cell(line, org_idx).trim();
        for (idx, year) in year_cols.iter() {
            let c = parse_cell(&table, *lineno, line, *idx, parse_count)?;
            // Zero cells are the fill of the table, not observations.
            if c > 0 {
                res.add(org, *year, c);
            }
        }
    }
    Ok(res)
}

// ******** Rates (steps 6 and 7) *********

pub fn write_rates(path: &str, rows: &[OrgYearAggregate]) -> PipelineResult<()> {
    let headers: Vec<String> = [
        ORG_COLUMN,
        YEAR_COLUMN,
        "total_appointments",
        "reappointments",
        "reappointment_rate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|a| {
            vec![
                a.organization.clone(),
                a.year.to_string(),
                a.total_appointments.to_string(),
                a.reappointments.to_string(),
                format_rate(a.rate),
            ]
        })
        .collect();
    write_table(path, &headers, &rows)
}

pub fn read_rates(path: &str) -> PipelineResult<Vec<OrgYearAggregate>> {
    let table = read_table(path)?;
    let col = |name: &str| table.required_column(name, &[name.to_string()]);
    let org_idx = col(ORG_COLUMN)?;
    let year_idx = col(YEAR_COLUMN)?;
    let total_idx = col("total_appointments")?;
    let reapp_idx = col("reappointments")?;
    let rate_idx = col("reappointment_rate")?;
    let mut res: Vec<OrgYearAggregate> = Vec::new();
    for (lineno, line) in table.rows.iter() {
        res.push(OrgYearAggregate {
            organization: cell(line, org_idx).trim().to_string(),
            year: parse_cell(&table, *lineno, line, year_idx, parse_year)?,
            total_appointments: parse_cell(&table, *lineno, line, total_idx, parse_count)?,
            reappointments: parse_cell(&table, *lineno, line, reapp_idx, parse_count)?,
            rate: parse_cell(&table, *lineno, line, rate_idx, parse_rate)?,
        });
    }
    Ok(res)
}

pub fn write_maximums(path: &str, rows: &[YearlyMaximum]) -> PipelineResult<()> {
    let headers: Vec<String> = [
        YEAR_COLUMN,
        "top_org",
        "max_rate",
        "total_appointments",
        "reappointments",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|m| {
            vec![
                m.year.to_string(),
                m.organization.clone(),
                m.rate.to_string(),
                m.total_appointments.to_string(),
                m.reappointments.to_string(),
            ]
        })
        .collect();
    write_table(path, &headers, &rows)
}

// ******** Annual proportions (steps 8 and 9) *********

pub fn write_annual(path: &str, rows: &[AnnualAggregate]) -> PipelineResult<()> {
    let headers: Vec<String> = [
        YEAR_COLUMN,
        "total_appointments",
        "total_reappointments",
        "reappointment_proportion",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|a| {
            vec![
                a.year.to_string(),
                a.total_appointments.to_string(),
                a.total_reappointments.to_string(),
                format_rate(a.proportion),
            ]
        })
        .collect();
    write_table(path, &headers, &rows)
}

pub fn read_annual(path: &str) -> PipelineResult<Vec<AnnualAggregate>> {
    let table = read_table(path)?;
    let col = |name: &str| table.required_column(name, &[name.to_string()]);
    let year_idx = col(YEAR_COLUMN)?;
    let total_idx = col("total_appointments")?;
    let reapp_idx = col("total_reappointments")?;
    let prop_idx = table.column(&["reappointment_proportion".to_string()]);
    let mut res: Vec<AnnualAggregate> = Vec::new();
    for (lineno, line) in table.rows.iter() {
        let year = parse_cell(&table, *lineno, line, year_idx, parse_year)?;
        let total = parse_cell(&table, *lineno, line, total_idx, parse_count)?;
        let reapps = parse_cell(&table, *lineno, line, reapp_idx, parse_count)?;
        let mut agg = AnnualAggregate::new(year, total, reapps);
        if let Some(idx) = prop_idx {
            let given = parse_cell(&table, *lineno, line, idx, parse_rate)?;
            if total > 0 && given.is_some() {
                agg.proportion = given;
            }
        }
        res.push(agg);
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).display().to_string()
    }

    #[test]
    fn columns_are_matched_without_case() {
        let headers: Vec<String> = vec!["Name".into(), " ORG ".into(), "Year".into()];
        let accepted: Vec<String> = vec!["organization".into(), "org".into()];
        assert_eq!(find_column(&headers, &accepted), Some(1));
        assert_eq!(find_column(&headers, &["position".to_string()]), None);
    }

    #[test]
    fn missing_file_is_reported() {
        let res = read_table("/nonexistent/step1.csv");
        assert!(matches!(res, Err(PipelineError::MissingInputFile { .. })));
    }

    #[test]
    fn records_are_read_through_the_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir, "raw.csv");
        fs::write(
            &path,
            "Name,Appointment,Department,Year,Reappointed\n\
             Jane Doe,Board Member,Dept X,2015,False\n\
             John Roe,Chair,Dept Y,2016.0,yes\n\
             Ann Lee,Member,Dept Z,unknown,maybe\n",
        )
        .unwrap();
        let records = read_records(&path, &ColumnMapping::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].position, "Board Member");
        assert_eq!(records[0].organization, "Dept X");
        assert!(!records[0].reappointed);
        assert_eq!(records[1].year, Some(2016));
        assert!(records[1].reappointed);
        assert_eq!(records[2].year, None);
        assert!(!records[2].reappointed);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir, "raw.csv");
        fs::write(&path, "name,position,year\nA,B,2015\n").unwrap();
        let res = read_records(&path, &ColumnMapping::default());
        match res {
            Err(PipelineError::MissingRequiredColumn { field, .. }) => {
                assert_eq!(field, "organization")
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn reappointed_column_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir, "raw.csv");
        fs::write(&path, "name,position,org,year\nA,B,C,2015\n").unwrap();
        let records = read_records(&path, &ColumnMapping::default()).unwrap();
        assert!(!records[0].reappointed);
    }

    #[test]
    fn records_survive_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir, "step3.csv");
        let records = vec![
            AppointmentRecord::new("Jane Doe", "Member, Board", "Dept X", Some(2015)),
            AppointmentRecord::new("John Roe", "Chair", "Dept Y", None).flagged(),
        ];
        write_records(&path, &records).unwrap();
        let back = read_records(&path, &ColumnMapping::canonical()).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn counts_table_is_zero_filled() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir, "step4.csv");
        let mut counts = OrgYearCounts::new();
        counts.add("Dept X", 2013, 3);
        counts.add("Dept Y", 2014, 1);
        write_counts(&path, &counts, &[2013, 2014]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "org,2013,2014\nDept X,3,0\nDept Y,0,1\n");
        let back = read_counts(&path).unwrap();
        assert_eq!(back, counts);
    }

    #[test]
    fn undefined_rates_are_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir, "step6.csv");
        let rows = vec![
            OrgYearAggregate {
                organization: "A".to_string(),
                year: 2015,
                total_appointments: 3,
                reappointments: 1,
                rate: Some(1.0 / 3.0),
            },
            OrgYearAggregate {
                organization: "B".to_string(),
                year: 2015,
                total_appointments: 0,
                reappointments: 0,
                rate: None,
            },
        ];
        write_rates(&path, &rows).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("B,2015,0,0,\n"));
        assert_eq!(read_rates(&path).unwrap(), rows);
    }

    #[test]
    fn bad_count_is_reported_with_its_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir, "step4.csv");
        fs::write(&path, "org,2013\nA,1\nB,lots\n").unwrap();
        match read_counts(&path) {
            Err(PipelineError::InvalidNumber { lineno, value, .. }) => {
                assert_eq!(lineno, 3);
                assert_eq!(value, "lots");
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn annual_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir, "step8.csv");
        let rows = vec![AnnualAggregate::new(2013, 10, 3), AnnualAggregate::new(2014, 0, 0)];
        write_annual(&path, &rows).unwrap();
        assert_eq!(read_annual(&path).unwrap(), rows);
    }
}

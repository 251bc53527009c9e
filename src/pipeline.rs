use log::{debug, info, warn};

use reappointment_trends::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use crate::args::{Args, Step};
use crate::pipeline::config_reader::*;
use crate::pipeline::io_common::*;
use crate::pipeline::io_csv::*;

mod config_reader;
mod io_common;
mod io_csv;
mod report;

// Column names of the tables written by the pipeline.
pub const NAME_COLUMN: &str = "name";
pub const POSITION_COLUMN: &str = "position";
pub const ORG_COLUMN: &str = "org";
pub const YEAR_COLUMN: &str = "year";
pub const REAPPOINTED_COLUMN: &str = "reappointed";

const STEP1_FILE: &str = "step1_combined_appointments.csv";
const STEP2_FILE: &str = "step2_key_columns_data.csv";
const STEP3_FILE: &str = "step3_repeats_marked.csv";
const STEP4_FILE: &str = "step4_appointment_counts.csv";
const STEP5_FILE: &str = "step5_reappointment_counts.csv";
const STEP6_FILE: &str = "step6_reappointment_rates.csv";
const STEP7_FILE: &str = "step7_yearly_max_rates.csv";
const STEP8_FILE: &str = "step8_annual_proportions.csv";
const STEP9_FILE: &str = "step9_regression_results.txt";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    #[snafu(display("Input file {path} not found"))]
    MissingInputFile { path: String },
    #[snafu(display(
        "{path}: no column for the field '{field}' (accepted names: {accepted:?}, found: {found:?})"
    ))]
    MissingRequiredColumn {
        path: String,
        field: String,
        accepted: Vec<String>,
        found: Vec<String>,
    },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of {path}"))]
    CsvRecord {
        source: csv::Error,
        path: String,
        lineno: u64,
    },
    #[snafu(display("Error writing CSV file {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("{path}: line {lineno}: column '{column}': invalid number {value:?}"))]
    InvalidNumber {
        path: String,
        lineno: u64,
        column: String,
        value: String,
    },
    #[snafu(display("Error creating the output directory {path}"))]
    CreatingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing the report {path}"))]
    WritingReport {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening JSON file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error serializing the summary to JSON"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfig { message: String },
    #[snafu(display("The trend analysis failed"))]
    Analysis { source: AnalysisError },
    #[snafu(display("The summary differs from the reference {path}"))]
    ReferenceMismatch { path: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// The resolved settings of a run: the configuration file with the
/// command line overrides applied.
#[derive(Debug, Clone)]
struct RunContext {
    config: PipelineConfig,
    summary: Option<String>,
    reference: Option<String>,
}

impl RunContext {
    fn output(&self, file_name: &str) -> String {
        join_path(&self.config.output_directory, file_name)
    }

    fn raw(&self, file_name: &str) -> String {
        join_path(&self.config.raw_data_directory, file_name)
    }
}

fn build_context(args: &Args) -> PipelineResult<RunContext> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Reading configuration {:?}", path);
            read_config(path)?
        }
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &args.raw_dir {
        config.raw_data_directory = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_directory = dir.clone();
    }
    debug!("build_context: config: {:?}", config);
    Ok(RunContext {
        config,
        summary: args.summary.clone(),
        reference: args.reference.clone(),
    })
}

/// Runs the requested step, or all of them in order.
pub fn run(args: &Args) -> PipelineResult<()> {
    let ctx = build_context(args)?;
    let out = ctx.config.output_directory.clone();
    fs::create_dir_all(&out).context(CreatingOutputSnafu { path: out.clone() })?;

    match args.step.unwrap_or(Step::All) {
        Step::Combine => combine(&ctx),
        Step::Extract => extract(&ctx),
        Step::Detect => detect(&ctx),
        Step::Counts => counts(&ctx),
        Step::ReappointmentCounts => reappointment_counts_step(&ctx),
        Step::Rates => rates(&ctx),
        Step::MaxRates => max_rates(&ctx),
        Step::AnnualProportions => annual_proportions(&ctx),
        Step::Regression => regression(&ctx),
        Step::All => {
            combine(&ctx)?;
            extract(&ctx)?;
            detect(&ctx)?;
            counts(&ctx)?;
            reappointment_counts_step(&ctx)?;
            rates(&ctx)?;
            max_rates(&ctx)?;
            annual_proportions(&ctx)?;
            regression(&ctx)
        }
    }
}

fn log_warnings(step: &str, warnings: &[DataQualityWarning]) {
    for w in warnings.iter() {
        warn!("{}: {}", step, w);
    }
}

fn same_header(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn field_aliases(columns: &ColumnMapping) -> [&Vec<String>; 5] {
    [
        &columns.name,
        &columns.position,
        &columns.organization,
        &columns.year,
        &columns.reappointed,
    ]
}

/// Step 1: concatenates the yearly raw files.
fn combine(ctx: &RunContext) -> PipelineResult<()> {
    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut found_files: usize = 0;
    let mut first_missing: Option<String> = None;
    for year in ctx.config.years() {
        let path = ctx.raw(&format!("appointments_{}.csv", year));
        if !Path::new(&path).is_file() {
            warn!("combine: {:?} not found, skipping year {}", path, year);
            first_missing.get_or_insert(path);
            continue;
        }
        let table = read_table(&path)?;
        found_files += 1;

        // Position of every column of this file in the combined header.
        // Columns accepted for the same field share one combined column,
        // named after the first alias seen.
        let mut positions: Vec<usize> = Vec::new();
        for h in table.headers.iter() {
            let field_column = field_aliases(&ctx.config.columns)
                .into_iter()
                .find(|accepted| accepted.iter().any(|a| same_header(a, h)))
                .and_then(|accepted| find_column(&headers, accepted));
            let existing = field_column.or_else(|| headers.iter().position(|x| same_header(x, h)));
            match existing {
                Some(idx) => {
                    if !same_header(&headers[idx], h) {
                        debug!(
                            "combine: {:?}: column {:?} merged into {:?}",
                            path, h, headers[idx]
                        );
                    }
                    positions.push(idx)
                }
                None => {
                    headers.push(h.clone());
                    positions.push(headers.len() - 1);
                }
            }
        }
        let year_from_file = if table.column(&ctx.config.columns.year).is_none() {
            let y = year_from_file_name(&path).unwrap_or(year);
            debug!("combine: {:?} has no year column, using {}", path, y);
            let idx = match find_column(&headers, &ctx.config.columns.year) {
                Some(idx) => idx,
                None => {
                    headers.push(YEAR_COLUMN.to_string());
                    headers.len() - 1
                }
            };
            Some((idx, y))
        } else {
            None
        };

        for (_, line) in table.rows.iter() {
            let mut row: Vec<String> = vec![String::new(); headers.len()];
            for (value, idx) in line.iter().zip(positions.iter()) {
                // Two aliases in the same file: the first non-empty cell wins.
                if row[*idx].is_empty() {
                    row[*idx] = value.to_string();
                }
            }
            if let Some((idx, y)) = year_from_file {
                row[idx] = y.to_string();
            }
            rows.push(row);
        }
        info!(
            "combine: {}: {} rows",
            simplify_file_name(&path),
            table.rows.len()
        );
    }
    if found_files == 0 {
        let path = first_missing.unwrap_or_else(|| ctx.config.raw_data_directory.clone());
        return MissingInputFileSnafu { path }.fail();
    }
    for row in rows.iter_mut() {
        row.resize(headers.len(), String::new());
    }
    let out = ctx.output(STEP1_FILE);
    write_table(&out, &headers, &rows)?;
    println!(
        "Step 1: combined {} file(s), {} appointments, {} columns -> {}",
        found_files,
        rows.len(),
        headers.len(),
        out
    );
    Ok(())
}

/// Step 2: keeps the columns used by the analysis, under their canonical names.
fn extract(ctx: &RunContext) -> PipelineResult<()> {
    let records = read_records(&ctx.output(STEP1_FILE), &ctx.config.columns)?;
    let undated = records.iter().filter(|r| r.year.is_none()).count();
    let flagged = records.iter().filter(|r| r.reappointed).count();
    let out = ctx.output(STEP2_FILE);
    write_records(&out, &records)?;
    println!(
        "Step 2: {} appointments ({} without a year, {} flagged in the source) -> {}",
        records.len(),
        undated,
        flagged,
        out
    );
    Ok(())
}

/// Step 3: flags the repeated appointments.
fn detect(ctx: &RunContext) -> PipelineResult<()> {
    let records = read_records(&ctx.output(STEP2_FILE), &ColumnMapping::canonical())?;
    let detection = detect_reappointments(&records, &ctx.config.normalization_rules());
    let stats = &detection.stats;
    if stats.incomplete_keys > 0 {
        warn!(
            "detect: {} record(s) without a full name, position and organization were not matched",
            stats.incomplete_keys
        );
    }
    let out = ctx.output(STEP3_FILE);
    write_records(&out, &detection.records)?;
    println!(
        "Step 3: {} appointments, {} identities ({} repeated), {} reappointments ({} already flagged, {} new) -> {}",
        stats.records,
        stats.groups,
        stats.repeated_groups,
        stats.total_flagged,
        stats.already_flagged,
        stats.newly_flagged,
        out
    );
    Ok(())
}

/// The year columns of the pivot tables: the configured period, extended
/// with any other year found in the data.
fn pivot_years(ctx: &RunContext, counts: &OrgYearCounts) -> Vec<i32> {
    let mut years: Vec<i32> = ctx.config.years().collect();
    years.extend(counts.years());
    years.sort_unstable();
    years.dedup();
    years
}

fn write_pivot(
    ctx: &RunContext,
    step: &str,
    file_name: &str,
    counts: &OrgYearCounts,
) -> PipelineResult<()> {
    if counts.skipped > 0 {
        warn!(
            "{}: {} record(s) without an organization or a year were skipped",
            step, counts.skipped
        );
    }
    let out = ctx.output(file_name);
    write_counts(&out, counts, &pivot_years(ctx, counts))?;
    println!(
        "{}: {} organizations, {} in total -> {}",
        step,
        counts.organizations().len(),
        counts.total(),
        out
    );
    Ok(())
}

/// Step 4: appointments per organization and year.
fn counts(ctx: &RunContext) -> PipelineResult<()> {
    let records = read_records(&ctx.output(STEP3_FILE), &ColumnMapping::canonical())?;
    write_pivot(ctx, "Step 4", STEP4_FILE, &appointment_counts(&records))
}

/// Step 5: reappointments per organization and year.
fn reappointment_counts_step(ctx: &RunContext) -> PipelineResult<()> {
    let records = read_records(&ctx.output(STEP3_FILE), &ColumnMapping::canonical())?;
    write_pivot(ctx, "Step 5", STEP5_FILE, &reappointment_counts(&records))
}

/// Step 6: reappointment rate per organization and year.
fn rates(ctx: &RunContext) -> PipelineResult<()> {
    let apps = read_counts(&ctx.output(STEP4_FILE))?;
    let reapps = read_counts(&ctx.output(STEP5_FILE))?;
    let (aggregates, warnings) = org_year_aggregates(&apps, &reapps);
    log_warnings("rates", &warnings);
    let out = ctx.output(STEP6_FILE);
    write_rates(&out, &aggregates)?;
    let undefined = aggregates.iter().filter(|a| a.rate.is_none()).count();
    println!(
        "Step 6: {} organization-years ({} without appointments, {} warnings) -> {}",
        aggregates.len(),
        undefined,
        warnings.len(),
        out
    );
    Ok(())
}

/// Step 7: the organization with the highest rate of each year.
fn max_rates(ctx: &RunContext) -> PipelineResult<()> {
    let mut aggregates = read_rates(&ctx.output(STEP6_FILE))?;
    let warnings = check_rates(&mut aggregates);
    log_warnings("max-rates", &warnings);
    let maximums = yearly_maximums(&aggregates);
    let out = ctx.output(STEP7_FILE);
    write_maximums(&out, &maximums)?;
    println!("Step 7: yearly maximum rates -> {}", out);
    for m in maximums.iter() {
        println!(
            "  {}: {} ({:.1}%, {}/{})",
            m.year,
            m.organization,
            m.rate * 100.0,
            m.reappointments,
            m.total_appointments
        );
    }
    Ok(())
}

/// Step 8: government-wide proportion of reappointments per year.
fn annual_proportions(ctx: &RunContext) -> PipelineResult<()> {
    let records = read_records(&ctx.output(STEP3_FILE), &ColumnMapping::canonical())?;
    let (annual, warnings) = annual_aggregates(&records, Some(ctx.config.years()));
    log_warnings("annual-proportions", &warnings);
    let out = ctx.output(STEP8_FILE);
    write_annual(&out, &annual)?;
    println!("Step 8: annual reappointment proportions -> {}", out);
    for a in annual.iter() {
        match a.proportion {
            Some(p) => println!(
                "  {}: {:.2}% ({}/{})",
                a.year,
                p * 100.0,
                a.total_reappointments,
                a.total_appointments
            ),
            None => println!("  {}: no appointment", a.year),
        }
    }
    Ok(())
}

/// Step 9: linear trend of the annual proportions.
fn regression(ctx: &RunContext) -> PipelineResult<()> {
    let annual = read_annual(&ctx.output(STEP8_FILE))?;
    let analysis = analyze_trend(&annual).context(AnalysisSnafu {})?;
    let text = report::render_report(&analysis);
    let out = ctx.output(STEP9_FILE);
    report::write_report(&out, &text)?;
    println!("{}", text);
    println!("Step 9: report -> {}", out);

    let pretty = report::render_summary(&analysis)?;
    if let Some(path) = &ctx.summary {
        report::write_report(path, &pretty)?;
        info!("regression: summary written to {:?}", path);
    }
    if let Some(path) = &ctx.reference {
        report::check_reference(path, &pretty)?;
        println!("Step 9: summary matches the reference {}", path);
    }
    Ok(())
}

use clap::{Parser, Subcommand};

/// Detects reappointments in the New Brunswick public appointment records and
/// measures their trend over time.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file with the settings of the analysis: directories, period,
    /// accepted column names and name normalization. Every setting has a default.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (directory) The location of the yearly appointments_<year>.csv files. Overrides the
    /// directory given in the configuration.
    #[clap(long, value_parser)]
    pub raw_dir: Option<String>,

    /// (directory) Where the output of each step is written and read back. Overrides the
    /// directory given in the configuration.
    #[clap(short, long, value_parser)]
    pub output_dir: Option<String>,

    /// (file path) If specified, the regression step also writes its results in JSON format
    /// to the given location.
    #[clap(short, long, value_parser)]
    pub summary: Option<String>,

    /// (file path) A JSON summary from an earlier run. If provided, the regression step
    /// checks that its results match the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    /// The step to run. All the steps are run in order when not specified.
    #[clap(subcommand)]
    pub step: Option<Step>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Step 1: combine the yearly raw files
    Combine,
    /// Step 2: extract the name, position, organization, year and reappointed columns
    Extract,
    /// Step 3: flag the repeated appointments of the same person
    Detect,
    /// Step 4: count the appointments per organization and year
    Counts,
    /// Step 5: count the reappointments per organization and year
    ReappointmentCounts,
    /// Step 6: compute the reappointment rates per organization and year
    Rates,
    /// Step 7: find the organization with the highest rate of each year
    MaxRates,
    /// Step 8: compute the government-wide proportion of reappointments per year
    AnnualProportions,
    /// Step 9: fit the trend of the annual proportions and write the report
    Regression,
    /// Run the nine steps in order
    All,
}

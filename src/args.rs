use clap::Parser;

/// Computes, for every year of an election table, the fewest popular votes that would have
/// changed the outcome of the electoral college.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file with the settings of the run. See the manual of the
    /// electoral_flip library for the format. The options given on the command line take
    /// precedence over the file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The CSV table with one row per state and per year.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (directory, default results) Where the result tables and the report are written.
    #[clap(short, long, value_parser)]
    pub out_dir: Option<String>,

    /// (default 1900) The first year to process.
    #[clap(long, value_parser)]
    pub start_year: Option<u32>,

    /// (default 2024) The last year to process.
    #[clap(long, value_parser)]
    pub end_year: Option<u32>,

    /// (classic or no_majority, default classic) classic: the runner-up reaches the majority.
    /// no_majority: the winner loses the majority.
    #[clap(short, long, value_parser)]
    pub mode: Option<String>,

    /// (default 0.5) The weight of the popular margin in the weighted geometric closeness.
    #[clap(long, value_parser)]
    pub alpha: Option<f64>,

    /// (default 0.005) States with a two-party margin below this share count as recount-close.
    #[clap(long, value_parser)]
    pub recount_threshold: Option<f64>,

    /// (default 0.02) Winner states with a two-party margin below this share count as brittle.
    #[clap(long, value_parser)]
    pub brittleness_threshold: Option<f64>,

    /// (file path, 'stdout' or empty) If specified, the summary of the run will be written in
    /// JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub summary: Option<String>,

    /// (file path) A reference file containing a summary in JSON format. If provided, evflip
    /// will check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (year, votes or ratio, default year) The order of the years in the text report.
    #[clap(long, value_parser)]
    pub report_order: Option<String>,

    // Other arguments
    /// If passed as an argument, the years are solved in parallel.
    #[clap(long, takes_value = false)]
    pub parallel: bool,

    /// If passed as an argument, the run stops at the first year that fails.
    #[clap(long, takes_value = false)]
    pub fail_fast: bool,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

use log::{debug, info, warn};

use electoral_flip::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::flip::config_reader::*;
use crate::flip::io_csv::read_year_tables;
use crate::flip::report::*;

pub mod config_reader;
mod io_csv;
mod report;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EvFlipError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error formatting the summary"))]
    FormattingJson { source: serde_json::Error },
    #[snafu(display("Error opening the CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of the CSV file"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("The CSV file {path} has no column {column}"))]
    CsvMissingColumn { path: String, column: String },
    #[snafu(display("Error writing {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Cannot find the directory of {path}"))]
    MissingParentDir { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type EvFlipResult<T> = Result<T, EvFlipError>;

fn path_str(p: &Path) -> String {
    p.display().to_string()
}

/// The JSON summary of a run.
fn build_summary_js(settings: &RunSettings, result: &BatchResult) -> EvFlipResult<JSValue> {
    let results: Vec<JSValue> = result
        .summaries
        .iter()
        .map(|s| {
            json!({
                "year": s.year,
                "winner": s.winner,
                "winnerName": s.winner_name,
                "runnerUp": s.runner_up,
                "runnerUpName": s.runner_up_name,
                "winnerElectoralVotes": s.winner_electoral_votes,
                "runnerUpElectoralVotes": s.runner_up_electoral_votes,
                "electoralVotesToWin": s.electoral_votes_to_win,
                "requiredElectoralVotes": s.required_electoral_votes,
                "flippedStates": s.flipped,
                "minVotesToFlip": s.solution.min_votes_to_flip,
                "achievedElectoralVotes": s.solution.achieved_electoral_votes,
                "popularVoteMargin": s.popular_vote_margin,
                "totalVotes": s.total_votes,
            })
        })
        .collect();
    let failures = serde_json::to_value(&result.failures).context(FormattingJsonSnafu {})?;
    Ok(json!({
        "config": {
            "startYear": settings.start_year,
            "endYear": settings.end_year,
            "mode": settings.mode.as_str(),
        },
        "results": results,
        "failures": failures,
    }))
}

fn write_summary(summary: &str, dest: &str) -> EvFlipResult<()> {
    if dest == "stdout" {
        println!("{}", summary);
        Ok(())
    } else {
        fs::write(dest, summary).context(WritingFileSnafu { path: dest })
    }
}

fn check_reference(pretty_js_stats: &str, reference_path: &str) -> EvFlipResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(FormattingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference summary {}", reference_path);
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        whatever!("Difference detected between the computed summary and the reference summary")
    }
    info!("check_reference: the summary matches {}", reference_path);
    Ok(())
}

fn write_outputs(settings: &RunSettings, result: &BatchResult) -> EvFlipResult<()> {
    let out_dir = settings.out_dir.as_path();
    fs::create_dir_all(out_dir).context(WritingFileSnafu {
        path: path_str(out_dir),
    })?;
    let span = format!("{}-{}", settings.start_year, settings.end_year);
    let prefix = settings.mode.file_prefix();

    let results_p: PathBuf = out_dir.join(format!("{}_results-{}.csv", prefix, span));
    write_results_csv(&results_p, &result.summaries)?;

    let metrics_p: PathBuf = out_dir.join(format!("{}_election_metrics-{}.csv", prefix, span));
    write_metrics_csv(&metrics_p, &result.summaries)?;

    let frequency_p: PathBuf =
        out_dir.join(format!("{}_flipped_states_frequency-{}.csv", prefix, span));
    write_frequency_csv(&frequency_p, &flip_frequency(&result.summaries))?;

    let report_p: PathBuf = out_dir.join(format!("{}_results_{}.txt", prefix, span));
    let report = format_report(&result.summaries, settings.report_order);
    fs::write(&report_p, report).context(WritingFileSnafu {
        path: path_str(&report_p),
    })?;
    info!("write_outputs: results written to {}", path_str(out_dir));
    Ok(())
}

/// Runs the whole analysis described by the command line.
///
/// Years that cannot be solved are reported in the result; only problems with the
/// settings, the input file or the outputs are errors.
pub fn run_analysis(args: &Args) -> EvFlipResult<BatchResult> {
    let settings = resolve_settings(args)?;
    info!("run_analysis: settings: {:?}", settings);

    let parsed = read_year_tables(&settings.input, settings.start_year, settings.end_year)?;
    debug!(
        "run_analysis: {} years read, {} years rejected",
        parsed.tables.len(),
        parsed.failures.len()
    );
    if settings.fail_fast {
        if let Some(failure) = parsed.failures.first() {
            whatever!(
                "Year {} could not be read: {}",
                failure.year,
                failure.message
            )
        }
    }

    let options = BatchOptions {
        mode: settings.mode,
        metrics: settings.metrics,
        parallel: settings.parallel,
        fail_fast: settings.fail_fast,
        cancel: None,
    };
    let mut result = run_batch(&parsed.tables, &options);
    if settings.fail_fast {
        if let Some(failure) = result.failures.first() {
            whatever!("Year {} failed: {}", failure.year, failure.message)
        }
    }
    result.failures.extend(parsed.failures);
    result.failures.sort_by_key(|f| f.year);
    for failure in result.failures.iter() {
        warn!(
            "run_analysis: year {} skipped ({}): {}",
            failure.year, failure.kind, failure.message
        );
    }

    write_outputs(&settings, &result)?;

    let summary_js = build_summary_js(&settings, &result)?;
    let pretty_js_stats =
        serde_json::to_string_pretty(&summary_js).context(FormattingJsonSnafu {})?;
    if let Some(dest) = settings.summary.as_deref() {
        write_summary(&pretty_js_stats, dest)?;
    }
    if let Some(reference_path) = settings.reference.as_deref() {
        check_reference(&pretty_js_stats, reference_path)?;
    }

    Ok(result)
}

// Writers for the result tables and the text report.

use std::fmt::Write as FmtWrite;
use std::str::FromStr;

use serde::Serialize;

use crate::flip::*;

/// The order of the years in the text report.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ReportOrder {
    Year,
    /// By increasing number of votes to flip.
    Votes,
    /// By increasing share of the total votes of the year.
    Ratio,
}

impl FromStr for ReportOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "year" => Ok(ReportOrder::Year),
            "votes" | "raw" => Ok(ReportOrder::Votes),
            "ratio" => Ok(ReportOrder::Ratio),
            x => Err(format!(
                "unknown report order {:?} (expected year, votes or ratio)",
                x
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    year: u32,
    mode: &'a str,
    winner: &'a str,
    winner_name: &'a str,
    runner_up: &'a str,
    runner_up_name: &'a str,
    winner_electoral_votes: u32,
    runner_up_electoral_votes: u32,
    total_electoral_votes: u32,
    electoral_votes_to_win: u32,
    required_electoral_votes: i64,
    min_votes_to_flip: u64,
    achieved_electoral_votes: u32,
    number_of_flipped_states: usize,
    flipped_states: String,
    winner_popular_votes: u64,
    runner_up_popular_votes: u64,
    popular_vote_margin: i64,
    total_votes: u64,
    flip_margin_ratio: f64,
    popular_margin_ratio: f64,
}

impl<'a> ResultRow<'a> {
    fn of(s: &'a YearSummary) -> ResultRow<'a> {
        ResultRow {
            year: s.year,
            mode: s.mode.as_str(),
            winner: &s.winner,
            winner_name: s.winner_name.as_deref().unwrap_or(""),
            runner_up: &s.runner_up,
            runner_up_name: s.runner_up_name.as_deref().unwrap_or(""),
            winner_electoral_votes: s.winner_electoral_votes,
            runner_up_electoral_votes: s.runner_up_electoral_votes,
            total_electoral_votes: s.total_electoral_votes,
            electoral_votes_to_win: s.electoral_votes_to_win,
            required_electoral_votes: s.required_electoral_votes,
            min_votes_to_flip: s.solution.min_votes_to_flip,
            achieved_electoral_votes: s.solution.achieved_electoral_votes,
            number_of_flipped_states: s.number_of_flipped_states(),
            flipped_states: s.solution.flipped_states.join(";"),
            winner_popular_votes: s.winner_popular_votes,
            runner_up_popular_votes: s.runner_up_popular_votes,
            popular_vote_margin: s.popular_vote_margin,
            total_votes: s.total_votes,
            flip_margin_ratio: s.flip_margin_ratio,
            popular_margin_ratio: s.popular_margin_ratio,
        }
    }
}

#[derive(Debug, Serialize)]
struct FrequencyRow<'a> {
    state: &'a str,
    count: usize,
}

fn write_rows<T: Serialize>(path: &Path, rows: impl Iterator<Item = T>) -> EvFlipResult<()> {
    let path_s = path_str(path);
    let mut wtr = csv::Writer::from_path(path).context(CsvWriteSnafu {
        path: path_s.clone(),
    })?;
    for row in rows {
        wtr.serialize(row).context(CsvWriteSnafu {
            path: path_s.clone(),
        })?;
    }
    wtr.flush().context(WritingFileSnafu { path: path_s })?;
    debug!("write_rows: wrote {:?}", path);
    Ok(())
}

/// One row per year with the flipped states.
pub fn write_results_csv(path: &Path, summaries: &[YearSummary]) -> EvFlipResult<()> {
    write_rows(path, summaries.iter().map(ResultRow::of))
}

/// One row of closeness metrics per year.
pub fn write_metrics_csv(path: &Path, summaries: &[YearSummary]) -> EvFlipResult<()> {
    write_rows(path, summaries.iter().map(|s| &s.metrics))
}

pub fn write_frequency_csv(path: &Path, frequency: &[(String, usize)]) -> EvFlipResult<()> {
    write_rows(
        path,
        frequency.iter().map(|(state, count)| FrequencyRow {
            state,
            count: *count,
        }),
    )
}

/// 1234567 -> "1,234,567"
fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut res = String::new();
    for (idx, c) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            res.push(',');
        }
        res.push(c);
    }
    if n < 0 {
        format!("-{}", res)
    } else {
        res
    }
}

fn party_label(name: &Option<String>, party: &str) -> String {
    match name {
        Some(n) => format!("{} ({})", n, party),
        None => party.to_string(),
    }
}

fn ratio_to(num: u64, denom: u64) -> f64 {
    if denom == 0 {
        f64::INFINITY
    } else {
        100.0 * num as f64 / denom as f64
    }
}

fn format_year(s: &YearSummary) -> Result<String, std::fmt::Error> {
    let winner = party_label(&s.winner_name, &s.winner);
    let runner_up = party_label(&s.runner_up_name, &s.runner_up);
    let mut out = String::new();
    writeln!(out, "Year: {}", s.year)?;
    writeln!(
        out,
        "\tOriginal Winner:\n\t\t{} with {} electoral votes ({} needed)\n\t\t\tvs {} with {} electoral votes",
        winner,
        s.winner_electoral_votes,
        s.electoral_votes_to_win,
        runner_up,
        s.runner_up_electoral_votes
    )?;
    let popular_winner = if s.popular_vote_margin > 0 {
        &winner
    } else {
        &runner_up
    };
    writeln!(
        out,
        "\tPopular Vote Margin: {} for {}",
        thousands(s.popular_vote_margin.abs()),
        popular_winner
    )?;

    if s.solution.is_empty() {
        writeln!(
            out,
            "\tNo flip needed: {} electoral votes required\n",
            s.required_electoral_votes
        )?;
        return Ok(out);
    }

    write!(out, "\tFlipped states:")?;
    for fs in s.flipped.iter() {
        write!(
            out,
            "\n\t\t{:<15} ({:>2} EVs):{:>10} ({:>7}) flipped votes",
            fs.state,
            fs.electoral_votes,
            thousands(fs.votes_to_flip as i64),
            format!("{:.3}%", fs.percent_flipped)
        )?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "\tTotal number of flipped votes: {} across {} states\n\tRatio to Popular Vote Margin: {:.5}%\n\tRatio to Total Votes in Year: {:.5}%",
        thousands(s.solution.min_votes_to_flip as i64),
        s.number_of_flipped_states(),
        ratio_to(s.solution.min_votes_to_flip, s.popular_vote_margin.unsigned_abs()),
        s.flip_margin_ratio
    )?;
    match s.mode {
        FlipMode::Classic => writeln!(
            out,
            "\tNew Winner:\n\t\t{} with {} electoral votes ({} needed)\n\t\t\tvs {} with {} electoral votes\n",
            runner_up,
            s.electoral_votes_after_flip(&s.runner_up),
            s.electoral_votes_to_win,
            winner,
            s.electoral_votes_after_flip(&s.winner)
        )?,
        FlipMode::NoMajority => writeln!(
            out,
            "\tNo Majority:\n\t\t{} with {} electoral votes ({} needed)\n\t\t\tvs {} with {} electoral votes\n",
            winner,
            s.electoral_votes_after_flip(&s.winner),
            s.electoral_votes_to_win,
            runner_up,
            s.electoral_votes_after_flip(&s.runner_up)
        )?,
    }
    Ok(out)
}

/// The human-readable report of all the years.
pub fn format_report(summaries: &[YearSummary], order: ReportOrder) -> String {
    let mut ordered: Vec<&YearSummary> = summaries.iter().collect();
    match order {
        ReportOrder::Year => ordered.sort_by_key(|s| s.year),
        ReportOrder::Votes => ordered.sort_by_key(|s| s.solution.min_votes_to_flip),
        ReportOrder::Ratio => {
            ordered.sort_by(|a, b| a.flip_margin_ratio.total_cmp(&b.flip_margin_ratio))
        }
    }
    let mut res = String::new();
    for s in ordered {
        match format_year(s) {
            Ok(section) => res.push_str(&section),
            Err(e) => warn!("format_report: cannot format {}: {}", s.year, e),
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use electoral_flip::builder::YearBuilder;

    fn summaries() -> Vec<YearSummary> {
        let close = YearBuilder::new(2000)
            .state("FL", 25, "R", &[("D", 2912253), ("R", 2912790)])
            .state("CA", 54, "D", &[("D", 5861203), ("R", 4567429)])
            .state("TX", 32, "R", &[("D", 2433746), ("R", 3799639)])
            .candidate_name("R", "George W. Bush")
            .build()
            .unwrap();
        let wide = YearBuilder::new(1984)
            .state("CA", 47, "R", &[("D", 4000000), ("R", 5400000)])
            .state("MN", 10, "D", &[("D", 1036364), ("R", 1032603)])
            .build()
            .unwrap();
        [close, wide]
            .iter()
            .map(|t| solve_year(t, FlipMode::Classic, &MetricsConfig::DEFAULT).unwrap())
            .collect()
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
        assert_eq!(thousands(-45000), "-45,000");
    }

    #[test]
    fn report_order() {
        assert_eq!("votes".parse::<ReportOrder>(), Ok(ReportOrder::Votes));
        assert!("size".parse::<ReportOrder>().is_err());

        let s = summaries();
        let by_year = format_report(&s, ReportOrder::Year);
        assert!(by_year.find("Year: 1984").unwrap() < by_year.find("Year: 2000").unwrap());
        let by_votes = format_report(&s, ReportOrder::Votes);
        assert!(by_votes.find("Year: 2000").unwrap() < by_votes.find("Year: 1984").unwrap());
    }

    #[test]
    fn year_section() {
        let s = summaries();
        let y2000 = s.iter().find(|s| s.year == 2000).unwrap();
        let text = format_year(y2000).unwrap();
        assert!(text.contains("George W. Bush (R) with 57 electoral votes (56 needed)"));
        assert!(text.contains("\t\tFL              (25 EVs):       269"));
        assert!(text.contains("Total number of flipped votes: 269 across 1 states"));
        assert!(text.contains("New Winner:\n\t\tD with 79 electoral votes"));
        assert!(text.contains("vs George W. Bush (R) with 32 electoral votes"));
    }

    #[test]
    fn tables() {
        let dir = tempfile::tempdir().unwrap();
        let s = summaries();
        let results_p = dir.path().join("results.csv");
        write_results_csv(&results_p, &s).unwrap();
        let mut rdr = csv::Reader::from_path(&results_p).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.get(0), Some("year"));
        let flipped_idx = headers.iter().position(|h| h == "flipped_states").unwrap();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(flipped_idx), Some("FL"));

        let metrics_p = dir.path().join("metrics.csv");
        write_metrics_csv(&metrics_p, &s).unwrap();
        let mut rdr = csv::Reader::from_path(&metrics_p).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert!(headers.iter().any(|h| h == "C1_euclidean"));
        assert!(headers.iter().any(|h| h == "institutional_distortion_D"));

        let freq_p = dir.path().join("freq.csv");
        write_frequency_csv(&freq_p, &flip_frequency(&s)).unwrap();
        let contents = fs::read_to_string(&freq_p).unwrap();
        assert!(contents.starts_with("state,count\n"));
    }
}

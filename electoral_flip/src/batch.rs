use log::{debug, error, info, warn};
use rayon::prelude::*;
use snafu::prelude::*;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::*;
use crate::cost_model::flip_candidates;
use crate::metrics::compute_year_metrics;
use crate::solve_flip;

impl YearContext {
    /// Resolves the winner, the runner-up and the electoral totals of a year.
    ///
    /// Values declared in the table take precedence over the values derived from the
    /// rows. A disagreement between the two is logged.
    pub fn resolve(table: &YearTable) -> Result<YearContext, FlipError> {
        let year = table.year;
        let derived_total: u32 = table.rows.iter().map(|r| r.electoral_votes).sum();
        let total_electoral_votes = declared_or_derived(
            year,
            "total electoral votes",
            table.declared.total_electoral_votes,
            derived_total,
        );
        let electoral_votes_to_win = declared_or_derived(
            year,
            "electoral votes to win",
            table.declared.electoral_votes_to_win,
            total_electoral_votes / 2 + 1,
        );

        let mut electoral_totals: BTreeMap<String, u32> = BTreeMap::new();
        for party in table.parties() {
            electoral_totals.insert(party, 0);
        }
        for row in table.rows.iter() {
            let party = row.party_win.trim();
            if party.is_empty() {
                continue;
            }
            *electoral_totals.entry(party.to_string()).or_insert(0) += row.electoral_votes;
        }
        for (party, declared) in table.declared.electoral.iter() {
            let derived = electoral_totals.get(party).copied().unwrap_or(0);
            let value = declared_or_derived(
                year,
                &format!("electoral votes of {}", party),
                Some(*declared),
                derived,
            );
            electoral_totals.insert(party.clone(), value);
        }

        ensure!(
            electoral_totals.len() >= 2,
            UndeterminedOutcomeSnafu {
                year,
                reason: format!("only {} party in the table", electoral_totals.len()),
            }
        );

        let popular: HashMap<&str, u64> = electoral_totals
            .keys()
            .map(|p| (p.as_str(), table.popular_votes(p)))
            .collect();
        let mut ranking: Vec<&str> = electoral_totals.keys().map(|p| p.as_str()).collect();
        // Keys are in code order and the sort is stable.
        ranking.sort_by_key(|p| (Reverse(electoral_totals[*p]), Reverse(popular[*p])));
        debug!("resolve: {}: ranking {:?}", year, ranking);

        let winner = match declared_party(&table.declared.overall_winner) {
            Some(w) => {
                if w != ranking[0] {
                    warn!(
                        "resolve: {}: declared winner {} differs from the electoral leader {}",
                        year, w, ranking[0]
                    );
                }
                w.to_string()
            }
            None => ranking[0].to_string(),
        };
        let runner_up = match declared_party(&table.declared.overall_runner_up) {
            Some(r) => r.to_string(),
            None => ranking
                .iter()
                .find(|p| **p != winner)
                .map(|p| p.to_string())
                .context(UndeterminedOutcomeSnafu {
                    year,
                    reason: "no runner-up",
                })?,
        };
        ensure!(
            winner != runner_up,
            UndeterminedOutcomeSnafu {
                year,
                reason: format!("{} is both the winner and the runner-up", winner),
            }
        );

        Ok(YearContext {
            year,
            total_electoral_votes,
            electoral_votes_to_win,
            winner,
            runner_up,
            electoral_totals,
        })
    }
}

fn declared_party(declared: &Option<String>) -> Option<&str> {
    declared
        .as_deref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn declared_or_derived(year: u32, what: &str, declared: Option<u32>, derived: u32) -> u32 {
    match declared {
        Some(d) if d != derived => {
            warn!(
                "resolve: {}: declared {} {} but the rows give {}; using the declared value",
                year, what, d, derived
            );
            d
        }
        Some(d) => d,
        None => derived,
    }
}

fn percent(num: f64, denom: u64) -> f64 {
    if denom == 0 {
        f64::NAN
    } else {
        100.0 * num / denom as f64
    }
}

/// Solves one year.
///
/// In the classic mode, the runner-up gains states until it reaches the number of
/// electoral votes needed to win. In the no-majority mode, the winner loses states
/// until it falls below that number.
///
/// If the table already shows the target outcome, the year is reported with an empty
/// flip.
pub fn solve_year(
    table: &YearTable,
    mode: FlipMode,
    config: &MetricsConfig,
) -> Result<YearSummary, FlipError> {
    let ctx = YearContext::resolve(table)?;
    let winner_ev = ctx.electoral_votes_of(&ctx.winner);
    let runner_up_ev = ctx.electoral_votes_of(&ctx.runner_up);
    let to_win = ctx.electoral_votes_to_win as i64;

    let mut candidates = flip_candidates(&table.rows, &ctx.runner_up)?;
    let required = match mode {
        FlipMode::Classic => to_win - runner_up_ev as i64,
        FlipMode::NoMajority => {
            let winner_states: Vec<&str> = table
                .rows
                .iter()
                .filter(|r| r.party_win.trim() == ctx.winner)
                .map(|r| r.state.as_str())
                .collect();
            candidates.retain(|state, _| winner_states.contains(&state));
            winner_ev as i64 - to_win + 1
        }
    };
    debug!(
        "solve_year: {} ({}): {} candidates, target {}",
        table.year,
        mode,
        candidates.len(),
        required
    );

    let solution = if required <= 0 {
        warn!(
            "solve_year: {}: the table already shows the {} outcome ({} has {} electoral votes, {} has {}, {} to win)",
            table.year, mode, ctx.winner, winner_ev, ctx.runner_up, runner_up_ev, to_win
        );
        FlipSolution::empty(candidates)
    } else {
        solve_flip(&candidates, required)?
    };

    let mut flipped: Vec<FlippedState> = Vec::new();
    for state in solution.flipped_states.iter() {
        let row = table.rows.iter().find(|r| r.state == *state);
        let candidate = solution.candidates.get(state);
        if let (Some(row), Some(c)) = (row, candidate) {
            flipped.push(FlippedState {
                state: state.clone(),
                party_win: row.party_win.trim().to_string(),
                electoral_votes: c.electoral_votes,
                votes_to_flip: c.votes_to_flip,
                percent_flipped: percent(c.votes_to_flip as f64, c.total_votes),
            });
        }
    }
    flipped.sort_by_key(|fs| fs.votes_to_flip);

    let winner_popular_votes = table.popular_votes(&ctx.winner);
    let runner_up_popular_votes = table.popular_votes(&ctx.runner_up);
    let popular_vote_margin = winner_popular_votes as i64 - runner_up_popular_votes as i64;
    let total_votes = table.total_votes();
    let metrics = compute_year_metrics(table, &ctx, &solution, required, config);

    info!(
        "solve_year: {}: {} votes flip {} electoral votes from {} ({:?})",
        table.year,
        solution.min_votes_to_flip,
        solution.achieved_electoral_votes,
        ctx.winner,
        solution.flipped_states
    );

    Ok(YearSummary {
        year: table.year,
        mode,
        winner_name: table.candidate_name(&ctx.winner).map(|s| s.to_string()),
        runner_up_name: table.candidate_name(&ctx.runner_up).map(|s| s.to_string()),
        winner_electoral_votes: winner_ev,
        runner_up_electoral_votes: runner_up_ev,
        total_electoral_votes: ctx.total_electoral_votes,
        electoral_votes_to_win: ctx.electoral_votes_to_win,
        required_electoral_votes: required,
        flip_margin_ratio: percent(solution.min_votes_to_flip as f64, total_votes),
        popular_margin_ratio: percent(popular_vote_margin as f64, total_votes),
        solution,
        flipped,
        winner_popular_votes,
        runner_up_popular_votes,
        popular_vote_margin,
        total_votes,
        metrics,
        winner: ctx.winner,
        runner_up: ctx.runner_up,
        electoral_totals: ctx.electoral_totals,
    })
}

/// Options of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub mode: FlipMode,
    pub metrics: MetricsConfig,
    /// Solves the years on the rayon thread pool.
    pub parallel: bool,
    /// Stops the batch after the first failed year.
    pub fail_fast: bool,
    /// When set to true, the years that have not started yet are skipped.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            mode: FlipMode::Classic,
            metrics: MetricsConfig::DEFAULT,
            parallel: false,
            fail_fast: false,
            cancel: None,
        }
    }
}

enum YearOutcome {
    Solved(Box<YearSummary>),
    Failed(YearFailure),
    Skipped,
}

fn process_year(table: &YearTable, options: &BatchOptions, stop: &AtomicBool) -> YearOutcome {
    let cancelled = options
        .cancel
        .as_ref()
        .map(|c| c.load(Ordering::SeqCst))
        .unwrap_or(false);
    if cancelled || stop.load(Ordering::SeqCst) {
        debug!("process_year: skipping {}", table.year);
        return YearOutcome::Skipped;
    }
    match solve_year(table, options.mode, &options.metrics) {
        Ok(summary) => YearOutcome::Solved(Box::new(summary)),
        Err(e) => {
            error!("process_year: {} failed: {}", table.year, e);
            if options.fail_fast {
                stop.store(true, Ordering::SeqCst);
            }
            YearOutcome::Failed(YearFailure {
                year: table.year,
                kind: e.kind(),
                message: e.to_string(),
            })
        }
    }
}

/// Solves every year of a table.
///
/// A year that fails is recorded in the failures and the other years still run.
/// The results are in year order, also when the years are solved in parallel.
pub fn run_batch(tables: &[YearTable], options: &BatchOptions) -> BatchResult {
    let mut ordered: Vec<&YearTable> = tables.iter().collect();
    ordered.sort_by_key(|t| t.year);
    info!(
        "run_batch: {} years, mode {}, parallel: {}",
        ordered.len(),
        options.mode,
        options.parallel
    );

    let stop = AtomicBool::new(false);
    let outcomes: Vec<YearOutcome> = if options.parallel {
        ordered
            .par_iter()
            .map(|t| process_year(t, options, &stop))
            .collect()
    } else {
        ordered
            .iter()
            .map(|t| process_year(t, options, &stop))
            .collect()
    };

    let mut res = BatchResult::default();
    for outcome in outcomes {
        match outcome {
            YearOutcome::Solved(summary) => res.summaries.push(*summary),
            YearOutcome::Failed(failure) => res.failures.push(failure),
            YearOutcome::Skipped => res.cancelled = true,
        }
    }
    info!(
        "run_batch: {} years solved, {} failed{}",
        res.summaries.len(),
        res.failures.len(),
        if res.cancelled { ", cancelled" } else { "" }
    );
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::YearBuilder;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn year_2000() -> YearTable {
        YearBuilder::new(2000)
            .state("A", 10, "R", &[("D", 400), ("R", 1000)])
            .state("B", 5, "D", &[("D", 700), ("R", 300)])
            .state("C", 6, "R", &[("D", 590), ("R", 600)])
            .build()
            .unwrap()
    }

    // R 16, D 5, T 3 out of 24: 13 to win.
    fn three_party(year: u32) -> YearTable {
        YearBuilder::new(year)
            .state("A", 10, "R", &[("D", 400), ("R", 1000), ("T", 0)])
            .state("B", 5, "D", &[("D", 700), ("R", 300), ("T", 0)])
            .state("C", 6, "R", &[("D", 590), ("R", 600), ("T", 0)])
            .state_with_total("E", 3, "T", &[("D", 100), ("R", 200), ("T", 500)], 800)
            .candidate_name("D", "Donkey")
            .build()
            .unwrap()
    }

    fn malformed(year: u32) -> YearTable {
        YearBuilder::new(year)
            .state("A", 10, "R", &[("D", 400), ("R", 1000)])
            .state("B", 5, "D", &[("D", 700), ("R", 300)])
            .state("X", 3, "R", &[("R", 100)])
            .build()
            .unwrap()
    }

    fn one_party(year: u32) -> YearTable {
        YearBuilder::new(year)
            .state("A", 10, "R", &[("R", 1000)])
            .build()
            .unwrap()
    }

    #[test]
    fn derived_context() {
        let ctx = YearContext::resolve(&three_party(1912)).unwrap();
        assert_eq!(ctx.total_electoral_votes, 24);
        assert_eq!(ctx.electoral_votes_to_win, 13);
        assert_eq!(ctx.winner, "R");
        assert_eq!(ctx.runner_up, "D");
        assert_eq!(ctx.electoral_votes_of("T"), 3);
        assert_eq!(ctx.electoral_votes_of("X"), 0);
    }

    #[test]
    fn declared_values_win() {
        let table = YearBuilder::new(1912)
            .state("A", 10, "R", &[("D", 400), ("R", 1000), ("T", 0)])
            .state("B", 5, "D", &[("D", 700), ("R", 300), ("T", 0)])
            .state("E", 3, "T", &[("D", 100), ("R", 200), ("T", 500)])
            .declare_total_electoral_votes(538)
            .declare_runner_up("T")
            .declare_party_electoral("D", 7)
            .build()
            .unwrap();
        let ctx = YearContext::resolve(&table).unwrap();
        assert_eq!(ctx.total_electoral_votes, 538);
        assert_eq!(ctx.electoral_votes_to_win, 270);
        assert_eq!(ctx.winner, "R");
        assert_eq!(ctx.runner_up, "T");
        assert_eq!(ctx.electoral_votes_of("D"), 7);
    }

    #[test]
    fn popular_vote_breaks_electoral_ties() {
        let table = YearBuilder::new(1800)
            .state("A", 5, "R", &[("D", 400), ("R", 1000)])
            .state("B", 5, "D", &[("D", 1700), ("R", 300)])
            .build()
            .unwrap();
        let ctx = YearContext::resolve(&table).unwrap();
        assert_eq!(ctx.winner, "D");
        assert_eq!(ctx.runner_up, "R");
    }

    #[test]
    fn undetermined_outcomes() {
        let err = YearContext::resolve(&one_party(1820)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::UndeterminedOutcome);

        let table = YearBuilder::new(1824)
            .state("A", 10, "R", &[("D", 400), ("R", 1000)])
            .declare_winner("R")
            .declare_runner_up("R")
            .build()
            .unwrap();
        let err = YearContext::resolve(&table).unwrap_err();
        assert_eq!(err.kind(), FailureKind::UndeterminedOutcome);
    }

    #[test]
    fn classic_year_with_a_third_party() {
        init();
        let summary =
            solve_year(&three_party(1912), FlipMode::Classic, &MetricsConfig::DEFAULT).unwrap();
        assert_eq!(summary.required_electoral_votes, 8);
        assert_eq!(
            summary.solution.flipped_states,
            vec!["E".to_string(), "C".to_string()]
        );
        assert_eq!(summary.solution.min_votes_to_flip, 207);
        assert_eq!(summary.solution.achieved_electoral_votes, 9);
        assert_eq!(summary.number_of_flipped_states(), 2);
        assert_eq!(summary.winner_name, None);
        assert_eq!(summary.runner_up_name.as_deref(), Some("Donkey"));

        let details: Vec<(&str, u64)> = summary
            .flipped
            .iter()
            .map(|fs| (fs.state.as_str(), fs.votes_to_flip))
            .collect();
        assert_eq!(details, vec![("C", 6), ("E", 201)]);
        assert!((summary.flipped[1].percent_flipped - 25.125).abs() < 1e-9);

        assert_eq!(summary.electoral_votes_after_flip("D"), 14);
        assert_eq!(summary.electoral_votes_after_flip("R"), 10);
        assert_eq!(summary.electoral_votes_after_flip("T"), 0);

        assert_eq!(summary.winner_popular_votes, 2100);
        assert_eq!(summary.runner_up_popular_votes, 1790);
        assert_eq!(summary.popular_vote_margin, 310);
        assert_eq!(summary.total_votes, 4390);
        assert!((summary.flip_margin_ratio - 100.0 * 207.0 / 4390.0).abs() < 1e-9);
        assert_eq!(summary.metrics.f, 207);
    }

    #[test]
    fn no_majority_only_flips_winner_states() {
        let summary = solve_year(
            &three_party(1912),
            FlipMode::NoMajority,
            &MetricsConfig::DEFAULT,
        )
        .unwrap();
        // 16 - 13 + 1
        assert_eq!(summary.required_electoral_votes, 4);
        assert_eq!(summary.solution.flipped_states, vec!["C".to_string()]);
        assert_eq!(summary.solution.min_votes_to_flip, 6);
        assert!(summary.solution.candidates.get("E").is_none());
        assert_eq!(summary.electoral_votes_after_flip("R"), 10);
    }

    #[test]
    fn runner_up_already_winning_is_a_zero_target() {
        init();
        // The declared runner-up already holds 11 of the 21 electoral votes.
        let table = YearBuilder::new(2000)
            .state("A", 10, "R", &[("D", 400), ("R", 1000)])
            .state("B", 11, "D", &[("D", 700), ("R", 300)])
            .declare_winner("R")
            .declare_runner_up("D")
            .build()
            .unwrap();
        let summary = solve_year(&table, FlipMode::Classic, &MetricsConfig::DEFAULT).unwrap();
        assert_eq!(summary.required_electoral_votes, 0);
        assert!(summary.solution.is_empty());
        assert_eq!(summary.solution.min_votes_to_flip, 0);
        assert_eq!(summary.solution.achieved_electoral_votes, 0);
        assert!(summary.flipped.is_empty());
        assert_eq!(summary.metrics.margin_sensitivity_sigma, 0.0);
        assert_eq!(summary.metrics.state_concentration_r, 0.0);
    }

    #[test]
    fn malformed_rows_fail_the_year() {
        let err = solve_year(&malformed(2004), FlipMode::Classic, &MetricsConfig::DEFAULT)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedRow);
    }

    #[test]
    fn batch_keeps_going_and_sorts_years() {
        init();
        let tables = vec![malformed(2004), three_party(1912), year_2000(), one_party(1820)];
        let res = run_batch(&tables, &BatchOptions::default());
        assert!(!res.cancelled);
        let years: Vec<u32> = res.summaries.iter().map(|s| s.year).collect();
        assert_eq!(years, vec![1912, 2000]);
        let failed: Vec<(u32, FailureKind)> = res.failures.iter().map(|f| (f.year, f.kind)).collect();
        assert_eq!(
            failed,
            vec![
                (1820, FailureKind::UndeterminedOutcome),
                (2004, FailureKind::MalformedRow)
            ]
        );
        assert!(res.has_unrecoverable());
    }

    #[test]
    fn parallel_batch_matches_sequential() {
        let tables: Vec<YearTable> = (0..20)
            .map(|i| match i % 3 {
                0 => three_party(1900 + 4 * i),
                1 => malformed(1900 + 4 * i),
                _ => {
                    let mut t = year_2000();
                    t.year = 1900 + 4 * i;
                    t
                }
            })
            .collect();
        let sequential = run_batch(&tables, &BatchOptions::default());
        let parallel = run_batch(
            &tables,
            &BatchOptions {
                parallel: true,
                ..BatchOptions::default()
            },
        );
        assert_eq!(sequential, parallel);
        assert!(!sequential.has_unrecoverable());
    }

    #[test]
    fn cancelled_batch() {
        let cancel = Arc::new(AtomicBool::new(true));
        let options = BatchOptions {
            cancel: Some(cancel),
            ..BatchOptions::default()
        };
        let res = run_batch(&[year_2000(), three_party(1912)], &options);
        assert!(res.cancelled);
        assert!(res.summaries.is_empty());
        assert!(res.failures.is_empty());
    }

    #[test]
    fn fail_fast_stops_after_the_first_failure() {
        let options = BatchOptions {
            fail_fast: true,
            ..BatchOptions::default()
        };
        let res = run_batch(&[year_2000(), malformed(1996)], &options);
        assert!(res.cancelled);
        assert_eq!(res.failures.len(), 1);
        assert!(res.summaries.is_empty());
    }
}

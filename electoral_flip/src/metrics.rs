use log::debug;
use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::config::*;

// Head-to-head numbers of one state between the winner and the runner-up.
struct TwoParty {
    electoral_votes: u32,
    winner_votes: u64,
    loser_votes: u64,
}

impl TwoParty {
    fn of(row: &StateRow, winner: &str, loser: &str) -> TwoParty {
        TwoParty {
            electoral_votes: row.electoral_votes,
            winner_votes: row.votes_for(winner).unwrap_or(0),
            loser_votes: row.votes_for(loser).unwrap_or(0),
        }
    }

    fn total(&self) -> u64 {
        self.winner_votes + self.loser_votes
    }

    fn margin(&self) -> u64 {
        self.winner_votes.abs_diff(self.loser_votes)
    }

    /// Votes to move under a symmetric shift. Zero for an exact tie.
    fn votes_to_flip(&self) -> u64 {
        match self.margin() {
            0 => 0,
            m => m / 2 + 1,
        }
    }

    /// None when neither party received a vote.
    fn margin_share(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            t => Some(self.margin() as f64 / t as f64),
        }
    }
}

fn ratio(num: f64, denom: f64) -> f64 {
    if denom > 0.0 {
        num / denom
    } else {
        f64::NAN
    }
}

/// R = f² / Σ f_i² over the flipped states. Lower means more concentrated.
fn state_concentration(solution: &FlipSolution) -> f64 {
    let f = solution.min_votes_to_flip as f64;
    if f <= 0.0 || solution.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = solution
        .flipped_states
        .iter()
        .filter_map(|s| solution.candidates.get(s))
        .map(|c| (c.votes_to_flip as f64).powi(2))
        .sum();
    if sum_sq == 0.0 {
        0.0
    } else {
        f * f / sum_sq
    }
}

/// The smallest uniform two-party swing that moves enough electoral votes.
fn uniform_swing(table: &YearTable, winner: &str, loser: &str, required: i64) -> f64 {
    if required <= 0 {
        return 0.0;
    }
    let mut thresholds: Vec<(f64, u32)> = table
        .rows
        .iter()
        .filter(|r| r.party_win.trim() != loser)
        .map(|r| TwoParty::of(r, winner, loser))
        .filter(|tp| tp.total() > 0)
        .map(|tp| {
            (
                tp.votes_to_flip() as f64 / tp.total() as f64,
                tp.electoral_votes,
            )
        })
        .collect();
    thresholds.sort_by(|(a, _), (b, _)| a.total_cmp(b));

    let mut accumulated: i64 = 0;
    for (threshold, ev) in thresholds {
        accumulated += ev as i64;
        if accumulated >= required {
            return threshold;
        }
    }
    f64::NAN
}

/// Transform of the efficiency gap into (-1, 1).
fn efficiency_gap(pv_share: f64, ec_share: f64) -> f64 {
    if pv_share == 0.5 {
        return f64::INFINITY;
    }
    let x = (ec_share - 0.5) / (pv_share - 0.5) - 1.0;
    (x / 5.0).atan() / (PI / 2.0)
}

/// Derived closeness metrics of one year.
///
/// Arguments:
/// * `table` the rows of the year
/// * `context` the resolved winner, runner-up and electoral totals
/// * `solution` the flip computed for the year
/// * `required` the electoral-vote target that was given to the solver
/// * `config` the thresholds
///
/// Quantities that are not defined for the year (for example when no vote was cast for
/// either party) are NaN.
pub fn compute_year_metrics(
    table: &YearTable,
    context: &YearContext,
    solution: &FlipSolution,
    required: i64,
    config: &MetricsConfig,
) -> YearMetrics {
    let winner = context.winner.as_str();
    let loser = context.runner_up.as_str();

    let winner_total = table.popular_votes(winner);
    let loser_total = table.popular_votes(loser);
    let s_two_party = winner_total + loser_total;
    let s = s_two_party as f64;
    let m = ratio(winner_total.abs_diff(loser_total) as f64, s);

    let total_ec = context.total_electoral_votes;
    let winner_ec = context.electoral_votes_of(winner);
    let loser_ec = context.electoral_votes_of(loser);

    let f = solution.min_votes_to_flip;
    let ff = f as f64;
    let pv_share = ratio(winner_total as f64, s);
    let ec_share = ratio(winner_ec as f64, total_ec as f64);
    let f_over_s = ratio(ff, s);

    let defined = !m.is_nan() && !f_over_s.is_nan();
    let (c1, c2, c4) = if defined {
        (
            (m * m + f_over_s * f_over_s).sqrt(),
            m.max(f_over_s),
            m.powf(config.alpha) * f_over_s.powf(1.0 - config.alpha),
        )
    } else {
        (f64::NAN, f64::NAN, f64::NAN)
    };
    let c3 = if s > 0.0 && s + m * ff > 0.0 {
        2.0 * m * ff / (s + m * ff)
    } else {
        f64::NAN
    };
    let c5 = if s > 0.0 && m > 0.0 {
        ff / (m * s)
    } else if s > 0.0 && m == 0.0 {
        f64::INFINITY
    } else {
        f64::NAN
    };

    let sigma = uniform_swing(table, winner, loser, required);
    let eta = efficiency_gap(pv_share, ec_share);

    let mut close_ev: u64 = 0;
    let mut brittle: u32 = 0;
    for row in table.rows.iter() {
        let tp = TwoParty::of(row, winner, loser);
        if let Some(share) = tp.margin_share() {
            if share < config.recount_threshold {
                close_ev += row.electoral_votes as u64;
            }
            if row.party_win.trim() == winner && share < config.brittleness_threshold {
                brittle += 1;
            }
        }
    }
    let recount = ratio(close_ev as f64, total_ec as f64);

    let distortion = if m == 0.0 || !defined {
        f64::NAN
    } else {
        (f_over_s - m).abs() / m
    };

    let res = YearMetrics {
        year: table.year,
        winner_party: winner.to_string(),
        loser_party: loser.to_string(),
        winner_total,
        loser_total,
        s_two_party,
        winner_ec,
        loser_ec,
        total_ec,
        pv_share,
        ec_share,
        m,
        f,
        f_over_s,
        alpha: config.alpha,
        c1_euclidean: c1,
        c2_max: c2,
        c3_harmonic_like: c3,
        c4_weighted_geom: c4,
        c5_efficiency_ratio: c5,
        popular_vote_safety: m,
        electoral_college_safety: f_over_s,
        state_concentration_r: state_concentration(solution),
        margin_sensitivity_sigma: sigma,
        vote_efficiency_gap_eta: eta,
        recount_vulnerability_v: recount,
        coalition_brittleness_count: brittle,
        institutional_distortion_d: distortion,
    };
    debug!("compute_year_metrics: {:?}", res);
    res
}

/// How many times each state appears in a flipped set, most frequent first.
///
/// States with the same count are in alphabetical order.
pub fn flip_frequency(summaries: &[YearSummary]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for summary in summaries.iter() {
        for state in summary.solution.flipped_states.iter() {
            *counts.entry(state.as_str()).or_insert(0) += 1;
        }
    }
    let mut res: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(s, c)| (s.to_string(), c))
        .collect();
    // Stable: ties stay in state order.
    res.sort_by(|(_, a), (_, b)| b.cmp(a));
    res
}

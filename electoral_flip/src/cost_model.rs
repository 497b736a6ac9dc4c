use log::{debug, warn};
use snafu::prelude::*;

use crate::config::*;

/// Minimum number of votes that must move from the state winner to the loser so that
/// the loser carries the state.
///
/// A tie costs a single vote. If the loser is already ahead (inconsistent data),
/// the cost is still one vote.
pub fn votes_to_flip(winner_votes: u64, loser_votes: u64) -> u64 {
    if winner_votes < loser_votes {
        return 1;
    }
    (winner_votes - loser_votes) / 2 + 1
}

/// Computes the flip cost of every state that the loser did not carry.
///
/// The cost is always measured head-to-head against the loser's vote count in that
/// state, even when the loser placed third locally.
pub fn flip_candidates(rows: &[StateRow], loser: &str) -> Result<CandidateSet, FlipError> {
    let mut res = CandidateSet::new();
    for row in rows.iter() {
        let party_win = row.party_win.trim();
        ensure!(
            !party_win.is_empty(),
            MissingPartyWinSnafu {
                state: row.state.clone()
            }
        );
        if party_win == loser {
            continue;
        }
        let winner_votes = row.votes_for(party_win).context(MalformedRowSnafu {
            state: row.state.clone(),
            reason: format!("no vote count for the state winner {:?}", party_win),
        })?;
        ensure!(
            winner_votes > 0,
            MalformedRowSnafu {
                state: row.state.clone(),
                reason: format!("the state winner {:?} has no votes", party_win),
            }
        );
        let loser_votes = row.votes_for(loser).context(MalformedRowSnafu {
            state: row.state.clone(),
            reason: format!("no vote count for {:?}", loser),
        })?;
        if winner_votes < loser_votes {
            warn!(
                "flip_candidates: {}: {} carried the state with {} votes but {} has {} votes",
                row.state, party_win, winner_votes, loser, loser_votes
            );
        }
        let candidate = FlipCandidate {
            electoral_votes: row.electoral_votes,
            votes_to_flip: votes_to_flip(winner_votes, loser_votes),
            total_votes: row.total_votes,
        };
        debug!("flip_candidates: {}: {:?}", row.state, candidate);
        res.insert(row.state.clone(), candidate);
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(state: &str, ev: u32, party_win: &str, votes: &[(&str, u64)]) -> StateRow {
        let candidate_votes: BTreeMap<String, u64> =
            votes.iter().map(|(p, v)| (p.to_string(), *v)).collect();
        StateRow {
            state: state.to_string(),
            electoral_votes: ev,
            party_win: party_win.to_string(),
            total_votes: candidate_votes.values().sum(),
            candidate_votes,
        }
    }

    #[test]
    fn majority_crossing_cost() {
        assert_eq!(votes_to_flip(1000, 400), 301);
        assert_eq!(votes_to_flip(1001, 400), 301);
        assert_eq!(votes_to_flip(1002, 400), 302);
    }

    #[test]
    fn tie_costs_one_vote() {
        assert_eq!(votes_to_flip(500, 500), 1);
    }

    #[test]
    fn loser_states_are_excluded() {
        let rows = vec![
            row("A", 10, "R", &[("D", 400), ("R", 1000)]),
            row("B", 5, "D", &[("D", 700), ("R", 300)]),
        ];
        let cands = flip_candidates(&rows, "D").unwrap();
        assert_eq!(cands.len(), 1);
        let a = cands.get("A").unwrap();
        assert_eq!(a.electoral_votes, 10);
        assert_eq!(a.votes_to_flip, 301);
        assert_eq!(a.total_votes, 1400);
        assert!(cands.get("B").is_none());
    }

    #[test]
    fn third_party_states_use_the_loser_count() {
        // T carried the state, D came third locally: the cost is measured against D.
        let rows = vec![row(
            "GA",
            14,
            "T",
            &[("D", 100), ("R", 900), ("T", 1000)],
        )];
        let cands = flip_candidates(&rows, "D").unwrap();
        assert_eq!(cands.get("GA").unwrap().votes_to_flip, 451);
    }

    #[test]
    fn districts_are_independent_rows() {
        let rows = vec![
            row("ME", 2, "D", &[("D", 600), ("R", 400)]),
            row("ME-02", 1, "R", &[("D", 180), ("R", 220)]),
        ];
        let cands = flip_candidates(&rows, "D").unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands.get("ME-02").unwrap().votes_to_flip, 21);
    }

    #[test]
    fn missing_party_win() {
        let rows = vec![row("A", 10, " ", &[("D", 400), ("R", 1000)])];
        let err = flip_candidates(&rows, "D").unwrap_err();
        assert_eq!(err.kind(), FailureKind::MissingPartyWin);
    }

    #[test]
    fn missing_loser_votes_is_malformed() {
        let rows = vec![row("A", 10, "R", &[("R", 1000)])];
        let err = flip_candidates(&rows, "D").unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedRow);
    }

    #[test]
    fn inconsistent_winner_still_costs_one_vote() {
        let rows = vec![row("AL", 11, "T", &[("D", 500), ("T", 300)])];
        let cands = flip_candidates(&rows, "D").unwrap();
        assert_eq!(cands.get("AL").unwrap().votes_to_flip, 1);
    }

    #[test]
    fn candidates_keep_table_order() {
        let rows = vec![
            row("C", 3, "R", &[("D", 1), ("R", 2)]),
            row("A", 3, "R", &[("D", 1), ("R", 2)]),
            row("B", 3, "R", &[("D", 1), ("R", 2)]),
        ];
        let cands = flip_candidates(&rows, "D").unwrap();
        let order: Vec<&str> = cands.iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }
}

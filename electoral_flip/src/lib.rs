/*!
Computes the smallest number of popular votes that would have changed the outcome of
an election decided by an electoral college.

The library works one election year at a time:
- the cost model ([flip_candidates]) prices every state the runner-up did not carry,
- the solver ([solve_flip]) picks the cheapest set of states reaching a target of
  electoral votes (a 0/1 knapsack),
- the batch functions ([solve_year], [run_batch]) apply both to every year of a table
  and derive closeness metrics from the result.

See the [manual] for the expected shape of the input table.
*/

mod batch;
pub mod builder;
mod config;
mod cost_model;
pub mod manual;
mod metrics;

use log::{debug, info, warn};
use snafu::prelude::*;
use std::{
    cmp::Ordering,
    collections::HashSet,
    ops::{Add, AddAssign},
};

pub use crate::batch::*;
pub use crate::config::*;
pub use crate::cost_model::*;
pub use crate::metrics::*;

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u64);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(VoteCount::EMPTY, |acc, vc| acc + vc)
    }
}

// Sums saturate at u64::MAX, which is never below the unreachable sentinel.
impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Add for VoteCount {
    type Output = VoteCount;
    fn add(self: VoteCount, rhs: VoteCount) -> VoteCount {
        VoteCount(self.0.saturating_add(rhs.0))
    }
}

// Position of an item in the efficiency-sorted list.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
struct ItemId(usize);

#[derive(Eq, PartialEq, Debug, Clone)]
struct Item {
    state: String,
    weight: usize,
    cost: VoteCount,
}

struct KnapsackTable {
    // Minimum cost to flip exactly v electoral votes, or `unreachable`.
    dp: Vec<VoteCount>,
    // Larger than any achievable cost.
    unreachable: VoteCount,
    // The last item that improved dp[v].
    chosen: Vec<Option<ItemId>>,
    // improved[i][v]: processing item i lowered dp[v].
    improved: Vec<Vec<bool>>,
}

impl KnapsackTable {
    fn fill(items: &[Item]) -> KnapsackTable {
        let max_weight: usize = items.iter().map(|it| it.weight).sum();
        let unreachable = items.iter().map(|it| it.cost).sum::<VoteCount>() + VoteCount(1);
        let mut dp = vec![unreachable; max_weight + 1];
        dp[0] = VoteCount::EMPTY;
        let mut chosen: Vec<Option<ItemId>> = vec![None; max_weight + 1];
        let mut improved: Vec<Vec<bool>> = Vec::with_capacity(items.len());

        for (idx, item) in items.iter().enumerate() {
            let mut row = vec![false; max_weight + 1];
            // Descending capacities: an item is used at most once.
            for v in (item.weight..=max_weight).rev() {
                let prev = dp[v - item.weight];
                if prev == unreachable {
                    continue;
                }
                let candidate = prev + item.cost;
                if candidate < dp[v] {
                    dp[v] = candidate;
                    chosen[v] = Some(ItemId(idx));
                    row[v] = true;
                }
            }
            improved.push(row);
        }
        KnapsackTable {
            dp,
            unreachable,
            chosen,
            improved,
        }
    }

    /// The smallest capacity >= target with the lowest cost.
    fn best_capacity(&self, target: usize) -> Option<usize> {
        let mut best: Option<usize> = None;
        for v in target..self.dp.len() {
            if self.dp[v] == self.unreachable {
                continue;
            }
            match best {
                Some(b) if self.dp[b] <= self.dp[v] => {}
                _ => best = Some(v),
            }
        }
        best
    }

    fn walk_chosen(&self, items: &[Item], best_v: usize) -> Vec<ItemId> {
        let mut res: Vec<ItemId> = Vec::new();
        let mut capacity = best_v;
        while capacity > 0 {
            match self.chosen[capacity] {
                Some(id) => {
                    res.push(id);
                    capacity -= items[id.0].weight;
                }
                None => {
                    warn!(
                        "walk_chosen: no item recorded for capacity {} (target {})",
                        capacity, best_v
                    );
                    break;
                }
            }
        }
        res
    }

    // Exact reconstruction, undoing the items in reverse processing order.
    fn walk_exact(&self, items: &[Item], best_v: usize) -> Vec<ItemId> {
        let mut res: Vec<ItemId> = Vec::new();
        let mut capacity = best_v;
        for idx in (0..items.len()).rev() {
            if capacity == 0 {
                break;
            }
            if self.improved[idx][capacity] {
                res.push(ItemId(idx));
                capacity -= items[idx].weight;
            }
        }
        res
    }

    fn is_consistent(&self, items: &[Item], picked: &[ItemId], best_v: usize) -> bool {
        let distinct: HashSet<ItemId> = picked.iter().cloned().collect();
        let weight: usize = picked.iter().map(|id| items[id.0].weight).sum();
        let cost: VoteCount = picked.iter().map(|id| items[id.0].cost).sum();
        distinct.len() == picked.len() && weight == best_v && cost == self.dp[best_v]
    }

    fn reconstruct(&self, items: &[Item], best_v: usize) -> Vec<ItemId> {
        let picked = self.walk_chosen(items, best_v);
        if self.is_consistent(items, &picked, best_v) {
            return picked;
        }
        warn!(
            "reconstruct: the last-improver chain for {} electoral votes is inconsistent, using the exact table",
            best_v
        );
        let exact = self.walk_exact(items, best_v);
        debug_assert!(self.is_consistent(items, &exact, best_v));
        exact
    }
}

fn efficiency_order(a: &FlipCandidate, b: &FlipCandidate) -> Ordering {
    match (a.electoral_votes, b.electoral_votes) {
        (0, 0) => Ordering::Equal,
        // A state without electoral votes is never worth flipping.
        (0, _) => Ordering::Greater,
        (_, 0) => Ordering::Less,
        (wa, wb) => {
            let lhs = a.votes_to_flip as u128 * wb as u128;
            let rhs = b.votes_to_flip as u128 * wa as u128;
            lhs.cmp(&rhs)
        }
    }
}

/// Returns the candidates sorted by increasing cost per electoral vote.
///
/// The sort is stable: candidates with the same ratio keep their table order.
pub fn sorted_by_efficiency(candidates: &CandidateSet) -> Vec<(String, FlipCandidate)> {
    let mut res: Vec<(String, FlipCandidate)> = candidates
        .iter()
        .map(|(state, c)| (state.to_string(), *c))
        .collect();
    res.sort_by(|(_, a), (_, b)| efficiency_order(a, b));
    res
}

fn knapsack_items(candidates: &CandidateSet) -> Vec<Item> {
    sorted_by_efficiency(candidates)
        .into_iter()
        .map(|(state, c)| Item {
            state,
            weight: c.electoral_votes as usize,
            cost: VoteCount(c.votes_to_flip),
        })
        .collect()
}

/// Finds the cheapest set of states whose electoral votes reach the target.
///
/// Arguments:
/// * `candidates` the states that may be flipped, with their cost
/// * `required_electoral_votes` the minimum number of electoral votes to move
///
/// Among all the capacities at or above the target, the cheapest one is picked; when
/// several capacities share the minimum cost, the smallest capacity wins.
///
/// A target of zero or less returns the empty solution.
pub fn solve_flip(
    candidates: &CandidateSet,
    required_electoral_votes: i64,
) -> Result<FlipSolution, FlipError> {
    if required_electoral_votes <= 0 {
        debug!(
            "solve_flip: target {} needs no flip",
            required_electoral_votes
        );
        return Ok(FlipSolution::empty(candidates.clone()));
    }
    ensure!(
        !candidates.is_empty(),
        DegenerateInputSnafu {
            required: required_electoral_votes
        }
    );
    let available = candidates.total_electoral_votes();
    ensure!(
        required_electoral_votes as u64 <= available,
        UnreachableTargetSnafu {
            required: required_electoral_votes,
            available
        }
    );

    let items = knapsack_items(candidates);
    debug!(
        "solve_flip: {} items, {} electoral votes available, target {}",
        items.len(),
        available,
        required_electoral_votes
    );

    let table = KnapsackTable::fill(&items);
    let best_v = table
        .best_capacity(required_electoral_votes as usize)
        .context(UnreachableTargetSnafu {
            required: required_electoral_votes,
            available,
        })?;
    debug!(
        "solve_flip: best capacity {} with cost {:?}",
        best_v, table.dp[best_v]
    );

    let picked = table.reconstruct(&items, best_v);
    let min_votes_to_flip: VoteCount = picked.iter().map(|id| items[id.0].cost).sum();
    let flipped_states: Vec<String> = picked.iter().map(|id| items[id.0].state.clone()).collect();
    info!(
        "solve_flip: {} votes flip {} electoral votes in {:?}",
        min_votes_to_flip.0, best_v, flipped_states
    );

    Ok(FlipSolution {
        flipped_states,
        min_votes_to_flip: min_votes_to_flip.0,
        achieved_electoral_votes: best_v as u32,
        candidates: candidates.clone(),
    })
}

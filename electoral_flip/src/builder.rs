pub use crate::config::*;

use std::collections::{BTreeMap, HashSet};

/// A builder for assembling the table of one election year.
///
/// ```
/// use electoral_flip::builder::YearBuilder;
/// use electoral_flip::{solve_year, FlipError, FlipMode, MetricsConfig};
///
/// let table = YearBuilder::new(2000)
///     .state("A", 10, "R", &[("D", 400), ("R", 1000)])
///     .state("B", 5, "D", &[("D", 700), ("R", 300)])
///     .state("C", 6, "R", &[("D", 450), ("R", 500)])
///     .build()?;
///
/// let summary = solve_year(&table, FlipMode::Classic, &MetricsConfig::DEFAULT)?;
/// // R carries 16 of the 21 electoral votes: D needs 6 more to reach 11.
/// assert_eq!(summary.required_electoral_votes, 6);
/// assert_eq!(summary.solution.flipped_states, vec!["C".to_string()]);
/// assert_eq!(summary.solution.min_votes_to_flip, 26);
/// # Ok::<(), FlipError>(())
/// ```
#[derive(Debug, Clone)]
pub struct YearBuilder {
    pub(crate) _year: u32,
    pub(crate) _rows: Vec<StateRow>,
    pub(crate) _declared: DeclaredTotals,
}

impl YearBuilder {
    pub fn new(year: u32) -> YearBuilder {
        YearBuilder {
            _year: year,
            _rows: Vec::new(),
            _declared: DeclaredTotals::default(),
        }
    }

    /// Adds a state. The total number of votes is the sum of the listed votes.
    pub fn state(
        &mut self,
        state: &str,
        electoral_votes: u32,
        party_win: &str,
        votes: &[(&str, u64)],
    ) -> &mut YearBuilder {
        let total_votes = votes.iter().map(|(_, v)| *v).sum();
        self.state_with_total(state, electoral_votes, party_win, votes, total_votes)
    }

    /// Adds a state whose total number of votes includes other candidates.
    pub fn state_with_total(
        &mut self,
        state: &str,
        electoral_votes: u32,
        party_win: &str,
        votes: &[(&str, u64)],
        total_votes: u64,
    ) -> &mut YearBuilder {
        let candidate_votes: BTreeMap<String, u64> =
            votes.iter().map(|(p, v)| (p.to_string(), *v)).collect();
        self.row(StateRow {
            state: state.to_string(),
            electoral_votes,
            party_win: party_win.to_string(),
            candidate_votes,
            total_votes,
        })
    }

    pub fn row(&mut self, row: StateRow) -> &mut YearBuilder {
        self._rows.push(row);
        self
    }

    pub fn declare_total_electoral_votes(&mut self, total: u32) -> &mut YearBuilder {
        self._declared.total_electoral_votes = Some(total);
        self
    }

    pub fn declare_electoral_votes_to_win(&mut self, to_win: u32) -> &mut YearBuilder {
        self._declared.electoral_votes_to_win = Some(to_win);
        self
    }

    pub fn declare_winner(&mut self, party: &str) -> &mut YearBuilder {
        self._declared.overall_winner = Some(party.to_string());
        self
    }

    pub fn declare_runner_up(&mut self, party: &str) -> &mut YearBuilder {
        self._declared.overall_runner_up = Some(party.to_string());
        self
    }

    /// Declares the national electoral-vote total of a party.
    pub fn declare_party_electoral(&mut self, party: &str, electoral_votes: u32) -> &mut YearBuilder {
        self._declared
            .electoral
            .insert(party.to_string(), electoral_votes);
        self
    }

    pub fn candidate_name(&mut self, party: &str, name: &str) -> &mut YearBuilder {
        self._declared
            .names
            .insert(party.to_string(), name.to_string());
        self
    }

    /// Returns the table. Every state identifier must be unique.
    pub fn build(&self) -> Result<YearTable, FlipError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for row in self._rows.iter() {
            if !seen.insert(row.state.as_str()) {
                return Err(FlipError::MalformedRow {
                    state: row.state.clone(),
                    reason: format!("duplicate state in year {}", self._year),
                });
            }
        }
        Ok(YearTable {
            year: self._year,
            rows: self._rows.clone(),
            declared: self._declared.clone(),
        })
    }
}

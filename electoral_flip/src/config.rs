// ********* Input data structures ***********

use serde::Serialize;
use snafu::Snafu;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// One state's result in one election year.
///
/// Congressional districts that allocate their own electoral votes
/// (`ME-02`, `NE-02`, ...) are independent rows.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct StateRow {
    pub state: String,
    pub electoral_votes: u32,
    /// The party code that carried the state ('D', 'R', or a third-party code such as 'T').
    pub party_win: String,
    /// Popular vote count per party code.
    pub candidate_votes: BTreeMap<String, u64>,
    pub total_votes: u64,
}

impl StateRow {
    pub fn votes_for(&self, party: &str) -> Option<u64> {
        self.candidate_votes.get(party).copied()
    }
}

/// Year-level scalars as declared by the upstream table.
///
/// Every field is optional. Missing values are derived from the rows.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct DeclaredTotals {
    pub total_electoral_votes: Option<u32>,
    pub electoral_votes_to_win: Option<u32>,
    pub overall_winner: Option<String>,
    pub overall_runner_up: Option<String>,
    /// National electoral-vote total per party code.
    pub electoral: BTreeMap<String, u32>,
    /// Candidate name per party code.
    pub names: BTreeMap<String, String>,
}

/// All the rows of one election year.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct YearTable {
    pub year: u32,
    pub rows: Vec<StateRow>,
    pub declared: DeclaredTotals,
}

impl YearTable {
    /// National popular vote of a party.
    pub fn popular_votes(&self, party: &str) -> u64 {
        self.rows.iter().filter_map(|r| r.votes_for(party)).sum()
    }

    pub fn total_votes(&self) -> u64 {
        self.rows.iter().map(|r| r.total_votes).sum()
    }

    pub fn candidate_name(&self, party: &str) -> Option<&str> {
        self.declared.names.get(party).map(|s| s.as_str())
    }

    /// All the party codes that appear in the table, in code order.
    pub fn parties(&self) -> Vec<String> {
        let mut parties: Vec<String> = self
            .rows
            .iter()
            .flat_map(|r| r.candidate_votes.keys().cloned())
            .chain(self.declared.electoral.keys().cloned())
            .collect();
        parties.sort();
        parties.dedup();
        parties
    }
}

/// Scalar facts about one election year, read-only for the duration of a solve.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct YearContext {
    pub year: u32,
    pub total_electoral_votes: u32,
    pub electoral_votes_to_win: u32,
    pub winner: String,
    pub runner_up: String,
    /// National electoral-vote total per party code.
    pub electoral_totals: BTreeMap<String, u32>,
}

impl YearContext {
    pub fn electoral_votes_of(&self, party: &str) -> u32 {
        self.electoral_totals.get(party).copied().unwrap_or(0)
    }
}

/// The cost of moving one state to the runner-up.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub struct FlipCandidate {
    pub electoral_votes: u32,
    /// Popular votes that must move from the state winner to the runner-up.
    /// Always at least 1.
    pub votes_to_flip: u64,
    pub total_votes: u64,
}

/// The states eligible for flipping, keyed by state identifier.
///
/// The entries keep the order in which they were inserted (the order of the input table),
/// which is what makes the tie-breaks of the solver reproducible.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct CandidateSet {
    entries: Vec<(String, FlipCandidate)>,
}

impl CandidateSet {
    pub fn new() -> CandidateSet {
        CandidateSet {
            entries: Vec::new(),
        }
    }

    /// Inserts a candidate. An existing entry for the same state is replaced in place
    /// and returned.
    pub fn insert(&mut self, state: String, candidate: FlipCandidate) -> Option<FlipCandidate> {
        if let Some((_, c)) = self.entries.iter_mut().find(|(s, _)| *s == state) {
            return Some(std::mem::replace(c, candidate));
        }
        self.entries.push((state, candidate));
        None
    }

    pub fn get(&self, state: &str) -> Option<&FlipCandidate> {
        self.entries
            .iter()
            .find(|(s, _)| s == state)
            .map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlipCandidate)> {
        self.entries.iter().map(|(s, c)| (s.as_str(), c))
    }

    pub fn retain<F: FnMut(&str, &FlipCandidate) -> bool>(&mut self, mut f: F) {
        self.entries.retain(|(s, c)| f(s, c));
    }

    /// The sum of the electoral votes of all the candidates.
    pub fn total_electoral_votes(&self) -> u64 {
        self.entries
            .iter()
            .map(|(_, c)| c.electoral_votes as u64)
            .sum()
    }
}

impl FromIterator<(String, FlipCandidate)> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = (String, FlipCandidate)>>(iter: I) -> Self {
        let mut res = CandidateSet::new();
        for (state, candidate) in iter {
            res.insert(state, candidate);
        }
        res
    }
}

// ******** Output data structures *********

/// The result of one solve.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct FlipSolution {
    /// In the order of reconstruction (decreasing remaining capacity).
    pub flipped_states: Vec<String>,
    pub min_votes_to_flip: u64,
    pub achieved_electoral_votes: u32,
    /// The candidates the solution was picked from.
    #[serde(skip_serializing)]
    pub candidates: CandidateSet,
}

impl FlipSolution {
    pub fn empty(candidates: CandidateSet) -> FlipSolution {
        FlipSolution {
            flipped_states: Vec::new(),
            min_votes_to_flip: 0,
            achieved_electoral_votes: 0,
            candidates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flipped_states.is_empty()
    }
}

/// Per-state detail of a flipped state, for reporting.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct FlippedState {
    pub state: String,
    pub party_win: String,
    pub electoral_votes: u32,
    pub votes_to_flip: u64,
    /// Share of the state's total votes that must move, in percent.
    pub percent_flipped: f64,
}

/// Derived closeness metrics for one year.
///
/// The column names follow the historical metrics tables.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct YearMetrics {
    pub year: u32,
    pub winner_party: String,
    pub loser_party: String,
    pub winner_total: u64,
    pub loser_total: u64,
    #[serde(rename = "S_two_party")]
    pub s_two_party: u64,
    #[serde(rename = "winner_EC")]
    pub winner_ec: u32,
    #[serde(rename = "loser_EC")]
    pub loser_ec: u32,
    #[serde(rename = "total_EC")]
    pub total_ec: u32,
    #[serde(rename = "PV_share")]
    pub pv_share: f64,
    #[serde(rename = "EC_share")]
    pub ec_share: f64,
    pub m: f64,
    pub f: u64,
    #[serde(rename = "f_over_S")]
    pub f_over_s: f64,
    pub alpha: f64,
    #[serde(rename = "C1_euclidean")]
    pub c1_euclidean: f64,
    #[serde(rename = "C2_max")]
    pub c2_max: f64,
    #[serde(rename = "C3_harmonic_like")]
    pub c3_harmonic_like: f64,
    #[serde(rename = "C4_weighted_geom")]
    pub c4_weighted_geom: f64,
    #[serde(rename = "C5_efficiency_ratio")]
    pub c5_efficiency_ratio: f64,
    pub popular_vote_safety: f64,
    pub electoral_college_safety: f64,
    #[serde(rename = "state_concentration_R")]
    pub state_concentration_r: f64,
    pub margin_sensitivity_sigma: f64,
    pub vote_efficiency_gap_eta: f64,
    #[serde(rename = "recount_vulnerability_V")]
    pub recount_vulnerability_v: f64,
    pub coalition_brittleness_count: u32,
    #[serde(rename = "institutional_distortion_D")]
    pub institutional_distortion_d: f64,
}

/// Everything computed for one year.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct YearSummary {
    pub year: u32,
    pub mode: FlipMode,
    pub winner: String,
    pub winner_name: Option<String>,
    pub runner_up: String,
    pub runner_up_name: Option<String>,
    pub winner_electoral_votes: u32,
    pub runner_up_electoral_votes: u32,
    /// National electoral-vote total per party code, before the flip.
    pub electoral_totals: BTreeMap<String, u32>,
    pub total_electoral_votes: u32,
    pub electoral_votes_to_win: u32,
    /// May be zero or negative when the table already shows the target outcome.
    pub required_electoral_votes: i64,
    pub solution: FlipSolution,
    /// The flipped states, by increasing number of votes to flip.
    pub flipped: Vec<FlippedState>,
    pub winner_popular_votes: u64,
    pub runner_up_popular_votes: u64,
    /// Winner minus runner-up. Negative when the winner lost the popular vote.
    pub popular_vote_margin: i64,
    pub total_votes: u64,
    /// 100 * min_votes_to_flip / total_votes
    pub flip_margin_ratio: f64,
    /// 100 * popular_vote_margin / total_votes
    pub popular_margin_ratio: f64,
    pub metrics: YearMetrics,
}

impl YearSummary {
    /// The electoral votes of a party once the flipped states have moved to the runner-up.
    pub fn electoral_votes_after_flip(&self, party: &str) -> u32 {
        let base = self.electoral_totals.get(party).copied().unwrap_or(0);
        let gained = if party == self.runner_up {
            self.solution.achieved_electoral_votes
        } else {
            0
        };
        let lost: u32 = self
            .flipped
            .iter()
            .filter(|fs| fs.party_win == party)
            .map(|fs| fs.electoral_votes)
            .sum();
        (base + gained).saturating_sub(lost)
    }

    pub fn number_of_flipped_states(&self) -> usize {
        self.solution.flipped_states.len()
    }
}

/// A year that could not be processed.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct YearFailure {
    pub year: u32,
    pub kind: FailureKind,
    pub message: String,
}

/// The outcome of a batch run, in year order.
#[derive(PartialEq, Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub summaries: Vec<YearSummary>,
    pub failures: Vec<YearFailure>,
    /// True if the batch stopped before processing all the years.
    pub cancelled: bool,
}

impl BatchResult {
    /// True when a year could not even be interpreted (winner or runner-up unknown).
    pub fn has_unrecoverable(&self) -> bool {
        self.failures
            .iter()
            .any(|f| f.kind == FailureKind::UndeterminedOutcome)
    }
}

/// Errors that prevent a year from being solved.
#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FlipError {
    #[snafu(display("malformed row for {state}: {reason}"))]
    MalformedRow { state: String, reason: String },
    #[snafu(display("no winning party recorded for {state}"))]
    MissingPartyWin { state: String },
    #[snafu(display(
        "a target of {required} electoral votes cannot be reached with the {available} electoral votes of the eligible states"
    ))]
    UnreachableTarget { required: i64, available: u64 },
    #[snafu(display("no eligible state to reach a target of {required} electoral votes"))]
    DegenerateInput { required: i64 },
    #[snafu(display("cannot determine the outcome of {year}: {reason}"))]
    UndeterminedOutcome { year: u32, reason: String },
}

impl FlipError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FlipError::MalformedRow { .. } => FailureKind::MalformedRow,
            FlipError::MissingPartyWin { .. } => FailureKind::MissingPartyWin,
            FlipError::UnreachableTarget { .. } => FailureKind::UnreachableTarget,
            FlipError::DegenerateInput { .. } => FailureKind::DegenerateInput,
            FlipError::UndeterminedOutcome { .. } => FailureKind::UndeterminedOutcome,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
pub enum FailureKind {
    MalformedRow,
    MissingPartyWin,
    UnreachableTarget,
    DegenerateInput,
    UndeterminedOutcome,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::MalformedRow => "malformed_row",
            FailureKind::MissingPartyWin => "missing_party_win",
            FailureKind::UnreachableTarget => "unreachable_target",
            FailureKind::DegenerateInput => "degenerate_input",
            FailureKind::UndeterminedOutcome => "undetermined_outcome",
        };
        write!(f, "{}", s)
    }
}

// ********* Configuration **********

/// What it means to change the outcome of an election.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipMode {
    /// The runner-up reaches the number of electoral votes needed to win.
    Classic,
    /// The winner drops below the number of electoral votes needed to win.
    /// Only the states carried by the winner are flipped.
    NoMajority,
}

impl FlipMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlipMode::Classic => "classic",
            FlipMode::NoMajority => "no_majority",
        }
    }

    /// Prefix of the files written for this mode.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            FlipMode::Classic => "flip",
            FlipMode::NoMajority => "no_majority",
        }
    }
}

impl Display for FlipMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FlipMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classic" => Ok(FlipMode::Classic),
            "no_majority" | "no-majority" | "nomajority" => Ok(FlipMode::NoMajority),
            x => Err(format!(
                "unknown flip mode {:?} (expected classic or no_majority)",
                x
            )),
        }
    }
}

/// Parameters of the derived metrics.
#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub struct MetricsConfig {
    /// Weight of the popular margin in the weighted geometric closeness (C4).
    pub alpha: f64,
    /// Two-party margin share under which a state counts as recount-close.
    pub recount_threshold: f64,
    /// Two-party margin share under which a winner state counts as brittle.
    pub brittleness_threshold: f64,
}

impl MetricsConfig {
    pub const DEFAULT: MetricsConfig = MetricsConfig {
        alpha: 0.5,
        recount_threshold: 0.005,
        brittleness_threshold: 0.02,
    };
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig::DEFAULT
    }
}

/*!

This is the long-form manual for `electoral_flip` and `evflip`.

## The question

In an election decided by an electoral college, a candidate can win with a popular
margin of millions of votes and still be a few thousand votes away from losing: only
the votes in the right states matter. For every year of a table, `evflip` computes
the smallest number of popular votes that, moved from the state winners to the
national runner-up, would have changed the outcome.

## Input table

The input is a CSV file with one row per state and per year. Lines starting with `/`
are comments (typically the path of the file the table was exported from).

| column | required | meaning |
|--------|----------|---------|
| `year` | yes | the election year |
| `state` | yes | the state identifier |
| `electoral_votes` | yes | the electoral votes of the state |
| `party_win` | yes | the party code that carried the state |
| `{P}_votes` | yes | the popular votes of party `P` in the state (`D_votes`, `R_votes`, `T_votes`, ...) |
| `totalvotes` or `total_votes` | no | all the votes cast in the state (defaults to the sum of the party votes) |
| `total_electoral_votes` | no | the national total for the year |
| `electoral_votes_to_win` | no | the national threshold for the year |
| `overall_winner`, `overall_runner_up` | no | party codes |
| `{P}_electoral` | no | the national electoral votes of party `P` |
| `{P}_name` | no | the candidate of party `P` |

The year-level columns are repeated on every row of the year. When they are absent,
they are derived from the rows:
- the total is the sum of the electoral votes of the rows,
- the threshold is half of the total plus one,
- the electoral votes of a party are the sum over the states it carried,
- the winner and the runner-up are the first two parties by electoral votes, then by
  popular votes, then by code.

When a declared value disagrees with the rows, the declared value is used and a warning
is printed.

Congressional districts that allocate their own electoral votes (`ME-02`, `NE-02`) are
ordinary rows: they are flipped independently of their state.

Notes:
- an empty numeric cell reads as 0,
- a negative or non-numeric cell makes the year fail (the other years still run),
- the columns `winner_votes` and `loser_votes` are ignored.

## Cost of a state

The cost of a state is the number of votes that must move from the party that carried
the state to the runner-up so that the runner-up carries it:

```text
votes_to_flip = (winner_votes - runner_up_votes) / 2 + 1
```

The cost is always measured against the runner-up's votes in that state, even when the
runner-up placed third locally.

## Modes

### `classic`

The runner-up gains states until it reaches the threshold. Every state that the
runner-up did not carry may be flipped, including the states carried by a third party.

```text
required = electoral_votes_to_win - runner_up_electoral_votes
```

### `no_majority`

The winner loses states until it falls below the threshold, which sends the election to
a contingent vote. Only the states carried by the winner may be flipped.

```text
required = winner_electoral_votes - electoral_votes_to_win + 1
```

In both modes, a target of zero or less means that the table already shows the outcome
(a data error upstream): the year is reported with an empty flip and a warning.

## Solving

The cheapest set of states is found with a 0/1 knapsack over the electoral votes. The
states are considered by increasing cost per electoral vote. When several sets have the
same cost, the set with the fewest electoral votes is chosen.

## Outputs

For a run over the years `start` to `end`, `evflip` writes in the output directory:
- `flip_results-{start}-{end}.csv` (`no_majority_results-...` in the `no_majority` mode):
  one row per year with the flipped states,
- `flip_results_{start}-{end}.txt`: the same, as a readable report,
- `flip_election_metrics-{start}-{end}.csv`: the closeness metrics of every year,
- `flip_flipped_states_frequency-{start}-{end}.csv`: how often each state is flipped.

Every file name starts with the mode (`flip` or `no_majority`), so both modes can share
an output directory.

### Metrics

With `W` and `L` the national votes of the winner and of the runner-up, `S = W + L`,
`m = |W - L| / S` and `f` the number of votes to flip:

- `C1_euclidean = sqrt(m² + (f/S)²)`
- `C2_max = max(m, f/S)`
- `C3_harmonic_like = 2·m·f / (S + m·f)`
- `C4_weighted_geom = m^α · (f/S)^(1-α)`
- `C5_efficiency_ratio = f / (m·S)`
- `state_concentration_R = f² / Σ f_i²` over the flipped states
- `margin_sensitivity_sigma`: the smallest uniform two-party swing that moves enough
  electoral votes
- `vote_efficiency_gap_eta`: how much the electoral share exaggerates the popular share,
  mapped to (-1, 1)
- `recount_vulnerability_V`: the share of electoral votes in states closer than the
  recount threshold
- `coalition_brittleness_count`: the states of the winner closer than the brittleness
  threshold
- `institutional_distortion_D = |f/S - m| / m`

Undefined values are written as `NaN`.

## Configuration

All the options of the command line can also be given in a JSON file (`--config`). The
options of the command line take precedence.

```json
{
  "input": "1900_2024_election_results.csv",
  "outputDir": "results",
  "startYear": 1900,
  "endYear": 2024,
  "mode": "classic",
  "alpha": 0.5,
  "recountThreshold": 0.005,
  "brittlenessThreshold": 0.02,
  "reportOrder": "year",
  "parallel": false
}
```

The input path is relative to the directory of the configuration file.

## Exit codes

- `0` the run completed,
- `1` the run could not start or write its outputs,
- `2` the winner or the runner-up of at least one year could not be determined.

*/

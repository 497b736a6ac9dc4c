// Reading the state-by-year election table.

use std::collections::BTreeMap;

use csv::StringRecord;
use electoral_flip::builder::YearBuilder;

use crate::flip::*;

// Columns ending in `_votes` that are not the votes of a party.
const NON_PARTY_VOTE_COLUMNS: &[&str] = &[
    "electoral_votes",
    "total_electoral_votes",
    "total_votes",
    "winner_votes",
    "loser_votes",
];

/// The years read from a table, and the years that could not be read.
#[derive(Debug, Clone)]
pub struct ParsedTables {
    pub tables: Vec<YearTable>,
    pub failures: Vec<YearFailure>,
}

#[derive(Debug, Clone)]
struct Columns {
    year: usize,
    state: usize,
    electoral_votes: usize,
    party_win: usize,
    total_votes: Option<usize>,
    party_votes: Vec<(String, usize)>,
    party_electoral: Vec<(String, usize)>,
    party_names: Vec<(String, usize)>,
    total_electoral_votes: Option<usize>,
    electoral_votes_to_win: Option<usize>,
    overall_winner: Option<usize>,
    overall_runner_up: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord, path: &str) -> EvFlipResult<Columns> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| -> EvFlipResult<usize> {
            find(name).context(CsvMissingColumnSnafu {
                path,
                column: name,
            })
        };

        let party_votes: Vec<(String, usize)> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !NON_PARTY_VOTE_COLUMNS.contains(h))
            .filter_map(|(idx, h)| h.strip_suffix("_votes").map(|p| (p.to_string(), idx)))
            .filter(|(p, _)| !p.is_empty())
            .collect();
        let per_party = |suffix: &str| -> Vec<(String, usize)> {
            party_votes
                .iter()
                .filter_map(|(p, _)| find(&format!("{}{}", p, suffix)).map(|idx| (p.clone(), idx)))
                .collect()
        };
        let party_electoral = per_party("_electoral");
        let party_names = per_party("_name");

        let res = Columns {
            year: require("year")?,
            state: require("state")?,
            electoral_votes: require("electoral_votes")?,
            party_win: require("party_win")?,
            total_votes: find("totalvotes").or_else(|| find("total_votes")),
            party_electoral,
            party_names,
            total_electoral_votes: find("total_electoral_votes"),
            electoral_votes_to_win: find("electoral_votes_to_win"),
            overall_winner: find("overall_winner"),
            overall_runner_up: find("overall_runner_up"),
            party_votes,
        };
        if res.party_votes.is_empty() {
            whatever!("The CSV file {} has no party vote column (such as D_votes)", path)
        }
        debug!("Columns::from_headers: {:?}", res);
        Ok(res)
    }
}

fn cell<'a>(record: &'a StringRecord, idx: usize) -> &'a str {
    record.get(idx).unwrap_or("")
}

fn optional_cell(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.map(|i| cell(record, i)).filter(|s| !s.is_empty())
}

/// Reads a count. An empty cell is 0. Values written as floats ("1234.0") are accepted
/// when they are whole numbers.
fn parse_count(value: &str, state: &str, column: &str) -> Result<u64, FlipError> {
    if value.is_empty() {
        return Ok(0);
    }
    if let Ok(x) = value.parse::<u64>() {
        return Ok(x);
    }
    match value.parse::<f64>() {
        Ok(x) if x.is_finite() && x >= 0.0 && x.fract() == 0.0 => Ok(x as u64),
        _ => Err(FlipError::MalformedRow {
            state: state.to_string(),
            reason: format!("invalid value {:?} in column {}", value, column),
        }),
    }
}

fn parse_small(value: &str, state: &str, column: &str) -> Result<u32, FlipError> {
    let x = parse_count(value, state, column)?;
    u32::try_from(x).map_err(|_| FlipError::MalformedRow {
        state: state.to_string(),
        reason: format!("value {} out of range in column {}", x, column),
    })
}

fn read_row(
    record: &StringRecord,
    columns: &Columns,
    builder: &mut YearBuilder,
) -> Result<(), FlipError> {
    let state = cell(record, columns.state).to_string();
    let electoral_votes = parse_small(
        cell(record, columns.electoral_votes),
        &state,
        "electoral_votes",
    )?;

    let mut candidate_votes: BTreeMap<String, u64> = BTreeMap::new();
    for (party, idx) in columns.party_votes.iter() {
        let column = format!("{}_votes", party);
        candidate_votes.insert(party.clone(), parse_count(cell(record, *idx), &state, &column)?);
    }
    let total_votes = match optional_cell(record, columns.total_votes) {
        Some(v) => parse_count(v, &state, "totalvotes")?,
        None => candidate_votes.values().sum(),
    };

    if let Some(v) = optional_cell(record, columns.total_electoral_votes) {
        builder.declare_total_electoral_votes(parse_small(v, &state, "total_electoral_votes")?);
    }
    if let Some(v) = optional_cell(record, columns.electoral_votes_to_win) {
        builder.declare_electoral_votes_to_win(parse_small(v, &state, "electoral_votes_to_win")?);
    }
    if let Some(v) = optional_cell(record, columns.overall_winner) {
        builder.declare_winner(v);
    }
    if let Some(v) = optional_cell(record, columns.overall_runner_up) {
        builder.declare_runner_up(v);
    }
    for (party, idx) in columns.party_electoral.iter() {
        if let Some(v) = optional_cell(record, Some(*idx)) {
            let column = format!("{}_electoral", party);
            builder.declare_party_electoral(party, parse_small(v, &state, &column)?);
        }
    }
    for (party, idx) in columns.party_names.iter() {
        if let Some(v) = optional_cell(record, Some(*idx)) {
            builder.candidate_name(party, v);
        }
    }

    builder.row(StateRow {
        state,
        electoral_votes,
        party_win: cell(record, columns.party_win).to_string(),
        candidate_votes,
        total_votes,
    });
    Ok(())
}

/// Reads all the years between `start_year` and `end_year` (included).
///
/// A year with a malformed row is returned as a failure. A file that cannot be read,
/// a missing column or a file without any year in range are errors.
pub fn read_year_tables(path: &Path, start_year: u32, end_year: u32) -> EvFlipResult<ParsedTables> {
    let path_s = path_str(path);
    info!("Attempting to read the election table {:?}", path_s);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'/'))
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu {
            path: path_s.clone(),
        })?;
    let headers = rdr
        .headers()
        .context(CsvOpenSnafu {
            path: path_s.clone(),
        })?
        .clone();
    let columns = Columns::from_headers(&headers, &path_s)?;

    let mut builders: BTreeMap<u32, YearBuilder> = BTreeMap::new();
    let mut errors: BTreeMap<u32, FlipError> = BTreeMap::new();
    for (idx, record_r) in rdr.records().enumerate() {
        let lineno = idx + 2;
        let record = record_r.context(CsvLineParseSnafu { lineno })?;
        let year_s = cell(&record, columns.year);
        let year = match year_s.parse::<u32>() {
            Ok(y) => y,
            Err(_) => {
                whatever!("Invalid year {:?} on line {}", year_s, lineno)
            }
        };
        if year < start_year || year > end_year {
            continue;
        }
        let builder = builders
            .entry(year)
            .or_insert_with(|| YearBuilder::new(year));
        if errors.contains_key(&year) {
            continue;
        }
        if let Err(e) = read_row(&record, &columns, builder) {
            warn!("read_year_tables: line {}: {}", lineno, e);
            errors.insert(year, e);
        }
    }

    let mut res = ParsedTables {
        tables: Vec::new(),
        failures: Vec::new(),
    };
    for (year, builder) in builders.iter() {
        let table_r = match errors.remove(year) {
            Some(e) => Err(e),
            None => builder.build(),
        };
        match table_r {
            Ok(table) => res.tables.push(table),
            Err(e) => res.failures.push(YearFailure {
                year: *year,
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
    }
    if res.tables.is_empty() && res.failures.is_empty() {
        whatever!(
            "No year between {} and {} in {}",
            start_year,
            end_year,
            path_s
        )
    }
    info!(
        "read_year_tables: {} years read from {}",
        res.tables.len() + res.failures.len(),
        path_s
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_table(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_party_columns_and_year_scalars() {
        let f = write_table(
            "/exported/from/somewhere.csv\n\
             year,state,electoral_votes,party_win,D_votes,R_votes,winner_votes,totalvotes,overall_winner,D_electoral,R_name\n\
             2000,FL,25,R,2912253,2912790,1,,R,266,George W. Bush\n\
             2000,NE-02,1,R,1000.0,2000,1,3100,R,266,George W. Bush\n\
             1996,CA,54,D,5119835,3828380,1,,D,379,Bob Dole\n",
        );
        let parsed = read_year_tables(f.path(), 1998, 2002).unwrap();
        assert!(parsed.failures.is_empty());
        assert_eq!(parsed.tables.len(), 1);
        let table = &parsed.tables[0];
        assert_eq!(table.year, 2000);
        assert_eq!(table.rows.len(), 2);
        let fl = &table.rows[0];
        assert_eq!(fl.state, "FL");
        assert_eq!(fl.votes_for("R"), Some(2912790));
        assert_eq!(fl.total_votes, 2912253 + 2912790);
        assert!(fl.votes_for("winner").is_none());
        assert_eq!(table.rows[1].votes_for("D"), Some(1000));
        assert_eq!(table.rows[1].total_votes, 3100);
        assert_eq!(table.declared.overall_winner.as_deref(), Some("R"));
        assert_eq!(table.declared.electoral.get("D"), Some(&266));
        assert_eq!(table.candidate_name("R"), Some("George W. Bush"));
        assert_eq!(table.declared.total_electoral_votes, None);
    }

    #[test]
    fn bad_cells_fail_the_year_only() {
        let f = write_table(
            "year,state,electoral_votes,party_win,D_votes,R_votes,total_votes\n\
             1992,AR,6,D,505823,337324,\n\
             1996,CA,54,D,5119835,-5,\n\
             1996,TX,32,R,,2736167,\n\
             2000,FL,25,R,many,2912790,\n",
        );
        let parsed = read_year_tables(f.path(), 1900, 2024).unwrap();
        let years: Vec<u32> = parsed.tables.iter().map(|t| t.year).collect();
        assert_eq!(years, vec![1992]);
        let failed: Vec<u32> = parsed.failures.iter().map(|f| f.year).collect();
        assert_eq!(failed, vec![1996, 2000]);
        assert!(parsed
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::MalformedRow));
    }

    #[test]
    fn empty_cells_read_as_zero() {
        let f = write_table(
            "year,state,electoral_votes,party_win,D_votes,R_votes\n\
             1996,TX,32,R,,2736167\n",
        );
        let parsed = read_year_tables(f.path(), 1900, 2024).unwrap();
        assert_eq!(parsed.tables[0].rows[0].votes_for("D"), Some(0));
    }

    #[test]
    fn duplicate_states_fail_the_year() {
        let f = write_table(
            "year,state,electoral_votes,party_win,D_votes,R_votes\n\
             1996,TX,32,R,1,2\n\
             1996,TX,32,R,1,2\n",
        );
        let parsed = read_year_tables(f.path(), 1900, 2024).unwrap();
        assert!(parsed.tables.is_empty());
        assert_eq!(parsed.failures[0].kind, FailureKind::MalformedRow);
    }

    #[test]
    fn fatal_errors() {
        let f = write_table("year,state,party_win,D_votes\n2000,FL,R,1\n");
        assert!(read_year_tables(f.path(), 1900, 2024).is_err());
        let f = write_table("year,state,electoral_votes,party_win\n2000,FL,25,R\n");
        assert!(read_year_tables(f.path(), 1900, 2024).is_err());
        let f = write_table(
            "year,state,electoral_votes,party_win,D_votes,R_votes\n\
             MMXX,FL,25,R,1,2\n",
        );
        assert!(read_year_tables(f.path(), 1900, 2024).is_err());
        let f = write_table(
            "year,state,electoral_votes,party_win,D_votes,R_votes\n\
             2000,FL,25,R,1,2\n",
        );
        assert!(read_year_tables(f.path(), 1900, 1950).is_err());
        assert!(read_year_tables(Path::new("/does/not/exist.csv"), 1900, 2024).is_err());
    }
}

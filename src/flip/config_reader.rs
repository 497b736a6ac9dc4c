use crate::args::Args;
use crate::flip::report::ReportOrder;
use crate::flip::*;

use serde::{Deserialize, Serialize};

pub const DEFAULT_START_YEAR: u32 = 1900;
pub const DEFAULT_END_YEAR: u32 = 2024;
pub const DEFAULT_OUT_DIR: &str = "results";

/// The settings that can be stored in a JSON configuration file.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlipConfig {
    pub input: Option<String>,
    #[serde(rename = "outputDir")]
    pub output_dir: Option<String>,
    #[serde(rename = "startYear")]
    pub start_year: Option<u32>,
    #[serde(rename = "endYear")]
    pub end_year: Option<u32>,
    pub mode: Option<String>,
    pub alpha: Option<f64>,
    #[serde(rename = "recountThreshold")]
    pub recount_threshold: Option<f64>,
    #[serde(rename = "brittlenessThreshold")]
    pub brittleness_threshold: Option<f64>,
    pub summary: Option<String>,
    #[serde(rename = "reportOrder")]
    pub report_order: Option<String>,
    pub parallel: Option<bool>,
    #[serde(rename = "failFast")]
    pub fail_fast: Option<bool>,
}

/// The settings of a run, once the command line, the configuration file and the defaults
/// have been merged.
#[derive(PartialEq, Debug, Clone)]
pub struct RunSettings {
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub start_year: u32,
    pub end_year: u32,
    pub mode: FlipMode,
    pub metrics: MetricsConfig,
    pub summary: Option<String>,
    pub reference: Option<String>,
    pub report_order: ReportOrder,
    pub parallel: bool,
    pub fail_fast: bool,
}

pub fn read_config(path: &str) -> EvFlipResult<FlipConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: FlipConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> EvFlipResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

fn check_share(name: &str, value: f64) -> EvFlipResult<f64> {
    if !(0.0..=1.0).contains(&value) {
        whatever!("{} must be between 0 and 1, got {}", name, value)
    }
    Ok(value)
}

/// Merges the command line with the configuration file, if any.
pub fn resolve_settings(args: &Args) -> EvFlipResult<RunSettings> {
    let (config, config_dir) = match args.config.as_deref() {
        Some(config_path) => {
            let config = read_config(config_path)?;
            let dir = Path::new(config_path)
                .parent()
                .context(MissingParentDirSnafu { path: config_path })?
                .to_path_buf();
            (config, Some(dir))
        }
        None => (FlipConfig::default(), None),
    };

    let input: PathBuf = match (args.input.as_deref(), config.input.as_deref()) {
        (Some(p), _) => PathBuf::from(p),
        (None, Some(p)) => match &config_dir {
            Some(dir) => dir.join(p),
            None => PathBuf::from(p),
        },
        (None, None) => {
            whatever!("No input file: use --input or give an input in the configuration file")
        }
    };

    let out_dir = PathBuf::from(
        args.out_dir
            .clone()
            .or(config.output_dir)
            .unwrap_or_else(|| DEFAULT_OUT_DIR.to_string()),
    );

    let start_year = args
        .start_year
        .or(config.start_year)
        .unwrap_or(DEFAULT_START_YEAR);
    let end_year = args.end_year.or(config.end_year).unwrap_or(DEFAULT_END_YEAR);
    if start_year > end_year {
        whatever!(
            "The start year {} is after the end year {}",
            start_year,
            end_year
        )
    }

    let mode = match args.mode.as_deref().or(config.mode.as_deref()) {
        Some(s) => match s.parse::<FlipMode>() {
            Ok(m) => m,
            Err(msg) => {
                whatever!("{}", msg)
            }
        },
        None => FlipMode::Classic,
    };

    let report_order = match args
        .report_order
        .as_deref()
        .or(config.report_order.as_deref())
    {
        Some(s) => match s.parse::<ReportOrder>() {
            Ok(o) => o,
            Err(msg) => {
                whatever!("{}", msg)
            }
        },
        None => ReportOrder::Year,
    };

    let defaults = MetricsConfig::DEFAULT;
    let metrics = MetricsConfig {
        alpha: check_share(
            "alpha",
            args.alpha.or(config.alpha).unwrap_or(defaults.alpha),
        )?,
        recount_threshold: check_share(
            "recount threshold",
            args.recount_threshold
                .or(config.recount_threshold)
                .unwrap_or(defaults.recount_threshold),
        )?,
        brittleness_threshold: check_share(
            "brittleness threshold",
            args.brittleness_threshold
                .or(config.brittleness_threshold)
                .unwrap_or(defaults.brittleness_threshold),
        )?,
    };

    Ok(RunSettings {
        input,
        out_dir,
        start_year,
        end_year,
        mode,
        metrics,
        summary: args.summary.clone().or(config.summary),
        reference: args.reference.clone(),
        report_order,
        parallel: args.parallel || config.parallel.unwrap_or(false),
        fail_fast: args.fail_fast || config.fail_fast.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args {
            input: Some("table.csv".to_string()),
            ..Args::default()
        };
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.input, PathBuf::from("table.csv"));
        assert_eq!(settings.out_dir, PathBuf::from("results"));
        assert_eq!(settings.start_year, 1900);
        assert_eq!(settings.end_year, 2024);
        assert_eq!(settings.mode, FlipMode::Classic);
        assert_eq!(settings.metrics, MetricsConfig::DEFAULT);
        assert_eq!(settings.report_order, ReportOrder::Year);
        assert!(!settings.parallel);
    }

    #[test]
    fn command_line_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_p = dir.path().join("run.json");
        fs::write(
            &config_p,
            r#"{"input": "data/table.csv", "startYear": 1950, "endYear": 1990,
                "mode": "no_majority", "alpha": 0.25, "reportOrder": "ratio", "parallel": true}"#,
        )
        .unwrap();
        let args = Args {
            config: Some(config_p.display().to_string()),
            end_year: Some(1980),
            ..Args::default()
        };
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.input, dir.path().join("data/table.csv"));
        assert_eq!(settings.start_year, 1950);
        assert_eq!(settings.end_year, 1980);
        assert_eq!(settings.mode, FlipMode::NoMajority);
        assert_eq!(settings.metrics.alpha, 0.25);
        assert_eq!(settings.metrics.recount_threshold, 0.005);
        assert_eq!(settings.report_order, ReportOrder::Ratio);
        assert!(settings.parallel);
    }

    #[test]
    fn invalid_settings() {
        let base = Args {
            input: Some("table.csv".to_string()),
            ..Args::default()
        };
        assert!(resolve_settings(&Args::default()).is_err());
        let args = Args {
            mode: Some("landslide".to_string()),
            ..base.clone()
        };
        assert!(resolve_settings(&args).is_err());
        let args = Args {
            start_year: Some(2000),
            end_year: Some(1990),
            ..base.clone()
        };
        assert!(resolve_settings(&args).is_err());
        let args = Args {
            alpha: Some(1.5),
            ..base
        };
        assert!(resolve_settings(&args).is_err());
    }

    #[test]
    fn unreadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_p = dir.path().join("run.json");
        fs::write(&config_p, "{ not json").unwrap();
        let args = Args {
            config: Some(config_p.display().to_string()),
            ..Args::default()
        };
        assert!(resolve_settings(&args).is_err());
    }
}

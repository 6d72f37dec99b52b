//! Responsible for turning raw Routific solution files into clean CSVs for the warehouse

use chrono::DateTime;
use chrono_tz::Tz;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info};

use crate::{
    config::CleanConfig,
    error::CleanError,
    model::{CLEAN_COLUMNS, CleanRouteStop, Dispatch, REQUIRED_COLUMNS, RouteStop},
};

/// Outcome of cleaning a whole folder
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchSummary {
    /// Whether the cleaned output is worth loading: at least one file made it
    /// and no more than `max_failures` files failed.
    pub fn passes(&self, max_failures: Option<usize>) -> bool {
        !self.succeeded.is_empty() && max_failures.is_none_or(|max| self.failed.len() <= max)
    }
}

/// Names of the route solution CSVs directly inside `input_path`, in directory order.
pub fn get_file_names(input_path: &Path) -> Result<Vec<String>, CleanError> {
    let mut file_names = vec![];

    for entry in fs::read_dir(input_path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.to_lowercase().contains("solution") && file_name.contains(".csv") {
            file_names.push(file_name);
        }
    }

    Ok(file_names)
}

/// Cleans one file into `Clean_<file_name>` in the output folder.
/// Nothing is written unless every row could be cleaned. Returns the number of rows written.
#[tracing::instrument(err, skip(config))]
pub fn clean_route(file_name: &str, config: &CleanConfig) -> Result<usize, CleanError> {
    let stops = read_route_stops(&config.input_path.join(file_name))?;
    let dispatch = Dispatch::from_file_name(file_name)?;

    let mut cleaned = stops
        .iter()
        .map(|stop| {
            CleanRouteStop::try_from_route_stop(
                stop,
                &dispatch,
                config.dispatch_time_zone,
                &config.postal_patterns,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    assign_durations(&stops, &mut cleaned);

    write_clean_stops(&clean_file_path(&config.output_path, file_name), &cleaned)?;

    Ok(cleaned.len())
}

/// Cleans every route solution file, logging and skipping the ones that fail.
#[tracing::instrument(err, skip(config), fields(input = %config.input_path.display()))]
pub fn clean_all(config: &CleanConfig) -> Result<BatchSummary, CleanError> {
    let file_names = get_file_names(&config.input_path)?;

    info!("found {} route solution file(s)", file_names.len());

    let mut summary = BatchSummary::default();

    for file_name in file_names {
        println!("{file_name}");

        match clean_route(&file_name, config) {
            Ok(rows) => {
                info!(file = %file_name, rows, "cleaned");
                summary.succeeded.push(file_name);
            }
            Err(e) => {
                error!(file = %file_name, "couldn't clean file: {e}");
                println!("{e}");
                summary.failed.push(file_name);
            }
        }
    }

    Ok(summary)
}

/// Runs [`clean_all`] and prints the summary.
pub fn run(config: &CleanConfig) -> Result<BatchSummary, CleanError> {
    let summary = clean_all(config)?;

    println!(
        "{} file(s) created in: {}",
        summary.succeeded.len(),
        config.output_path.display()
    );
    if !summary.failed.is_empty() {
        println!(
            "Something went wrong in {} file(s): {:?}",
            summary.failed.len(),
            summary.failed
        );
    }

    Ok(summary)
}

pub fn clean_file_path(output_path: &Path, file_name: &str) -> PathBuf {
    output_path.join(format!("Clean_{file_name}"))
}

fn read_route_stops(path: &Path) -> Result<Vec<RouteStop>, CleanError> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|h| h == **column))
    {
        return Err(CleanError::Schema {
            column: missing.to_string(),
        });
    }

    let stops = reader.deserialize().collect::<Result<Vec<RouteStop>, _>>()?;

    Ok(stops)
}

/// Fills `duration_mins` with the minutes since the same driver's previous stop started.
/// Stops without a driver name belong to no driver and get no duration.
fn assign_durations(stops: &[RouteStop], cleaned: &mut [CleanRouteStop]) {
    let mut previous_start: HashMap<&str, Option<DateTime<Tz>>> = HashMap::new();

    for (stop, clean) in stops.iter().zip(cleaned.iter_mut()) {
        let Some(driver) = stop.driver_name.as_deref() else {
            continue;
        };

        if let Some(previous) = previous_start.insert(driver, clean.start_at) {
            clean.duration_mins = minutes_between(previous, clean.start_at);
        }
    }
}

fn minutes_between(from: Option<DateTime<Tz>>, to: Option<DateTime<Tz>>) -> Option<f64> {
    let elapsed = to? - from?;

    Some(elapsed.num_milliseconds() as f64 / 60_000.0)
}

fn write_clean_stops(path: &Path, stops: &[CleanRouteStop]) -> Result<(), CleanError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".Clean_")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut staged);

        writer.write_record(CLEAN_COLUMNS)?;
        for stop in stops {
            writer.serialize(stop)?;
        }
        writer.flush()?;
    }

    staged.persist(path).map_err(|e| e.error)?;

    info!(path = %path.display(), "wrote {} rows", stops.len());

    Ok(())
}

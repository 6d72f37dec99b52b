use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::LazyLock;

use super::completion::infer_stop_completion;
use super::dispatch::{Dispatch, DispatchType};
use crate::{
    error::CleanError,
    postal_code::PostalPatterns,
    utils::{non_blank, title_case},
};

/// Columns a route solution export must have. Anything else in the file is dropped.
pub const REQUIRED_COLUMNS: [&str; 12] = [
    "Driver Name",
    "Stop Number",
    "Visit Name",
    "Address",
    "Start at",
    "Finish by",
    "Distance(km)",
    "Stop Status",
    "Completion/skipped Time",
    "Skipped Reason",
    "Driver Notes",
    "FamilyID",
];

/// Header of a cleaned file, in order. The first twelve are
/// [`REQUIRED_COLUMNS`] passed through [`crate::utils::clean_column_name`].
pub const CLEAN_COLUMNS: [&str; 20] = [
    "Driver_Name",
    "Stop_Number",
    "Visit_Name",
    "Address",
    "Start_at",
    "Finish_by",
    "Distance_km_",
    "Stop_Status",
    "Completion_skipped_Time",
    "Skipped_Reason",
    "Driver_Notes",
    "FamilyID",
    "FSA",
    "Postal_Code",
    "Stop_Completion",
    "File_Name",
    "Dispatch_Date",
    "Dispatch_Type",
    "Dispatch_Name",
    "Duration_mins",
];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

static ROUTE_ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(Route .+\)").unwrap());

/// One stop as exported by the route optimizer. Empty cells are `None`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RouteStop {
    #[serde(rename = "Driver Name")]
    pub driver_name: Option<String>,
    #[serde(rename = "Stop Number")]
    pub stop_number: Option<String>,
    #[serde(rename = "Visit Name")]
    pub visit_name: Option<String>,
    #[serde(rename = "Address")]
    pub address: Option<String>,
    /// `HH:MM`
    ///
    /// Warning: the hour can be larger than 23
    #[serde(rename = "Start at")]
    pub start_at: Option<String>,
    /// `HH:MM`
    ///
    /// Warning: the hour can be larger than 23
    #[serde(rename = "Finish by")]
    pub finish_by: Option<String>,
    #[serde(rename = "Distance(km)")]
    pub distance_km: Option<String>,
    /// "done", "skipped" or nothing
    #[serde(rename = "Stop Status")]
    pub stop_status: Option<String>,
    #[serde(rename = "Completion/skipped Time")]
    pub completion_skipped_time: Option<String>,
    #[serde(rename = "Skipped Reason")]
    pub skipped_reason: Option<String>,
    #[serde(rename = "Driver Notes")]
    pub driver_notes: Option<String>,
    #[serde(rename = "FamilyID")]
    pub family_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CleanRouteStop {
    #[serde(rename = "Driver_Name")]
    pub driver_name: Option<String>,
    #[serde(rename = "Stop_Number")]
    pub stop_number: Option<String>,
    #[serde(rename = "Visit_Name")]
    pub visit_name: Option<String>,
    #[serde(rename = "Address")]
    pub address: Option<String>,
    #[serde(rename = "Start_at", serialize_with = "serialize_timestamp")]
    pub start_at: Option<DateTime<Tz>>,
    #[serde(rename = "Finish_by", serialize_with = "serialize_timestamp")]
    pub finish_by: Option<DateTime<Tz>>,
    #[serde(rename = "Distance_km_")]
    pub distance_km: Option<String>,
    #[serde(rename = "Stop_Status")]
    pub stop_status: Option<String>,
    #[serde(rename = "Completion_skipped_Time")]
    pub completion_skipped_time: Option<String>,
    #[serde(rename = "Skipped_Reason")]
    pub skipped_reason: Option<String>,
    #[serde(rename = "Driver_Notes")]
    pub driver_notes: Option<String>,
    #[serde(rename = "FamilyID")]
    pub family_id: Option<String>,
    #[serde(rename = "FSA")]
    pub fsa: Option<String>,
    #[serde(rename = "Postal_Code")]
    pub postal_code: Option<String>,
    #[serde(rename = "Stop_Completion")]
    pub stop_completion: Option<u8>,
    #[serde(rename = "File_Name")]
    pub file_name: String,
    #[serde(rename = "Dispatch_Date")]
    pub dispatch_date: NaiveDate,
    #[serde(rename = "Dispatch_Type")]
    pub dispatch_type: DispatchType,
    #[serde(rename = "Dispatch_Name")]
    pub dispatch_name: String,
    /// Minutes since the same driver's previous stop started. Filled in per file.
    #[serde(rename = "Duration_mins")]
    pub duration_mins: Option<f64>,
}

impl CleanRouteStop {
    /// Derives everything that only depends on the stop itself and its file.
    /// `duration_mins` is left empty.
    pub fn try_from_route_stop(
        stop: &RouteStop,
        dispatch: &Dispatch,
        time_zone: Tz,
        postal_patterns: &PostalPatterns,
    ) -> Result<Self, CleanError> {
        let start_at = parse_time_of_day("Start at", stop.start_at.as_deref())?
            .map(|time| dispatch_timestamp(dispatch.date, time, time_zone))
            .transpose()?;
        let finish_by = parse_time_of_day("Finish by", stop.finish_by.as_deref())?
            .map(|time| dispatch_timestamp(dispatch.date, time, time_zone))
            .transpose()?;

        let address = stop.address.as_deref();

        Ok(CleanRouteStop {
            driver_name: stop.driver_name.as_deref().map(normalize_driver_name),
            stop_number: stop.stop_number.clone(),
            visit_name: stop.visit_name.as_deref().map(normalize_visit_name),
            address: stop.address.clone(),
            start_at,
            finish_by,
            distance_km: stop.distance_km.clone(),
            stop_status: stop.stop_status.clone(),
            completion_skipped_time: stop.completion_skipped_time.clone(),
            skipped_reason: stop.skipped_reason.clone(),
            driver_notes: stop.driver_notes.clone(),
            family_id: stop.family_id.clone(),
            fsa: address.and_then(|a| postal_patterns.fsa(a)),
            postal_code: address.and_then(|a| postal_patterns.postal_code(a)),
            stop_completion: infer_stop_completion(stop),
            file_name: dispatch.file_name.clone(),
            dispatch_date: dispatch.date,
            dispatch_type: dispatch.dispatch_type,
            dispatch_name: dispatch.name(),
            duration_mins: None,
        })
    }
}

/// Parses `HH:MM` or `HH:MM:SS`.
/// Hours past 23 are corrupt exports and become `None` instead of an error.
pub fn parse_time_of_day(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<NaiveTime>, CleanError> {
    let Some(value) = non_blank(value).map(str::trim) else {
        return Ok(None);
    };

    let (hour, _) = value
        .split_once(':')
        .ok_or_else(|| CleanError::parse(field, value, "expected HH:MM"))?;
    let hour: u32 = hour
        .parse()
        .map_err(|e| CleanError::parse(field, value, e))?;

    if hour > 23 {
        return Ok(None);
    }

    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map(Some)
        .map_err(|e| CleanError::parse(field, value, e))
}

/// Midnight of the dispatch date in `time_zone`, plus the time of day.
pub fn dispatch_timestamp(
    date: NaiveDate,
    time: NaiveTime,
    time_zone: Tz,
) -> Result<DateTime<Tz>, CleanError> {
    let midnight = date
        .and_time(NaiveTime::MIN)
        .and_local_timezone(time_zone)
        .earliest()
        .ok_or_else(|| CleanError::parse("Dispatch_Date", date.to_string(), "no local midnight"))?;

    midnight
        .checked_add_signed(time.signed_duration_since(NaiveTime::MIN))
        .ok_or_else(|| CleanError::parse("Start at", time.to_string(), "timestamp out of range"))
}

pub fn normalize_driver_name(name: &str) -> String {
    ROUTE_ANNOTATION_RE
        .replace_all(&title_case(name), "")
        .trim()
        .to_string()
}

pub fn normalize_visit_name(name: &str) -> String {
    title_case(name).trim().to_string()
}

fn serialize_timestamp<S>(value: &Option<DateTime<Tz>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(timestamp) => serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clean_column_name;
    use chrono_tz::US::Eastern;

    fn sample_stop() -> RouteStop {
        RouteStop {
            driver_name: Some("  jane DOE (Route 4) ".to_string()),
            stop_number: Some("2".to_string()),
            visit_name: Some("the smith family ".to_string()),
            address: Some("12 King St E, Toronto, ON M5C 1C3".to_string()),
            start_at: Some("09:30".to_string()),
            finish_by: Some("25:10".to_string()),
            distance_km: Some("4.1".to_string()),
            stop_status: Some("done".to_string()),
            family_id: Some("F-17".to_string()),
            ..RouteStop::default()
        }
    }

    #[test]
    fn test_clean_columns_follow_required_columns() {
        for (raw, clean) in REQUIRED_COLUMNS.iter().zip(CLEAN_COLUMNS.iter()) {
            assert_eq!(&clean_column_name(raw), clean);
        }
    }

    #[test]
    fn test_serialized_header_matches_clean_columns() -> Result<(), anyhow::Error> {
        let dispatch = Dispatch::from_file_name("2023-01-24 FSP Route 1.csv")?;
        let clean = CleanRouteStop::try_from_route_stop(
            &sample_stop(),
            &dispatch,
            Eastern,
            &PostalPatterns::canada(),
        )?;

        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(&clean)?;
        let written = String::from_utf8(writer.into_inner().map_err(|e| e.into_error())?)?;
        let header = written.lines().next().unwrap_or_default();

        assert_eq!(header, CLEAN_COLUMNS.join(","));

        Ok(())
    }

    #[test]
    fn test_derives_fields() -> Result<(), anyhow::Error> {
        let dispatch = Dispatch::from_file_name("2023-01-24 FSP Route 1.csv")?;
        let clean = CleanRouteStop::try_from_route_stop(
            &sample_stop(),
            &dispatch,
            Eastern,
            &PostalPatterns::canada(),
        )?;

        assert_eq!(clean.driver_name.as_deref(), Some("Jane Doe"));
        assert_eq!(clean.visit_name.as_deref(), Some("The Smith Family"));
        assert_eq!(clean.fsa.as_deref(), Some("M5C"));
        assert_eq!(clean.postal_code.as_deref(), Some("M5C 1C3"));
        assert_eq!(clean.stop_completion, Some(1));
        assert_eq!(clean.dispatch_name, "2023-01-24 FSP");
        assert_eq!(
            clean.start_at.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            Some("2023-01-24 09:30:00-05:00".to_string())
        );
        assert_eq!(clean.finish_by, None);
        assert_eq!(clean.duration_mins, None);

        Ok(())
    }

    #[test]
    fn test_hour_past_23_is_dropped() -> Result<(), anyhow::Error> {
        assert_eq!(parse_time_of_day("Start at", Some("25:10"))?, None);
        assert_eq!(parse_time_of_day("Start at", Some("24:00"))?, None);
        assert_eq!(
            parse_time_of_day("Start at", Some("23:59"))?,
            NaiveTime::from_hms_opt(23, 59, 0)
        );
        assert_eq!(
            parse_time_of_day("Start at", Some("07:05:30"))?,
            NaiveTime::from_hms_opt(7, 5, 30)
        );
        assert_eq!(parse_time_of_day("Start at", None)?, None);
        assert_eq!(parse_time_of_day("Start at", Some(""))?, None);

        Ok(())
    }

    #[test]
    fn test_garbage_time_is_parse_error() {
        assert!(matches!(
            parse_time_of_day("Finish by", Some("noon")),
            Err(CleanError::Parse { field: "Finish by", .. })
        ));
        assert!(matches!(
            parse_time_of_day("Finish by", Some("ab:10")),
            Err(CleanError::Parse { .. })
        ));
        assert!(matches!(
            parse_time_of_day("Finish by", Some("10:75")),
            Err(CleanError::Parse { .. })
        ));
    }

    #[test]
    fn test_timestamps_are_anchored_to_local_midnight() -> Result<(), anyhow::Error> {
        let summer = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
        let time = NaiveTime::from_hms_opt(14, 0, 0).unwrap();

        let timestamp = dispatch_timestamp(summer, time, Eastern)?;

        assert_eq!(
            timestamp.format(TIMESTAMP_FORMAT).to_string(),
            "2023-07-01 14:00:00-04:00"
        );

        Ok(())
    }

    #[test]
    fn test_driver_name_annotation_removed() {
        assert_eq!(normalize_driver_name("bob (route 12)"), "Bob");
        assert_eq!(normalize_driver_name("ALICE  "), "Alice");
        assert_eq!(normalize_visit_name(" mcdonald house"), "Mcdonald House");
    }
}

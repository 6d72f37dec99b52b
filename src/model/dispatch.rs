use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::{fmt, sync::LazyLock};

use crate::error::CleanError;

static DISPATCH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DispatchType {
    #[serde(rename = "FSP")]
    Fsp,
    #[serde(rename = "MOP")]
    Mop,
    Special,
    Other,
}

/// Checked in order. The first keyword found in the file name decides the type.
pub const DISPATCH_TYPE_RULES: [(&str, DispatchType); 3] = [
    ("FSP", DispatchType::Fsp),
    ("MOP", DispatchType::Mop),
    ("Special", DispatchType::Special),
];

impl DispatchType {
    pub fn classify(file_name: &str) -> Self {
        DISPATCH_TYPE_RULES
            .iter()
            .find(|(keyword, _)| file_name.contains(keyword))
            .map(|(_, dispatch_type)| *dispatch_type)
            .unwrap_or(DispatchType::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchType::Fsp => "FSP",
            DispatchType::Mop => "MOP",
            DispatchType::Special => "Special",
            DispatchType::Other => "Other",
        }
    }
}

impl fmt::Display for DispatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a route solution file name says about its dispatch,
/// e.g. `"2023-01-24 FSP Route 1 solution.csv"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub file_name: String,
    pub date: NaiveDate,
    pub dispatch_type: DispatchType,
}

impl Dispatch {
    pub fn from_file_name(file_name: &str) -> Result<Self, CleanError> {
        let date = DISPATCH_DATE_RE
            .find(file_name)
            .ok_or_else(|| CleanError::parse("Dispatch_Date", file_name, "no YYYY-MM-DD date"))?;

        let date = NaiveDate::parse_from_str(date.as_str(), "%Y-%m-%d")
            .map_err(|e| CleanError::parse("Dispatch_Date", date.as_str(), e))?;

        Ok(Dispatch {
            file_name: file_name.to_string(),
            date,
            dispatch_type: DispatchType::classify(file_name),
        })
    }

    /// `"{date} {type}"`
    pub fn name(&self) -> String {
        format!("{} {}", self.date, self.dispatch_type)
    }
}

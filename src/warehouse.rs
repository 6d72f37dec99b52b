//! The warehouse the cleaned files are appended to.

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate};
use std::{fmt, future::Future, path::Path, path::PathBuf, str::FromStr};

use crate::model::TIMESTAMP_FORMAT;

/// `[project.]dataset.table`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableId {
    /// Only kept for logging, the database connection decides where the data goes.
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    /// Quoted `"dataset"."table"` for SQL
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.dataset), quote_ident(&self.table))
    }
}

impl FromStr for TableId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();

        if parts.iter().any(|p| p.trim().is_empty()) {
            bail!("empty part in table id {s:?}");
        }

        match parts.as_slice() {
            [dataset, table] => Ok(TableId {
                project: None,
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            [project, dataset, table] => Ok(TableId {
                project: Some(project.to_string()),
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            _ => bail!("expected [project.]dataset.table, got {s:?}"),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(project) = &self.project {
            write!(f, "{project}.")?;
        }
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Bigint,
    Double,
    Date,
    Timestamptz,
    Text,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Bigint => "BIGINT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Date => "DATE",
            ColumnType::Timestamptz => "TIMESTAMPTZ",
            ColumnType::Text => "TEXT",
        }
    }

    /// Narrowest type that can hold `value`
    pub fn detect(value: &str) -> Self {
        let value = value.trim();

        if value.parse::<i64>().is_ok() {
            ColumnType::Bigint
        } else if value.parse::<f64>().is_ok_and(f64::is_finite) {
            ColumnType::Double
        } else if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
            ColumnType::Date
        } else if DateTime::parse_from_str(value, TIMESTAMP_FORMAT).is_ok()
            || DateTime::parse_from_rfc3339(value).is_ok()
        {
            ColumnType::Timestamptz
        } else {
            ColumnType::Text
        }
    }

    /// Type that can hold values of both `self` and `other`
    pub fn widen(self, other: ColumnType) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (ColumnType::Bigint, ColumnType::Double) | (ColumnType::Double, ColumnType::Bigint) => {
                ColumnType::Double
            }
            _ => ColumnType::Text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Detects one schema for all `paths`. Every file must have the same header.
/// A column that is empty everywhere becomes TEXT.
pub fn detect_schema(paths: &[PathBuf]) -> anyhow::Result<TableSchema> {
    let mut names: Option<Vec<String>> = None;
    let mut types: Vec<Option<ColumnType>> = vec![];

    for path in paths {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("couldn't open {}", path.display()))?;
        let header: Vec<String> = reader.headers()?.iter().map(String::from).collect();

        if names.is_none() {
            types = vec![None; header.len()];
            names = Some(header);
        } else if names.as_ref() != Some(&header) {
            bail!("{} has a different header than the other files", path.display());
        }

        for record in reader.records() {
            let record = record.with_context(|| format!("couldn't read {}", path.display()))?;

            for (value, column_type) in record.iter().zip(types.iter_mut()) {
                if value.trim().is_empty() {
                    continue;
                }
                let detected = ColumnType::detect(value);
                *column_type = Some(column_type.map_or(detected, |t| t.widen(detected)));
            }
        }
    }

    let names = names.context("no files to detect a schema from")?;

    Ok(TableSchema {
        columns: names
            .into_iter()
            .zip(types)
            .map(|(name, column_type)| Column {
                name,
                column_type: column_type.unwrap_or(ColumnType::Text),
            })
            .collect(),
    })
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableStats {
    pub rows: i64,
    pub columns: i64,
}

/// An append-only table store.
pub trait Warehouse {
    /// Creates the dataset and table if they don't exist yet
    fn ensure_table(
        &self,
        table: &TableId,
        schema: &TableSchema,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Appends a CSV with a header row to the table. Returns the number of rows loaded.
    fn append_csv(
        &self,
        table: &TableId,
        schema: &TableSchema,
        path: &Path,
    ) -> impl Future<Output = anyhow::Result<u64>> + Send;

    fn table_stats(&self, table: &TableId) -> impl Future<Output = anyhow::Result<TableStats>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_table_id() -> Result<(), anyhow::Error> {
        let id: TableId = "hut-dashboard.dispatches.route_solutions".parse()?;

        assert_eq!(id.project.as_deref(), Some("hut-dashboard"));
        assert_eq!(id.quoted(), "\"dispatches\".\"route_solutions\"");
        assert_eq!(id.to_string(), "hut-dashboard.dispatches.route_solutions");

        let id: TableId = "dispatches.route_solutions".parse()?;
        assert_eq!(id.project, None);

        assert!("route_solutions".parse::<TableId>().is_err());
        assert!("a..b".parse::<TableId>().is_err());
        assert!("a.b.c.d".parse::<TableId>().is_err());

        Ok(())
    }

    #[test]
    fn test_detect_column_type() {
        assert_eq!(ColumnType::detect("12"), ColumnType::Bigint);
        assert_eq!(ColumnType::detect("12.5"), ColumnType::Double);
        assert_eq!(ColumnType::detect("NaN"), ColumnType::Text);
        assert_eq!(ColumnType::detect("2023-01-24"), ColumnType::Date);
        assert_eq!(
            ColumnType::detect("2023-01-24 09:30:00-05:00"),
            ColumnType::Timestamptz
        );
        assert_eq!(ColumnType::detect("M5V 3L9"), ColumnType::Text);
    }

    #[test]
    fn test_widen() {
        assert_eq!(ColumnType::Bigint.widen(ColumnType::Double), ColumnType::Double);
        assert_eq!(ColumnType::Date.widen(ColumnType::Date), ColumnType::Date);
        assert_eq!(ColumnType::Date.widen(ColumnType::Bigint), ColumnType::Text);
    }

    #[test]
    fn test_detect_schema_across_files() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("Clean_a.csv");
        let second = dir.path().join("Clean_b.csv");
        fs::write(&first, "Stop_Number,Distance_km_,Notes,Dispatch_Date\n1,2,,2023-01-24\n")?;
        fs::write(
            &second,
            "Stop_Number,Distance_km_,Notes,Dispatch_Date\n2,2.5,\"multi\nline\",2023-01-25\n",
        )?;

        let schema = detect_schema(&[first, second])?;
        let types: Vec<ColumnType> = schema.columns.iter().map(|c| c.column_type).collect();

        assert_eq!(
            types,
            vec![
                ColumnType::Bigint,
                ColumnType::Double,
                ColumnType::Text,
                ColumnType::Date
            ]
        );
        assert_eq!(
            schema.column_names().collect::<Vec<_>>(),
            vec!["Stop_Number", "Distance_km_", "Notes", "Dispatch_Date"]
        );

        Ok(())
    }

    #[test]
    fn test_detect_schema_rejects_mismatched_headers() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("Clean_a.csv");
        let second = dir.path().join("Clean_b.csv");
        fs::write(&first, "A,B\n1,2\n")?;
        fs::write(&second, "A,C\n1,2\n")?;

        assert!(detect_schema(&[first, second]).is_err());

        Ok(())
    }
}

//! Responsible for appending cleaned route solutions to the warehouse table

use anyhow::{Context, Error};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{
    config::ImportConfig,
    dal::PgWarehouse,
    warehouse::{TableId, TableStats, Warehouse, detect_schema},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub files: Vec<PathBuf>,
    pub rows_appended: u64,
    /// Table totals after loading. `None` when there was nothing to load.
    pub stats: Option<TableStats>,
}

/// All CSV files directly inside `input_path`
pub fn get_csv_files(input_path: &Path) -> Result<Vec<PathBuf>, Error> {
    let pattern = glob::Pattern::escape(&input_path.to_string_lossy()) + "/*.csv";

    let files = glob::glob(&pattern)
        .with_context(|| format!("invalid csv pattern for {}", input_path.display()))?
        .filter_ok(|p| p.is_file())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(files)
}

/// Appends every CSV in `input_path` to `table`, one file at a time.
/// A failed upload stops the import; files appended before it stay in the table.
#[tracing::instrument(err, skip(warehouse), fields(table = %table))]
pub async fn load_files<W: Warehouse>(
    warehouse: &W,
    input_path: &Path,
    table: &TableId,
) -> Result<LoadSummary, Error> {
    let files = get_csv_files(input_path)?;

    if files.is_empty() {
        warn!("no csv files in {}", input_path.display());
        return Ok(LoadSummary {
            files,
            rows_appended: 0,
            stats: None,
        });
    }

    let schema = detect_schema(&files)?;
    info!(
        "detected schema {}",
        schema
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.column_type.sql()))
            .join(", ")
    );

    warehouse.ensure_table(table, &schema).await?;

    let mut rows_appended = 0;
    for file in &files {
        let rows = warehouse
            .append_csv(table, &schema, file)
            .await
            .with_context(|| format!("couldn't load {}", file.display()))?;

        info!(file = %file.display(), rows, "appended");
        rows_appended += rows;
    }

    let stats = warehouse.table_stats(table).await?;

    Ok(LoadSummary {
        files,
        rows_appended,
        stats: Some(stats),
    })
}

/// Connects to the warehouse, loads the folder and prints the table totals.
pub async fn run(config: &ImportConfig) -> Result<LoadSummary, Error> {
    let pool = sqlx::PgPool::connect(&config.database_url)
        .await
        .context("couldn't connect to the warehouse")?;
    let warehouse = PgWarehouse::new(pool);

    let summary = load_files(&warehouse, &config.input_path, &config.table).await?;
    info!(
        files = summary.files.len(),
        rows = summary.rows_appended,
        "import finished"
    );

    match summary.stats {
        Some(stats) => println!(
            "Loaded {} rows and {} columns to {}",
            stats.rows, stats.columns, config.table
        ),
        None => println!("No CSV files found in {}", config.input_path.display()),
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{ColumnType, TableSchema};
    use anyhow::bail;
    use std::{fs, sync::Mutex};

    #[derive(Default)]
    struct FakeWarehouse {
        schemas: Mutex<Vec<TableSchema>>,
        appended: Mutex<Vec<(PathBuf, u64)>>,
        fail_on: Option<String>,
    }

    impl Warehouse for FakeWarehouse {
        async fn ensure_table(&self, _table: &TableId, schema: &TableSchema) -> anyhow::Result<()> {
            self.schemas.lock().unwrap().push(schema.clone());
            Ok(())
        }

        async fn append_csv(
            &self,
            _table: &TableId,
            _schema: &TableSchema,
            path: &Path,
        ) -> anyhow::Result<u64> {
            if let Some(fail_on) = &self.fail_on
                && path.ends_with(fail_on)
            {
                bail!("load job failed");
            }

            let rows = csv::Reader::from_path(path)?.records().count() as u64;
            self.appended.lock().unwrap().push((path.to_path_buf(), rows));
            Ok(rows)
        }

        async fn table_stats(&self, _table: &TableId) -> anyhow::Result<TableStats> {
            let rows = self.appended.lock().unwrap().iter().map(|(_, r)| *r as i64).sum();
            let columns = self
                .schemas
                .lock()
                .unwrap()
                .first()
                .map_or(0, |s| s.columns.len() as i64);
            Ok(TableStats { rows, columns })
        }
    }

    fn table() -> TableId {
        TableId {
            project: Some("hut-dashboard".to_string()),
            dataset: "dispatches".to_string(),
            table: "route_solutions".to_string(),
        }
    }

    #[tokio::test]
    async fn test_appends_every_csv_once() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("Clean_a.csv"),
            "Stop_Number,Driver_Notes\n1,\"ring\ntwice\"\n2,\n",
        )?;
        fs::write(dir.path().join("Clean_b.csv"), "Stop_Number,Driver_Notes\n3,hi\n")?;
        fs::write(dir.path().join("notes.txt"), "not a csv")?;

        let warehouse = FakeWarehouse::default();
        let summary = load_files(&warehouse, dir.path(), &table()).await?;

        assert_eq!(summary.files.len(), 2);
        assert_eq!(summary.rows_appended, 3);
        assert_eq!(summary.stats, Some(TableStats { rows: 3, columns: 2 }));

        let schemas = warehouse.schemas.lock().unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].columns[0].column_type, ColumnType::Bigint);
        assert_eq!(schemas[0].columns[1].column_type, ColumnType::Text);
        assert_eq!(warehouse.appended.lock().unwrap().len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_empty_folder_loads_nothing() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let warehouse = FakeWarehouse::default();

        let summary = load_files(&warehouse, dir.path(), &table()).await?;

        assert!(summary.files.is_empty());
        assert_eq!(summary.stats, None);
        assert!(warehouse.schemas.lock().unwrap().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_upload_stops_the_import() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("Clean_a.csv"), "A\n1\n")?;
        fs::write(dir.path().join("Clean_b.csv"), "A\n2\n")?;

        let warehouse = FakeWarehouse {
            fail_on: Some("Clean_b.csv".to_string()),
            ..FakeWarehouse::default()
        };

        let err = load_files(&warehouse, dir.path(), &table())
            .await
            .expect_err("upload should fail");

        assert!(format!("{err:#}").contains("Clean_b.csv"));

        Ok(())
    }
}

use anyhow::{Context, Error};
use sqlx::{Pool, Postgres, QueryBuilder, postgres::PgPoolCopyExt, query, query_scalar};
use std::path::Path;
use tracing::{Instrument, info_span};

use crate::warehouse::{TableId, TableSchema, TableStats, Warehouse, quote_ident};

/// Route solutions stored in Postgres. A dataset is a Postgres schema.
#[derive(Clone, Debug)]
pub struct PgWarehouse {
    pool: Pool<Postgres>,
}

impl PgWarehouse {
    pub fn new(pool: Pool<Postgres>) -> Self {
        PgWarehouse { pool }
    }
}

impl Warehouse for PgWarehouse {
    #[tracing::instrument(err, skip(self, schema), fields(table = %table))]
    async fn ensure_table(&self, table: &TableId, schema: &TableSchema) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&table.dataset));
        query(&create_schema).execute(&mut *tx).await?;

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("CREATE TABLE IF NOT EXISTS {} (", table.quoted()));
        let mut columns = query_builder.separated(", ");
        for column in &schema.columns {
            columns.push(format!(
                "{} {}",
                quote_ident(&column.name),
                column.column_type.sql()
            ));
        }
        query_builder.push(")");

        query_builder
            .build()
            .execute(&mut *tx)
            .instrument(info_span!("Creating table"))
            .await?;

        tx.commit().await?;

        Ok(())
    }

    #[tracing::instrument(err, skip(self, schema), fields(table = %table, path = %path.display()))]
    async fn append_csv(
        &self,
        table: &TableId,
        schema: &TableSchema,
        path: &Path,
    ) -> Result<u64, Error> {
        let columns = schema.column_names().map(quote_ident).collect::<Vec<_>>().join(", ");
        let statement = format!(
            "COPY {} ({columns}) FROM STDIN WITH (FORMAT csv, HEADER true)",
            table.quoted()
        );

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("couldn't read {}", path.display()))?;

        let mut copy = self.pool.copy_in_raw(&statement).await?;

        let sent = copy
            .send(data)
            .instrument(info_span!("Uploading file"))
            .await
            .map(|_| ());
        if let Err(e) = sent {
            copy.abort(e.to_string()).await?;
            return Err(e.into());
        }

        let rows = copy.finish().await?;

        Ok(rows)
    }

    #[tracing::instrument(err, skip(self), fields(table = %table))]
    async fn table_stats(&self, table: &TableId) -> Result<TableStats, Error> {
        let rows: i64 = query_scalar(&format!("SELECT COUNT(*) FROM {}", table.quoted()))
            .fetch_one(&self.pool)
            .await?;

        let columns: i64 = query_scalar(
            "SELECT COUNT(*) FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2",
        )
        .bind(&table.dataset)
        .bind(&table.table)
        .fetch_one(&self.pool)
        .await?;

        Ok(TableStats { rows, columns })
    }
}

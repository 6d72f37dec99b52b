use anyhow::Error;
use sqlx::{Pool, Postgres, query_as};
use tracing::{Instrument, info_span};

use crate::{
    jobs::dashboard::{DashboardStore, DispatchFigures, FamilyFigures, VolunteerFigures},
    warehouse::TableId,
};

/// Dashboard figures aggregated straight from the route solutions table.
/// Columns are cast through text since their types come from schema detection.
#[derive(Clone, Debug)]
pub struct PgDashboardStore {
    pool: Pool<Postgres>,
    table: TableId,
}

impl PgDashboardStore {
    pub fn new(pool: Pool<Postgres>, table: TableId) -> Self {
        PgDashboardStore { pool, table }
    }
}

impl DashboardStore for PgDashboardStore {
    #[tracing::instrument(err, skip(self))]
    async fn dispatch_figures(&self) -> Result<Vec<DispatchFigures>, Error> {
        let sql = format!(
            r#"SELECT
            "Dispatch_Name"::text AS dispatch_name,
            COUNT(*) AS stops,
            COUNT(*) FILTER (WHERE "Stop_Completion"::text = '1') AS completed_stops,
            COUNT(*) FILTER (WHERE "Stop_Completion"::text = '0') AS skipped_stops,
            AVG(NULLIF("Stop_Completion"::text, '')::double precision) AS completion_rate,
            SUM(NULLIF("Distance_km_"::text, '')::double precision) AS distance_km
            FROM {}
            GROUP BY 1
            ORDER BY 1"#,
            self.table.quoted()
        );

        let figures = query_as::<_, DispatchFigures>(&sql)
            .fetch_all(&self.pool)
            .instrument(info_span!("Aggregating dispatches"))
            .await?;

        Ok(figures)
    }

    #[tracing::instrument(err, skip(self))]
    async fn family_figures(&self) -> Result<Vec<FamilyFigures>, Error> {
        let sql = format!(
            r#"SELECT
            "FSA"::text AS fsa,
            COUNT(DISTINCT "FamilyID") AS families,
            COUNT(*) AS stops
            FROM {}
            WHERE "FSA" IS NOT NULL
            GROUP BY 1
            ORDER BY families DESC, fsa"#,
            self.table.quoted()
        );

        let figures = query_as::<_, FamilyFigures>(&sql)
            .fetch_all(&self.pool)
            .instrument(info_span!("Aggregating families"))
            .await?;

        Ok(figures)
    }

    #[tracing::instrument(err, skip(self))]
    async fn volunteer_figures(&self) -> Result<Vec<VolunteerFigures>, Error> {
        let sql = format!(
            r#"SELECT
            "Driver_Name"::text AS driver_name,
            COUNT(DISTINCT "Dispatch_Name") AS dispatches,
            COUNT(*) AS stops,
            AVG(NULLIF("Duration_mins"::text, '')::double precision) AS avg_minutes_between_stops
            FROM {}
            WHERE "Driver_Name" IS NOT NULL
            GROUP BY 1
            ORDER BY stops DESC, driver_name"#,
            self.table.quoted()
        );

        let figures = query_as::<_, VolunteerFigures>(&sql)
            .fetch_all(&self.pool)
            .instrument(info_span!("Aggregating volunteers"))
            .await?;

        Ok(figures)
    }
}

//! Command line and environment configuration, built once in `main` and handed to each job.

use anyhow::{Context, anyhow};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};

use crate::{postal_code::PostalPatterns, warehouse::TableId};

pub const DEFAULT_TABLE: &str = "hut-dashboard.dispatches.route_solutions";
pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::US::Eastern;

#[derive(Debug, Parser)]
#[command(name = "hut_pipeline", version, about = "HUT route solution pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Clean Routific solution files for the HUT database and dashboard
    Clean(CleanArgs),
    /// Append every cleaned CSV in a folder to the warehouse table
    Import(ImportArgs),
    /// Clean, then import if cleaning went well
    Pipeline(PipelineArgs),
    /// Serve dashboard figures from the warehouse table
    Dashboard(DashboardArgs),
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Raw data folder, e.g. "data/raw"
    pub input_path: PathBuf,
    /// Clean data folder, e.g. "data/clean"
    pub output_path: PathBuf,
    /// Most failed files still treated as a successful run. Unlimited when unset.
    #[arg(long)]
    pub max_failures: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Folder with the CSVs to upload, e.g. "data/clean"
    pub input_path: PathBuf,
    /// `[project.]dataset.table`, defaults to `WAREHOUSE_TABLE`
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Debug, Args)]
pub struct PipelineArgs {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[arg(long)]
    pub max_failures: Option<usize>,
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    #[arg(long, default_value = "127.0.0.1:8050")]
    pub bind: SocketAddr,
    #[arg(long)]
    pub table: Option<String>,
}

/// Settings read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Environment {
    pub database_url: Option<String>,
    pub warehouse_table: String,
    pub dispatch_time_zone: Tz,
    pub otlp_endpoint: Option<String>,
    pub log_dir: PathBuf,
}

impl Environment {
    pub fn from_env() -> anyhow::Result<Self> {
        let dispatch_time_zone = match dotenvy::var("DISPATCH_TIME_ZONE") {
            Ok(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow!("invalid DISPATCH_TIME_ZONE {name:?}: {e}"))?,
            Err(_) => DEFAULT_TIME_ZONE,
        };

        Ok(Environment {
            database_url: dotenvy::var("DATABASE_URL").ok(),
            warehouse_table: dotenvy::var("WAREHOUSE_TABLE")
                .unwrap_or_else(|_| DEFAULT_TABLE.to_string()),
            dispatch_time_zone,
            otlp_endpoint: dotenvy::var("OTLP_ENDPOINT").ok(),
            log_dir: dotenvy::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./logs")),
        })
    }

    fn table(&self, arg: Option<String>) -> anyhow::Result<TableId> {
        let table = arg.unwrap_or_else(|| self.warehouse_table.clone());
        table.parse().with_context(|| format!("invalid table {table:?}"))
    }

    fn database_url(&self) -> anyhow::Result<String> {
        self.database_url
            .clone()
            .context("DATABASE_URL must be set")
    }
}

#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub max_failures: Option<usize>,
    pub dispatch_time_zone: Tz,
    pub postal_patterns: PostalPatterns,
}

impl CleanConfig {
    pub fn new(args: CleanArgs, env: &Environment) -> Self {
        CleanConfig {
            input_path: args.input_path,
            output_path: args.output_path,
            max_failures: args.max_failures,
            dispatch_time_zone: env.dispatch_time_zone,
            postal_patterns: PostalPatterns::canada(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub input_path: PathBuf,
    pub table: TableId,
    pub database_url: String,
}

impl ImportConfig {
    pub fn new(args: ImportArgs, env: &Environment) -> anyhow::Result<Self> {
        Ok(ImportConfig {
            input_path: args.input_path,
            table: env.table(args.table)?,
            database_url: env.database_url()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub max_failures: Option<usize>,
    pub table: TableId,
}

impl PipelineConfig {
    pub fn new(args: PipelineArgs, env: &Environment) -> anyhow::Result<Self> {
        Ok(PipelineConfig {
            input_path: args.input_path,
            output_path: args.output_path,
            max_failures: args.max_failures,
            table: env.table(args.table)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub bind: SocketAddr,
    pub table: TableId,
    pub database_url: String,
}

impl DashboardConfig {
    pub fn new(args: DashboardArgs, env: &Environment) -> anyhow::Result<Self> {
        Ok(DashboardConfig {
            bind: args.bind,
            table: env.table(args.table)?,
            database_url: env.database_url()?,
        })
    }
}

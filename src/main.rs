use anyhow::Result;
use clap::Parser;
use config::{
    CleanConfig, Cli, Command, DashboardConfig, Environment, ImportConfig, PipelineConfig,
};
use dotenvy::dotenv;
use jobs::{clean_data, dashboard, import_data, pipeline};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

mod config;
mod dal;
mod error;
mod jobs;
mod model;
mod postal_code;
mod utils;
mod warehouse;

const SERVICE_NAME: &str = "hut_pipeline";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<ExitCode> {
    _ = dotenv();
    let cli = Cli::parse();
    let env = Environment::from_env()?;

    let telemetry = init_tracing(&env)?;

    let result = run(cli.command, &env).await;
    if let Err(e) = &result {
        error!("{e:?}");
    }

    telemetry.shutdown();

    result
}

async fn run(command: Command, env: &Environment) -> Result<ExitCode> {
    match command {
        Command::Clean(args) => {
            let config = CleanConfig::new(args, env);
            let max_failures = config.max_failures;

            let summary =
                tokio::task::spawn_blocking(move || clean_data::run(&config)).await??;

            if summary.passes(max_failures) {
                Ok(ExitCode::SUCCESS)
            } else {
                info!(
                    succeeded = summary.succeeded.len(),
                    failed = summary.failed.len(),
                    "cleaning didn't pass, exiting with failure"
                );
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Import(args) => {
            let config = ImportConfig::new(args, env)?;
            import_data::run(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Pipeline(args) => {
            let config = PipelineConfig::new(args, env)?;
            match pipeline::run(&config).await? {
                pipeline::PipelineOutcome::Loaded => Ok(ExitCode::SUCCESS),
                pipeline::PipelineOutcome::CleanFailed => Ok(ExitCode::FAILURE),
            }
        }
        Command::Dashboard(args) => {
            let config = DashboardConfig::new(args, env)?;
            dashboard::serve(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Keeps the log writer and span exporter alive until shutdown.
struct Telemetry {
    provider: Option<SdkTracerProvider>,
    _guard: WorkerGuard,
}

impl Telemetry {
    fn shutdown(self) {
        if let Some(provider) = self.provider
            && let Err(e) = provider.shutdown()
        {
            eprintln!("couldn't flush spans: {e}");
        }
    }
}

fn init_tracing(env: &Environment) -> Result<Telemetry> {
    let provider = env
        .otlp_endpoint
        .as_deref()
        .map(build_tracer_provider)
        .transpose()?;

    let telemetry_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let appender = tracing_appender::rolling::daily(&env.log_dir, "hut_pipeline.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(appender);

    // A layer that logs events to rolling files.
    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .pretty();

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    Registry::default()
        .with(telemetry_layer)
        .with(file_log)
        .with(stderr_log)
        .with(env_filter)
        .init();

    Ok(Telemetry {
        provider,
        _guard: guard,
    })
}

fn build_tracer_provider(endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_timeout(Duration::from_millis(1000))
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build())
}

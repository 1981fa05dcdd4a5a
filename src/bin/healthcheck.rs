use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use healthcheck_publisher::config::HealthCheckConfig;
use healthcheck_publisher::driver::{self, RetryPolicy};
use healthcheck_publisher::prober::HttpProber;
use healthcheck_publisher::publisher::kafka::KafkaPublisher;
use healthcheck_publisher::version::VERSION;
use healthcheck_publisher::HEALTHCHECK_TOPIC;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Probe an endpoint and publish the result to Kafka", long_about = None)]
struct Args {
    /// Optional TOML file; environment variables override its values
    #[arg(short, long)]
    config: Option<String>,
}

fn log_file_appender(dir: &str) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("healthcheck.log")
        .build(dir)
}

fn init_logging(log_dir: Option<&str>) -> Result<(), InitError> {
    // Operator-facing, human-readable output on stderr
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    // Optional JSON file, daily rotation
    let file_layer = match log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_writer(log_file_appender(dir)?)
                .with_ansi(false)
                .json()
                .boxed(),
        ),
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match HealthCheckConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet; the log directory comes from this config.
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = init_logging(config.log_dir.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::from(1);
    }
    info!(version = VERSION, target = %config.target_url, "Starting health check.");
    info!(config = ?config, "Loaded configuration.");

    let prober = match HttpProber::new(&config) {
        Ok(prober) => prober,
        Err(e) => {
            error!(error = %e, "Failed to initialize prober.");
            return ExitCode::from(1);
        }
    };
    let publisher = KafkaPublisher::new(&config.kafka);

    match driver::run(&prober, &publisher, RetryPolicy::from_config(&config), HEALTHCHECK_TOPIC).await {
        Ok(outcome) => {
            info!(attempts = outcome.attempts, "Health check completed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Health check run failed.");
            ExitCode::from(e.exit_code())
        }
    }
}

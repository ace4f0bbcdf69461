use std::process::ExitCode;

use meterflow_infra::config::Config;

fn main() -> ExitCode {
    meterflow_observability::init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match meterflow_worker::run_ingest(&config) {
        Ok(report) => {
            tracing::info!(
                devices = report.devices,
                points = report.points_written,
                skipped_rows = report.rows_skipped,
                dropped_values = report.values_dropped,
                "ingestion complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "ingestion failed");
            ExitCode::FAILURE
        }
    }
}

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

    let stop = match meterflow_worker::ctrl_c_stop() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "cannot install ctrl-c handler");
            return ExitCode::FAILURE;
        }
    };

    match meterflow_worker::run_forecast(&config, &stop) {
        Ok(summary) => {
            tracing::info!(ticks = summary.ticks, progressed = summary.progressed, "forecaster stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "forecaster failed");
            ExitCode::FAILURE
        }
    }
}

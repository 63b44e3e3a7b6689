//! Watchstat CLI - drive a simulated watchface health session
//!
//! Commands:
//! - run: toggle health on for a scenario and tick the session forward
//! - baselines: show today's value and baseline for every module
//! - doctor: diagnose permissions, availability and averaging paths

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Duration;
use serde::Serialize;

use watchface_health::averaging::{AveragingEngine, BaselineSource};
use watchface_health::collectors::MetricDescriptor;
use watchface_health::sim::SimulatedPlatform;
use watchface_health::sleep::SleepPhase;
use watchface_health::types::{AccessMask, Metric, MetricKind};
use watchface_health::{Clock, HealthError, HealthService, HealthSession, HEALTH_VERSION};

/// Watchstat - simulate watchface health aggregation
#[derive(Parser)]
#[command(name = "watchstat")]
#[command(version = HEALTH_VERSION)]
#[command(about = "Run watchface health aggregation against a simulated platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Toggle health on and tick the session forward
    Run {
        /// Scenario file path (use - for stdin)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Number of ticks to run
        #[arg(long, default_value = "1")]
        ticks: u32,

        /// Minutes the clock advances per tick (1 to 1440)
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(i64).range(1..=1440))]
        tick_minutes: i64,

        /// Treat the toggle as a settings change (collect immediately)
        #[arg(long)]
        from_config: bool,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Show current value, baseline and trend for each module
    Baselines {
        /// Scenario file path (use - for stdin)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Diagnose permissions, metric availability and averaging paths
    Doctor {
        /// Scenario file path (use - for stdin)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), WatchstatError> {
    match cli.command {
        Commands::Run {
            scenario,
            ticks,
            tick_minutes,
            from_config,
            pretty,
        } => cmd_run(&scenario, ticks, tick_minutes, from_config, pretty),

        Commands::Baselines { scenario, pretty } => cmd_baselines(&scenario, pretty),

        Commands::Doctor { scenario, json } => cmd_doctor(&scenario, json),
    }
}

fn load_scenario(path: &Path) -> Result<SimulatedPlatform, WatchstatError> {
    let data = if path.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(WatchstatError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(path)?
    };
    Ok(SimulatedPlatform::from_json(&data)?)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, WatchstatError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn cmd_run(
    scenario: &Path,
    ticks: u32,
    tick_minutes: i64,
    from_config: bool,
    pretty: bool,
) -> Result<(), WatchstatError> {
    let platform = load_scenario(scenario)?;
    let mut session = HealthSession::new(platform);

    session.init_sleep_state();
    session.on_master_toggle_changed(from_config);

    for _ in 0..ticks {
        session
            .platform_mut()
            .advance(Duration::minutes(tick_minutes))?;
        session.refresh_sleep_visibility();
        session.run_if_pending();
    }

    let health_enabled = session.is_health_enabled();
    let passes = session.pass_count();
    let sleep_panel_visible = session.is_sleep_panel_visible();
    let sleep_phase = session.sleep_phase();
    let platform = session.teardown();

    let report = RunReport {
        health_enabled,
        passes,
        sleep_panel_visible,
        sleep_phase,
        ended_at: platform.now.to_rfc3339(),
        fields: platform.screen.fields.clone(),
        behind: platform.screen.behind.clone(),
        redraws: platform.screen.redraws,
        stored: platform.storage.clone(),
    };

    println!("{}", to_json(&report, pretty)?);
    Ok(())
}

fn cmd_baselines(scenario: &Path, pretty: bool) -> Result<(), WatchstatError> {
    let platform = load_scenario(scenario)?;
    let mut session = HealthSession::new(platform);
    session.on_master_toggle_changed(true);

    if !session.is_health_enabled() {
        return Err(WatchstatError::HealthDisabled);
    }

    let today = session.platform().today();
    let mut rows = Vec::new();
    for kind in MetricKind::ALL {
        let descriptor = MetricDescriptor::for_kind(kind);
        let source = if AveragingEngine::native_available(session.platform(), &descriptor.window(today))
        {
            BaselineSource::Native
        } else {
            BaselineSource::Manual
        };
        let row = match session.collect(kind) {
            Some(sample) => BaselineRow {
                module: kind,
                available: true,
                current: Some(sample.current),
                baseline: Some(sample.baseline),
                source,
                behind: sample.trend,
                display_text: sample.display_text,
            },
            None => BaselineRow {
                module: kind,
                available: false,
                current: None,
                baseline: None,
                source,
                behind: false,
                display_text: String::new(),
            },
        };
        rows.push(row);
    }

    println!("{}", to_json(&rows, pretty)?);
    Ok(())
}

fn cmd_doctor(scenario: &Path, json: bool) -> Result<(), WatchstatError> {
    let platform = load_scenario(scenario)?;
    let today = platform.today();
    let mut checks = Vec::new();

    let permission = platform.metric_accessible(Metric::StepCount, today);
    checks.push(if permission.contains(AccessMask::NO_PERMISSION) {
        DoctorCheck {
            name: "permission".to_string(),
            status: CheckStatus::Error,
            message: "Health permission not granted".to_string(),
        }
    } else {
        DoctorCheck {
            name: "permission".to_string(),
            status: CheckStatus::Ok,
            message: "Health permission granted".to_string(),
        }
    });

    for kind in MetricKind::ALL {
        let descriptor = MetricDescriptor::for_kind(kind);
        let enabled = platform.config.is_enabled(kind);
        let check = if !descriptor.is_available(&platform, today) {
            DoctorCheck {
                name: kind.as_str().to_string(),
                status: if enabled {
                    CheckStatus::Warning
                } else {
                    CheckStatus::Ok
                },
                message: "Metric unavailable on this platform; display text is left untouched"
                    .to_string(),
            }
        } else {
            let path = if AveragingEngine::native_available(&platform, &descriptor.window(today)) {
                "native average"
            } else {
                "manual average"
            };
            DoctorCheck {
                name: kind.as_str().to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Available ({}), baseline via {}",
                    if enabled { "enabled" } else { "disabled" },
                    path
                ),
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass scenario files by path)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--scenario - is available)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: HEALTH_VERSION.to_string(),
        clock: platform.now.to_rfc3339(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Watchstat Doctor Report");
        println!("=======================");
        println!("Version: {}", report.version);
        println!("Clock:   {}", report.clock);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(WatchstatError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum WatchstatError {
    Io(io::Error),
    Scenario(HealthError),
    Json(serde_json::Error),
    InteractiveStdin,
    HealthDisabled,
    DoctorFailed,
}

impl From<io::Error> for WatchstatError {
    fn from(e: io::Error) -> Self {
        WatchstatError::Io(e)
    }
}

impl From<HealthError> for WatchstatError {
    fn from(e: HealthError) -> Self {
        WatchstatError::Scenario(e)
    }
}

impl From<serde_json::Error> for WatchstatError {
    fn from(e: serde_json::Error) -> Self {
        WatchstatError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<WatchstatError> for CliError {
    fn from(e: WatchstatError) -> Self {
        match e {
            WatchstatError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            WatchstatError::Scenario(e) => CliError {
                code: "SCENARIO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the scenario against 'watchstat doctor'".to_string()),
            },
            WatchstatError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            WatchstatError::InteractiveStdin => CliError {
                code: "INTERACTIVE_STDIN".to_string(),
                message: "Refusing to read a scenario from a terminal".to_string(),
                hint: Some("Pipe the scenario in or pass a file path".to_string()),
            },
            WatchstatError::HealthDisabled => CliError {
                code: "HEALTH_DISABLED".to_string(),
                message: "Health tracking is disabled for this scenario".to_string(),
                hint: Some(
                    "Enable a module or the health toggle, and grant step permission".to_string(),
                ),
            },
            WatchstatError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct RunReport {
    health_enabled: bool,
    passes: usize,
    sleep_panel_visible: bool,
    sleep_phase: SleepPhase,
    ended_at: String,
    fields: BTreeMap<MetricKind, String>,
    behind: BTreeMap<MetricKind, bool>,
    redraws: usize,
    stored: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct BaselineRow {
    module: MetricKind,
    available: bool,
    current: Option<i64>,
    baseline: Option<i64>,
    source: BaselineSource,
    behind: bool,
    display_text: String,
}

#[derive(Serialize)]
struct DoctorReport {
    version: String,
    clock: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_minutes_is_bounded() {
        let parse = |minutes: &str| {
            Cli::try_parse_from([
                "watchstat",
                "run",
                "--scenario",
                "demos/scenario.json",
                "--tick-minutes",
                minutes,
            ])
        };

        assert!(parse("0").is_err());
        assert!(parse("1441").is_err());
        assert!(parse("9223372036854775807").is_err());
        match parse("1440").map(|cli| cli.command) {
            Ok(Commands::Run { tick_minutes, .. }) => assert_eq!(tick_minutes, 1440),
            _ => panic!("expected run command"),
        }
    }
}

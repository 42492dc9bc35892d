//! Walk an update session through a scripted scenario against a simulated
//! update service and print what the host would see.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use inapp_update::harness::FakeUpdateOracle;
use inapp_update::{
    AllowedModes, AppUpdateInfo, CompletionTrigger, ConfirmationBackend, ConfirmationContent,
    ErrorCode, FlowOutcome, FlowStartError, InstallState, InstallStatus, SessionHandle,
    StatusSnapshot, UpdateAvailability, UpdateConfig, UpdateError, UpdateMode, UpdateObserver,
    UpdateSession, UpdateStatus,
};

/// Simulated latency of the update service.
const SERVICE_LATENCY: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "inapp-update-demo", version, about = "Run an in-app update scenario")]
struct Cli {
    /// Scenario to run
    #[arg(long, value_enum, default_value_t = Scenario::Flexible)]
    scenario: Scenario,

    /// Requested update mode (overrides the config file)
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Let the host handle the downloaded prompt instead of the built-in one
    #[arg(long)]
    custom_notification: bool,

    /// Session configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Debug output
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Service reports no update
    NoUpdate,
    /// Flexible download, confirmation, install
    Flexible,
    /// Blocking immediate flow, accepted by the user
    Immediate,
    /// Only immediate allowed; flexible request falls back
    Fallback,
    /// Interrupted immediate flow restarted on every resume
    ImmediateResume,
    /// Downloaded flexible update found on resume
    StalledDownload,
    /// Service refuses to start the flow
    StartFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Flexible,
    Immediate,
}

impl From<ModeArg> for UpdateMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Flexible => UpdateMode::Flexible,
            ModeArg::Immediate => UpdateMode::Immediate,
        }
    }
}

impl Scenario {
    fn update_info(self) -> AppUpdateInfo {
        match self {
            Self::NoUpdate => AppUpdateInfo::not_available(),
            Self::Flexible | Self::Immediate | Self::StartFailure => {
                AppUpdateInfo::available(42, AllowedModes::all())
            }
            Self::Fallback => AppUpdateInfo::available(42, AllowedModes::only(UpdateMode::Immediate)),
            Self::ImmediateResume => AppUpdateInfo {
                availability: UpdateAvailability::DeveloperTriggeredInProgress,
                ..AppUpdateInfo::available(42, AllowedModes::all())
            },
            Self::StalledDownload => AppUpdateInfo {
                install_status: InstallStatus::Downloaded,
                ..AppUpdateInfo::available(42, AllowedModes::all())
            },
        }
    }
}

/// Prints observer callbacks. In custom-notification mode it also plays the
/// host and completes a downloaded update itself.
struct ConsoleObserver {
    complete_on_downloaded: Option<SessionHandle>,
}

impl UpdateObserver for ConsoleObserver {
    fn on_update_error(&self, code: ErrorCode, error: &UpdateError) {
        println!("error   {} ({})", code.id(), error);
    }

    fn on_status_update(&self, status: UpdateStatus, snapshot: &StatusSnapshot) {
        match snapshot.download_progress() {
            Some(progress) if status == UpdateStatus::Downloading => {
                println!("status  {} ({:.0}%)", status, progress * 100.0)
            }
            _ => println!("status  {} (id {})", status, status.id()),
        }

        if status == UpdateStatus::Downloaded {
            if let Some(handle) = &self.complete_on_downloaded {
                println!("host    custom prompt accepted");
                if let Err(e) = handle.complete_update() {
                    warn!("Could not request completion: {}", e);
                }
            }
        }
    }
}

/// Prints the prompt and accepts it after a short pause.
#[derive(Default)]
struct ConsoleConfirmationBackend {
    shown: Arc<AtomicBool>,
}

impl ConfirmationBackend for ConsoleConfirmationBackend {
    fn show(
        &self,
        content: &ConfirmationContent,
        on_action: CompletionTrigger,
    ) -> Result<(), UpdateError> {
        println!("prompt  {} [{}]", content.message, content.action);
        self.shown.store(true, Ordering::SeqCst);

        let shown = Arc::clone(&self.shown);
        tokio::spawn(async move {
            sleep(SERVICE_LATENCY).await;
            if shown.swap(false, Ordering::SeqCst) {
                println!("user    pressed action");
                on_action.trigger();
            }
        });
        Ok(())
    }

    fn dismiss(&self) {
        self.shown.store(false, Ordering::SeqCst);
    }

    fn is_shown(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = match &cli.config {
        Some(path) => UpdateConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => UpdateConfig::default(),
    };
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    if cli.scenario == Scenario::Immediate {
        config.mode = UpdateMode::Immediate;
    }
    if cli.custom_notification {
        config.confirmation.enabled = false;
    }
    // Scenarios drive checks explicitly.
    config.check_on_create = false;

    info!("Running scenario {:?} ({} mode)", cli.scenario, config.mode);
    run_scenario(cli.scenario, config).await
}

async fn run_scenario(scenario: Scenario, config: UpdateConfig) -> anyhow::Result<()> {
    let request_code = config.request_code;
    let custom_notification = !config.confirmation.enabled;

    let oracle = Arc::new(FakeUpdateOracle::new(scenario.update_info()));
    oracle.set_query_delay(Some(SERVICE_LATENCY));
    if scenario == Scenario::StartFailure {
        oracle.set_start_flow_error(Some(FlowStartError::HostUnavailable(
            "no foreground window".to_string(),
        )));
    }

    let mut session = UpdateSession::new(config, oracle.clone())
        .with_confirmation_backend(Box::<ConsoleConfirmationBackend>::default());
    let handle = session.handle();
    session.set_observer(Some(Arc::new(ConsoleObserver {
        complete_on_downloaded: custom_notification.then(|| handle.clone()),
    })));
    session.attach();
    let task = tokio::spawn(session.run());

    let settle = SERVICE_LATENCY * 2;
    match scenario {
        Scenario::NoUpdate | Scenario::Fallback | Scenario::StartFailure => {
            handle.check_for_app_update()?;
            sleep(settle).await;
        }
        Scenario::Immediate => {
            handle.check_for_app_update()?;
            sleep(settle).await;
            println!("user    accepted immediate update");
            handle.deliver_flow_result(request_code, FlowOutcome::Accepted)?;
        }
        Scenario::Flexible => {
            handle.check_for_app_update()?;
            sleep(settle).await;
            handle.deliver_flow_result(request_code, FlowOutcome::Accepted)?;

            oracle.push_install_state(InstallState::new(InstallStatus::Pending));
            for step in 1..=4u64 {
                sleep(SERVICE_LATENCY / 2).await;
                oracle.push_install_state(InstallState::downloading(step * 25, 100));
            }
            oracle.push_install_state(InstallState::new(InstallStatus::Downloaded));
            sleep(settle).await;

            if oracle.complete_calls() > 0 {
                oracle.push_install_state(InstallState::new(InstallStatus::Installing));
                oracle.push_install_state(InstallState::new(InstallStatus::Installed));
            }
        }
        Scenario::ImmediateResume | Scenario::StalledDownload => {
            for _ in 0..2 {
                handle.on_foreground()?;
                sleep(settle).await;
            }
        }
    }

    sleep(SERVICE_LATENCY).await;
    handle.on_teardown()?;
    task.await.context("update session task failed")?;

    println!(
        "summary flows started: {:?}, completions: {}",
        oracle.started_flows(),
        oracle.complete_calls()
    );
    Ok(())
}

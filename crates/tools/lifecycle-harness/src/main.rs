//! CLI harness for exercising the security core without a device
//!
//! Scenarios run against scripted providers:
//! - Background timeout and lock screen
//! - Enrollment change detection across restarts
//! - Fail-closed gated storage
//! - Device trust heuristics
//! - Lifecycle soak with duplicate deliveries

use anyhow::{bail, Result};
use authgate_core::testing::{FakeChallengeProvider, FakeDeviceProbe, ManualClock};
use authgate_core::{
    AuthPolicy, AuthPolicyEngine, BiometryKind, Delivery, DeviceTrustAssessor,
    LifecycleState, MemorySnapshotStore, SecurityEvent, SecurityLifecycleController,
    SnapshotPersistence, TamperChecks,
};
use authgate_storage::{AccessibilityTier, SecureStore, SoftwareKeystore, StateDatabase};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lifecycle-harness")]
#[command(about = "AuthGate security lifecycle harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Background the app, advance the clock, foreground again
    Timeout {
        /// Reuse window in seconds
        #[arg(short, long, default_value = "300")]
        window: u64,

        /// Seconds spent in background
        #[arg(short, long, default_value = "400")]
        elapsed: i64,
    },

    /// Detect a biometric enrollment change
    EnrollmentChange {
        /// State database (in-memory when omitted)
        #[arg(short, long)]
        db: Option<PathBuf>,
    },

    /// Store a gated secret and read it before and after re-enrollment
    GatedStore {
        /// Item key
        #[arg(short, long, default_value = "wallet_seed")]
        key: String,

        /// Prompt reason
        #[arg(short, long, default_value = "Reveal recovery phrase")]
        reason: String,
    },

    /// Run the device trust assessment
    Trust {
        /// Artifact paths present on the simulated device
        #[arg(short, long)]
        artifact: Vec<PathBuf>,

        /// Simulate an attached debugger
        #[arg(short, long)]
        debugger: bool,

        /// Simulator build (all checks skipped)
        #[arg(short, long)]
        simulator: bool,
    },

    /// Drive many background/foreground cycles with redelivered events
    Soak {
        /// Number of cycles
        #[arg(short, long, default_value = "1000")]
        cycles: u64,

        /// Reuse window in seconds
        #[arg(short, long, default_value = "60")]
        window: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Timeout { window, elapsed } => run_timeout(window, elapsed).await,
        Commands::EnrollmentChange { db } => run_enrollment_change(db).await,
        Commands::GatedStore { key, reason } => run_gated_store(&key, &reason).await,
        Commands::Trust {
            artifact,
            debugger,
            simulator,
        } => run_trust(artifact, debugger, simulator),
        Commands::Soak { cycles, window } => run_soak(cycles, window).await,
    }
}

fn controller(
    provider: Arc<FakeChallengeProvider>,
    snapshots: Arc<dyn SnapshotPersistence>,
    clock: Arc<ManualClock>,
    window: u64,
) -> Result<SecurityLifecycleController> {
    let policy = AuthPolicy::default().with_reuse_window_secs(window);
    policy.validate()?;
    let engine = Arc::new(AuthPolicyEngine::new(provider));
    Ok(SecurityLifecycleController::new(engine, snapshots, policy).with_clock(clock))
}

async fn run_timeout(window: u64, elapsed: i64) -> Result<()> {
    info!("Timeout scenario: window={}s, background={}s", window, elapsed);

    let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
    let clock = Arc::new(ManualClock::at_epoch());
    let controller = controller(
        provider.clone(),
        Arc::new(MemorySnapshotStore::new()),
        clock.clone(),
        window,
    )?;
    let mut events = controller.subscribe();

    controller.secret_cache().insert("session_token", b"cached".to_vec());
    controller.on_background(1);
    info!("Overlay visible: {}", controller.overlay().is_visible());

    clock.advance_secs(elapsed);
    controller.on_foreground(2);
    info!(
        "State after foreground: {:?} (cached secrets: {})",
        controller.state(),
        controller.secret_cache().len()
    );

    if controller.state() != LifecycleState::Locked {
        info!("Within reuse window, no re-authentication required");
        return Ok(());
    }

    match events.try_recv() {
        Ok(SecurityEvent::ReauthRequired { elapsed_secs }) => {
            info!("ReauthRequired after {}s", elapsed_secs)
        }
        Ok(other) => warn!("Unexpected event: {:?}", other),
        Err(e) => bail!("no ReauthRequired event: {}", e),
    }

    let result = controller.unlock("Unlock AuthGate").await;
    info!(
        "Unlock succeeded={} state={:?} prompts={}",
        result.succeeded,
        controller.state(),
        provider.challenge_count()
    );
    Ok(())
}

async fn run_enrollment_change(db: Option<PathBuf>) -> Result<()> {
    let snapshots: Arc<dyn SnapshotPersistence> = match db {
        Some(path) => {
            info!("Using state database at {}", path.display());
            Arc::new(StateDatabase::open(&path)?)
        }
        None => Arc::new(StateDatabase::open_in_memory()?),
    };

    let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Fingerprint));
    let clock = Arc::new(ManualClock::at_epoch());
    let controller = controller(provider.clone(), snapshots, clock, 300)?;
    let mut events = controller.subscribe();

    let result = controller.unlock("Sign in").await;
    if !result.succeeded {
        bail!("initial authentication failed: {:?}", result.error);
    }
    info!(
        "Baseline recorded: {}",
        result
            .domain_state
            .map(|s| s.to_base64())
            .unwrap_or_default()
    );

    provider.enroll_new_biometric();
    info!("New fingerprint enrolled");

    controller.on_background(1);
    controller.on_foreground(2);

    match events.try_recv() {
        Ok(SecurityEvent::EnrollmentChanged { previous, current }) => info!(
            "EnrollmentChanged: {} -> {}",
            previous.state.to_base64(),
            current.state.to_base64()
        ),
        Ok(other) => warn!("Unexpected event: {:?}", other),
        Err(_) => warn!("No enrollment change reported"),
    }
    Ok(())
}

async fn run_gated_store(key: &str, reason: &str) -> Result<()> {
    let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
    let store = SecureStore::new(Arc::new(SoftwareKeystore::new(provider.clone())));

    let outcome = store
        .put(key, b"correct horse battery staple", AccessibilityTier::default(), true)
        .await;
    info!("Stored {} (status {})", key, outcome.status);

    match store.get(key, Some(reason)).await {
        Ok(payload) => info!("Read {} bytes after one prompt", payload.len()),
        Err(e) => bail!("gated read failed before re-enrollment: {}", e),
    }

    provider.enroll_new_biometric();
    info!("Biometric set changed");

    match store.get(key, Some(reason)).await {
        Ok(_) => bail!("gated item still readable after enrollment change"),
        Err(e) => info!("Read failed closed: {} ({})", e, e.kind()),
    }

    let outcome = store.delete(key).await;
    info!("Deleted {} (status {})", key, outcome.status);
    Ok(())
}

fn run_trust(artifacts: Vec<PathBuf>, debugger: bool, simulator: bool) -> Result<()> {
    let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
    let device = Arc::new(FakeDeviceProbe::new());
    for path in artifacts {
        device.add_file(path);
    }
    if debugger {
        device.attach_debugger();
    }

    let checks = TamperChecks {
        simulator,
        ..Default::default()
    };
    let engine = AuthPolicyEngine::new(provider);
    let assessor = DeviceTrustAssessor::new(engine.capability_probe().clone(), device, checks);
    let assessment = assessor.assess();

    info!(
        "biometric={} passcode={} jailbroken={} trusted={}",
        assessment.has_biometric,
        assessment.has_passcode,
        assessment.jailbroken,
        assessment.trusted
    );
    for indicator in &assessment.indicators {
        warn!("Indicator: {}", indicator.describe());
    }
    Ok(())
}

async fn run_soak(cycles: u64, window: u64) -> Result<()> {
    let provider = Arc::new(FakeChallengeProvider::new(BiometryKind::Face));
    let clock = Arc::new(ManualClock::at_epoch());
    let controller = controller(
        provider.clone(),
        Arc::new(MemorySnapshotStore::new()),
        clock.clone(),
        window,
    )?;
    let window = i64::try_from(window)?;

    let pb = ProgressBar::new(cycles);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut sequence = 0u64;
    let mut locks = 0u64;
    let mut duplicates = 0u64;

    for cycle in 0..cycles {
        // Alternate short and long absences around the window
        let away = if cycle % 3 == 0 { window + 1 } else { window / 2 };

        sequence += 1;
        controller.on_background(sequence);
        clock.advance_secs(away);

        sequence += 1;
        controller.on_foreground(sequence);
        if controller.on_foreground(sequence) == Delivery::Duplicate {
            duplicates += 1;
        }

        if controller.state() == LifecycleState::Locked {
            locks += 1;
            if cycle % 3 != 0 {
                warn!("Cycle {} locked inside the reuse window", cycle);
            }
            let result = controller.unlock("Unlock AuthGate").await;
            if !result.succeeded {
                bail!("unlock failed on cycle {}: {:?}", cycle, result.error);
            }
        }

        pb.set_message(format!("locks={}", locks));
        pb.inc(1);
    }
    pb.finish_with_message("done");

    info!(
        "Soak finished: {} cycles, {} locks, {} duplicates ignored",
        cycles, locks, duplicates
    );
    Ok(())
}

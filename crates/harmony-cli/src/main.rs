//! `harmony-cli` – HarmonyBot console runner
//!
//! This binary wires the whole coordination layer together against a real
//! actuator controller.  It:
//!
//! 1. Loads `~/.harmony/config.toml`, writing the defaults on first run.
//! 2. Probes the controller and refuses to start when it is unreachable.
//! 3. Starts the camera pump, the head-tracking loop and the conversation
//!    loop, with stdin lines standing in for transcribed speech.
//! 4. Intercepts **Ctrl-C** (or end of input) to stop both loops, restore
//!    tracking and release the camera.

mod config;
mod console;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use harmony_hal::{ActuatorClient, FrameCache, HttpTransport, SimCamera, spawn_capture_pump};
use harmony_kernel::ModeArbiter;
use harmony_perception::{PerceptionLoop, StaticDetector};
use harmony_runtime::{
    CachedFrameCapture, Collaborators, IdentityFilter, Orchestrator, ResponseDriver,
    SentimentClient,
};

use console::{ConsoleSpeech, LineUtterances, NoFaceAnalyzer};

fn main() -> ExitCode {
    let _telemetry = harmony_runtime::telemetry::init_tracing("harmony");

    print_banner();

    let cfg = load_or_init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run(cfg));
    runtime.shutdown_timeout(Duration::from_secs(1));
    code
}

async fn run(cfg: config::Config) -> ExitCode {
    // ── Actuator link ─────────────────────────────────────────────────────
    let transport = Arc::new(HttpTransport::new(cfg.actuator.base_url.clone()));
    let base_url = transport.base_url().to_string();
    let client = Arc::new(ActuatorClient::new(transport, cfg.actuator.client_config()));

    print!("\n  Probing actuator controller at {} … ", base_url.dimmed());
    std::io::stdout().flush().ok();
    if !client.test_reachable().await {
        println!("{}", "unreachable".red().bold());
        println!(
            "  {}  Set {} or edit {}.",
            "Cannot start without the robot.".dimmed(),
            "HARMONY_ACTUATOR_URL".bold(),
            config::config_path().display().to_string().bold()
        );
        return ExitCode::FAILURE;
    }
    println!("{}", "online".green());

    // ── Shutdown ──────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        cancel_ctrlc.cancel();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; use end of input to exit");
    }

    // ── Camera ────────────────────────────────────────────────────────────
    let cache = Arc::new(FrameCache::new());
    let pump = spawn_capture_pump(
        Box::new(SimCamera::new("front_rgb")),
        Arc::clone(&cache),
        Duration::from_millis(cfg.perception.capture_interval_ms),
        cancel.clone(),
    );

    // ── Loops ─────────────────────────────────────────────────────────────
    let arbiter = Arc::new(ModeArbiter::new(
        Arc::clone(&client),
        cfg.perception.suppress_unchanged,
    ));

    let perception = PerceptionLoop::new(
        Arc::clone(&cache),
        Arc::new(StaticDetector::default()),
        Arc::clone(&arbiter),
        cfg.perception.loop_config(),
    );

    let token = cfg.api_token();
    let collaborators = Collaborators {
        frames: Arc::new(CachedFrameCapture::new(
            Arc::clone(&cache),
            Duration::from_millis(cfg.perception.max_frame_age_ms),
        )),
        utterances: Arc::new(LineUtterances::new(
            BufReader::new(tokio::io::stdin()),
            cancel.clone(),
        )),
        filter: Arc::new(IdentityFilter),
        faces: Arc::new(NoFaceAnalyzer),
        sentiment: Arc::new(
            SentimentClient::new(cfg.sentiment.url.clone(), token.clone())
                .with_timeout(Duration::from_millis(cfg.sentiment.timeout_ms)),
        ),
        responder: Arc::new(
            ResponseDriver::new(cfg.response.base_url.clone(), cfg.response.model.clone())
                .with_api_key(token)
                .with_sampling(cfg.response.max_tokens, cfg.response.temperature)
                .with_timeout(Duration::from_millis(cfg.response.timeout_ms)),
        ),
        speech: Arc::new(ConsoleSpeech),
    };
    let orchestrator = Orchestrator::new(
        Arc::clone(&arbiter),
        Arc::clone(&client),
        collaborators,
        cfg.orchestrator.orchestrator_config(&cfg.actuator),
    );

    println!();
    println!("  Speak by typing a line; press {} to stop.\n", "Ctrl-C".bold().cyan());

    let tracking = tokio::spawn(perception.run(cancel.clone()));
    let conversation = tokio::spawn(orchestrator.run(cancel.clone()));

    let (tracking, conversation) = tokio::join!(tracking, conversation);
    for (name, result) in [("perception", tracking), ("orchestrator", conversation)] {
        if let Err(e) = result {
            error!(task = name, error = %e, "loop task failed");
        }
    }
    cancel.cancel();
    if let Err(e) = pump.await {
        error!(error = %e, "capture pump failed");
    }
    cache.clear();

    let stats = arbiter.stats();
    info!(
        pauses = stats.pauses,
        forwarded = stats.forwarded,
        skipped = stats.skipped,
        "harmony stopped"
    );
    println!("{}", "  ✓ Tracking restored, camera released.".green());
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn load_or_init() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _   _                                      "#.bold().magenta());
    println!("{}", r#" | | | | __ _ _ __ _ __ ___   ___  _ __  _   _ "#.bold().magenta());
    println!("{}", r#" | |_| |/ _` | '__| '_ ` _ \ / _ \| '_ \| | | |"#.bold().magenta());
    println!("{}", r#" |  _  | (_| | |  | | | | | | (_) | | | | |_| |"#.bold().magenta());
    println!("{}", r#" |_| |_|\__,_|_|  |_| |_| |_|\___/|_| |_|\__, |"#.bold().magenta());
    println!("{}", r#"                                         |___/ "#.bold().magenta());
    println!();
    println!(
        "  {} {}",
        "HarmonyBot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Emotion-aware conflict mediation");
    println!();
}

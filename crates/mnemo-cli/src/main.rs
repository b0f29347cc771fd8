//! `mnemo-cli` – Mnemo Command Line Interface
//!
//! This binary is an interactive front end to a SQLite-backed memory bank.
//! It:
//!
//! 1. Initialises structured logging (and OTLP export when configured).
//! 2. Checks for `~/.mnemo/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 3. Opens the memory bank at the configured `store_path` with debounced
//!    link pruning on a background tokio runtime.
//! 4. Drops the user into an **interactive REPL** with slash-commands
//!    (`/remember`, `/recall`, `/list`, `/links`, `/maintain`, `/help`).
//! 5. Intercepts **Ctrl-C** to run any pending prune before exiting.

mod config;
mod repl;
mod telemetry;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use mnemo_memory::{MemoryBank, SqliteStore};

fn main() {
    let _telemetry = telemetry::init_tracing("mnemo");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    let bank_config = cfg.bank_config();
    if let Err(e) = bank_config.validate() {
        println!("{}: {}", "Invalid configuration".red(), e);
        std::process::exit(2);
    }

    // ── Background runtime for the prune scheduler ───────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("mnemo-prune")
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            std::process::exit(1);
        }
    };

    // ── Memory bank ───────────────────────────────────────────────────────
    if let Some(parent) = cfg.store_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = config::create_private_dir(parent)
    {
        println!("{}: {}", "Store directory error".red(), e);
        std::process::exit(1);
    }
    let store = match SqliteStore::open(&cfg.store_path) {
        Ok(store) => store,
        Err(e) => {
            println!(
                "{} {}: {}",
                "Failed to open memory store at".red(),
                cfg.store_path.display(),
                e
            );
            std::process::exit(1);
        }
    };
    let bank = Arc::new(MemoryBank::new(store, bank_config).with_prune_scheduler(runtime.handle().clone()));
    let count = bank.memories().len();
    info!(path = %cfg.store_path.display(), memories = count, "memory bank opened");
    println!(
        "  Memory bank at {} ({} memories)",
        cfg.store_path.display().to_string().bold(),
        count
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let bank_ctrlc = bank.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
        // Held until exit so an in-flight /remember finishes both saves.
        let _quiesced = match bank_ctrlc.quiesce() {
            Ok(quiesced) => {
                if quiesced.prune_flushed {
                    println!("{}", "  ✓ Pending link prune completed.".green());
                }
                Some(quiesced)
            }
            Err(e) => {
                error!(error = %e, "could not wait for in-flight writes");
                None
            }
        };
        println!("{}", "  ✓ Exiting Mnemo.".green());
        std::process::exit(0);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; pending prunes will be lost on Ctrl-C");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&bank, shutdown);

    if bank.flush_pending_prune() {
        info!("pending link prune completed at exit");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Mnemo First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Mnemo.\n");

    let mut cfg = config::Config::default();

    let path = prompt_line(
        &format!("  Memory database path [{}]: ", cfg.store_path.display()),
        &cfg.store_path.display().to_string(),
    );
    cfg.store_path = path.into();

    let threshold = prompt_line(
        &format!("  Run maintenance above how many memories? [{}]: ", cfg.maintenance_threshold),
        &cfg.maintenance_threshold.to_string(),
    );
    if let Ok(n) = threshold.trim().parse::<usize>() {
        cfg.maintenance_threshold = n;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __  ___                    "#.bold().cyan());
    println!("{}", r#"  /  |/  /__  ___ __ _  ___   "#.bold().cyan());
    println!("{}", r#" / /|_/ / _ \/ -_)  ' \/ _ \  "#.bold().cyan());
    println!("{}", r#"/_/  /_/_//_/\__/_/_/_/\___/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Mnemo".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Associative Memory Engine");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

//! REPL – Read-Eval-Print Loop for the Mnemo interactive shell.
//!
//! Supported slash-commands:
//!   /remember <category> <importance> <text>  – store a memory; `#tags` become keywords
//!   /recall <query>                           – ranked + associative recall
//!   /list                                     – every stored memory
//!   /links                                    – the association graph
//!   /maintain                                 – deduplicate and consolidate now
//!   /help                                     – show this list
//!   /quit | /exit                             – flush pending work and exit

use colored::Colorize;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mnemo_memory::{MemoryBank, MemoryStore};
use mnemo_types::{
    MAX_IMPORTANCE, MIN_IMPORTANCE, MatchType, MemoryCategory, MemoryEntry, MemoryId, MnemoError, RetrievalResult,
};
use tracing::warn;

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Remember {
        category: MemoryCategory,
        importance: u8,
        content: String,
        keywords: Vec<String>,
    },
    Recall(String),
    List,
    Links,
    Maintain,
    Help,
    Quit,
}

/// Parse one input line.  The error is a user-facing message.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match head {
        "/remember" => parse_remember(rest),
        "/recall" if rest.is_empty() => Err("usage: /recall <query>".to_string()),
        "/recall" => Ok(Command::Recall(rest.to_string())),
        "/list" => Ok(Command::List),
        "/links" => Ok(Command::Links),
        "/maintain" => Ok(Command::Maintain),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command '{other}'")),
    }
}

fn parse_remember(args: &str) -> Result<Command, String> {
    const USAGE: &str = "usage: /remember <category> <importance 1-5> <text>";
    let Some((category, rest)) = args.split_once(char::is_whitespace) else {
        return Err(USAGE.to_string());
    };
    let Some((importance, text)) = rest.trim_start().split_once(char::is_whitespace) else {
        return Err(USAGE.to_string());
    };
    let importance = importance
        .parse::<u8>()
        .ok()
        .filter(|i| (MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(i))
        .ok_or_else(|| format!("importance must be {MIN_IMPORTANCE}-{MAX_IMPORTANCE}, got '{importance}'"))?;
    let content = text.trim();
    if content.is_empty() {
        return Err(USAGE.to_string());
    }

    let mut keywords: Vec<String> = Vec::new();
    for tag in content.split_whitespace().filter_map(|w| w.strip_prefix('#')) {
        let tag: String = tag
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect::<String>()
            .to_lowercase();
        if !tag.is_empty() && !keywords.contains(&tag) {
            keywords.push(tag);
        }
    }

    Ok(Command::Remember {
        category: MemoryCategory::from(category),
        importance,
        content: content.to_string(),
        keywords,
    })
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run<S: MemoryStore + 'static>(bank: &MemoryBank<S>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "mnemo>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(c) => c,
            Err(msg) => {
                println!("{} Type {} for available commands.", msg.red(), "/help".bold());
                continue;
            }
        };

        if command == Command::Quit {
            println!("{}", "Goodbye.".green());
            shutdown.store(true, Ordering::SeqCst);
            break;
        }

        if let Err(e) = execute(bank, command) {
            warn!(error = %e, "command failed");
            println!("{}: {}", "Error".red(), e);
        }
    }
}

/// Run one non-quit command against `bank`.
pub fn execute<S: MemoryStore + 'static>(bank: &MemoryBank<S>, command: Command) -> Result<(), MnemoError> {
    match command {
        Command::Remember {
            category,
            importance,
            content,
            keywords,
        } => cmd_remember(bank, MemoryEntry::new(content, keywords, category, importance)),
        Command::Recall(query) => cmd_recall(bank, &query),
        Command::List => {
            cmd_list(bank);
            Ok(())
        }
        Command::Links => {
            cmd_links(bank);
            Ok(())
        }
        Command::Maintain => cmd_maintain(bank),
        Command::Help => {
            cmd_help();
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Mnemo Commands".bold().underline());
    println!("  {} – store a memory (#tags become keywords)", "/remember <category> <1-5> <text>".bold().cyan());
    println!("  {}                   – ranked and associative recall", "/recall <query>".bold().cyan());
    println!("  {}                             – list stored memories", "/list".bold().cyan());
    println!("  {}                            – show associative links", "/links".bold().cyan());
    println!("  {}                         – deduplicate and consolidate now", "/maintain".bold().cyan());
    println!("  {}                      – exit", "/quit  /exit".bold().cyan());
    println!();
    println!(
        "  Categories: {}",
        "preference fact instruction goal persona skill entity episodic context".dimmed()
    );
    println!();
}

fn cmd_remember<S: MemoryStore + 'static>(bank: &MemoryBank<S>, entry: MemoryEntry) -> Result<(), MnemoError> {
    let outcome = bank.remember(entry)?;
    println!(
        "{} {} ({} link(s) created)",
        "✓ Remembered".green(),
        short_id(outcome.id.as_str()).bold(),
        outcome.links_created
    );
    if let Some(report) = outcome.maintenance {
        println!(
            "  {} {} duplicate(s) removed, {} evicted, {} link(s) dropped",
            "Maintenance:".yellow(),
            report.duplicates_removed,
            report.evicted.len(),
            report.links_dropped
        );
    }
    Ok(())
}

fn cmd_recall<S: MemoryStore + 'static>(bank: &MemoryBank<S>, query: &str) -> Result<(), MnemoError> {
    let recall = bank.recall(query)?;
    if recall.is_empty() {
        println!("  {}", "Nothing relevant remembered.".dimmed());
        return Ok(());
    }
    println!("{}", "Direct".bold().underline());
    for r in &recall.direct {
        print_result(r);
    }
    if !recall.associative.is_empty() {
        println!("{}", "Associated".bold().underline());
        for r in &recall.associative {
            print_result(r);
        }
    }
    Ok(())
}

fn cmd_list<S: MemoryStore + 'static>(bank: &MemoryBank<S>) {
    let memories = bank.memories();
    if memories.is_empty() {
        println!("  {}", "No memories stored yet.".dimmed());
        return;
    }
    println!("{} ({})", "Memories".bold().underline(), memories.len());
    for m in &memories {
        println!(
            "  {} [{}] ★{} {} {}",
            short_id(m.id.as_str()).dimmed(),
            m.category.to_string().yellow(),
            m.importance,
            m.content,
            format!("(accessed {}×, activation {:.2})", m.access_count, m.activation_level).dimmed()
        );
    }
}

fn cmd_links<S: MemoryStore + 'static>(bank: &MemoryBank<S>) {
    let links = bank.links();
    if links.is_empty() {
        println!("  {}", "No associative links yet.".dimmed());
        return;
    }
    let contents: HashMap<_, _> = bank.memories().into_iter().map(|m| (m.id, m.content)).collect();
    let label = |id: &MemoryId| {
        contents
            .get(id)
            .map(|c| truncate(c, 32))
            .unwrap_or_else(|| short_id(id.as_str()).to_string())
    };
    println!("{} ({})", "Links".bold().underline(), links.len());
    for l in &links {
        println!(
            "  {} ↔ {} {} {}",
            label(&l.source_id),
            label(&l.target_id),
            format!("{:.2}", l.strength).cyan(),
            format!("{:?}", l.link_type).to_lowercase().dimmed()
        );
    }
}

fn cmd_maintain<S: MemoryStore + 'static>(bank: &MemoryBank<S>) -> Result<(), MnemoError> {
    let report = bank.maintain()?;
    println!(
        "{} {} duplicate(s) removed, {} evicted, {} dangling link(s) dropped",
        "✓ Maintenance complete:".green(),
        report.duplicates_removed,
        report.evicted.len(),
        report.links_dropped
    );
    for m in &report.evicted {
        println!("  {} {}", "evicted".dimmed(), m.content);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn print_result(r: &RetrievalResult) {
    let kind = match r.match_type {
        MatchType::Semantic => "semantic".normal(),
        MatchType::Keyword => "keyword".cyan(),
        MatchType::Primed => "primed".magenta(),
        MatchType::Associative => "associative".yellow(),
    };
    println!(
        "  {} [{}] {} {}",
        format!("{:.3}", r.score).bold(),
        r.memory.category.to_string().yellow(),
        r.memory.content,
        format!("({kind})").dimmed()
    );
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

//! # Folio Sim
//!
//! A step-by-step simulator for the Folio sync engine. Every replica is a
//! `RichTextDoc` plus the `SyncManager` that flushes its edits to a shared
//! in-memory delta log and pulls everyone else's. Nothing runs on a timer:
//! each flush and pull is an explicit step, so rebasing and echo
//! suppression can be watched as they happen.
//!
//! ```text
//! edit ──▶ local edit buffer ──flush──▶ delta log ──pull──▶ other replicas
//!                                          │
//!                         highlight spans ─┴─reconcile──▶ highlight store
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;
use folio_sdk::{
    compact, DocumentReplica, DocumentSnapshot, EditorId, HighlightReconciler, MemoryDeltaLog,
    MemoryHighlightStore, RemoteDeltaLog, Result, RichTextDoc, SyncConfig, SyncManager, TagId,
    TextRange,
};
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "folio-sim")]
#[command(about = "Step-by-step simulator for the Folio sync engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One replica types, another pulls the record and renders it
    Remote,
    /// An unflushed edit is rebased over a remote insert that lands first
    Rebase,
    /// Highlight a range, reconcile, then unformat and reconcile again
    Highlights,
    /// Appends fail for a while; the same record is retried until it lands
    Outage {
        /// Number of appends to fail
        #[arg(long, default_value_t = 3)]
        failures: usize,
    },
    /// Several replicas type concurrently, then compact and load a late joiner
    Converge {
        /// Number of replicas
        #[arg(long, default_value_t = 3)]
        replicas: usize,
    },
    /// Interactive REPL for manual experimentation
    Interactive,
}

// ─── Replica: a simulated client ───────────────────────────────────────────

struct Replica {
    name: String,
    doc: RichTextDoc,
    sync: SyncManager,
    reconciler: HighlightReconciler<MemoryHighlightStore>,
}

impl Replica {
    fn new(name: &str, snapshot: DocumentSnapshot, highlights: &Arc<MemoryHighlightStore>) -> Self {
        Self {
            name: name.to_string(),
            doc: RichTextDoc::from_snapshot("sim", &snapshot),
            sync: SyncManager::new(
                "sim",
                EditorId::new(name),
                name,
                snapshot,
                SyncConfig::default(),
            ),
            reconciler: HighlightReconciler::new("sim", highlights.clone()),
        }
    }

    async fn join(name: &str, log: &MemoryDeltaLog, highlights: &Arc<MemoryHighlightStore>) -> Result<Self> {
        let snapshot = log.latest_snapshot().await?;
        let mut replica = Self::new(name, snapshot, highlights);
        replica.reconciler.load(highlights.all());
        Ok(replica)
    }

    fn insert(&mut self, index: usize, text: &str) -> Result<()> {
        let edit = self.doc.insert_text(index, text, None)?;
        self.sync.record_local_edit(&edit);
        step(&format!("{}: insert {:?} at {}", self.name, text, index));
        Ok(())
    }

    fn delete(&mut self, index: usize, length: usize) -> Result<()> {
        let edit = self.doc.delete_text(index, length)?;
        self.sync.record_local_edit(&edit);
        step(&format!("{}: delete {} at {}", self.name, length, index));
        Ok(())
    }

    fn highlight(&mut self, index: usize, length: usize, tag: &str) -> Result<()> {
        let (id, edit) = self.doc.highlight(TextRange::new(index, length), TagId::new(tag))?;
        self.sync.record_local_edit(&edit);
        step(&format!(
            "{}: highlight [{}, {}) as {} → {}",
            self.name,
            index,
            index + length,
            tag,
            id
        ));
        Ok(())
    }

    fn unformat(&mut self, index: usize, length: usize) -> Result<()> {
        let edit = self.doc.remove_format(index, length)?;
        self.sync.record_local_edit(&edit);
        step(&format!("{}: remove formatting from [{}, {})", self.name, index, index + length));
        Ok(())
    }

    async fn flush(&mut self, log: &MemoryDeltaLog) {
        match self.sync.flush(log).await {
            Ok(Some(record_id)) => println!(
                "  {} {} {}",
                self.name.bright_magenta(),
                "──flush──▶".bright_cyan(),
                record_id.to_string().dimmed()
            ),
            Ok(None) => step(&format!("{}: nothing to flush", self.name)),
            Err(err) => println!(
                "  {} {} {}",
                self.name.bright_magenta(),
                "──flush──✗".bright_red(),
                err.to_string().bright_red()
            ),
        }
    }

    async fn pull(&mut self, log: &MemoryDeltaLog) -> Result<()> {
        let outcome = self.sync.pull(log, &mut self.doc).await?;
        println!(
            "  {} {} applied={} confirmed={} stale={} deferred={} suppressed={}",
            self.name.bright_magenta(),
            "◀──pull──".bright_cyan(),
            outcome.applied,
            outcome.confirmed.is_some(),
            outcome.stale,
            outcome.deferred,
            outcome.suppressed
        );
        Ok(())
    }

    async fn reconcile(&mut self) {
        let outcome = self.reconciler.reconcile(self.doc.get_contents()).await;
        step(&format!(
            "{}: reconcile → created={} updated={} deleted={} failed={}",
            self.name, outcome.created, outcome.updated, outcome.deleted, outcome.failed
        ));
    }
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn show_replica(replica: &Replica) {
    let border = "─".repeat(44);
    println!("  ┌{}┐", border);
    println!(
        "  │ {:^42} │",
        format!("Replica: {}", replica.name).bright_yellow().to_string()
    );
    println!("  ├{}┤", border);
    println!("  │ {:<42} │", format!("text:      {:?}", replica.doc.get_text()));
    println!("  │ {:<42} │", format!("watermark: {}", replica.sync.watermark()));
    println!("  │ {:<42} │", format!("flush:     {:?}", replica.sync.flush_state()));
    println!(
        "  │ {:<42} │",
        format!("pending:   {}", delta_json(replica.sync.buffer().pending()))
    );
    println!("  └{}┘", border);
}

fn show_highlights(store: &MemoryHighlightStore) {
    let highlights = store.all();
    if highlights.is_empty() {
        step(&"(no highlights)".dimmed().to_string());
    }
    for highlight in highlights {
        step(&format!(
            "{} {} [{}, {}) {:?}",
            highlight.id.to_string().bright_white(),
            highlight.tag_id.to_string().bright_yellow(),
            highlight.selection.index,
            highlight.selection.end(),
            highlight.text
        ));
    }
}

fn delta_json(delta: &folio_sdk::Delta) -> String {
    serde_json::to_string(delta).unwrap_or_else(|_| "<unprintable>".to_string())
}

fn convergence_check(replicas: &[&Replica]) -> bool {
    replicas
        .windows(2)
        .all(|pair| pair[0].doc.get_contents() == pair[1].doc.get_contents())
}

fn convergence_result(converged: bool) {
    if converged {
        println!(
            "\n  {} {}",
            "✓".bright_green().bold(),
            "ALL REPLICAS CONVERGED, documents are identical!"
                .bright_green()
                .bold()
        );
    } else {
        println!(
            "\n  {} {}",
            "✗".bright_red().bold(),
            "DIVERGENCE DETECTED, replicas differ!".bright_red().bold()
        );
    }
}

// ─── Scenarios ─────────────────────────────────────────────────────────────

async fn run_remote() -> Result<()> {
    header("REMOTE, one replica types and another renders it");
    let log = MemoryDeltaLog::new();
    let highlights = Arc::new(MemoryHighlightStore::new());

    section("Phase 1: Both replicas load the empty document");
    let mut alice = Replica::join("alice", &log, &highlights).await?;
    let mut bob = Replica::join("bob", &log, &highlights).await?;

    section("Phase 2: alice types and flushes");
    alice.insert(0, "Hello")?;
    alice.flush(&log).await;

    section("Phase 3: bob pulls, alice sees her own echo");
    bob.pull(&log).await?;
    alice.pull(&log).await?;

    show_replica(&alice);
    show_replica(&bob);
    convergence_result(convergence_check(&[&alice, &bob]));
    Ok(())
}

async fn run_rebase() -> Result<()> {
    header("REBASE, a local edit moves over a remote insert");
    let log = MemoryDeltaLog::with_snapshot(DocumentSnapshot::new(
        folio_sdk::Delta::from_text("Hello\n"),
        folio_sdk::ServerTimestamp::ZERO,
    ));
    let highlights = Arc::new(MemoryHighlightStore::new());
    let mut alice = Replica::join("alice", &log, &highlights).await?;
    let mut bob = Replica::join("bob", &log, &highlights).await?;

    section("Phase 1: alice types without flushing; bob flushes first");
    alice.insert(5, " World")?;
    bob.insert(0, "Hi ")?;
    bob.flush(&log).await;
    show_replica(&alice);

    section("Phase 2: alice pulls; her pending edit is rebased");
    alice.pull(&log).await?;
    show_replica(&alice);

    section("Phase 3: alice flushes the rebased edit");
    alice.flush(&log).await;
    bob.pull(&log).await?;
    alice.pull(&log).await?;
    show_replica(&alice);
    show_replica(&bob);
    convergence_result(convergence_check(&[&alice, &bob]));
    Ok(())
}

async fn run_highlights() -> Result<()> {
    header("HIGHLIGHTS, spans in the text drive the highlight store");
    let log = MemoryDeltaLog::new();
    let highlights = Arc::new(MemoryHighlightStore::new());
    let mut alice = Replica::join("alice", &log, &highlights).await?;

    section("Phase 1: highlight \"ello\" in \"Hello\"");
    alice.insert(0, "Hello")?;
    alice.highlight(1, 4, "T1")?;
    alice.reconcile().await;
    show_highlights(&highlights);

    section("Phase 2: reconcile again, nothing to write");
    let writes = highlights.write_count();
    alice.reconcile().await;
    step(&format!("store writes unchanged: {}", highlights.write_count() == writes));

    section("Phase 3: edit inside the highlight");
    alice.delete(2, 1)?;
    alice.reconcile().await;
    show_highlights(&highlights);

    section("Phase 4: remove the formatting");
    alice.unformat(0, 4)?;
    alice.reconcile().await;
    show_highlights(&highlights);
    Ok(())
}

async fn run_outage(failures: usize) -> Result<()> {
    header("OUTAGE, appends fail and the same record is retried");
    let log = MemoryDeltaLog::new();
    let highlights = Arc::new(MemoryHighlightStore::new());
    let mut alice = Replica::join("alice", &log, &highlights).await?;
    let mut bob = Replica::join("bob", &log, &highlights).await?;

    section(&format!("Phase 1: the log rejects the next {} appends", failures));
    log.fail_next(failures);
    alice.insert(0, "Saved")?;
    for _ in 0..failures {
        alice.flush(&log).await;
        alice.insert(alice.doc.len() - 1, ".")?;
    }
    show_replica(&alice);

    section("Phase 2: the log is back");
    while !alice.sync.buffer().is_empty() {
        alice.flush(&log).await;
        alice.pull(&log).await?;
    }
    bob.pull(&log).await?;
    step(&format!("records in log: {}", log.records().len()));
    show_replica(&alice);
    show_replica(&bob);
    convergence_result(convergence_check(&[&alice, &bob]));
    Ok(())
}

async fn run_converge(count: usize) -> Result<()> {
    header("CONVERGE, concurrent typing, compaction and a late joiner");
    let log = MemoryDeltaLog::new();
    let highlights = Arc::new(MemoryHighlightStore::new());
    let count = count.max(2);

    let mut replicas = Vec::with_capacity(count);
    for i in 0..count {
        replicas.push(Replica::join(&format!("node-{}", i), &log, &highlights).await?);
    }

    section("Phase 1: everyone types at the start of the document, then flushes");
    for (i, replica) in replicas.iter_mut().enumerate() {
        replica.insert(0, &format!("[{}]", i))?;
    }
    for replica in replicas.iter_mut() {
        replica.flush(&log).await;
    }

    section("Phase 2: everyone pulls");
    for replica in replicas.iter_mut() {
        replica.pull(&log).await?;
    }
    for replica in &replicas {
        show_replica(replica);
    }
    let all: Vec<&Replica> = replicas.iter().collect();
    convergence_result(convergence_check(&all));

    section("Phase 3: compact the log and load a late joiner");
    if let Some(snapshot) = compact(&log, log.head()).await? {
        step(&format!(
            "snapshot at {}: {}",
            snapshot.snapshot_timestamp,
            delta_json(&snapshot.ops)
        ));
    }
    let mut late = Replica::join("late", &log, &highlights).await?;
    late.pull(&log).await?;
    show_replica(&late);
    convergence_result(convergence_check(&[&replicas[0], &late]));
    Ok(())
}

// ─── Interactive REPL ──────────────────────────────────────────────────────

fn usage(text: &str) {
    println!("  {} Usage: {}", "!".bright_red(), text);
}

fn unknown(name: &str) {
    println!("  {} Unknown replica '{}'", "!".bright_red(), name);
}

async fn run_interactive() -> Result<()> {
    header("INTERACTIVE REPL, Folio sync engine");

    let log = MemoryDeltaLog::new();
    let highlights = Arc::new(MemoryHighlightStore::new());
    let mut replicas: HashMap<String, Replica> = HashMap::new();

    println!();
    println!("  {}", "Commands:".bold().underline());
    println!("    {} <name>                    Create a replica", "replica".bright_cyan());
    println!("    {} <r> <index> <text>         Insert text", "insert".bright_cyan());
    println!("    {} <r> <index> <length>       Delete text", "delete".bright_cyan());
    println!("    {} <r> <index> <length> <tag> Highlight a range", "mark".bright_cyan());
    println!("    {} <r> <index> <length>      Remove formatting", "unmark".bright_cyan());
    println!("    {} <r> | {} <r>              Flush or pull one replica", "flush".bright_cyan(), "pull".bright_cyan());
    println!("    {} <r>                     Reconcile highlights", "reconcile".bright_cyan());
    println!("    {} <n>                          Fail the next n appends", "fail".bright_cyan());
    println!("    {} | {} | {} | {}          Inspect state", "show <r>".bright_cyan(), "list".bright_cyan(), "check".bright_cyan(), "highlights".bright_cyan());
    println!("    {}                          Exit", "quit".bright_cyan());
    println!();

    loop {
        print!("{}", "folio> ".bright_cyan().bold());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let number = |i: usize| parts.get(i).and_then(|s| s.parse::<usize>().ok());

        let result = match parts[0] {
            "replica" | "r" => {
                match parts.get(1) {
                    Some(name) if replicas.contains_key(*name) => {
                        println!("  {} Replica '{}' already exists", "!".bright_yellow(), name);
                    }
                    Some(name) => {
                        match Replica::join(name, &log, &highlights).await {
                            Ok(replica) => {
                                replicas.insert(name.to_string(), replica);
                                step(&format!("Created replica '{}'", name));
                            }
                            Err(err) => println!("  {} {}", "✗".bright_red(), err),
                        }
                    }
                    None => usage("replica <name>"),
                }
                Ok(())
            }

            "insert" | "i" => match (parts.get(1), number(2)) {
                (Some(name), Some(index)) if parts.len() > 3 => match replicas.get_mut(*name) {
                    Some(replica) => replica.insert(index, &parts[3..].join(" ")),
                    None => {
                        unknown(name);
                        Ok(())
                    }
                },
                _ => {
                    usage("insert <replica> <index> <text>");
                    Ok(())
                }
            },

            "delete" | "del" => match (parts.get(1), number(2), number(3)) {
                (Some(name), Some(index), Some(length)) => match replicas.get_mut(*name) {
                    Some(replica) => replica.delete(index, length),
                    None => {
                        unknown(name);
                        Ok(())
                    }
                },
                _ => {
                    usage("delete <replica> <index> <length>");
                    Ok(())
                }
            },

            "mark" => match (parts.get(1), number(2), number(3), parts.get(4)) {
                (Some(name), Some(index), Some(length), Some(tag)) => {
                    match replicas.get_mut(*name) {
                        Some(replica) => replica.highlight(index, length, tag),
                        None => {
                            unknown(name);
                            Ok(())
                        }
                    }
                }
                _ => {
                    usage("mark <replica> <index> <length> <tag>");
                    Ok(())
                }
            },

            "unmark" => match (parts.get(1), number(2), number(3)) {
                (Some(name), Some(index), Some(length)) => match replicas.get_mut(*name) {
                    Some(replica) => replica.unformat(index, length),
                    None => {
                        unknown(name);
                        Ok(())
                    }
                },
                _ => {
                    usage("unmark <replica> <index> <length>");
                    Ok(())
                }
            },

            "flush" | "f" => {
                match parts.get(1).and_then(|name| replicas.get_mut(*name)) {
                    Some(replica) => replica.flush(&log).await,
                    None => usage("flush <replica>"),
                }
                Ok(())
            }

            "pull" | "p" => match parts.get(1).and_then(|name| replicas.get_mut(*name)) {
                Some(replica) => replica.pull(&log).await,
                None => {
                    usage("pull <replica>");
                    Ok(())
                }
            },

            "reconcile" => {
                match parts.get(1).and_then(|name| replicas.get_mut(*name)) {
                    Some(replica) => replica.reconcile().await,
                    None => usage("reconcile <replica>"),
                }
                Ok(())
            }

            "fail" => {
                match number(1) {
                    Some(count) => {
                        log.fail_next(count);
                        step(&format!("next {} appends will fail", count));
                    }
                    None => usage("fail <count>"),
                }
                Ok(())
            }

            "show" | "s" => {
                match parts.get(1).and_then(|name| replicas.get(*name)) {
                    Some(replica) => show_replica(replica),
                    None => usage("show <replica>"),
                }
                Ok(())
            }

            "list" | "ls" => {
                if replicas.is_empty() {
                    println!("  {}", "(no replicas)".dimmed());
                }
                let sorted: BTreeMap<&String, &Replica> = replicas.iter().collect();
                for replica in sorted.values() {
                    show_replica(replica);
                }
                Ok(())
            }

            "check" => {
                let all: Vec<&Replica> = replicas.values().collect();
                convergence_result(convergence_check(&all));
                Ok(())
            }

            "highlights" | "hl" => {
                show_highlights(&highlights);
                Ok(())
            }

            "quit" | "exit" | "q" => {
                println!("  {}", "Goodbye!".dimmed());
                break;
            }

            "help" | "h" | "?" => {
                println!("  replica <n> | insert <r> <i> <text> | delete <r> <i> <len>");
                println!("  mark <r> <i> <len> <tag> | unmark <r> <i> <len> | reconcile <r>");
                println!("  flush <r> | pull <r> | fail <n> | show <r> | list | check | highlights | quit");
                Ok(())
            }

            other => {
                println!(
                    "  {} Unknown command '{}', type 'help'",
                    "?".bright_yellow(),
                    other
                );
                Ok(())
            }
        };

        if let Err(err) = result {
            println!("  {} {}", "✗".bright_red(), err.to_string().bright_red());
        }
    }
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Remote => run_remote().await,
        Commands::Rebase => run_rebase().await,
        Commands::Highlights => run_highlights().await,
        Commands::Outage { failures } => run_outage(failures).await,
        Commands::Converge { replicas } => run_converge(replicas).await,
        Commands::Interactive => run_interactive().await,
    };

    if let Err(err) = result {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(1);
    }
}

//! Drive Notepad CLI - plain-text notes in Google Drive
//!
//! Usage:
//!   drive-notepad list                      List text documents
//!   drive-notepad read <id>                 Print a document
//!   drive-notepad write [--id ID] <name> [file]  Create or overwrite a document
//!   drive-notepad delete <id>               Delete a document
//!   drive-notepad shell                     Interactive editor session

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

use drive_notepad::config::{self, AppConfig};
use drive_notepad::{
    Action, DocumentId, DocumentStore, EditorController, EditorSession, NoticeLevel, StoreFactory,
    StoreKind, WriteRequest,
};

#[derive(Parser)]
#[command(
    name = "drive-notepad",
    about = "Drive Notepad - plain-text notes stored in Google Drive",
    version,
    long_about = "Authenticates with a Google service-account key (credentials_path in the config file, \
                  or DRIVE_NOTEPAD_CREDENTIALS) or a pre-issued token (DRIVE_NOTEPAD_ACCESS_TOKEN)."
)]
struct Cli {
    /// Config file (default: <config dir>/drive-notepad/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory store instead of Google Drive
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List text documents, newest first
    List,
    /// Print a document's content
    Read {
        /// Document id
        id: String,
    },
    /// Create a document, or overwrite one with --id
    Write {
        /// Existing document id to overwrite
        #[arg(long)]
        id: Option<String>,
        /// Document name
        name: String,
        /// File to upload ("-" or omitted reads stdin)
        path: Option<PathBuf>,
    },
    /// Delete a document
    Delete {
        /// Document id
        id: String,
    },
    /// Interactive editor session
    Shell,
}

/// Run a store call behind a spinner on stderr
async fn with_spinner<F: Future>(label: &str, fut: F) -> F::Output {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(label.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let output = fut.await;
    spinner.finish_and_clear();
    output
}

fn load_settings(cli: &Cli) -> Result<AppConfig> {
    let path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut settings = config::load_config(&path);
    settings.apply_env();
    config::validate_config(&settings).map_err(anyhow::Error::msg)?;
    Ok(settings)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    let kind = if cli.memory { StoreKind::Memory } else { StoreKind::GoogleDrive };
    let store = StoreFactory::create(&settings, kind)?;

    match &cli.command {
        Commands::List => {
            let files = with_spinner("Listing…", store.list_documents(&settings.list_query())).await?;
            if files.is_empty() {
                println!("No text documents");
            }
            for file in files {
                println!(
                    "{}\t{}\t{}",
                    file.id,
                    file.modified_time.as_deref().unwrap_or("-"),
                    file.name
                );
            }
        }
        Commands::Read { id } => {
            let text = with_spinner("Reading…", store.read_document(&DocumentId::new(id.as_str()))).await?;
            print!("{}", text);
        }
        Commands::Write { id, name, path } => {
            let text = match path {
                Some(p) if p.as_os_str() != "-" => tokio::fs::read_to_string(p)
                    .await
                    .with_context(|| format!("reading {}", p.display()))?,
                _ => {
                    let mut buf = String::new();
                    tokio::io::stdin().read_to_string(&mut buf).await?;
                    buf
                }
            };
            let request = match id {
                Some(id) => WriteRequest::update(DocumentId::new(id.as_str()), name.as_str(), text),
                None => WriteRequest::create(name.as_str(), text),
            };
            let saved = with_spinner("Saving…", store.write_document(&request)).await?;
            println!("{}", saved);
        }
        Commands::Delete { id } => {
            with_spinner("Deleting…", store.delete_document(&DocumentId::new(id.as_str()))).await?;
            println!("Deleted {}", id);
        }
        Commands::Shell => {
            let controller = EditorController::new(store, settings.list_query())
                .with_title_propagation(settings.propagate_title_on_update);
            shell(&controller, &settings).await?;
        }
    }

    Ok(())
}

const SHELL_HELP: &str = "\
Commands:
  ls              refresh the document list
  new             start a new document
  open <n|id>     open a listed document by number or id
  title <text>    set the file name
  edit            replace the body (finish with a line containing only \".\")
  append <text>   append one line to the body
  show            print the current document
  save            save to the store
  rm              delete the open document (run twice to confirm)
  help            show this help
  quit            leave (twice if there are unsaved changes)";

async fn prompt(out: &mut tokio::io::Stdout, text: &str) -> Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    Ok(lines.next_line().await?)
}

fn print_form(session: &EditorSession) {
    println!("── {} ──", session.status_line());
    println!("title: {}", session.title());
    println!("{}", session.body());
    println!("──");
}

fn print_listing(session: &EditorSession) {
    if session.listing().is_empty() {
        println!("  (no text documents)");
    }
    for (i, file) in session.listing().iter().enumerate() {
        let marker = if session.selected_id() == Some(&file.id) { "*" } else { " " };
        println!("{} {:>2}. {}", marker, i + 1, file.name);
    }
}

async fn shell(controller: &EditorController, settings: &AppConfig) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();

    if settings.access_password.as_deref().is_some_and(|p| !p.is_empty()) {
        let mut granted = false;
        for _ in 0..3 {
            prompt(&mut out, "Password: ").await?;
            let Some(input) = read_line(&mut lines).await? else { break };
            if settings.check_password(input.trim_end_matches(['\r', '\n'])) {
                granted = true;
                break;
            }
            println!("Wrong password");
        }
        if !granted {
            bail!("access denied");
        }
    }

    let mut session = EditorSession::new(settings.default_title.clone());
    let mut quit_armed = false;

    let notice = with_spinner("Listing…", controller.handle(&mut session, Action::Refresh)).await;
    if let Some(notice) = notice {
        println!("{}", notice);
        if notice.level == NoticeLevel::Fatal {
            bail!("cannot continue");
        }
    }
    print_listing(&session);
    println!("Type \"help\" for commands.");

    loop {
        prompt(&mut out, "> ").await?;
        let Some(line) = read_line(&mut lines).await? else { break };
        let line = line.trim();
        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        if command != "quit" {
            quit_armed = false;
        }

        let action = match command {
            "" => continue,
            "help" => {
                println!("{}", SHELL_HELP);
                continue;
            }
            "show" => {
                print_form(&session);
                continue;
            }
            "quit" | "exit" => {
                if session.is_dirty() && !quit_armed {
                    println!("Unsaved changes. Run quit again to discard them.");
                    quit_armed = true;
                    continue;
                }
                break;
            }
            "ls" => Action::Refresh,
            "new" => Action::StartNew,
            "open" => {
                let id = match arg.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= session.listing().len() => session.listing()[n - 1].id.clone(),
                    _ => DocumentId::new(arg),
                };
                Action::SelectFile(id)
            }
            "title" => Action::EditTitle(arg.to_string()),
            "append" => {
                let mut body = session.body().to_string();
                if !body.is_empty() && !body.ends_with('\n') {
                    body.push('\n');
                }
                body.push_str(arg);
                Action::EditBody(body)
            }
            "edit" => {
                println!("Enter text, finish with a single \".\" line:");
                let mut body = Vec::new();
                while let Some(l) = read_line(&mut lines).await? {
                    if l == "." {
                        break;
                    }
                    body.push(l);
                }
                Action::EditBody(body.join("\n"))
            }
            "save" => Action::Save,
            "rm" | "delete" => Action::RequestDelete,
            other => {
                println!("Unknown command: {} (try \"help\")", other);
                continue;
            }
        };

        let is_refresh = action == Action::Refresh;
        let label = match &action {
            Action::Save => "Saving…",
            Action::SelectFile(_) => "Opening…",
            Action::RequestDelete => "Deleting…",
            _ => "Working…",
        };

        let notice = with_spinner(label, controller.handle(&mut session, action)).await;
        if let Some(notice) = notice {
            println!("{}", notice);
            if notice.level == NoticeLevel::Fatal {
                bail!("cannot continue");
            }
        }
        if is_refresh {
            print_listing(&session);
        }
    }

    Ok(())
}

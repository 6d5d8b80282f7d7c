//! memodi-cli: terminal client for the Memodi clinical case simulator
//!
//! Talks to `memodi-server` over its HTTP API. One-shot subcommands map to
//! single endpoints; `chat` runs an interactive consultation.
//!
//! # Subcommands
//! - `status`  : server health
//! - `start [--topic|--area] [--difficulty] [--reference <file>] [--session <id>]`
//! - `say <id> <text...>`  : one turn
//! - `show <id>`  : transcript
//! - `reset <id>`  : new patient
//! - `chat [case options]`  : interactive (`/reiniciar`, `/salir`)

use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dialoguer::{Input, Password};
use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const RESET_COMMAND: &str = "/reiniciar";
const QUIT_COMMAND: &str = "/salir";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "memodi-cli",
    version,
    about = "Memodi clinical case simulator terminal client"
)]
struct Cli {
    /// Memodi HTTP server URL (overrides MEMODI_HTTP_URL env var)
    #[arg(long, env = "MEMODI_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server status
    Status,

    /// Generate a case: new session, or a reset one with --session
    Start {
        /// Existing (reset) session to start the case on
        #[arg(long)]
        session: Option<String>,

        #[command(flatten)]
        case: CaseArgs,
    },

    /// Send one message to the patient
    Say {
        session: String,

        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Print the session transcript
    Show { session: String },

    /// Discard the current case
    Reset { session: String },

    /// Interactive consultation
    Chat {
        #[command(flatten)]
        case: CaseArgs,
    },
}

#[derive(Debug, Clone, Args)]
struct CaseArgs {
    /// Free-text clinical topic (wins over --area)
    #[arg(long)]
    topic: Option<String>,

    /// Area for a random case
    #[arg(long, value_enum)]
    area: Option<Area>,

    #[arg(long, value_enum, default_value_t = Level::Estudiante)]
    difficulty: Level,

    /// Plain-text reference document
    #[arg(long)]
    reference: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
enum Area {
    MedicinaInterna,
    Urgencias,
    Cardiologia,
    Neurologia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
enum Level {
    Estudiante,
    Residente,
    Especialista,
}

// ============================================================================
// Request / output helpers
// ============================================================================

/// JSON body for `POST /sessions` and `POST /sessions/:id/case`.
fn case_body(case: &CaseArgs, reference_text: Option<String>, api_key: Option<&str>) -> Value {
    let mut body = serde_json::json!({ "difficulty": case.difficulty });
    if let Some(topic) = case.topic.as_deref().filter(|t| !t.trim().is_empty()) {
        body["topic"] = Value::from(topic);
    }
    if let Some(area) = case.area {
        body["area"] = serde_json::json!(area);
    }
    if let Some(text) = reference_text {
        body["reference_text"] = Value::from(text);
    }
    if let Some(key) = api_key {
        body["api_key"] = Value::from(key);
    }
    body
}

fn is_missing_credential(status: StatusCode, body: &Value) -> bool {
    status == StatusCode::UNAUTHORIZED && body["kind"] == "missing_credential"
}

fn error_message(status: StatusCode, body: &Value) -> String {
    match body["error"].as_str() {
        Some(msg) => format!("{} ({})", msg, status.as_u16()),
        None => format!("server returned {}", status),
    }
}

fn format_turn(turn: &Value) -> String {
    let label = match turn["role"].as_str() {
        Some("user") => "Tú",
        _ => "Paciente",
    };
    format!("{}:\n{}\n", label, turn["text"].as_str().unwrap_or(""))
}

fn format_transcript(session: &Value) -> String {
    let mut out = String::new();
    match session["topic"].as_str() {
        Some(topic) => {
            let level = session["difficulty"].as_str().unwrap_or("?");
            out.push_str(&format!("Caso: {} [{}]\n\n", topic, level));
        }
        None => out.push_str("Sin caso activo.\n"),
    }
    if let Some(turns) = session["transcript"].as_array() {
        for turn in turns {
            out.push_str(&format_turn(turn));
            out.push('\n');
        }
    }
    out
}

/// What one line typed in `chat` asks for.
#[derive(Debug, PartialEq, Eq)]
enum ChatAction<'a> {
    Skip,
    Quit,
    /// Generate a new case, resetting first if one is still active.
    NewCase { reset: bool },
    /// Plain text while no case is active.
    NoCase,
    Say(&'a str),
}

fn chat_action(line: &str, active: bool) -> ChatAction<'_> {
    match line.trim() {
        "" => ChatAction::Skip,
        QUIT_COMMAND => ChatAction::Quit,
        RESET_COMMAND => ChatAction::NewCase { reset: active },
        _ if !active => ChatAction::NoCase,
        text => ChatAction::Say(text),
    }
}

/// Case options for a restart; a blank topic keeps the original setup.
fn next_case(case: &CaseArgs, topic: &str) -> CaseArgs {
    let mut next = case.clone();
    if !topic.trim().is_empty() {
        next.topic = Some(topic.trim().to_string());
    }
    next
}

fn read_reference(case: &CaseArgs) -> anyhow::Result<Option<String>> {
    match &case.reference {
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .with_context(|| format!("cannot read reference {}", path.display())),
        None => Ok(None),
    }
}

// ============================================================================
// HTTP Client
// ============================================================================

struct Api {
    client: Client,
    server: String,
}

impl Api {
    fn new(server: &str) -> anyhow::Result<Self> {
        // Case generation with a long reference can take a while.
        let client = Client::builder().timeout(Duration::from_secs(180)).build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
        })
    }

    fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let url = format!("{}{}", self.server, path);
        let mut req = self.client.request(method, &url);
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req
            .send()
            .with_context(|| format!("cannot reach {}", url))?;
        let status = resp.status();
        let body = resp.json().unwrap_or(Value::Null);
        Ok((status, body))
    }

    fn expect_ok(&self, method: Method, path: &str, body: Option<&Value>) -> anyhow::Result<Value> {
        let (status, body) = self.call(method, path, body)?;
        if !status.is_success() {
            bail!(error_message(status, &body));
        }
        Ok(body)
    }

    /// Create a session, asking for the model key once if the server has none.
    fn create_session(&self, case: &CaseArgs, reference: Option<String>) -> anyhow::Result<Value> {
        let body = case_body(case, reference.clone(), None);
        let (status, resp) = self.call(Method::POST, "/sessions", Some(&body))?;
        if status.is_success() {
            return Ok(resp);
        }
        if !is_missing_credential(status, &resp) {
            bail!(error_message(status, &resp));
        }

        eprintln!("El servidor no tiene una clave de API configurada.");
        let key = Password::new()
            .with_prompt("Clave de API de Google")
            .allow_empty_password(false)
            .interact()?;
        let body = case_body(case, reference, Some(key.trim()));
        self.expect_ok(Method::POST, "/sessions", Some(&body))
    }

    fn start_case(&self, id: &str, case: &CaseArgs, reference: Option<String>) -> anyhow::Result<Value> {
        let body = case_body(case, reference, None);
        self.expect_ok(Method::POST, &format!("/sessions/{}/case", id), Some(&body))
    }

    fn say(&self, id: &str, text: &str) -> anyhow::Result<Value> {
        let body = serde_json::json!({ "text": text });
        self.expect_ok(Method::POST, &format!("/sessions/{}/messages", id), Some(&body))
    }
}

// ============================================================================
// Commands
// ============================================================================

fn do_status(api: &Api) -> anyhow::Result<()> {
    let body = api.expect_ok(Method::GET, "/health", None)?;
    println!("Memodi server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
    println!("Model:         {}", body["model"].as_str().unwrap_or("?"));
    println!(
        "Model key:     {}",
        if body["model_key_configured"].as_bool().unwrap_or(false) {
            "configured"
        } else {
            "not configured"
        }
    );
    println!("Scoring:       {}", body["scoring"].as_str().unwrap_or("?"));
    println!("Sessions:      {}", body["sessions"]);
    Ok(())
}

fn print_reply(reply: &Value) {
    println!("\nPaciente:\n{}\n", reply["reply"].as_str().unwrap_or(""));
    if let Some(notice) = reply["notice"].as_str() {
        println!("[{}]\n", notice);
    }
}

fn do_start(api: &Api, session: Option<&str>, case: &CaseArgs) -> anyhow::Result<()> {
    let reference = read_reference(case)?;
    let view = match session {
        Some(id) => api.start_case(id, case, reference)?,
        None => api.create_session(case, reference)?,
    };
    println!("session: {}", view["session_id"].as_str().unwrap_or("?"));
    print!("{}", format_transcript(&view));
    Ok(())
}

fn do_chat(api: &Api, case: &CaseArgs) -> anyhow::Result<()> {
    let reference = read_reference(case)?;
    let view = api.create_session(case, reference.clone())?;
    let id = view["session_id"]
        .as_str()
        .context("server response missing session_id")?
        .to_string();

    print!("{}", format_transcript(&view));
    println!("({} = nuevo paciente, {} = terminar)\n", RESET_COMMAND, QUIT_COMMAND);

    let mut active = true;
    loop {
        let line: String = Input::new()
            .with_prompt("Tú")
            .allow_empty(true)
            .interact_text()?;

        match chat_action(&line, active) {
            ChatAction::Skip => continue,
            ChatAction::Quit => break,
            ChatAction::NoCase => {
                eprintln!("Sin caso activo: escribe {} para generar uno.", RESET_COMMAND)
            }
            ChatAction::NewCase { reset } => {
                if reset {
                    if let Err(e) =
                        api.expect_ok(Method::POST, &format!("/sessions/{}/reset", id), None)
                    {
                        eprintln!("memodi-cli: {}", e);
                        continue;
                    }
                    active = false;
                }
                let topic: String = Input::new()
                    .with_prompt("Nuevo tema (vacío = mismo ajuste)")
                    .allow_empty(true)
                    .interact_text()?;
                match api.start_case(&id, &next_case(case, &topic), reference.clone()) {
                    Ok(view) => {
                        active = true;
                        print!("\n{}", format_transcript(&view));
                    }
                    // The session stays reset; another /reiniciar retries.
                    Err(e) => eprintln!("memodi-cli: {}", e),
                }
            }
            ChatAction::Say(text) => match api.say(&id, text) {
                Ok(reply) => print_reply(&reply),
                // The turn was not recorded; the user may simply retry.
                Err(e) => eprintln!("memodi-cli: {}", e),
            },
        }
    }

    let _ = api.call(Method::DELETE, &format!("/sessions/{}", id), None);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn run(cli: Cli) -> anyhow::Result<()> {
    let api = Api::new(&cli.server)?;
    match cli.command {
        Commands::Status => do_status(&api),
        Commands::Start { session, case } => do_start(&api, session.as_deref(), &case),
        Commands::Say { session, text } => {
            let reply = api.say(&session, &text.join(" "))?;
            print_reply(&reply);
            Ok(())
        }
        Commands::Show { session } => {
            let view = api.expect_ok(Method::GET, &format!("/sessions/{}", session), None)?;
            print!("{}", format_transcript(&view));
            Ok(())
        }
        Commands::Reset { session } => {
            api.expect_ok(Method::POST, &format!("/sessions/{}/reset", session), None)?;
            println!("Sesión {} reiniciada.", session);
            Ok(())
        }
        Commands::Chat { case } => do_chat(&api, &case),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("memodi-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

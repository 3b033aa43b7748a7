// Handles CLI command definitions

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::backend_api::BackendClient;
use crate::cli::{CredentialArgs, ExportArgs, GenerateArgs, HistoryCommand, ThemeAction};
use crate::config::Config;
use crate::db::{self, Db, NewDocument};
use crate::generation::{spawn_history_refresher, start_generation, stop_generation};
use crate::models::{Credentials, GenerationRequest, ModelId};
use crate::session::GenerationState;
use crate::state::{AppState, View};
use crate::status::{ConnectionState, StatusMonitor};
use crate::stream::StreamOutcome;
use crate::view::TerminalView;

/// Everything a command needs, passed in explicitly.
pub struct AppContext {
    pub config: Config,
    pub db: Db,
    pub app_state: AppState,
    pub generation: Arc<Mutex<GenerationState>>,
}

impl AppContext {
    pub async fn open(config: Config) -> Result<Self> {
        let db = db::init_db(&config.db_path)
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
        let app_state = AppState::load(&*db.lock().await).context("failed to load client state")?;

        Ok(Self {
            config,
            db,
            app_state,
            generation: Arc::new(Mutex::new(GenerationState::default())),
        })
    }

    fn client(&self) -> Result<BackendClient> {
        let client = BackendClient::new(self.config.api_base.clone(), self.config.connect_timeout)
            .context("failed to build HTTP client")?;
        Ok(client.with_token(self.app_state.token().map(str::to_string)))
    }
}

pub async fn generate(ctx: &mut AppContext, args: GenerateArgs) -> Result<()> {
    let source_code = read_source(args.code, args.file.as_deref()).await?;
    let model = args.model.unwrap_or_else(|| ctx.app_state.model());
    let request = GenerationRequest::new(source_code, model);

    if request.is_blank() {
        warn!("nothing to document: the source code is empty");
        return Ok(());
    }

    let client = ctx.client()?;

    let connectivity = client.status().await;
    ctx.app_state.set_connectivity(connectivity);
    if connectivity == ConnectionState::Offline {
        warn!(status = %connectivity, "backend is offline or has no internet access");
    }

    let Some(active) = start_generation(&client, &ctx.generation, &request)
        .await
        .context("documentation request failed")?
    else {
        return Ok(());
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let refresher = spawn_history_refresher(client.clone(), events_rx);

    let generation_state = ctx.generation.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_generation(&generation_state).await;
        }
    });

    let mut view = TerminalView::new(
        io::stdout(),
        ctx.config.viewport_rows,
        ctx.config.viewport_columns,
    );
    let report = active
        .with_events(events_tx)
        .run(&ctx.generation, &mut view)
        .await;
    interrupt.abort();

    if !report.text.is_empty() && !report.text.ends_with('\n') {
        println!();
    }
    if let Err(e) = refresher.await {
        warn!(error = %e, "history refresh task failed");
    }

    let current_record = ctx.generation.lock().await.current_record_id;
    if let Some(record_id) = current_record {
        ctx.app_state.open_document(record_id);
    }

    if !report.text.is_empty() {
        let outcome = report.outcome.to_string();
        let local_id = db::save_document(
            &NewDocument {
                record_id: report.record_id,
                model: model.as_str(),
                outcome: &outcome,
                content: &report.text,
            },
            &ctx.db,
        )
        .await
        .context("failed to save document locally")?;
        info!(local_id, record_id = ?report.record_id, "document saved locally");
    }

    match report.outcome {
        StreamOutcome::Completed => Ok(()),
        StreamOutcome::Cancelled => {
            warn!("generation stopped; partial documentation kept");
            Ok(())
        }
        StreamOutcome::Failed(reason) => {
            error!(reason = %reason, "generation failed; partial documentation kept");
            Err(anyhow!("generation failed: {}", reason))
        }
    }
}

/// Source text from `--code`, a file, or stdin, in that order.
async fn read_source(code: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(code) = code {
        return Ok(code);
    }

    if let Some(path) = file {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()));
    }

    if io::stdin().is_terminal() {
        info!("paste your code, then press Ctrl-D");
    }
    let mut source = String::new();
    tokio::io::stdin()
        .read_to_string(&mut source)
        .await
        .context("failed to read source code from stdin")?;
    Ok(source)
}

pub async fn status(ctx: &mut AppContext, watch: bool) -> Result<()> {
    let client = ctx.client()?;

    if !watch {
        let connectivity = client.status().await;
        ctx.app_state.set_connectivity(connectivity);
        println!("{}", ctx.app_state.connectivity());
        return Ok(());
    }

    let monitor = StatusMonitor::start(client, ctx.config.poll_interval);
    let mut updates = monitor.subscribe();
    println!("{}", monitor.current());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let connectivity = *updates.borrow_and_update();
                ctx.app_state.set_connectivity(connectivity);
                println!("{}", connectivity);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    monitor.stop().await;
    Ok(())
}

fn credentials(args: CredentialArgs) -> Result<Credentials> {
    let password = match args.password {
        Some(password) => password,
        None => {
            eprint!("Password: ");
            io::stderr().flush()?;
            let mut line = String::new();
            io::stdin()
                .read_line(&mut line)
                .context("failed to read password")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if args.username.trim().is_empty() || password.is_empty() {
        bail!("username and password are required");
    }

    Ok(Credentials {
        username: args.username,
        password,
    })
}

pub async fn register(ctx: &mut AppContext, args: CredentialArgs) -> Result<()> {
    let credentials = credentials(args)?;
    ctx.client()?.register(&credentials).await?;
    println!("Account created for {}. Log in with `docgen login`.", credentials.username);
    Ok(())
}

pub async fn login(ctx: &mut AppContext, args: CredentialArgs) -> Result<()> {
    let credentials = credentials(args)?;
    let token = ctx.client()?.login(&credentials).await?;

    let conn = ctx.db.lock().await;
    ctx.app_state
        .login(&conn, token)
        .context("failed to store access token")?;
    println!("Logged in as {}", credentials.username);
    Ok(())
}

pub async fn logout(ctx: &mut AppContext) -> Result<()> {
    let conn = ctx.db.lock().await;
    ctx.app_state
        .logout(&conn)
        .context("failed to remove access token")?;
    println!("Logged out");
    Ok(())
}

pub async fn history(ctx: &mut AppContext, command: HistoryCommand) -> Result<()> {
    ctx.app_state.require_token()?;
    let client = ctx.client()?;

    match command {
        HistoryCommand::List => {
            let entries = client.history().await?;
            if entries.is_empty() {
                println!("No documents yet.");
            }
            for entry in entries {
                println!(
                    "{:>6}  {}  {}",
                    entry.id,
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.topic
                );
            }
        }
        HistoryCommand::Show { id } => {
            let entry = client
                .history()
                .await?
                .into_iter()
                .find(|entry| entry.id == id)
                .ok_or_else(|| anyhow!("no stored document with id {}", id))?;
            ctx.app_state.open_document(entry.id);
            print_document(&entry.content)?;
        }
        HistoryCommand::Delete { id } => {
            client.delete_history(id).await?;
            if ctx.app_state.view() == View::Document(id) {
                ctx.app_state.close_document();
            }
            println!("Deleted document {}", id);
        }
    }

    Ok(())
}

pub async fn export(ctx: &mut AppContext, args: ExportArgs) -> Result<()> {
    let docs = if let Some(path) = &args.file {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    } else if let Some(id) = args.history {
        ctx.app_state.require_token()?;
        ctx.client()?
            .history()
            .await?
            .into_iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.content)
            .ok_or_else(|| anyhow!("no stored document with id {}", id))?
    } else {
        db::fetch_document(args.document, &ctx.db)
            .await?
            .map(|document| document.content)
            .ok_or_else(|| anyhow!("no saved document; run `docgen generate` first"))?
    };

    let bytes = ctx.client()?.export(args.format, &docs).await?;

    let output = args
        .output
        .unwrap_or_else(|| args.format.default_file_name().into());
    fs::write(&output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;

    info!(bytes = bytes.len(), "export received");
    println!("Saved {}", output.display());
    Ok(())
}

pub async fn copy(ctx: &mut AppContext, id: Option<i64>) -> Result<()> {
    let document = db::fetch_document(id, &ctx.db)
        .await?
        .ok_or_else(|| match id {
            Some(id) => anyhow!("no saved document with id {}", id),
            None => anyhow!("no saved document; run `docgen generate` first"),
        })?;

    print_document(&document.content)
}

pub async fn documents(ctx: &mut AppContext) -> Result<()> {
    let documents = db::fetch_documents(&ctx.db).await?;
    if documents.is_empty() {
        println!("No saved documents.");
    }

    for document in documents {
        let record = document
            .record_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let title = document
            .content
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .trim_start_matches('#')
            .trim();
        println!(
            "{:>4}  {}  {:<10}  {:<20}  record {:<6}  {}",
            document.id, document.created_at, document.outcome, document.model, record, title
        );
    }

    Ok(())
}

pub async fn model(ctx: &mut AppContext, model: Option<ModelId>) -> Result<()> {
    if let Some(model) = model {
        let conn = ctx.db.lock().await;
        ctx.app_state
            .select_model(&conn, model)
            .context("failed to save selected model")?;
    }

    println!("{}", ctx.app_state.model());
    Ok(())
}

pub async fn theme(ctx: &mut AppContext, action: Option<ThemeAction>) -> Result<()> {
    let conn = ctx.db.lock().await;
    match action {
        None => {}
        Some(ThemeAction::Toggle) => {
            ctx.app_state.toggle_theme(&conn)?;
        }
        Some(ThemeAction::Set { theme }) => ctx.app_state.set_theme(&conn, theme)?,
    }

    println!("{}", ctx.app_state.theme());
    Ok(())
}

fn print_document(content: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        writeln!(stdout)?;
    }
    stdout.flush()?;
    Ok(())
}

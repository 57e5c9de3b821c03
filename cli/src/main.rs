use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use frames::{GenerationEvent, InputMode, LiveEditorEvent, Stack};
use pixelforge::api::{ApiClient, ApiError, SaveCodeRequest};
use pixelforge::channel::ws::WsConnector;
use pixelforge::channel::{ChannelError, Inbound, SessionChannel};
use pixelforge::config::{ClientConfig, ConfigError};
use pixelforge::dispatcher::{DispatchError, GenerationContext, GenerationDispatcher, Outcome, Rollback};
use pixelforge::live_editor::{LiveEditor, LiveEditorError};
use pixelforge::selection::{AddOutcome, ElementDescriptor};
use pixelforge::state::{ActiveMode, AppState, SessionState, ThemePreference};
use pixelforge::storage::{FileStore, StorageError};
use pixelforge::timeline::ChatRole;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("state storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Dispatch(#[from] DispatchError),
    #[error("{0}")]
    LiveEditor(#[from] LiveEditorError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("generation cancelled")]
    Cancelled,
    #[error("no code was generated")]
    NoCode,
    #[error("no project path configured; pass --project or run `projects open`")]
    NoProject,
}

#[derive(Parser, Debug)]
#[command(name = "pixelforge", about = "Screenshot-to-code and live editor client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate code from a prompt or screenshot, then apply updates in order.
    Generate(GenerateArgs),
    /// Load existing code as the first version and print it. Nothing is kept
    /// afterwards; use `generate --from-file` to update imported code.
    Import(ImportArgs),
    /// Send one instruction to the live editor for the current project.
    Edit(EditArgs),
    Session(SessionCommand),
    Projects(ProjectsCommand),
    /// Save a file of generated code into a project through the backend.
    Save(SaveArgs),
}

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["text", "image", "from_file"])))]
struct GenerateArgs {
    #[arg(long)]
    text: Option<String>,

    #[arg(long, help = "Screenshot URL or data URL; repeat for several")]
    image: Vec<String>,

    #[arg(long, help = "Import this file as the first version instead of generating one")]
    from_file: Option<PathBuf>,

    #[arg(long, default_value_t = false, requires = "image")]
    video: bool,

    #[arg(long, help = "Follow-up instruction applied to the result; repeatable")]
    update: Vec<String>,

    #[arg(
        long,
        requires = "update",
        help = "outerHTML of the element the first --update refers to (html_tailwind and html_css only)"
    )]
    element_html: Option<String>,

    #[arg(long, value_parser = parse_stack)]
    stack: Option<Stack>,

    #[arg(long, help = "Write the final code here instead of stdout")]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    #[arg(long)]
    file: PathBuf,

    #[arg(long, value_parser = parse_stack, default_value = "html_tailwind")]
    stack: Stack,
}

#[derive(Args, Debug)]
struct EditArgs {
    message: String,

    #[arg(long)]
    project: Option<String>,

    #[arg(long, help = "Selected element as JSON (tagName, xpath, outerHTML, ...); repeatable")]
    element: Vec<String>,
}

#[derive(Args, Debug)]
struct SessionCommand {
    #[command(subcommand)]
    command: SessionSubcommand,
}

#[derive(Subcommand, Debug)]
enum SessionSubcommand {
    Show,
    /// Forget the live editor session identity.
    Clear,
    /// Set the theme: light, dark or system.
    Theme {
        #[arg(value_parser = parse_theme)]
        theme: ThemePreference,
    },
}

#[derive(Args, Debug)]
struct ProjectsCommand {
    #[command(subcommand)]
    command: ProjectsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProjectsSubcommand {
    List,
    Open {
        path: String,
        #[arg(long)]
        dev_server_url: Option<String>,
    },
}

#[derive(Args, Debug)]
struct SaveArgs {
    #[arg(long)]
    file: PathBuf,

    #[arg(long)]
    project: String,

    #[arg(long, help = "Path inside the project; the backend picks one when omitted")]
    target: Option<String>,

    #[arg(long, value_parser = parse_stack, default_value = "html_tailwind")]
    stack: Stack,
}

/// One wake-up of the generation loop.
enum Step {
    Inbound(Result<Inbound<GenerationEvent>, ChannelError>),
    Interrupt,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let session = SessionState::load(Box::new(FileStore::open(&config.state_file)?));

    match cli.command {
        Command::Generate(args) => run_generate(&config, session, args).await,
        Command::Import(args) => run_import(&config, session, args),
        Command::Edit(args) => run_edit(&config, session, args).await,
        Command::Session(cmd) => run_session(session, cmd),
        Command::Projects(cmd) => run_projects(&config, session, cmd).await,
        Command::Save(args) => run_save(&config, session, args).await,
    }
}

// =============================================================================
// GENERATE
// =============================================================================

async fn run_generate(config: &ClientConfig, mut session: SessionState, args: GenerateArgs) -> Result<(), CliError> {
    session.switch_mode(ActiveMode::ScreenshotToCode);
    let stack = args.stack.unwrap_or(config.settings.generated_code_config);
    check_element_stack(stack, args.element_html.as_deref())?;

    let mut state = AppState::new(session);
    let mut dispatcher = GenerationDispatcher::new(config.settings.clone(), config.variant_capacity);
    dispatcher.set_stack(stack);
    let mut channel = SessionChannel::new(config.generate_url(), Arc::new(WsConnector), config.retry);

    if let Some(path) = &args.from_file {
        let code = fs::read_to_string(path)?;
        let hash = dispatcher.import_from_code(&mut state, &code, stack)?;
        eprintln!("imported {} as {hash}", path.display());
    } else {
        let ctx = match args.text {
            Some(text) => dispatcher.create_from_text(&mut state, &mut channel, &text).await?,
            None => {
                let mode = if args.video { InputMode::Video } else { InputMode::Image };
                dispatcher.create_from_images(&mut state, &mut channel, args.image, mode).await?
            }
        };
        follow_generation(&mut dispatcher, &mut state, &mut channel, &ctx).await?;
    }

    for (index, instruction) in args.update.iter().enumerate() {
        eprintln!("updating: {instruction}");
        let element = if index == 0 { args.element_html.as_deref() } else { None };
        let ctx = dispatcher.update(&mut state, &mut channel, instruction, element, Vec::new()).await?;
        follow_generation(&mut dispatcher, &mut state, &mut channel, &ctx).await?;
    }

    let head = state.project.commits.head_commit().ok_or(CliError::NoCode)?;
    for (index, variant) in head.variants.iter().enumerate() {
        if let Some(message) = variant.error_message() {
            eprintln!("variant {index} failed: {message}");
        }
    }
    let code = head.selected_variant().map(|v| v.code.as_str()).unwrap_or_default();
    if code.is_empty() {
        return Err(CliError::NoCode);
    }

    eprintln!("commit {}", head.hash);
    match args.out {
        Some(path) => {
            fs::write(&path, code)?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{code}"),
    }
    Ok(())
}

/// Pump one generation to its end. Ctrl-C asks the backend to stop and keeps
/// listening until the cancellation is confirmed.
async fn follow_generation(
    dispatcher: &mut GenerationDispatcher,
    state: &mut AppState,
    channel: &mut SessionChannel<GenerationEvent>,
    ctx: &GenerationContext,
) -> Result<(), CliError> {
    let mut interrupted = false;
    let outcome = loop {
        let step = tokio::select! {
            inbound = channel.recv() => Step::Inbound(inbound),
            _ = tokio::signal::ctrl_c(), if !interrupted => Step::Interrupt,
        };
        match step {
            Step::Interrupt => {
                interrupted = true;
                eprintln!("cancelling...");
                dispatcher.cancel(channel).await;
            }
            Step::Inbound(Ok(Inbound::Event(event))) => {
                let outcome = dispatcher.apply(state, ctx, event);
                if outcome.is_terminal() {
                    channel.disconnect().await;
                    break outcome;
                }
            }
            Step::Inbound(Ok(Inbound::Closed(kind))) => break dispatcher.on_closed(state, ctx, kind)?,
            Step::Inbound(Err(e)) => break dispatcher.on_channel_error(state, ctx, &e),
        }
    };

    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Failed(message) => Err(CliError::GenerationFailed(message)),
        Outcome::Cancelled(Rollback::Reset) => Err(CliError::Cancelled),
        Outcome::Cancelled(Rollback::RevertedTo(hash)) => {
            eprintln!("reverted to {hash}");
            Err(CliError::Cancelled)
        }
        Outcome::Pending | Outcome::Ignored => Ok(()),
    }
}

fn run_import(config: &ClientConfig, session: SessionState, args: ImportArgs) -> Result<(), CliError> {
    let code = fs::read_to_string(&args.file)?;
    let mut state = AppState::new(session);
    let mut dispatcher = GenerationDispatcher::new(config.settings.clone(), config.variant_capacity);

    let hash = dispatcher.import_from_code(&mut state, &code, args.stack)?;
    let commit = state.project.commits.get(&hash).ok_or(CliError::NoCode)?;
    print_json(&serde_json::to_value(commit)?)
}

// =============================================================================
// LIVE EDITOR
// =============================================================================

async fn run_edit(config: &ClientConfig, mut session: SessionState, args: EditArgs) -> Result<(), CliError> {
    session.switch_mode(ActiveMode::LiveEditor);
    let mut editor = LiveEditor::new(config.max_selected_elements);
    if let Some(project) = &args.project {
        editor.set_project_path(&mut session, project)?;
    }
    if session.project_path().is_none() {
        return Err(CliError::NoProject);
    }
    for raw in &args.element {
        let descriptor: ElementDescriptor = serde_json::from_str(raw)?;
        match editor.selection_mut().add(descriptor) {
            AddOutcome::Added(_) | AddOutcome::Duplicate => {}
            AddOutcome::AtCapacity => eprintln!("selection full; ignoring further elements"),
        }
    }

    let mut channel: SessionChannel<LiveEditorEvent> =
        SessionChannel::new(config.live_editor_url(), Arc::new(WsConnector), config.retry);
    editor.send_message(&session, &mut channel, &args.message).await?;
    let drained = editor.drive(&mut session, &mut channel).await;
    channel.disconnect().await;

    for message in editor.timeline().messages() {
        match message.role {
            ChatRole::User => {}
            ChatRole::Assistant => println!("{}", message.content),
            ChatRole::Tool => {
                if let Some(activity) = &message.tool_activity {
                    println!("  [{}]", activity.describe());
                }
            }
        }
    }
    if let Some(id) = session.session_id() {
        eprintln!("session {id}");
    }
    drained?;
    Ok(())
}

fn run_session(mut session: SessionState, cmd: SessionCommand) -> Result<(), CliError> {
    match cmd.command {
        SessionSubcommand::Show => print_json(&serde_json::json!({
            "project_path": session.project_path(),
            "project_name": session.project_name(),
            "dev_server_url": session.dev_server_url(),
            "session_id": session.session_id(),
            "last_saved_file": session.last_saved_file(),
            "theme": session.theme(),
        })),
        SessionSubcommand::Clear => {
            session.new_session()?;
            println!("session cleared");
            Ok(())
        }
        SessionSubcommand::Theme { theme } => {
            session.set_theme(theme)?;
            println!("theme {}", theme.as_str());
            Ok(())
        }
    }
}

async fn run_projects(config: &ClientConfig, mut session: SessionState, cmd: ProjectsCommand) -> Result<(), CliError> {
    match cmd.command {
        ProjectsSubcommand::List => print_json(&serde_json::to_value(session.recent_projects())?),
        ProjectsSubcommand::Open { path, dev_server_url } => {
            if let Some(url) = &dev_server_url {
                ApiClient::new(&config.http_base_url)?.configure_app_proxy(url).await?;
            }
            session.set_project(&path, dev_server_url)?;
            println!("opened {}", session.project_name().unwrap_or(&path));
            Ok(())
        }
    }
}

async fn run_save(config: &ClientConfig, mut session: SessionState, args: SaveArgs) -> Result<(), CliError> {
    let code = fs::read_to_string(&args.file)?;
    let request = SaveCodeRequest {
        code,
        project_path: args.project,
        file_path: args.target,
        stack: args.stack,
    };
    let result = ApiClient::new(&config.http_base_url)?.save_code(&request).await?;
    session.record_saved_file(&result.file_path)?;
    println!("{} ({})", result.rel_path, result.url_path);
    if !result.message.is_empty() {
        eprintln!("{}", result.message);
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn parse_stack(raw: &str) -> Result<Stack, String> {
    Stack::from_name(raw).ok_or_else(|| {
        let names: Vec<&str> = Stack::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown stack `{raw}`; expected one of {}", names.join(", "))
    })
}

/// Refuse a selected element up front so no generation runs before the
/// update would be rejected.
fn check_element_stack(stack: Stack, element_html: Option<&str>) -> Result<(), CliError> {
    if element_html.is_some() && !stack.supports_select_and_edit() {
        return Err(DispatchError::SelectionUnsupported(stack).into());
    }
    Ok(())
}

fn parse_theme(raw: &str) -> Result<ThemePreference, String> {
    ThemePreference::from_name(raw).ok_or_else(|| format!("unknown theme `{raw}`; expected light, dark or system"))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

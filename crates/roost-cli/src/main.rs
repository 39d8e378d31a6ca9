mod prompt;
mod setup_flow;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use roost_core::config::{self, InstallRecord, RoostConfig};
use roost_core::doctor::{self, Severity};
use roost_core::error::RoostError;
use roost_core::install::{self, InstallOptions, SystemRunner};
use roost_core::launch::{Launcher, Mode, ReadyState, Status};
use roost_core::update::{self, DashboardFreshness};
use roost_core::users::{Role, UserStore};
use roost_core::workspace::{self, InitAnswers, WorkspaceConfig};

use prompt::{Prompter, StdinPrompter};
use setup_flow::SetupOutcome;
use ui::{ConsoleUi, Ui};

#[derive(Parser)]
#[command(name = "roost", about = "Roost: AI companion workspace and dashboard manager", version)]
enum Cli {
    /// Create a workspace interactively (and optionally install the dashboard)
    Init {
        /// Workspace directory (default from config)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Provision the first admin, or manage dashboard users
    Setup {
        #[command(subcommand)]
        action: Option<SetupAction>,
    },
    /// Manage the dashboard process
    Dashboard {
        #[command(subcommand)]
        action: DashboardAction,
    },
    /// Update the installed dashboard to the latest release
    Update {
        /// Only report what would change
        #[arg(long)]
        check: bool,
    },
    /// Run health checks over the workspace, tools, and data directory
    Doctor {
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a short health and liveness summary
    Status,
    /// Reconfigure the companion identity document
    Persona {
        /// Workspace directory (default: walk up from the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Install a license key, or show the current tier
    License {
        /// License key to install (omit to show the current tier)
        key: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum SetupAction {
    /// Manage dashboard users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(clap::Subcommand)]
enum UserAction {
    /// Add a user with a generated password
    Add {
        email: String,
        /// Access role (view, edit, admin)
        #[arg(long, default_value = "view")]
        role: String,
    },
    /// List users
    List {
        /// Output raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete a user and their sessions
    Delete { email: String },
    /// Regenerate a user's password and revoke their sessions
    Reset { email: String },
}

#[derive(clap::Subcommand)]
enum DashboardAction {
    /// Start the dashboard detached
    Start {
        /// Install directory (default from the install record)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Port to serve on (default from config)
        #[arg(long)]
        port: Option<u16>,
        /// Run the production build (`npm run start`)
        #[arg(long, conflicts_with = "dev")]
        prod: bool,
        /// Run in development mode (`npm run dev`, the default)
        #[arg(long)]
        dev: bool,
    },
    /// Stop the dashboard
    Stop,
    /// Stop then start
    Restart,
    /// Show whether the dashboard is running
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = match RoostConfig::load(find_workspace_dir(None).as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(%err, "could not load config; falling back to defaults");
            RoostConfig::default()
        }
    };

    let ui = ConsoleUi;
    let mut prompter = StdinPrompter;

    if let Err(err) = run(cli, &config, &ui, &mut prompter).await {
        // AlreadyRunning is a benign condition, not a failure.
        if let Some(RoostError::AlreadyRunning(pid)) = err.downcast_ref::<RoostError>() {
            ui.warn(&format!("Dashboard is already running (pid {pid})."));
            return Ok(());
        }
        ui.error(&format!("{err:#}"));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    cli: Cli,
    config: &RoostConfig,
    ui: &dyn Ui,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    let data_dir = config::resolve_data_dir(config);

    match cli {
        Cli::Init { dir } => cmd_init(dir, config, &data_dir, ui, prompter).await,
        Cli::Setup { action: None } => cmd_setup(&data_dir, ui, prompter).await,
        Cli::Setup {
            action: Some(SetupAction::User { action }),
        } => cmd_user(action, &data_dir, ui).await,
        Cli::Dashboard { action } => cmd_dashboard(action, config, &data_dir, ui).await,
        Cli::Update { check } => cmd_update(check, config, &data_dir, ui).await,
        Cli::Doctor { json } => cmd_doctor(json, &data_dir, ui),
        Cli::Status => cmd_status(config, &data_dir, ui),
        Cli::Persona { dir } => cmd_persona(dir, ui, prompter),
        Cli::License { key } => cmd_license(key, &data_dir, ui),
    }
}

/// Workspace directory: explicit flag, else walk up from the current
/// directory to the nearest `roost.json`.
fn find_workspace_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().ok()?;
    workspace::find_workspace(&cwd)
}

async fn cmd_init(
    dir: Option<PathBuf>,
    config: &RoostConfig,
    data_dir: &Path,
    ui: &dyn Ui,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    let runner = SystemRunner;
    let node = install::check_prerequisites(&runner)?;
    ui.success(&format!("Prerequisites OK (node {node})"));

    let ws_dir = dir.unwrap_or_else(|| PathBuf::from(&config.workspace.default_dir));
    if workspace::dir_is_nonempty(&ws_dir)? {
        let proceed = prompter.confirm(
            &format!("{} is not empty. Initialize anyway?", ws_dir.display()),
            false,
        )?;
        if !proceed {
            ui.info("Init cancelled.");
            return Ok(());
        }
    }

    ui.plain("");
    ui.plain(&format!("{}", "Companion identity".cyan()));
    let answers = ask_identity(prompter)?;

    workspace::init_workspace(&ws_dir, &answers)?;
    ui.success(&format!("Workspace created at {}", ws_dir.display()));

    if let Some(ref peer_url) = config.dashboard.peer_url {
        if !install::check_peer_service(peer_url).await? {
            let proceed = prompter.confirm(
                &format!("Peer service at {peer_url} is unreachable. Continue without it?"),
                false,
            )?;
            if !proceed {
                ui.info("Init stopped before dashboard install.");
                return Ok(());
            }
            ui.warn("Continuing in degraded mode.");
        }
    }

    if !prompter.confirm("Install the dashboard now?", true)? {
        ui.info("Skipping dashboard install. Run `roost setup` later.");
        return Ok(());
    }

    let target = ws_dir.join("dashboard");
    let mut options = InstallOptions {
        repo_url: config.dashboard.repo_url.clone(),
        clear_existing: false,
    };
    if workspace::dir_is_nonempty(&target)? {
        options.clear_existing = prompter.confirm(
            &format!("{} already exists. Remove and reinstall?", target.display()),
            false,
        )?;
        if !options.clear_existing {
            ui.info("Keeping the existing install.");
            return Ok(());
        }
    }

    let outcome = install::install(&target, data_dir, &options, &runner)?;
    ui.success(&format!(
        "Dashboard {} installed at {}",
        outcome.version,
        outcome.install_dir.display()
    ));
    if !outcome.build_ok {
        ui.warn("Build failed; the dashboard will run in dev mode only.");
    }

    // First admin, then bring the dashboard up.
    cmd_setup(data_dir, ui, prompter).await?;

    if prompter.confirm("Start the dashboard now?", true)? {
        start_dashboard(
            &outcome.install_dir,
            if outcome.build_ok { Mode::Prod } else { Mode::Dev },
            config.dashboard.port,
            config,
            ui,
        )
        .await?;
    }
    Ok(())
}

fn ask_identity(prompter: &mut dyn Prompter) -> Result<InitAnswers> {
    let defaults = InitAnswers::default();
    Ok(InitAnswers {
        ai_name: prompter.ask_default("Companion name", &defaults.ai_name)?,
        personality: prompter.ask_default("Personality", &defaults.personality)?,
        communication_style: prompter
            .ask_default("Communication style", &defaults.communication_style)?,
        special_instructions: prompter
            .ask_default("Special instructions", &defaults.special_instructions)?,
        user_name: prompter.ask_default("Your name", &defaults.user_name)?,
        user_role: prompter.ask_default("Your role", &defaults.user_role)?,
        user_timezone: prompter.ask_default("Your timezone", &defaults.user_timezone)?,
        user_preferences: prompter
            .ask_default("Preferences", &defaults.user_preferences)?,
    })
}

async fn cmd_setup(data_dir: &Path, ui: &dyn Ui, prompter: &mut dyn Prompter) -> Result<()> {
    let store = UserStore::open(UserStore::db_path(data_dir))?;

    match setup_flow::run_first_admin(&store, ui, prompter).await? {
        SetupOutcome::Created { user, password } => {
            ui.success(&format!("Admin {} created.", user.email));
            show_password_once(ui, &password);
        }
        SetupOutcome::PasswordReset { email, password } => {
            ui.success(&format!("Password for {email} reset; all sessions revoked."));
            show_password_once(ui, &password);
        }
        SetupOutcome::Aborted => {
            ui.info("Setup cancelled. Nothing was changed.");
        }
    }
    Ok(())
}

fn show_password_once(ui: &dyn Ui, password: &str) {
    ui.plain("");
    ui.plain(&format!("  Password: {}", password.bold()));
    ui.plain("");
    ui.warn("This password is shown once and cannot be recovered. Store it now.");
}

async fn cmd_user(action: UserAction, data_dir: &Path, ui: &dyn Ui) -> Result<()> {
    let store = UserStore::open(UserStore::db_path(data_dir))?;

    match action {
        UserAction::Add { email, role } => {
            let role: Role = role.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let (user, password) = store.create_user(&email, role).await?;
            ui.success(&format!("User {} added with role {}.", user.email, user.role));
            show_password_once(ui, &password);
        }
        UserAction::List { json } => {
            let users = store.list_users().await?;
            if json {
                ui.plain(&serde_json::to_string_pretty(&users)?);
                return Ok(());
            }
            if users.is_empty() {
                ui.info("No users yet. Run `roost setup` to create the first admin.");
                return Ok(());
            }
            // Pad before coloring: width formatting counts ANSI escapes.
            let header = user_table_row("ID", "EMAIL", "ROLE", "LAST LOGIN");
            ui.plain(&header.bold().to_string());
            for user in users {
                let last_login = user
                    .last_login
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                ui.plain(&user_table_row(
                    &user.id.to_string(),
                    &user.email,
                    &user.role.to_string(),
                    &last_login,
                ));
            }
        }
        UserAction::Delete { email } => {
            store.delete_user(&email).await?;
            ui.success(&format!("User {email} and their sessions deleted."));
        }
        UserAction::Reset { email } => {
            let password = store.reset_password(&email).await?;
            ui.success(&format!("Password for {email} reset; all sessions revoked."));
            show_password_once(ui, &password);
        }
    }
    Ok(())
}

fn user_table_row(id: &str, email: &str, role: &str, last_login: &str) -> String {
    format!("{id:<5} {email:<32} {role:<7} {last_login}")
}

fn require_install(data_dir: &Path) -> Result<InstallRecord> {
    InstallRecord::load(data_dir)
        .context("no dashboard installation found. Run `roost init` first")
}

async fn cmd_dashboard(
    action: DashboardAction,
    config: &RoostConfig,
    data_dir: &Path,
    ui: &dyn Ui,
) -> Result<()> {
    match action {
        DashboardAction::Start { dir, port, prod, dev: _ } => {
            let install_dir = match dir {
                Some(dir) => dir,
                None => PathBuf::from(require_install(data_dir)?.install_dir),
            };
            let mode = if prod { Mode::Prod } else { Mode::Dev };
            let port = port.unwrap_or(config.dashboard.port);
            start_dashboard(&install_dir, mode, port, config, ui).await
        }
        DashboardAction::Stop => {
            let record = require_install(data_dir)?;
            let launcher = Launcher::new(&record.install_dir);
            if launcher.stop()? {
                ui.success("Dashboard stopped.");
            } else {
                ui.info("Dashboard was not running.");
            }
            Ok(())
        }
        DashboardAction::Restart => {
            let record = require_install(data_dir)?;
            let launcher = Launcher::new(&record.install_dir);
            launcher.stop()?;
            start_dashboard(
                Path::new(&record.install_dir),
                Mode::Dev,
                config.dashboard.port,
                config,
                ui,
            )
            .await
        }
        DashboardAction::Status => {
            let record = require_install(data_dir)?;
            let launcher = Launcher::new(&record.install_dir);
            match launcher.status() {
                Status::Running(pid) => {
                    ui.success(&format!("Dashboard running (pid {pid})."));
                }
                Status::Stopped => ui.info("Dashboard is stopped."),
                Status::Stale(pid) => {
                    // The status path is where stale records get cleaned up.
                    launcher.clear_stale()?;
                    ui.warn(&format!(
                        "Dashboard process {pid} is gone; stale record cleared."
                    ));
                }
            }
            Ok(())
        }
    }
}

async fn start_dashboard(
    install_dir: &Path,
    mode: Mode,
    port: u16,
    config: &RoostConfig,
    ui: &dyn Ui,
) -> Result<()> {
    let launcher = Launcher::new(install_dir).with_poll(
        config.dashboard.readiness_attempts,
        std::time::Duration::from_secs(config.dashboard.readiness_interval_secs),
    );
    let result = launcher.start(mode, port).await?;

    match result.ready {
        ReadyState::Ready => ui.success(&format!(
            "Dashboard ready at http://localhost:{port}/ (pid {})",
            result.pid
        )),
        ReadyState::NotReady => {
            ui.warn(&format!(
                "Dashboard spawned (pid {}) but did not answer yet. Check {}.",
                result.pid,
                result.log_path.display()
            ));
        }
    }
    Ok(())
}

async fn cmd_update(check: bool, config: &RoostConfig, data_dir: &Path, ui: &dyn Ui) -> Result<()> {
    let record = InstallRecord::load(data_dir);
    let release = update::latest_release(&config.update.repo)
        .await
        .context("failed to query the latest release")?;

    match update::compare(record.as_ref(), &release.version) {
        DashboardFreshness::NotInstalled => {
            ui.info(&format!(
                "Dashboard is not installed. Latest release is {}.",
                release.version
            ));
            return Ok(());
        }
        DashboardFreshness::UpToDate { current } => {
            ui.success(&format!("Dashboard {current} is up to date."));
            return Ok(());
        }
        DashboardFreshness::Unknown => {
            ui.warn("Installed dashboard version is unknown; updating anyway.");
        }
        DashboardFreshness::Outdated { current, latest } => {
            ui.plain(&format!(
                "Dashboard {} -> {}",
                current.to_string().yellow(),
                latest.to_string().green()
            ));
        }
    }

    if check {
        ui.info("Run `roost update` to apply.");
        return Ok(());
    }

    let mut record = record.context("install record disappeared")?;
    let install_dir = PathBuf::from(&record.install_dir);
    let build_ok = update::update_dashboard(&install_dir, &SystemRunner)?;

    record.source_version = release.version.to_string();
    record.save(data_dir)?;

    if build_ok {
        ui.success(&format!("Dashboard updated to {}.", release.version));
    } else {
        ui.warn(&format!(
            "Dashboard updated to {} but the build failed; dev mode only.",
            release.version
        ));
    }
    Ok(())
}

fn cmd_doctor(json: bool, data_dir: &Path, ui: &dyn Ui) -> Result<()> {
    let ws_dir = find_workspace_dir(None)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let report = doctor::run_all(&ws_dir, data_dir, &SystemRunner);

    if json {
        ui.plain(&serde_json::to_string_pretty(&report)?);
    } else if report.healthy() {
        ui.success("Everything looks good.");
    } else {
        for issue in &report.issues {
            let line = format!(
                "[{}] {}: {} ({})",
                issue.severity, issue.category, issue.description, issue.remediation
            );
            match issue.severity {
                Severity::Critical | Severity::Error => ui.error(&line),
                Severity::Warning => ui.warn(&line),
                Severity::Info => ui.info(&line),
            }
        }
        ui.plain("");
        ui.plain(&format!(
            "{} critical, {} error, {} warning, {} info",
            report.count(Severity::Critical),
            report.count(Severity::Error),
            report.count(Severity::Warning),
            report.count(Severity::Info)
        ));
    }

    if report.action_required() {
        ui.error("Action required.");
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_status(config: &RoostConfig, data_dir: &Path, ui: &dyn Ui) -> Result<()> {
    match find_workspace_dir(None) {
        Some(ws) => {
            ui.success(&format!("Workspace: {}", ws.display()));
            match WorkspaceConfig::load(&ws) {
                Ok(ws_config) => ui.plain(&format!(
                    "  Companion: {} ({})",
                    ws_config.ai.name, ws_config.ai.personality
                )),
                Err(_) => ui.warn("  roost.json is unreadable. Run `roost doctor`."),
            }
        }
        None => ui.info("No workspace found. Run `roost init`."),
    }

    match InstallRecord::load(data_dir) {
        Some(record) => {
            ui.success(&format!(
                "Dashboard: {} ({}, {} tier)",
                record.install_dir, record.source_version, record.tier
            ));
            let launcher = Launcher::new(&record.install_dir);
            match launcher.status() {
                Status::Running(pid) => {
                    ui.plain(&format!(
                        "  {} on port {} (pid {pid})",
                        "running".green(),
                        config.dashboard.port
                    ));
                }
                Status::Stopped => ui.plain(&format!("  {}", "stopped".dimmed())),
                Status::Stale(pid) => {
                    launcher.clear_stale()?;
                    ui.plain(&format!(
                        "  {} (process {pid} is gone; record cleared)",
                        "stale".yellow()
                    ));
                }
            }
        }
        None => ui.info("Dashboard: not installed."),
    }
    Ok(())
}

fn cmd_persona(dir: Option<PathBuf>, ui: &dyn Ui, prompter: &mut dyn Prompter) -> Result<()> {
    let ws_dir = find_workspace_dir(dir.as_deref())
        .context("no workspace found. Run `roost init` first")?;
    let mut ws_config = WorkspaceConfig::load(&ws_dir)?;

    ui.plain(&format!("{}", "Companion identity".cyan()));
    let mut answers = ask_identity_defaults(prompter, &ws_config)?;
    // Operator fields are not part of this flow.
    answers.user_name = ws_config.user.name.clone();
    answers.user_role = ws_config.user.role.clone();
    answers.user_timezone = ws_config.user.timezone.clone();

    workspace::write_persona(&ws_dir, &answers)?;
    ws_config.ai.name = answers.ai_name.clone();
    ws_config.ai.personality = answers.personality.clone();
    ws_config.save(&ws_dir)?;

    ui.success(&format!("{} rewritten.", workspace::PERSONA_FILE));
    Ok(())
}

fn ask_identity_defaults(
    prompter: &mut dyn Prompter,
    current: &WorkspaceConfig,
) -> Result<InitAnswers> {
    let defaults = InitAnswers::default();
    Ok(InitAnswers {
        ai_name: prompter.ask_default("Companion name", &current.ai.name)?,
        personality: prompter.ask_default("Personality", &current.ai.personality)?,
        communication_style: prompter
            .ask_default("Communication style", &defaults.communication_style)?,
        special_instructions: prompter
            .ask_default("Special instructions", &defaults.special_instructions)?,
        ..defaults
    })
}

fn cmd_license(key: Option<String>, data_dir: &Path, ui: &dyn Ui) -> Result<()> {
    match key {
        None => {
            let record = require_install(data_dir)?;
            ui.plain(&format!("License tier: {}", record.tier.to_string().bold()));
        }
        Some(key) => {
            let record = install::activate_license(data_dir, &key)?;
            ui.success(&format!("License installed. Tier is now {}.", record.tier));
        }
    }
    Ok(())
}

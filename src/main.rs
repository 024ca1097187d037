// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! authflow command-line client
//!
//! Signs up, signs in and manages API keys against the account API.
//! Configuration comes from the environment (see `Config::from_env`);
//! flags override it.

use anyhow::{anyhow, Context};
use authflow::{
    config::Config,
    error::ClientError,
    forms::{
        EmailLink, ForgotPasswordForm, FormFailure, LinkKind, LoginForm, ResetPasswordForm,
        SignupForm,
    },
    models::{ApiKeyUpdate, ProfileUpdate, ProgrammingLanguage, User},
    ClientState,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "authflow", about = "Account API client")]
struct Cli {
    /// Account API base URL (overrides API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Directory for remembered sessions (overrides AUTH_STORAGE_DIR)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account; an activation link is emailed
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long, env = "AUTHFLOW_PASSWORD", hide_env_values = true)]
        password: String,
        /// Defaults to --password
        #[arg(long)]
        confirm_password: Option<String>,
        /// Accept the Terms of Service and Privacy Policy
        #[arg(long)]
        agree_terms: bool,
    },
    /// Sign in
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTHFLOW_PASSWORD", hide_env_values = true)]
        password: String,
        /// Keep tokens for this process only
        #[arg(long)]
        no_remember: bool,
    },
    /// Sign out and forget stored tokens
    Logout,
    /// Show the signed-in user
    Me,
    /// Change profile fields
    UpdateProfile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        language: Option<ProgrammingLanguage>,
    },
    /// Activate an account from the emailed uid/token or link
    Activate {
        #[arg(required_unless_present = "link")]
        uid: Option<String>,
        #[arg(required_unless_present = "link")]
        token: Option<String>,
        #[arg(long, conflicts_with_all = ["uid", "token"])]
        link: Option<String>,
    },
    /// Send the activation email again
    ResendActivation { email: String },
    /// Request a password reset email
    ForgotPassword { email: String },
    /// Set a new password from an emailed reset link
    ResetPassword {
        #[arg(long)]
        link: String,
        #[arg(long, env = "AUTHFLOW_PASSWORD", hide_env_values = true)]
        password: String,
        /// Defaults to --password
        #[arg(long)]
        confirm_password: Option<String>,
    },
    /// Manage API keys
    Keys(KeysCommand),
}

#[derive(Args, Debug)]
struct KeysCommand {
    #[command(subcommand)]
    command: KeysSubcommand,
}

#[derive(Subcommand, Debug)]
enum KeysSubcommand {
    List,
    Create {
        #[arg(long, default_value = "Default")]
        name: String,
    },
    Show {
        id: String,
    },
    Rename {
        id: String,
        name: String,
    },
    /// Deactivate a key without deleting it
    Revoke {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url);
    }
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }
    tracing::debug!(api_url = %config.api_url, "Using account API");

    let state = ClientState::from_config(config)?;
    run(&state, cli.command).await
}

async fn run(state: &ClientState, command: Command) -> anyhow::Result<()> {
    let session = &state.session;

    match command {
        Command::Signup {
            email,
            full_name,
            password,
            confirm_password,
            agree_terms,
        } => {
            let form = SignupForm {
                full_name,
                email,
                confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
                password,
                agreed_to_terms: agree_terms,
            };
            let created = session
                .signup(&form)
                .await
                .map_err(|e| failure(FormFailure::signup(&e)))?;
            println!(
                "Account created for {}. Check your inbox for the activation link.",
                created.email
            );
        }
        Command::Login {
            email,
            password,
            no_remember,
        } => {
            let form = LoginForm {
                email,
                password,
                remember_me: !no_remember,
            };
            let user = session
                .login(&form)
                .await
                .map_err(|e| failure(FormFailure::login(&e)))?;
            println!("Welcome back, {}!", display_name(&user));
        }
        Command::Logout => {
            session.logout().await?;
            println!("Signed out.");
        }
        Command::Me => match session.restore().await? {
            Some(user) => print_user(&user),
            None => return Err(anyhow!("Not signed in")),
        },
        Command::UpdateProfile {
            full_name,
            language,
        } => {
            require_session(state).await?;
            let update = ProfileUpdate {
                full_name,
                preferred_language: language,
            };
            let user = session
                .update_profile(&update)
                .await
                .map_err(|e| failure(FormFailure::signup(&e)))?;
            print_user(&user);
        }
        Command::Activate { uid, token, link } => {
            let (uid, token) = match link {
                Some(link) => {
                    let link = parse_link(&link, LinkKind::Activation)?;
                    (link.uid, link.token)
                }
                None => (uid.unwrap_or_default(), token.unwrap_or_default()),
            };
            session
                .activate(&uid, &token)
                .await
                .map_err(|e| failure(FormFailure::signup(&e)))?;
            println!("Account activated. You can now sign in.");
        }
        Command::ResendActivation { email } => {
            session
                .resend_activation(&email)
                .await
                .map_err(|e| failure(FormFailure::signup(&e)))?;
            println!("Activation email sent!");
        }
        Command::ForgotPassword { email } => {
            let form = ForgotPasswordForm { email };
            session
                .forgot_password(&form)
                .await
                .map_err(|e| failure(FormFailure::signup(&e)))?;
            println!("If an account exists for that address, a reset link is on its way.");
        }
        Command::ResetPassword {
            link,
            password,
            confirm_password,
        } => {
            let link = parse_link(&link, LinkKind::PasswordReset)?;
            let confirm = confirm_password.unwrap_or_else(|| password.clone());
            let form = ResetPasswordForm::from_link(&link, &password, &confirm);
            session
                .reset_password(&form)
                .await
                .map_err(|e| failure(FormFailure::password_reset(&e)))?;
            println!("Password reset. You can now sign in with your new password.");
        }
        Command::Keys(keys) => {
            require_session(state).await?;
            run_keys(state, keys.command).await?;
        }
    }

    Ok(())
}

async fn run_keys(state: &ClientState, command: KeysSubcommand) -> anyhow::Result<()> {
    let keys = &state.api_keys;

    match command {
        KeysSubcommand::List => {
            let listed = keys.list().await.map_err(session_error)?;
            if listed.is_empty() {
                println!("No API keys.");
            }
            for key in listed {
                println!(
                    "{}  {}...  {:<8}  {}  last used {}",
                    key.id,
                    key.prefix,
                    if key.is_active { "active" } else { "revoked" },
                    key.name,
                    key.last_used_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
        }
        KeysSubcommand::Create { name } => {
            let created = keys.create(&name).await.map_err(session_error)?;
            println!("Created key {} ({})", created.name, created.id);
            println!("{}", created.key);
            eprintln!("This is the only time the full key is shown.");
        }
        KeysSubcommand::Show { id } => {
            let key = keys.get(&id).await.map_err(session_error)?;
            println!("{:#?}", key);
        }
        KeysSubcommand::Rename { id, name } => {
            let update = ApiKeyUpdate {
                name: Some(name),
                ..Default::default()
            };
            let key = keys.update(&id, &update).await.map_err(session_error)?;
            println!("Renamed key {} to {}", key.id, key.name);
        }
        KeysSubcommand::Revoke { id } => {
            let key = keys.revoke(&id).await.map_err(session_error)?;
            println!("Revoked key {} ({}...)", key.id, key.prefix);
        }
        KeysSubcommand::Delete { id } => {
            keys.delete(&id).await.map_err(session_error)?;
            println!("Deleted key {}", id);
        }
    }
    Ok(())
}

/// Load the stored session, failing early when nobody is signed in.
async fn require_session(state: &ClientState) -> anyhow::Result<()> {
    match state.session.restore().await? {
        Some(_) => Ok(()),
        None => Err(anyhow!("Not signed in; run `authflow login` first")),
    }
}

fn parse_link(input: &str, expected: LinkKind) -> anyhow::Result<EmailLink> {
    match EmailLink::parse(input) {
        Some(link) if link.kind == expected => Ok(link),
        _ => Err(anyhow!("Invalid link: {}", input)),
    }
}

fn session_error(err: ClientError) -> anyhow::Error {
    if err.is_auth_failure() {
        anyhow!("Your session has expired; sign in again")
    } else {
        err.into()
    }
}

fn failure(failure: FormFailure) -> anyhow::Error {
    let mut message = failure.message;
    for (field, detail) in failure.fields.iter() {
        message.push_str(&format!("\n  {}: {}", field, detail));
    }
    anyhow!(message)
}

fn display_name(user: &User) -> &str {
    if user.full_name.is_empty() {
        &user.email
    } else {
        &user.full_name
    }
}

fn print_user(user: &User) {
    println!("{} <{}>", display_name(user), user.email);
    println!("  id:          {}", user.id);
    println!("  joined:      {}", user.date_joined.to_rfc3339());
    if let Some(language) = user.preferred_language {
        println!("  language:    {:?}", language);
    }
    match user.agreed_at {
        Some(at) => println!("  terms:       accepted {}", at.to_rfc3339()),
        None if user.agreed_to_terms => println!("  terms:       accepted"),
        None => println!("  terms:       not accepted"),
    }
}

/// Initialize logging to stderr; `LOG_FORMAT=json` selects structured JSON.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("authflow=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

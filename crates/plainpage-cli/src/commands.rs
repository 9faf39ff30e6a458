use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use tracing::warn;

use plainpage_core::api::LOGIN_PATH;
use plainpage_core::{ApiClient, ApiError, Config, LoginOutcome, MemoryNavigator, SessionStore};

use crate::credentials::CredentialStore;
use crate::Command;

/// Client for one command. `location` is the page the command stands in
/// for; a login redirect carries it back as `returnTo`.
fn client(config: &Config, location: &str) -> Result<ApiClient> {
    let session = Arc::new(SessionStore::persistent(config.cache_dir()?));
    let navigator = Arc::new(MemoryNavigator::new(location));
    ApiClient::new(config, session, navigator).context("Failed to create API client")
}

pub async fn run(command: Command, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { username, remember } => login(config, username, remember).await,
        Command::Logout { forget } => logout(config, forget).await,
        Command::Whoami => whoami(config),
        Command::Info => info(config).await,
        Command::Get { path } => get(config, &path).await,
        Command::Profile { display_name } => profile(config, &display_name).await,
        Command::Passwd => passwd(config).await,
        Command::DeleteAccount { yes } => delete_account(config, yes).await,
    }
}

/// Turn a failed request into a message for the terminal
fn explain(error: ApiError) -> anyhow::Error {
    match error {
        ApiError::Redirected { location } => {
            anyhow::anyhow!("Login required (redirected to {location}). Run `plainpage login` first.")
        }
        ApiError::NotLoggedIn => anyhow::anyhow!("Not logged in. Run `plainpage login` first."),
        other => other.into(),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{}: ", label))?;
    Ok(password)
}

async fn login(config: &mut Config, username: Option<String>, remember: bool) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) if !name.is_empty() => name,
        _ => prompt("Username")?,
    };
    if username.is_empty() {
        bail!("Username required");
    }

    let remembered = CredentialStore::get_password(&config.server_url, &username);
    let from_keychain = remembered.is_some();
    let password = match remembered {
        Some(password) => password,
        None => prompt_password("Password")?,
    };

    let api = client(config, LOGIN_PATH)?;
    match api.login(&username, &password).await.map_err(explain)? {
        LoginOutcome::LoggedIn(user) => {
            if remember && !from_keychain {
                if let Err(e) = CredentialStore::store(&config.server_url, &username, &password) {
                    warn!(error = %e, "Failed to store credentials");
                }
            }
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!("Logged in as {}", user.name());
            Ok(())
        }
        LoginOutcome::InvalidCredentials => {
            if from_keychain {
                // the remembered password is stale, ask next time
                CredentialStore::forget(&config.server_url, &username);
            }
            bail!("Invalid username or password")
        }
        LoginOutcome::RateLimited { retry_after } => {
            bail!(
                "Too many login attempts, try again in {} seconds",
                retry_after.as_secs()
            )
        }
    }
}

async fn logout(config: &Config, forget: bool) -> Result<()> {
    let api = client(config, "/")?;
    let username = api.session().user().map(|u| u.username);
    api.logout().await;

    if forget {
        if let Some(username) = username.or_else(|| config.last_username.clone()) {
            CredentialStore::forget(&config.server_url, &username);
        }
    }
    println!("Logged out");
    Ok(())
}

fn whoami(config: &Config) -> Result<()> {
    let session = SessionStore::persistent(config.cache_dir()?).get();
    let Some(user) = session.user.as_ref() else {
        println!("Not logged in");
        return Ok(());
    };

    println!("{} ({})", user.name(), user.username);
    match session.expires_at() {
        Some(at) => println!(
            "Access token expires {} ({} min)",
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            session.minutes_until_expiry().unwrap_or(0)
        ),
        None => println!("Access token expiry unknown"),
    }
    Ok(())
}

async fn info(config: &Config) -> Result<()> {
    let api = client(config, "/")?;
    let app = api.app_info().await.map_err(explain)?;

    println!("{}", app.title());
    println!("Server:       {}", config.server_url);
    println!("Version:      {}", app.version_display());
    println!(
        "Registration: {}",
        if app.allows_registration() { "open" } else { "closed" }
    );
    if app.setup_mode {
        println!("Setup mode:   yes");
    }
    Ok(())
}

async fn get(config: &Config, path: &str) -> Result<()> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let api = client(config, &path)?;
    let value: serde_json::Value = api.get(&path).await.map_err(explain)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn profile(config: &Config, display_name: &str) -> Result<()> {
    let api = client(config, "/_profile")?;
    api.update_display_name(display_name).await.map_err(explain)?;
    println!("Display name set to {}", display_name);
    Ok(())
}

async fn passwd(config: &Config) -> Result<()> {
    let api = client(config, "/_profile")?;
    let Some(user) = api.session().user() else {
        return Err(explain(ApiError::NotLoggedIn));
    };

    let current = prompt_password("Current password")?;
    let new = prompt_password("New password")?;
    if new != prompt_password("Repeat new password")? {
        bail!("Passwords do not match");
    }

    api.change_password(&current, &new).await.map_err(explain)?;

    // a remembered password would now fail at the next login
    if CredentialStore::get_password(&config.server_url, &user.username).is_some() {
        if let Err(e) = CredentialStore::store(&config.server_url, &user.username, &new) {
            warn!(error = %e, "Failed to update remembered password");
        }
    }
    println!("Password changed");
    Ok(())
}

async fn delete_account(config: &Config, yes: bool) -> Result<()> {
    let api = client(config, "/_profile")?;
    let Some(user) = api.session().user() else {
        return Err(explain(ApiError::NotLoggedIn));
    };

    if !yes {
        let answer = prompt(&format!(
            "Delete account {} permanently? Type the username to confirm",
            user.username
        ))?;
        if answer != user.username {
            bail!("Aborted");
        }
    }
    let password = prompt_password("Password")?;

    api.delete_account(&password).await.map_err(explain)?;
    CredentialStore::forget(&config.server_url, &user.username);
    println!("Account {} deleted", user.username);
    Ok(())
}

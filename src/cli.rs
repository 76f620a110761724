use std::env;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use calshare::{
    calendar::{NewUser, UserRole},
    storage::config::Config,
    Backend,
};

pub const USAGE: &str = "Usage: calshare <command>

Commands:
  init                                          create the database schema
  add-user <username> <email> <display_name> <password> [--admin]
  login <email> <password>                      print a token pair for valid credentials
  issue-token <username>                        print an access/refresh token pair
  calendars <access_token>                      list calendars visible to the token's user
  stats <access_token>                          print event statistics (admin only)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliMode {
    Help,
    Init,
    AddUser {
        username: String,
        email: String,
        display_name: String,
        password: String,
        admin: bool,
    },
    Login { email: String, password: String },
    IssueToken { username: String },
    Calendars { access_token: String },
    Stats { access_token: String },
}

pub fn parse_cli_mode() -> Result<CliMode, String> {
    parse_args(env::args().skip(1))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliMode, String> {
    let mut admin = false;
    let mut positional = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliMode::Help),
            "--admin" => admin = true,
            flag if flag.starts_with("--") => return Err(format!("Unknown argument: {}", flag)),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(command) = positional.next() else {
        return Ok(CliMode::Help);
    };
    let mut required = |name: &str| {
        positional
            .next()
            .ok_or_else(|| format!("Missing <{}> for '{}'", name, command))
    };

    let mode = match command.as_str() {
        "init" => CliMode::Init,
        "add-user" => CliMode::AddUser {
            username: required("username")?,
            email: required("email")?,
            display_name: required("display_name")?,
            password: required("password")?,
            admin,
        },
        "login" => CliMode::Login {
            email: required("email")?,
            password: required("password")?,
        },
        "issue-token" => CliMode::IssueToken {
            username: required("username")?,
        },
        "calendars" => CliMode::Calendars {
            access_token: required("access_token")?,
        },
        "stats" => CliMode::Stats {
            access_token: required("access_token")?,
        },
        other => return Err(format!("Unknown command: {}", other)),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }
    if admin && !matches!(mode, CliMode::AddUser { .. }) {
        return Err("--admin only applies to add-user".to_string());
    }
    Ok(mode)
}

pub async fn run(mode: CliMode) -> Result<()> {
    match mode {
        CliMode::Help => println!("{USAGE}"),
        CliMode::Init => {
            let (config, _) = open_backend()?;
            println!("Database ready at {}", config.database.path.display());
        }
        CliMode::AddUser {
            username,
            email,
            display_name,
            password,
            admin,
        } => {
            let (_, backend) = open_backend()?;
            let role = if admin { UserRole::Admin } else { UserRole::User };
            let user = backend
                .users()
                .register_with_role(
                    NewUser {
                        display_name,
                        username,
                        email,
                        password,
                    },
                    role,
                )
                .await?;
            print_json(&user)?;
        }
        CliMode::Login { email, password } => {
            let (_, backend) = open_backend()?;
            let pair = backend.tokens().login(&email, &password)?;
            print_json(&pair)?;
        }
        CliMode::IssueToken { username } => {
            let (_, backend) = open_backend()?;
            let user = backend
                .store()
                .user_by_username(&username)?
                .ok_or_else(|| anyhow!("User \"{}\" not found", username))?;
            let pair = backend.tokens().issue(&user)?;
            print_json(&pair)?;
        }
        CliMode::Calendars { access_token } => {
            let (_, backend) = open_backend()?;
            let claim = backend.identify(Some(&access_token));
            let calendars = backend.calendars().my_calendars(claim.as_ref()).await?;
            print_json(&calendars)?;
        }
        CliMode::Stats { access_token } => {
            let (_, backend) = open_backend()?;
            let claim = backend.identify(Some(&access_token));
            let stats = backend.events().event_stats(claim.as_ref()).await?;
            print_json(&stats)?;
        }
    }

    Ok(())
}

fn open_backend() -> Result<(Config, Backend)> {
    let config = Config::load_or_create().context("loading config")?;
    let backend = Backend::from_config(&config).context("opening database")?;
    Ok((config, backend))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

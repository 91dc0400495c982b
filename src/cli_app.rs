//! Top-level CLI definition and dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::json;

use session_gatekeeper::audit::channel::{AuditLoggerConfig, spawn_logger};
use session_gatekeeper::audit::jsonl::JsonlConfig;
use session_gatekeeper::core::config::Config;
use session_gatekeeper::core::errors::{GateError, Result};
use session_gatekeeper::policy::bans::BanCategory;
use session_gatekeeper::policy::consoles::ConsolePlatform;
use session_gatekeeper::policy::facade::BanPolicyFacade;
use session_gatekeeper::policy::request::{
    BSSID, GAMECD, GSBRCD, IPADDR, MACADR, SessionRequest,
};
use session_gatekeeper::store::db::GateStore;

/// Session gatekeeper — ban checking and console registration admin tool.
#[derive(Debug, Parser)]
#[command(
    name = "gatekeeper",
    author,
    version,
    about = "Session Gatekeeper - ban and registration policy admin",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and seed missing override flags.
    Init,
    /// Evaluate a request record against every applicable gate.
    Check(CheckArgs),
    /// Manage ban records.
    Ban {
        #[command(subcommand)]
        command: BanCommand,
    },
    /// Manage stored settings.
    Setting {
        #[command(subcommand)]
        command: SettingCommand,
    },
    /// Inspect and activate registered consoles.
    Console {
        #[command(subcommand)]
        command: ConsoleCommand,
    },
    /// Manage the game allowlist.
    Game {
        #[command(subcommand)]
        command: GameCommand,
    },
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Request fields as key=value pairs (bssid, ipaddr, macadr, gsbrcd,
    /// csnum, gamecd).
    #[arg(value_name = "KEY=VALUE", required = true)]
    fields: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum BanCommand {
    /// Add a ban record.
    Add {
        /// Ban category: ap, ip, console, or profile.
        category: String,
        /// Identifier to ban within the category.
        identifier: String,
        /// Ban duration in hours from now.
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// List ban records, newest first.
    List,
}

#[derive(Debug, Subcommand)]
enum SettingCommand {
    /// Set a setting. Override flags accept 0 (enforce) or 1 (bypass).
    Set { name: String, value: String },
    /// List settings.
    List,
}

#[derive(Debug, Subcommand)]
enum ConsoleCommand {
    /// List registered consoles.
    List,
    /// Enable a console pending manual activation.
    Activate {
        mac_address: String,
        /// Platform: wii or other.
        #[arg(long, default_value = "wii")]
        platform: String,
    },
}

#[derive(Debug, Subcommand)]
enum GameCommand {
    /// Allow a 3-character game code prefix.
    Allow { prefix: String },
    /// List allowlisted prefixes.
    List,
}

/// Dispatch a parsed command line.
pub fn run(cli: &Cli) -> Result<()> {
    if cli.no_color {
        control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;
    let store = std::sync::Arc::new(GateStore::open(&config.paths.sqlite_db, &config.store)?);

    match &cli.command {
        Command::Init => {
            let seeded = store.seed_default_settings()?;
            println!(
                "initialized {} ({seeded} settings seeded)",
                config.paths.sqlite_db.display()
            );
            Ok(())
        }
        Command::Check(args) => run_check(&config, &store, args, cli.json),
        Command::Ban { command } => run_ban(&store, command, cli.json),
        Command::Setting { command } => run_setting(&store, command, cli.json),
        Command::Console { command } => run_console(&store, command, cli.json),
        Command::Game { command } => run_game(&store, command, cli.json),
    }
}

fn parse_request(fields: &[String]) -> Result<SessionRequest> {
    let mut req = SessionRequest::new();
    for field in fields {
        let Some((key, value)) = field.split_once('=') else {
            return Err(GateError::MalformedField {
                field: "request",
                details: format!("expected key=value, got {field:?}"),
            });
        };
        req.insert(key.trim(), value);
    }
    Ok(req)
}

fn run_check(
    config: &Config,
    store: &std::sync::Arc<GateStore>,
    args: &CheckArgs,
    json: bool,
) -> Result<()> {
    let req = parse_request(&args.fields)?;

    let audit = if config.audit.enabled {
        Some(spawn_logger(AuditLoggerConfig {
            jsonl: JsonlConfig {
                path: config.paths.jsonl_log.clone(),
                fallback_path: Some(config.paths.fallback_log.clone()),
                max_size_bytes: config.audit.max_log_bytes,
            },
            channel_capacity: config.audit.channel_capacity,
        })?)
    } else {
        None
    };

    let mut facade = BanPolicyFacade::new(std::sync::Arc::clone(store), &config.policy);
    if let Some((handle, _)) = &audit {
        facade = facade.with_audit(handle.clone());
    }

    // Gates that apply depend on which fields the record carries.
    let mut denials: Vec<String> = Vec::new();
    let mut results: Vec<(&str, String)> = Vec::new();

    let mut gate = |label: &'static str, denied: Option<bool>| {
        match denied {
            Some(true) => {
                denials.push(label.to_string());
                results.push((label, "deny".to_string()));
            }
            Some(false) => results.push((label, "allow".to_string())),
            None => results.push((label, "skipped".to_string())),
        }
    };

    gate(
        "access_point_ban",
        req.get(BSSID)
            .map(|_| facade.is_access_point_banned(&req))
            .transpose()?,
    );
    gate(
        "ip_ban",
        req.get(IPADDR)
            .map(|_| facade.is_ip_banned(&req))
            .transpose()?,
    );
    gate(
        "console_ban",
        req.get(MACADR)
            .map(|_| facade.is_console_banned(&req))
            .transpose()?,
    );
    gate(
        "profile_ban",
        req.get(GSBRCD)
            .map(|_| facade.is_profile_banned(&req))
            .transpose()?,
    );
    gate(
        "hardware_address",
        req.get(MACADR)
            .map(|_| facade.has_valid_hardware_address(&req).map(|ok| !ok))
            .transpose()?,
    );
    gate(
        "pending_console",
        req.get(MACADR)
            .map(|_| facade.is_console_pending(&req))
            .transpose()?,
    );
    gate(
        "game_allowlist",
        req.get(GAMECD)
            .map(|_| facade.is_game_allowed(&req).map(|ok| !ok))
            .transpose()?,
    );

    if let Some((handle, join)) = audit {
        handle.shutdown();
        let _ = join.join();
    }

    let overall = if denials.is_empty() { "allow" } else { "deny" };
    if json {
        let object: serde_json::Map<String, serde_json::Value> = results
            .iter()
            .map(|(label, verdict)| ((*label).to_string(), json!(verdict)))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "gates": object,
                "verdict": overall,
            }))?
        );
    } else {
        for (label, verdict) in &results {
            let rendered = match verdict.as_str() {
                "deny" => verdict.red().bold().to_string(),
                "allow" => verdict.green().to_string(),
                _ => verdict.dimmed().to_string(),
            };
            println!("{label:>18}  {rendered}");
        }
        if denials.is_empty() {
            println!("{}", "verdict: allow".green().bold());
        } else {
            println!("{} ({})", "verdict: deny".red().bold(), denials.join(", "));
        }
    }

    if denials.is_empty() {
        Ok(())
    } else {
        std::process::exit(2);
    }
}

fn parse_category(value: &str) -> Result<BanCategory> {
    BanCategory::parse(value).ok_or_else(|| GateError::MalformedField {
        field: "category",
        details: format!("expected ap, ip, console, or profile, got {value:?}"),
    })
}

fn parse_platform(value: &str) -> Result<ConsolePlatform> {
    ConsolePlatform::parse(value).ok_or_else(|| GateError::MalformedField {
        field: "platform",
        details: format!("expected wii or other, got {value:?}"),
    })
}

fn run_ban(store: &GateStore, command: &BanCommand, json: bool) -> Result<()> {
    match command {
        BanCommand::Add {
            category,
            identifier,
            hours,
        } => {
            let category = parse_category(category)?;
            let expires_at = chrono::Utc::now().timestamp() + hours * 3_600;
            store.add_ban(category, identifier, expires_at)?;
            println!("banned {identifier} ({category}) until unix {expires_at}");
            Ok(())
        }
        BanCommand::List => {
            let bans = store.list_bans()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&bans)?);
            } else {
                for ban in bans {
                    println!(
                        "{:10} {:30} expires {}",
                        ban.category.as_store_str(),
                        ban.identifier,
                        ban.expires_at
                    );
                }
            }
            Ok(())
        }
    }
}

fn run_setting(store: &GateStore, command: &SettingCommand, json: bool) -> Result<()> {
    match command {
        SettingCommand::Set { name, value } => {
            store.set_setting(name, value)?;
            println!("{name} = {value}");
            Ok(())
        }
        SettingCommand::List => {
            let settings = store.list_settings()?;
            if json {
                let object: serde_json::Map<String, serde_json::Value> = settings
                    .into_iter()
                    .map(|(name, value)| (name, json!(value)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&object)?);
            } else {
                for (name, value) in settings {
                    println!("{name:28} {value}");
                }
            }
            Ok(())
        }
    }
}

fn run_console(store: &GateStore, command: &ConsoleCommand, json: bool) -> Result<()> {
    match command {
        ConsoleCommand::List => {
            let consoles = store.list_consoles()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&consoles)?);
            } else {
                for console in consoles {
                    let state = if console.abuse_flagged {
                        "abuse-flagged".red().to_string()
                    } else if console.enabled {
                        "enabled".green().to_string()
                    } else {
                        "pending".yellow().to_string()
                    };
                    println!(
                        "{:14} {:6} serial={:10} {state}",
                        console.mac_address,
                        console.platform,
                        console.serial_number.as_deref().unwrap_or("-"),
                    );
                }
            }
            Ok(())
        }
        ConsoleCommand::Activate {
            mac_address,
            platform,
        } => {
            let platform = parse_platform(platform)?;
            if store.activate_console(mac_address, platform)? {
                println!("activated {mac_address} ({platform})");
            } else {
                println!("no pending record for {mac_address} ({platform})");
            }
            Ok(())
        }
    }
}

fn run_game(store: &GateStore, command: &GameCommand, json: bool) -> Result<()> {
    match command {
        GameCommand::Allow { prefix } => {
            store.add_allowed_game(prefix)?;
            println!("allowed prefix {prefix}");
            Ok(())
        }
        GameCommand::List => {
            let games = store.list_allowed_games()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&games)?);
            } else {
                for prefix in games {
                    println!("{prefix}");
                }
            }
            Ok(())
        }
    }
}

//! Coach CLI
//!
//! Command-line front end for progression and credit accounting.
//! `level`, `streak` and `cost` are pure calculators; everything else runs
//! against the configured store.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use coach_config::CoachConfig;
use coach_core::{
    level_for_xp, level_progress, next_streak, parse_activity_date, xp_to_next_level, ActivityStats,
    CostPolicy, Credits, TokenUsage, UserId,
};
use coach_engine::{ActivityKind, BillingEvent, Engine, MeteredAction};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "warn,coach=info,coach_engine=info,coach_store=info";

#[derive(Parser)]
#[command(name = "coach")]
#[command(about = "Fitness coach progression and credit accounting")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/coach/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Level and progress for an XP total
    Level {
        xp: u64,
    },

    /// Next streak value after an activity
    Streak {
        /// Current streak count
        #[arg(long, default_value_t = 0)]
        count: u32,

        /// Last active date (YYYY-MM-DD)
        #[arg(long)]
        last: Option<String>,

        /// Activity date (YYYY-MM-DD)
        #[arg(long)]
        activity: String,
    },

    /// Credit cost of an AI response
    Cost {
        /// Total tokens reported by the gateway; omit for unknown usage
        #[arg(long)]
        tokens: Option<u64>,

        /// fractional | whole_credits (default: from config)
        #[arg(long)]
        policy: Option<CostPolicy>,
    },

    /// Award XP directly
    Award {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        xp: u64,

        /// Activity date (default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Record a qualifying activity (weight_log | workout_completed)
    Activity {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        kind: ActivityKind,

        #[arg(long)]
        date: Option<String>,
    },

    /// Show the achievement catalog for a user
    Achievements {
        #[arg(long)]
        user: UserId,

        #[arg(long, default_value_t = 0.0)]
        weight_lost_kg: f64,

        #[arg(long, default_value_t = 0)]
        workouts: u32,

        #[arg(long, default_value_t = 0)]
        sugar_free_days: u32,
    },

    /// Show (or create) a credit account
    Account {
        #[arg(long)]
        user: UserId,

        /// Replace the balance (1..=10000 credits)
        #[arg(long)]
        set_credits: Option<Credits>,
    },

    /// Run a metered AI action
    Ask {
        #[arg(long)]
        user: UserId,

        #[command(flatten)]
        context: ContextArgs,

        #[command(subcommand)]
        action: AskCommands,
    },

    /// Apply a billing event (activated | canceled | expired)
    Billing {
        #[arg(long)]
        user: UserId,

        #[arg(long)]
        event: BillingEvent,
    },
}

#[derive(Args)]
struct ContextArgs {
    /// User context as a JSON object
    #[arg(long, global = true)]
    context: Option<String>,
}

#[derive(Subcommand)]
enum AskCommands {
    /// 7-day plan (the first one is free)
    WeeklyPlan {
        #[arg(long)]
        goal: String,

        #[arg(long = "pref")]
        preferences: Vec<String>,
    },

    /// Adjust the current plan from feedback
    AdjustPlan {
        #[arg(long)]
        feedback: String,
    },

    /// Free-form coaching chat
    Coach {
        message: String,
    },
}

#[derive(Serialize)]
struct LevelView {
    total_xp: u64,
    level: u64,
    xp_to_next_level: u64,
    progress: f64,
}

#[derive(Serialize)]
struct CostView {
    policy: CostPolicy,
    tokens: Option<u64>,
    cost: Credits,
    gate: Credits,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let json = cli.json;
    if let Err(e) = run(cli).await {
        let code = e
            .downcast_ref::<coach_core::Error>()
            .map(coach_core::Error::code)
            .unwrap_or("error");
        if json {
            println!("{}", serde_json::json!({ "error": code, "message": format!("{:#}", e) }));
        } else {
            eprintln!("error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = CoachConfig::load(cli.config.as_deref()).context("loading config")?;
    tracing::debug!(backend = ?config.store.backend, policy = %config.credits.cost_policy, "config loaded");
    let json = cli.json;

    match cli.command {
        Commands::Level { xp } => cmd_level(xp, json),
        Commands::Streak { count, last, activity } => cmd_streak(count, last, activity, json),
        Commands::Cost { tokens, policy } => {
            cmd_cost(tokens, policy.unwrap_or(config.credits.cost_policy), json)
        }
        command => {
            let engine = Engine::from_config(&config).await.context("starting engine")?;
            run_stateful(&engine, command, json).await
        }
    }
}

async fn run_stateful(engine: &Engine, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Award { user, xp, date } => {
            let award = engine.progression.award_xp(&user, xp, activity_date(date)?).await?;
            emit(json, &award, || {
                let mut line = format!(
                    "{}: +{} XP, total {} (level {}), streak {}",
                    user,
                    award.xp_awarded,
                    award.state.total_xp(),
                    award.state.level(),
                    award.state.streak_count()
                );
                if award.leveled_up {
                    line.push_str(" - level up!");
                }
                line
            })
        }
        Commands::Activity { user, kind, date } => {
            let award = engine
                .progression
                .record_activity(&user, kind, activity_date(date)?)
                .await?;
            emit(json, &award, || {
                format!(
                    "{}: {} +{} XP, total {} (level {}), streak {}",
                    user,
                    kind,
                    award.xp_awarded,
                    award.state.total_xp(),
                    award.state.level(),
                    award.state.streak_count()
                )
            })
        }
        Commands::Achievements {
            user,
            weight_lost_kg,
            workouts,
            sugar_free_days,
        } => {
            let stats = ActivityStats {
                weight_lost_kg,
                workouts_completed: workouts,
                sugar_free_days,
            };
            let list = engine.progression.achievements(&user, &stats).await?;
            emit(json, &list, || {
                list.iter()
                    .map(|a| format!("[{}] {}", if a.unlocked { "x" } else { " " }, a.label))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Account { user, set_credits } => {
            let account = match set_credits {
                Some(credits) => engine.credits.set_credits(&user, credits).await?,
                None => engine.credits.account(&user).await?,
            };
            emit(json, &account, || {
                format!(
                    "{}: {} credits, status {}, free plan {}",
                    account.user_id,
                    account.credits,
                    account.subscription_status,
                    if account.free_plan_used { "used" } else { "available" }
                )
            })
        }
        Commands::Ask { user, context, action } => {
            let context = parse_context(context.context.as_deref())?;
            let action = match action {
                AskCommands::WeeklyPlan { goal, preferences } => MeteredAction::WeeklyPlan {
                    context,
                    goal,
                    preferences,
                },
                AskCommands::AdjustPlan { feedback } => MeteredAction::AdjustPlan { context, feedback },
                AskCommands::Coach { message } => MeteredAction::Coach { context, message },
            };

            // metered runs require an existing account
            engine.credits.account(&user).await?;
            let outcome = engine.metering.run(&user, action).await?;
            emit(json, &outcome, || {
                let charge = if outcome.free_allowance {
                    "free plan".to_string()
                } else {
                    format!("charged {}", outcome.charged)
                };
                let audit = if outcome.audited { "" } else { ", not audited" };
                format!("{}\n\n({}, balance {}{})", outcome.text, charge, outcome.balance, audit)
            })
        }
        Commands::Billing { user, event } => {
            let account = engine.credits.apply_billing_event(&user, event).await?;
            emit(json, &account, || {
                format!("{}: subscription {}", account.user_id, account.subscription_status)
            })
        }
        Commands::Level { .. } | Commands::Streak { .. } | Commands::Cost { .. } => Ok(()),
    }
}

fn cmd_level(xp: u64, json: bool) -> Result<()> {
    let view = LevelView {
        total_xp: xp,
        level: level_for_xp(xp),
        xp_to_next_level: xp_to_next_level(xp),
        progress: level_progress(xp),
    };
    emit(json, &view, || {
        format!(
            "level {} ({:.0}% to next, {} XP needed)",
            view.level,
            view.progress * 100.0,
            view.xp_to_next_level
        )
    })
}

fn cmd_streak(count: u32, last: Option<String>, activity: String, json: bool) -> Result<()> {
    let last = last.as_deref().map(parse_activity_date).transpose()?;
    let activity = parse_activity_date(&activity)?;
    let next = next_streak(count, last, activity);
    emit(json, &serde_json::json!({ "streak_count": next }), || format!("streak {}", next))
}

fn cmd_cost(tokens: Option<u64>, policy: CostPolicy, json: bool) -> Result<()> {
    let usage = tokens.map(TokenUsage::total);
    let view = CostView {
        policy,
        tokens,
        cost: policy.cost(usage.as_ref()),
        gate: policy.gate(),
    };
    emit(json, &view, || {
        format!("{} credits ({} policy, gate {})", view.cost, view.policy, view.gate)
    })
}

fn activity_date(raw: Option<String>) -> Result<NaiveDate> {
    match raw {
        Some(raw) => Ok(parse_activity_date(&raw)?),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn parse_context(raw: Option<&str>) -> Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::Value::Object(Default::default()));
    };
    let value: serde_json::Value = serde_json::from_str(raw).context("--context must be valid JSON")?;
    if !value.is_object() {
        anyhow::bail!(coach_core::Error::Validation("--context must be a JSON object".to_string()));
    }
    Ok(value)
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "coach",
            "--json",
            "ask",
            "--user",
            "u1",
            "--context",
            r#"{"weight": 80}"#,
            "weekly-plan",
            "--goal",
            "lose 4kg",
            "--pref",
            "vegan",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Ask { user, context, action } => {
                assert_eq!(user.as_str(), "u1");
                assert_eq!(context.context.as_deref(), Some(r#"{"weight": 80}"#));
                assert!(matches!(action, AskCommands::WeeklyPlan { ref preferences, .. } if preferences == &["vegan"]));
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(Cli::try_parse_from(["coach", "billing", "--user", "u1", "--event", "paused"]).is_err());
        assert!(Cli::try_parse_from(["coach", "award", "--user", "  ", "--xp", "10"]).is_err());
        assert!(Cli::try_parse_from(["coach", "cost", "--policy", "whole"]).is_ok());
    }

    #[test]
    fn test_context_must_be_object() {
        assert!(parse_context(None).unwrap().is_object());
        assert!(parse_context(Some("[1, 2]")).is_err());
        assert!(parse_context(Some("{oops")).is_err());
    }
}

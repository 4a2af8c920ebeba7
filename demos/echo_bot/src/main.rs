//! Echo Bot Example
//!
//! A small bot showing the pieces a Bronze bot is made of:
//!
//! - prefix commands with typed parameters (`!roll 1 100`)
//! - a regex command (`!echo anything at all`)
//! - gating rules (`!whoami` only answers in guild channels)
//! - a raw text listener and a typed system-event handler
//! - startup and shutdown hooks
//!
//! # Usage
//!
//! ```bash
//! BRONZE_BOT__TOKEN=... cargo run --package echo-bot
//! cargo run --package echo-bot -- --config ./bronze.toml --profile production
//! ```

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use bronze::prelude::*;
use clap::Parser;
use tracing::{error, info};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "Bronze echo bot")]
struct Cli {
    /// Configuration file; searched for in the working directory when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (development, production, or a custom name).
    #[arg(short, long)]
    profile: Option<String>,

    /// Bot token, overriding the configuration.
    #[arg(long)]
    token: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<BronzeConfig> {
        let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
        if let Some(path) = &self.config {
            loader = loader.file(path);
        }
        if let Some(profile) = &self.profile {
            loader = loader.profile(profile);
        }
        if let Some(token) = &self.token {
            loader = loader.set("bot.token", token);
        }
        Ok(loader.load()?)
    }
}

// ============================================================================
// Commands
// ============================================================================

fn roll() -> CommandBuilder {
    Command::builder("roll")
        .alias("r")
        .optional_param::<i64>("low")
        .optional_param::<i64>("high")
        .help("!roll [low] [high]")
        .desc("Roll a number between low and high (default 1..=6)")
        .handler(|msg: Message, args: Args| async move {
            let low = args.value::<i64>("low").copied().unwrap_or(1);
            let high = args.value::<i64>("high").copied().unwrap_or(6);
            if low > high {
                return msg.reply(format!("{low} is larger than {high}")).await.map(drop);
            }
            let span = u128::from(high.abs_diff(low)) + 1;
            let seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default();
            let value = (i128::from(low) + (seed % span) as i128) as i64;
            msg.reply(format!("🎲 {value}")).await.map(drop)
        })
}

fn echo() -> CommandBuilder {
    Command::builder("echo")
        .regex(r"[!！]echo\s+(.+)")
        .param::<String>("text")
        .help("!echo <text>")
        .handler(|msg: Message, args: Args| async move {
            let text = args.value::<String>("text").cloned().unwrap_or_default();
            msg.ctx().send(text, SendOptions::default()).await.map(drop)
        })
}

fn whoami() -> CommandBuilder {
    Command::builder("whoami")
        .help("!whoami")
        .desc("Guild channels only; the answer is only visible to you")
        .rule(rules::predicate("guild_only", |msg: &Message, _: &Args| {
            msg.guild_id().is_some()
        }))
        .handler(|msg: Message, _: Args| async move {
            let name = msg
                .author()
                .map(|user| format!("{}#{}", user.username, user.identify_num))
                .unwrap_or_else(|| msg.ctx().author_id().to_string());
            msg.ctx().send_temporary(format!("You are {name}")).await.map(drop)
        })
}

fn help(bot: &Bot) -> CommandBuilder {
    let commands = bot.commands().clone();
    Command::builder("help").handler(move |msg: Message, _: Args| {
        let commands = commands.clone();
        async move {
            let lines: Vec<String> = commands
                .commands()
                .into_iter()
                .map(|info| format!("{:<16} {}", info.help, info.desc))
                .collect();
            msg.reply(lines.join("\n")).await.map(drop)
        }
    })
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    let bot = Bot::from_config(&config)?;

    bot.command(roll())?;
    bot.command(echo())?;
    bot.command(whoami())?;
    bot.command(help(&bot))?;

    bot.on_text(|msg: Message| async move {
        info!(
            channel = msg.ctx().channel_id(),
            author = msg.ctx().author_id(),
            content = msg.plain_text(),
            "Text message"
        );
    });

    bot.on_event(|reaction: AddedReaction| async move {
        info!(
            user = %reaction.user_id,
            emoji = %reaction.emoji.name,
            msg_id = %reaction.msg_id,
            "Reaction added"
        );
    });

    bot.on_startup(|gateway| async move {
        match gateway.request(bronze::core::Method::Get, "user/me", Default::default()).await {
            Ok(me) => info!(user = %me["username"], "Logged in"),
            Err(e) => error!(error = %e, "Failed to fetch own account"),
        }
    });
    bot.on_shutdown(|_| async {
        info!("Goodbye");
    });

    bot.run().await?;
    Ok(())
}

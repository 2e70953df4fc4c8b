//! Interactive chat session.
//!
//! Reads one turn per line from stdin and streams the reply as it arrives.
//! Tarot turns take the drawn cards instead of free text:
//!
//! ```text
//! The Fool; The Tower (reversed); Death | Should I move?
//! ```
//!
//! `/end` finalizes the session, `/quit` leaves (and finalizes too).

use anyhow::{Result, anyhow, bail};
use augury_core::ChatKind;
use augury_sdk::{ChatRequest, ConversationEngine, Language, TarotCard, TarotSpread};
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::ChatArgs;
use crate::commands::print_session_end;
use crate::config::Config;
use crate::runtime::build_engine;

/// Fixed parts of every request in this chat
struct Turn {
    kind: ChatKind,
    user_id: String,
    session_id: String,
    language: Language,
    private: bool,
    direction: Option<String>,
    spread: TarotSpread,
}

impl Turn {
    fn request(&self, line: &str) -> Result<ChatRequest> {
        let request = match self.kind {
            ChatKind::Counsellor => ChatRequest::counsellor(&self.user_id, &self.session_id, line),
            ChatKind::Bagua => {
                ChatRequest::bagua(&self.user_id, &self.session_id, line, self.direction.clone())
            }
            ChatKind::Tarot => {
                let (cards, context) = parse_tarot_line(line);
                ChatRequest::tarot(&self.user_id, &self.session_id, self.spread, cards, context)
            }
        }
        .with_language(self.language)
        .with_private(self.private);

        request.validate()?;
        Ok(request)
    }
}

/// Execute chat command.
pub async fn execute(args: ChatArgs, config: &Config) -> Result<()> {
    let turn = Turn {
        kind: args.kind.into(),
        language: Language::from_str(&args.language)
            .ok_or_else(|| anyhow!("Invalid language: {}. Use: en, zh, or zh_TW", args.language))?,
        spread: parse_spread(&args.spread)?,
        session_id: args
            .session
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        user_id: args.user,
        private: args.private,
        direction: args.direction,
    };

    let engine = build_engine(config).await?;
    let sweeper = engine.spawn_expiry_sweeper(Duration::from_secs(
        config.engine.session.sweep_interval_secs,
    ));

    println!(
        "{} {} session {}{}",
        "●".green(),
        turn.kind.as_str().cyan(),
        turn.session_id.dimmed(),
        if turn.private { " (private)" } else { "" }
    );
    if turn.kind == ChatKind::Tarot {
        println!(
            "  Enter {} cards separated by ';', then '| question'",
            turn.spread.card_count()
        );
    }
    println!("  /end to finish the session, /quit to leave");
    println!();

    let result = repl(&engine, &turn).await;

    end_session(&engine, &turn).await;
    sweeper.shutdown().await;
    result
}

async fn repl(engine: &ConversationEngine, turn: &Turn) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        print!("{} ", ">".bold());
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            return Ok(());
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/end" | "/quit" | "/exit" => return Ok(()),
            _ => {}
        }

        let request = match turn.request(line) {
            Ok(request) => request,
            Err(e) => {
                println!("{} {}", "⚠".yellow(), e);
                continue;
            }
        };

        match engine.chat_turn(request).await {
            Ok(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    print!("{}", chunk);
                    stdout.flush()?;
                }
                println!();
                println!();
            }
            Err(e) => println!("{} {}", "⚠".yellow(), e),
        }
    }
}

async fn end_session(engine: &ConversationEngine, turn: &Turn) {
    match engine.finalize(&turn.user_id, &turn.session_id).await {
        Ok(result) => print_session_end(&result),
        // No turn was ever taken
        Err(e) if e.is_not_found() => {}
        Err(e) => println!("{} Failed to finalize session: {}", "⚠".yellow(), e),
    }
}

fn parse_spread(value: &str) -> Result<TarotSpread> {
    match value {
        "three_card" | "three" => Ok(TarotSpread::ThreeCard),
        "celtic_cross" | "celtic" => Ok(TarotSpread::CelticCross),
        "custom" => Ok(TarotSpread::Custom),
        other => bail!("Invalid spread: {}. Use: three_card, celtic_cross, or custom", other),
    }
}

/// Split `card; card (reversed) | question` into cards and context
fn parse_tarot_line(line: &str) -> (Vec<TarotCard>, Option<String>) {
    let (cards, context) = match line.split_once('|') {
        Some((cards, context)) => (cards, Some(context.trim().to_string())),
        None => (line, None),
    };

    let cards = cards
        .split([';', ','])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            match strip_marker(name, "(reversed)").or_else(|| strip_marker(name, "(r)")) {
                Some(name) => TarotCard::reversed(name),
                None => TarotCard::upright(name),
            }
        })
        .collect();

    (cards, context.filter(|c| !c.is_empty()))
}

/// `name` without a trailing `marker` (ASCII case-insensitive)
fn strip_marker<'a>(name: &'a str, marker: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(marker.len())?;
    let tail = name.get(split..)?;
    tail.eq_ignore_ascii_case(marker)
        .then(|| name[..split].trim_end())
}

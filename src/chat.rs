use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::json;

use crate::agents::{Assistant, SessionLedger};
use crate::config::RuntimeConfig;
use crate::runner::{build_assistant, print_reply};
use crate::telemetry::TelemetrySink;
use crate::theme::{self, DIM, RESET, YELLOW};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    Help,
    Tools,
    Cost,
    Reset,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedChatCommand {
    NotACommand,
    Command(ChatCommand),
    UnknownCommand(String),
}

pub fn parse_chat_command(input: &str) -> ParsedChatCommand {
    let trimmed = input.trim();

    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
        return ParsedChatCommand::Command(ChatCommand::Exit);
    }

    if !trimmed.starts_with('/') {
        return ParsedChatCommand::NotACommand;
    }

    let slashless = trimmed.trim_start_matches('/');
    if slashless.is_empty() {
        return ParsedChatCommand::UnknownCommand("/".to_string());
    }

    let command = slashless
        .split_whitespace()
        .next()
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();

    match command.as_str() {
        "exit" | "quit" => ParsedChatCommand::Command(ChatCommand::Exit),
        "help" => ParsedChatCommand::Command(ChatCommand::Help),
        "tools" => ParsedChatCommand::Command(ChatCommand::Tools),
        "cost" => ParsedChatCommand::Command(ChatCommand::Cost),
        "reset" => ParsedChatCommand::Command(ChatCommand::Reset),
        "trace" => ParsedChatCommand::Command(ChatCommand::Trace),
        other => ParsedChatCommand::UnknownCommand(other.to_string()),
    }
}

fn print_tools(assistant: &Assistant) {
    println!("Registered tools:");
    for schema in assistant.tool_schemas() {
        let params = schema.parameter_names().join(", ");
        println!("- {} ({params}): {DIM}{}{RESET}", schema.name, schema.description);
    }
}

pub async fn run_chat(cfg: &RuntimeConfig, telemetry: &TelemetrySink) -> Result<()> {
    let assistant = build_assistant(cfg, telemetry)?;
    let mut ledger = SessionLedger::new();
    let mut trace = false;

    telemetry.emit(
        "chat.started",
        json!({ "profile": cfg.profile, "tools": assistant.registry().len() }),
    );
    theme::print_startup_banner(
        assistant.backend_name(),
        assistant.model(),
        assistant.registry().len(),
    );

    let mut editor = DefaultEditor::new().context("failed to initialize line editor")?;

    loop {
        let line = match editor.readline(&theme::build_prompt(trace)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("failed to read input"),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        match parse_chat_command(input) {
            ParsedChatCommand::NotACommand => {}
            ParsedChatCommand::UnknownCommand(command) => {
                match theme::suggest_command(&command) {
                    Some(hint) => println!("Unknown command '/{command}'. {hint}"),
                    None => println!("Unknown command '/{command}'. Type /help for commands."),
                }
                continue;
            }
            ParsedChatCommand::Command(ChatCommand::Exit) => break,
            ParsedChatCommand::Command(ChatCommand::Help) => {
                print!("{}", theme::format_command_palette());
                continue;
            }
            ParsedChatCommand::Command(ChatCommand::Tools) => {
                print_tools(&assistant);
                continue;
            }
            ParsedChatCommand::Command(ChatCommand::Cost) => {
                println!("{}", theme::format_ledger(&ledger));
                continue;
            }
            ParsedChatCommand::Command(ChatCommand::Reset) => {
                ledger.reset();
                telemetry.emit("session.reset", json!({}));
                println!("{YELLOW}Session ledger cleared.{RESET}");
                continue;
            }
            ParsedChatCommand::Command(ChatCommand::Trace) => {
                trace = !trace;
                println!("Trace {}.", if trace { "on" } else { "off" });
                continue;
            }
        }

        let reply = assistant.handle(input, &mut ledger).await;
        print_reply(&reply, trace);
        println!();
    }

    telemetry.emit(
        "chat.finished",
        json!({
            "requests": ledger.requests,
            "llm_calls": ledger.llm_calls,
            "estimated_cost_usd": ledger.estimated_cost_usd,
        }),
    );
    println!("{}", ledger.summary_line());
    Ok(())
}

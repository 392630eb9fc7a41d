//! Terminal presentation: ANSI colors, the chat prompt and banner, slash
//! command matching, and the colored plan/result trace used by `ask --trace`.

use crate::agents::executor::{ExecutionResult, StepOutput};
use crate::agents::ledger::SessionLedger;
use crate::agents::plan::Plan;
use crate::agents::verifier::VerificationStatus;

// ---------------------------------------------------------------------------
// ANSI color helpers
// ---------------------------------------------------------------------------

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const CYAN: &str = "\x1b[36m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";
pub const BLUE: &str = "\x1b[34m";
pub const BOLD_CYAN: &str = "\x1b[1;36m";
pub const BOLD_GREEN: &str = "\x1b[1;32m";
pub const BOLD_YELLOW: &str = "\x1b[1;33m";
pub const BOLD_RED: &str = "\x1b[1;31m";

// ---------------------------------------------------------------------------
// Chat commands
// ---------------------------------------------------------------------------

pub const COMMAND_PALETTE: &[(&str, &str)] = &[
    ("help", "show command quick reference"),
    ("tools", "list registered tools and their parameters"),
    ("cost", "show session token usage and estimated cost"),
    ("reset", "zero the session cost ledger"),
    ("trace", "toggle plan/result tracing for each request"),
    ("exit", "end interactive chat"),
];

pub fn build_prompt(trace: bool) -> String {
    if trace {
        format!("{BOLD_CYAN}ops{RESET} {DIM}[{RESET}{BLUE}trace{RESET}{DIM}]{RESET}{BOLD_CYAN}>{RESET} ")
    } else {
        format!("{BOLD_CYAN}ops>{RESET} ")
    }
}

pub fn print_startup_banner(backend: &str, model: &str, tool_count: usize) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!(
        "  {BOLD_CYAN}ops-assistant{RESET} {DIM}v{version}{RESET}  {DIM}·{RESET}  {GREEN}{backend}{RESET} {DIM}/{RESET} {GREEN}{model}{RESET}  {DIM}·{RESET}  {tool_count} tools"
    );
    println!();
    draw_tip_box(
        "Tip",
        &format!(
            "Each request is planned on its own. Use {CYAN}/trace{RESET} to see the plan and raw tool results, {CYAN}/cost{RESET} for spend so far."
        ),
    );
    println!(
        "  {CYAN}/help{RESET} {DIM}commands{RESET}  {DIM}·{RESET}  {CYAN}/tools{RESET} {DIM}tools{RESET}  {DIM}·{RESET}  {CYAN}/exit{RESET} {DIM}quit{RESET}"
    );
    println!("  {DIM}{}━{RESET}", "━".repeat(68));
    println!();
}

fn draw_tip_box(title: &str, content: &str) {
    let width: usize = 70;
    let inner = width - 4;

    let title_len = title.chars().count();
    let side = (width.saturating_sub(title_len + 4)) / 2;
    let right = width.saturating_sub(side + title_len + 4);
    println!(
        "  {DIM}╭{}─ {RESET}{title}{DIM} ─{}╮{RESET}",
        "─".repeat(side),
        "─".repeat(right)
    );

    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut visible_len = 0;
    for word in content.split_whitespace() {
        let wlen = strip_ansi(word).chars().count();
        let test_len = if line.is_empty() {
            wlen
        } else {
            visible_len + 1 + wlen
        };

        if test_len <= inner {
            if !line.is_empty() {
                line.push(' ');
                visible_len += 1;
            }
            line.push_str(word);
            visible_len += wlen;
        } else {
            lines.push(line);
            line = word.to_string();
            visible_len = wlen;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }

    for l in &lines {
        let pad = inner.saturating_sub(strip_ansi(l).chars().count());
        println!("  {DIM}│{RESET} {l}{}{DIM}│{RESET}", " ".repeat(pad + 1));
    }
    println!("  {DIM}╰{}╯{RESET}", "─".repeat(width - 2));
    println!();
}

/// Strip ANSI escape sequences for visible length calculation.
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzyResult {
    NoMatch,
    Exact(String),
    Ambiguous(Vec<String>),
}

/// Prefix match against [`COMMAND_PALETTE`].
pub fn fuzzy_match_command(input: &str) -> FuzzyResult {
    let lower = input.to_ascii_lowercase();
    let matches: Vec<&str> = COMMAND_PALETTE
        .iter()
        .filter(|(name, _)| name.starts_with(&lower))
        .map(|(name, _)| *name)
        .collect();

    match matches.len() {
        0 => FuzzyResult::NoMatch,
        1 => FuzzyResult::Exact(matches[0].to_string()),
        _ => FuzzyResult::Ambiguous(matches.iter().map(|s| s.to_string()).collect()),
    }
}

pub fn suggest_command(input: &str) -> Option<String> {
    match fuzzy_match_command(input) {
        FuzzyResult::Exact(cmd) => Some(format!("Did you mean {CYAN}/{cmd}{RESET}?")),
        FuzzyResult::Ambiguous(cmds) => {
            let list = cmds
                .iter()
                .map(|c| format!("{CYAN}/{c}{RESET}"))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("Did you mean one of: {list}?"))
        }
        FuzzyResult::NoMatch => None,
    }
}

pub fn format_command_palette() -> String {
    let mut out = String::from("Commands:\n");
    for (name, desc) in COMMAND_PALETTE {
        out.push_str(&format!("  {CYAN}/{name:<8}{RESET} {DIM}{desc}{RESET}\n"));
    }
    out
}

// ---------------------------------------------------------------------------
// Pipeline trace
// ---------------------------------------------------------------------------

pub fn format_plan(plan: &Plan) -> String {
    let mut out = format!("{BOLD_YELLOW}Plan{RESET} {DIM}({} steps){RESET}\n", plan.steps.len());
    if let Some(error) = &plan.error {
        out.push_str(&format!("  {RED}planner error:{RESET} {error}\n"));
    }
    for (index, step) in plan.steps.iter().enumerate() {
        let args = serde_json::to_string(&step.args).unwrap_or_default();
        let mode = if step.parallel { "parallel" } else { "sequential" };
        out.push_str(&format!(
            "  {DIM}{index}.{RESET} {CYAN}{}{RESET} {args} {DIM}[{mode}]{RESET}\n",
            step.tool
        ));
        if !step.reason.is_empty() {
            out.push_str(&format!("     {DIM}{}{RESET}\n", step.reason));
        }
    }
    out
}

pub fn format_results(results: &ExecutionResult) -> String {
    let mut out = format!("{BOLD_YELLOW}Raw results{RESET}\n");
    if results.is_empty() {
        out.push_str(&format!("  {DIM}(no tools invoked){RESET}\n"));
    }
    for entry in &results.entries {
        let (marker, body) = match &entry.output {
            StepOutput::Success(value) => (
                format!("{GREEN}ok{RESET}"),
                serde_json::to_string(value).unwrap_or_default(),
            ),
            StepOutput::Failure { error } => (format!("{RED}error{RESET}"), error.clone()),
        };
        out.push_str(&format!(
            "  {DIM}{}.{RESET} {CYAN}{}{RESET} {marker} {DIM}{}ms{RESET}\n     {body}\n",
            entry.index, entry.tool, entry.elapsed_ms
        ));
    }
    out
}

pub fn format_answer(answer: &str, status: VerificationStatus) -> String {
    let heading = match status {
        VerificationStatus::Success => format!("{BOLD_GREEN}Answer{RESET}"),
        VerificationStatus::Failure => format!("{BOLD_RED}Answer (unverified){RESET}"),
    };
    format!("{heading}\n{answer}")
}

pub fn format_ledger(ledger: &SessionLedger) -> String {
    format!(
        "{BOLD}Session{RESET} since {}\n  requests: {}\n  model calls: {}\n  tokens: {} prompt / {} completion\n  estimated cost: {YELLOW}${:.6}{RESET}",
        ledger.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        ledger.requests,
        ledger.llm_calls,
        ledger.prompt_tokens,
        ledger.completion_tokens,
        ledger.estimated_cost_usd
    )
}

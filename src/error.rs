#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Provider,
    Tooling,
    Input,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Provider => "PROVIDER",
            ErrorCategory::Tooling => "TOOLING",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Provider => {
                "Set GEMINI_API_KEY (or OPENAI_API_KEY) in the environment or .env, or pass --provider."
            }
            ErrorCategory::Tooling => {
                "Run ops-assistant doctor to check tool credentials and retry with RUST_LOG=info."
            }
            ErrorCategory::Input => "Run ops-assistant --help and correct command arguments.",
            ErrorCategory::Internal => {
                "Retry with RUST_LOG=debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    let msg = format!("{err:#}").to_ascii_lowercase();

    if msg.contains("api_key")
        || msg.contains("no provider could be auto-detected")
        || msg.contains("provider")
        || msg.contains("model")
    {
        return ErrorCategory::Provider;
    }

    if msg.contains("invalid value")
        || msg.contains("unknown argument")
        || msg.contains("failed to read input")
        || msg.contains("profile")
        || msg.contains("plan file")
        || msg.contains("bind address")
    {
        return ErrorCategory::Input;
    }

    if msg.contains("tool") || msg.contains("credential") {
        return ErrorCategory::Tooling;
    }

    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let category = categorize_error(err);
    let rendered_error = render_error_message(err, show_sensitive_config);
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        rendered_error,
        category.hint()
    )
}

pub fn render_error_message(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let text = format!("{err:#}");
    if show_sensitive_config {
        text
    } else {
        redact_sensitive_text(&text)
    }
}

/// Query parameters and headers that carry upstream credentials.
const SECRET_MARKERS: &[&str] = &["key=", "apikey=", "appid=", "token=", "bearer "];

pub fn redact_sensitive_text(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some((start, marker_len)) = next_secret_marker(&lower, cursor) {
        let value_start = start + marker_len;
        out.push_str(&text[cursor..value_start]);

        let remainder = &text[value_start..];
        let end = remainder
            .find(|ch: char| {
                ch.is_whitespace()
                    || matches!(
                        ch,
                        '&' | '"' | '\'' | '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';'
                    )
            })
            .unwrap_or(remainder.len());
        if end > 0 {
            out.push_str("[REDACTED]");
        }
        cursor = value_start + end;
    }

    out.push_str(&text[cursor..]);
    out
}

fn next_secret_marker(lower: &str, from: usize) -> Option<(usize, usize)> {
    SECRET_MARKERS
        .iter()
        .filter_map(|marker| {
            lower[from..]
                .find(marker)
                .map(|offset| (from + offset, marker.len()))
        })
        .min_by_key(|(start, _)| *start)
}

//! Child output forwarding.
//!
//! Each line becomes one tracing event inside the owning process span.
//! JSON lines keep their level and message; anything else is logged raw at debug.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::Level;

/// A child output line, classified.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedLine {
    pub level: Level,
    pub message: String,
    /// Whether the line was a JSON record.
    pub structured: bool,
}

pub fn classify(line: &str) -> ForwardedLine {
    let record = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => record,
        _ => {
            return ForwardedLine {
                level: Level::DEBUG,
                message: line.to_string(),
                structured: false,
            }
        }
    };

    let level = match record.get("level").and_then(Value::as_str) {
        Some("error") => Level::ERROR,
        Some("warn") | Some("warning") => Level::WARN,
        Some("info") => Level::INFO,
        _ => Level::DEBUG,
    };
    let message = record
        .get("msg")
        .or_else(|| record.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    ForwardedLine {
        level,
        message,
        structured: true,
    }
}

/// Forward every line of `reader` until EOF. Returns the number of lines seen.
pub async fn forward_lines<R>(reader: R, stream: &'static str) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                emit(stream, &line, &classify(&line));
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(stream, error = %e, "child output stream failed");
                break;
            }
        }
    }
    count
}

fn emit(stream: &'static str, raw: &str, line: &ForwardedLine) {
    if !line.structured {
        tracing::debug!(stream, "{}", raw);
        return;
    }
    let message = &line.message;
    if line.level == Level::ERROR {
        tracing::error!(stream, record = %raw, "{}", message);
    } else if line.level == Level::WARN {
        tracing::warn!(stream, record = %raw, "{}", message);
    } else if line.level == Level::INFO {
        tracing::info!(stream, record = %raw, "{}", message);
    } else {
        tracing::debug!(stream, record = %raw, "{}", message);
    }
}

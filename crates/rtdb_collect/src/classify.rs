use std::io::{self, Write};

use clap::Parser;
use rtdb_traffic::{Classification, IgnoreReason, LineClassifier, LineFeed, LineLimits};
use serde_json::{json, Value};
use tokio::io::BufReader;
use tracing::warn;

use crate::Error;

#[derive(Debug, Parser)]
pub struct Args {
    /// Also print lines that were ignored, with the reason.
    #[arg(long)]
    pub show_ignored: bool,

    /// Longer input lines are skipped with a warning.
    #[arg(long, default_value_t = LineLimits::default().max_line_bytes)]
    pub max_line_bytes: usize,
}

pub async fn run(args: Args) -> Result<(), Error> {
    let classifier = LineClassifier::default();
    let limits = LineLimits {
        max_line_bytes: args.max_line_bytes,
    };
    let mut feed = LineFeed::new(BufReader::new(tokio::io::stdin()), limits);
    let mut out = io::BufWriter::new(io::stdout().lock());

    while let Some(item) = feed.next_line().await {
        let line = match item {
            Ok(line) => line,
            Err(err) if err.is_recoverable() => {
                warn!(%err, "skipping input line");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let classification = classifier.classify(&line.text);
        if matches!(classification, Classification::Ignored(_)) && !args.show_ignored {
            continue;
        }
        let value = describe(line.line_number, &classification);
        serde_json::to_writer(&mut out, &value).map_err(io::Error::from)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn describe(line_number: usize, classification: &Classification) -> Value {
    match classification {
        Classification::OffsetUpdate(millis) => json!({
            "line": line_number,
            "kind": "offset",
            "millis": millis,
        }),
        Classification::Event(event) => json!({
            "line": line_number,
            "kind": "event",
            "op": event.operation.as_str(),
            "path": event.path,
            "bytes": event.size_bytes,
        }),
        Classification::Ignored(reason) => json!({
            "line": line_number,
            "kind": "ignored",
            "reason": reason_label(reason),
        }),
    }
}

fn reason_label(reason: &IgnoreReason) -> String {
    match reason {
        IgnoreReason::Unmatched => "unmatched".to_string(),
        IgnoreReason::RedundantPrefix => "redundant_prefix".to_string(),
        IgnoreReason::MalformedRequest => "malformed_request".to_string(),
        IgnoreReason::MissingPath { code } => format!("missing_path:{code}"),
        IgnoreReason::UnknownCode { code } => format!("unknown_code:{code}"),
        IgnoreReason::OffsetOutOfRange => "offset_out_of_range".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_each_outcome() {
        let classifier = LineClassifier::default();

        let event = describe(
            3,
            &classifier.classify(r#"p:0: handleServerMessage d {"p":"a/b","d":1}"#),
        );
        assert_eq!(event["kind"], "event");
        assert_eq!(event["op"], "read");
        assert_eq!(event["path"], "/a/b");
        assert_eq!(event["line"], 3);

        let offset = describe(1, &classifier.classify("serverTimeOffset: 12"));
        assert_eq!(offset["millis"], 12);

        let ignored = describe(2, &classifier.classify(r#"p:0: {"r":1,"a":"x","b":{}}"#));
        assert_eq!(ignored["reason"], "unknown_code:x");
    }
}

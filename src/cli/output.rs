//! Emits the one response shape every invocation produces: a single
//! pretty-printed JSON document followed by a newline, always to stdout.
//! `--human` (or `LLM=0`) additionally prints a short summary line to
//! stderr; stdout's contract never changes.

use crate::core::envelope::ResponseEnvelope;
use std::io::Write;

pub fn emit(env: &ResponseEnvelope, human: bool) -> i32 {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let _ = handle.write_all(env.to_stdout_string().as_bytes());

    if human {
        let mut stderr = std::io::stderr();
        let line = if env.ok {
            format!("{} ok ({}ms)\n", env.command, env.metrics.duration_ms)
        } else {
            let detail = env.errors.first().map(|e| e.message.as_str()).unwrap_or("unknown error");
            format!("{} failed: {}\n", env.command, detail)
        };
        let _ = stderr.write_all(line.as_bytes());
    }

    env.exit_code()
}

/// `LLM=0` (or an explicit `--human` flag) switches on the supplementary
/// stderr summary; the default, matching an LLM caller's expectations, is
/// JSON-only on both streams.
pub fn human_mode(human_flag: bool) -> bool {
    if human_flag {
        return true;
    }
    match std::env::var("LLM") {
        Ok(v) => v == "0",
        Err(_) => false,
    }
}

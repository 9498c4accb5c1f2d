use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "studio.timing";

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl CommandTimer {
    pub fn new(command: &str) -> Self {
        CommandTimer {
            command: command.to_string(),
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "incomplete".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=command_received command={} received_at={}",
            self.command,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=command_completed command={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_command_timer(command: &str) -> CommandTimer {
    let timer = CommandTimer::new(command);
    timer.log_received();
    timer
}

pub fn complete_command_timer(timer: &mut CommandTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = match &result {
        Ok(_) => "success".to_string(),
        Err(err) => format!("error ({err})"),
    };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_timing_passes_results_through() {
        let ok: Result<u32, String> =
            log_llm_timing("gemini", "text-model", "refine_prompt", None, || async { Ok(7) })
                .await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> = log_llm_timing(
            "gemini",
            "image-model",
            "render_scene",
            Some(serde_json::json!({ "referenceImages": 0 })),
            || async { Err("boom".to_string()) },
        )
        .await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[test]
    fn timer_completes_once() {
        let mut timer = start_command_timer("render");
        complete_command_timer(&mut timer, "success", Some("saved".to_string()));
        assert!(timer.completed);
        assert_eq!(timer.status, "success");

        let dropped = CommandTimer::new("describe");
        assert_eq!(dropped.status, "incomplete");
    }
}

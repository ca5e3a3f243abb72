//! Live run streaming over server-sent events.
//!
//! Event kinds: `ready` once at open, `trace` per trace event,
//! `dataflow` derived from completions that carry an output summary,
//! `status` on run status changes, then `complete` or `error` and the
//! stream closes. Keepalive comments flow every 15 seconds.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use cascade_core::RunId;
use cascade_executor::{RunStatus, RunStore};
use cascade_trace::{TraceEvent, TraceEventType};
use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::ApiError;
use crate::state::AppState;

const KEEPALIVE: Duration = Duration::from_secs(15);
const STATUS_POLL: Duration = Duration::from_millis(500);

fn event(kind: &str, payload: serde_json::Value) -> Event {
    Event::default()
        .event(kind.to_owned())
        .data(payload.to_string())
}

fn trace_events(stored: &TraceEvent) -> Vec<Event> {
    let mut out = vec![event(
        "trace",
        serde_json::to_value(stored).unwrap_or_default(),
    )];
    // Completions with outputs also describe data flowing to
    // downstream consumers.
    if stored.body.r#type == TraceEventType::NodeCompleted {
        if let Some(outputs) = &stored.body.output_summary {
            out.push(event(
                "dataflow",
                json!({
                    "fromRef": stored.body.node_ref,
                    "outputs": outputs,
                }),
            ));
        }
    }
    out
}

/// `GET /workflows/runs/{run_id}/stream`
pub async fn stream(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let run_id = RunId::parse(&run_id)
        .map_err(|_| ApiError::validation(format!("not a run id: {run_id}")))?;
    let record = state.runs.get(&run_id).await?;

    let (tx, rx) = mpsc::channel::<Event>(64);
    tokio::spawn(pump(state, run_id, record.status, tx));

    let stream = ReceiverStream::new(rx).map(Ok);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE)))
}

/// Drives one SSE connection: backfill, then follow pushes and status
/// changes until the run reaches a terminal status.
async fn pump(state: AppState, run_id: RunId, mut last_status: RunStatus, tx: mpsc::Sender<Event>) {
    let send = |e: Event| {
        let tx = tx.clone();
        async move { tx.send(e).await.is_ok() }
    };

    if !send(event(
        "ready",
        json!({ "runId": run_id, "status": last_status }),
    ))
    .await
    {
        return;
    }

    // Subscribe before the backfill so nothing falls between them;
    // duplicates are filtered by sequence.
    let mut live = state.trace.subscribe_to_run(&run_id);
    let mut cursor = 0u64;
    match state.trace.list_since(&run_id, 0).await {
        Ok(backfill) => {
            for stored in &backfill {
                cursor = stored.sequence;
                for e in trace_events(stored) {
                    if !send(e).await {
                        return;
                    }
                }
            }
        }
        Err(e) => {
            let _ = send(event("error", json!({ "message": e.to_string() }))).await;
            return;
        }
    }

    let mut status_interval = tokio::time::interval(STATUS_POLL);
    loop {
        tokio::select! {
            pushed = live.recv() => {
                match pushed {
                    Ok(stored) if stored.sequence > cursor => {
                        cursor = stored.sequence;
                        for e in trace_events(&stored) {
                            if !send(e).await {
                                return;
                            }
                        }
                    }
                    Ok(_) => {}
                    // Lagged: fall back to polling from the cursor.
                    Err(_) => {
                        if let Ok(missed) = state.trace.list_since(&run_id, cursor).await {
                            for stored in &missed {
                                cursor = stored.sequence;
                                for e in trace_events(stored) {
                                    if !send(e).await {
                                        return;
                                    }
                                }
                            }
                        }
                        live = state.trace.subscribe_to_run(&run_id);
                    }
                }
            }
            _ = status_interval.tick() => {
                let Ok(record) = state.runs.get(&run_id).await else {
                    let _ = send(event("error", json!({ "message": "run disappeared" }))).await;
                    return;
                };
                if record.status != last_status {
                    last_status = record.status;
                    if !send(event("status", json!({ "status": record.status }))).await {
                        return;
                    }
                }
                if record.status.is_terminal() {
                    // Drain anything appended after the last push.
                    if let Ok(tail) = state.trace.list_since(&run_id, cursor).await {
                        for stored in &tail {
                            cursor = stored.sequence;
                            for e in trace_events(stored) {
                                if !send(e).await {
                                    return;
                                }
                            }
                        }
                    }
                    let payload = match record.status {
                        RunStatus::Completed => json!({
                            "status": record.status,
                            "result": record.result,
                        }),
                        _ => json!({
                            "status": record.status,
                            "error": record.error,
                        }),
                    };
                    let _ = send(event("complete", payload)).await;
                    return;
                }
            }
        }
    }
}

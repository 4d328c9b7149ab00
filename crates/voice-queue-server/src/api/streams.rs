//! Server-sent event stream of playback transitions.

use std::collections::VecDeque;
use std::time::Instant;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{Error, HttpResponse, Responder, get, web};
use futures_util::stream::unfold;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Duration, Interval, MissedTickBehavior};
use tracing::debug;
use utoipa::IntoParams;

use voice_queue::{ChatId, PlaybackEvent};

use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Only stream events for this chat.
    pub chat_id: Option<ChatId>,
}

struct EventStreamState {
    receiver: broadcast::Receiver<PlaybackEvent>,
    chat_id: Option<ChatId>,
    interval: Interval,
    pending: VecDeque<Bytes>,
    last_ping: Instant,
}

fn sse_event(event: &str, data: &str) -> Bytes {
    let mut payload = String::new();
    payload.push_str("event: ");
    payload.push_str(event);
    payload.push('\n');
    for line in data.lines() {
        payload.push_str("data: ");
        payload.push_str(line);
        payload.push('\n');
    }
    payload.push('\n');
    Bytes::from(payload)
}

fn push_ping_if_needed(pending: &mut VecDeque<Bytes>, last_ping: &mut Instant) {
    if pending.is_empty() && last_ping.elapsed() >= PING_INTERVAL {
        *last_ping = Instant::now();
        pending.push_back(Bytes::from(": ping\n\n"));
    }
}

enum StreamSignal {
    Tick,
    Event(Result<PlaybackEvent, RecvError>),
}

async fn recv_signal(
    receiver: &mut broadcast::Receiver<PlaybackEvent>,
    interval: &mut Interval,
) -> StreamSignal {
    tokio::select! {
        _ = interval.tick() => StreamSignal::Tick,
        result = receiver.recv() => StreamSignal::Event(result),
    }
}

fn wants(filter: Option<ChatId>, event: &PlaybackEvent) -> bool {
    filter.is_none_or(|chat_id| event.chat_id() == chat_id)
}

#[utoipa::path(
    get,
    path = "/events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Playback event stream")
    )
)]
#[get("/events")]
/// Stream playback events via server-sent events.
pub async fn events_stream(
    state: web::Data<AppState>,
    query: web::Query<EventsQuery>,
) -> impl Responder {
    let receiver = state.events.subscribe();
    let mut interval = tokio::time::interval(PING_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stream = unfold(
        EventStreamState {
            receiver,
            chat_id: query.chat_id,
            interval,
            pending: VecDeque::new(),
            last_ping: Instant::now(),
        },
        |mut ctx| async move {
            loop {
                if let Some(bytes) = ctx.pending.pop_front() {
                    return Some((Ok::<Bytes, Error>(bytes), ctx));
                }

                match recv_signal(&mut ctx.receiver, &mut ctx.interval).await {
                    StreamSignal::Tick => {}
                    StreamSignal::Event(Ok(event)) if wants(ctx.chat_id, &event) => {
                        let json =
                            serde_json::to_string(&event).unwrap_or_else(|_| "null".to_string());
                        ctx.pending.push_back(sse_event("playback", &json));
                    }
                    StreamSignal::Event(Ok(_)) => {}
                    StreamSignal::Event(Err(RecvError::Lagged(skipped))) => {
                        debug!(skipped, "event stream lagged");
                    }
                    StreamSignal::Event(Err(RecvError::Closed)) => return None,
                }

                push_ping_if_needed(&mut ctx.pending, &mut ctx.last_ping);
            }
        },
    );

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(stream)
}

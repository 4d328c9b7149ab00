//! Queue inspection and transport callbacks.

use actix_web::{HttpResponse, Responder, get, post, web};

use voice_queue::{ChatId, MediaHandle};
use voice_queue_types::{QueueSnapshotResponse, StreamEndedRequest};

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/chats",
    responses(
        (status = 200, description = "Every known chat", body = [QueueSnapshotResponse])
    )
)]
#[get("/chats")]
/// List the queue of every chat that has received a track.
pub async fn chats_list(state: web::Data<AppState>) -> impl Responder {
    let controller = state.controller();
    let chats: Vec<QueueSnapshotResponse> = controller
        .store()
        .chat_ids()
        .into_iter()
        .map(|chat_id| controller.snapshot(chat_id).to_response(chat_id))
        .collect();
    HttpResponse::Ok().json(chats)
}

#[utoipa::path(
    get,
    path = "/chats/{chat_id}/queue",
    params(
        ("chat_id" = i64, Path, description = "Chat id")
    ),
    responses(
        (status = 200, description = "Queue snapshot", body = QueueSnapshotResponse)
    )
)]
#[get("/chats/{chat_id}/queue")]
/// Return the chat's state, playing track and pending queue.
pub async fn queue_get(state: web::Data<AppState>, path: web::Path<ChatId>) -> impl Responder {
    let chat_id = path.into_inner();
    HttpResponse::Ok().json(state.controller().snapshot(chat_id).to_response(chat_id))
}

#[utoipa::path(
    post,
    path = "/chats/{chat_id}/stream-ended",
    params(
        ("chat_id" = i64, Path, description = "Chat id")
    ),
    request_body = StreamEndedRequest,
    responses(
        (status = 200, description = "Queue snapshot after advancing", body = QueueSnapshotResponse)
    )
)]
#[post("/chats/{chat_id}/stream-ended")]
/// End-of-stream callback from the call gateway.
///
/// Ignored unless `path` is the media currently playing in the chat.
pub async fn stream_ended(
    state: web::Data<AppState>,
    path: web::Path<ChatId>,
    body: web::Json<StreamEndedRequest>,
) -> impl Responder {
    let chat_id = path.into_inner();
    let controller = state.controller();
    let media = MediaHandle::new(body.path.as_str());
    controller.stream_ended(chat_id, &media, body.reason).await;
    HttpResponse::Ok().json(controller.snapshot(chat_id).to_response(chat_id))
}

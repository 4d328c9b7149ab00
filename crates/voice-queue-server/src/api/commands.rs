//! Inbound chat commands.

use actix_web::{HttpResponse, Responder, post, web};
use tracing::info;

use voice_queue::ChatId;
use voice_queue_types::{CommandReply, CommandRequest};

use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/chats/{chat_id}/commands/{command}",
    params(
        ("chat_id" = i64, Path, description = "Chat id"),
        ("command" = String, Path, description = "Command token, e.g. play or /skip@MusicBot")
    ),
    request_body = CommandRequest,
    responses(
        (status = 200, description = "Reply text for the chat", body = CommandReply)
    )
)]
#[post("/chats/{chat_id}/commands/{command}")]
/// Run a chat command and return the reply to post back.
pub async fn run_command(
    state: web::Data<AppState>,
    path: web::Path<(ChatId, String)>,
    body: web::Json<CommandRequest>,
) -> impl Responder {
    let (chat_id, command) = path.into_inner();
    info!(chat_id, command = %command, "command received");
    let reply = state.handlers.dispatch(chat_id, &command, &body.args).await;
    HttpResponse::Ok().json(CommandReply { reply })
}

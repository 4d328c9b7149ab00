use utoipa::OpenApi;

use voice_queue_types as types;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::run_command,
        api::chats_list,
        api::queue_get,
        api::stream_ended,
        api::events_stream,
        api::health,
    ),
    components(
        schemas(
            types::PlaybackState,
            types::StreamEndReason,
            types::PlaybackEvent,
            types::QueueSnapshotResponse,
            types::CommandRequest,
            types::CommandReply,
            types::StreamEndedRequest,
            api::health_check::HealthResponse,
        )
    ),
    tags(
        (name = "voice-queue-server", description = "Per-chat voice playback queue API")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/chats",
            "/chats/{chat_id}/commands/{command}",
            "/chats/{chat_id}/queue",
            "/chats/{chat_id}/stream-ended",
            "/events",
            "/health",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use rota_model::{DeliveryContext, RequesterId};

use crate::commands;
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub text: String,
    pub requester_id: i64,
    pub chat_id: i64,
    #[serde(default)]
    pub message_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CommandReply {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

/// `POST /command`: run one line of chat text through the grammar.
pub async fn command(
    State(state): State<AppState>,
    Json(body): Json<CommandBody>,
) -> Json<CommandReply> {
    let Some(command) = commands::parse(&body.text) else {
        return Json(CommandReply {
            matched: false,
            reply: None,
        });
    };

    let context = DeliveryContext {
        chat_id: body.chat_id,
        message_id: body.message_id,
    };
    let reply =
        commands::execute(&state, command, RequesterId(body.requester_id), context).await;

    Json(CommandReply {
        matched: true,
        reply: Some(reply),
    })
}

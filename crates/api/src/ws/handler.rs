use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use pumpflix_core::channels::Channel;
use pumpflix_db::repositories::{ExecutionLogRepo, WorkflowRepo, WsSessionRepo};
use pumpflix_db::DbPool;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// Messages a client may send.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Ping,
}

/// GET /api/v1/ws?token=<jwt>
///
/// Browsers cannot set headers on WebSocket requests, so the access token
/// travels in the query string. It is validated before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let user = AuthUser::from_token(&query.token, &state.config.jwt)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: AuthUser) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let ws_manager = Arc::clone(&state.ws_manager);
    tracing::info!(conn_id = %conn_id, user_id = user.user_id, "WebSocket connected");

    let mut rx = ws_manager
        .add(conn_id.clone(), user.user_id, user.organization_id)
        .await;
    if let Err(e) = WsSessionRepo::open(&state.pool, &conn_id, user.user_id, user.organization_id).await {
        tracing::warn!(conn_id = %conn_id, error = %e, "Failed to record WebSocket session");
    }

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                let _ = WsSessionRepo::touch(&state.pool, &conn_id).await;
            }
            Ok(Message::Text(text)) => {
                let reply = handle_client_message(&state, &user, &conn_id, text.as_str()).await;
                ws_manager.send_to(&conn_id, reply).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    if let Err(e) = WsSessionRepo::close(&state.pool, &conn_id).await {
        tracing::warn!(conn_id = %conn_id, error = %e, "Failed to close WebSocket session");
    }
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Process one client text frame and build the reply.
async fn handle_client_message(
    state: &AppState,
    user: &AuthUser,
    conn_id: &str,
    text: &str,
) -> Message {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => return error_message("Unrecognized message"),
    };

    match message {
        ClientMessage::Ping => {
            let _ = WsSessionRepo::touch(&state.pool, conn_id).await;
            text_message(json!({ "type": "pong" }))
        }
        ClientMessage::Subscribe { channel } => {
            let parsed = match Channel::parse(&channel) {
                Ok(c) => c,
                Err(e) => return error_message(&e.to_string()),
            };
            match authorize_channel(&state.pool, user, parsed).await {
                Ok(true) => {}
                Ok(false) => return error_message("Channel not found or not accessible"),
                Err(e) => {
                    tracing::error!(error = %e, "Channel authorization failed");
                    return error_message("Subscription failed");
                }
            }
            let name = parsed.to_string();
            if let Some(channels) = state.ws_manager.subscribe(conn_id, &name).await {
                persist_channels(&state.pool, conn_id, &channels).await;
            }
            text_message(json!({ "type": "subscribed", "channel": name }))
        }
        ClientMessage::Unsubscribe { channel } => {
            if let Some(channels) = state.ws_manager.unsubscribe(conn_id, &channel).await {
                persist_channels(&state.pool, conn_id, &channels).await;
            }
            text_message(json!({ "type": "unsubscribed", "channel": channel }))
        }
    }
}

/// A channel is accessible only when its entity belongs to the caller's
/// organization.
async fn authorize_channel(
    pool: &DbPool,
    user: &AuthUser,
    channel: Channel,
) -> Result<bool, sqlx::Error> {
    match channel {
        Channel::Organization(id) => Ok(id == user.organization_id),
        Channel::Workflow(id) => Ok(WorkflowRepo::find_by_id(pool, user.organization_id, id)
            .await?
            .is_some()),
        Channel::Execution(id) => Ok(ExecutionLogRepo::find_by_id(pool, user.organization_id, id)
            .await?
            .is_some()),
    }
}

async fn persist_channels(pool: &DbPool, conn_id: &str, channels: &[String]) {
    if let Err(e) = WsSessionRepo::update_channels(pool, conn_id, channels).await {
        tracing::warn!(conn_id = %conn_id, error = %e, "Failed to persist channel list");
    }
}

fn text_message(value: serde_json::Value) -> Message {
    Message::Text(value.to_string().into())
}

fn error_message(message: &str) -> Message {
    text_message(json!({ "type": "error", "message": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumpflix_db::models::organization::{RegisteredOrganization, Registration};
    use pumpflix_db::models::workflow::CreateWorkflow;
    use pumpflix_db::repositories::OrganizationRepo;
    use sqlx::PgPool;

    async fn owner_of(pool: &PgPool, slug: &str) -> (RegisteredOrganization, AuthUser) {
        let reg = OrganizationRepo::register(
            pool,
            &Registration {
                organization_name: format!("Org {slug}"),
                organization_slug: slug.to_string(),
                email: format!("owner@{slug}.test"),
                display_name: "Owner".to_string(),
                password_hash: "not-a-real-hash".to_string(),
            },
        )
        .await
        .unwrap();
        let user = AuthUser {
            user_id: reg.user_id,
            organization_id: reg.organization.id,
            tenant_id: reg.tenant.id,
            role: "owner".to_string(),
        };
        (reg, user)
    }

    #[sqlx::test(migrations = "../../db/migrations")]
    async fn channels_of_another_organization_are_refused(pool: PgPool) {
        let (acme, acme_owner) = owner_of(&pool, "acme").await;
        let (_, rival_owner) = owner_of(&pool, "rival").await;
        let workflow = WorkflowRepo::create(
            &pool,
            acme.organization.id,
            acme.tenant.id,
            acme.user_id,
            &CreateWorkflow {
                name: "Private".to_string(),
                description: None,
                definition: json!({ "nodes": [], "edges": [] }),
                status: None,
            },
        )
        .await
        .unwrap();

        let channel = Channel::parse(&format!("workflow:{}", workflow.id)).unwrap();
        assert!(authorize_channel(&pool, &acme_owner, channel).await.unwrap());
        assert!(!authorize_channel(&pool, &rival_owner, channel).await.unwrap());

        let org_channel = Channel::parse(&format!("org:{}", acme.organization.id)).unwrap();
        assert!(authorize_channel(&pool, &acme_owner, org_channel).await.unwrap());
        assert!(!authorize_channel(&pool, &rival_owner, org_channel).await.unwrap());

        let missing = Channel::parse("execution:999999").unwrap();
        assert!(!authorize_channel(&pool, &acme_owner, missing).await.unwrap());
    }

    #[test]
    fn client_messages_parse() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"action":"subscribe","channel":"workflow:3"}"#)
                .unwrap(),
            ClientMessage::Subscribe {
                channel: "workflow:3".into()
            }
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"action":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"shout"}"#).is_err());
    }
}

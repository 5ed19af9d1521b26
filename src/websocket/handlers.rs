use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tower_sessions::Session;

use crate::{
    app_state::AppState,
    error::{AppResult, ChatError},
    middlewares::auth::current_user,
    models::{
        chats::{Message as ChatMessage, MessageStatus},
        friends::FriendStatusView,
        websocket::{ClientMessage, ServerEvent},
    },
    queries::chats::get_chat,
    services::ChatServices,
    store::{StoreResult, Subscription},
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Response> {
    let user = current_user(&session).await?;
    Ok(ws.on_upgrade(move |socket| handle_websocket(socket, state, user.user_id)))
}

async fn handle_websocket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Spawn task to handle outgoing messages
    let outgoing_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let conn_id = state.websocket_manager.connect(&user_id, tx.clone());
    let feeds_task = tokio::spawn(run_feeds(
        state.services.clone(),
        user_id.clone(),
        tx.clone(),
    ));
    let sweeper = state.services.sessions.spawn_sweeper(&user_id);

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text_message(&state.services, &user_id, &tx, text.as_str()).await;
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(user_id = %user_id, "Client closed websocket");
                break;
            }
            Err(e) => {
                tracing::debug!(user_id = %user_id, error = %e, "Websocket receive error");
                break;
            }
            _ => {}
        }
    }

    // cleanup when connection closes
    state.websocket_manager.disconnect(&user_id, conn_id);
    sweeper.abort();
    feeds_task.abort();
    outgoing_task.abort();
    tracing::info!(user_id = %user_id, "Websocket handler finished");
}

async fn handle_text_message(
    services: &ChatServices,
    user_id: &str,
    tx: &UnboundedSender<ServerEvent>,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            let _ = tx.send(ServerEvent::Error {
                message: format!("Invalid message: {}", e),
            });
            return;
        }
    };

    let result = match message {
        ClientMessage::SelectChat { chat_id } => {
            services.sessions.select_chat(&chat_id, user_id).await
        }
        ClientMessage::SendMessage { chat_id, content } => services
            .sessions
            .send_message(&chat_id, user_id, Some(content), None)
            .await
            .map(|_| ()),
        ClientMessage::MarkRead { chat_id } => services
            .sessions
            .mark_read(&chat_id, user_id)
            .await
            .map(|_| ()),
        ClientMessage::Ping => {
            let _ = tx.send(ServerEvent::Pong);
            Ok(())
        }
    };

    match result {
        Ok(()) | Err(ChatError::Declined(_)) => {}
        Err(e) => {
            tracing::debug!(user_id = %user_id, error = %e, "Websocket action failed");
            let _ = tx.send(ServerEvent::Error {
                message: e.to_string(),
            });
        }
    }
}

/// Live feeds of the open chat: its messages and the partner's friend status.
struct ChatFeeds {
    chat_id: String,
    messages: Subscription<Vec<ChatMessage>>,
    status: Option<Subscription<FriendStatusView>>,
}

enum ChatEvent {
    Messages(String, StoreResult<Vec<ChatMessage>>),
    Status(String, StoreResult<FriendStatusView>),
}

async fn open_chat_feeds(
    services: &ChatServices,
    user_id: &str,
    chat_id: Option<String>,
) -> Option<ChatFeeds> {
    let chat_id = chat_id?;
    let partner = match get_chat(services.store.as_ref(), &chat_id).await {
        Ok(chat) => chat.and_then(|c| c.partner_of(user_id).map(str::to_string)),
        Err(e) => {
            tracing::warn!(user_id = %user_id, chat_id = %chat_id, error = %e, "Failed to load active chat");
            None
        }
    };
    Some(ChatFeeds {
        messages: services.sessions.watch_messages(&chat_id),
        status: partner.map(|partner| services.friends.watch_status(user_id, &partner)),
        chat_id,
    })
}

async fn next_chat_event(feeds: &mut Option<ChatFeeds>) -> Option<ChatEvent> {
    let Some(feeds) = feeds else {
        return std::future::pending().await;
    };
    let chat_id = feeds.chat_id.clone();
    let messages = &mut feeds.messages;
    let status = feeds.status.as_mut();
    let status = async move {
        match status {
            Some(status) => status.next().await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        Some(snapshot) = messages.next() => Some(ChatEvent::Messages(chat_id, snapshot)),
        Some(snapshot) = status => Some(ChatEvent::Status(chat_id, snapshot)),
        else => None,
    }
}

/// Push chat list, incoming requests and the open chat to one connection
/// until it closes.
async fn run_feeds(services: ChatServices, user_id: String, tx: UnboundedSender<ServerEvent>) {
    let mut chat_list = services.sessions.watch_chat_list(&user_id);
    let mut incoming = services.friends.watch_incoming(&user_id);
    let mut active_rx = services.active.subscribe(&user_id);

    let current = active_rx.borrow_and_update().clone();
    let _ = tx.send(ServerEvent::ActiveChat {
        chat_id: current.clone(),
    });
    let mut chat_feeds = open_chat_feeds(&services, &user_id, current).await;

    loop {
        let sent = tokio::select! {
            Some(snapshot) = chat_list.next() => match snapshot {
                Ok(chats) => {
                    services.sessions.reconcile_active(&user_id, &chats);
                    tx.send(ServerEvent::ChatList { chats }).is_ok()
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Chat list feed failed");
                    true
                }
            },
            Some(snapshot) = incoming.next() => match snapshot {
                Ok(requests) => tx.send(ServerEvent::IncomingRequests { requests }).is_ok(),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Incoming requests feed failed");
                    true
                }
            },
            changed = active_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = active_rx.borrow_and_update().clone();
                // Dropping the old feeds unsubscribes from the previous chat
                chat_feeds = open_chat_feeds(&services, &user_id, current.clone()).await;
                tx.send(ServerEvent::ActiveChat { chat_id: current }).is_ok()
            },
            Some(event) = next_chat_event(&mut chat_feeds) => match event {
                ChatEvent::Messages(chat_id, Ok(messages)) => {
                    let unread = messages.iter().any(|m| {
                        m.sender_id != user_id && m.status != MessageStatus::Read
                    });
                    let sent = tx.send(ServerEvent::Messages {
                        chat_id: chat_id.clone(),
                        messages,
                    }).is_ok();
                    if unread {
                        if let Err(e) = services.sessions.mark_read(&chat_id, &user_id).await {
                            tracing::debug!(user_id = %user_id, chat_id = %chat_id, error = %e, "Mark read failed");
                        }
                    }
                    sent
                }
                ChatEvent::Status(chat_id, Ok(view)) => {
                    tx.send(ServerEvent::FriendStatus { chat_id, view }).is_ok()
                }
                ChatEvent::Messages(chat_id, Err(e)) | ChatEvent::Status(chat_id, Err(e)) => {
                    tracing::warn!(user_id = %user_id, chat_id = %chat_id, error = %e, "Chat feed failed");
                    true
                }
            },
            else => break,
        };
        if !sent {
            break;
        }
    }
}

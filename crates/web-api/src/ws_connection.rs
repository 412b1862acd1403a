use crate::error::ApiError;
use crate::state::AppState;
use application::{ConnectionId, ControlFrame, PresenceChange};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

/// 客户端发往服务器的消息
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Authenticate { session_token: String },
    JoinMatchmaking {
        #[serde(default)]
        data: serde_json::Value,
    },
    LeaveMatchmaking,
}

/// 单个 WebSocket 连接
///
/// 连接登记到 [`application::EventFanout`] 后，发往该连接的事件帧经由出站队列写回客户端；
/// 客户端消息负责认证与匹配队列的进出。断开时注销连接，最后一个连接关闭则通知好友下线。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    id: ConnectionId,
    outbound: mpsc::Receiver<String>,
}

impl WebSocketConnection {
    pub async fn open(socket: WebSocket, state: AppState) -> Self {
        let (id, outbound) = state.fanout.connect().await;
        tracing::info!(connection_id = %id, "WebSocket 连接已建立");

        Self {
            socket,
            state,
            id,
            outbound,
        }
    }

    /// 运行连接主循环，直到任一方向结束
    pub async fn run(self) {
        let Self {
            socket,
            state,
            id,
            mut outbound,
        } = self;
        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(frame) = outbound.recv() => WsMessage::Text(frame.into()),
                    else => break,
                };
                if sender.send(message).await.is_err() {
                    tracing::warn!(connection_id = %id, "failed to write websocket frame");
                    break;
                }
            }
        });

        // 接收任务：处理来自WebSocket客户端的消息
        let mut recv_task = {
            let state = state.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if Self::handle_incoming(&state, id, message, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            })
        };

        // 等待任意一个任务完成（连接断开），另一个随之中止
        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(connection_id = %id, "send task finished");
                recv_task.abort();
            }
            _ = &mut recv_task => {
                tracing::debug!(connection_id = %id, "receive task finished");
                send_task.abort();
            }
        }

        // 跃迁在离线通知发出后才释放，避免与同一用户的重新上线交错
        if let Some(transition) = state.fanout.disconnect(id).await {
            if let Some(uid) = transition.change.went_offline {
                announce(&state, uid, false).await;
            }
        }
        tracing::info!(connection_id = %id, "WebSocket 连接已断开");
    }

    async fn handle_incoming(
        state: &AppState,
        id: ConnectionId,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => return Err(()),
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(client_message) => Self::dispatch(state, id, client_message).await,
                Err(err) => {
                    tracing::debug!(connection_id = %id, error = %err, "unrecognised client message");
                    let frame = ControlFrame::Error {
                        code: "BAD_REQUEST".to_owned(),
                        message: "unrecognised message".to_owned(),
                    };
                    state.fanout.send_control(id, &frame).await;
                }
            },
            WsMessage::Binary(_) => {
                tracing::debug!(connection_id = %id, "ignored binary frame");
            }
        }
        Ok(())
    }

    async fn dispatch(state: &AppState, id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::Authenticate { session_token } => {
                Self::authenticate(state, id, &session_token).await;
            }
            ClientMessage::JoinMatchmaking { data } => {
                // 未认证连接的匹配请求直接忽略
                let Some(uid) = state.fanout.uid_of(id).await else {
                    return;
                };
                if let Err(err) = state.matchmaking.join_queue(uid, data).await {
                    send_error(state, id, ApiError::from(err)).await;
                }
            }
            ClientMessage::LeaveMatchmaking => {
                let Some(uid) = state.fanout.uid_of(id).await else {
                    return;
                };
                if let Err(err) = state.matchmaking.leave_queue(uid).await {
                    send_error(state, id, ApiError::from(err)).await;
                }
            }
        }
    }

    async fn authenticate(state: &AppState, id: ConnectionId, token: &str) {
        let uid = match state.sessions.authorize(token).await {
            Ok(uid) => uid,
            Err(err) => {
                tracing::info!(connection_id = %id, error = %err, "websocket authentication failed");
                send_error(state, id, ApiError::from(err)).await;
                return;
            }
        };

        let Some(transition) = state.fanout.authenticate(id, uid).await else {
            return;
        };
        state
            .fanout
            .send_control(id, &ControlFrame::Authenticated { uid })
            .await;

        let PresenceChange {
            came_online,
            went_offline,
        } = transition.change;
        if let Some(previous) = went_offline {
            announce(state, previous, false).await;
        }
        if let Some(uid) = came_online {
            announce(state, uid, true).await;
        }
        drop(transition);
    }
}

async fn send_error(state: &AppState, id: ConnectionId, error: ApiError) {
    let frame = ControlFrame::Error {
        code: error.code().to_owned(),
        message: error.message().to_owned(),
    };
    state.fanout.send_control(id, &frame).await;
}

async fn announce(state: &AppState, uid: UserId, online: bool) {
    if let Err(err) = state.friend_service.announce_presence(uid, online).await {
        tracing::warn!(user_id = %uid, online, error = %err, "presence announcement failed");
    }
}

/// WebSocket 写操作命令，事件帧直接来自出站队列
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_camel_case() {
        let auth: ClientMessage =
            serde_json::from_str(r#"{"type":"authenticate","sessionToken":"abc"}"#).unwrap();
        assert!(matches!(auth, ClientMessage::Authenticate { session_token } if session_token == "abc"));

        let join: ClientMessage =
            serde_json::from_str(r#"{"type":"joinMatchmaking","data":{"mode":"duo"}}"#).unwrap();
        assert!(matches!(join, ClientMessage::JoinMatchmaking { data } if data["mode"] == "duo"));

        let bare: ClientMessage = serde_json::from_str(r#"{"type":"joinMatchmaking"}"#).unwrap();
        assert!(matches!(bare, ClientMessage::JoinMatchmaking { data } if data.is_null()));

        let leave: ClientMessage = serde_json::from_str(r#"{"type":"leaveMatchmaking"}"#).unwrap();
        assert!(matches!(leave, ClientMessage::LeaveMatchmaking));
    }
}

//! WebSocket upgrade + message loop. Each connection owns one form session; every client
//! message is parsed as JSON, applied to that session, and answered with a single JSON message.
//! A submit is answered right away with the `submitting` state; the outcome follows as a second
//! `state` message once the examiner replies.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::SubmissionInput;
use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "examiner_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn encode(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let session_id = match state.create_connection_session().await {
    Ok(id) => id,
    Err(e) => {
      warn!(target: "examiner_backend", error = %e, "Refusing WebSocket session");
      let _ = socket.send(Message::Text(encode(&ServerWsMessage::Error { message: e.to_string() }))).await;
      let _ = socket.send(Message::Close(None)).await;
      return;
    }
  };
  info!(target: "examiner_backend", %session_id, "WebSocket connected");

  // Outcomes of submissions finishing in the background.
  let (late_tx, mut late_rx) = unbounded_channel::<ServerWsMessage>();

  loop {
    let outgoing = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => {
          // Parse, dispatch, serialize response.
          let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(incoming) => {
              debug!(target: "examiner_backend", "WS received: {:?}", ws_kind(&incoming));
              handle_client_ws(incoming, &state, &session_id, &late_tx).await
            }
            Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
          };
          Message::Text(encode(&reply_msg))
        }
        Some(Ok(Message::Ping(payload))) => Message::Pong(payload),
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
        Some(Ok(_)) => continue,
      },
      Some(late) = late_rx.recv() => Message::Text(encode(&late)),
    };

    if let Err(e) = socket.send(outgoing).await {
      error!(target: "examiner_backend", error = %e, "WS send error");
      break;
    }
  }

  state.remove_session(&session_id).await;
  info!(target: "examiner_backend", %session_id, "WebSocket disconnected");
}

/// Message kind only; image payloads are far too large for logs.
fn ws_kind(msg: &ClientWsMessage) -> &'static str {
  match msg {
    ClientWsMessage::Ping => "ping",
    ClientWsMessage::GetState => "get_state",
    ClientWsMessage::SetQuestion { .. } => "set_question",
    ClientWsMessage::SetAnswer { .. } => "set_answer",
    ClientWsMessage::SetQuestionImage { .. } => "set_question_image",
    ClientWsMessage::SetAnswerImage { .. } => "set_answer_image",
    ClientWsMessage::ClearQuestionImage => "clear_question_image",
    ClientWsMessage::ClearAnswerImage => "clear_answer_image",
    ClientWsMessage::Submit => "submit",
    ClientWsMessage::Reset => "reset",
  }
}

/// Run the model call off the message loop and post the settled session to `late`.
fn spawn_submission(
  state: &Arc<AppState>,
  session_id: &str,
  input: SubmissionInput,
  late: &UnboundedSender<ServerWsMessage>,
) {
  let state = Arc::clone(state);
  let session_id = session_id.to_string();
  let late = late.clone();
  tokio::spawn(async move {
    let msg = match finish_submission(&state, &session_id, input).await {
      Ok(session) => {
        info!(target: "grading", %session_id, state = session.state, "WS submit settled");
        ServerWsMessage::State { session }
      }
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    };
    if late.send(msg).is_err() {
      debug!(target: "grading", %session_id, "Connection closed before the submission settled");
    }
  });
}

#[instrument(level = "info", skip(msg, state, late), fields(kind = ws_kind(&msg)))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &Arc<AppState>,
  session_id: &str,
  late: &UnboundedSender<ServerWsMessage>,
) -> ServerWsMessage {
  let result: Result<_, ApiError> = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,
    ClientWsMessage::GetState => snapshot(state, session_id).await,
    ClientWsMessage::SetQuestion { text } => {
      edit_form(state, session_id, move |f| f.question_text = text).await
    }
    ClientWsMessage::SetAnswer { text } => {
      edit_form(state, session_id, move |f| f.answer_text = text).await
    }
    ClientWsMessage::SetQuestionImage { data_url } => {
      set_image_data_url(state, session_id, ImageSlot::Question, &data_url).await
    }
    ClientWsMessage::SetAnswerImage { data_url } => {
      set_image_data_url(state, session_id, ImageSlot::Answer, &data_url).await
    }
    ClientWsMessage::ClearQuestionImage => clear_image(state, session_id, ImageSlot::Question).await,
    ClientWsMessage::ClearAnswerImage => clear_image(state, session_id, ImageSlot::Answer).await,
    ClientWsMessage::Submit => match begin_submission(state, session_id).await {
      Ok(Some(input)) => {
        spawn_submission(state, session_id, input, late);
        snapshot(state, session_id).await
      }
      Ok(None) => snapshot(state, session_id).await,
      Err(e) => Err(e),
    },
    ClientWsMessage::Reset => reset_session(state, session_id).await,
  };

  match result {
    Ok(session) => ServerWsMessage::State { session },
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}

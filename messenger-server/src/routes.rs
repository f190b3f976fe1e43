use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::{Extension, Json};
use messenger_common::{
    ChatView, LoginForm, NewMessage, Notice, NoticeLevel, PolledMessage, PolledMessages, RequestId, SignupForm,
    UserId,
};

use crate::auth::CurrentUser;
use crate::connect::SendOutcome;
use crate::error::Result;
use crate::State;

fn notice(level: NoticeLevel, message: String) -> Json<Notice> {
    Json(Notice { level, message })
}

pub async fn signup(Extension(state): Extension<State>, Json(form): Json<SignupForm>) -> Result<impl IntoResponse> {
    let user = state.users.register(&form)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(Extension(state): Extension<State>, Json(form): Json<LoginForm>) -> Result<impl IntoResponse> {
    Ok(Json(state.users.authenticate(&form.username, &form.password)?))
}

pub async fn connect(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
    Ok(Json(state.connect.list_partition(me.id)?))
}

pub async fn send_request(
    Extension(state): Extension<State>,
    CurrentUser(me): CurrentUser,
    Path(user_id): Path<u64>,
) -> Result<impl IntoResponse> {
    let outcome = state.connect.send_request(me.id, UserId(user_id))?;
    let to = state.users.get(UserId(user_id))?;
    Ok(match outcome {
        SendOutcome::Sent(_) | SendOutcome::AlreadyPending(_) => {
            notice(NoticeLevel::Success, format!("Friend request sent to {}", to.username))
        }
        SendOutcome::IncomingPending(_) => {
            notice(NoticeLevel::Info, format!("{} already sent you a friend request", to.username))
        }
        SendOutcome::AlreadyFriends => notice(NoticeLevel::Info, format!("You are already friends with {}", to.username)),
        SendOutcome::SelfRequest => notice(NoticeLevel::Info, "You cannot send a friend request to yourself".into()),
    })
}

pub async fn accept_request(
    Extension(state): Extension<State>,
    CurrentUser(me): CurrentUser,
    Path(request_id): Path<u64>,
) -> Result<impl IntoResponse> {
    let (request, _) = state.connect.accept_request(RequestId(request_id), me.id)?;
    let from = state.users.get(request.from)?;
    Ok(notice(NoticeLevel::Success, format!("You are now friends with {}", from.username)))
}

pub async fn reject_request(
    Extension(state): Extension<State>,
    CurrentUser(me): CurrentUser,
    Path(request_id): Path<u64>,
) -> Result<impl IntoResponse> {
    let request = state.connect.reject_request(RequestId(request_id), me.id)?;
    let from = state.users.get(request.from)?;
    Ok(notice(NoticeLevel::Info, format!("Request from {} rejected", from.username)))
}

pub async fn unfriend(
    Extension(state): Extension<State>,
    CurrentUser(me): CurrentUser,
    Path(friend_id): Path<u64>,
) -> Result<impl IntoResponse> {
    let friend = state.users.get(UserId(friend_id))?;
    state.connect.unfriend(me.id, friend.id)?;
    Ok(notice(NoticeLevel::Info, format!("You are no longer friends with {}", friend.username)))
}

pub async fn chat_page(
    Extension(state): Extension<State>,
    CurrentUser(me): CurrentUser,
    Path(friend_id): Path<u64>,
) -> Result<impl IntoResponse> {
    let friend = state.users.get(UserId(friend_id))?;
    let messages = state.chat.history(me.id, friend.id)?;
    Ok(Json(ChatView { friend, messages }))
}

pub async fn post_message(
    Extension(state): Extension<State>,
    CurrentUser(me): CurrentUser,
    Path(friend_id): Path<u64>,
    Json(payload): Json<NewMessage>,
) -> Result<impl IntoResponse> {
    let friend = state.users.get(UserId(friend_id))?;
    state.chat.send_message(me.id, friend.id, &payload.message)?;
    Ok(Redirect::to(&format!("/chat/{}", friend.id)))
}

/// Polled by the chat page; same read side effect as opening it.
pub async fn poll_messages(
    Extension(state): Extension<State>,
    CurrentUser(me): CurrentUser,
    Path(friend_id): Path<u64>,
) -> Result<impl IntoResponse> {
    let friend = state.users.get(UserId(friend_id))?;
    let messages = state
        .chat
        .history(me.id, friend.id)?
        .into_iter()
        .map(|message| PolledMessage {
            id: message.id,
            content: message.content,
            sender_id: message.sender,
            timestamp: message.timestamp.format("%I:%M %p").to_string(),
        })
        .collect();
    Ok(Json(PolledMessages { messages, current_user_id: me.id }))
}

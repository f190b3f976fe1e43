pub mod auth;
pub mod chat;
pub mod config;
pub mod connect;
pub mod error;
pub mod routes;
pub mod store;
pub mod users;

use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::chat::Chat;
use crate::config::Config;
use crate::connect::Connect;
use crate::error::Result;
use crate::store::Store;
use crate::users::Users;

#[derive(Clone)]
pub struct State {
    pub store: Store,
    pub users: Users,
    pub connect: Connect,
    pub chat: Chat,
}

impl State {
    pub fn new(store: Store, bcrypt_cost: u32) -> Self {
        let users = Users::new(store.clone(), bcrypt_cost);
        let connect = Connect::new(store.clone(), users.clone());
        let chat = Chat::new(store.clone(), connect.clone());
        Self { store, users, connect, chat }
    }

    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(Store::open(&config.db_path)?, config.bcrypt_cost))
    }
}

pub fn app(state: State) -> Router {
    Router::new()
        .route("/signup", post(routes::signup))
        .route("/login", post(routes::login))
        .route("/connect", get(routes::connect))
        .route("/send-request/:user_id", post(routes::send_request))
        .route("/accept-request/:request_id", post(routes::accept_request))
        .route("/reject-request/:request_id", post(routes::reject_request))
        .route("/unfriend/:friend_id", post(routes::unfriend))
        .route("/chat/:friend_id", get(routes::chat_page).post(routes::post_message))
        .route("/api/messages/:friend_id", get(routes::poll_messages))
        .layer(Extension(state))
}

use std::net::TcpListener;

use messenger_client::client::{signup, Session};
use messenger_common::{SignupForm, Url};
use messenger_server::store::Store;
use messenger_server::{app, State};
use reqwest::Client;
use tokio::task::JoinHandle;

/// A server on an ephemeral port backed by a throwaway store. Stopped on drop.
pub struct ServerRunner {
    pub base: Url,
    pub state: State,
    handle: JoinHandle<()>,
}

impl ServerRunner {
    pub async fn start() -> anyhow::Result<Self> {
        let state = State::new(Store::temporary()?, 4);
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let server = axum::Server::from_tcp(listener)?.serve(app(state.clone()).into_make_service());
        let handle = tokio::spawn(async move {
            let _ = server.await;
        });
        Ok(Self { base: Url(format!("http://{addr}")), state, handle })
    }

    /// Signs a user up and returns a session acting as them.
    pub async fn user(&self, client: &Client, username: &str) -> anyhow::Result<Session> {
        let user = signup(client, &self.base, &SignupForm {
            username: username.into(),
            name: username.into(),
            email: format!("{username}@example.com"),
            password1: "correct horse".into(),
            password2: "correct horse".into(),
        })
        .await?;
        Ok(Session::new(self.base.clone(), user.id))
    }
}

impl Drop for ServerRunner {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub mod client {
    use anyhow::{anyhow, Result};
    use reqwest::{Client, RequestBuilder, Response};
    use serde::de::DeserializeOwned;
    use messenger_common::{
        ChatView, ErrorBody, LoginForm, NewMessage, Notice, Partition, PolledMessages, RequestId, SignupForm, Url,
        User, UserId, USER_ID_HEADER,
    };

    /// Who the calls are made for: the server and the identity the auth layer hands over.
    #[derive(Clone, Debug)]
    pub struct Session {
        pub base: Url,
        pub user: UserId,
    }

    impl Session {
        pub fn new(base: Url, user: UserId) -> Self {
            Self { base, user }
        }
        fn get(&self, client: &Client, path: String) -> RequestBuilder {
            client.get(self.base.join(path)).header(USER_ID_HEADER, self.user.to_string())
        }
        fn post(&self, client: &Client, path: String) -> RequestBuilder {
            client.post(self.base.join(path)).header(USER_ID_HEADER, self.user.to_string())
        }
    }

    /// Error bodies come back as `{ "error": ... }`; surface that text.
    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let error = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| String::from("no error body"));
        Err(anyhow!("{}: {}", status, error))
    }

    pub async fn signup(client: &Client, base: &Url, form: &SignupForm) -> Result<User> {
        json(client.post(base.join("/signup")).json(form).send().await?).await
    }
    pub async fn login(client: &Client, base: &Url, username: impl Into<String>, password: impl Into<String>) -> Result<User> {
        let form = LoginForm { username: username.into(), password: password.into() };
        json(client.post(base.join("/login")).json(&form).send().await?).await
    }
    pub async fn connect(client: &Client, session: &Session) -> Result<Partition> {
        json(session.get(client, String::from("/connect")).send().await?).await
    }
    pub async fn send_request(client: &Client, session: &Session, to: UserId) -> Result<Notice> {
        json(session.post(client, format!("/send-request/{}", to)).send().await?).await
    }
    pub async fn accept_request(client: &Client, session: &Session, request: RequestId) -> Result<Notice> {
        json(session.post(client, format!("/accept-request/{}", request)).send().await?).await
    }
    pub async fn reject_request(client: &Client, session: &Session, request: RequestId) -> Result<Notice> {
        json(session.post(client, format!("/reject-request/{}", request)).send().await?).await
    }
    pub async fn unfriend(client: &Client, session: &Session, friend: UserId) -> Result<Notice> {
        json(session.post(client, format!("/unfriend/{}", friend)).send().await?).await
    }
    pub async fn chat(client: &Client, session: &Session, friend: UserId) -> Result<ChatView> {
        json(session.get(client, format!("/chat/{}", friend)).send().await?).await
    }
    /// Posts a message. The server redirects back to the chat page, so this
    /// returns the conversation as the redirect target renders it.
    pub async fn post_message(client: &Client, session: &Session, friend: UserId, message: impl Into<String>) -> Result<ChatView> {
        json(session
            .post(client, format!("/chat/{}", friend))
            .json(&NewMessage { message: message.into() })
            .send()
            .await?
        ).await
    }
    pub async fn poll_messages(client: &Client, session: &Session, friend: UserId) -> Result<PolledMessages> {
        json(session.get(client, format!("/api/messages/{}", friend)).send().await?).await
    }
}

//! HTTP client for salt-api's `rest_cherrypy` endpoints.
//!
//! Inventory queries go out as a single `local` lowstate chunk targeting the
//! master itself; outcome events are posted to `/hook/<tag>`, which salt-api
//! republishes on the event bus as `salt/netapi/hook/<tag>`.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use minauth_core::{EventSink, InventoryQuery, InventoryRequest, OutcomeEvent, SinkError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Error, Debug)]
pub enum SaltError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("salt-api response has no `return` entry for {0}")]
    EmptyReturn(&'static str),
    #[error("no salt-api credentials configured")]
    NoCredentials,
}

/// External-auth login for salt-api.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub eauth: String,
}

impl Credentials {
    pub fn new(username: String, password: String) -> Self {
        Self {
            username,
            password,
            eauth: "pam".to_string(),
        }
    }
}

/// salt-api client used both as inventory transport and as event sink.
pub struct SaltApiClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    token: Mutex<Option<String>>,
}

#[derive(Serialize)]
struct Lowstate<'a> {
    client: &'static str,
    tgt: &'a str,
    fun: &'a str,
    arg: &'a [String],
}

#[derive(Deserialize)]
struct ApiReturn<T> {
    #[serde(rename = "return")]
    ret: Vec<T>,
}

#[derive(Deserialize)]
struct LoginReturn {
    token: String,
}

impl SaltApiClient {
    /// Create a client for the given salt-api base URL.
    ///
    /// `base_url` should be like `https://salt.example.com:8000` (no trailing slash).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            token: Mutex::new(None),
        }
    }

    /// Log in lazily with these credentials before the first call.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Bound every request to `timeout`. Without this, requests wait as long
    /// as the server keeps the connection open.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, SaltError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Use an already issued token instead of logging in.
    pub fn with_token(self, token: String) -> Self {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticate against `/login` and keep the issued session token.
    pub async fn login(&self) -> Result<String, SaltError> {
        let credentials = self.credentials.as_ref().ok_or(SaltError::NoCredentials)?;
        let url = format!("{}/login", self.base_url);

        info!(url = %url, user = %credentials.username, eauth = %credentials.eauth, "logging in to salt-api");
        let resp = self.client.post(&url).json(credentials).send().await?;
        let parsed: ApiReturn<LoginReturn> = read_json(resp).await?;
        let token = parsed
            .ret
            .into_iter()
            .next()
            .ok_or(SaltError::EmptyReturn("login"))?
            .token;

        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }

    /// Run one function on `request.target` and return the per-minion results.
    pub async fn run(&self, request: &InventoryRequest) -> Result<Value, SaltError> {
        let token = self.session_token().await?;
        let chunk = [Lowstate {
            client: "local",
            tgt: &request.target,
            fun: &request.function,
            arg: &request.args,
        }];

        info!(
            url = %self.base_url,
            target = %request.target,
            function = %request.function,
            "running salt function"
        );
        let resp = self
            .authorized(self.client.post(format!("{}/", self.base_url)), token)
            .json(&chunk)
            .send()
            .await?;
        let parsed: ApiReturn<Value> = read_json(resp).await?;
        let result = parsed
            .ret
            .into_iter()
            .next()
            .ok_or(SaltError::EmptyReturn("run"))?;
        debug!(responders = result.as_object().map_or(0, |m| m.len()), "salt function returned");
        Ok(result)
    }

    /// Post `data` to `/hook/<tag>`.
    pub async fn fire_hook<T: Serialize + ?Sized>(
        &self,
        tag: &str,
        data: &T,
    ) -> Result<(), SaltError> {
        let token = self.session_token().await?;
        let url = format!("{}/hook/{}", self.base_url, tag);

        info!(url = %url, "firing salt-api webhook");
        let resp = self
            .authorized(self.client.post(&url), token)
            .json(data)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SaltError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn session_token(&self) -> Result<Option<String>, SaltError> {
        let held = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match held {
            Some(token) => Ok(Some(token)),
            None if self.credentials.is_some() => self.login().await.map(Some),
            None => Ok(None),
        }
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        token: Option<String>,
    ) -> reqwest::RequestBuilder {
        let builder = builder.header(reqwest::header::ACCEPT, "application/json");
        match token {
            Some(token) => builder.header(AUTH_HEADER, token),
            None => builder,
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, SaltError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(SaltError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl InventoryQuery for SaltApiClient {
    type Error = SaltError;

    async fn query(&self, request: &InventoryRequest) -> Result<Value, SaltError> {
        self.run(request).await
    }
}

#[async_trait]
impl EventSink for SaltApiClient {
    async fn fire(&self, event: &OutcomeEvent) -> Result<(), SinkError> {
        self.fire_hook(event.tag.as_str(), event)
            .await
            .map_err(|e| SinkError::Transport(Box::new(e)))
    }
}

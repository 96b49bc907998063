//! TerminusDB HTTP client.

use kgraph_core::config::TerminusSettings;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};

use crate::{Result, StoreError};

/// Commit author recorded on every write.
const AUTHOR: &str = "kgraph";

/// How requests authenticate.
#[derive(Clone)]
pub enum TerminusAuth {
    Basic { user: String, password: String },
    Token(String),
}

impl TerminusAuth {
    /// Token auth for cloud connections, read from `settings.token_env`;
    /// basic auth otherwise.
    pub fn from_settings(settings: &TerminusSettings) -> Result<Self> {
        if settings.uses_token() {
            let token = std::env::var(&settings.token_env).map_err(|_| {
                StoreError::Unavailable {
                    backend: "terminusdb",
                    message: format!("access token variable {} is not set", settings.token_env),
                }
            })?;
            Ok(Self::Token(token))
        } else {
            Ok(Self::Basic {
                user: settings.user.clone(),
                password: settings.password.clone(),
            })
        }
    }
}

impl std::fmt::Debug for TerminusAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { user, .. } => f.debug_struct("Basic").field("user", user).finish(),
            Self::Token(_) => f.write_str("Token(..)"),
        }
    }
}

/// Client bound to one TerminusDB database.
///
/// Clone is cheap (reqwest's client is reference counted).
#[derive(Debug, Clone)]
pub struct TerminusClient {
    http: Client,
    endpoint: String,
    team: String,
    database: String,
    auth: TerminusAuth,
}

impl TerminusClient {
    pub fn new(
        endpoint: impl Into<String>,
        team: impl Into<String>,
        database: impl Into<String>,
        auth: TerminusAuth,
    ) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            team: team.into(),
            database: database.into(),
            auth,
        }
    }

    /// Connect and create the database if it does not exist yet.
    pub async fn connect(settings: &TerminusSettings) -> Result<Self> {
        let auth = TerminusAuth::from_settings(settings)?;
        let client = Self::new(
            settings.endpoint(),
            settings.team.clone(),
            settings.database.clone(),
            auth,
        );
        client.ensure_database().await?;

        tracing::info!(
            endpoint = %client.endpoint,
            team = %client.team,
            database = %client.database,
            "Connected to TerminusDB"
        );
        Ok(client)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// `{endpoint}/api/{api}/{team}/{database}`
    pub(crate) fn url(&self, api: &str) -> String {
        format!(
            "{}/api/{api}/{}/{}",
            self.endpoint, self.team, self.database
        )
    }

    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.auth {
            TerminusAuth::Basic { user, password } => builder.basic_auth(user, Some(password)),
            TerminusAuth::Token(token) => builder.bearer_auth(token),
        }
    }

    /// `author` and `message` query parameters for a commit.
    pub(crate) fn commit_params(message: &str) -> [(&'static str, String); 2] {
        [("author", AUTHOR.to_string()), ("message", message.to_string())]
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                StoreError::Unavailable {
                    backend: "terminusdb",
                    message: e.to_string(),
                }
            } else {
                StoreError::Http(e)
            }
        })
    }

    /// Send and turn any non-success status into `Rejected`.
    pub(crate) async fn send_checked(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.send(builder).await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(rejected(response).await)
    }

    /// Send, mapping 404 to `None`.
    pub(crate) async fn send_optional(&self, builder: RequestBuilder) -> Result<Option<Response>> {
        let response = self.send(builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if response.status().is_success() {
            return Ok(Some(response));
        }
        Err(rejected(response).await)
    }

    async fn ensure_database(&self) -> Result<()> {
        let url = self.url("db");
        if self
            .send_optional(self.request(Method::HEAD, &url))
            .await?
            .is_some()
        {
            return Ok(());
        }

        let body = json!({
            "label": self.database,
            "comment": "kgraph knowledge graph",
            "schema": true,
        });
        self.send_checked(self.request(Method::POST, &url).json(&body))
            .await?;
        tracing::info!(database = %self.database, "TerminusDB database created");
        Ok(())
    }

    /// Replace the whole schema graph with `classes`.
    pub async fn replace_schema(&self, classes: &[Value]) -> Result<()> {
        let url = self.url("document");
        let builder = self
            .request(Method::POST, &url)
            .query(&[("graph_type", "schema"), ("full_replace", "true")])
            .query(&Self::commit_params("Install kgraph schema"))
            .json(classes);
        self.send_checked(builder).await?;
        tracing::info!(classes = classes.len(), "TerminusDB schema replaced");
        Ok(())
    }

    /// Run a WOQL query and return its bindings.
    pub async fn woql(&self, query: Value) -> Result<Vec<Value>> {
        let url = self.url("woql");
        let body = json!({ "query": query, "all_witnesses": false });
        let response = self
            .send_checked(self.request(Method::POST, &url).json(&body))
            .await?;
        let mut result: Value = response.json().await?;
        match result.get_mut("bindings").map(Value::take) {
            Some(Value::Array(bindings)) => Ok(bindings),
            _ => Err(StoreError::Serialization(format!(
                "WOQL response without bindings: {result}"
            ))),
        }
    }
}

async fn rejected(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    tracing::debug!(status, %message, "TerminusDB request rejected");
    StoreError::Rejected { status, message }
}

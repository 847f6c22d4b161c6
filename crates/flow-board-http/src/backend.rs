//! HTTP implementation of the board backend
//!
//! Routes, relative to the configured base URL:
//!
//! - `GET  /catalog`
//! - `GET  /apps/{app}/boards/{board}?version=a_b_c`
//! - `POST /apps/{app}/boards/{board}/commands`
//! - `POST /apps/{app}/boards/{board}/undo`
//! - `POST /apps/{app}/boards/{board}/redo`
//! - `POST /apps/{app}/boards/{board}/execute?stream=true|false`

use std::time::Duration;

use async_trait::async_trait;
use flow_board::{
    Board, BoardBackend, BoardError, Command, Node, RunMetadata, RunObserver, RunRequest, RunUpdate,
    Version,
};
use futures_util::StreamExt;
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::config::HttpBackendConfig;
use crate::error::HttpBackendError;
use crate::stream::{parse_line, LineBuffer, StreamLine};

type HttpResult<T> = std::result::Result<T, HttpBackendError>;

/// Board backend talking JSON to a remote runtime
pub struct HttpBackend {
    /// HTTP client for API requests
    http_client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> HttpResult<Self> {
        // Fail early on a malformed base URL
        build_url(&config.base_url, &[])?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn board_url(&self, app_id: &str, board_id: &str, action: Option<&str>) -> HttpResult<Url> {
        let mut segments = vec!["apps", app_id, "boards", board_id];
        segments.extend(action);
        build_url(&self.config.base_url, &segments)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> HttpResult<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        log::warn!("Runtime request failed with {}: {}", status, body);
        Err(HttpBackendError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> HttpResult<T> {
        let body = self.send(request).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_commands(&self, app_id: &str, board_id: &str, commands: &[Command]) -> HttpResult<Vec<Command>> {
        let url = self.board_url(app_id, board_id, Some("commands"))?;
        log::debug!("Sending {} command(s) to {}", commands.len(), url);
        self.send_json(self.http_client.post(url).json(commands)).await
    }

    async fn post_history(&self, app_id: &str, board_id: &str, action: &str, commands: &[Command]) -> HttpResult<()> {
        let url = self.board_url(app_id, board_id, Some(action))?;
        log::debug!("Sending {} of {} command(s) to {}", action, commands.len(), url);
        self.send(self.http_client.post(url).json(commands)).await?;
        Ok(())
    }

    async fn execute(
        &self,
        app_id: &str,
        board_id: &str,
        request: &RunRequest,
        stream: bool,
        observer: &dyn RunObserver,
    ) -> HttpResult<RunMetadata> {
        let mut url = self.board_url(app_id, board_id, Some("execute"))?;
        url.query_pairs_mut()
            .append_pair("stream", if stream { "true" } else { "false" });
        let response = self.send(self.http_client.post(url).json(request)).await?;

        if !stream {
            let metadata: RunMetadata = serde_json::from_str(&response.text().await?)?;
            observer.on_start(&metadata.run_id);
            return Ok(metadata);
        }

        let mut body = Box::pin(response.bytes_stream());
        let mut buffer = LineBuffer::new();
        let mut metadata = None;
        while let Some(chunk) = body.next().await {
            for line in buffer.push(&chunk?) {
                handle_line(&line, observer, &mut metadata)?;
            }
        }
        if let Some(tail) = buffer.finish() {
            handle_line(&tail, observer, &mut metadata)?;
        }

        metadata.ok_or_else(|| HttpBackendError::Protocol("run stream ended without run metadata".to_string()))
    }
}

fn handle_line(line: &str, observer: &dyn RunObserver, metadata: &mut Option<RunMetadata>) -> HttpResult<()> {
    match parse_line(line)? {
        Some(StreamLine::Update(update)) => {
            if let RunUpdate::Started { run_id } = &update {
                observer.on_start(run_id);
            }
            observer.on_update(&update);
        }
        Some(StreamLine::Metadata(received)) => *metadata = Some(received),
        None => {}
    }
    Ok(())
}

/// Append path segments to the base URL, percent-encoding each
pub(crate) fn build_url(base_url: &str, segments: &[&str]) -> HttpResult<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| HttpBackendError::InvalidConfig(format!("invalid base url '{}': {}", base_url, e)))?;
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            HttpBackendError::InvalidConfig(format!("base url '{}' cannot have a path", base_url))
        })?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Query value of a version, e.g. `1_2_0`
pub(crate) fn version_param(version: Version) -> String {
    format!("{}_{}_{}", version.0, version.1, version.2)
}

#[async_trait]
impl BoardBackend for HttpBackend {
    async fn get_catalog(&self) -> flow_board::Result<Vec<Node>> {
        let url = build_url(&self.config.base_url, &["catalog"])?;
        Ok(self.send_json(self.http_client.get(url)).await?)
    }

    async fn get_board(&self, app_id: &str, board_id: &str, version: Option<Version>) -> flow_board::Result<Board> {
        let mut url = self.board_url(app_id, board_id, None)?;
        if let Some(version) = version {
            url.query_pairs_mut()
                .append_pair("version", &version_param(version));
        }
        log::debug!("Fetching board from {}", url);
        Ok(self.send_json(self.http_client.get(url)).await?)
    }

    async fn execute_command(&self, app_id: &str, board_id: &str, command: Command) -> flow_board::Result<Command> {
        let mut applied = self
            .post_commands(app_id, board_id, std::slice::from_ref(&command))
            .await?;
        applied
            .pop()
            .ok_or_else(|| BoardError::backend("runtime returned no applied command"))
    }

    async fn execute_commands(
        &self,
        app_id: &str,
        board_id: &str,
        commands: Vec<Command>,
    ) -> flow_board::Result<Vec<Command>> {
        Ok(self.post_commands(app_id, board_id, &commands).await?)
    }

    async fn undo_board(&self, app_id: &str, board_id: &str, commands: Vec<Command>) -> flow_board::Result<()> {
        Ok(self.post_history(app_id, board_id, "undo", &commands).await?)
    }

    async fn redo_board(&self, app_id: &str, board_id: &str, commands: Vec<Command>) -> flow_board::Result<()> {
        Ok(self.post_history(app_id, board_id, "redo", &commands).await?)
    }

    async fn execute_board(
        &self,
        app_id: &str,
        board_id: &str,
        request: RunRequest,
        stream: bool,
        observer: &dyn RunObserver,
    ) -> flow_board::Result<RunMetadata> {
        let metadata = self
            .execute(app_id, board_id, &request, stream, observer)
            .await?;
        log::info!("Run '{}' of board '{}' returned {:?}", metadata.run_id, board_id, metadata.status);
        Ok(metadata)
    }
}

use crate::definition::AgentDefinition;
use crate::deploy::{DeploySpec, StagedArtifacts, stage_artifacts};
use crate::event::Event;
use crate::session::{Session, SessionList};
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::pin::Pin;
use std::time::Duration;
use storage::{Bucket, GcsClient};

/// ホスト側で使用するエージェントフレームワーク
const AGENT_FRAMEWORK: &str = "google-adk";
const PYTHON_VERSION: &str = "3.12";
const TELEMETRY_ENV: &str = "GOOGLE_CLOUD_AGENT_ENGINE_ENABLE_TELEMETRY";

/// 長時間実行オペレーションのポーリング間隔
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// デプロイ済みエージェントが公開するメソッド（名前, api_mode）
const CLASS_METHODS: &[(&str, &str)] = &[
    ("create_session", ""),
    ("get_session", ""),
    ("list_sessions", ""),
    ("delete_session", ""),
    ("stream_query", "stream"),
];

/// Agent Engine クライアントのエラー型
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("Agent Engine API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Deployment error: {0}")]
    DeploymentError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// ストリーミング応答のイベント列
///
/// 一度だけ消費できる有限のストリーム。
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, AgentError>> + Send>>;

/// デプロイ済みエンジンのリソース
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningEngine {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationStatus>,
    #[serde(default)]
    response: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Vertex AI Agent Engine の REST API クライアント
///
/// エンジンの作成・取得と、デプロイ済みエージェントへの操作の入り口となる。
#[derive(Debug, Clone)]
pub struct AgentEngineClient {
    http: Client,
    base_url: String,
    project: String,
    location: String,
    token: String,
    poll_interval: Duration,
}

impl AgentEngineClient {
    /// 新しい AgentEngineClient を作成する
    ///
    /// # Arguments
    /// * `project` - プロジェクトID
    /// * `location` - リージョン（例: "us-central1"）
    /// * `token` - OAuth2 アクセストークン
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let location = location.into();
        Self {
            http: Client::new(),
            base_url: format!("https://{}-aiplatform.googleapis.com/v1", location),
            project: project.into(),
            location,
            token: token.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// 接続先エンドポイントを差し替える（テスト用のモックサーバーなど）
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.location)
    }

    /// エンジンIDを完全なリソース名に変換する
    ///
    /// 既に `projects/` で始まる場合はそのまま返す。
    pub fn resource_name(&self, engine: &str) -> String {
        if engine.starts_with("projects/") {
            engine.to_string()
        } else {
            format!("{}/reasoningEngines/{}", self.parent(), engine)
        }
    }

    /// エージェントをデプロイする
    ///
    /// アーティファクトをステージングバケットへアップロードし、
    /// エンジン作成オペレーションが完了するまで待機する。
    ///
    /// # Arguments
    /// * `definition` - デプロイするエージェント定義
    /// * `spec` - 表示名・依存パッケージなどのオプション
    /// * `staging` - ステージング用の Cloud Storage クライアント
    /// * `bucket` - ステージング用バケット
    ///
    /// # Returns
    /// * `Ok(DeployedAgent)` - デプロイ済みエージェントのハンドル
    /// * `Err(AgentError)` - アップロードまたは作成に失敗した場合
    pub async fn create(
        &self,
        definition: &AgentDefinition,
        spec: &DeploySpec,
        staging: &GcsClient,
        bucket: &Bucket,
    ) -> Result<DeployedAgent, AgentError> {
        let artifacts = stage_artifacts(definition, spec, staging, &bucket.name).await?;
        let body = create_request_body(definition, spec, &artifacts);

        let url = format!("{}/{}/reasoningEngines", self.base_url, self.parent());
        tracing::info!("Creating agent engine '{}'", spec.display_name);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let mut operation: Operation = check_status(response).await?.json().await?;
        tracing::info!("Create operation started: {}", operation.name);

        while !operation.done {
            tokio::time::sleep(self.poll_interval).await;
            operation = self.get_operation(&operation.name).await?;
            tracing::debug!("Operation {} done={}", operation.name, operation.done);
        }

        if let Some(status) = operation.error {
            return Err(AgentError::DeploymentError(format!(
                "code {}: {}",
                status.code, status.message
            )));
        }

        let response = operation.response.ok_or_else(|| {
            AgentError::DeploymentError("Operation finished without a response".to_string())
        })?;
        let engine: ReasoningEngine = serde_json::from_value(response)?;
        tracing::info!("Agent engine created: {}", engine.name);

        Ok(DeployedAgent::new(self.clone(), engine))
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, AgentError> {
        let url = format!("{}/{}", self.base_url, name);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// 既存のエンジンを取得する
    ///
    /// # Arguments
    /// * `engine` - エンジンID、または完全なリソース名
    pub async fn get(&self, engine: &str) -> Result<DeployedAgent, AgentError> {
        let url = format!("{}/{}", self.base_url, self.resource_name(engine));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let engine: ReasoningEngine = check_status(response).await?.json().await?;
        Ok(DeployedAgent::new(self.clone(), engine))
    }
}

/// エンジン作成リクエストの本文を組み立てる
fn create_request_body(
    definition: &AgentDefinition,
    spec: &DeploySpec,
    artifacts: &StagedArtifacts,
) -> Value {
    let mut package_spec = json!({
        "pickleObjectGcsUri": artifacts.definition_uri,
        "requirementsGcsUri": artifacts.requirements_uri,
        "pythonVersion": PYTHON_VERSION,
    });
    if let Some(uri) = &artifacts.dependencies_uri {
        package_spec["dependencyFilesGcsUri"] = json!(uri);
    }

    let class_methods: Vec<Value> = CLASS_METHODS
        .iter()
        .map(|(name, api_mode)| json!({ "name": name, "api_mode": api_mode }))
        .collect();

    let mut engine_spec = json!({
        "agentFramework": AGENT_FRAMEWORK,
        "packageSpec": package_spec,
        "classMethods": class_methods,
    });
    if spec.enable_tracing {
        engine_spec["deploymentSpec"] = json!({
            "env": [{ "name": TELEMETRY_ENV, "value": "true" }]
        });
    }

    json!({
        "displayName": spec.display_name,
        "description": definition.description(),
        "spec": engine_spec,
    })
}

/// デプロイ済みエージェントのハンドル
///
/// セッション管理とストリーミング問い合わせを提供する。
/// 削除は `delete()` を明示的に呼び出した場合のみ行われる。
#[derive(Debug, Clone)]
pub struct DeployedAgent {
    client: AgentEngineClient,
    engine: ReasoningEngine,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    output: Value,
}

impl DeployedAgent {
    fn new(client: AgentEngineClient, engine: ReasoningEngine) -> Self {
        Self { client, engine }
    }

    /// 完全なリソース名
    pub fn resource_name(&self) -> &str {
        &self.engine.name
    }

    pub fn display_name(&self) -> &str {
        self.engine.display_name.as_deref().unwrap_or(&self.engine.name)
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.client.base_url, self.engine.name, suffix)
    }

    /// `:query` エンドポイントでクラスメソッドを呼び出す
    async fn query(&self, class_method: &str, input: Value) -> Result<Value, AgentError> {
        let response = self
            .client
            .http
            .post(self.url(":query"))
            .bearer_auth(&self.client.token)
            .json(&json!({ "classMethod": class_method, "input": input }))
            .send()
            .await?;

        let body: QueryResponse = check_status(response).await?.json().await?;
        Ok(body.output)
    }

    /// 新しいセッションを作成する
    pub async fn create_session(&self, user_id: &str) -> Result<Session, AgentError> {
        let output = self
            .query("create_session", json!({ "user_id": user_id }))
            .await?;
        Ok(serde_json::from_value(output)?)
    }

    /// ユーザーのセッション一覧を取得する
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, AgentError> {
        let output = self
            .query("list_sessions", json!({ "user_id": user_id }))
            .await?;
        let list: SessionList = serde_json::from_value(output)?;
        Ok(list.into())
    }

    /// セッションを取得する
    pub async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Session, AgentError> {
        let output = self
            .query(
                "get_session",
                json!({ "user_id": user_id, "session_id": session_id }),
            )
            .await?;
        Ok(serde_json::from_value(output)?)
    }

    /// メッセージを送信し、応答イベントのストリームを返す
    ///
    /// # Arguments
    /// * `user_id` - ユーザーID
    /// * `session_id` - セッションID（None の場合はランタイム側で新規作成される）
    /// * `message` - 送信するメッセージ
    ///
    /// # Returns
    /// 到着順にイベントを返すストリーム。HTTPステータスはこの時点で検証済み。
    pub async fn stream_query(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<EventStream, AgentError> {
        let mut input = Map::new();
        input.insert("user_id".to_string(), json!(user_id));
        if let Some(session_id) = session_id {
            input.insert("session_id".to_string(), json!(session_id));
        }
        input.insert("message".to_string(), json!(message));

        let response = self
            .client
            .http
            .post(self.url(":streamQuery"))
            .query(&[("alt", "sse")])
            .bearer_auth(&self.client.token)
            .json(&json!({ "classMethod": "stream_query", "input": input }))
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut chunks = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer = LineBuffer::default();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(chunk) => {
                        for line in buffer.push(&chunk) {
                            if let Some(event) = decode_line(&line) {
                                yield Ok(event);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(AgentError::from(e));
                        return;
                    }
                }
            }
            if let Some(event) = buffer.finish().as_deref().and_then(decode_line) {
                yield Ok(event);
            }
        };

        Ok(Box::pin(stream))
    }

    /// エンジンを削除する
    ///
    /// # Arguments
    /// * `force` - セッションなどの子リソースも合わせて削除するか
    pub async fn delete(&self, force: bool) -> Result<(), AgentError> {
        let response = self
            .client
            .http
            .delete(self.url(""))
            .query(&[("force", force)])
            .bearer_auth(&self.client.token)
            .send()
            .await?;
        check_status(response).await?;
        tracing::info!("Deleted agent engine {}", self.engine.name);
        Ok(())
    }
}

/// 改行区切りのチャンクを行単位に組み立てるバッファ
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// チャンクを追加し、完成した行を返す
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// 末尾に残った改行なしの行を返す
    fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

/// 1行をイベントにデコードする
///
/// 空行・SSEのコメント行は無視し、JSONでない行は警告を出して読み飛ばす。
fn decode_line(line: &str) -> Option<Event> {
    let line = line.trim();
    let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if payload.is_empty() || payload.starts_with(':') {
        return None;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => Some(Event::from(value)),
        Err(e) => {
            tracing::warn!("Skipping undecodable stream line: {} ({})", payload, e);
            None
        }
    }
}

/// ステータスコードを検証し、失敗時は AgentError::ApiError に変換する
async fn check_status(response: Response) -> Result<Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);

    Err(AgentError::ApiError {
        status: status.as_u16(),
        message,
    })
}

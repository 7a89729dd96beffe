use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Cloud Storage JSON API のデフォルトエンドポイント
pub const GCS_BASE_URL: &str = "https://storage.googleapis.com";

/// Cloud Storage クライアントのエラー型
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Bucket not found: {0}")]
    NotFound(String),

    #[error("Bucket already exists: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Cloud Storage API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("A project id is required to create bucket '{0}'")]
    MissingProject(String),
}

/// バケットのメタデータ
///
/// JSON API が返すリソースのうち、このツールが参照するフィールドのみを保持する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_number: Option<String>,
}

impl Bucket {
    /// `gs://<name>` 形式のアクセスURLを返す
    pub fn url(&self) -> String {
        format!("gs://{}", self.name)
    }
}

/// アップロード済みオブジェクトのメタデータ
#[derive(Debug, Clone, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
}

impl StoredObject {
    pub fn url(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }
}

/// Cloud Storage JSON API を呼び出すクライアント
///
/// バケットの取得・作成と、デプロイ用ステージングファイルのアップロードを行う。
#[derive(Debug, Clone)]
pub struct GcsClient {
    http: Client,
    base_url: String,
    project: Option<String>,
    token: String,
}

impl GcsClient {
    /// 新しい GcsClient を作成する
    ///
    /// # Arguments
    /// * `project` - バケット作成時に使用するプロジェクトID（取得のみなら不要）
    /// * `token` - OAuth2 アクセストークン
    pub fn new(project: Option<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: GCS_BASE_URL.to_string(),
            project,
            token: token.into(),
        }
    }

    /// 接続先エンドポイントを差し替える（テスト用のモックサーバーなど）
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// 名前でバケットを取得する
    ///
    /// # Errors
    /// * `StorageError::NotFound` - バケットが存在しない場合
    /// * `StorageError::PermissionDenied` - 参照権限がない場合
    pub async fn get_bucket(&self, name: &str) -> Result<Bucket, StorageError> {
        let url = format!("{}/storage/v1/b/{}", self.base_url, name);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let response = check_status(response, name).await?;
        Ok(response.json().await?)
    }

    /// 指定したロケーションにバケットを作成する
    ///
    /// # Errors
    /// * `StorageError::MissingProject` - プロジェクトIDが設定されていない場合
    /// * `StorageError::Conflict` - 同名のバケットが既に存在する場合
    /// * `StorageError::PermissionDenied` - 作成権限がない場合
    pub async fn create_bucket(&self, name: &str, location: &str) -> Result<Bucket, StorageError> {
        let project = self
            .project
            .as_deref()
            .ok_or_else(|| StorageError::MissingProject(name.to_string()))?;

        let url = format!("{}/storage/v1/b", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[("project", project)])
            .json(&json!({ "name": name, "location": location }))
            .send()
            .await?;

        let response = check_status(response, name).await?;
        Ok(response.json().await?)
    }

    /// オブジェクトをアップロードする（単純アップロード）
    ///
    /// # Arguments
    /// * `bucket` - アップロード先のバケット名
    /// * `object` - オブジェクト名（`/` 区切りのパスを含んでよい）
    /// * `body` - オブジェクトの内容
    /// * `content_type` - Content-Type ヘッダーの値
    pub async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, bucket);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[("uploadType", "media"), ("name", object)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let response = check_status(response, bucket).await?;
        Ok(response.json().await?)
    }
}

/// ステータスコードを StorageError に変換する
async fn check_status(response: Response, resource: &str) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);

    match status {
        StatusCode::NOT_FOUND => Err(StorageError::NotFound(resource.to_string())),
        StatusCode::CONFLICT => Err(StorageError::Conflict(resource.to_string())),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            Err(StorageError::PermissionDenied(format!("{}: {}", resource, message)))
        }
        _ => Err(StorageError::ApiError {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Google API のエラーレスポンスから `error.message` を取り出す
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

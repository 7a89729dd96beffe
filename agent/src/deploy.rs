/// デプロイ用アーティファクトのステージング
///
/// エージェント定義・依存パッケージ一覧・追加ローカルパッケージを
/// ステージング用バケットの `agent_engine/` 配下へアップロードする。
use crate::definition::AgentDefinition;
use crate::engine::AgentError;
use std::path::{Path, PathBuf};
use storage::GcsClient;

/// ステージング先のディレクトリ名
pub const STAGING_DIR: &str = "agent_engine";

const DEFINITION_OBJECT: &str = "agent_engine.json";
const REQUIREMENTS_OBJECT: &str = "requirements.txt";
const DEPENDENCIES_DIR: &str = "dependencies";

/// ホスト側ランタイムに必要な Python パッケージ
pub const DEFAULT_REQUIREMENTS: &[&str] = &["google-cloud-aiplatform[adk,agent_engines]"];

/// デプロイ時のオプション
#[derive(Debug, Clone, PartialEq)]
pub struct DeploySpec {
    /// 表示名
    pub display_name: String,

    /// ランタイムにインストールするパッケージ
    pub requirements: Vec<String>,

    /// 一緒にアップロードするローカルのファイルまたはディレクトリ
    pub extra_packages: Vec<PathBuf>,

    /// ホスト側のトレースを有効にするか
    pub enable_tracing: bool,
}

impl DeploySpec {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            requirements: DEFAULT_REQUIREMENTS.iter().map(|r| r.to_string()).collect(),
            extra_packages: Vec::new(),
            enable_tracing: true,
        }
    }

    pub fn with_extra_packages(mut self, extra_packages: Vec<PathBuf>) -> Self {
        self.extra_packages = extra_packages;
        self
    }

    pub fn with_tracing(mut self, enable_tracing: bool) -> Self {
        self.enable_tracing = enable_tracing;
        self
    }

    /// requirements.txt の内容
    pub fn requirements_txt(&self) -> String {
        let mut body = self.requirements.join("\n");
        body.push('\n');
        body
    }
}

/// アップロード済みアーティファクトのURI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifacts {
    pub definition_uri: String,
    pub requirements_uri: String,
    /// 追加パッケージがない場合は None
    pub dependencies_uri: Option<String>,
}

/// 追加パッケージ内の1ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub local: PathBuf,
    /// `dependencies/` からの相対オブジェクト名
    pub object: String,
}

/// 追加パッケージのパスをファイル一覧に展開する
///
/// ディレクトリは再帰的に走査し、ディレクトリ名を先頭に付けた相対パスで登録する。
///
/// # Errors
/// パスが存在しない、または読み込めない場合
pub fn collect_package_files(paths: &[PathBuf]) -> Result<Vec<PackageFile>, AgentError> {
    let mut files = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(AgentError::DeploymentError(format!(
                "Extra package not found: {}",
                path.display()
            )));
        }

        let root = root_name(path)?;
        if path.is_dir() {
            walk_dir(path, &root, &mut files)?;
        } else {
            files.push(PackageFile {
                local: path.clone(),
                object: root,
            });
        }
    }

    files.sort_by(|a, b| a.object.cmp(&b.object));
    Ok(files)
}

fn root_name(path: &Path) -> Result<String, AgentError> {
    // "./agent_news" のような相対パスでも末尾の名前を使う
    let canonical = path.canonicalize()?;
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            AgentError::DeploymentError(format!("Invalid extra package path: {}", path.display()))
        })
}

fn walk_dir(dir: &Path, prefix: &str, files: &mut Vec<PackageFile>) -> Result<(), AgentError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if name == "__pycache__" || name.starts_with('.') {
            continue;
        }

        let object = format!("{}/{}", prefix, name);
        if path.is_dir() {
            walk_dir(&path, &object, files)?;
        } else {
            files.push(PackageFile { local: path, object });
        }
    }
    Ok(())
}

/// アーティファクトをステージング用バケットへアップロードする
///
/// # Arguments
/// * `definition` - デプロイするエージェント定義
/// * `spec` - デプロイオプション
/// * `staging` - Cloud Storage クライアント
/// * `bucket_name` - ステージング用バケット名
pub async fn stage_artifacts(
    definition: &AgentDefinition,
    spec: &DeploySpec,
    staging: &GcsClient,
    bucket_name: &str,
) -> Result<StagedArtifacts, AgentError> {
    let definition_object = format!("{}/{}", STAGING_DIR, DEFINITION_OBJECT);
    let uploaded = staging
        .upload_object(
            bucket_name,
            &definition_object,
            definition.to_json_bytes()?,
            "application/json",
        )
        .await?;
    tracing::info!("Uploaded agent definition to {}", uploaded.url());
    let definition_uri = uploaded.url();

    let requirements_object = format!("{}/{}", STAGING_DIR, REQUIREMENTS_OBJECT);
    let uploaded = staging
        .upload_object(
            bucket_name,
            &requirements_object,
            spec.requirements_txt().into_bytes(),
            "text/plain",
        )
        .await?;
    tracing::info!("Uploaded requirements to {}", uploaded.url());
    let requirements_uri = uploaded.url();

    let files = collect_package_files(&spec.extra_packages)?;
    let dependencies_uri = if files.is_empty() {
        None
    } else {
        for file in &files {
            let object = format!("{}/{}/{}", STAGING_DIR, DEPENDENCIES_DIR, file.object);
            let body = tokio::fs::read(&file.local).await?;
            staging
                .upload_object(bucket_name, &object, body, "application/octet-stream")
                .await?;
            tracing::debug!("Uploaded {} as {}", file.local.display(), object);
        }
        tracing::info!("Uploaded {} extra package file(s)", files.len());
        Some(format!(
            "gs://{}/{}/{}",
            bucket_name, STAGING_DIR, DEPENDENCIES_DIR
        ))
    };

    Ok(StagedArtifacts {
        definition_uri,
        requirements_uri,
        dependencies_uri,
    })
}

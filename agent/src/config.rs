/// デプロイ設定
///
/// 環境変数（および `.env` ファイル）から読み込み、
/// バケット準備・デプロイ処理へ明示的に渡す。
use crate::engine::AgentError;
use std::env;

pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";
pub const LOCATION_ENV: &str = "GOOGLE_CLOUD_LOCATION";
pub const MODEL_ENV: &str = "MODEL";
pub const BUCKET_ENV: &str = "AGENT_ENGINE_BUCKET";
pub const ENGINE_ID_ENV: &str = "AGENT_ENGINE_ID";

/// サブエージェントが使用するデフォルトのモデルID
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// デプロイに必要な設定一式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    /// Google Cloud プロジェクトID
    pub project: String,

    /// リージョン（例: "us-central1"）
    pub location: String,

    /// LLMのモデルID
    pub model: String,

    /// ステージング用バケット名
    pub bucket_name: String,
}

impl DeployConfig {
    /// 明示的な値から設定を作成する
    ///
    /// `model` と `bucket_name` が None の場合はデフォルト値を使用する。
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        model: Option<String>,
        bucket_name: Option<String>,
    ) -> Result<Self, AgentError> {
        let project = project.into();
        let location = location.into();

        if project.trim().is_empty() {
            return Err(AgentError::ConfigError(format!("{} is empty", PROJECT_ENV)));
        }
        if location.trim().is_empty() {
            return Err(AgentError::ConfigError(format!("{} is empty", LOCATION_ENV)));
        }

        let bucket_name = bucket_name.unwrap_or_else(|| default_bucket_name(&project, &location));

        Ok(Self {
            project,
            location,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            bucket_name,
        })
    }

    /// 環境変数から設定を読み込む
    ///
    /// カレントディレクトリに `.env` があれば先に読み込む。
    /// 引数で渡された値は環境変数より優先される。
    ///
    /// # Errors
    /// プロジェクトIDまたはロケーションが見つからない場合
    pub fn from_env(
        project: Option<String>,
        location: Option<String>,
    ) -> Result<Self, AgentError> {
        load_dotenv();

        let project = project
            .or_else(|| non_empty_var(PROJECT_ENV))
            .ok_or_else(|| AgentError::ConfigError(format!("{} is not set", PROJECT_ENV)))?;
        let location = location
            .or_else(|| non_empty_var(LOCATION_ENV))
            .ok_or_else(|| AgentError::ConfigError(format!("{} is not set", LOCATION_ENV)))?;

        Self::new(
            project,
            location,
            non_empty_var(MODEL_ENV),
            non_empty_var(BUCKET_ENV),
        )
    }
}

/// `ae-<project>-<location>-bucket` 形式のバケット名
pub fn default_bucket_name(project: &str, location: &str) -> String {
    format!("ae-{}-{}-bucket", project, location)
}

/// デプロイ済みエンジンのIDを環境変数から取得する
pub fn engine_id_from_env() -> Option<String> {
    load_dotenv();
    non_empty_var(ENGINE_ID_ENV)
}

fn load_dotenv() {
    if let Ok(path) = dotenv::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_applied() {
        let config = DeployConfig::new("my-project", "us-central1", None, None).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.bucket_name, "ae-my-project-us-central1-bucket");
    }

    #[test]
    fn test_explicit_values_win() {
        let config = DeployConfig::new(
            "my-project",
            "europe-west1",
            Some("gemini-2.0-flash".to_string()),
            Some("custom-bucket".to_string()),
        )
        .unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.bucket_name, "custom-bucket");
    }

    #[test]
    fn test_empty_project_is_rejected() {
        let result = DeployConfig::new(" ", "us-central1", None, None);
        assert!(matches!(result, Err(AgentError::ConfigError(_))));
    }

    #[test]
    fn test_from_env_prefers_arguments() {
        let config = DeployConfig::from_env(
            Some("arg-project".to_string()),
            Some("asia-northeast1".to_string()),
        )
        .unwrap();
        assert_eq!(config.project, "arg-project");
        assert_eq!(config.location, "asia-northeast1");
    }
}

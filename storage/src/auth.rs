use crate::gcs::StorageError;
use tokio::process::Command;

/// アクセストークンを直接指定するための環境変数
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Google Cloud API 用の OAuth2 アクセストークンを取得する
///
/// 以下の順序で解決する：
/// 1. 環境変数 `GOOGLE_OAUTH_ACCESS_TOKEN`
/// 2. `gcloud auth print-access-token` の出力
///
/// # Errors
/// どちらの方法でもトークンが得られなかった場合は `StorageError::AuthError`
pub async fn resolve_access_token() -> Result<String, StorageError> {
    if let Some(token) = token_from_env() {
        tracing::debug!("Using access token from {}", ACCESS_TOKEN_ENV);
        return Ok(token);
    }

    tracing::debug!("Requesting access token from gcloud");
    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| StorageError::AuthError(format!("Failed to run gcloud: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StorageError::AuthError(format!(
            "gcloud auth print-access-token failed: {}",
            stderr.trim()
        )));
    }

    parse_token(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| StorageError::AuthError("gcloud returned an empty token".to_string()))
}

fn token_from_env() -> Option<String> {
    std::env::var(ACCESS_TOKEN_ENV)
        .ok()
        .and_then(|value| parse_token(&value))
}

fn parse_token(raw: &str) -> Option<String> {
    let token = raw.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// ステージング用バケットの存在確認・作成
///
/// Lookup → Create → LookupAfterConflict の順に遷移し、
/// 権限エラーのみを呼び出し元へ返す。それ以外の失敗はログに記録して `None` を返す。
use crate::gcs::{Bucket, GcsClient, StorageError};
use async_trait::async_trait;

/// バケットの取得と作成を提供するストレージ抽象
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// 名前でバケットを取得する
    async fn get_bucket(&self, name: &str) -> Result<Bucket, StorageError>;

    /// バケットを作成する
    async fn create_bucket(&self, name: &str, location: &str) -> Result<Bucket, StorageError>;

    /// 使用中のプロジェクトID（推定できない場合は None）
    fn project(&self) -> Option<&str>;
}

#[async_trait]
impl BucketStore for GcsClient {
    async fn get_bucket(&self, name: &str) -> Result<Bucket, StorageError> {
        GcsClient::get_bucket(self, name).await
    }

    async fn create_bucket(&self, name: &str, location: &str) -> Result<Bucket, StorageError> {
        GcsClient::create_bucket(self, name, location).await
    }

    fn project(&self) -> Option<&str> {
        GcsClient::project(self)
    }
}

/// 利用可能になったバケット
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedBucket {
    /// `gs://<name>` 形式のURL
    pub url: String,
    pub bucket: Bucket,
}

impl From<Bucket> for ProvisionedBucket {
    fn from(bucket: Bucket) -> Self {
        Self {
            url: bucket.url(),
            bucket,
        }
    }
}

/// バケットが存在すれば取得し、なければ作成する
///
/// # Arguments
/// * `store` - バケット操作の実装
/// * `bucket_name` - グローバルに一意なバケット名
/// * `location` - 作成時に使用するロケーション（例: "us-central1", "US"）
///
/// # Returns
/// * `Ok(Some(ProvisionedBucket))` - 取得または作成に成功した場合
/// * `Ok(None)` - 権限以外の理由で失敗した場合（詳細はログ参照）
/// * `Err(StorageError::PermissionDenied)` - 権限不足の場合
pub async fn check_or_create_bucket<S: BucketStore + ?Sized>(
    store: &S,
    bucket_name: &str,
    location: &str,
) -> Result<Option<ProvisionedBucket>, StorageError> {
    tracing::info!("Using project: {}", store.project().unwrap_or("<inferred>"));

    match store.get_bucket(bucket_name).await {
        Ok(bucket) => {
            let provisioned = ProvisionedBucket::from(bucket);
            tracing::info!("Bucket '{}' already exists: {}", bucket_name, provisioned.url);
            return Ok(Some(provisioned));
        }
        Err(StorageError::NotFound(_)) => {
            tracing::info!(
                "Bucket '{}' not found. Creating it in location '{}'",
                bucket_name,
                location
            );
        }
        Err(e @ StorageError::PermissionDenied(_)) => {
            tracing::error!("Permission denied. Details: {}", e);
            return Err(e);
        }
        Err(e) => {
            tracing::error!("An unexpected error occurred: {}", e);
            return Ok(None);
        }
    }

    match store.create_bucket(bucket_name, location).await {
        Ok(bucket) => {
            let provisioned = ProvisionedBucket::from(bucket);
            tracing::info!("Bucket '{}' created: {}", bucket_name, provisioned.url);
            Ok(Some(provisioned))
        }
        Err(StorageError::Conflict(_)) => {
            tracing::warn!(
                "Conflict during creation of bucket '{}'. Checking if it exists now",
                bucket_name
            );
            lookup_after_conflict(store, bucket_name).await
        }
        Err(e @ StorageError::PermissionDenied(_)) => {
            tracing::error!(
                "Permission denied to create bucket '{}'. Details: {}",
                bucket_name,
                e
            );
            Err(e)
        }
        Err(e) => {
            tracing::error!("An unexpected error occurred during bucket creation: {}", e);
            Ok(None)
        }
    }
}

/// 作成が競合した後に一度だけ再取得する
async fn lookup_after_conflict<S: BucketStore + ?Sized>(
    store: &S,
    bucket_name: &str,
) -> Result<Option<ProvisionedBucket>, StorageError> {
    match store.get_bucket(bucket_name).await {
        Ok(bucket) => {
            let provisioned = ProvisionedBucket::from(bucket);
            tracing::info!(
                "Bucket '{}' found after conflict: {}",
                bucket_name,
                provisioned.url
            );
            Ok(Some(provisioned))
        }
        Err(StorageError::NotFound(_)) => {
            tracing::error!(
                "Bucket '{}' still not found after conflict. Creation failed",
                bucket_name
            );
            Ok(None)
        }
        Err(e) => {
            tracing::error!("Error trying to get bucket after conflict: {}", e);
            Ok(None)
        }
    }
}

/// 実際の Cloud Storage に対してバケットを確認・作成する
///
/// # Arguments
/// * `bucket_name` - バケット名
/// * `location` - 作成時のロケーション
/// * `project` - プロジェクトID（None の場合は作成できない）
/// * `token` - OAuth2 アクセストークン
pub async fn check_or_create_gcs_bucket_with_url(
    bucket_name: &str,
    location: &str,
    project: Option<&str>,
    token: &str,
) -> Result<Option<ProvisionedBucket>, StorageError> {
    let client = GcsClient::new(project.map(str::to_string), token);
    check_or_create_bucket(&client, bucket_name, location).await
}

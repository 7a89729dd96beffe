pub mod auth;
pub mod bucket;
pub mod gcs;

pub use auth::resolve_access_token;
pub use bucket::{
    BucketStore, ProvisionedBucket, check_or_create_bucket, check_or_create_gcs_bucket_with_url,
};
pub use gcs::{Bucket, GcsClient, StorageError, StoredObject};

//! Product image upload.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use duka_core::{Collection, Operation};
use duka_records::{Mutation, MutationPayload};
use duka_remote::ObjectStore;
use duka_store::Store;
use duka_sync::{AssetSync, SyncResult};

/// Uploads product photos and swaps the local file path for the
/// public URL.
///
/// A product's `image` starts out as a path on this machine. Once the
/// row carries its server id, the file is uploaded to
/// `products/<id>.<ext>` and the row is updated to the public URL,
/// queued like any other edit. Unreadable files and failed uploads are
/// logged and retried on the next cycle.
pub struct ProductImageSync {
    store: Store,
    objects: Arc<dyn ObjectStore>,
}

impl ProductImageSync {
    pub fn new(store: Store, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }
}

#[async_trait]
impl AssetSync for ProductImageSync {
    async fn sync_assets(&self) -> SyncResult<usize> {
        let client_id = self.store.client_id().await?;
        let mut uploaded = 0usize;

        for product in self.store.list_products().await? {
            let Some(image) = product.image.clone() else {
                continue;
            };
            // Anything with a scheme is already uploaded.
            if image.contains("://") {
                continue;
            }
            // Wait for the row to land under its server id, so the
            // object key never has to move.
            if product.id.is_placeholder() {
                continue;
            }

            let bytes = match tokio::fs::read(&image).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(product = %product.id, path = %image, error = %err, "could not read product image");
                    continue;
                }
            };

            let (suffix, content_type) = image_format(&image);
            let object_path = format!("products/{}{}", product.id, suffix);
            if let Err(err) = self.objects.upload(&object_path, bytes, content_type).await {
                warn!(product = %product.id, error = %err, "image upload failed");
                continue;
            }

            let mut updated = product;
            updated.image = Some(self.objects.public_url(&object_path));
            updated.updated_at = Utc::now();
            updated.synced = false;
            self.store.upsert_product(&updated).await?;

            let payload = MutationPayload::Product(updated.clone());
            if !self
                .store
                .refresh_pending_update(Collection::Products, &updated.id, &payload)
                .await?
            {
                match Mutation::new(
                    client_id,
                    Collection::Products,
                    Operation::Update,
                    updated.id.clone(),
                    payload,
                ) {
                    Ok(mutation) => self.store.enqueue_mutation(&mutation).await?,
                    Err(err) => {
                        warn!(product = %updated.id, error = %err, "could not queue the image update");
                        continue;
                    }
                }
            }

            debug!(product = %updated.id, object = %object_path, "image uploaded");
            uploaded += 1;
        }

        Ok(uploaded)
    }
}

/// Object suffix and MIME type for an image path.
fn image_format(path: &str) -> (&'static str, &'static str) {
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => (".png", "image/png"),
        Some(ext) if ext.eq_ignore_ascii_case("webp") => (".webp", "image/webp"),
        Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
            (".jpg", "image/jpeg")
        }
        _ => ("", "application/octet-stream"),
    }
}

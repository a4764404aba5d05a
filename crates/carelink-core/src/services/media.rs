use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::models::{GalleryQuery, MediaItem, MediaPage};

const MEDIA_PATH: &str = "/media";

/// Largest upload accepted before sending (20 MiB)
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Gallery page size when the caller passes 0
const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Clone)]
pub struct MediaService {
    api: ApiClient,
}

impl MediaService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// One page of the gallery. Pages start at 1.
    pub async fn list_gallery(&self, page: u32, per_page: u32) -> Result<MediaPage, ApiError> {
        let query = GalleryQuery {
            page: page.max(1),
            per_page: if per_page == 0 { DEFAULT_PAGE_SIZE } else { per_page },
        };
        self.api.get_query(MEDIA_PATH, &query).await
    }

    pub async fn get_item(&self, media_id: i64) -> Result<MediaItem, ApiError> {
        self.api.get(&format!("{}/{}", MEDIA_PATH, media_id)).await
    }

    /// Upload a file as multipart form data.
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<MediaItem, ApiError> {
        if bytes.is_empty() {
            return Err(ApiError::Validation {
                status: 400,
                message: "The file is empty".to_string(),
            });
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::Validation {
                status: 413,
                message: format!("The file is larger than {} MiB", MAX_UPLOAD_BYTES / (1024 * 1024)),
            });
        }
        let size = bytes.len();
        let build = |request: RequestBuilder| -> Result<RequestBuilder, ApiError> {
            let file = Part::bytes(bytes.clone())
                .file_name(file_name.to_string())
                .mime_str(content_type)
                .map_err(|_| ApiError::Validation {
                    status: 400,
                    message: format!("Unsupported content type: {}", content_type),
                })?;
            let form = Form::new().part("file", file);
            let form = match caption {
                Some(caption) => form.text("caption", caption.to_string()),
                None => form,
            };
            Ok(request.multipart(form))
        };

        let response = self.api.execute(Method::POST, MEDIA_PATH, true, build).await?;
        let text = response.text().await?;
        let item: MediaItem = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid upload response: {}", e)))?;
        info!(media_id = item.id, size, "Media uploaded");
        Ok(item)
    }

    pub async fn delete_item(&self, media_id: i64) -> Result<(), ApiError> {
        self.api.delete(&format!("{}/{}", MEDIA_PATH, media_id)).await
    }
}

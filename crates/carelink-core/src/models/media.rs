use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl MediaItem {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }

    pub fn is_video(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("video/"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPage {
    #[serde(default)]
    pub items: Vec<MediaItem>,
    #[serde(default)]
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl MediaPage {
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.per_page) < self.total
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryQuery {
    pub page: u32,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more() {
        let page = MediaPage {
            items: vec![],
            total: 45,
            page: 2,
            per_page: 20,
        };
        assert!(page.has_more());
        assert!(!MediaPage { page: 3, ..page }.has_more());
    }

    #[test]
    fn test_media_kind() {
        let json = r#"{"id": 3, "url": "/m/3.jpg", "contentType": "image/jpeg", "sizeBytes": 1024}"#;
        let item: MediaItem = serde_json::from_str(json).unwrap();
        assert!(item.is_image());
        assert!(!item.is_video());
    }
}

//! Box listing and download payloads
//!
//! The backend proxies the Box folder-items endpoint and wraps the result in
//! `{ "data": ... }`. Depending on the backend version `data` is either a
//! bare array of items or the Box collection object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a Box item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxItemType {
    File,
    Folder,
    WebLink,
    #[serde(other)]
    Other,
}

/// Box item resource (mini representation as returned by folder listings)
///
/// See: https://developer.box.com/reference/resources/item/
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxItem {
    #[serde(rename = "type")]
    pub item_type: BoxItemType,

    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<String>,

    /// Size in bytes (files and folders when requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Modification time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,

    /// Every other field, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BoxItem {
    pub fn is_folder(&self) -> bool {
        self.item_type == BoxItemType::Folder
    }

    pub fn is_file(&self) -> bool {
        self.item_type == BoxItemType::File
    }
}

/// Box collection page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxCollection {
    pub entries: Vec<BoxItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// One page of a folder listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FolderItems {
    Collection(BoxCollection),
    Items(Vec<BoxItem>),
}

impl FolderItems {
    pub fn items(&self) -> &[BoxItem] {
        match self {
            FolderItems::Collection(collection) => &collection.entries,
            FolderItems::Items(items) => items,
        }
    }

    pub fn into_items(self) -> Vec<BoxItem> {
        match self {
            FolderItems::Collection(collection) => collection.entries,
            FolderItems::Items(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Total number of items in the folder, when the backend reports it.
    pub fn total_count(&self) -> Option<u64> {
        match self {
            FolderItems::Collection(collection) => collection.total_count,
            FolderItems::Items(_) => None,
        }
    }
}

/// Backend listing response
#[derive(Debug, Deserialize)]
pub(crate) struct ListingResponse {
    pub data: FolderItems,
}

/// Body posted to the backend download proxy
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DownloadRequest {
    pub uuid: String,
    pub file_name: String,
    pub url: String,
}

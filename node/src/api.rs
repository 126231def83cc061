// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::repo::{ArtifactPage, ArtifactView, SavedArtifact};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveArtifactRequest {
    /// Base64 encoded artifact bytes.
    pub data: String,
    #[serde(default)]
    pub harvest_now: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveArtifactResponse {
    pub cid: String,
    pub saved_date: String,
}

impl From<&SavedArtifact> for SaveArtifactResponse {
    fn from(saved: &SavedArtifact) -> Self {
        Self {
            cid: saved.address.to_string(),
            saved_date: iso(&saved.saved_at),
        }
    }
}

// Query parameters are parsed by hand so malformed values map to our own 400 body.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListArtifactsQuery {
    pub retrieved_after: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GetArtifactQuery {
    pub include_saved_only: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactItem {
    pub cid: String,
    pub data: String,
    pub data_type: String,
    pub saved_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_date: Option<String>,
}

impl From<ArtifactView> for ArtifactItem {
    fn from(view: ArtifactView) -> Self {
        Self {
            cid: view.address.to_string(),
            data: STANDARD.encode(&view.data),
            data_type: view.kind.name().to_string(),
            saved_date: iso(&view.saved_at),
            retrieved_date: view.retrieved_at.as_ref().map(iso),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactListResponse {
    pub data_items: Vec<ArtifactItem>,
    pub has_more: bool,
}

impl From<ArtifactPage> for ArtifactListResponse {
    fn from(page: ArtifactPage) -> Self {
        Self {
            data_items: page.items.into_iter().map(Into::into).collect(),
            has_more: page.has_more,
        }
    }
}

/// `{"status": "success", "data": ...}`
#[derive(Serialize)]
pub struct Success<T> {
    pub status: &'static str,
    pub data: T,
}

impl<T> Success<T> {
    pub fn new(data: T) -> Self {
        Self { status: "success", data }
    }
}

fn iso(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_base64(data: &str) -> Option<Vec<u8>> {
    STANDARD.decode(data.trim()).ok()
}

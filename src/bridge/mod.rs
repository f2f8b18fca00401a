//! Contracts with the backend that stores override defaults and composites images.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::editor::overrides::OverrideLeaf;
use crate::editor::text_lines::TextLineMap;
use crate::geometry::{NormRect, Point};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("editor context unavailable for {selection}: {message}")]
    ContextUnavailable {
        selection: SelectionKey,
        message: String,
    },
    #[error("text line specs unavailable for {selection}: {message}")]
    TextLinesUnavailable {
        selection: SelectionKey,
        message: String,
    },
    #[error("{operation} rejected by backend: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
    #[error("backend request {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl BridgeError {
    /// Wraps a host-side transport failure (HTTP client, IPC, ...) for `operation`.
    pub fn transport(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Transport {
            operation,
            source: source.into(),
        }
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Channel, video and stable-variant identity of the thumbnail being edited.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SelectionKey {
    pub channel: String,
    pub video: String,
    pub stable_variant: String,
}

impl SelectionKey {
    pub fn new(
        channel: impl Into<String>,
        video: impl Into<String>,
        stable_variant: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            video: video.into(),
            stable_variant: stable_variant.into(),
        }
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.channel, self.video, self.stable_variant)
    }
}

/// Named template rectangle where one line of text renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub key: String,
    #[serde(rename = "box")]
    pub rect: NormRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortraitInfo {
    /// Zoom pivot in box-relative units.
    #[serde(default = "default_portrait_anchor")]
    pub anchor: Point,
    pub destination: NormRect,
}

fn default_portrait_anchor() -> Point {
    Point::new(0.5, 1.0)
}

/// Per-selection inputs computed by the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditorContext {
    /// Computed default per override path.
    #[serde(default)]
    pub defaults: OverrideLeaf,
    /// Persisted overrides the session forks from.
    #[serde(default)]
    pub overrides: OverrideLeaf,
    #[serde(default)]
    pub slots: Vec<TemplateSlot>,
    #[serde(default)]
    pub portrait: Option<PortraitInfo>,
}

impl EditorContext {
    pub fn slot(&self, key: &str) -> Option<&TemplateSlot> {
        self.slots.iter().find(|slot| slot.key == key)
    }

    pub fn slot_keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.key.as_str())
    }
}

/// Reference to a composited image, as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewImage {
    pub url: String,
}

/// Everything the backend needs to persist one selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub selection: SelectionKey,
    pub overrides: OverrideLeaf,
    /// Present only when text specs changed since the last load or save.
    pub text_lines: Option<TextLineMap>,
}

impl SaveRequest {
    /// Nested override document for the save call.
    pub fn overrides_document(&self) -> Value {
        self.overrides.expand_nested()
    }
}

/// Input for a text-slot preview recomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    pub token: u64,
    pub selection: SelectionKey,
    pub overrides: Value,
    pub text_lines: TextLineMap,
}

pub trait ContextSource {
    fn load_context(&self, selection: &SelectionKey) -> BridgeResult<EditorContext>;
    fn load_text_lines(&self, selection: &SelectionKey) -> BridgeResult<TextLineMap>;
}

pub trait PersistenceBridge {
    fn save_overrides(&self, selection: &SelectionKey, overrides: &Value) -> BridgeResult<()>;
    fn save_text_lines(&self, selection: &SelectionKey, specs: &TextLineMap) -> BridgeResult<()>;
    fn rebuild(&self, selection: &SelectionKey) -> BridgeResult<PreviewImage>;
    fn render_preview(&self, request: &PreviewRequest) -> BridgeResult<PreviewImage>;
}

/// Runs the save calls in order: overrides, text specs (if any), then rebuild.
pub fn submit_save<B: PersistenceBridge + ?Sized>(
    bridge: &B,
    request: &SaveRequest,
) -> BridgeResult<PreviewImage> {
    bridge.save_overrides(&request.selection, &request.overrides_document())?;
    if let Some(text_lines) = &request.text_lines {
        bridge.save_text_lines(&request.selection, text_lines)?;
    }
    bridge.rebuild(&request.selection)
}

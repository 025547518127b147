//! Client-side orchestration layer for a documentation-site assistant widget.
//!
//! The widget lets a reader ask questions about page content. This crate
//! covers everything up to the wire: validated data model, request/response
//! sanitization, an API client with categorized errors and health monitoring,
//! text-selection capture, a persisted session store, and the controller
//! state machine that ties them together. The question-answering backend
//! itself is external.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod sanitize;
pub mod selection;
pub mod store;
pub mod widget;

pub use client::ApiClient;
pub use config::WidgetConfig;
pub use error::{Error, Result};
pub use model::{ApiRequest, ApiResponse, Message, MessageStatus, PageContext, Sender, Session};
pub use selection::{NoSelection, SelectionSource, TextSelectionObserver};
pub use store::SessionStore;
pub use widget::{WidgetController, WidgetState};

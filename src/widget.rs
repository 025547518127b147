use chrono::Utc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::config::WidgetConfig;
use crate::error::{Error, Result};
use crate::model::{
    ApiRequest, ApiResponse, Message, MessageStatus, PageContext, Sender, Session,
    MAX_SELECTED_TEXT, MAX_SESSION_MESSAGES,
};
use crate::sanitize::{sanitize_response, sanitize_selected_text, sanitize_user_input};
use crate::selection::MAX_CAPTURED_SELECTION;
use crate::store::SessionStore;

/// Answer phrasings that mark an assistant message as carrying no relevant
/// content for the query.
const NO_CONTENT_PHRASES: &[&str] = &[
    "no relevant content",
    "no information found",
    "not mentioned in the provided context",
    "no context provided",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetState {
    Hidden,
    Idle,
    Loading,
    Error(String),
}

/// Top-level orchestration: wires user input, selection capture, the API
/// client and the session store together.
///
/// Owns the active session exclusively. At most one query is in flight; the
/// `Loading` state rejects further submissions until the current one
/// resolves. The online flag maintained by the client gates submission but is
/// advisory only for requests already dispatched.
pub struct WidgetController {
    config: WidgetConfig,
    client: ApiClient,
    store: SessionStore,
    session: Session,
    page: PageContext,
    selected_text: String,
    state: WidgetState,
}

impl WidgetController {
    /// Mount the widget: restore the persisted session for this page, or
    /// start a fresh one. The client is injected, never a shared singleton.
    pub fn new(
        config: WidgetConfig,
        client: ApiClient,
        store: SessionStore,
        page: PageContext,
    ) -> Result<Self> {
        let session = store.load_or_create(&page.url)?;
        Ok(WidgetController {
            config,
            client,
            store,
            session,
            page,
            selected_text: String::new(),
            state: WidgetState::Hidden,
        })
    }

    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.client.is_online()
    }

    pub fn selected_text(&self) -> &str {
        &self.selected_text
    }

    /// Flip between hidden and visible. Reopening lands in `Idle`.
    pub fn toggle(&mut self) {
        self.state = match self.state {
            WidgetState::Hidden => WidgetState::Idle,
            _ => WidgetState::Hidden,
        };
    }

    pub fn start_connection_monitoring(&mut self, interval: Duration) {
        self.client.start_connection_monitoring(interval);
    }

    pub fn stop_connection_monitoring(&mut self) {
        self.client.stop_connection_monitoring();
    }

    pub async fn check_health(&self) -> bool {
        self.client.check_health().await
    }

    /// Record reader-highlighted text as context for the next query.
    ///
    /// Target of the selection observer callback. Ignored when selection
    /// capture is disabled; selections over the passive cap are dropped.
    pub fn capture_selection(&mut self, raw: &str) {
        if !self.config.enable_selected_text {
            return;
        }
        let text = sanitize_selected_text(raw);
        if text.is_empty() || text.chars().count() > MAX_CAPTURED_SELECTION {
            return;
        }
        self.selected_text = text;
    }

    pub fn clear_selection(&mut self) {
        self.selected_text.clear();
    }

    /// Submit a reader query.
    ///
    /// Rejections (hidden widget, in-flight query, offline backend, empty or
    /// oversized input) happen before any network call or session mutation.
    /// A failed backend call keeps the already-appended user message so the
    /// reader can retry.
    pub async fn submit(&mut self, raw_query: &str) -> Result<()> {
        match self.state {
            WidgetState::Hidden => {
                return Err(Error::Validation("Chat widget is not open".into()));
            }
            WidgetState::Loading => {
                return Err(Error::Validation("A query is already in progress".into()));
            }
            _ => {}
        }
        if !self.client.is_online() {
            return Err(Error::Validation(
                "The AI service is currently unavailable".into(),
            ));
        }

        let query = sanitize_user_input(raw_query);
        if query.is_empty() {
            return Err(Error::Validation("Query cannot be empty".into()));
        }
        if query.chars().count() > self.config.max_query_length {
            return Err(Error::Validation(format!(
                "Query exceeds maximum length of {} characters",
                self.config.max_query_length
            )));
        }

        self.state = WidgetState::Loading;
        let result = self.run_query(query).await;
        self.state = match &result {
            Ok(()) => WidgetState::Idle,
            Err(e) => WidgetState::Error(e.to_string()),
        };
        result
    }

    /// Configured history limit, never above the hard session cap.
    fn history_cap(&self) -> usize {
        self.config.max_history_size.min(MAX_SESSION_MESSAGES)
    }

    fn append_message(&mut self, message: Message) -> Result<()> {
        if self.session.messages().len() >= self.history_cap() {
            return Err(Error::SessionFull(self.history_cap()));
        }
        self.session.add_message(message)
    }

    async fn run_query(&mut self, query: String) -> Result<()> {
        let user_message = Message::new(
            format!("msg_user_{}", Uuid::new_v4()),
            query.clone(),
            Sender::User,
            Utc::now(),
        )?;
        self.append_message(user_message)?;
        self.store.save(&self.session);

        let selected = self.selection_for_request();
        let request = ApiRequest::new(query, selected, self.page.clone(), Utc::now())?;

        debug!("submitting query for page {}", self.page.url);
        let response = self.client.send_query(&request).await?;
        self.accept_response(response)
    }

    /// Selected text is re-sanitized and re-validated against the request cap
    /// before transmission; invalid selections are silently omitted.
    fn selection_for_request(&self) -> String {
        let text = sanitize_selected_text(&self.selected_text);
        if text.is_empty() || text.chars().count() > MAX_SELECTED_TEXT {
            return String::new();
        }
        text
    }

    fn accept_response(&mut self, response: ApiResponse) -> Result<()> {
        let clean = sanitize_response(&response);

        let lower = clean.answer.to_lowercase();
        let status = if NO_CONTENT_PHRASES.iter().any(|p| lower.contains(p)) {
            MessageStatus::NoContent
        } else {
            MessageStatus::Sent
        };

        let assistant_message = Message::new(
            format!("msg_assistant_{}", Uuid::new_v4()),
            clean.answer,
            Sender::Assistant,
            Utc::now(),
        )?
        .with_sources(clean.sources)?
        .with_status(status);

        self.append_message(assistant_message)?;
        self.store.save(&self.session);
        self.selected_text.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const PAGE: &str = "https://docs.example.com/ch1";

    fn controller_with(endpoint: &str) -> (tempfile::TempDir, WidgetController) {
        let dir = tempfile::tempdir().unwrap();
        let config = WidgetConfig {
            api_endpoint: endpoint.to_string(),
            ..WidgetConfig::default()
        };
        let client = ApiClient::from_config(&config);
        let store = SessionStore::open(dir.path().join("session.sqlite")).unwrap();
        let page = PageContext {
            url: PAGE.into(),
            title: "Chapter 1".into(),
        };
        let mut widget = WidgetController::new(config, client, store, page).unwrap();
        widget.toggle();
        (dir, widget)
    }

    async fn serve_once(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    async fn dead_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[test]
    fn toggle_flips_between_hidden_and_idle() {
        let (_dir, mut widget) = controller_with("http://localhost:8000");
        assert_eq!(*widget.state(), WidgetState::Idle);
        widget.toggle();
        assert_eq!(*widget.state(), WidgetState::Hidden);
        widget.toggle();
        assert_eq!(*widget.state(), WidgetState::Idle);
    }

    #[tokio::test]
    async fn oversized_query_rejected_without_network_call() {
        let (_dir, mut widget) = controller_with(&dead_endpoint().await);
        let long = "x".repeat(widget.config().max_query_length + 1);
        let err = widget.submit(&long).await.unwrap_err();
        assert!(err.to_string().contains("maximum length"));
        assert!(widget.session().messages().is_empty());
        // A network attempt against the dead endpoint would have gone offline.
        assert!(widget.is_online());
        assert_eq!(*widget.state(), WidgetState::Idle);
    }

    #[tokio::test]
    async fn empty_query_rejected() {
        let (_dir, mut widget) = controller_with(&dead_endpoint().await);
        assert!(widget.submit("   ").await.is_err());
        assert!(widget.session().messages().is_empty());
    }

    #[tokio::test]
    async fn submission_rejected_while_loading() {
        let (_dir, mut widget) = controller_with(&dead_endpoint().await);
        widget.state = WidgetState::Loading;
        let err = widget.submit("second question").await.unwrap_err();
        assert!(err.to_string().contains("already in progress"));
        assert!(widget.session().messages().is_empty());
    }

    #[tokio::test]
    async fn submission_rejected_while_hidden_or_offline() {
        let (_dir, mut widget) = controller_with(&dead_endpoint().await);
        widget.toggle();
        assert!(widget.submit("question").await.is_err());
        widget.toggle();
        widget.client.force_online(false);
        assert!(widget.submit("question").await.is_err());
        assert!(widget.session().messages().is_empty());
    }

    #[tokio::test]
    async fn successful_query_appends_both_messages() {
        let endpoint = serve_once(r#"{"answer":"It is covered in chapter 2.","sources":["ch2"]}"#).await;
        let (_dir, mut widget) = controller_with(&endpoint);
        widget.capture_selection("an interesting passage");
        widget.submit("where is this covered?").await.unwrap();

        let messages = widget.session().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert_eq!(messages[1].sources, vec!["ch2"]);
        assert_eq!(messages[1].status, MessageStatus::Sent);
        assert_eq!(*widget.state(), WidgetState::Idle);
        assert!(widget.selected_text().is_empty());
    }

    #[tokio::test]
    async fn no_content_answer_gets_no_content_status() {
        let endpoint =
            serve_once(r#"{"answer":"There is no relevant content for this question."}"#).await;
        let (_dir, mut widget) = controller_with(&endpoint);
        widget.submit("anything?").await.unwrap();
        assert_eq!(
            widget.session().last_message().unwrap().status,
            MessageStatus::NoContent
        );
    }

    #[tokio::test]
    async fn assistant_answer_is_sanitized_before_entering_session() {
        let endpoint =
            serve_once(r#"{"answer":"safe <script>alert(1)</script>text"}"#).await;
        let (_dir, mut widget) = controller_with(&endpoint);
        widget.submit("q").await.unwrap();
        let answer = &widget.session().last_message().unwrap().content;
        assert!(!answer.contains("<script"));
    }

    #[tokio::test]
    async fn failed_query_keeps_user_message_and_surfaces_error() {
        let (_dir, mut widget) = controller_with(&dead_endpoint().await);
        let err = widget.submit("will fail").await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable));

        let messages = widget.session().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::User);
        assert!(matches!(widget.state(), WidgetState::Error(_)));

        // The reader can retry from the error state.
        let endpoint = serve_once(r#"{"answer":"recovered"}"#).await;
        widget.client = ApiClient::new(endpoint, Duration::from_secs(2));
        widget.submit("will fail").await.unwrap();
        assert_eq!(widget.session().messages().len(), 3);
    }

    #[tokio::test]
    async fn configured_history_cap_blocks_further_queries() {
        let endpoint = serve_once(r#"{"answer":"ok"}"#).await;
        let (_dir, mut widget) = controller_with(&endpoint);
        widget.config.max_history_size = 2;
        widget.submit("first question").await.unwrap();
        assert_eq!(widget.session().messages().len(), 2);

        let err = widget.submit("second question").await.unwrap_err();
        assert!(matches!(err, Error::SessionFull(2)));
        assert_eq!(widget.session().messages().len(), 2);
    }

    #[tokio::test]
    async fn selection_capture_respects_toggle_and_cap() {
        let (_dir, mut widget) = controller_with(&dead_endpoint().await);
        widget.capture_selection(&"x".repeat(MAX_CAPTURED_SELECTION + 1));
        assert!(widget.selected_text().is_empty());

        widget.capture_selection("short passage");
        assert_eq!(widget.selected_text(), "short passage");

        widget.config.enable_selected_text = false;
        widget.clear_selection();
        widget.capture_selection("ignored");
        assert!(widget.selected_text().is_empty());
    }

    #[tokio::test]
    async fn session_persists_across_remount() {
        let endpoint = serve_once(r#"{"answer":"persisted"}"#).await;
        let dir = tempfile::tempdir().unwrap();
        let config = WidgetConfig {
            api_endpoint: endpoint,
            ..WidgetConfig::default()
        };
        let page = PageContext {
            url: PAGE.into(),
            title: "Chapter 1".into(),
        };

        let session_id = {
            let store = SessionStore::open(dir.path().join("session.sqlite")).unwrap();
            let client = ApiClient::from_config(&config);
            let mut widget =
                WidgetController::new(config.clone(), client, store, page.clone()).unwrap();
            widget.toggle();
            widget.submit("remember this").await.unwrap();
            widget.session().id.clone()
        };

        let store = SessionStore::open(dir.path().join("session.sqlite")).unwrap();
        let client = ApiClient::from_config(&config);
        let widget = WidgetController::new(config, client, store, page).unwrap();
        assert_eq!(widget.session().id, session_id);
        assert_eq!(widget.session().messages().len(), 2);
    }
}

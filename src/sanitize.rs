use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::ApiResponse;

// Elements stripped wholesale, content included.
static DANGEROUS_ELEMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script>|<iframe\b.*?</iframe>|<object\b.*?</object>|<embed\b.*?</embed>",
    )
    .expect("invalid element regex")
});

static EVENT_HANDLER_ATTRS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s*on\w+\s*=\s*("[^"]*"|'[^']*')"#).expect("invalid handler regex")
});

static JAVASCRIPT_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(href|src)\s*=\s*["']\s*javascript:"#).expect("invalid uri regex")
});

static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(href|src)\s*=\s*["']\s*data:"#).expect("invalid uri regex")
});

static SCRIPT_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<script").expect("invalid regex"));

static JAVASCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript:").expect("invalid regex"));

static BARE_EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)on\w+\s*=").expect("invalid regex"));

/// Sanitize markup-bearing content before it is rendered.
///
/// Removes `<script>`, `<iframe>`, `<object>` and `<embed>` elements including
/// their content, strips inline `on*` event-handler attributes, and neutralizes
/// `javascript:`/`data:` URIs in `href`/`src` attributes. Idempotent.
///
/// Removing a fragment can splice its surroundings into new dangerous markup
/// (`<scr<script>...</script>ipt>`), so the replacements repeat until the
/// output stops changing. Every changing pass shrinks the string, so the loop
/// terminates.
pub fn sanitize_content(content: &str) -> String {
    let mut cleaned = content.to_string();
    loop {
        let pass = DANGEROUS_ELEMENTS.replace_all(&cleaned, "");
        let pass = EVENT_HANDLER_ATTRS.replace_all(&pass, "");
        let pass = JAVASCRIPT_URI.replace_all(&pass, r##"${1}="#""##);
        let pass = DATA_URI.replace_all(&pass, r##"${1}="#""##).into_owned();
        if pass == cleaned {
            return cleaned;
        }
        cleaned = pass;
    }
}

/// Sanitize free-form user input before transmission.
///
/// Escapes `<script` openings and `javascript:` schemes and strips event
/// handler fragments, then trims. Idempotent: stripping a handler fragment can
/// splice its surroundings into a new one, so the replacements repeat until
/// the output stops changing.
pub fn sanitize_user_input(input: &str) -> String {
    let mut cleaned = input.to_string();
    loop {
        let pass = SCRIPT_OPEN.replace_all(&cleaned, "&lt;script");
        let pass = JAVASCRIPT_SCHEME.replace_all(&pass, "javascript&#58;");
        let pass = BARE_EVENT_HANDLER.replace_all(&pass, "").into_owned();
        if pass == cleaned {
            return cleaned.trim().to_string();
        }
        cleaned = pass;
    }
}

/// Sanitize reader-selected page text before it is used as query context.
pub fn sanitize_selected_text(text: &str) -> String {
    sanitize_user_input(text)
}

/// Sanitize every text field of a backend response before it enters the
/// session: answer, each source, each retrieved-context entry and each
/// follow-up question.
pub fn sanitize_response(response: &ApiResponse) -> ApiResponse {
    ApiResponse {
        answer: sanitize_content(&response.answer),
        sources: response.sources.iter().map(|s| sanitize_content(s)).collect(),
        confidence: response.confidence,
        retrieved_context: response
            .retrieved_context
            .iter()
            .map(|c| sanitize_content(c))
            .collect(),
        followup_questions: response
            .followup_questions
            .iter()
            .map(|q| sanitize_content(q))
            .collect(),
        timestamp: response.timestamp,
    }
}

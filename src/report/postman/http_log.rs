//! HTTP log rendering for failed scenarios.
//!
//! Generates a standalone HTML snippet embedding the request and response
//! of one Newman execution. Only scenarios with at least one failure get a
//! log; passing traffic is not worth the storage.

use super::parse::{ExecRequest, ExecResponse, Header, NewmanExecution};

/// Bodies longer than this are cut before embedding.
const MAX_BODY_CHARS: usize = 10_000;

/// Renders the HTML log of one execution.
pub fn render_http_log(execution: &NewmanExecution) -> String {
    let mut html = String::from("<div class=\"http-log\">\n");

    match &execution.request {
        Some(request) => html.push_str(&render_request(request)),
        None => html.push_str("<p>No request was recorded.</p>\n"),
    }

    match &execution.response {
        Some(response) => html.push_str(&render_response(response)),
        None => html.push_str("<p>No response was recorded.</p>\n"),
    }

    html.push_str("</div>\n");
    html
}

fn render_request(request: &ExecRequest) -> String {
    let url = request
        .url
        .as_ref()
        .map(|u| u.display())
        .unwrap_or_default();

    let mut html = format!(
        "<h3>Request</h3>\n<p><code>{} {}</code></p>\n",
        escape(&request.method),
        escape(&url)
    );
    html.push_str(&render_headers(&request.header));

    if let Some(body) = request.body.as_ref().and_then(|b| b.raw.as_deref()) {
        html.push_str(&format!("<pre>{}</pre>\n", escape(&truncate(body))));
    }

    html
}

fn render_response(response: &ExecResponse) -> String {
    let mut html = format!(
        "<h3>Response</h3>\n<p><code>{} {}</code></p>\n",
        response.code.map(|c| c.to_string()).unwrap_or_default(),
        escape(&response.status)
    );
    html.push_str(&render_headers(&response.header));

    match &response.body {
        None => html.push_str("<p>Empty body.</p>\n"),
        Some(spill) => match spill.read() {
            // A body file that vanished or is unreadable is rendered
            // inline instead of aborting the scenario's processing
            Err(e) => html.push_str(&format!(
                "<p class=\"error\">Could not read response body: {}</p>\n",
                escape(&e.to_string())
            )),
            Ok(bytes) => html.push_str(&render_body(&bytes)),
        },
    }

    html
}

fn render_headers(headers: &[Header]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let rows: Vec<String> = headers
        .iter()
        .map(|h| format!("{}: {}", escape(&h.key), escape(&h.value)))
        .collect();
    format!("<pre class=\"headers\">{}</pre>\n", rows.join("\n"))
}

/// JSON bodies are pretty-printed; anything else is escaped and truncated.
fn render_body(bytes: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            return format!("<pre class=\"body\">{}</pre>\n", escape(&truncate(&pretty)));
        }
    }

    let text = String::from_utf8_lossy(bytes);
    format!("<pre class=\"body\">{}</pre>\n", escape(&truncate(&text)))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_BODY_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_BODY_CHARS).collect();
    format!("{cut}\n… truncated")
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(json: &str) -> NewmanExecution {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_renders_request_and_response_sections() {
        let execution = execution(
            r#"{"item": {"id": "a"},
                "request": {"method": "GET", "url": {"raw": "https://api.example.com/x"},
                            "header": [{"key": "Accept", "value": "application/json"}]},
                "response": {"code": 404, "status": "Not Found",
                             "header": [{"key": "Content-Type", "value": "text/plain"}]}}"#,
        );

        let html = render_http_log(&execution);

        assert!(html.contains("<h3>Request</h3>"));
        assert!(html.contains("GET https://api.example.com/x"));
        assert!(html.contains("Accept: application/json"));
        assert!(html.contains("<h3>Response</h3>"));
        assert!(html.contains("404 Not Found"));
        assert!(html.contains("Empty body."));
    }

    #[test]
    fn test_json_body_is_pretty_printed() {
        let execution = execution(
            r#"{"response": {"code": 200, "status": "OK",
                             "stream": {"data": [123, 34, 97, 34, 58, 49, 125]}}}"#,
        );

        let html = render_http_log(&execution);

        // {"a":1} pretty-printed spans multiple lines
        assert!(html.contains("&quot;a&quot;: 1"));
    }

    #[test]
    fn test_text_body_is_escaped() {
        let execution = execution(
            r#"{"response": {"code": 200, "status": "OK", "stream": {"data": [60, 104, 105, 62]}}}"#,
        );

        let html = render_http_log(&execution);
        assert!(html.contains("&lt;hi&gt;"));
    }

    #[test]
    fn test_unreadable_body_renders_inline_error() {
        let execution = execution(
            r#"{"response": {"code": 200, "status": "OK", "stream": {"data": [104, 105]}}}"#,
        );

        // Delete the spill file behind the renderer's back
        let path = execution
            .response
            .as_ref()
            .unwrap()
            .body
            .as_ref()
            .unwrap()
            .path()
            .to_path_buf();
        std::fs::remove_file(&path).unwrap();

        let html = render_http_log(&execution);
        assert!(html.contains("Could not read response body"));
    }

    #[test]
    fn test_escape_handles_markup() {
        assert_eq!(escape("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }
}

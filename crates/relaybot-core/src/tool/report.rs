use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use crate::error::ToolError;
use crate::util::{escape_html, http, safe_filename};

use super::{param_str, Action, BinaryOutput, Params, Tool, ToolOutcome};

const TIMEOUT: Duration = Duration::from_secs(60);
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Render a titled report to PDF through a headless-Chromium HTTP renderer.
pub struct GenerateReportTool {
    renderer_url: String,
}

impl GenerateReportTool {
    pub fn new(renderer_url: &str) -> Self {
        Self {
            renderer_url: renderer_url.trim_end_matches('/').to_string(),
        }
    }

    async fn render(&self, html: String) -> Result<Vec<u8>, ToolError> {
        let part = Part::bytes(html.into_bytes())
            .file_name("index.html")
            .mime_str("text/html")?;
        let form = Form::new().part("files", part);

        let url = format!("{}/forms/chromium/convert/html", self.renderer_url);
        let resp = http::client()
            .post(&url)
            .multipart(form)
            .timeout(TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolError::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let bytes = resp.bytes().await?.to_vec();
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(ToolError::Parse("renderer did not return a PDF".to_string()));
        }
        Ok(bytes)
    }
}

/// Standalone HTML page for a report. Blank lines separate paragraphs.
pub fn render_html(title: &str, content: &str, generated_at: &str) -> String {
    let paragraphs: String = content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>\n", escape_html(p).replace('\n', "<br>")))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: "Noto Sans CJK SC", "PingFang SC", Arial, sans-serif; margin: 40px; line-height: 1.6; color: #222; }}
h1 {{ border-bottom: 2px solid #1677ff; padding-bottom: 8px; }}
.meta {{ color: #888; font-size: 12px; }}
</style>
</head>
<body>
<h1>{title}</h1>
<div class="meta">Generated {generated_at}</div>
{paragraphs}</body>
</html>
"#,
        title = escape_html(title),
    )
}

#[async_trait]
impl Tool for GenerateReportTool {
    fn action(&self) -> Action {
        Action::GenerateReport
    }

    fn description(&self) -> &str {
        "Generate a PDF report from a title and text content"
    }

    fn parameters(&self) -> Value {
        json!({"title": "Weekly sales summary", "content": "Revenue grew 12% ..."})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let title = param_str(params, "title");
        let content = param_str(params, "content");
        if title.is_empty() || content.is_empty() {
            return ToolOutcome::Binary(BinaryOutput::failed(
                "Error: title and content are required to generate a report",
            ));
        }
        if self.renderer_url.is_empty() {
            return ToolOutcome::Binary(BinaryOutput::failed(format!(
                "Error: {}",
                ToolError::NotConfigured("PDF renderer (REPORT_RENDERER_URL)".to_string())
            )));
        }

        let now = chrono::Local::now();
        let html = render_html(&title, &content, &now.format("%Y-%m-%d %H:%M").to_string());
        match self.render(html).await {
            Ok(pdf) => {
                let file_name = format!("{}_{}.pdf", safe_filename(&title), now.format("%Y%m%d%H%M%S"));
                info!("Rendered report {} ({} bytes)", file_name, pdf.len());
                ToolOutcome::Binary(BinaryOutput::ok(
                    format!("Report '{title}' generated ({} KB)", pdf.len().div_ceil(1024)),
                    file_name,
                    pdf,
                ))
            }
            Err(e) => ToolOutcome::Binary(BinaryOutput::failed(format!(
                "Error: failed to generate report: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(title: &str, content: &str) -> Params {
        serde_json::from_value(json!({"title": title, "content": content})).unwrap()
    }

    #[test]
    fn test_render_html_escapes() {
        let html = render_html("Q1 <draft>", "Line one\nline two\n\nSecond & last", "2025-03-01 10:00");
        assert!(html.contains("<h1>Q1 &lt;draft&gt;</h1>"));
        assert!(html.contains("<p>Line one<br>line two</p>"));
        assert!(html.contains("<p>Second &amp; last</p>"));
        assert!(html.contains("Generated 2025-03-01 10:00"));
    }

    #[tokio::test]
    async fn test_missing_renderer() {
        let out = GenerateReportTool::new("").execute(&params("T", "C")).await;
        match out {
            ToolOutcome::Binary(b) => {
                assert!(!b.success);
                assert!(b.payload.is_none());
                assert!(b.message.contains("REPORT_RENDERER_URL"));
            }
            other => panic!("expected binary outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_renders_pdf() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/forms/chromium/convert/html")
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(b"%PDF-1.7\n...")
            .create_async()
            .await;

        let out = GenerateReportTool::new(&server.url())
            .execute(&params("Sales: Q1", "All good"))
            .await;
        let ToolOutcome::Binary(b) = out else {
            panic!("expected binary outcome");
        };
        assert!(b.success, "{}", b.message);
        assert!(b.file_name.starts_with("Sales_ Q1_"));
        assert!(b.file_name.ends_with(".pdf"));
        assert_eq!(b.payload.as_deref(), Some(&b"%PDF-1.7\n..."[..]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_pdf_body_fails() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/forms/chromium/convert/html")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let out = GenerateReportTool::new(&server.url())
            .execute(&params("T", "C"))
            .await;
        assert!(out.is_error());
        assert!(out.text().contains("did not return a PDF"));
    }
}

//! Upload target autodetection from the device's root page.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::{DEFAULT_UPLOAD_FIELD, DEFAULT_UPLOAD_PATH};

static FORM_ACTION: OnceLock<Regex> = OnceLock::new();
static FILE_INPUT: OnceLock<Regex> = OnceLock::new();

/// Where and under which field name the firmware is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadForm {
    /// Path relative to the device base, always starting with `/`.
    pub path: String,
    pub field: String,
}

impl Default for UploadForm {
    fn default() -> Self {
        Self {
            path: DEFAULT_UPLOAD_PATH.to_string(),
            field: DEFAULT_UPLOAD_FIELD.to_string(),
        }
    }
}

/// Scrape `<form action=...>` and `<input type="file" name=...>` from `html`.
/// Whatever is missing falls back to the conventional path and field.
pub fn detect_upload_form(html: &str) -> UploadForm {
    let action = FORM_ACTION.get_or_init(|| {
        Regex::new(r#"(?i)<form[^>]*action\s*=\s*["']([^"']+)["']"#).expect("static pattern")
    });
    let input = FILE_INPUT.get_or_init(|| {
        Regex::new(r#"(?i)<input[^>]*type\s*=\s*["']file["'][^>]*name\s*=\s*["']([^"']+)["']"#)
            .expect("static pattern")
    });

    let mut form = UploadForm::default();

    if let Some(caps) = action.captures(html) {
        let path = caps[1].trim();
        if !path.is_empty() {
            form.path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
        }
    }

    if let Some(caps) = input.captures(html) {
        let field = caps[1].trim();
        if !field.is_empty() {
            form.field = field.to_string();
        }
    }

    form
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_action_and_field() {
        let html = r#"<html><body>
            <FORM method='POST' action='/firmware/upload' enctype='multipart/form-data'>
              <input type="file" name="fw" accept=".bin">
              <input type="submit" value="Update">
            </FORM></body></html>"#;

        let form = detect_upload_form(html);
        assert_eq!(form.path, "/firmware/upload");
        assert_eq!(form.field, "fw");
    }

    #[test]
    fn test_relative_action_gets_leading_slash() {
        let form = detect_upload_form(r#"<form action="update"><input type='file' name='upload'></form>"#);
        assert_eq!(form.path, "/update");
        assert_eq!(form.field, "upload");
    }

    #[test]
    fn test_defaults_when_page_has_no_form() {
        assert_eq!(detect_upload_form("<h1>ExpressLRS</h1>"), UploadForm::default());
        assert_eq!(detect_upload_form(""), UploadForm::default());
    }

    #[test]
    fn test_ignores_non_file_inputs() {
        let form = detect_upload_form(r#"<form action="/update"><input type="text" name="ssid"></form>"#);
        assert_eq!(form.field, DEFAULT_UPLOAD_FIELD);
    }
}

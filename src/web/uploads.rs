use std::{collections::HashMap, path::Path};

use axum::extract::Multipart;

use crate::models::LocalFile;

/// Result type used by the shared upload helpers.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when validating uploaded form data.
#[derive(Debug)]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UploadError {}

/// Configuration describing the expectations for a single multipart file field.
#[derive(Debug, Clone, Copy)]
pub struct FileFieldConfig<'a> {
    pub field_name: &'a str,
    /// Required prefix of the part's content type, e.g. `image/`.
    pub content_type_prefix: &'a str,
    pub allowed_extensions: &'a [&'a str],
    pub max_files: usize,
}

impl<'a> FileFieldConfig<'a> {
    pub fn new(
        field_name: &'a str,
        content_type_prefix: &'a str,
        allowed_extensions: &'a [&'a str],
        max_files: usize,
    ) -> Self {
        Self {
            field_name,
            content_type_prefix,
            allowed_extensions,
            max_files,
        }
    }

    fn check(&self, file_name: &str, content_type: &str, count: usize) -> UploadResult<()> {
        if count >= self.max_files {
            return Err(UploadError::new(format!(
                "画像は最大 {} 枚までです",
                self.max_files
            )));
        }
        if !content_type.starts_with(self.content_type_prefix) {
            return Err(UploadError::new(format!(
                "`{file_name}` は画像ファイルではありません"
            )));
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !self.allowed_extensions.is_empty()
            && !self.allowed_extensions.contains(&extension.as_str())
        {
            return Err(UploadError::new(format!(
                "`{file_name}` の形式には対応していません"
            )));
        }
        Ok(())
    }
}

/// Text fields and files of a submitted form, in submission order.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub files: Vec<LocalFile>,
    pub text_fields: HashMap<String, Vec<String>>,
}

impl UploadOutcome {
    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        self.text_fields
            .get(field_name)
            .and_then(|values| values.first().map(|s| s.as_str()))
    }
}

/// Reads a multipart form into `outcome`. File parts keep the order in which
/// the browser sent them; empty file inputs are skipped.
///
/// A rejected file does not stop the read: the remaining text fields are still
/// collected so the form can be shown again with what the user typed. The first
/// rejection is returned once the body has been consumed.
pub async fn read_upload_form(
    mut multipart: Multipart,
    config: FileFieldConfig<'_>,
    outcome: &mut UploadOutcome,
) -> UploadResult<()> {
    let mut rejection: Option<UploadError> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::new(format!("フォームの読み込みに失敗しました: {err}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        let Some(raw_name) = field.file_name().map(str::to_string) else {
            let value = field
                .text()
                .await
                .map_err(|err| UploadError::new(format!("`{field_name}` の読み込みに失敗しました: {err}")))?;
            outcome.text_fields.entry(field_name).or_default().push(value);
            continue;
        };

        if rejection.is_some() {
            continue;
        }
        if field_name != config.field_name {
            rejection = Some(UploadError::new(format!(
                "対応していないファイル項目です: `{field_name}`"
            )));
            continue;
        }

        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|err| UploadError::new(format!("画像の読み込みに失敗しました: {err}")))?;

        if raw_name.is_empty() && bytes.is_empty() {
            continue;
        }

        let file_name = stored_file_name(&raw_name, outcome.files.len());
        if let Err(err) = config.check(&file_name, &content_type, outcome.files.len()) {
            rejection = Some(err);
            continue;
        }
        outcome
            .files
            .push(LocalFile::new(file_name, content_type, bytes.to_vec()));
    }

    match rejection {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn stored_file_name(raw_name: &str, index: usize) -> String {
    let sanitized = sanitize_filename::sanitize(raw_name);
    if sanitized.is_empty() {
        format!("file_{index}")
    } else {
        sanitized
    }
}


#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::FromRequest,
        http::{Request, header},
    };

    use super::test_support::{self, Part, empty_file_input, image};
    use super::*;

    async fn read(
        parts: &[Part<'_>],
        config: FileFieldConfig<'_>,
    ) -> (UploadOutcome, UploadResult<()>) {
        let request = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, test_support::content_type())
            .body(Body::from(test_support::body(parts)))
            .unwrap();
        let multipart = Multipart::from_request(request, &()).await.unwrap();

        let mut outcome = UploadOutcome::default();
        let result = read_upload_form(multipart, config, &mut outcome).await;
        (outcome, result)
    }

    fn names(outcome: &UploadOutcome) -> Vec<&str> {
        outcome.files.iter().map(|file| file.file_name.as_str()).collect()
    }

    const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg"];

    fn config() -> FileFieldConfig<'static> {
        FileFieldConfig::new("images", "image/", IMAGE_EXTENSIONS, 2)
    }

    #[test]
    fn accepts_allowed_image() {
        assert!(config().check("graph.PNG", "image/png", 0).is_ok());
    }

    #[test]
    fn rejects_non_image_content() {
        let err = config().check("notes.png", "text/plain", 0).unwrap_err();
        assert!(err.message().contains("画像ファイルではありません"));
    }

    #[test]
    fn rejects_unlisted_extension_and_excess_files() {
        assert!(config().check("anim.gif", "image/gif", 0).is_err());
        let err = config().check("third.png", "image/png", 2).unwrap_err();
        assert_eq!(err.message(), "画像は最大 2 枚までです");
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(stored_file_name("../../etc/passwd.png", 0), "....etcpasswd.png");
        assert_eq!(stored_file_name("///", 3), "file_3");
    }

    #[tokio::test]
    async fn files_keep_browser_order_and_empty_inputs_are_skipped() {
        let (outcome, result) = read(
            &[
                Part::Text("title", "Quadratic formula"),
                image("c.png"),
                empty_file_input(),
                image("a.png"),
                image("b.png"),
                Part::Text("category", "algebra"),
            ],
            FileFieldConfig::new("images", "image/", IMAGE_EXTENSIONS, 5),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(names(&outcome), ["c.png", "a.png", "b.png"]);
        assert_eq!(outcome.files[0].content_type, "image/png");
        assert_eq!(outcome.first_text("title"), Some("Quadratic formula"));
        assert_eq!(outcome.first_text("category"), Some("algebra"));
    }

    #[tokio::test]
    async fn file_cap_is_enforced_and_text_is_kept() {
        let (outcome, result) = read(
            &[
                image("1.png"),
                image("2.png"),
                image("3.png"),
                Part::Text("title", "kept"),
            ],
            config(),
        )
        .await;

        assert_eq!(result.unwrap_err().message(), "画像は最大 2 枚までです");
        assert_eq!(names(&outcome), ["1.png", "2.png"]);
        assert_eq!(outcome.first_text("title"), Some("kept"));
    }

    #[tokio::test]
    async fn stray_file_field_is_rejected() {
        let (outcome, result) = read(
            &[
                Part::Text("content", "body text"),
                Part::File {
                    field: "attachment",
                    file_name: "notes.png",
                    content_type: "image/png",
                    bytes: b"x",
                },
            ],
            config(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.message().contains("`attachment`"));
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.first_text("content"), Some("body text"));
    }
}

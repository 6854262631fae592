//! `/questions/new`: the form for asking a question with optional images.

use std::borrow::Cow;

use axum::{
    Router,
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    models::{Category, Difficulty, SessionIdentity},
    submission::{SubmissionDraft, SubmissionState, SubmissionWorkflow},
    web::{
        AppState, FileFieldConfig, NavLink, PageLayout, UploadOutcome, auth, escape_html,
        read_upload_form, render_flash, render_page,
    },
};

const IMAGE_FIELD: &str = "images";
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];
const MAX_IMAGES: usize = 10;

const QUESTION_STYLES: &str = r#"
        .question-form h1 { margin: 0 0 1.5rem; font-size: 1.6rem; }
        .question-form label { display: block; font-weight: 600; margin: 1.25rem 0 0.5rem; }
        .question-form input[type="text"], .question-form textarea, .question-form select { width: 100%; box-sizing: border-box; padding: 0.75rem; border-radius: 10px; border: 1px solid #cbd5f5; font-size: 1rem; font-family: inherit; }
        .question-form textarea { min-height: 12rem; resize: vertical; }
        .question-form .row { display: grid; gap: 1rem; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); }
        .question-form .hint { margin: 0.35rem 0 0; font-size: 0.85rem; color: #64748b; }
        .question-form .previews { display: grid; gap: 1rem; grid-template-columns: repeat(auto-fill, minmax(160px, 1fr)); margin-top: 1rem; }
        .question-form .preview { position: relative; }
        .question-form .preview img { width: 100%; height: 120px; object-fit: cover; border-radius: 10px; border: 1px solid #e2e8f0; }
        .question-form .preview-remove { position: absolute; top: 0.4rem; right: 0.4rem; width: 1.6rem; height: 1.6rem; border: none; border-radius: 999px; background: #ef4444; color: #ffffff; font-weight: 700; cursor: pointer; }
        .question-form button[type="submit"] { margin-top: 2rem; width: 100%; padding: 0.95rem; border: none; border-radius: 999px; background: #2563eb; color: #ffffff; font-weight: 700; font-size: 1rem; cursor: pointer; }
        .question-form button[type="submit"]:hover { background: #1d4ed8; }
        .question-form button[type="submit"]:disabled { background: #94a3b8; cursor: wait; }
"#;

/// Image previews with per-image removal, and a submit button that locks
/// while the post is in flight.
const QUESTION_FORM_SCRIPT: &str = r#"<script>
(function() {
    const form = document.getElementById('question-form');
    if (!form) {
        return;
    }
    const input = form.querySelector('[data-image-input]');
    const previews = form.querySelector('[data-previews]');
    const button = form.querySelector('[data-submit-button]');
    const idleLabel = button.textContent;
    const maxFiles = parseInt(previews.dataset.maxFiles || '0', 10);
    let objectUrls = [];

    function setFiles(files) {
        const dt = new DataTransfer();
        files.forEach(file => dt.items.add(file));
        input.files = dt.files;
        renderPreviews();
    }

    function removeAt(index) {
        const current = Array.from(input.files);
        current.splice(index, 1);
        setFiles(current);
    }

    function renderPreviews() {
        objectUrls.forEach(url => URL.revokeObjectURL(url));
        objectUrls = Array.from(input.files).map(file => URL.createObjectURL(file));
        previews.innerHTML = '';
        objectUrls.forEach((url, index) => {
            const item = document.createElement('div');
            item.className = 'preview';
            const img = document.createElement('img');
            img.src = url;
            img.alt = `Preview ${index + 1}`;
            const remove = document.createElement('button');
            remove.type = 'button';
            remove.className = 'preview-remove';
            remove.textContent = '×';
            remove.addEventListener('click', () => removeAt(index));
            item.append(img, remove);
            previews.append(item);
        });
    }

    input.addEventListener('change', () => {
        if (maxFiles > 0 && input.files.length > maxFiles) {
            setFiles(Array.from(input.files).slice(0, maxFiles));
            return;
        }
        renderPreviews();
    });

    form.addEventListener('submit', () => {
        button.disabled = true;
        button.textContent = '投稿中...';
    });

    window.addEventListener('pageshow', () => {
        button.disabled = false;
        button.textContent = idleLabel;
    });
})();
</script>"#;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/questions/new",
        get(new_question_page).post(submit_question),
    )
}

/// Values echoed back into the form when a submission fails.
#[derive(Debug, Default)]
struct QuestionForm {
    title: String,
    body: String,
    difficulty: Difficulty,
    category: Category,
}

impl QuestionForm {
    fn from_upload(outcome: &UploadOutcome) -> Self {
        let field = |name: &str| outcome.first_text(name).unwrap_or_default().to_string();
        Self {
            title: field("title"),
            body: field("content"),
            difficulty: outcome
                .first_text("difficulty")
                .and_then(|value| value.parse().ok())
                .unwrap_or_default(),
            category: outcome
                .first_text("category")
                .and_then(|value| value.parse().ok())
                .unwrap_or_default(),
        }
    }
}

async fn new_question_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, Redirect> {
    let user = auth::require_identity_redirect(&state, &jar).await?;
    Ok(Html(render_question_page(
        &user,
        &QuestionForm::default(),
        None,
    )))
}

async fn submit_question(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Response {
    let user = match auth::require_identity_redirect(&state, &jar).await {
        Ok(user) => user,
        Err(redirect) => return redirect.into_response(),
    };

    let upload_config = FileFieldConfig::new(IMAGE_FIELD, "image/", IMAGE_EXTENSIONS, MAX_IMAGES);
    let mut outcome = UploadOutcome::default();
    let read = read_upload_form(multipart, upload_config, &mut outcome).await;
    let form = QuestionForm::from_upload(&outcome);
    if let Err(err) = read {
        warn!(error = %err, "rejected question form");
        return form_error(&user, &form, err.message());
    }

    let draft = SubmissionDraft {
        title: form.title.clone(),
        body: form.body.clone(),
        difficulty: form.difficulty,
        category: form.category,
        files: outcome.files,
    };

    // The attempt runs on its own task; if the client goes away the guard
    // fires and the attempt stops at its next gateway call.
    let cancel = CancellationToken::new();
    let _abandon_on_drop = cancel.clone().drop_guard();
    let session = state.session(auth::access_token(&jar));
    let attempt = tokio::spawn(async move {
        let mut workflow =
            SubmissionWorkflow::new(&session, &session, &session).with_cancellation(cancel);
        workflow.submit(draft).await;
        let finished = workflow.state().clone();
        if matches!(finished, SubmissionState::Failed(_)) {
            for asset in workflow.uploaded() {
                warn!(key = %asset.key, url = %asset.public_url, "orphaned question image");
            }
        }
        debug!(steps = workflow.history().len(), "submission attempt finished");
        finished
    });

    match attempt.await {
        Ok(SubmissionState::Succeeded(id)) => {
            info!(record_id = %id, user = %user.id, "question created");
            Redirect::to("/dashboard?status=posted").into_response()
        }
        Ok(SubmissionState::Failed(failure)) => {
            warn!(
                stage = %failure.stage,
                kind = ?failure.kind,
                reason = %failure.reason,
                "question submission failed"
            );
            form_error(&user, &form, &failure.user_message())
        }
        Ok(other) => {
            warn!(state = ?other, "question submission ended without a result");
            form_error(&user, &form, "投稿が中断されました")
        }
        Err(err) => {
            error!(?err, "question submission task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render_question_page(
                    &user,
                    &form,
                    Some("投稿に失敗しました。時間をおいて再度お試しください"),
                )),
            )
                .into_response()
        }
    }
}

fn form_error(user: &SessionIdentity, form: &QuestionForm, message: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Html(render_question_page(user, form, Some(message))),
    )
        .into_response()
}

fn render_question_page(
    user: &SessionIdentity,
    form: &QuestionForm,
    error_message: Option<&str>,
) -> String {
    let difficulty_options = Difficulty::ALL
        .iter()
        .map(|difficulty| {
            option_html(
                difficulty.as_str(),
                difficulty.label_ja(),
                *difficulty == form.difficulty,
            )
        })
        .collect::<String>();
    let category_options = Category::ALL
        .iter()
        .map(|category| {
            option_html(
                category.as_str(),
                category.label_ja(),
                *category == form.category,
            )
        })
        .collect::<String>();
    let author = user.display_name.as_deref().unwrap_or("匿名ユーザー");

    let body = format!(
        r#"<section class="panel question-form">
            <h1>質問を投稿する</h1>
            <p class="hint">投稿者: {author}</p>
            <form id="question-form" method="post" action="/questions/new" enctype="multipart/form-data">
                <label for="title">タイトル</label>
                <input type="text" id="title" name="title" value="{title}" placeholder="例: 二次方程式の解の公式について" required>
                <label for="content">質問内容</label>
                <textarea id="content" name="content" placeholder="分からないところを詳しく書いてください" required>{content}</textarea>
                <div class="row">
                    <div>
                        <label for="difficulty">難易度</label>
                        <select id="difficulty" name="difficulty">{difficulty_options}</select>
                    </div>
                    <div>
                        <label for="category">カテゴリー</label>
                        <select id="category" name="category">{category_options}</select>
                    </div>
                </div>
                <label for="images">画像</label>
                <input type="file" id="images" name="{field}" accept="image/*" multiple data-image-input>
                <p class="hint">最大 {max} 枚まで添付できます。選択した順に表示されます。</p>
                <div class="previews" data-previews data-max-files="{max}"></div>
                <button type="submit" data-submit-button>質問を投稿する</button>
            </form>
        </section>
        {script}"#,
        author = escape_html(author),
        title = escape_html(&form.title),
        content = escape_html(&form.body),
        field = IMAGE_FIELD,
        max = MAX_IMAGES,
        script = QUESTION_FORM_SCRIPT,
    );

    render_page(PageLayout {
        title: "質問する | JoyMath",
        nav: vec![NavLink {
            href: "/dashboard",
            label: "ダッシュボード",
        }],
        signed_in: true,
        flash_html: Cow::Owned(render_flash("error", error_message)),
        body_html: Cow::Owned(body),
        extra_styles: Some(QUESTION_STYLES),
    })
}

fn option_html(value: &str, label: &str, selected: bool) -> String {
    format!(
        r#"<option value="{value}"{selected}>{label}</option>"#,
        selected = if selected { " selected" } else { "" },
        label = escape_html(label),
    )
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use axum::{
        Json,
        body::Bytes,
        http::Uri,
        routing::{get, post},
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        config::{AppConfig, MediaConfig},
        supabase::test_server,
        web::{
            router::build_router,
            uploads::test_support::{self, Part},
        },
    };

    /// Bodies of storage uploads in arrival order, keyed by request path.
    type Uploads = Arc<Mutex<Vec<(String, Vec<u8>)>>>;
    type Inserts = Arc<Mutex<Vec<Value>>>;

    /// Supabase stand-in: a signed-in user, accepting storage and a record
    /// store that answers with `insert_status`.
    fn backend(uploads: Uploads, inserts: Inserts, insert_status: StatusCode) -> Router {
        Router::new()
            .route(
                "/auth/v1/user",
                get(|| async {
                    Json(json!({
                        "id": "user-123",
                        "user_metadata": { "full_name": "Ada" }
                    }))
                }),
            )
            .route(
                "/storage/v1/object/*key",
                post(move |uri: Uri, body: Bytes| {
                    let uploads = uploads.clone();
                    async move {
                        uploads
                            .lock()
                            .unwrap()
                            .push((uri.path().to_string(), body.to_vec()));
                        Json(json!({ "Key": uri.path() }))
                    }
                }),
            )
            .route(
                "/rest/v1/problems",
                post(move |Json(body): Json<Value>| {
                    let inserts = inserts.clone();
                    async move {
                        inserts.lock().unwrap().push(body);
                        if insert_status.is_success() {
                            (insert_status, Json(json!([{ "id": 42 }])))
                        } else {
                            (insert_status, Json(json!({ "message": "database unavailable" })))
                        }
                    }
                }),
            )
    }

    async fn app(backend: Router) -> SocketAddr {
        let supabase = test_server::serve(backend).await;
        let state = AppState::new(AppConfig {
            port: 0,
            site_url: "http://localhost:8080".into(),
            max_upload_bytes: 1024 * 1024,
            supabase: test_server::config_for(supabase),
            media: MediaConfig {
                allowed_host: "127.0.0.1".into(),
                cache_ttl_secs: 60,
            },
        })
        .unwrap();
        test_server::serve(build_router(state)).await
    }

    async fn post_form(
        app: SocketAddr,
        cookie: Option<&str>,
        parts: &[Part<'_>],
    ) -> reqwest::Response {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let mut request = client
            .post(format!("http://{app}/questions/new"))
            .header(reqwest::header::CONTENT_TYPE, test_support::content_type())
            .body(test_support::body(parts));
        if let Some(cookie) = cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        request.send().await.unwrap()
    }

    fn png<'a>(file_name: &'a str, bytes: &'a [u8]) -> Part<'a> {
        Part::File {
            field: IMAGE_FIELD,
            file_name,
            content_type: "image/png",
            bytes,
        }
    }

    fn user() -> SessionIdentity {
        SessionIdentity {
            id: "user-1".into(),
            display_name: Some("Ada".into()),
        }
    }

    #[test]
    fn form_defaults_to_medium_other() {
        let html = render_question_page(&user(), &QuestionForm::default(), None);
        assert!(html.contains(r#"<option value="medium" selected>"#));
        assert!(html.contains(r#"<option value="other" selected>"#));
        assert!(html.contains(r#"accept="image/*" multiple"#));
        assert!(html.contains("投稿者: Ada"));
        assert!(!html.contains("flash error"));
    }

    #[test]
    fn failed_submission_keeps_typed_values() {
        let form = QuestionForm {
            title: "<script>".into(),
            body: "x^2 + 5x + 6 = 0".into(),
            difficulty: Difficulty::Hard,
            category: Category::Algebra,
        };
        let html = render_question_page(&user(), &form, Some("ログインが必要です"));
        assert!(html.contains(r#"value="&lt;script&gt;""#));
        assert!(html.contains("x^2 + 5x + 6 = 0</textarea>"));
        assert!(html.contains(r#"<option value="hard" selected>"#));
        assert!(html.contains(r#"<option value="algebra" selected>"#));
        assert!(html.contains(r#"<div class="flash error">ログインが必要です</div>"#));
    }

    #[test]
    fn unknown_select_values_fall_back_to_defaults() {
        let mut text_fields = HashMap::new();
        text_fields.insert("title".to_string(), vec!["Quadratic formula".to_string()]);
        text_fields.insert("content".to_string(), vec!["How?".to_string()]);
        text_fields.insert("difficulty".to_string(), vec!["extreme".to_string()]);
        text_fields.insert("category".to_string(), vec!["geometry".to_string()]);
        let outcome = UploadOutcome {
            files: Vec::new(),
            text_fields,
        };

        let form = QuestionForm::from_upload(&outcome);
        assert_eq!(form.title, "Quadratic formula");
        assert_eq!(form.difficulty, Difficulty::Medium);
        assert_eq!(form.category, Category::Geometry);
    }

    #[test]
    fn form_carries_preview_script_and_submit_lock() {
        let html = render_question_page(&user(), &QuestionForm::default(), None);
        assert!(html.contains(r#"<form id="question-form""#));
        assert!(html.contains(r#"data-previews data-max-files="10""#));
        assert!(html.contains("URL.createObjectURL"));
        assert!(html.contains("'投稿中...'"));
        assert!(html.contains(r#"<button type="submit" data-submit-button>質問を投稿する</button>"#));
    }

    #[tokio::test]
    async fn posted_question_redirects_and_keeps_image_order() {
        let uploads: Uploads = Arc::default();
        let inserts: Inserts = Arc::default();
        let app = app(backend(uploads.clone(), inserts.clone(), StatusCode::CREATED)).await;

        let response = post_form(
            app,
            Some("sb_access_token=jwt"),
            &[
                Part::Text("title", "Quadratic formula"),
                Part::Text("content", "How is it derived?"),
                Part::Text("difficulty", "hard"),
                Part::Text("category", "algebra"),
                png("c.png", b"c"),
                test_support::empty_file_input(),
                png("a.png", b"a"),
                png("b.png", b"b"),
            ],
        )
        .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[reqwest::header::LOCATION],
            "/dashboard?status=posted"
        );

        let uploads = uploads.lock().unwrap();
        let bodies: Vec<Vec<u8>> = uploads.iter().map(|(_, body)| body.clone()).collect();
        assert_eq!(bodies, vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec()]);

        let inserts = inserts.lock().unwrap();
        assert_eq!(inserts.len(), 1);
        let record = &inserts[0][0];
        assert_eq!(record["title"], "Quadratic formula");
        assert_eq!(record["difficulty"], "hard");
        assert_eq!(record["category"], "algebra");
        assert_eq!(record["created_by"], "user-123");
        let urls = record["image_urls"].as_array().unwrap();
        assert_eq!(urls.len(), 3);
        for (url, (path, _)) in urls.iter().zip(uploads.iter()) {
            let key = path.trim_start_matches("/storage/v1/object/");
            assert!(key.starts_with("problem_images/questions/"));
            assert!(url.as_str().unwrap().ends_with(&format!("/storage/v1/object/public/{key}")));
        }
    }

    #[tokio::test]
    async fn persist_failure_shows_form_again_with_typed_values() {
        let uploads: Uploads = Arc::default();
        let inserts: Inserts = Arc::default();
        let app = app(backend(
            uploads.clone(),
            inserts.clone(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
        .await;

        let response = post_form(
            app,
            Some("sb_access_token=jwt"),
            &[
                Part::Text("title", "Quadratic formula"),
                Part::Text("content", "How is it derived?"),
                Part::Text("difficulty", "hard"),
                Part::Text("category", "algebra"),
                png("a.png", b"a"),
            ],
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let html = response.text().await.unwrap();
        assert!(html.contains(r#"value="Quadratic formula""#));
        assert!(html.contains("How is it derived?</textarea>"));
        assert!(html.contains(r#"<option value="hard" selected>"#));
        assert!(html.contains("投稿に失敗しました: HTTP 500: database unavailable"));
        assert_eq!(uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_attachment_keeps_typed_values() {
        let uploads: Uploads = Arc::default();
        let inserts: Inserts = Arc::default();
        let app = app(backend(uploads.clone(), inserts.clone(), StatusCode::CREATED)).await;

        let response = post_form(
            app,
            Some("sb_access_token=jwt"),
            &[
                Part::Text("title", "Pythagoras"),
                Part::Text("content", "Why does it hold?"),
                Part::File {
                    field: IMAGE_FIELD,
                    file_name: "notes.txt",
                    content_type: "text/plain",
                    bytes: b"not an image",
                },
                Part::Text("category", "geometry"),
            ],
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let html = response.text().await.unwrap();
        assert!(html.contains(r#"value="Pythagoras""#));
        assert!(html.contains(r#"<option value="geometry" selected>"#));
        assert!(html.contains("画像ファイルではありません"));
        assert!(uploads.lock().unwrap().is_empty());
        assert!(inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_post_is_sent_to_sign_in() {
        let uploads: Uploads = Arc::default();
        let inserts: Inserts = Arc::default();
        let app = app(backend(uploads.clone(), inserts.clone(), StatusCode::CREATED)).await;

        let response = post_form(app, None, &[Part::Text("title", "x")]).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[reqwest::header::LOCATION], "/auth");
        assert!(inserts.lock().unwrap().is_empty());
    }
}

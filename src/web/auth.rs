use std::borrow::Cow;

use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration as CookieDuration;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::{
    gateway::{GatewayError, IdentityGateway},
    models::SessionIdentity,
    web::{AppState, PageLayout, render_flash, render_page},
};

pub const SESSION_COOKIE: &str = "sb_access_token";
pub const VERIFIER_COOKIE: &str = "sb_code_verifier";
/// Used when the provider does not say how long the access token lives.
const DEFAULT_SESSION_TTL_SECS: i64 = 3600;
const VERIFIER_TTL_MINUTES: i64 = 10;

#[derive(Default, Deserialize)]
pub struct AuthQuery {
    pub error: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub async fn auth_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<AuthQuery>,
) -> Result<Html<String>, Redirect> {
    if let Ok(Some(_)) = current_identity(&state, &jar).await {
        return Err(Redirect::to("/dashboard"));
    }

    Ok(Html(render_login_page(params.error.as_deref())))
}

pub async fn start_sign_in(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let callback = state.config().auth_callback_url();
    match state.session(None).sign_in(&callback) {
        Ok(redirect) => {
            let mut cookie = Cookie::new(VERIFIER_COOKIE, redirect.code_verifier);
            cookie.set_path("/auth");
            cookie.set_http_only(true);
            cookie.set_same_site(SameSite::Lax);
            cookie.set_max_age(CookieDuration::minutes(VERIFIER_TTL_MINUTES));
            (jar.add(cookie), Redirect::to(&redirect.url))
        }
        Err(err) => {
            error!(?err, "failed to start OAuth sign-in");
            (jar, Redirect::to("/auth?error=signin_failed"))
        }
    }
}

pub async fn auth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackQuery>,
) -> (CookieJar, Redirect) {
    if let Some(provider_error) = params.error.as_deref() {
        warn!(
            provider_error,
            description = params.error_description.as_deref().unwrap_or(""),
            "identity provider returned an error"
        );
        return (jar, Redirect::to("/auth?error=signin_failed"));
    }

    let Some(code) = params.code.as_deref() else {
        return (jar, Redirect::to("/auth?error=signin_failed"));
    };
    let Some(verifier) = jar.get(VERIFIER_COOKIE).map(|c| c.value().to_string()) else {
        warn!("OAuth callback without a code verifier cookie");
        return (jar, Redirect::to("/auth?error=signin_expired"));
    };

    let jar = jar.remove(removal_cookie(VERIFIER_COOKIE, "/auth"));
    match state.session(None).exchange_code(code, &verifier).await {
        Ok(tokens) => {
            let ttl = tokens.expires_in.unwrap_or(DEFAULT_SESSION_TTL_SECS);
            let mut cookie = Cookie::new(SESSION_COOKIE, tokens.access_token);
            cookie.set_path("/");
            cookie.set_http_only(true);
            cookie.set_same_site(SameSite::Lax);
            cookie.set_max_age(CookieDuration::seconds(ttl));
            info!(
                has_refresh_token = tokens.refresh_token.is_some(),
                ttl_secs = ttl,
                "user signed in"
            );
            (jar.add(cookie), Redirect::to("/dashboard"))
        }
        Err(err) => {
            error!(?err, "failed to exchange authorization code");
            (jar, Redirect::to("/auth?error=signin_failed"))
        }
    }
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar.remove(removal_cookie(SESSION_COOKIE, "/"));
    (jar, Redirect::to("/?status=logged_out"))
}

pub fn access_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Resolves the signed-in user from the session cookie.
pub async fn current_identity(
    state: &AppState,
    jar: &CookieJar,
) -> Result<Option<SessionIdentity>, GatewayError> {
    state.session(access_token(jar)).current_user().await
}

/// Sends anonymous visitors to the login page. Lookup faults are logged and
/// treated the same way, since the page cannot be shown without a user.
pub async fn require_identity_redirect(
    state: &AppState,
    jar: &CookieJar,
) -> Result<SessionIdentity, Redirect> {
    match current_identity(state, jar).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => Err(Redirect::to("/auth")),
        Err(err) => {
            error!(?err, "failed to resolve session");
            Err(Redirect::to("/auth?error=session_lookup"))
        }
    }
}

fn removal_cookie(name: &'static str, path: &'static str) -> Cookie<'static> {
    let mut removal = Cookie::new(name, "");
    removal.set_path(path);
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    removal
}

fn login_error_message(code: &str) -> &'static str {
    match code {
        "signin_expired" => "ログインの有効期限が切れました。もう一度お試しください",
        "session_lookup" => "ログイン状態を確認できませんでした。時間をおいて再度お試しください",
        _ => "ログインに失敗しました",
    }
}

const LOGIN_STYLES: &str = r#"
        .auth-card { max-width: 440px; margin: 0 auto; text-align: center; }
        .auth-card h1 { margin: 1rem 0 0.5rem; font-size: 1.6rem; }
        .auth-card p.lead { margin: 0 0 2rem; color: #475569; }
        .google-button { width: 100%; display: flex; align-items: center; justify-content: center; gap: 0.75rem; padding: 0.9rem 1.5rem; border-radius: 12px; border: 2px solid #e2e8f0; background: #ffffff; color: #1e293b; font-weight: 600; font-size: 1rem; cursor: pointer; }
        .google-button:hover { background: #f8fafc; }
        .terms { margin-top: 2rem; font-size: 0.85rem; color: #64748b; line-height: 1.7; }
        .terms a { color: #2563eb; }
"#;

pub fn render_login_page(error_code: Option<&str>) -> String {
    let flash = render_flash("error", error_code.map(login_error_message));
    let body = r#"<section class="panel auth-card">
            <h1>アカウント作成</h1>
            <p class="lead">数学の新しい学び方を始めよう！</p>
            <form method="post" action="/auth/signin">
                <button class="google-button" type="submit">Googleでログイン</button>
            </form>
            <p class="terms">登録することで、<a href="/terms">利用規約</a>と<a href="/privacy">プライバシーポリシー</a>に同意したことになります。</p>
        </section>"#;

    render_page(PageLayout {
        title: "ログイン | JoyMath",
        nav: Vec::new(),
        signed_in: false,
        flash_html: Cow::Owned(flash),
        body_html: Cow::Borrowed(body),
        extra_styles: Some(LOGIN_STYLES),
    })
}

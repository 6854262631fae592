use std::borrow::Cow;

use axum::{
    extract::{Query, State},
    response::Html,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::warn;

use crate::web::{AppState, NavLink, PageLayout, auth, escape_html, render_flash, render_page};

#[derive(Default, Deserialize)]
pub struct LandingQuery {
    pub status: Option<String>,
}

const FEATURES: [(&str, &str, &str); 3] = [
    (
        "📝",
        "問題を解く",
        "テスト対策から入試問題まで。自分のペースで楽しく解こう！",
    ),
    (
        "🤝",
        "教え合う",
        "分からない時は質問、分かる時は解説。みんなで高め合おう！",
    ),
    (
        "🎮",
        "成長する",
        "教えるとポイントGET！レベルアップして特典をゲット！",
    ),
];

const LANDING_STYLES: &str = r#"
        .hero { text-align: center; padding: 3rem 0 4rem; }
        .hero h1 { font-size: clamp(2.2rem, 5vw, 3.4rem); margin: 0 0 1.5rem; line-height: 1.25; }
        .hero h1 span { background: linear-gradient(90deg, #2563eb, #4f46e5); -webkit-background-clip: text; background-clip: text; color: transparent; }
        .hero p { color: #475569; font-size: 1.1rem; line-height: 1.8; margin: 0 auto 2.5rem; max-width: 640px; }
        .cta-row { display: flex; gap: 1rem; justify-content: center; flex-wrap: wrap; }
        .cta { display: inline-block; padding: 0.95rem 2rem; border-radius: 999px; font-weight: 700; text-decoration: none; }
        .cta.primary { background: #2563eb; color: #ffffff; }
        .cta.secondary { background: #ffffff; color: #2563eb; border: 2px solid #bfdbfe; }
        .badge { margin-left: 0.5rem; background: #f43f5e; color: #ffffff; padding: 0.1rem 0.5rem; border-radius: 999px; font-size: 0.75rem; }
        .features h2 { text-align: center; font-size: 1.9rem; margin-bottom: 2rem; }
        .features-grid { display: grid; gap: 1.5rem; grid-template-columns: repeat(auto-fit, minmax(240px, 1fr)); }
        .feature-card { background: #ffffff; padding: 1.75rem; border-radius: 16px; border: 1px solid #e2e8f0; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); }
        .feature-card .icon { font-size: 2.25rem; }
        .feature-card h3 { margin: 0.75rem 0 0.5rem; }
        .feature-card p { margin: 0; color: #475569; line-height: 1.6; }
        .closing { text-align: center; margin-top: 4rem; padding: 3rem 1.5rem; border-radius: 24px; background: linear-gradient(90deg, #2563eb, #4f46e5); color: #ffffff; }
        .closing h2 { margin-top: 0; font-size: 1.9rem; }
        .closing .cta { background: #ffffff; color: #2563eb; }
"#;

pub async fn landing_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<LandingQuery>,
) -> Html<String> {
    // Marketing content is shown regardless of lookup faults.
    let signed_in = match auth::current_identity(&state, &jar).await {
        Ok(identity) => identity.is_some(),
        Err(err) => {
            warn!(?err, "failed to resolve session for landing page");
            false
        }
    };

    Html(render_landing_page(signed_in, &params))
}

fn render_landing_page(signed_in: bool, params: &LandingQuery) -> String {
    let flash = match params.status.as_deref() {
        Some("logged_out") => render_flash("success", Some("ログアウトしました")),
        _ => String::new(),
    };

    let feature_cards = FEATURES
        .iter()
        .map(|(icon, title, description)| {
            format!(
                r#"<div class="feature-card"><div class="icon">{icon}</div><h3>{title}</h3><p>{description}</p></div>"#,
                icon = icon,
                title = escape_html(title),
                description = escape_html(description),
            )
        })
        .collect::<String>();

    let (start_href, start_label) = if signed_in {
        ("/dashboard", "ダッシュボードへ")
    } else {
        ("/auth", "無料で始める")
    };

    let body = format!(
        r#"<section class="hero">
            <h1>数学を、みんなで<br><span>楽しく</span></h1>
            <p>分からないところは質問、分かるところは教え合い。みんなで一緒に成長する新しい学び方。</p>
            <div class="cta-row">
                <a class="cta secondary" href="/problems">問題を探す<span class="badge">New!</span></a>
                <a class="cta primary" href="{start_href}">{start_label}</a>
            </div>
        </section>
        <section class="features">
            <h2>JoyMath の特徴</h2>
            <div class="features-grid">{feature_cards}</div>
        </section>
        <section class="closing">
            <h2>さぁ、新しい数学の世界へ！</h2>
            <p>仲間と一緒に楽しく学ぼう。登録は完全無料！</p>
            <a class="cta" href="{start_href}">今すぐスタート！</a>
        </section>"#,
    );

    let nav = if signed_in {
        vec![NavLink {
            href: "/dashboard",
            label: "ダッシュボード",
        }]
    } else {
        vec![NavLink {
            href: "/auth",
            label: "ログイン",
        }]
    };

    render_page(PageLayout {
        title: "JoyMath | 数学をみんなで楽しく",
        nav,
        signed_in,
        flash_html: Cow::Owned(flash),
        body_html: Cow::Owned(body),
        extra_styles: Some(LANDING_STYLES),
    })
}

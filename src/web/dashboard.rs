use std::borrow::Cow;

use axum::{
    extract::{Query, State},
    response::Html,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::error;

use crate::web::{AppState, NavLink, PageLayout, auth, escape_html, render_flash, render_page};

const FALLBACK_NAME: &str = "数学好き";
const EXP_PER_LEVEL: u32 = 3000;

#[derive(Default, Deserialize)]
pub struct DashboardQuery {
    pub status: Option<String>,
}

/// Gamification counters shown on the dashboard. There is no backing table
/// yet, so every user sees the same sample values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStats {
    pub solved_problems: u32,
    pub contributions: u32,
    pub current_streak: u32,
    pub level: u32,
    pub exp: u32,
}

impl UserStats {
    pub fn placeholder() -> Self {
        Self {
            solved_problems: 42,
            contributions: 15,
            current_streak: 3,
            level: 5,
            exp: 2480,
        }
    }
}

const DASHBOARD_STYLES: &str = r#"
        .welcome { display: flex; align-items: center; gap: 1.5rem; margin-bottom: 2rem; }
        .avatar { width: 4rem; height: 4rem; border-radius: 999px; background: linear-gradient(90deg, #3b82f6, #6366f1); color: #ffffff; display: flex; align-items: center; justify-content: center; font-size: 1.6rem; font-weight: 700; flex-shrink: 0; }
        .welcome h1 { margin: 0 0 0.35rem; font-size: 1.6rem; }
        .welcome p { margin: 0; color: #475569; }
        .stats { display: grid; gap: 1.25rem; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); margin-bottom: 2rem; }
        .stat-card { background: #ffffff; border-radius: 14px; border: 1px solid #e2e8f0; padding: 1.5rem; box-shadow: 0 12px 30px rgba(15, 23, 42, 0.06); }
        .stat-card header { display: flex; justify-content: space-between; color: #475569; font-weight: 600; margin-bottom: 0.75rem; }
        .stat-card .value { font-size: 2rem; font-weight: 800; }
        .stat-card .unit { margin-left: 0.25rem; color: #475569; }
        .stat-card .sub { margin-top: 0.5rem; font-size: 0.85rem; color: #64748b; }
        .actions { display: grid; gap: 1.25rem; grid-template-columns: repeat(auto-fit, minmax(280px, 1fr)); }
        .action-card { display: flex; gap: 1rem; align-items: center; padding: 1.5rem; border-radius: 14px; color: #ffffff; text-decoration: none; }
        .action-card .icon { font-size: 2.5rem; }
        .action-card h3 { margin: 0 0 0.25rem; }
        .action-card p { margin: 0; opacity: 0.9; }
        .action-card.blue { background: linear-gradient(90deg, #3b82f6, #6366f1); }
        .action-card.green { background: linear-gradient(90deg, #22c55e, #10b981); }
"#;

pub async fn dashboard_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<DashboardQuery>,
) -> Html<String> {
    let (display_name, lookup_failed) = match auth::current_identity(&state, &jar).await {
        Ok(identity) => (identity.and_then(|identity| identity.display_name), false),
        Err(err) => {
            error!(?err, "failed to fetch user for dashboard");
            (None, true)
        }
    };
    let signed_in = auth::access_token(&jar).is_some();

    Html(render_dashboard(
        display_name.as_deref(),
        &UserStats::placeholder(),
        signed_in,
        lookup_failed,
        &params,
    ))
}

fn render_dashboard(
    display_name: Option<&str>,
    stats: &UserStats,
    signed_in: bool,
    lookup_failed: bool,
    params: &DashboardQuery,
) -> String {
    let name = display_name.unwrap_or(FALLBACK_NAME);
    let initial = display_name
        .and_then(|name| name.chars().next())
        .map(|c| c.to_uppercase().collect::<String>())
        .unwrap_or_else(|| "J".to_string());

    let mut flash = String::new();
    if params.status.as_deref() == Some("posted") {
        flash.push_str(&render_flash("success", Some("質問を投稿しました")));
    }
    if lookup_failed {
        flash.push_str(&render_flash(
            "warning",
            Some("ユーザー情報を取得できませんでした"),
        ));
    }

    let level_detail = format!("{}/{} EXP", stats.exp, EXP_PER_LEVEL);
    let cards = [
        stat_card("📝", "解いた問題", stats.solved_problems, Some("問"), None),
        stat_card("🤝", "貢献度", stats.contributions, Some("回"), None),
        stat_card("🔥", "継続日数", stats.current_streak, Some("日"), None),
        stat_card("⭐", "レベル", stats.level, None, Some(&level_detail)),
    ]
    .concat();

    let body = format!(
        r#"<section class="panel welcome">
            <div class="avatar">{initial}</div>
            <div>
                <h1>ようこそ、{name}さん！</h1>
                <p>今日も一緒に数学を楽しみましょう！</p>
            </div>
        </section>
        <section class="stats">{cards}</section>
        <section class="actions">
            <a class="action-card blue" href="/problems"><span class="icon">🎯</span><div><h3>問題を解く</h3><p>様々な難易度の問題に挑戦しよう</p></div></a>
            <a class="action-card green" href="/questions/new"><span class="icon">❓</span><div><h3>質問する</h3><p>分からないところを質問してみよう</p></div></a>
        </section>"#,
        initial = escape_html(&initial),
        name = escape_html(name),
        cards = cards,
    );

    render_page(PageLayout {
        title: "ダッシュボード | JoyMath",
        nav: vec![NavLink {
            href: "/questions/new",
            label: "質問する",
        }],
        signed_in,
        flash_html: Cow::Owned(flash),
        body_html: Cow::Owned(body),
        extra_styles: Some(DASHBOARD_STYLES),
    })
}

fn stat_card(
    icon: &str,
    title: &str,
    value: u32,
    unit: Option<&str>,
    detail: Option<&str>,
) -> String {
    let unit_html = unit
        .map(|unit| format!(r#"<span class="unit">{}</span>"#, escape_html(unit)))
        .unwrap_or_default();
    let detail_html = detail
        .map(|detail| format!(r#"<div class="sub">{}</div>"#, escape_html(detail)))
        .unwrap_or_default();

    format!(
        r#"<div class="stat-card"><header><span>{title}</span><span>{icon}</span></header><span class="value">{value}</span>{unit_html}{detail_html}</div>"#,
        title = escape_html(title),
    )
}

use std::borrow::Cow;

use chrono::{Datelike, Utc};

const BASE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Hiragino Sans", "Noto Sans JP", "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; min-height: 100vh; display: flex; flex-direction: column; }
        header.site { background: #ffffff; padding: 1.25rem clamp(1.5rem, 6vw, 3rem); border-bottom: 1px solid #e2e8f0; display: flex; justify-content: space-between; align-items: center; gap: 1rem; flex-wrap: wrap; }
        .brand { font-size: 1.6rem; font-weight: 800; text-decoration: none; background: linear-gradient(90deg, #2563eb, #4f46e5); -webkit-background-clip: text; background-clip: text; color: transparent; }
        .nav { display: flex; gap: 0.75rem; align-items: center; flex-wrap: wrap; }
        .nav a, .nav button { color: #1d4ed8; text-decoration: none; font-weight: 600; background: #e0f2fe; padding: 0.5rem 0.95rem; border-radius: 999px; border: 1px solid #bfdbfe; font-size: 0.95rem; cursor: pointer; }
        .nav a:hover, .nav button:hover { background: #bfdbfe; border-color: #93c5fd; }
        .nav form { margin: 0; }
        main { flex: 1; padding: clamp(2rem, 5vw, 3rem) clamp(1rem, 4vw, 2rem); max-width: 1100px; margin: 0 auto; width: 100%; box-sizing: border-box; }
        .panel { background: #ffffff; border-radius: 16px; border: 1px solid #e2e8f0; padding: 2rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); }
        .flash { padding: 1rem 1.25rem; border-radius: 10px; margin-bottom: 1.5rem; font-weight: 600; border: 1px solid transparent; }
        .flash.success { background: #ecfdf3; border-color: #bbf7d0; color: #166534; }
        .flash.error { background: #fef2f2; border-color: #fecaca; color: #b91c1c; }
        .flash.warning { background: #fffbeb; border-color: #fde68a; color: #92400e; }
        .app-footer { margin-top: 3rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
"#;

/// Link shown in the top navigation bar.
pub struct NavLink<'a> {
    pub href: &'a str,
    pub label: &'a str,
}

pub struct PageLayout<'a> {
    pub title: &'a str,
    pub nav: Vec<NavLink<'a>>,
    /// Adds a sign-out button to the navigation bar.
    pub signed_in: bool,
    pub flash_html: Cow<'a, str>,
    pub body_html: Cow<'a, str>,
    pub extra_styles: Option<&'a str>,
}

pub fn render_page(layout: PageLayout<'_>) -> String {
    let PageLayout {
        title,
        nav,
        signed_in,
        flash_html,
        body_html,
        extra_styles,
    } = layout;

    let mut nav_html = nav
        .iter()
        .map(|link| {
            format!(
                r#"<a href="{href}">{label}</a>"#,
                href = link.href,
                label = escape_html(link.label),
            )
        })
        .collect::<String>();
    if signed_in {
        nav_html.push_str(
            r#"<form method="post" action="/auth/logout"><button type="submit">ログアウト</button></form>"#,
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="ja">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
{base_styles}
{extra_styles}
    </style>
</head>
<body>
    <header class="site">
        <a class="brand" href="/">JoyMath</a>
        <nav class="nav">{nav_html}</nav>
    </header>
    <main>
        {flash_html}
        {body_html}
        {footer}
    </main>
</body>
</html>"#,
        title = escape_html(title),
        base_styles = BASE_STYLES,
        extra_styles = extra_styles.unwrap_or_default(),
        nav_html = nav_html,
        flash_html = flash_html,
        body_html = body_html,
        footer = render_footer(),
    )
}

/// `<div class="flash …">` with escaped text, or nothing.
pub fn render_flash(kind: &str, message: Option<&str>) -> String {
    match message {
        Some(message) if !message.is_empty() => format!(
            r#"<div class="flash {kind}">{message}</div>"#,
            message = escape_html(message)
        ),
        _ => String::new(),
    }
}

pub fn render_footer() -> String {
    let current_year = Utc::now().year();
    format!(
        r#"<footer class="app-footer">© {year} JoyMath</footer>"#,
        year = current_year
    )
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

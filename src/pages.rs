//! HTML 页面渲染：共享总览、登录、目录列表、分享链接与错误页。

use axum::response::Html;
use std::cmp::Ordering;

use crate::backend::DirEntry;
use crate::http::{encode_path, encode_segment};

const FILE_ICONS: &[(&str, &[&str])] = &[
    ("📝", &["docx", "doc", "odt", "txt"]),
    ("📊", &["xlsx", "xls", "ods", "csv"]),
    ("📽", &["pptx", "ppt", "odp"]),
    ("🖼", &["png", "jpg", "jpeg", "bmp"]),
    ("🎞", &["mp4", "mov", "avi"]),
    ("🎵", &["mp3", "wav"]),
    ("📕", &["pdf"]),
    ("📦", &["zip", "7z", "tgz", "gz", "rar"]),
    (
        "🧾",
        &[
            "js", "htm", "html", "css", "c", "cpp", "cxx", "h", "hpp", "hxx", "cs", "scala", "java",
            "rs",
        ],
    ),
];

/// 渲染所需的请求上下文。
#[derive(Clone, Debug, Default)]
pub struct PageContext {
    /// Decoded request path.
    pub path: String,
    pub logged_in: bool,
    pub legal_notice_url: Option<String>,
    pub privacy_url: Option<String>,
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn breadcrumbs(path: &str) -> String {
    let mut out = String::from(r#"<a href="/">ROOT</a>"#);
    let mut prefix = String::new();
    for part in path.split('/').filter(|part| !part.is_empty()) {
        prefix.push('/');
        prefix.push_str(&encode_segment(part));
        out.push_str(&format!(
            r#" / <a href="{prefix}/">{}</a>"#,
            escape_html(part)
        ));
    }
    out
}

fn layout(ctx: &PageContext, body: &str) -> Html<String> {
    let logout = if ctx.logged_in {
        format!(
            r#"<a class="logout" href="{}?logout">Logout</a>"#,
            encode_path(&ctx.path)
        )
    } else {
        String::new()
    };
    let mut footer_links = Vec::new();
    if let Some(url) = &ctx.legal_notice_url {
        footer_links.push(format!(r#"<a href="{}">Legal Notice</a>"#, escape_html(url)));
    }
    if let Some(url) = &ctx.privacy_url {
        footer_links.push(format!(r#"<a href="{}">Privacy Policy</a>"#, escape_html(url)));
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
	<meta charset="utf-8">
	<meta name="viewport" content="width=device-width, initial-scale=1">
	<title>{title}</title>
	<link rel="stylesheet" href="/assets/style.css">
</head>
<body>
	{logout}
	<h1>{crumbs}</h1>
{body}
	<div class="footer">{footer}</div>
</body>
</html>"#,
        title = escape_html(&ctx.path),
        crumbs = breadcrumbs(&ctx.path),
        footer = footer_links.join(" | "),
    ))
}

fn infobox(title: &str, content: &str) -> String {
    format!(
        r#"	<div class="infobox">
		<h2>{title}</h2>
		{content}
	</div>"#
    )
}

/// 共享总览页，已登录的共享显示为解锁状态。
pub fn overview(ctx: &PageContext, shares: &[(String, bool)]) -> Html<String> {
    let mut rows = String::from("\t<table>\n");
    for (name, unlocked) in shares {
        let icon = if *unlocked { "🔓" } else { "🔒" };
        rows.push_str(&format!(
            "\t\t<tr><td class=\"icon\">{icon}</td><td class=\"name\"><a href=\"/{}/\">{}</a></td><td class=\"size\">[SHARE]</td><td class=\"share\"></td></tr>\n",
            encode_segment(name),
            escape_html(name)
        ));
    }
    rows.push_str("\t</table>");
    layout(ctx, &rows)
}

/// 登录页。`action` 为表单提交地址（原始路径与查询串）。
pub fn login(
    ctx: &PageContext,
    title: &str,
    action: &str,
    shares: &[String],
    selected: &str,
) -> Html<String> {
    let options = shares
        .iter()
        .map(|share| {
            format!(
                r#"<option value="{value}"{selected}>{value}</option>"#,
                value = escape_html(share),
                selected = if share == selected { " selected" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("");
    let form = format!(
        r#"<form action="{action}" method="post">
			<label>👤 <input type="text" name="user" placeholder="Username" autofocus></label><br>
			<label>🔑 <input type="password" name="password" placeholder="Password"></label><br>
			<label>🗂 <select name="share">{options}</select></label><br>
			<button type="submit">Login</button>
		</form>"#,
        action = escape_html(action),
    );
    layout(ctx, &infobox(&escape_html(title), &form))
}

/// 分享链接页。
pub fn share_link(ctx: &PageContext, link: &str) -> Html<String> {
    let content = format!(
        r#"<label>🔗 <input type="text" readonly onfocus="this.select();" value="{}"></label>
		<p>The link is valid until you logout (or are automatically logged out).</p>"#,
        escape_html(link)
    );
    layout(ctx, &infobox("Share link created", &content))
}

/// 错误页。
pub fn error(ctx: &PageContext, message: &str) -> Html<String> {
    layout(
        ctx,
        &infobox("⚠ Failed to load", &escape_html(message)),
    )
}

/// 目录列表页：目录优先、名称忽略大小写排序，隐藏 `.` 与 `..`。
pub fn directory(ctx: &PageContext, mut entries: Vec<DirEntry>) -> Html<String> {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    let base = encode_path(&ctx.path);
    let mut rows = String::from("\t<table>\n");
    for entry in entries
        .iter()
        .filter(|entry| entry.name != "." && entry.name != "..")
    {
        let hidden = if entry.name.starts_with('.') {
            r#" class="hidden""#
        } else {
            ""
        };
        let href = format!("{base}{}", encode_segment(&entry.name));
        let name = escape_html(&entry.name);
        if entry.is_dir {
            rows.push_str(&format!(
                "\t\t<tr{hidden}><td class=\"icon\">📁</td><td class=\"name\"><a href=\"{href}/\">{name}</a></td><td class=\"size\">[DIR]</td><td class=\"share\"></td></tr>\n"
            ));
        } else {
            rows.push_str(&format!(
                "\t\t<tr{hidden}><td class=\"icon\">{icon}</td><td class=\"name\"><a href=\"{href}\">{name}</a></td><td class=\"size\">{size}</td><td class=\"share\"><a href=\"{href}?share\">🔗</a></td></tr>\n",
                icon = file_icon(&entry.name),
                size = human_size(entry.size),
            ));
        }
    }
    rows.push_str("\t</table>");
    layout(ctx, &rows)
}

pub fn file_icon(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    let Some((_, extension)) = lower.rsplit_once('.') else {
        return "📄";
    };
    FILE_ICONS
        .iter()
        .find(|(_, extensions)| extensions.contains(&extension))
        .map(|(icon, _)| *icon)
        .unwrap_or("📄")
}

/// 以 KB 起步的可读文件大小。
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64 / 1024.0;
    let mut unit = "KB";
    for next in ["MB", "GB", "TB"] {
        if size <= 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }
    format!("{size:.2}&nbsp;{unit}")
}

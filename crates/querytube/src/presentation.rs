//! Presentation adapter: ranked rows → display cards → HTML.

use serde::Serialize;

use crate::types::ScoredVideo;

const EMBED_BASE: &str = "https://www.youtube.com/embed/";
const WATCH_BASE: &str = "https://www.youtube.com/watch?v=";

pub const STATUS_WAITING: &str = "Waiting for input...";
pub const STATUS_READY: &str = "Ready for new search.";

/// Display fields for one ranked video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCard {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub snippet: String,
    pub embed_url: String,
    pub watch_url: String,
    pub published: String,
    pub score: f32,
}

impl ResultCard {
    pub fn from_scored(scored: &ScoredVideo, snippet_chars: usize) -> Self {
        let record = &scored.record;
        let title = if record.title.trim().is_empty() {
            "Untitled Video".to_string()
        } else {
            record.title.clone()
        };
        let description = if record.description.trim().is_empty() {
            "No description available.".to_string()
        } else {
            record.description.clone()
        };
        // Anything outside the unreserved set is escaped so it stays in the path.
        let video_id = urlencoding::encode(&record.video_id);

        Self {
            embed_url: format!("{}{}", EMBED_BASE, video_id),
            watch_url: format!("{}{}", WATCH_BASE, video_id),
            video_id: record.video_id.clone(),
            snippet: truncate_chars(&description, snippet_chars),
            description,
            title,
            published: record
                .published_date
                .map(|d| d.format("%b %d, %Y").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            score: scored.score,
        }
    }
}

/// Everything `render_page` needs for one response.
#[derive(Debug, Clone, Default)]
pub struct PageView<'a> {
    pub query: &'a str,
    pub status: &'a str,
    pub results_html: &'a str,
    pub channel_name: &'a str,
    pub example_queries: &'a [String],
}

pub fn status_for_results(count: usize) -> String {
    format!("Displaying Top {} Results.", count)
}

/// First `max_chars` characters, with `...` appended when text was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Results panel. An empty list renders the "no results" block.
pub fn render_results(query: &str, cards: &[ResultCard], channel_name: &str) -> String {
    if cards.is_empty() {
        return "<p class='no-results'>No results found.</p>".to_string();
    }

    let mut html = format!(
        "<h2 class='results-heading'>Top results for \u{201c}{}\u{201d}</h2>\n",
        html_escape(query)
    );

    for card in cards {
        html.push_str(&format!(
            r#"<div class='result-card' data-video-id='{id}'>
    <div class='video-player-container'>
        <iframe src='{embed}' title='{title}' frameborder='0' allowfullscreen></iframe>
    </div>
    <div class='video-details-container'>
        <h3 class='result-title'>{title}</h3>
        <p class='meta'>{channel} &bull; {published}</p>
        <p class='desc'>{snippet}</p>
        <a href='{watch}' target='_blank' rel='noopener' class='watch-button'>&#9654; Watch on YouTube</a>
    </div>
</div>
"#,
            id = html_escape(&card.video_id),
            embed = html_escape(&card.embed_url),
            watch = html_escape(&card.watch_url),
            title = html_escape(&card.title),
            channel = html_escape(channel_name),
            published = html_escape(&card.published),
            snippet = html_escape(&card.snippet),
        ));
    }

    html
}

/// Status line plus results panel, used for partial refreshes.
pub fn render_fragment(status: &str, results_html: &str) -> String {
    format!(
        "<div id='status'>{}</div>\n<div id='results'>{}</div>\n",
        html_escape(status),
        results_html
    )
}

/// Standalone page with search form, status, results and example queries.
pub fn render_page(view: &PageView<'_>) -> String {
    let examples: String = view
        .example_queries
        .iter()
        .map(|q| {
            format!(
                "<a class='example' href='/?q={}'>{}</a>",
                urlencoding::encode(q),
                html_escape(q)
            )
        })
        .collect::<Vec<_>>()
        .join("\n            ");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>QueryTube</title>
    <style>{css}</style>
</head>
<body>
    <div class="app-header">
        <h1 class="title">QueryTube</h1>
        <h2 class="subtitle">Semantic Search for <span>YouTube Videos</span></h2>
        <p class="description">Search <b>{channel}</b> videos by meaning, not just keywords.</p>
    </div>
    <main>
        <form id="input-container" method="get" action="/">
            <input type="text" name="q" value="{query}" placeholder="Ask anything..." autofocus>
            <button type="submit" class="primary">Search</button>
            <a href="/" class="clear">Clear</a>
        </form>
        <div id="status">{status}</div>
        <h3>Search Results</h3>
        <div id="results">{results}</div>
        <div id="examples-block">
            {examples}
        </div>
    </main>
    <hr>
    <div id="footer">Built with Rust, axum and Sentence Transformers.</div>
</body>
</html>
"#,
        css = PAGE_CSS,
        channel = html_escape(view.channel_name),
        query = html_escape(view.query),
        status = html_escape(view.status),
        results = view.results_html,
        examples = examples,
    )
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const PAGE_CSS: &str = r#"
body { background-color: #0b0f19; color: #e5e7eb; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; margin: 0; }
main { max-width: 1100px; margin: 0 auto; padding: 0 20px; }
.app-header { text-align: center; margin: 2rem auto; }
.app-header .title { font-size: 3.5em; font-weight: 700; color: white; margin: 0; }
.app-header .subtitle { font-size: 2.2em; font-weight: 700; color: white; margin: 0.5rem 0; }
.app-header .subtitle span { color: #f97316; }
.app-header .description { font-size: 1.4em; color: #a0aec0; max-width: 650px; margin: 1rem auto 0 auto; }
#input-container { display: flex; gap: 10px; background-color: #1f2937; padding: 25px; border-radius: 12px; }
#input-container input { flex-grow: 1; padding: 10px 14px; border-radius: 6px; border: 1px solid #374151; background: #111827; color: white; font-size: 1.05em; }
#input-container button.primary { padding: 10px 18px; border: none; border-radius: 6px; background-color: #f97316; color: white; font-weight: 600; cursor: pointer; }
#input-container a.clear { padding: 10px 18px; border-radius: 6px; background-color: #374151; color: white; text-decoration: none; }
#status { margin: 14px 0; color: #a0aec0; }
.results-heading { color: #f97316; text-align: center; }
.result-card { display: flex; align-items: flex-start; gap: 25px; background-color: #1f2937; margin-bottom: 25px; padding: 20px; border-radius: 12px; flex-wrap: wrap; }
.video-player-container { flex-basis: 480px; flex-shrink: 0; position: relative; padding-top: 270px; height: 0; }
.video-player-container iframe { position: absolute; top: 0; left: 0; width: 100%; height: 100%; border-radius: 8px; }
.video-details-container { flex: 1; color: #e5e7eb; }
.result-title { margin: 0 0 8px 0; font-size: 1.3em; font-weight: 600; color: #ff8c66; }
.meta { font-size: 1.0em; color: #aaa; margin: 0 0 15px 0; }
.desc { font-size: 1.0em; color: #ddd; line-height: 1.6; }
.watch-button { display: inline-block; margin-top: 10px; padding: 8px 14px; background-color: #f97316; color: white; border-radius: 6px; text-decoration: none; font-weight: 600; transition: background-color 0.2s ease; }
.watch-button:hover { background-color: #ffb26b; color: black; }
.no-results { text-align: center; font-size: 1.2em; color: #a0aec0; padding: 40px; }
#examples-block { margin-top: 20px; text-align: center; }
#examples-block a.example { display: inline-block; font-size: 0.95em; padding: 6px 12px; border-radius: 6px; background-color: #1f2937; color: white; border: 1px solid #374151; margin: 4px; text-decoration: none; }
#examples-block a.example:hover { background-color: #f97316; }
#footer { text-align: center; color: #4a5568; font-size: 0.85em; margin: 40px 0; }
@media (max-width: 900px) { .result-card { flex-direction: column; align-items: center; } }
"#;

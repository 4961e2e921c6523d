use minijinja::Environment;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};
use serde::Serialize;

use crate::gemini::Model;
use crate::session::models::{ChatTurn, Notice, Role};
use crate::session::ChatSession;

const PAGE: &str = "page.html";

#[derive(Serialize)]
struct ModelOption {
    id: &'static str,
    selected: bool,
}

#[derive(Serialize)]
struct DocumentView<'a> {
    file_name: &'a str,
    page_count: usize,
    size: String,
    uploaded: String,
}

#[derive(Serialize)]
struct TurnView<'a> {
    role: Role,
    content: &'a str,
    /// Pre-rendered answer markup; user turns are shown as plain text.
    html: Option<String>,
    sources: Option<String>,
}

#[derive(Serialize)]
struct PageView<'a> {
    notices: Vec<Notice>,
    has_credential: bool,
    models: Vec<ModelOption>,
    document: Option<DocumentView<'a>>,
    questions: usize,
    exchanges: usize,
    suggestions: &'static [&'static str],
    transcript: Vec<TurnView<'a>>,
}

/// Server-rendered pages. Templates named `*.html` are autoescaped.
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(PAGE, include_str!("templates/page.html"))?;
        Ok(Self { env })
    }

    /// Render the whole page for a session. Drains the session's notices.
    pub fn render(&self, session: &mut ChatSession) -> Result<String, minijinja::Error> {
        let notices = session.take_notices();
        let selected = session.model();

        let view = PageView {
            notices,
            has_credential: session.has_credential(),
            models: Model::ALL
                .into_iter()
                .map(|model| ModelOption {
                    id: model.id(),
                    selected: model == selected,
                })
                .collect(),
            document: session.document().map(|document| {
                let meta = &document.metadata;
                DocumentView {
                    file_name: &meta.file_name,
                    page_count: meta.page_count,
                    size: meta.size_label(),
                    uploaded: meta.uploaded_at.format("%H:%M:%S").to_string(),
                }
            }),
            questions: session.question_count(),
            exchanges: session.exchange_count(),
            suggestions: session.suggested_questions(),
            transcript: session.transcript().iter().map(turn_view).collect(),
        };

        self.env.get_template(PAGE)?.render(&view)
    }
}

fn turn_view(turn: &ChatTurn) -> TurnView<'_> {
    TurnView {
        role: turn.role,
        content: &turn.content,
        html: match turn.role {
            Role::Assistant => Some(markdown_to_html(&turn.content)),
            Role::User => None,
        },
        sources: turn
            .sources
            .as_ref()
            .and_then(|sources| serde_json::to_string_pretty(sources).ok()),
    }
}

/// Render model output as HTML. Raw HTML in the source comes out as escaped
/// text and script or data URLs are replaced with `#`.
pub fn markdown_to_html(text: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let lowered = url.trim_start().to_ascii_lowercase();
    if ["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        CowStr::Borrowed("#")
    } else {
        url
    }
}

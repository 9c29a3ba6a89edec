use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lunyu_annotate::highlight_or_plain;
use lunyu_types::{Category, Entity, TimelineEntry, VerseEntry};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::index::FlatIndex;
use crate::paraphrase::{ParaphraseError, Paraphraser, Prompt};
use crate::query::{
    OrderMode, TagCount, ViewQuery, apply, characters_in, fresh_seed, hashtags, idioms, paginate,
};
use crate::rate_limit::RateLimiterLayer;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_QUESTION_CHARS: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<FlatIndex>,
    pub entities: Arc<[Entity]>,
    pub paraphraser: Paraphraser,
    pub max_page_size: usize,
    pub disable_cache: bool,
}

#[derive(Deserialize)]
pub struct VersesQuery {
    pub q: Option<String>,
    pub character: Option<String>,
    pub hashtag: Option<String>,
    pub idiom: Option<String>,
    pub order: Option<String>,
    pub seed: Option<u64>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Deserialize)]
pub struct CharactersQuery {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct ParaphraseRequest {
    pub verse_id: u32,
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Serialize)]
struct VerseView<'a> {
    #[serde(flatten)]
    verse: &'a VerseEntry,
    /// Annotated text with the search keyword marked.
    #[serde(skip_serializing_if = "Option::is_none")]
    highlighted_text: Option<String>,
}

#[derive(Serialize)]
pub struct VersesResponse<'a> {
    page: usize,
    page_size: usize,
    total: usize,
    has_more: bool,
    order: OrderMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    items: Vec<VerseView<'a>>,
}

#[derive(Serialize)]
struct CharacterSummary<'a> {
    #[serde(flatten)]
    entity: &'a Entity,
    verse_count: usize,
}

#[derive(Serialize)]
struct CharacterDetail<'a> {
    #[serde(flatten)]
    entity: &'a Entity,
    verse_ids: Vec<u32>,
}

#[derive(Serialize)]
struct CountsResponse {
    total: usize,
    items: Vec<TagCount>,
}

#[derive(Serialize)]
struct HistoryResponse<'a> {
    total: usize,
    items: Vec<&'a TimelineEntry>,
}

#[derive(Serialize)]
struct ParaphraseResponse<'a> {
    verse_id: u32,
    citation: &'a str,
    text: String,
}

#[derive(Serialize)]
struct AskResponse {
    question: String,
    text: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Build the app. The AI routes sit behind their own rate limiter.
pub fn router(state: AppState, ai_limiter: RateLimiterLayer) -> Router {
    let ai = Router::new()
        .route("/v1/paraphrase", post(paraphrase))
        .route("/v1/ask", post(ask))
        .layer(ai_limiter);

    Router::new()
        .route("/", get(frontend))
        .route("/history", get(history_frontend))
        .route("/robots.txt", get(robots))
        .route("/healthz", get(healthz))
        .route("/v1/verses", get(verses))
        .route("/v1/verses/{id}", get(verse))
        .route("/v1/characters", get(characters))
        .route("/v1/characters/{name}", get(character))
        .route("/v1/hashtags", get(hashtag_counts))
        .route("/v1/idioms", get(idiom_counts))
        .route("/v1/history", get(history))
        .merge(ai)
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn robots(State(state): State<AppState>) -> Response {
    let headers = axum::http::HeaderMap::from_iter([
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        ),
        (
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=86400, immutable"),
        ),
    ]);
    if state.disable_cache {
        return "User-agent: *\nAllow: /\nDisallow: /v1/".into_response();
    }
    (headers, "User-agent: *\nAllow: /\nDisallow: /v1/").into_response()
}

async fn frontend(State(state): State<AppState>) -> Response {
    cached(
        state.disable_cache,
        "public, max-age=3600",
        Html(reader_html()),
    )
}

async fn history_frontend(State(state): State<AppState>) -> Response {
    cached(
        state.disable_cache,
        "public, max-age=3600",
        Html(timeline_html()),
    )
}

fn cached(disable_cache: bool, policy: &'static str, body: impl IntoResponse) -> Response {
    if disable_cache {
        return body.into_response();
    }
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static(policy))],
        body,
    )
        .into_response()
}

fn page_params(
    page: Option<usize>,
    page_size: Option<usize>,
    max_page_size: usize,
) -> Result<(usize, usize), ApiError> {
    let page = page.unwrap_or(1);
    if page == 0 {
        return Err(ApiError::bad_request("page must be >= 1"));
    }
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err(ApiError::bad_request("page_size must be >= 1"));
    }
    Ok((page, page_size.min(max_page_size)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn verses(
    State(state): State<AppState>,
    Query(params): Query<VersesQuery>,
) -> Result<Response, ApiError> {
    let (page, page_size) = page_params(params.page, params.page_size, state.max_page_size)?;
    let mode = params
        .order
        .as_deref()
        .map(str::parse::<OrderMode>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?
        .unwrap_or_default();

    // A shuffled view is only reproducible across pages with the same seed.
    let seed = mode
        .is_shuffled()
        .then(|| params.seed.unwrap_or_else(|| fresh_seed(&mut rand::thread_rng())));
    let mut rng = ChaCha20Rng::seed_from_u64(seed.unwrap_or_default());

    let query = ViewQuery {
        keyword: non_blank(params.q),
        character: non_blank(params.character),
        hashtag: non_blank(params.hashtag),
        idiom: non_blank(params.idiom),
        mode,
    };
    let result = paginate(apply(&state.index, &query, &mut rng), page, page_size);
    let keyword = query.keyword();
    let items = result
        .items
        .into_iter()
        .map(|verse| VerseView {
            verse,
            highlighted_text: keyword.map(|kw| highlight_or_plain(&verse.annotated_text, kw)),
        })
        .collect();

    let response = VersesResponse {
        page,
        page_size,
        total: result.total,
        has_more: result.has_more,
        order: mode,
        seed,
        items,
    };
    let cacheable = !mode.is_shuffled() || params.seed.is_some();
    Ok(cached(
        state.disable_cache || !cacheable,
        "public, max-age=300",
        Json(response),
    ))
}

async fn verse(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let id: u32 = raw_id
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid verse id {raw_id:?}")))?;
    let verse = state
        .index
        .verse(id)
        .ok_or_else(|| ApiError::not_found(format!("no verse with id {id}")))?;
    Ok(cached(
        state.disable_cache,
        "public, max-age=300",
        Json(VerseView {
            verse,
            highlighted_text: None,
        }),
    ))
}

/// Accept the display label (`古人`) or the variant name (`ancient`).
fn parse_category(raw: &str) -> Option<Category> {
    let raw = raw.trim();
    Category::ALL.into_iter().find(|c| {
        c.label() == raw || format!("{c:?}").eq_ignore_ascii_case(raw)
    })
}

async fn characters(
    State(state): State<AppState>,
    Query(params): Query<CharactersQuery>,
) -> Result<Response, ApiError> {
    let category = match non_blank(params.category) {
        Some(raw) => Some(
            parse_category(&raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown category {raw:?}")))?,
        ),
        None => None,
    };
    let verses = state.index.verses();
    let items: Vec<CharacterSummary> = characters_in(&state.entities, category)
        .into_iter()
        .map(|entity| CharacterSummary {
            entity,
            verse_count: verses
                .iter()
                .filter(|v| v.mentions(&entity.canonical_name))
                .count(),
        })
        .collect();
    Ok(cached(
        state.disable_cache,
        "public, max-age=300",
        Json(json!({ "total": items.len(), "items": items })),
    ))
}

async fn character(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let entity = state
        .entities
        .iter()
        .find(|e| e.canonical_name == name)
        .ok_or_else(|| ApiError::not_found(format!("no character named {name:?}")))?;
    let verse_ids = state
        .index
        .verses()
        .iter()
        .filter(|v| v.mentions(&entity.canonical_name))
        .map(|v| v.global_id)
        .collect();
    Ok(cached(
        state.disable_cache,
        "public, max-age=300",
        Json(CharacterDetail { entity, verse_ids }),
    ))
}

async fn hashtag_counts(State(state): State<AppState>) -> Response {
    let items = hashtags(&state.index);
    cached(
        state.disable_cache,
        "public, max-age=300",
        Json(CountsResponse {
            total: items.len(),
            items,
        }),
    )
}

async fn idiom_counts(State(state): State<AppState>) -> Response {
    let items = idioms(&state.index);
    cached(
        state.disable_cache,
        "public, max-age=300",
        Json(CountsResponse {
            total: items.len(),
            items,
        }),
    )
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Response {
    let keyword = non_blank(params.q);
    let items: Vec<&TimelineEntry> = state
        .index
        .timeline()
        .iter()
        .filter(|entry| keyword.as_deref().is_none_or(|kw| entry.matches(kw)))
        .collect();
    cached(
        state.disable_cache,
        "public, max-age=300",
        Json(HistoryResponse {
            total: items.len(),
            items,
        }),
    )
}

async fn paraphrase(
    State(state): State<AppState>,
    payload: Result<Json<ParaphraseRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let verse = state
        .index
        .verse(request.verse_id)
        .ok_or_else(|| ApiError::not_found(format!("no verse with id {}", request.verse_id)))?;
    let text = state
        .paraphraser
        .run(&Prompt::for_verse(&verse.raw_text))
        .await?;
    Ok(Json(ParaphraseResponse {
        verse_id: verse.global_id,
        citation: &verse.citation,
        text,
    })
    .into_response())
}

async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("question is required"));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(ApiError::bad_request(format!(
            "question must be at most {MAX_QUESTION_CHARS} characters"
        )));
    }
    let text = state
        .paraphraser
        .run(&Prompt::for_question(question))
        .await?;
    Ok(Json(AskResponse {
        question: question.to_string(),
        text,
    })
    .into_response())
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Upstream(#[from] ParaphraseError),
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }

    fn not_found<T: Into<String>>(msg: T) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

const BASE_HTML: &str = include_str!("../templates/base.html");
const STYLE_HTML: &str = include_str!("../templates/style.html");
const HEADER_HTML: &str = include_str!("../templates/header.html");
const FOOTER_HTML: &str = include_str!("../templates/footer.html");
const READER_BODY_HTML: &str = include_str!("../templates/reader_body.html");
const TIMELINE_BODY_HTML: &str = include_str!("../templates/timeline_body.html");
const COMMON_SCRIPT: &str = include_str!("../templates/common_script.js");
const READER_SCRIPT: &str = include_str!("../templates/reader_script.js");
const TIMELINE_SCRIPT: &str = include_str!("../templates/timeline_script.js");

fn render_page(title: &str, body: &str, script: &str) -> String {
    let header = HEADER_HTML.replace("{{title}}", title);
    BASE_HTML
        .replace("{{title}}", title)
        .replace("{{style}}", STYLE_HTML)
        .replace("{{header}}", &header)
        .replace("{{body}}", body)
        .replace("{{footer}}", FOOTER_HTML)
        .replace(
            "{{scripts}}",
            &format!("<script>{COMMON_SCRIPT}\n{script}</script>"),
        )
        .replace("__MAX_QUESTION__", &MAX_QUESTION_CHARS.to_string())
}

fn reader_html() -> String {
    render_page("論語", READER_BODY_HTML, READER_SCRIPT)
}

fn timeline_html() -> String {
    render_page("孔子年表", TIMELINE_BODY_HTML, TIMELINE_SCRIPT)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

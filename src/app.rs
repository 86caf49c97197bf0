#![cfg(feature = "web")]

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use handlebars::Handlebars;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::config::Config;
use crate::content;
use crate::downloader::{ExportError, ExportFormat};
use crate::error::{IngestionError, PersistenceError, RangeError};
use crate::filter::{FilteredView, ResolvedSelection, Selection};
use crate::graph::{self, RenderError};
use crate::loader;
use crate::reflection::{ReflectionEntry, ReflectionLog};
use crate::table::{CoercionReport, Table, YearBounds, YearRange};

const SESSION_COOKIE: &str = "report_session";
const UPLOAD_FIELD: &str = "file";

/// Uploaded tables keyed by session cookie, bounded to `capacity` entries.
///
/// A table is replaced only by a successful upload. When a new session would
/// exceed the capacity, the least recently used table is dropped.
struct SessionTables {
    capacity: usize,
    clock: u64,
    tables: HashMap<String, (u64, Arc<Table>)>,
}

impl SessionTables {
    fn new(capacity: usize) -> Self {
        SessionTables {
            capacity: capacity.max(1),
            clock: 0,
            tables: HashMap::new(),
        }
    }

    fn get(&mut self, id: &str) -> Option<Arc<Table>> {
        self.clock += 1;
        let now = self.clock;
        self.tables.get_mut(id).map(|(used, table)| {
            *used = now;
            Arc::clone(table)
        })
    }

    fn insert(&mut self, id: String, table: Table) {
        self.clock += 1;
        if !self.tables.contains_key(&id) {
            while self.tables.len() >= self.capacity {
                let oldest = self
                    .tables
                    .iter()
                    .min_by_key(|(_, (used, _))| *used)
                    .map(|(id, _)| id.clone());
                match oldest {
                    Some(oldest) => {
                        self.tables.remove(&oldest);
                        debug!("dropped table of idle session {}", oldest);
                    }
                    None => break,
                }
            }
        }
        self.tables.insert(id, (self.clock, Arc::new(table)));
    }
}

pub struct AppState {
    config: Config,
    templates: Handlebars<'static>,
    sessions: Mutex<SessionTables>,
    reflections: ReflectionLog,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_template_string("report", include_str!("./static/report.hbs"))?;

        Ok(AppState {
            reflections: ReflectionLog::open(config.store_path.clone()),
            sessions: Mutex::new(SessionTables::new(config.max_sessions)),
            config,
            templates,
        })
    }

    fn table_for(&self, jar: &CookieJar) -> Option<Arc<Table>> {
        let id = jar.get(SESSION_COOKIE)?.value();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(id)
    }

    fn store_table(&self, id: String, table: Table) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(id, table);
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

#[derive(Serialize)]
struct TableSummary {
    status: String,
    file_name: Option<String>,
    index_name: String,
    occupations: Vec<String>,
    bounds: YearBounds,
    coercion: CoercionReport,
}

impl TableSummary {
    fn new(table: &Table, file_name: Option<String>) -> Result<Self, ApiError> {
        Ok(TableSummary {
            status: "ok".to_string(),
            file_name,
            index_name: table.index_name().to_string(),
            occupations: table.columns().to_vec(),
            bounds: table.year_bounds().ok_or(RangeError::NoYears)?,
            coercion: table.coercion(),
        })
    }
}

#[derive(Serialize)]
struct ViewResponse {
    occupation: String,
    range: YearRange,
    single: FilteredView,
    compare: FilteredView,
}

#[derive(Deserialize)]
struct ReflectionRequest {
    text: String,
}

#[derive(Serialize)]
struct ReflectionList {
    entries: Vec<ReflectionEntry>,
}

/// Everything a handler can fail with, mapped onto an HTTP status.
#[derive(Debug)]
enum ApiError {
    Ingestion(IngestionError),
    Range(RangeError),
    Persistence(PersistenceError),
    Render(RenderError),
    Export(ExportError),
    NoTable,
    BadRequest(String),
    Task(String),
}

impl From<IngestionError> for ApiError {
    fn from(e: IngestionError) -> Self {
        ApiError::Ingestion(e)
    }
}

impl From<RangeError> for ApiError {
    fn from(e: RangeError) -> Self {
        ApiError::Range(e)
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        ApiError::Persistence(e)
    }
}

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        ApiError::Render(e)
    }
}

impl From<ExportError> for ApiError {
    fn from(e: ExportError) -> Self {
        ApiError::Export(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Ingestion(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Range(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Export(ExportError::UnknownFormat(f)) => (
                StatusCode::BAD_REQUEST,
                ExportError::UnknownFormat(f).to_string(),
            ),
            ApiError::Export(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::Persistence(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Your reflection was not saved: {}", e),
            ),
            ApiError::Render(RenderError::NothingToRender) => {
                return StatusCode::NO_CONTENT.into_response();
            }
            ApiError::Render(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::NoTable => (
                StatusCode::CONFLICT,
                "Upload a spreadsheet first.".to_string(),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Task(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        (
            status,
            Json(StatusResponse {
                status: "error".to_string(),
                message: Some(message),
            }),
        )
            .into_response()
    }
}

/// Build the router with all report routes.
pub fn router(state: Arc<AppState>) -> Router {
    let image_dir = state.config.image_dir.clone();
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(serve_report))
        .route("/api/upload", post(upload_spreadsheet))
        .route("/api/table", get(get_table))
        .route("/api/view", get(get_view))
        .route("/api/chart/single", get(single_chart))
        .route("/api/chart/compare", get(compare_chart))
        .route("/api/export", get(export_view))
        .route(
            "/api/reflections",
            get(list_reflections).post(submit_reflection),
        )
        .nest_service("/image", ServeDir::new(image_dir))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

/// Run synchronous work (file locks, workbook parsing, chart drawing) on the
/// blocking pool so it never holds up an async worker.
async fn blocking<T, E, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Task(format!("background task failed: {}", e)))?
        .map_err(Into::into)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.addr;
    let store = config.store_path.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("listening on http://{}", addr);
    info!("reflections are stored in {}", store.display());
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_report(State(state): State<Arc<AppState>>) -> Response {
    let data = serde_json::json!({ "content": content::report() });
    match state.templates.render("report", &data) {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            warn!("report template failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render report").into_response()
        }
    }
}

async fn upload_spreadsheet(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<(CookieJar, Json<TableSummary>), ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        upload = Some((file_name, bytes.to_vec()));
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No file data received".to_string()))?;

    let name = file_name.clone();
    let table = blocking(move || {
        loader::load_workbook(&bytes, &name).map_err(|e| {
            warn!("rejected upload {}: {}", name, e);
            e
        })
    })
    .await?;
    let summary = TableSummary::new(&table, Some(file_name))?;

    let (jar, id) = match jar.get(SESSION_COOKIE) {
        Some(cookie) => {
            let id = cookie.value().to_string();
            (jar, id)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
                .path("/")
                .http_only(true);
            (jar.add(cookie), id)
        }
    };
    state.store_table(id, table);

    Ok((jar, Json(summary)))
}

async fn get_table(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<TableSummary>, ApiError> {
    let table = state.table_for(&jar).ok_or(ApiError::NoTable)?;
    Ok(Json(TableSummary::new(&table, None)?))
}

/// Turn raw query pairs into a [`Selection`].
///
/// `compare` may repeat; `compare=` with an empty value marks an explicit empty
/// selection, while no `compare` key at all means "same as `occupation`".
fn parse_selection(pairs: &[(String, String)]) -> Result<Selection, ApiError> {
    let mut selection = Selection::default();
    let mut compare: Option<Vec<String>> = None;

    for (key, value) in pairs {
        match key.as_str() {
            "occupation" => selection.occupation = Some(value.clone()),
            "compare" => {
                let names = compare.get_or_insert_with(Vec::new);
                if !value.is_empty() {
                    names.push(value.clone());
                }
            }
            "start" => selection.start = Some(parse_year("start", value)?),
            "end" => selection.end = Some(parse_year("end", value)?),
            _ => {}
        }
    }

    selection.compare = compare;
    Ok(selection)
}

fn parse_year(key: &str, value: &str) -> Result<i64, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("{} must be a year, got {:?}", key, value)))
}

fn resolve(
    state: &AppState,
    jar: &CookieJar,
    pairs: &[(String, String)],
) -> Result<(Arc<Table>, ResolvedSelection), ApiError> {
    let table = state.table_for(jar).ok_or(ApiError::NoTable)?;
    let selection = parse_selection(pairs)?.resolve(&table)?;
    Ok((table, selection))
}

async fn get_view(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ViewResponse>, ApiError> {
    let (table, selection) = resolve(&state, &jar, &pairs)?;

    Ok(Json(ViewResponse {
        single: selection.single_view(&table)?,
        compare: selection.compare_view(&table)?,
        occupation: selection.occupation,
        range: selection.range,
    }))
}

fn png(bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    )
        .into_response()
}

async fn single_chart(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let (table, selection) = resolve(&state, &jar, &pairs)?;
    let (width, height) = (state.config.chart_width, state.config.chart_height);
    let bytes = blocking(move || -> Result<Vec<u8>, ApiError> {
        let view = selection.single_view(&table)?;
        let options = graph::single_options(&view, &selection.occupation, width, height);
        Ok(graph::create_line_graph(&view, &options)?)
    })
    .await?;
    Ok(png(bytes))
}

async fn compare_chart(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let (table, selection) = resolve(&state, &jar, &pairs)?;
    let (width, height) = (state.config.chart_width, state.config.chart_height);
    let bytes = blocking(move || -> Result<Vec<u8>, ApiError> {
        let view = selection.compare_view(&table)?;
        let options = graph::compare_options(&view, width, height);
        Ok(graph::create_line_graph(&view, &options)?)
    })
    .await?;
    Ok(png(bytes))
}

async fn export_view(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let format = pairs
        .iter()
        .find(|(key, _)| key == "format")
        .map(|(_, value)| ExportFormat::parse(value))
        .unwrap_or(Ok(ExportFormat::Csv))?;

    let (table, selection) = resolve(&state, &jar, &pairs)?;
    let range = selection.range;
    let body = blocking(move || -> Result<Vec<u8>, ApiError> {
        let view = selection.compare_view(&table)?;
        Ok(format.render(&view)?)
    })
    .await?;

    let disposition = format!(
        "attachment; filename=\"occupations_{}_{}.{}\"",
        range.start,
        range.end,
        format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn list_reflections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReflectionList>, ApiError> {
    let entries = blocking(move || state.reflections.entries()).await?;
    Ok(Json(ReflectionList { entries }))
}

async fn submit_reflection(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReflectionRequest>,
) -> Result<Response, ApiError> {
    let receipt = blocking(move || state.reflections.submit(&payload.text)).await?;
    Ok(Json(receipt).into_response())
}

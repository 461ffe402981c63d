//! HTML and JSON surface over the current view state.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::filter::parse_end_date;
use crate::market::Market;
use crate::view::{ViewState, ViewStateSource};

pub const PAGE_TITLE: &str = "Polymarket";
pub const PAGE_SUBTITLE: &str = "Markets Expiring Today";
pub const LOADING_TEXT: &str = "Loading markets...";
pub const EMPTY_TEXT: &str = "No markets found expiring today.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCard {
    pub id: String,
    pub question: String,
    pub img_url: Option<String>,
    pub end_date: Option<String>,
    pub expires: String,
}

impl MarketCard {
    pub fn from_market(market: &Market) -> Self {
        Self {
            id: market.id.clone(),
            question: market.question.clone(),
            img_url: market.img_url.clone(),
            end_date: market.end_date.clone(),
            expires: format_expiry(market.end_date.as_deref()),
        }
    }
}

/// JSON form of [`ViewState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StateView {
    Loading,
    Ready {
        evaluated_at: String,
        markets: Vec<MarketCard>,
    },
    Failed {
        error_kind: &'static str,
        error: String,
    },
}

impl StateView {
    pub fn from_state(state: &ViewState) -> Self {
        match state {
            ViewState::Loading => StateView::Loading,
            ViewState::Ready {
                markets,
                evaluated_at,
            } => StateView::Ready {
                evaluated_at: evaluated_at.to_rfc3339(),
                markets: markets.iter().map(MarketCard::from_market).collect(),
            },
            ViewState::Failed { error } => StateView::Failed {
                error_kind: error.kind(),
                error: error.to_string(),
            },
        }
    }
}

pub fn dashboard_router(source: Arc<dyn ViewStateSource>) -> Router {
    Router::new()
        .route("/", get(get_page))
        .route("/state", get(get_state))
        .route("/reload", post(post_reload))
        .with_state(DashboardAppState { source })
}

pub fn format_expiry(end_date: Option<&str>) -> String {
    end_date
        .and_then(parse_end_date)
        .map(|end| end.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn render_page(state: &ViewState) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    if matches!(state, ViewState::Loading) {
        out.push_str("<meta http-equiv=\"refresh\" content=\"1\">\n");
    }
    out.push_str(&format!("<title>{PAGE_TITLE} - {PAGE_SUBTITLE}</title>\n"));
    out.push_str("<style>*{box-sizing:border-box}body{margin:0;min-height:100vh;background:#111827;color:#f9fafb;font-family:\"Inter\",\"Segoe UI\",sans-serif}.center{min-height:100vh;display:flex;align-items:center;justify-content:center}.error{color:#ef4444}.shell{padding:32px}header{margin-bottom:32px;text-align:center}header h1{margin:0;font-size:2.25rem}header h2{margin:4px 0 0;font-size:1.5rem;color:#9ca3af}.grid{display:grid;gap:24px;grid-template-columns:repeat(auto-fill,minmax(260px,1fr))}.market-card{background:#1f2937;border-radius:8px;overflow:hidden;box-shadow:0 10px 20px rgba(0,0,0,.3);transition:transform .15s}.market-card:hover{transform:translateY(-4px)}.market-card img{width:100%;height:160px;object-fit:cover;display:block;background:#374151}.market-body{padding:16px}.market-body h3{margin:0 0 8px;font-size:1.1rem}.expires{margin:0;font-size:.85rem;color:#9ca3af}.empty{text-align:center;color:#6b7280}</style>\n");
    out.push_str("</head><body>\n");

    match state {
        ViewState::Loading => {
            out.push_str("<div class=\"center\" id=\"loading\">");
            out.push_str(LOADING_TEXT);
            out.push_str("</div>\n");
        }
        ViewState::Failed { error } => {
            out.push_str("<div class=\"center error\" id=\"error\">Error: ");
            out.push_str(&escape_html(&error.to_string()));
            out.push_str("</div>\n");
        }
        ViewState::Ready { markets, .. } => {
            out.push_str("<div class=\"shell\"><header>");
            out.push_str(&format!("<h1>{PAGE_TITLE}</h1><h2>{PAGE_SUBTITLE}</h2>"));
            out.push_str("</header><main>\n");
            if markets.is_empty() {
                out.push_str("<p class=\"empty\">");
                out.push_str(EMPTY_TEXT);
                out.push_str("</p>\n");
            } else {
                out.push_str("<div class=\"grid\">\n");
                for market in markets {
                    render_card(&mut out, &MarketCard::from_market(market));
                }
                out.push_str("</div>\n");
            }
            out.push_str("</main></div>\n");
        }
    }

    out.push_str("</body></html>\n");
    out
}

fn render_card(out: &mut String, card: &MarketCard) {
    out.push_str("<div class=\"market-card\" data-market-id=\"");
    out.push_str(&escape_html(&card.id));
    out.push_str("\">");
    out.push_str("<img src=\"");
    out.push_str(&escape_html(card.img_url.as_deref().unwrap_or("")));
    out.push_str("\" alt=\"");
    out.push_str(&escape_html(&card.question));
    out.push_str("\">");
    out.push_str("<div class=\"market-body\"><h3>");
    out.push_str(&escape_html(&card.question));
    out.push_str("</h3><p class=\"expires\">Expires: ");
    out.push_str(&escape_html(&card.expires));
    out.push_str("</p></div></div>\n");
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Clone)]
struct DashboardAppState {
    source: Arc<dyn ViewStateSource>,
}

async fn get_page(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let view = state.source.state();
    info!(
        component = "dashboard",
        event = "http.page.request",
        state = view.label()
    );
    Html(render_page(&view))
}

async fn get_state(State(state): State<DashboardAppState>) -> impl IntoResponse {
    let view = state.source.state();
    info!(
        component = "dashboard",
        event = "http.state.request",
        state = view.label()
    );
    Json(StateView::from_state(&view))
}

async fn post_reload(State(state): State<DashboardAppState>) -> impl IntoResponse {
    info!(component = "dashboard", event = "http.reload.request");
    state.source.reload();
    StatusCode::ACCEPTED
}

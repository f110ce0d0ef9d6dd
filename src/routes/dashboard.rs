use axum::response::Html;

const DASHBOARD_PAGE: &str = include_str!("../../static/dashboard.html");

pub async fn index() -> Html<&'static str> {
    Html(DASHBOARD_PAGE)
}

use crate::domain::permissions::Action;
use crate::error::{AppError, AppResult};
use crate::services::reports::{self, Engagement};
use crate::state::SharedState;
use crate::web::extract::Json;
use crate::web::session::AuthUser;
use crate::web::{success, Success};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;

const CSV_FILE: &str = "civic_engagement_report.csv";
const PDF_FILE: &str = "civic_engagement_report.pdf";

#[derive(Serialize)]
pub struct EngagementResponse {
    pub data: Engagement,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/engagement", get(engagement))
        .route("/export/csv", get(export_csv))
        .route("/export/pdf", get(export_pdf))
        .with_state(state)
}

fn attachment(content_type: &'static str, file: &str, bytes: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file}\""),
            ),
        ],
        bytes,
    )
}

async fn engagement(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> AppResult<Json<Success<EngagementResponse>>> {
    auth.require(Action::ViewReports)?;
    let data = reports::engagement(state.store.as_ref()).await?;
    Ok(success(EngagementResponse { data }))
}

async fn export_csv(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> AppResult<impl IntoResponse> {
    auth.require(Action::ViewReports)?;
    let rows = reports::report_rows(state.store.as_ref()).await?;
    let bytes = reports::to_csv(&rows).map_err(|e| AppError::Internal(e.to_string()))?;
    tracing::info!("CSV report exported by {} ({} rows)", auth.id(), rows.len());
    Ok(attachment("text/csv", CSV_FILE, bytes))
}

async fn export_pdf(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> AppResult<impl IntoResponse> {
    auth.require(Action::ViewReports)?;
    let rows = reports::report_rows(state.store.as_ref()).await?;
    tracing::info!("PDF report exported by {} ({} rows)", auth.id(), rows.len());
    Ok(attachment("application/pdf", PDF_FILE, reports::to_pdf(&rows)))
}

#[cfg(test)]
mod tests {
    use crate::domain::models::UserRole;
    use crate::web::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    async fn seed(app: &TestApp) -> String {
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        app.call(
            Method::POST,
            "/api/complaints",
            Some(&citizen),
            Some(json!({
                "title": "Garbage not collected",
                "description": "Bins on 3rd Main have not been emptied for days",
                "category": "waste_management",
                "location": { "city": "Mysuru" }
            })),
        )
        .await;
        app.call(
            Method::POST,
            "/api/petitions",
            Some(&citizen),
            Some(json!({
                "title": "More buses on route 201",
                "description": "Commuters wait over forty minutes during peak hours",
                "category": "transport",
                "location": "Mysuru"
            })),
        )
        .await;
        official
    }

    #[tokio::test]
    async fn engagement_counts_by_status() {
        let app = TestApp::new();
        let official = seed(&app).await;

        let (status, body) = app
            .call(Method::GET, "/api/reports/engagement", Some(&official), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["complaints"][0]["status"], "received");
        assert_eq!(body["data"]["complaints"][0]["total"], 1);
        assert_eq!(body["data"]["petitions"][0]["total"], 1);
        assert!(body["data"]["polls"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn citizens_cannot_export() {
        let app = TestApp::new();
        seed(&app).await;
        let (_, citizen) = app.user(UserRole::Citizen, "other@example.com").await;

        let (status, _) = app.raw(Method::GET, "/api/reports/export/csv", &citizen).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn csv_and_pdf_exports() {
        let app = TestApp::new();
        let official = seed(&app).await;

        let (status, csv) = app.raw(Method::GET, "/api/reports/export/csv", &official).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(csv).unwrap();
        assert!(text.starts_with("type,title,category,status,location,createdAt"));
        assert!(text.contains("Complaint,Garbage not collected,waste_management,received,Mysuru"));
        assert!(text.contains("Petition,More buses on route 201,transport"));

        let (status, pdf) = app.raw(Method::GET, "/api/reports/export/pdf", &official).await;
        assert_eq!(status, StatusCode::OK);
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
    }
}

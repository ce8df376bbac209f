use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::status::CoreStatus;
use crate::documents::{render_docx, render_pdf, RenderedDocument, StructuredDocument, TemplateId};
use crate::server::handlers::upload::Upload;
use crate::state::AppState;

/// Prompt warnings for responses whose body is a file.
const WARNINGS_HEADER: &str = "x-sahayak-warnings";

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Docx,
    Pdf,
}

#[derive(Debug, Deserialize)]
pub struct LegalNoticeRequest {
    pub voice_input: String,
    #[serde(default)]
    pub format: OutputFormat,
}

pub async fn legal_notice(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LegalNoticeRequest>,
) -> Result<Response, ApiError> {
    let draft = state.assistant.extract_notice(&payload.voice_input).await?;
    let response = match payload.format {
        OutputFormat::Json => {
            return Ok(Json(json!({
                "status": CoreStatus::Success,
                "data": draft.document.fields,
                "warnings": draft.warnings,
            }))
            .into_response())
        }
        OutputFormat::Docx => attachment(render_docx(&draft.document)?),
        OutputFormat::Pdf => attachment(render_pdf(&draft.document)?),
    };
    Ok(with_warnings(response, &draft.warnings))
}

#[derive(Debug, Deserialize)]
pub struct RentAgreementRequest {
    pub landlord: String,
    pub tenant: String,
    pub rent: String,
    pub address: String,
    pub date: String,
}

pub async fn rent_agreement(Json(payload): Json<RentAgreementRequest>) -> Result<Response, ApiError> {
    let fields: BTreeMap<&str, String> = [
        ("landlord", payload.landlord),
        ("tenant", payload.tenant),
        ("rent", payload.rent),
        ("address", payload.address),
        ("date", payload.date),
    ]
    .into_iter()
    .collect();
    let document = StructuredDocument::new(TemplateId::RentAgreement, fields);
    Ok(attachment(render_docx(&document)?))
}

/// Raw PDF request body.
pub async fn dossier(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("request body must contain a PDF".to_string()));
    }
    let analysis = state.assistant.analyze_dossier(body.to_vec()).await?;
    Ok(Json(analysis))
}

/// Multipart body with a `file` part holding a photo of the FIR.
pub async fn analyze_fir(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (file, _) = Upload::read(multipart).await?.require_file()?;
    let analysis = state
        .assistant
        .analyze_fir(file.bytes, file.content_type.as_deref())
        .await?;
    Ok(Json(analysis))
}

fn with_warnings(mut response: Response, warnings: &[String]) -> Response {
    if warnings.is_empty() {
        return response;
    }
    match HeaderValue::from_str(&warnings.join("; ")) {
        Ok(value) => {
            response.headers_mut().insert(WARNINGS_HEADER, value);
        }
        Err(_) => tracing::debug!("Warnings not representable as a header value"),
    }
    response
}

fn attachment(rendered: RenderedDocument) -> Response {
    (
        [
            (header::CONTENT_TYPE, rendered.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", rendered.filename),
            ),
        ],
        rendered.bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_responses_carry_warnings_in_a_header() {
        let response = with_warnings(
            "body".into_response(),
            &["2 earlier conversation turn(s) were left out".to_string()],
        );
        assert_eq!(
            response.headers()[WARNINGS_HEADER],
            "2 earlier conversation turn(s) were left out"
        );
        assert!(with_warnings("body".into_response(), &[])
            .headers()
            .get(WARNINGS_HEADER)
            .is_none());
    }

    #[test]
    fn pdf_is_an_accepted_format() {
        let request: LegalNoticeRequest =
            serde_json::from_str(r#"{"voice_input":"x","format":"pdf"}"#).unwrap();
        assert!(matches!(request.format, OutputFormat::Pdf));
    }
}

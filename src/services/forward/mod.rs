pub mod factory;
pub mod primary;
pub mod secondary;
pub mod types;

pub use factory::{build_primary_router, build_secondary_router};
pub use primary::{ExecuteOptions, PrimaryRouter};
pub use secondary::SecondaryRouter;
pub use types::{ForwardError, ForwardFailure, ForwardRequest, Reply};

use axum::{body::Bytes, http::header};

// Encode, send and read the whole body. Status classification is the caller's job.
pub(crate) async fn send(
    client: &reqwest::Client,
    base_url: &str,
    req: &ForwardRequest,
    with_authorization: bool,
) -> Result<(reqwest::StatusCode, Bytes), ForwardError> {
    let payload = serde_json::to_vec(&req.payload)?;
    let url = format!("{}{}", base_url, req.endpoint);

    let builder = client
        .request(req.method.clone(), url)
        .header(header::CONTENT_TYPE, "application/json")
        .body(payload);

    let resp = req.headers.apply(builder, with_authorization).send().await?;
    let status = resp.status();
    let body = resp.bytes().await?;

    Ok((status, body))
}

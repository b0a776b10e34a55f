//! `reqwest` implementation of [`Backend`].

use super::types::{
    filename_from_disposition, ExportRequest, ExportResponse, ProcessRequest, ProjectDetail,
    ProjectList, ResultFile, StatusReply, StatusResponse, UploadResponse,
};
use super::Backend;
use crate::config::SessionConfig;
use crate::error::CutlineError;
use async_trait::async_trait;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// HTTP client for the conversion backend and the OCR service.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    backend_url: Url,
    ocr_url: Url,
}

impl HttpBackend {
    pub fn new(config: &SessionConfig) -> Result<Self, CutlineError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CutlineError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            backend_url: parse_base(&config.backend_url)?,
            ocr_url: parse_base(&config.ocr_url)?,
        })
    }

    fn backend(&self, segments: &[&str]) -> Url {
        join(&self.backend_url, segments)
    }

    fn ocr(&self, segments: &[&str]) -> Url {
        join(&self.ocr_url, segments)
    }
}

fn parse_base(url: &str) -> Result<Url, CutlineError> {
    let parsed =
        Url::parse(url).map_err(|e| CutlineError::InvalidConfig(format!("'{url}': {e}")))?;
    if parsed.cannot_be_a_base() {
        return Err(CutlineError::InvalidConfig(format!(
            "'{url}' cannot be used as a base URL"
        )));
    }
    Ok(parsed)
}

/// Append path segments to a base URL, percent-encoding each one.
fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Send a request and turn transport failures and error statuses into
/// [`CutlineError::Network`].
async fn send(request: reqwest::RequestBuilder, url: &Url) -> Result<Response, CutlineError> {
    let response = request.send().await.map_err(|e| network(url, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(CutlineError::Network {
            endpoint: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }
    Ok(response)
}

async fn json<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T, CutlineError> {
    response.json::<T>().await.map_err(|e| CutlineError::Decode {
        endpoint: url.to_string(),
        reason: e.to_string(),
    })
}

fn network(url: &Url, e: reqwest::Error) -> CutlineError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    CutlineError::Network {
        endpoint: url.to_string(),
        reason,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_projects(&self) -> Result<Vec<String>, CutlineError> {
        let url = self.backend(&["api", "projects"]);
        let response = send(self.client.get(url.clone()), &url).await?;
        let list: ProjectList = json(response, &url).await?;
        Ok(list
            .projects
            .into_iter()
            .map(|p| p.name().to_string())
            .collect())
    }

    async fn set_project(&self, name: &str) -> Result<ProjectDetail, CutlineError> {
        let url = self.backend(&["api", "set-project", name]);
        info!("Activating project {}", name);
        let response = send(self.client.post(url.clone()), &url).await?;
        json(response, &url).await
    }

    async fn upload_pdf(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse, CutlineError> {
        let url = self.backend(&["api", "upload"]);
        info!("Uploading {} ({} bytes)", filename, bytes.len());
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| network(&url, e))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = send(self.client.post(url.clone()).multipart(form), &url).await?;
        json(response, &url).await
    }

    async fn export_lines(&self, request: &ExportRequest<'_>) -> Result<ExportResponse, CutlineError> {
        let url = self.backend(&["api", "export-lines"]);
        let response = send(self.client.post(url.clone()).json(request), &url).await?;
        json(response, &url).await
    }

    async fn fetch_image(&self, image: &str) -> Result<Vec<u8>, CutlineError> {
        let url = self.backend(&["api", "images", image]);
        let response = send(self.client.get(url.clone()), &url).await?;
        let bytes = response.bytes().await.map_err(|e| network(&url, e))?;
        debug!("Fetched {} ({} bytes)", image, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn start_job(&self, request: &ProcessRequest<'_>) -> Result<(), CutlineError> {
        let url = self.ocr(&["api", "process"]);
        info!("Starting OCR for project {}", request.project);
        send(self.client.post(url.clone()).json(request), &url).await?;
        Ok(())
    }

    async fn job_status(&self, project: &str) -> Result<StatusReply, CutlineError> {
        let url = self.ocr(&["api", "process-status", project]);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| network(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Ok(StatusReply::Unavailable {
                http_status: status.as_u16(),
            });
        }
        let body: StatusResponse = json(response, &url).await?;
        Ok(StatusReply::Status(body))
    }

    async fn download_result(&self, project: &str) -> Result<ResultFile, CutlineError> {
        let url = self.ocr(&["api", "download-excel", project]);
        let response = send(self.client.get(url.clone()), &url).await?;
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition);
        let bytes = response.bytes().await.map_err(|e| network(&url, e))?;
        info!("Downloaded result for {} ({} bytes)", project, bytes.len());
        Ok(ResultFile {
            filename,
            bytes: bytes.to_vec(),
        })
    }
}

use std::path::PathBuf;

use async_trait::async_trait;
use axum::http::Method;

use super::{Resource, RouteDecl};
use crate::errors::{BackendError, Result};
use crate::request::{FileDownload, Payload, Request};

pub const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";
pub const APK_FILENAME: &str = "client.apk";

actions!(Action {
    DownloadApk => "downloadAPK",
});

pub struct DownloadController {
    apk_path: PathBuf,
}

impl DownloadController {
    pub fn new(apk_path: PathBuf) -> Self {
        Self { apk_path }
    }
}

#[async_trait]
impl Resource for DownloadController {
    fn name(&self) -> &'static str {
        "download"
    }

    fn routes(&self) -> Vec<RouteDecl> {
        vec![RouteDecl::new(Method::GET, "/client.apk", "downloadAPK").root()]
    }

    fn handles(&self, action: &str) -> bool {
        Action::from_name(action).is_some()
    }

    async fn init(&self) -> Result<()> {
        if tokio::fs::metadata(&self.apk_path).await.is_err() {
            tracing::warn!(path = %self.apk_path.display(), "Client APK not found, downloads will fail");
        }
        Ok(())
    }

    async fn call(&self, action: &str, req: &Request) -> Result<Payload> {
        match Action::from_name(action) {
            Some(Action::DownloadApk) => Ok(Payload::File(
                FileDownload::open(self.apk_path.clone(), APK_FILENAME, APK_CONTENT_TYPE).await?,
            )),
            None => Err(BackendError::MissingAction {
                path: req.raw().path.clone(),
                resource: self.name().to_string(),
                action: action.to_string(),
            }),
        }
    }
}

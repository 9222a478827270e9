//! Department-wide views that sit beside the per-post pipeline: open and past posts,
//! resolved candidates, the selected-candidates export, analytics and notices.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pipeline::domain::{CandidateRecord, Post, PostId};
use crate::remote::{
    DepartmentAnalytics, DepartmentNotice, GatewayError, PlacementGateway, RestoreResponse,
};
use crate::session::Session;

#[derive(Debug)]
pub enum DepartmentError {
    Gateway(GatewayError),
    Csv(csv::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for DepartmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepartmentError::Gateway(err) => write!(f, "placement service call failed: {}", err),
            DepartmentError::Csv(err) => write!(f, "invalid selected-candidates export: {}", err),
            DepartmentError::Io(err) => write!(f, "failed to write export: {}", err),
        }
    }
}

impl std::error::Error for DepartmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DepartmentError::Gateway(err) => Some(err),
            DepartmentError::Csv(err) => Some(err),
            DepartmentError::Io(err) => Some(err),
        }
    }
}

impl From<GatewayError> for DepartmentError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway(err)
    }
}

impl From<csv::Error> for DepartmentError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<std::io::Error> for DepartmentError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// One row of the selected-candidates export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub selected_at: Option<String>,
}

/// Export bytes exactly as served, plus the rows they contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedExport {
    pub bytes: Vec<u8>,
    pub rows: Vec<ExportRow>,
}

impl SelectedExport {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, csv::Error> {
        let rows = parse_rows(bytes.as_slice())?;
        Ok(Self { bytes, rows })
    }

    /// Writes the untouched bytes so the file matches what the service produced.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        std::fs::write(path, &self.bytes)
    }
}

fn parse_rows<R: Read>(reader: R) -> Result<Vec<ExportRow>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv_reader.deserialize::<ExportRow>().collect()
}

/// Read-mostly department views. Nothing here is cached; every call goes to the service.
pub struct DepartmentDirectory<G: ?Sized> {
    session: Session,
    gateway: Arc<G>,
}

impl<G> DepartmentDirectory<G>
where
    G: PlacementGateway + ?Sized,
{
    pub fn new(session: Session, gateway: Arc<G>) -> Self {
        Self { session, gateway }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn department(&self) -> &str {
        self.session.department_id()
    }

    pub async fn posts(&self) -> Result<Vec<Post>, DepartmentError> {
        let posts = self.gateway.list_posts(self.department()).await?;
        debug!(department = self.department(), posts = posts.len(), "active posts listed");
        Ok(posts)
    }

    pub async fn past_posts(&self) -> Result<Vec<Post>, DepartmentError> {
        Ok(self.gateway.past_posts(self.department()).await?)
    }

    pub async fn restore(&self, post_id: &PostId) -> Result<RestoreResponse, DepartmentError> {
        let response = self
            .gateway
            .restore_post(self.department(), post_id)
            .await
            .inspect_err(|err| warn!(post_id = %post_id, error = %err, "post restore failed"))?;
        info!(post_id = %post_id, "post restored");
        Ok(response)
    }

    pub async fn selected(&self) -> Result<Vec<CandidateRecord>, DepartmentError> {
        Ok(self.gateway.selected(self.department()).await?)
    }

    pub async fn rejected(&self) -> Result<Vec<CandidateRecord>, DepartmentError> {
        Ok(self.gateway.rejected(self.department()).await?)
    }

    pub async fn export_selected(&self) -> Result<SelectedExport, DepartmentError> {
        let bytes = self.gateway.export_selected(self.department()).await?;
        let export = SelectedExport::from_bytes(bytes)?;
        info!(
            department = self.department(),
            rows = export.rows.len(),
            "selected candidates exported"
        );
        Ok(export)
    }

    pub async fn analytics(&self) -> Result<DepartmentAnalytics, DepartmentError> {
        Ok(self.gateway.analytics(self.department()).await?)
    }

    pub async fn notifications(&self) -> Result<Vec<DepartmentNotice>, DepartmentError> {
        Ok(self.gateway.notifications(self.department()).await?)
    }
}

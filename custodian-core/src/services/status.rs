//! Status service - store counts and the latest import

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::domain::{ImportSession, SessionStatus};
use crate::ports::Repository;

pub struct StatusService {
    repository: Arc<dyn Repository>,
}

impl StatusService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    pub fn get_status(&self) -> Result<StatusSummary> {
        let institutions = self.repository.get_institutions()?;
        let accounts = self.repository.get_accounts(None)?;
        let instruments = self.repository.get_instruments()?;
        let positions = self.repository.get_positions(None)?;
        let last_session = self.repository.get_sessions(1)?.into_iter().next();

        let dates = positions.iter().map(|p| p.position.as_of_date);
        let date_range = DateRange {
            earliest: dates.clone().min().map(|d| d.to_string()),
            latest: dates.max().map(|d| d.to_string()),
        };

        Ok(StatusSummary {
            total_institutions: institutions.len(),
            total_accounts: accounts.len(),
            total_instruments: instruments.len(),
            total_positions: positions.len(),
            institutions: institutions
                .into_iter()
                .map(|i| InstitutionSummary {
                    accounts: accounts.iter().filter(|a| a.institution_id == i.id).count(),
                    positions: positions
                        .iter()
                        .filter(|p| p.position.institution_id == i.id)
                        .count(),
                    code: i.code,
                    name: i.name,
                })
                .collect(),
            date_range,
            last_session: last_session.map(SessionSummary::from),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total_institutions: usize,
    pub total_accounts: usize,
    pub total_instruments: usize,
    pub total_positions: usize,
    pub institutions: Vec<InstitutionSummary>,
    pub date_range: DateRange,
    pub last_session: Option<SessionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionSummary {
    pub code: String,
    pub name: String,
    pub accounts: usize,
    pub positions: usize,
}

/// Statement dates covered by stored positions
#[derive(Debug, Serialize)]
pub struct DateRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_name: String,
    pub status: SessionStatus,
    pub finished_at: Option<String>,
    pub successful_rows: usize,
    pub failed_rows: usize,
}

impl From<ImportSession> for SessionSummary {
    fn from(session: ImportSession) -> Self {
        Self {
            session_name: session.session_name,
            status: session.status,
            finished_at: session
                .completed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string()),
            successful_rows: session.successful_rows,
            failed_rows: session.failed_rows,
        }
    }
}

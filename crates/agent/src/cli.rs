//! Shared `--recruiters id,id,...` surface (§6 External Interfaces), used by
//! all four binaries so an operator can scope a run to a subset of
//! recruiters without touching the database.

use clap::Parser;
use recruiting_common::RecruiterId;

#[derive(Debug, Parser)]
pub struct RecruiterFilter {
    /// Comma-separated recruiter ids to restrict this run to. Omit to run
    /// against every active recruiter.
    #[arg(long, value_delimiter = ',')]
    recruiters: Vec<String>,
}

impl RecruiterFilter {
    /// Parses the raw `--recruiters` argument into ids, or `None` if the
    /// flag was not passed (meaning: every active recruiter).
    pub fn ids(&self) -> anyhow::Result<Option<Vec<RecruiterId>>> {
        if self.recruiters.is_empty() {
            return Ok(None);
        }
        let ids = self
            .recruiters
            .iter()
            .map(|raw| raw.trim().parse::<RecruiterId>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(ids))
    }
}

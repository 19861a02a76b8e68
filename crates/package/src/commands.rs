//! Command lines of the packaging tools

use chrono::{DateTime, Utc};
use sipforge_types::{ProvenanceEvent, RecordStatus};
use std::path::Path;

fn arg(path: &Path) -> String {
    path.display().to_string()
}

/// `import-object` for one payload file, with `file` relative to `sip_dir`
#[must_use]
pub fn import_object(
    sip_dir: &Path,
    workspace: &Path,
    identifier_type: &str,
    identifier: &str,
    file: &Path,
) -> Vec<String> {
    vec![
        "import-object".to_string(),
        "--base_path".to_string(),
        arg(sip_dir),
        "--workspace".to_string(),
        arg(workspace),
        "--identifier".to_string(),
        identifier_type.to_string(),
        identifier.to_string(),
        arg(file),
    ]
}

#[must_use]
pub fn create_mix(sip_dir: &Path, workspace: &Path, file: &Path) -> Vec<String> {
    vec![
        "create-mix".to_string(),
        "--base_path".to_string(),
        arg(sip_dir),
        "--workspace".to_string(),
        arg(workspace),
        arg(file),
    ]
}

#[must_use]
pub fn premis_event(
    sip_dir: &Path,
    workspace: &Path,
    agent_name: &str,
    event: &ProvenanceEvent,
) -> Vec<String> {
    let mut command = vec![
        "premis-event".to_string(),
        "--base_path".to_string(),
        arg(sip_dir),
        "--workspace".to_string(),
        arg(workspace),
        "--event_detail".to_string(),
        event.detail.clone(),
        "--event_outcome".to_string(),
        event.outcome.as_str().to_string(),
        "--agent_name".to_string(),
        agent_name.to_string(),
        "--agent_type".to_string(),
        "software".to_string(),
    ];
    if let Some(target) = &event.target {
        command.push("--event_target".to_string());
        command.push(arg(target));
    }
    if let Some(detail) = &event.outcome_detail {
        command.push("--event_outcome_detail".to_string());
        command.push(detail.clone());
    }
    command.push(event.event_type.as_str().to_string());
    command.push(event.timestamp.to_rfc3339());
    command
}

#[must_use]
pub fn import_description(workspace: &Path, description: &Path) -> Vec<String> {
    vec![
        "import-description".to_string(),
        "--workspace".to_string(),
        arg(workspace),
        arg(description),
    ]
}

#[must_use]
pub fn compile_structmap(workspace: &Path) -> Vec<String> {
    vec![
        "compile-structmap".to_string(),
        "--workspace".to_string(),
        arg(workspace),
    ]
}

/// Arguments of `compile-mets`
#[derive(Debug, Clone)]
pub struct CompileMets<'a> {
    pub sip_dir: &'a Path,
    pub workspace: &'a Path,
    pub objid: &'a str,
    pub contentid: &'a str,
    pub status: RecordStatus,
    pub create_date: DateTime<Utc>,
    pub modify_date: Option<DateTime<Utc>>,
    pub organization_name: &'a str,
    pub contract_id: &'a str,
}

impl CompileMets<'_> {
    #[must_use]
    pub fn command(&self) -> Vec<String> {
        let mut command = vec![
            "compile-mets".to_string(),
            "--workspace".to_string(),
            arg(self.workspace),
            "--base_path".to_string(),
            arg(self.sip_dir),
            "--objid".to_string(),
            self.objid.to_string(),
            "--contentid".to_string(),
            self.contentid.to_string(),
            "--record_status".to_string(),
            self.status.as_str().to_string(),
            "--create_date".to_string(),
            self.create_date.to_rfc3339(),
        ];
        if let Some(modified) = self.modify_date {
            command.push("--last_moddate".to_string());
            command.push(modified.to_rfc3339());
        }
        // "ch" selects the cultural heritage METS profile
        command.extend([
            "--clean".to_string(),
            "ch".to_string(),
            self.organization_name.to_string(),
            self.contract_id.to_string(),
        ]);
        command
    }
}

#[must_use]
pub fn sign_mets(workspace: &Path, key_path: &Path) -> Vec<String> {
    vec![
        "sign-mets".to_string(),
        "--workspace".to_string(),
        arg(workspace),
        arg(key_path),
    ]
}

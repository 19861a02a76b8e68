//! Assembling a downloaded package into a signed SIP archive
//!
//! Stages run strictly in order and never overlap. Every run starts over
//! from a clean workspace while keeping the downloaded payload files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sipforge_config::Config;
use sipforge_errors::{ConfigError, Error, StageError};
use sipforge_events::{EventEmitter, EventSender, FailureContext, PackageEvent, StageEvent};
use sipforge_hash::Hash;
use sipforge_types::{EventType, FileCategory, ProvenanceEvent, RecordStatus};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::archive::{create_tar, extract_zip};
use crate::classify::classify;
use crate::commands::{self, CompileMets};
use crate::package::Package;
use crate::provenance::derive_events;
use crate::tools::{run_stage, Stage, StageLog, ToolRunner};

/// Archives may contain archives; the tree is rescanned this many times
const EXTRACTION_PASSES: usize = 2;

/// Documents the tools leave in the workspace that belong in the SIP
const GENERATED_DOCUMENTS: &[&str] = &["mets.xml", "signature.sig"];

/// Progress of an assembly run; each value names the last completed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStage {
    Clean,
    ArchivesExtracted,
    Validated,
    Imported,
    DerivedMetadataGenerated,
    ProvenanceAdded,
    DescriptionImported,
    StructmapCompiled,
    MetsCompiled,
    Signed,
    Compressed,
    Done,
}

impl AssemblyStage {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::ArchivesExtracted => "archives_extracted",
            Self::Validated => "validated",
            Self::Imported => "imported",
            Self::DerivedMetadataGenerated => "derived_metadata_generated",
            Self::ProvenanceAdded => "provenance_added",
            Self::DescriptionImported => "description_imported",
            Self::StructmapCompiled => "structmap_compiled",
            Self::MetsCompiled => "mets_compiled",
            Self::Signed => "signed",
            Self::Compressed => "compressed",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller-supplied parameters of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOptions {
    /// Logical creation date of the SIP
    pub create_date: DateTime<Utc>,
    /// Required for update submissions
    pub modify_date: Option<DateTime<Utc>>,
    pub status: RecordStatus,
}

impl AssemblyOptions {
    #[must_use]
    pub fn submission(create_date: DateTime<Utc>) -> Self {
        Self {
            create_date,
            modify_date: None,
            status: RecordStatus::Submission,
        }
    }

    #[must_use]
    pub fn update(create_date: DateTime<Utc>, modify_date: DateTime<Utc>) -> Self {
        Self {
            create_date,
            modify_date: Some(modify_date),
            status: RecordStatus::Update,
        }
    }

    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an update without a
    /// modification date.
    pub fn validate(&self) -> Result<(), Error> {
        if self.status == RecordStatus::Update && self.modify_date.is_none() {
            return Err(Error::invalid_argument(
                "update submissions require a modification date",
            ));
        }
        Ok(())
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub archive_path: PathBuf,
    pub archive_hash: Hash,
    /// Provenance events embedded in the metadata, decompressions first
    pub events: Vec<ProvenanceEvent>,
    pub stage: AssemblyStage,
}

/// Settings shared by every run
#[derive(Debug, Clone)]
pub struct AssemblySettings {
    pub organization_name: String,
    pub contract_id: String,
    pub objid_prefix: String,
    pub sign_key_path: PathBuf,
    pub agent_name: String,
    pub identifier_type: String,
}

impl AssemblySettings {
    /// # Errors
    ///
    /// Returns a `ConfigError` if a required assembly setting is missing.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        config.validate_for_assembly()?;
        let sign_key_path = config.sign.key_path.clone().ok_or_else(|| ConfigError::MissingField {
            field: "sign.key_path".to_string(),
        })?;
        Ok(Self {
            organization_name: config.mets.organization_name.clone(),
            contract_id: config.mets.contract_id.clone(),
            objid_prefix: config.mets.objid_prefix.clone(),
            sign_key_path,
            agent_name: config.tools.agent_name.clone(),
            identifier_type: config.tools.identifier_type.clone(),
        })
    }
}

/// Drives a package through every assembly stage
pub struct PackageAssembler {
    runner: Arc<dyn ToolRunner>,
    settings: AssemblySettings,
    events: Option<EventSender>,
}

impl EventEmitter for PackageAssembler {
    fn event_sender(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }
}

struct Run<'a> {
    package: &'a mut Package,
    options: &'a AssemblyOptions,
    stage: AssemblyStage,
    events: Vec<ProvenanceEvent>,
}

impl Run<'_> {
    fn advance(&mut self, stage: AssemblyStage) {
        debug!(object_id = self.package.object_id(), stage = %stage, "assembly stage reached");
        self.stage = stage;
    }
}

impl PackageAssembler {
    #[must_use]
    pub fn new(runner: Arc<dyn ToolRunner>, settings: AssemblySettings) -> Self {
        Self {
            runner,
            settings,
            events: None,
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Assemble `package` into its SIP archive
    ///
    /// # Errors
    ///
    /// Returns a `PreservationError` if the record cannot be preserved as
    /// is, `Error::InvalidArgument` for inconsistent options, or any tool,
    /// I/O or metadata failure.
    pub async fn assemble(
        &self,
        package: &mut Package,
        options: &AssemblyOptions,
    ) -> Result<AssemblyReport, Error> {
        options.validate()?;
        let object_id = package.object_id();
        let sip_filename = package.sip_filename()?;
        info!(object_id, sip = %sip_filename, "assembling package");
        self.emit_package(PackageEvent::AssemblyStarted {
            object_id,
            sip_filename,
        });

        let mut run = Run {
            package,
            options,
            stage: AssemblyStage::Clean,
            events: Vec::new(),
        };
        match self.execute(&mut run).await {
            Ok(report) => {
                self.emit_package(PackageEvent::Assembled {
                    object_id,
                    archive_path: report.archive_path.display().to_string(),
                    archive_hash: report.archive_hash.to_hex(),
                });
                Ok(report)
            }
            Err(e) => {
                if let Some(preservation) = e.as_preservation() {
                    warn!(object_id, reason = %preservation.reason(), "package frozen");
                    self.emit_package(PackageEvent::Frozen {
                        object_id,
                        reason: preservation.reason(),
                        failure: FailureContext::from_error(&e),
                    });
                } else {
                    warn!(object_id, stage = %run.stage, error = %e, "assembly failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &mut Run<'_>) -> Result<AssemblyReport, Error> {
        self.clean(run.package).await?;
        run.advance(AssemblyStage::Clean);

        self.extract_archives(run).await?;
        run.advance(AssemblyStage::ArchivesExtracted);

        run.package.check_files()?;
        run.advance(AssemblyStage::Validated);

        self.import_objects(run.package).await?;
        run.advance(AssemblyStage::Imported);

        self.create_mix(run.package).await?;
        run.advance(AssemblyStage::DerivedMetadataGenerated);

        let derived = derive_events(run.package).await?;
        for event in &derived {
            self.add_event(run.package, event).await?;
        }
        run.events.extend(derived);
        run.advance(AssemblyStage::ProvenanceAdded);

        let package = &*run.package;
        let workspace = package.workspace_dir();
        self.stage(
            package,
            Stage::ImportDescription,
            vec![commands::import_description(&workspace, &package.description_path())],
        )
        .await?;
        run.advance(AssemblyStage::DescriptionImported);

        self.stage(
            run.package,
            Stage::CompileStructmap,
            vec![commands::compile_structmap(&workspace)],
        )
        .await?;
        run.advance(AssemblyStage::StructmapCompiled);

        let sip_dir = run.package.sip_dir();
        let objid = run.package.object_identifier(&self.settings.objid_prefix);
        let contentid = run.package.content_identifier();
        let compile = CompileMets {
            sip_dir: &sip_dir,
            workspace: &workspace,
            objid: &objid,
            contentid: &contentid,
            status: run.options.status,
            create_date: run.options.create_date,
            modify_date: run.options.modify_date,
            organization_name: &self.settings.organization_name,
            contract_id: &self.settings.contract_id,
        };
        self.stage(run.package, Stage::CompileMets, vec![compile.command()])
            .await?;
        run.advance(AssemblyStage::MetsCompiled);

        self.stage(
            run.package,
            Stage::SignMets,
            vec![commands::sign_mets(&workspace, &self.settings.sign_key_path)],
        )
        .await?;
        run.advance(AssemblyStage::Signed);

        let (archive_path, archive_hash) = self.compress(run.package).await?;
        run.advance(AssemblyStage::Compressed);

        run.advance(AssemblyStage::Done);
        Ok(AssemblyReport {
            archive_path,
            archive_hash,
            events: std::mem::take(&mut run.events),
            stage: run.stage,
        })
    }

    /// Run a stage's commands in order, reporting progress
    async fn stage(
        &self,
        package: &Package,
        stage: Stage,
        commands: Vec<Vec<String>>,
    ) -> Result<(), Error> {
        self.emit_stage(StageEvent::Started {
            stage: stage.name().to_string(),
        });
        for command in commands {
            if let Err(e) = run_stage(self.runner.as_ref(), &package.log_dir(), stage, command).await
            {
                if let Error::Stage(StageError::Failed { exit_code, .. }) = &e {
                    self.emit_stage(StageEvent::CommandCompleted {
                        stage: stage.name().to_string(),
                        exit_code: *exit_code,
                    });
                }
                let classified = match &e {
                    Error::Stage(failure) if stage == Stage::ImportObject => classify(failure),
                    _ => None,
                };
                let e = classified.map_or(e, Error::from);
                self.emit_stage(StageEvent::Failed {
                    stage: stage.name().to_string(),
                    failure: FailureContext::from_error(&e),
                });
                return Err(e);
            }
            self.emit_stage(StageEvent::CommandCompleted {
                stage: stage.name().to_string(),
                exit_code: Some(0),
            });
        }
        self.emit_stage(StageEvent::Completed {
            stage: stage.name().to_string(),
        });
        Ok(())
    }

    async fn clean(&self, package: &mut Package) -> Result<(), Error> {
        let workspace = package.workspace_dir();
        match fs::remove_dir_all(&workspace).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io_with_path(&e, &workspace)),
        }
        package.create_layout().await?;
        package.populate_files().await
    }

    async fn extract_archives(&self, run: &mut Run<'_>) -> Result<(), Error> {
        for _ in 0..EXTRACTION_PASSES {
            let archives: Vec<PathBuf> = run
                .package
                .files_of(FileCategory::Archive)
                .cloned()
                .collect();
            if archives.is_empty() {
                break;
            }
            for archive in archives {
                let event = self.extract_archive(run.package, &archive).await?;
                self.add_event(run.package, &event).await?;
                run.events.push(event);
            }
            run.package.populate_files().await?;
        }
        Ok(())
    }

    /// Replace an archive with an identically named directory of its
    /// contents
    async fn extract_archive(
        &self,
        package: &Package,
        archive: &Path,
    ) -> Result<ProvenanceEvent, Error> {
        let stage = Stage::ExtractArchive;
        self.emit_stage(StageEvent::Started {
            stage: stage.name().to_string(),
        });

        let mut extract_dir = archive.as_os_str().to_os_string();
        extract_dir.push(".extract");
        let extract_dir = PathBuf::from(extract_dir);
        let command = vec![
            stage.name().to_string(),
            archive.display().to_string(),
            extract_dir.display().to_string(),
        ];
        let log = StageLog::new(&package.log_dir(), stage);

        let names = match extract_zip(archive, &extract_dir).await {
            Ok(names) => names,
            Err(e) => {
                log.append(&command, b"", e.to_string().as_bytes()).await?;
                self.emit_stage(StageEvent::Failed {
                    stage: stage.name().to_string(),
                    failure: FailureContext::from_error(&e),
                });
                return Err(e);
            }
        };
        log.append(&command, names.join("\n").as_bytes(), b"").await?;

        fs::remove_file(archive)
            .await
            .map_err(|e| Error::io_with_path(&e, archive))?;
        fs::rename(&extract_dir, archive)
            .await
            .map_err(|e| Error::io_with_path(&e, archive))?;
        self.emit_stage(StageEvent::Completed {
            stage: stage.name().to_string(),
        });

        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(ProvenanceEvent::success(
            EventType::Decompression,
            Utc::now(),
            "Decompression of archive file",
        )
        .with_outcome_detail(format!("Extracted from original archive {name}"))
        .with_target(package.sip_relative(archive)))
    }

    async fn add_event(&self, package: &Package, event: &ProvenanceEvent) -> Result<(), Error> {
        let command = commands::premis_event(
            &package.sip_dir(),
            &package.workspace_dir(),
            &self.settings.agent_name,
            event,
        );
        self.stage(package, Stage::PremisEvent, vec![command]).await
    }

    async fn import_objects(&self, package: &Package) -> Result<(), Error> {
        let sip_dir = package.sip_dir();
        let workspace = package.workspace_dir();
        let commands = package
            .files_to_import()
            .await?
            .into_iter()
            .map(|(identifier, file)| {
                commands::import_object(
                    &sip_dir,
                    &workspace,
                    &self.settings.identifier_type,
                    &identifier,
                    &package.sip_relative(&file),
                )
            })
            .collect();
        self.stage(package, Stage::ImportObject, commands).await
    }

    async fn create_mix(&self, package: &Package) -> Result<(), Error> {
        let sip_dir = package.sip_dir();
        let workspace = package.workspace_dir();
        let commands: Vec<Vec<String>> = package
            .files_of(FileCategory::Image)
            .map(|file| commands::create_mix(&sip_dir, &workspace, &package.sip_relative(file)))
            .collect();
        if commands.is_empty() {
            return Ok(());
        }
        self.stage(package, Stage::CreateMix, commands).await
    }

    /// Move the generated documents into the SIP and archive it
    async fn compress(&self, package: &Package) -> Result<(PathBuf, Hash), Error> {
        let stage = Stage::Compress;
        self.emit_stage(StageEvent::Started {
            stage: stage.name().to_string(),
        });

        let workspace = package.workspace_dir();
        let sip_dir = package.sip_dir();
        for name in GENERATED_DOCUMENTS {
            let from = workspace.join(name);
            fs::rename(&from, sip_dir.join(name))
                .await
                .map_err(|e| Error::io_with_path(&e, &from))?;
        }

        let archive_path = package.sip_archive_path()?;
        let mut incomplete = archive_path.as_os_str().to_os_string();
        incomplete.push(".incomplete");
        let incomplete = PathBuf::from(incomplete);

        let command = vec![
            stage.name().to_string(),
            sip_dir.display().to_string(),
            archive_path.display().to_string(),
        ];
        let log = StageLog::new(&package.log_dir(), stage);
        let names = match create_tar(&sip_dir, &incomplete).await {
            Ok(names) => names,
            Err(e) => {
                log.append(&command, b"", e.to_string().as_bytes()).await?;
                self.emit_stage(StageEvent::Failed {
                    stage: stage.name().to_string(),
                    failure: FailureContext::from_error(&e),
                });
                return Err(e);
            }
        };
        log.append(&command, names.join("\n").as_bytes(), b"").await?;

        fs::rename(&incomplete, &archive_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &archive_path))?;
        let hash = Hash::hash_file(&archive_path).await?;
        self.emit_stage(StageEvent::Completed {
            stage: stage.name().to_string(),
        });
        info!(archive = %archive_path.display(), hash = %hash, "package compressed");
        Ok((archive_path, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn update_without_modify_date_is_rejected() {
        let create = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let options = AssemblyOptions {
            create_date: create,
            modify_date: None,
            status: RecordStatus::Update,
        };
        assert!(matches!(options.validate(), Err(Error::InvalidArgument(_))));
        assert!(AssemblyOptions::submission(create).validate().is_ok());
        assert!(AssemblyOptions::update(create, create).validate().is_ok());
    }

    #[test]
    fn stages_are_ordered() {
        assert!(AssemblyStage::Clean < AssemblyStage::ArchivesExtracted);
        assert!(AssemblyStage::Signed < AssemblyStage::Compressed);
        assert_eq!(AssemblyStage::DerivedMetadataGenerated.to_string(), "derived_metadata_generated");
    }

    #[test]
    fn settings_require_assembly_config() {
        let config = Config::default();
        assert!(AssemblySettings::from_config(&config).is_err());
    }
}

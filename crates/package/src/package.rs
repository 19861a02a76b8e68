//! The package aggregate and its on-disk layout
//!
//! ```text
//! root/
//!   sip/
//!     reports/{Object.xml, lido.xml}
//!     attachments/{id}/{Multimedia.xml, payload}
//!     collection_activities/{id}/CollectionActivity.xml
//!   workspace/
//!   logs/
//! ```

use sipforge_errors::{Error, MetadataError, PreservationError};
use sipforge_remote::{parse_activity, parse_attachment, parse_object, DESCRIPTION_DOCUMENT};
use sipforge_types::format::extension_of;
use sipforge_types::{Activity, Attachment, EntityKind, FileCategory, Record};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Length of the id chunks used to spread archived packages over directories
const ARCHIVE_PART_LENGTH: usize = 3;

/// A record and everything downloaded for it
#[derive(Debug, Clone)]
pub struct Package {
    root: PathBuf,
    variant: Option<String>,
    record: Record,
    attachments: Option<Vec<Attachment>>,
    activities: Option<Vec<Activity>>,
    files: Vec<PathBuf>,
}

impl Package {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, record: Record, variant: Option<String>) -> Self {
        Self {
            root: root.into(),
            variant,
            record,
            attachments: None,
            activities: None,
            files: Vec::new(),
        }
    }

    /// Root directory of the package for a record under `package_dir`
    ///
    /// Variants get their own root so that they can be processed
    /// independently.
    #[must_use]
    pub fn root_for(package_dir: &Path, object_id: u64, variant: Option<&str>) -> PathBuf {
        match variant {
            Some(variant) => package_dir.join(format!("{object_id}-{variant}")),
            None => package_dir.join(object_id.to_string()),
        }
    }

    /// Load a previously downloaded package from disk
    ///
    /// Attachments and activities whose metadata documents are missing are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the record document cannot be read or any cached
    /// document is malformed.
    pub async fn open(root: impl Into<PathBuf>, variant: Option<String>) -> Result<Self, Error> {
        let root = root.into();
        let record_path = root
            .join("sip")
            .join("reports")
            .join(EntityKind::Object.document_name());
        let document = fs::read(&record_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &record_path))?;
        let mut record = parse_object(&document)?;
        record.document = document;

        let mut package = Self::new(root, record, variant);

        let mut attachments = Vec::new();
        for &id in &package.record.attachment_ids {
            let path = package.metadata_document_path(EntityKind::Multimedia, id);
            if let Some(document) = read_optional(&path).await? {
                attachments.push(parse_attachment(&document)?);
            }
        }
        let mut activities = Vec::new();
        for &id in &package.record.activity_ids {
            let path = package.metadata_document_path(EntityKind::CollectionActivity, id);
            if let Some(document) = read_optional(&path).await? {
                activities.push(parse_activity(&document)?);
            }
        }
        package.set_attachments(attachments);
        package.set_activities(activities);
        Ok(package)
    }

    /// Create the fixed directories of the layout
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be created.
    pub async fn create_layout(&self) -> Result<(), Error> {
        for dir in [
            self.workspace_dir(),
            self.reports_dir(),
            self.log_dir(),
            self.attachments_dir(),
            self.activities_dir(),
        ] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::io_with_path(&e, &dir))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    #[must_use]
    pub fn object_id(&self) -> u64 {
        self.record.id
    }

    /// Attachments materialized by the last download or load
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::NotLoaded` before attachments have been set.
    pub fn attachments(&self) -> Result<&[Attachment], Error> {
        self.attachments.as_deref().ok_or_else(|| {
            MetadataError::NotLoaded {
                what: "attachments".to_string(),
            }
            .into()
        })
    }

    pub fn set_attachments(&mut self, attachments: Vec<Attachment>) {
        self.attachments = Some(attachments);
    }

    /// Activities materialized by the last download or load
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::NotLoaded` before activities have been set.
    pub fn activities(&self) -> Result<&[Activity], Error> {
        self.activities.as_deref().ok_or_else(|| {
            MetadataError::NotLoaded {
                what: "collection activities".to_string(),
            }
            .into()
        })
    }

    pub fn set_activities(&mut self, activities: Vec<Activity>) {
        self.activities = Some(activities);
    }

    #[must_use]
    pub fn sip_dir(&self) -> PathBuf {
        self.root.join("sip")
    }

    #[must_use]
    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join("workspace")
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        self.sip_dir().join("reports")
    }

    #[must_use]
    pub fn attachments_dir(&self) -> PathBuf {
        self.sip_dir().join("attachments")
    }

    #[must_use]
    pub fn activities_dir(&self) -> PathBuf {
        self.sip_dir().join("collection_activities")
    }

    /// Directory holding a sub-resource's metadata and payload
    #[must_use]
    pub fn entity_dir(&self, kind: EntityKind, id: u64) -> PathBuf {
        match kind {
            EntityKind::Object => self.reports_dir(),
            EntityKind::Multimedia => self.attachments_dir().join(id.to_string()),
            EntityKind::CollectionActivity => self.activities_dir().join(id.to_string()),
        }
    }

    /// Cached metadata document of a sub-resource
    #[must_use]
    pub fn metadata_document_path(&self, kind: EntityKind, id: u64) -> PathBuf {
        self.entity_dir(kind, id).join(kind.document_name())
    }

    #[must_use]
    pub fn description_path(&self) -> PathBuf {
        self.reports_dir().join(DESCRIPTION_DOCUMENT)
    }

    /// File name of the finished archive
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::MissingField` if the record has no
    /// modification date.
    pub fn sip_filename(&self) -> Result<String, Error> {
        let modified = self
            .record
            .modified_date
            .ok_or_else(|| MetadataError::missing("__lastModified"))?;
        let variant = self
            .variant
            .as_deref()
            .map(|v| format!("-{v}"))
            .unwrap_or_default();
        Ok(format!(
            "{}_Object_{}{variant}.tar",
            modified.format("%Y%m%d"),
            self.record.id
        ))
    }

    /// Path of the finished archive
    ///
    /// # Errors
    ///
    /// See [`Package::sip_filename`].
    pub fn sip_archive_path(&self) -> Result<PathBuf, Error> {
        Ok(self.root.join(self.sip_filename()?))
    }

    /// Object identifier retained across every version of the record
    #[must_use]
    pub fn object_identifier(&self, prefix: &str) -> String {
        format!("{prefix}_Object_{}", self.record.id)
    }

    /// Content identifier retained across every version of the record
    #[must_use]
    pub fn content_identifier(&self) -> String {
        format!("Object_{}", self.record.id)
    }

    /// Directory components under which the package is archived after
    /// confirmation
    ///
    /// # Errors
    ///
    /// See [`Package::sip_filename`].
    pub fn archive_path_parts(&self) -> Result<Vec<String>, Error> {
        Ok(archive_path_parts(self.record.id, &self.sip_filename()?))
    }

    /// Payload files currently on disk, as of the last
    /// [`Package::populate_files`]
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Payload files of the given category
    pub fn files_of(&self, category: FileCategory) -> impl Iterator<Item = &PathBuf> {
        self.files
            .iter()
            .filter(move |path| FileCategory::from_path(path) == Some(category))
    }

    /// Rebuild the payload file list by scanning the reports and
    /// attachments
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be walked.
    pub async fn populate_files(&mut self) -> Result<(), Error> {
        let dirs = vec![self.reports_dir(), self.attachments_dir()];
        self.files = tokio::task::spawn_blocking(move || scan_files(&dirs))
            .await
            .map_err(|e| Error::internal(format!("file scan task failed: {e}")))??;
        debug!(count = self.files.len(), "populated payload files");
        Ok(())
    }

    /// Ensure every payload file can be preserved
    ///
    /// # Errors
    ///
    /// Returns `PreservationError::UnsupportedFormat` naming the first
    /// unsupported extension.
    pub fn check_files(&self) -> Result<(), Error> {
        for path in &self.files {
            let supported = FileCategory::from_path(path).is_some_and(FileCategory::is_preservable);
            if !supported {
                return Err(PreservationError::UnsupportedFormat {
                    extension: extension_of(path),
                    sip_filename: self.sip_filename()?,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Files to import with their identifiers
    ///
    /// Attachments come first, then activities, then reports. Entries within
    /// each group are in sorted directory order.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be walked.
    pub async fn files_to_import(&self) -> Result<Vec<(String, PathBuf)>, Error> {
        let groups = vec![
            (EntityKind::Multimedia, self.attachments_dir()),
            (EntityKind::CollectionActivity, self.activities_dir()),
        ];
        let reports = self.reports_dir();
        let sip_dir = self.sip_dir();
        let object_id = self.record.id;

        tokio::task::spawn_blocking(move || {
            let mut items = Vec::new();
            for (kind, dir) in groups {
                for entity in sorted_dirs(&dir)? {
                    let Some(id) = entity.file_name().and_then(|n| n.to_str()).map(str::to_string)
                    else {
                        continue;
                    };
                    for file in scan_files(std::slice::from_ref(&entity))? {
                        let relative = relative_display(&file, &entity);
                        items.push((format!("{kind}:{id}:{relative}"), file));
                    }
                }
            }
            for file in scan_files(std::slice::from_ref(&reports))? {
                let relative = relative_display(&file, &sip_dir);
                items.push((format!("{}:{object_id}:{relative}", EntityKind::Object), file));
            }
            Ok::<_, Error>(items)
        })
        .await
        .map_err(|e| Error::internal(format!("file scan task failed: {e}")))?
    }

    /// Path relative to the SIP directory, as passed to the tools
    #[must_use]
    pub fn sip_relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(self.sip_dir())
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Directory components for archiving a package of `object_id`
#[must_use]
pub fn archive_path_parts(object_id: u64, sip_filename: &str) -> Vec<String> {
    let id = object_id.to_string();
    let mut parts: Vec<String> = id
        .as_bytes()
        .chunks(ARCHIVE_PART_LENGTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();
    parts.push(format!("Object_{id}"));
    parts.push(sip_filename.to_string());
    parts
}

/// Reject file names the preservation service cannot accept
///
/// # Errors
///
/// Returns `PreservationError::InvalidFilename` for non-ASCII names.
pub fn check_filename(filename: &str) -> Result<(), Error> {
    if filename.is_ascii() {
        Ok(())
    } else {
        Err(PreservationError::InvalidFilename {
            filename: filename.to_string(),
        }
        .into())
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, Error> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}

fn walk_error(err: walkdir::Error) -> Error {
    let path = err.path().map(Path::to_path_buf);
    match (err.into_io_error(), path) {
        (Some(io), Some(path)) => Error::io_with_path(&io, path),
        (Some(io), None) => io.into(),
        (None, _) => Error::internal("filesystem loop while scanning package"),
    }
}

/// Regular files below each of `dirs`, in sorted order; missing directories
/// are skipped
fn scan_files(dirs: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        for entry in WalkDir::new(dir).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) if e.io_error().is_some_and(|io| io.kind() == ErrorKind::NotFound) => {}
                Err(e) => return Err(walk_error(e)),
            }
        }
    }
    Ok(files)
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(walk_error)?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn record(id: u64) -> Record {
        Record {
            id,
            title: Some("Test".to_string()),
            created_date: None,
            created_user: None,
            modified_date: Some(Utc.with_ymd_and_hms(2018, 11, 7, 12, 0, 0).unwrap()),
            attachment_ids: vec![],
            activity_ids: vec![],
            document: Vec::new(),
        }
    }

    #[test]
    fn sip_filename_includes_variant() {
        let package = Package::new("/tmp/p", record(1234567), None);
        assert_eq!(package.sip_filename().unwrap(), "20181107_Object_1234567.tar");

        let package = Package::new("/tmp/p", record(1234567), Some("testID".to_string()));
        assert_eq!(
            package.sip_filename().unwrap(),
            "20181107_Object_1234567-testID.tar"
        );
    }

    #[test]
    fn identifiers_ignore_variant() {
        let plain = Package::new("/tmp/a", record(55), None);
        let variant = Package::new("/tmp/b", record(55), Some("v2".to_string()));
        assert_eq!(plain.object_identifier("sipforge"), "sipforge_Object_55");
        assert_eq!(plain.object_identifier("sipforge"), variant.object_identifier("sipforge"));
        assert_eq!(plain.content_identifier(), variant.content_identifier());
    }

    #[test]
    fn missing_modified_date_is_reported() {
        let mut rec = record(1);
        rec.modified_date = None;
        let package = Package::new("/tmp/p", rec, None);
        assert!(matches!(
            package.sip_filename(),
            Err(Error::Metadata(MetadataError::MissingField { .. }))
        ));
    }

    #[test]
    fn archive_parts_chunk_the_id() {
        assert_eq!(
            archive_path_parts(1234567, "x.tar"),
            vec!["123", "456", "7", "Object_1234567", "x.tar"]
        );
    }

    #[test]
    fn lazily_loaded_lists_fail_until_set() {
        let mut package = Package::new("/tmp/p", record(1), None);
        assert!(matches!(
            package.attachments(),
            Err(Error::Metadata(MetadataError::NotLoaded { .. }))
        ));
        package.set_attachments(vec![]);
        assert!(package.attachments().unwrap().is_empty());
        assert!(package.activities().is_err());
    }

    #[test]
    fn non_ascii_filenames_are_rejected() {
        assert!(check_filename("image.tif").is_ok());
        let err = check_filename("kuva_ä.tif").unwrap_err();
        assert_eq!(
            err.as_preservation().map(PreservationError::reason).as_deref(),
            Some("Filename contains non-ASCII characters")
        );
    }

    #[tokio::test]
    async fn files_are_scanned_and_checked() {
        let temp = tempdir().unwrap();
        let mut package = Package::new(temp.path(), record(10), None);
        package.create_layout().await.unwrap();

        let attachment = package.entity_dir(EntityKind::Multimedia, 2);
        std::fs::create_dir_all(&attachment).unwrap();
        std::fs::write(attachment.join("Multimedia.xml"), b"<x/>").unwrap();
        std::fs::write(attachment.join("photo.JPG"), b"jpg").unwrap();
        std::fs::write(package.reports_dir().join("lido.xml"), b"<x/>").unwrap();

        package.populate_files().await.unwrap();
        assert_eq!(package.files().len(), 3);
        assert_eq!(package.files_of(FileCategory::Image).count(), 1);
        package.check_files().unwrap();

        std::fs::write(attachment.join("program.exe"), b"MZ").unwrap();
        package.populate_files().await.unwrap();
        let err = package.check_files().unwrap_err();
        match err.as_preservation() {
            Some(PreservationError::UnsupportedFormat { extension, .. }) => {
                assert_eq!(extension, "exe");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn import_order_is_attachments_activities_reports() {
        let temp = tempdir().unwrap();
        let package = Package::new(temp.path(), record(10), None);
        package.create_layout().await.unwrap();

        for id in [20, 3] {
            let dir = package.entity_dir(EntityKind::Multimedia, id);
            std::fs::create_dir_all(dir.join("nested")).unwrap();
            std::fs::write(dir.join("Multimedia.xml"), b"<x/>").unwrap();
            std::fs::write(dir.join("nested").join("a.tif"), b"tif").unwrap();
        }
        let activity = package.entity_dir(EntityKind::CollectionActivity, 7);
        std::fs::create_dir_all(&activity).unwrap();
        std::fs::write(activity.join("CollectionActivity.xml"), b"<x/>").unwrap();
        std::fs::write(package.reports_dir().join("Object.xml"), b"<x/>").unwrap();

        let identifiers: Vec<String> = package
            .files_to_import()
            .await
            .unwrap()
            .into_iter()
            .map(|(identifier, _)| identifier)
            .collect();

        assert_eq!(
            identifiers,
            vec![
                "Multimedia:20:Multimedia.xml",
                "Multimedia:20:nested/a.tif",
                "Multimedia:3:Multimedia.xml",
                "Multimedia:3:nested/a.tif",
                "CollectionActivity:7:CollectionActivity.xml",
                "Object:10:reports/Object.xml",
            ]
        );
    }
}

#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package download, assembly and confirmation for sipforge
//!
//! A package holds one record and everything downloaded for it. The
//! assembler turns a downloaded package into a signed SIP archive by
//! driving the external packaging tools stage by stage.

mod archive;
mod assembler;
mod classify;
pub mod commands;
mod confirm;
mod download;
mod fetcher;
mod package;
mod provenance;
mod tools;

pub use archive::{create_tar, extract_zip, gzip_into};
pub use assembler::{
    AssemblyOptions, AssemblyReport, AssemblySettings, AssemblyStage, PackageAssembler,
};
pub use classify::{classify, classify_output, Detector, DETECTORS};
pub use confirm::{confirm, PreservationField};
pub use fetcher::{fetch_all, prune_orphans};
pub use package::{archive_path_parts, check_filename, Package};
pub use provenance::derive_events;
pub use tools::{run_stage, ProcessToolRunner, Stage, StageLog, ToolOutput, ToolRunner};

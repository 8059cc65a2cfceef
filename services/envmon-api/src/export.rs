//! Mission export as a zip archive.
//!
//! The archive is built on disk under the export directory and streamed
//! back from there, so memory use does not grow with mission size.

use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::header,
    response::IntoResponse,
};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use envmon_core::persist::replace_with;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn export_mission(
    State(state): State<Arc<AppState>>,
    UrlPath(mission_id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    if mission_id.is_empty()
        || mission_id.contains(['/', '\\'])
        || mission_id.contains("..")
    {
        return Err(ApiError::MissionNotFound);
    }
    let mission_dir = state.supervisor.mission_store().locate(&mission_id)?;
    let out_path = state
        .config
        .paths
        .export_dir
        .join(format!("{mission_id}.zip"));

    let archive_path = out_path.clone();
    tokio::task::spawn_blocking(move || {
        replace_with(&archive_path, |file| write_archive(&mission_dir, file))
            .map_err(|e| ApiError::Export(e.to_string()))
    })
    .await
    .map_err(|e| ApiError::Export(e.to_string()))??;

    let file = tokio::fs::File::open(&out_path)
        .await
        .map_err(|e| ApiError::Export(e.to_string()))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::Export(e.to_string()))?
        .len();

    info!(mission_id = %mission_id, bytes = size, "Mission exported");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{mission_id}.zip\""),
            ),
            (header::CONTENT_LENGTH, size.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}

/// Archive the contents of `root` into `out`, with entry names relative
/// to `root`. Files are copied through, never read whole.
pub fn write_archive(root: &Path, out: &mut File) -> zip::result::ZipResult<()> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(out);
    for path in files {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if path.is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            io::copy(&mut File::open(&path)?, &mut writer)?;
        }
    }
    writer.finish()?;
    Ok(())
}

/// Every file and directory under `dir`, depth first.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            out.push(path.clone());
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chatlog_contract::{InboundMessage, MessageKind};
use chatlog_core::{create_dir_all_durable, sync_parent_dir};
use chrono::{DateTime, Local};

use crate::store_layout::{media_dir, media_file_name, relative_store_path};
use crate::MediaRecord;

const MAX_NAME_ATTEMPTS: usize = 1_000;
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Picks the references worth copying, deduplicated in first-seen order.
///
/// Image messages usually carry both the original and a thumbnail; only paths
/// under an `Image` directory and outside any `Thumb` directory are kept. When
/// nothing qualifies the full list is used instead.
pub fn select_media_sources(kind: MessageKind, references: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let unique = references
        .iter()
        .map(|reference| reference.trim())
        .filter(|reference| !reference.is_empty())
        .filter(|reference| seen.insert(*reference))
        .map(str::to_string)
        .collect::<Vec<_>>();
    if kind != MessageKind::Image {
        return unique;
    }
    let originals = unique
        .iter()
        .filter(|reference| is_original_image_path(reference))
        .cloned()
        .collect::<Vec<_>>();
    if originals.is_empty() {
        unique
    } else {
        originals
    }
}

fn is_original_image_path(reference: &str) -> bool {
    let mut has_image_segment = false;
    for segment in reference.split(['/', '\\']) {
        if segment.eq_ignore_ascii_case("thumb") {
            return false;
        }
        if segment.eq_ignore_ascii_case("image") {
            has_image_segment = true;
        }
    }
    has_image_segment
}

/// Maps a file extension (without the dot) to a MIME type.
pub fn guess_mime_type(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "amr" => "audio/amr",
        "silk" => "audio/silk",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => DEFAULT_MIME_TYPE,
    }
}

#[derive(Debug, Default)]
pub(crate) struct MediaCapture {
    pub(crate) records: Vec<MediaRecord>,
    pub(crate) failures: usize,
}

/// Copies the message's media into `<conversation>/media/<type>/<YYYYMMDD>/`.
///
/// Each source is handled on its own; a missing or unreadable source is
/// logged and counted, and the rest still get copied.
pub(crate) fn capture_media(
    root: &Path,
    conversation_dir: &Path,
    message: &InboundMessage,
    now: &DateTime<Local>,
) -> MediaCapture {
    let kind = message.kind();
    let mut capture = MediaCapture::default();
    if !kind.is_media() {
        return capture;
    }

    let target_dir = media_dir(conversation_dir, kind.as_str(), now);
    for source in select_media_sources(kind, message.media_references()) {
        match copy_one(Path::new(&source), &target_dir, now) {
            Ok((target, size)) => {
                let original_name = original_file_name(&source);
                let mime_type = Path::new(&original_name)
                    .extension()
                    .map(|extension| guess_mime_type(&extension.to_string_lossy()))
                    .unwrap_or(DEFAULT_MIME_TYPE);
                tracing::debug!(
                    source = %source,
                    target = %target.display(),
                    size,
                    "captured media"
                );
                capture.records.push(MediaRecord {
                    media_type: kind.as_str().to_string(),
                    stored_path: relative_store_path(root, &target),
                    original_name,
                    size,
                    mime_type: mime_type.to_string(),
                });
            }
            Err(error) => {
                tracing::warn!(source = %source, %error, "skipping media reference");
                capture.failures += 1;
            }
        }
    }
    capture
}

fn original_file_name(reference: &str) -> String {
    reference
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(reference)
        .to_string()
}

fn copy_one(source: &Path, target_dir: &Path, now: &DateTime<Local>) -> io::Result<(PathBuf, u64)> {
    let metadata = fs::metadata(source)?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "media source is not a regular file",
        ));
    }
    let mut reader = File::open(source)?;
    create_dir_all_durable(target_dir)?;

    let original_name = original_file_name(&source.to_string_lossy());
    let (target, mut writer) = create_unique_target(target_dir, now, &original_name)?;
    let copied = io::copy(&mut reader, &mut writer).and_then(|size| {
        writer.sync_all()?;
        sync_parent_dir(&target)?;
        Ok(size)
    });
    let size = match copied {
        Ok(size) => size,
        Err(error) => {
            drop(writer);
            let _ = fs::remove_file(&target);
            return Err(error);
        }
    };

    // Best effort: not every platform or filesystem keeps these.
    let _ = fs::set_permissions(&target, metadata.permissions());
    if let Ok(modified) = metadata.modified() {
        let _ = writer.set_modified(modified);
    }
    Ok((target, size))
}

fn create_unique_target(
    target_dir: &Path,
    now: &DateTime<Local>,
    original_name: &str,
) -> io::Result<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let target = target_dir.join(media_file_name(now, original_name, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => return Ok((target, file)),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(error) => return Err(error),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no free media file name for '{original_name}' in {}",
            target_dir.display()
        ),
    ))
}

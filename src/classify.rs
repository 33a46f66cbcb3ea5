//! Per-attachment decisions: save it or not, from which URL, under which name.
//!
//! Classification is pure. Only [`resolve_stem`] looks at the filesystem, and
//! only to find the first free name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::model::{best_variant, Attachment, Document, Message, Photo, Video};

const IMAGE_EXTENSIONS: [&str; 9] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "ico"];
const VIDEO_EXTENSIONS: [&str; 11] = [
    "mp4", "mkv", "mov", "avi", "flv", "wmv", "webm", "mpeg", "mpg", "3gp", "m4v",
];
const INVALID_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

pub const VIDEO_INFO_DIR: &str = "video_info";

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// `2021_03_04__17_05_09` in local time.
pub fn format_timestamp(unix: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&Local)
        .format("%Y_%m_%d__%H_%M_%S")
        .to_string()
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Download(DownloadTarget),
    Video(VideoRecord),
    Skip(SkipReason),
}

/// A file fetched from `url` into the conversation folder as `<base>.<ext>`.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTarget {
    pub url: String,
    pub base: String,
    pub ext: String,
}

/// Sidecars stored under `video_info/` instead of the video itself.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub base: String,
    pub attachment: Value,
    pub message: Value,
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    IgnoredDocType(i64),
    NotMedia(String),
    NoImage,
    VideoDisabled,
    Unsupported(String),
}

pub struct Classifier<'a> {
    doc_ignore_by_type: &'a HashSet<i64>,
    process_video: bool,
}

impl<'a> Classifier<'a> {
    pub fn new(doc_ignore_by_type: &'a HashSet<i64>, process_video: bool) -> Self {
        Self {
            doc_ignore_by_type,
            process_video,
        }
    }

    pub fn from_config(config: &'a Config) -> Self {
        Self::new(&config.doc_ignore_by_type, config.process_video)
    }

    pub fn classify(&self, attachment: &Attachment, message: &Message) -> Plan {
        match attachment {
            Attachment::Photo(photo) => classify_photo(photo),
            Attachment::Document(doc) => self.classify_document(doc),
            Attachment::Video(video) if self.process_video => classify_video(video, message),
            Attachment::Video(_) => Plan::Skip(SkipReason::VideoDisabled),
            Attachment::Unknown(kind) => Plan::Skip(SkipReason::Unsupported(kind.clone())),
        }
    }

    fn classify_document(&self, doc: &Document) -> Plan {
        if self.doc_ignore_by_type.contains(&doc.type_code) {
            return Plan::Skip(SkipReason::IgnoredDocType(doc.type_code));
        }
        let prefix = if is_image_extension(&doc.ext) {
            "IMG"
        } else if is_video_extension(&doc.ext) {
            "VID"
        } else {
            return Plan::Skip(SkipReason::NotMedia(doc.ext.clone()));
        };

        // Titles usually already end in the extension; don't write `cat.gif.gif`.
        let suffix = format!(".{}", doc.ext);
        let title = doc
            .title
            .len()
            .checked_sub(suffix.len())
            .filter(|&cut| {
                doc.title.is_char_boundary(cut) && doc.title[cut..].eq_ignore_ascii_case(&suffix)
            })
            .map_or(doc.title.as_str(), |cut| &doc.title[..cut]);
        Plan::Download(DownloadTarget {
            url: doc.url.clone(),
            base: format!(
                "{prefix}_{}_{}",
                format_timestamp(doc.date),
                sanitize_file_name(title)
            ),
            ext: sanitize_file_name(&doc.ext),
        })
    }
}

fn classify_photo(photo: &Photo) -> Plan {
    match best_variant(&photo.sizes) {
        Some(best) => Plan::Download(DownloadTarget {
            url: best.url.clone(),
            base: format!("IMG_{}", format_timestamp(photo.date)),
            ext: "jpg".to_string(),
        }),
        None => Plan::Skip(SkipReason::NoImage),
    }
}

fn classify_video(video: &Video, message: &Message) -> Plan {
    Plan::Video(VideoRecord {
        base: format!(
            "VID_{}_{}",
            format_timestamp(message.date),
            sanitize_file_name(&video.title)
        ),
        attachment: video.raw.clone(),
        message: message.raw.clone(),
        preview_url: video
            .first_frame
            .as_deref()
            .and_then(best_variant)
            .map(|frame| frame.url.clone()),
    })
}

/// First free file stem in `dir` for a file group named `<stem><ending>`.
///
/// A stem is free only when every `<stem><ending>` is missing. The unsuffixed
/// base wins when free. Otherwise `<base>_<n>` is tried for n = `first_suffix`,
/// `first_suffix + 1`, ... and the first free one is returned.
pub fn resolve_stem(dir: &Path, base: &str, endings: &[&str], first_suffix: u32) -> String {
    let is_free = |stem: &str| {
        endings
            .iter()
            .all(|ending| !dir.join(format!("{stem}{ending}")).exists())
    };
    if is_free(base) {
        return base.to_string();
    }
    let mut n = first_suffix;
    loop {
        let stem = format!("{base}_{n}");
        if is_free(&stem) {
            return stem;
        }
        n += 1;
    }
}

pub fn resolve_path(dir: &Path, base: &str, ext: &str, first_suffix: u32) -> PathBuf {
    let ending = format!(".{ext}");
    dir.join(format!("{}{ending}", resolve_stem(dir, base, &[ending.as_str()], first_suffix)))
}

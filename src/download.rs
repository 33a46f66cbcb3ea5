use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::classify::{resolve_path, resolve_stem, DownloadTarget, VideoRecord};
use crate::error::{ArchiveError, Result};

/// Source URLs already written for the current conversation.
#[derive(Debug, Default)]
pub struct DedupIndex {
    urls: HashSet<String>,
}

impl DedupIndex {
    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn insert(&mut self, url: &str) -> bool {
        self.urls.insert(url.to_string())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp.bytes().await?)
    }
}

/// Every file a recorded video may produce. A stem is reused only when all are free.
const VIDEO_SIDECAR_ENDINGS: [&str; 3] = [".json", "_msg.json", ".jpg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written(PathBuf),
    Duplicate,
}

/// Fetch-and-write for one conversation. Owns that conversation's dedup index,
/// so a fresh `Downloader` per conversation is a fresh index.
pub struct Downloader<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
    index: DedupIndex,
}

impl<'a, F: Fetcher + ?Sized> Downloader<'a, F> {
    pub fn new(fetcher: &'a F) -> Self {
        Self {
            fetcher,
            index: DedupIndex::default(),
        }
    }

    pub fn index(&self) -> &DedupIndex {
        &self.index
    }

    /// Saves `target` under `dir` unless its URL was already written.
    pub async fn save(&mut self, dir: &Path, target: &DownloadTarget) -> Result<SaveOutcome> {
        if self.index.contains(&target.url) {
            debug!(url = %target.url, "already downloaded");
            return Ok(SaveOutcome::Duplicate);
        }
        let path = resolve_path(dir, &target.base, &target.ext, 1);
        self.fetch_to(&target.url, &path).await?;
        Ok(SaveOutcome::Written(path))
    }

    /// Writes the attachment and message records plus the preview frame, if any.
    /// Returns every path written.
    pub async fn save_video(&mut self, video_dir: &Path, record: &VideoRecord) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(video_dir)
            .await
            .map_err(|e| ArchiveError::io(video_dir, e))?;

        let stem = resolve_stem(video_dir, &record.base, &VIDEO_SIDECAR_ENDINGS, 0);
        let attachment_path = video_dir.join(format!("{stem}.json"));
        let message_path = video_dir.join(format!("{stem}_msg.json"));
        write_json(&attachment_path, &record.attachment).await?;
        write_json(&message_path, &record.message).await?;

        let mut written = vec![attachment_path, message_path];
        if let Some(url) = &record.preview_url {
            let preview_path = video_dir.join(format!("{stem}.jpg"));
            self.fetch_to(url, &preview_path).await?;
            written.push(preview_path);
        }
        Ok(written)
    }

    async fn fetch_to(&mut self, url: &str, path: &Path) -> Result<()> {
        let body = self.fetcher.fetch(url).await?;
        tokio::fs::write(path, &body)
            .await
            .map_err(|e| ArchiveError::io(path, e))?;
        self.index.insert(url);
        debug!(path = %path.display(), bytes = body.len(), "written");
        Ok(())
    }
}

async fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| ArchiveError::io(path, e))
}

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::api::MessagingApi;
use crate::classify::{Classifier, Plan, SkipReason, VIDEO_INFO_DIR};
use crate::config::Config;
use crate::download::{Downloader, Fetcher, SaveOutcome};
use crate::error::{ArchiveError, Result};
use crate::history::HistoryPaginator;
use crate::model::Conversation;
use crate::walk::walk;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationReport {
    pub peer_id: i64,
    pub folder: String,
    pub messages_processed: u64,
    pub files_written: usize,
    pub duplicates_skipped: usize,
    pub documents_ignored: usize,
    pub videos_recorded: usize,
    pub attachments_skipped: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sha256: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub version: String,
    pub duration_s: f64,
    pub conversations: Vec<ConversationReport>,
}

impl RunReport {
    pub fn messages_processed(&self) -> u64 {
        self.conversations.iter().map(|c| c.messages_processed).sum()
    }

    pub fn files_written(&self) -> usize {
        self.conversations.iter().map(|c| c.files_written).sum()
    }
}

/// Drives history paging, forward walking, classification and downloading for
/// each selected conversation, one after another.
pub struct Archiver<'a, A: MessagingApi + ?Sized, F: Fetcher + ?Sized> {
    api: &'a A,
    fetcher: &'a F,
    config: &'a Config,
}

impl<'a, A: MessagingApi + ?Sized, F: Fetcher + ?Sized> Archiver<'a, A, F> {
    pub fn new(api: &'a A, fetcher: &'a F, config: &'a Config) -> Self {
        Self {
            api,
            fetcher,
            config,
        }
    }

    pub async fn run(&self, conversations: &[Conversation]) -> Result<RunReport> {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(conversations.len());
        for (idx, conversation) in conversations.iter().enumerate() {
            info!(
                "processing conversation {} of {}",
                idx + 1,
                conversations.len()
            );
            reports.push(self.process_conversation(conversation).await?);
        }
        Ok(RunReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            duration_s: started.elapsed().as_secs_f64(),
            conversations: reports,
        })
    }

    /// Empties the conversation folder and archives its whole history into it.
    pub async fn process_conversation(&self, conversation: &Conversation) -> Result<ConversationReport> {
        let dir = self.conversation_dir(conversation);
        info!(
            "current folder: {}, messages to process: {}",
            conversation.folder_name, conversation.message_count
        );
        reset_dir(&dir).await?;

        let classifier = Classifier::from_config(self.config);
        let mut downloader = Downloader::new(self.fetcher);
        let mut pager =
            HistoryPaginator::new(self.api, conversation.peer_id, self.config.history_page_size);
        let mut report = ConversationReport {
            peer_id: conversation.peer_id,
            folder: conversation.folder_name.clone(),
            ..ConversationReport::default()
        };

        while let Some(page) = pager.next_page().await? {
            for message in &page {
                for visited in walk(message) {
                    for attachment in &visited.attachments {
                        match classifier.classify(attachment, visited) {
                            Plan::Download(target) => match downloader.save(&dir, &target).await? {
                                SaveOutcome::Written(_) => report.files_written += 1,
                                SaveOutcome::Duplicate => report.duplicates_skipped += 1,
                            },
                            Plan::Video(record) => {
                                downloader
                                    .save_video(&dir.join(VIDEO_INFO_DIR), &record)
                                    .await?;
                                report.videos_recorded += 1;
                            }
                            Plan::Skip(SkipReason::IgnoredDocType(code)) => {
                                debug!(code, "document type ignored");
                                report.documents_ignored += 1;
                            }
                            Plan::Skip(reason) => {
                                debug!(?reason, "attachment skipped");
                                report.attachments_skipped += 1;
                            }
                        }
                    }
                }
                report.messages_processed += 1;
            }
            info!(
                "peer_id {}: messages processed: {} of {}",
                conversation.peer_id,
                report.messages_processed,
                pager.total()
            );
        }

        Ok(report)
    }

    pub fn conversation_dir(&self, conversation: &Conversation) -> PathBuf {
        self.config.output_dir.join(&conversation.folder_name)
    }
}

async fn reset_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir)
        .await
        .map_err(|e| ArchiveError::io(dir, e))?
    {
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| ArchiveError::io(dir, e))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ArchiveError::io(dir, e))
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| ArchiveError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hashes every file under each conversation folder and writes the run summary
/// to `<output_dir>/manifest.json`.
pub fn write_manifest(output_dir: &Path, report: &mut RunReport) -> Result<PathBuf> {
    for conversation in &mut report.conversations {
        let root = output_dir.join(&conversation.folder);
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                ArchiveError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            conversation.sha256.insert(rel, sha256_file(entry.path())?);
        }
    }

    let path = output_dir.join(MANIFEST_FILE_NAME);
    let body = serde_json::to_vec_pretty(report)?;
    std::fs::write(&path, body).map_err(|e| ArchiveError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::tests::HistoryApi;
    use crate::model::PeerKind;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers every URL with the URL itself as the body.
    #[derive(Default)]
    struct EchoFetcher {
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes> {
            self.fetched.lock().unwrap().push(url.to_string());
            Ok(Bytes::from(url.to_string()))
        }
    }

    fn conversation(folder: &str) -> Conversation {
        Conversation {
            peer_id: 1,
            kind: PeerKind::User,
            title: "user 1".into(),
            folder_name: folder.into(),
            message_count: 0,
        }
    }

    fn photo(url: &str, date: i64) -> serde_json::Value {
        json!({"type": "photo", "photo": {"date": date, "sizes": [
            {"url": format!("{url}-small"), "width": 10, "height": 10},
            {"url": url, "width": 100, "height": 100}
        ]}})
    }

    fn config(output: &Path) -> Config {
        Config {
            output_dir: output.to_path_buf(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn forwarded_duplicates_are_downloaded_once() {
        let out = tempfile::tempdir().unwrap();
        let api = HistoryApi::with_messages(vec![
            json!({"id": 2, "date": 10, "attachments": [photo("https://cdn/p1", 1_600_000_000)]}),
            json!({"id": 1, "date": 5, "attachments": [], "fwd_messages": [
                {"date": 4, "attachments": [photo("https://cdn/p1", 1_600_000_000)]},
                {"date": 3, "attachments": [photo("https://cdn/p2", 1_600_000_000)]}
            ]}),
        ]);
        let fetcher = EchoFetcher::default();
        let config = config(out.path());

        let report = Archiver::new(&api, &fetcher, &config)
            .process_conversation(&conversation("1_a_b"))
            .await
            .unwrap();

        assert_eq!(report.messages_processed, 2);
        assert_eq!(report.files_written, 2);
        assert_eq!(report.duplicates_skipped, 1);
        assert_eq!(
            *fetcher.fetched.lock().unwrap(),
            vec!["https://cdn/p1".to_string(), "https://cdn/p2".to_string()]
        );

        let mut names: Vec<String> = std::fs::read_dir(out.path().join("1_a_b"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let base = format!("IMG_{}", crate::classify::format_timestamp(1_600_000_000));
        assert_eq!(names, vec![format!("{base}.jpg"), format!("{base}_1.jpg")]);
    }

    #[tokio::test]
    async fn folder_is_reset_before_processing() {
        let out = tempfile::tempdir().unwrap();
        let dir = out.path().join("1_a_b");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale.jpg"), b"old").unwrap();

        let api = HistoryApi::plain(3);
        let fetcher = EchoFetcher::default();
        let config = config(out.path());
        let report = Archiver::new(&api, &fetcher, &config)
            .process_conversation(&conversation("1_a_b"))
            .await
            .unwrap();

        assert_eq!(report.messages_processed, 3);
        assert!(dir.exists());
        assert!(!dir.join("stale.jpg").exists());
    }

    #[tokio::test]
    async fn ignored_documents_and_disabled_video_write_nothing() {
        let out = tempfile::tempdir().unwrap();
        let api = HistoryApi::with_messages(vec![json!({"id": 1, "date": 1, "attachments": [
            {"type": "doc", "doc": {"type": 5, "ext": "png", "title": "a.png", "url": "d", "date": 1}},
            {"type": "doc", "doc": {"type": 1, "ext": "pdf", "title": "a.pdf", "url": "e", "date": 1}},
            {"type": "video", "video": {"title": "v"}}
        ]})]);
        let fetcher = EchoFetcher::default();
        let mut config = config(out.path());
        config.doc_ignore_by_type.insert(5);

        let report = Archiver::new(&api, &fetcher, &config)
            .process_conversation(&conversation("c"))
            .await
            .unwrap();

        assert_eq!(report.documents_ignored, 1);
        assert_eq!(report.attachments_skipped, 2);
        assert_eq!(report.files_written, 0);
        assert!(fetcher.fetched.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(out.path().join("c")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn manifest_hashes_written_files() {
        let out = tempfile::tempdir().unwrap();
        let api = HistoryApi::with_messages(vec![json!({"id": 1, "date": 1_600_000_000, "attachments": [
            {"type": "video", "video": {"title": "clip", "first_frame": [
                {"url": "https://cdn/frame", "width": 10, "height": 10}
            ]}}
        ]})]);
        let fetcher = EchoFetcher::default();
        let config = Config {
            process_video: true,
            ..config(out.path())
        };

        let archiver = Archiver::new(&api, &fetcher, &config);
        let mut report = archiver.run(&[conversation("v")]).await.unwrap();
        assert_eq!(report.conversations[0].videos_recorded, 1);

        let path = write_manifest(out.path(), &mut report).unwrap();
        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        let hashes = manifest["conversations"][0]["sha256"].as_object().unwrap();
        assert_eq!(hashes.len(), 3);
        let base = format!("VID_{}_clip", crate::classify::format_timestamp(1_600_000_000));
        let preview = format!("video_info/{base}.jpg");
        assert_eq!(
            hashes[&preview],
            format!("{:x}", Sha256::digest(b"https://cdn/frame"))
        );
        assert_eq!(report.messages_processed(), 1);
    }
}

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use chat_media_archiver::api::MessagingApi;
use chat_media_archiver::archive::Archiver;
use chat_media_archiver::classify::format_timestamp;
use chat_media_archiver::config::Config;
use chat_media_archiver::download::HttpFetcher;
use chat_media_archiver::history::NO_CURSOR;
use chat_media_archiver::model::{ConversationItem, Message, Page, UserProfile};
use chat_media_archiver::prompt::ScriptedPrompter;
use chat_media_archiver::selection::select_conversations;
use chat_media_archiver::Result;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory account: a conversation list plus newest-first histories per peer.
struct FakeAccount {
    conversations: Vec<Value>,
    histories: HashMap<i64, Vec<Value>>,
    history_calls: Mutex<Vec<(i64, i64, u32)>>,
}

#[async_trait]
impl MessagingApi for FakeAccount {
    async fn list_conversations(&self, offset: u32, count: u32) -> Result<Page<ConversationItem>> {
        let items = self
            .conversations
            .iter()
            .skip(offset as usize)
            .take(count as usize)
            .map(|v| serde_json::from_value(v.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Page {
            count: self.conversations.len() as u64,
            items: Some(items),
        })
    }

    async fn get_history(
        &self,
        peer_id: i64,
        start_message_id: i64,
        count: u32,
    ) -> Result<Page<Message>> {
        self.history_calls
            .lock()
            .unwrap()
            .push((peer_id, start_message_id, count));
        let history = self.histories.get(&peer_id).cloned().unwrap_or_default();
        let start = if start_message_id == NO_CURSOR {
            0
        } else {
            history
                .iter()
                .position(|m| m["id"].as_i64() == Some(start_message_id))
                .unwrap_or(history.len())
        };
        let items = history[start..]
            .iter()
            .take(count as usize)
            .map(|v| serde_json::from_value(v.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Page {
            count: history.len() as u64,
            items: Some(items),
        })
    }

    async fn lookup_user(&self, user_id: i64) -> Result<UserProfile> {
        Ok(UserProfile {
            id: user_id,
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
        })
    }
}

fn conversation(id: i64, kind: &str, title: Option<&str>) -> Value {
    let mut conversation = json!({"peer": {"id": id, "type": kind}});
    if let Some(title) = title {
        conversation["chat_settings"] = json!({"title": title});
    }
    json!({"conversation": conversation})
}

const PHOTO_DATE: i64 = 1_600_000_000;

/// 250 messages, newest first. Message 200 carries a photo, message 10
/// forwards the same photo plus a gif document, message 5 a pdf.
fn busy_history(assets: &str) -> Vec<Value> {
    (1..=250i64)
        .rev()
        .map(|id| {
            let mut msg = json!({"id": id, "date": PHOTO_DATE + id, "attachments": []});
            let photo = json!({"type": "photo", "photo": {"date": PHOTO_DATE, "sizes": [
                {"url": format!("{assets}/small.jpg"), "width": 100, "height": 100},
                {"url": format!("{assets}/big.jpg"), "width": 300, "height": 200}
            ]}});
            match id {
                200 => msg["attachments"] = json!([photo]),
                10 => {
                    msg["fwd_messages"] = json!([{"date": 1, "attachments": [
                        photo,
                        {"type": "doc", "doc": {"type": 3, "ext": "gif", "title": "dance.gif",
                            "url": format!("{assets}/dance.gif"), "date": PHOTO_DATE}}
                    ]}]);
                }
                5 => {
                    msg["attachments"] = json!([{"type": "doc", "doc": {"type": 1, "ext": "pdf",
                        "title": "contract.pdf", "url": format!("{assets}/contract.pdf"), "date": 1}}]);
                }
                _ => {}
            }
            msg
        })
        .collect()
}

#[tokio::test]
async fn allow_listed_conversation_is_archived_end_to_end() {
    let assets = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"big-jpeg".to_vec()))
        .expect(1)
        .mount(&assets)
        .await;
    Mock::given(method("GET"))
        .and(path("/dance.gif"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GIF89a".to_vec()))
        .expect(1)
        .mount(&assets)
        .await;
    Mock::given(method("GET"))
        .and(path("/small.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&assets)
        .await;
    Mock::given(method("GET"))
        .and(path("/contract.pdf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&assets)
        .await;

    let chat_id = 2_000_000_001;
    let account = FakeAccount {
        conversations: vec![
            conversation(7, "user", None),
            conversation(chat_id, "chat", Some("Road/Trip")),
            conversation(-5, "group", None),
        ],
        histories: HashMap::from([(chat_id, busy_history(&assets.uri()))]),
        history_calls: Mutex::new(Vec::new()),
    };

    let out = tempfile::tempdir().unwrap();
    let config = Config::from_yaml_layers(
        &format!(
            "peer_ids_to_process: [{chat_id}]\noutput_dir: {}\n",
            out.path().display()
        ),
        None,
    )
    .unwrap();

    let mut prompter = ScriptedPrompter::new(Cursor::new(Vec::new()), Vec::new());
    let selection = select_conversations(&account, &config, &mut prompter)
        .await
        .unwrap();
    assert!(selection.complete);
    assert_eq!(selection.enumerated, 3);
    assert_eq!(selection.selected.len(), 1);
    assert_eq!(selection.selected[0].folder_name, "2000000001_Road_Trip");
    assert_eq!(selection.selected[0].message_count, 250);

    account.history_calls.lock().unwrap().clear();
    let fetcher = HttpFetcher::new(reqwest::Client::new());
    let report = Archiver::new(&account, &fetcher, &config)
        .run(&selection.selected)
        .await
        .unwrap();

    let calls = account.history_calls.lock().unwrap().clone();
    assert_eq!(calls, vec![(chat_id, NO_CURSOR, 200), (chat_id, 51, 200)]);

    let chat = &report.conversations[0];
    assert_eq!(chat.messages_processed, 250);
    assert_eq!(chat.files_written, 2);
    assert_eq!(chat.duplicates_skipped, 1);
    assert_eq!(chat.attachments_skipped, 1);

    let dir = out.path().join("2000000001_Road_Trip");
    let ts = format_timestamp(PHOTO_DATE);
    assert_eq!(
        std::fs::read(dir.join(format!("IMG_{ts}.jpg"))).unwrap(),
        b"big-jpeg"
    );
    assert_eq!(
        std::fs::read(dir.join(format!("IMG_{ts}_dance.gif"))).unwrap(),
        b"GIF89a"
    );
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
}

#[tokio::test]
async fn asset_failure_aborts_the_run() {
    let assets = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&assets)
        .await;

    let account = FakeAccount {
        conversations: vec![conversation(7, "user", None)],
        histories: HashMap::from([(7, busy_history(&assets.uri()))]),
        history_calls: Mutex::new(Vec::new()),
    };
    let out = tempfile::tempdir().unwrap();
    let config = Config {
        output_dir: out.path().to_path_buf(),
        ..Config::default()
    };

    let mut prompter = ScriptedPrompter::new(Cursor::new(b"y\n".to_vec()), Vec::new());
    let selection = select_conversations(&account, &config, &mut prompter)
        .await
        .unwrap();
    assert_eq!(selection.selected.len(), 1);

    let fetcher = HttpFetcher::new(reqwest::Client::new());
    let err = Archiver::new(&account, &fetcher, &config)
        .run(&selection.selected)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("HTTP 500"), "{err}");
}

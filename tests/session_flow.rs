//! End-to-end session flows driven through the worker loop.

use bson::{doc, Bson, Document};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use pocket_relay::relay::catalog::Catalog;
use pocket_relay::relay::core::cartridge::header_checksum;
use pocket_relay::relay::core::PatternCoreFactory;
use pocket_relay::relay::encoding::decompress_save;
use pocket_relay::relay::session::Session;
use pocket_relay::relay::worker::run_session;

fn rom(title: &str, cartridge_type: u8, ram_code: u8) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x134..0x134 + title.len()].copy_from_slice(title.as_bytes());
    rom[0x147] = cartridge_type;
    rom[0x149] = ram_code;
    rom[0x14D] = header_checksum(&rom);
    rom
}

struct Client {
    tx: UnboundedSender<Vec<u8>>,
    rx: UnboundedReceiver<Vec<u8>>,
    worker: JoinHandle<()>,
}

impl Client {
    fn start() -> Self {
        let mut catalog = Catalog::default();
        catalog.insert("TETRIS".into(), rom("TETRIS", 0x00, 0x00));
        catalog.insert("POKEMON RED".into(), rom("POKEMON RED", 0x13, 0x02));

        let session = Session::new(1, Arc::new(catalog), Arc::new(PatternCoreFactory));
        let (tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_session(session, in_rx, out_tx));
        Self { tx, rx, worker }
    }

    fn send(&self, message: Document) {
        let mut buf = Vec::new();
        message.to_writer(&mut buf).unwrap();
        self.tx.send(buf).unwrap();
    }

    async fn recv(&mut self) -> Document {
        let bytes = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("no reply")
            .expect("worker stopped");
        Document::from_reader(&mut bytes.as_slice()).unwrap()
    }

    async fn request(&mut self, message: Document) -> Document {
        self.send(message);
        self.recv().await
    }

    async fn close(self) {
        drop(self.tx);
        self.worker.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_play_draw_and_exit() {
    let mut client = Client::start();

    let started = client.request(doc! { "type": "SELECT_GAME", "index": 1 }).await;
    assert_eq!(started.get_str("type").unwrap(), "GAME_STARTED");
    assert_eq!(started.get_str("name").unwrap(), "POKEMON RED");

    client.send(doc! { "type": "PRESS_BUTTON", "button": "A" });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let frame = client.request(doc! { "type": "REQUEST_DRAW" }).await;
    assert_eq!(frame.get_str("type").unwrap(), "SCREEN_DRAW");
    assert_eq!(frame.get_i32("width").unwrap(), 160);
    assert_eq!(frame.get_i32("height").unwrap(), 145);
    assert_eq!(frame.get_array("palette").unwrap().len(), 16);
    match frame.get("screen") {
        Some(Bson::Binary(screen)) => assert_eq!(screen.bytes.len(), 160 * 145 / 2),
        other => panic!("unexpected screen field: {:?}", other),
    }

    let exited = client.request(doc! { "type": "EXIT_GAME" }).await;
    assert_eq!(exited.get_str("type").unwrap(), "GAME_EXITED");

    let error = client.request(doc! { "type": "REQUEST_DRAW" }).await;
    assert_eq!(error.get_str("type").unwrap(), "ERROR");
    assert_eq!(error.get_str("error").unwrap(), "No game running");

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_save_survives_reselect() {
    let mut client = Client::start();

    client.request(doc! { "type": "SELECT_GAME", "index": 1 }).await;
    client.send(doc! { "type": "PRESS_BUTTON", "button": "A" });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let save = client.request(doc! { "type": "GET_SAVE" }).await;
    assert_eq!(save.get_str("type").unwrap(), "SAVE_DATA");
    assert_eq!(save.get_str("gameName").unwrap(), "POKEMON RED");
    assert!(!save.get_bool("auto").unwrap());
    let data = save.get_str("data").unwrap().to_string();

    let ram = decompress_save(&data).unwrap();
    assert_eq!(ram.len(), 8 * 1024);
    assert_eq!(ram[0], 5);

    // A fresh core seeded from the blob reports the same RAM
    client
        .request(doc! { "type": "SELECT_GAME", "index": 1, "save": data.clone() })
        .await;
    let restored = client.request(doc! { "type": "GET_SAVE" }).await;
    assert_eq!(decompress_save(restored.get_str("data").unwrap()).unwrap(), ram);

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_requests_keep_session_usable() {
    let mut client = Client::start();

    let reply = client.request(doc! { "type": "SELECT_GAME", "index": 2 }).await;
    assert_eq!(reply.get_str("error").unwrap(), "Invalid game index selected");

    let reply = client
        .request(doc! { "type": "SELECT_GAME", "index": 0, "save": "not base64!" })
        .await;
    assert_eq!(reply.get_str("error").unwrap(), "Corrupt save data provided");

    client.tx.send(b"\x01\x02".to_vec()).unwrap();
    assert_eq!(client.recv().await.get_str("error").unwrap(), "Invalid data provided");

    let reply = client.request(doc! { "type": "SELECT_GAME", "index": 0 }).await;
    assert_eq!(reply.get_str("name").unwrap(), "TETRIS");

    client.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_autosave_follows_input_bursts() {
    let mut client = Client::start();

    client
        .request(doc! { "type": "SELECT_GAME", "index": 1, "autoSave": true })
        .await;

    for button in ["UP", "DOWN", "A"] {
        client.send(doc! { "type": "PRESS_BUTTON", "button": button });
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let save = client.recv().await;
    assert_eq!(save.get_str("type").unwrap(), "SAVE_DATA");
    assert!(save.get_bool("auto").unwrap());
    let ram = decompress_save(save.get_str("data").unwrap()).unwrap();
    assert_eq!(&ram[..3], &[3, 4, 5]);

    client.close().await;
}

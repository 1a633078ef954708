//! End-to-end tests: a real SSH/SFTP client against the gateway backed by
//! the in-memory store.

use std::sync::Arc;

use bytes::Bytes;
use russh::client;
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::StatusCode;
use tokio::io::AsyncWriteExt;

use bsftp::config::{AuthConfig, BackendKind, GatewayConfig, ServerConfig, StorageConfig};
use bsftp::fs::{FsHandler, HandlerSettings};
use bsftp::ssh::{generate_host_key, SessionManager};
use bsftp::storage::MemoryStore;

const USER: &str = "alice";
const PASSWORD: &str = "s3cret";

struct AcceptAnyKey;

impl client::Handler for AcceptAnyKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

struct Gateway {
    manager: Arc<SessionManager>,
    addr: std::net::SocketAddr,
    store: MemoryStore,
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.manager.stop();
    }
}

async fn start_gateway(store: MemoryStore) -> Gateway {
    let config = GatewayConfig {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".into(),
            auth_rejection_time_ms: 0,
            ..ServerConfig::default()
        },
        auth: AuthConfig {
            user: USER.into(),
            password: PASSWORD.into(),
        },
        storage: StorageConfig {
            backend: BackendKind::Memory,
            ..StorageConfig::default()
        },
        ..GatewayConfig::default()
    };

    let fs = FsHandler::new(Arc::new(store.clone()), HandlerSettings::default());
    let manager = Arc::new(SessionManager::with_host_key(
        &config,
        generate_host_key().unwrap(),
        fs,
    ));
    let listener = manager.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Arc::clone(&manager);
    tokio::spawn(async move { server.serve(listener).await });

    Gateway {
        manager,
        addr,
        store,
    }
}

async fn connect(gateway: &Gateway) -> client::Handle<AcceptAnyKey> {
    let config = Arc::new(client::Config::default());
    client::connect(config, gateway.addr, AcceptAnyKey)
        .await
        .unwrap()
}

async fn login(gateway: &Gateway) -> (client::Handle<AcceptAnyKey>, SftpSession) {
    let mut session = connect(gateway).await;
    let auth = session.authenticate_password(USER, PASSWORD).await.unwrap();
    assert!(auth.success());

    let channel = session.channel_open_session().await.unwrap();
    channel.request_subsystem(true, "sftp").await.unwrap();
    let sftp = SftpSession::new(channel.into_stream()).await.unwrap();
    (session, sftp)
}

/// Wait for the server's answer to a request sent with `want_reply`
async fn request_reply(channel: &mut Channel<client::Msg>) -> ChannelMsg {
    loop {
        match channel.wait().await {
            Some(msg @ (ChannelMsg::Success | ChannelMsg::Failure)) => return msg,
            Some(_) => continue,
            None => panic!("channel closed while waiting for a reply"),
        }
    }
}

fn status_code(err: russh_sftp::client::error::Error) -> StatusCode {
    match err {
        russh_sftp::client::error::Error::Status(status) => status.status_code,
        other => panic!("expected a status reply, got {other}"),
    }
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let gateway = start_gateway(MemoryStore::new()).await;
    let mut session = connect(&gateway).await;

    let auth = session.authenticate_password(USER, "wrong").await.unwrap();
    assert!(!auth.success());

    let auth = session.authenticate_password("mallory", PASSWORD).await.unwrap();
    assert!(!auth.success());

    let auth = session.authenticate_password(USER, PASSWORD).await.unwrap();
    assert!(auth.success());
}

#[tokio::test]
async fn test_forwarding_refused_session_survives() {
    let gateway = start_gateway(MemoryStore::new()).await;
    let mut session = connect(&gateway).await;
    assert!(session
        .authenticate_password(USER, PASSWORD)
        .await
        .unwrap()
        .success());

    let forward = session
        .channel_open_direct_tcpip("example.com", 80, "127.0.0.1", 40000)
        .await;
    assert!(forward.is_err());

    let channel = session.channel_open_session().await.unwrap();
    channel.request_subsystem(true, "sftp").await.unwrap();
    let sftp = SftpSession::new(channel.into_stream()).await.unwrap();
    assert_eq!(sftp.canonicalize(".").await.unwrap(), "/");
}

#[tokio::test]
async fn test_non_sftp_requests_declined_channel_survives() {
    let store = MemoryStore::new();
    store.insert("hello.txt", Bytes::from_static(b"hi"));
    let gateway = start_gateway(store).await;
    let mut session = connect(&gateway).await;
    assert!(session
        .authenticate_password(USER, PASSWORD)
        .await
        .unwrap()
        .success());

    let mut channel = session.channel_open_session().await.unwrap();

    channel
        .request_pty(true, "xterm", 80, 24, 0, 0, &[])
        .await
        .unwrap();
    assert!(matches!(request_reply(&mut channel).await, ChannelMsg::Failure));

    channel.exec(true, "ls -la").await.unwrap();
    assert!(matches!(request_reply(&mut channel).await, ChannelMsg::Failure));

    channel.request_shell(true).await.unwrap();
    assert!(matches!(request_reply(&mut channel).await, ChannelMsg::Failure));

    channel.request_subsystem(true, "scp").await.unwrap();
    assert!(matches!(request_reply(&mut channel).await, ChannelMsg::Failure));

    // the same channel still starts SFTP
    channel.request_subsystem(true, "sftp").await.unwrap();
    assert!(matches!(request_reply(&mut channel).await, ChannelMsg::Success));
    let sftp = SftpSession::new(channel.into_stream()).await.unwrap();
    assert_eq!(sftp.read("/hello.txt").await.unwrap(), b"hi");
}

#[tokio::test]
async fn test_upload_then_download() {
    let gateway = start_gateway(MemoryStore::new()).await;
    let (_session, sftp) = login(&gateway).await;

    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let mut file = sftp.create("/upload/data.bin").await.unwrap();
    file.write_all(&payload).await.unwrap();
    file.shutdown().await.unwrap();

    assert_eq!(
        gateway.store.get("upload/data.bin").unwrap(),
        Bytes::from(payload.clone())
    );

    let downloaded = sftp.read("/upload/data.bin").await.unwrap();
    assert_eq!(downloaded, payload);

    let meta = sftp.metadata("/upload/data.bin").await.unwrap();
    assert_eq!(meta.len(), payload.len() as u64);
    assert!(!meta.is_dir());
}

#[tokio::test]
async fn test_browse_synthetic_directories() {
    let store = MemoryStore::new();
    store.insert("a.txt", Bytes::from_static(b"hello"));
    store.insert("dir/b.txt", Bytes::from_static(b"nested"));
    store.insert("dir/sub/c.txt", Bytes::from_static(b"deeper"));
    store.insert("empty/", Bytes::new());
    let gateway = start_gateway(store).await;
    let (_session, sftp) = login(&gateway).await;

    let mut root: Vec<(String, bool)> = sftp
        .read_dir("/")
        .await
        .unwrap()
        .map(|entry| (entry.file_name(), entry.metadata().is_dir()))
        .collect();
    root.sort();
    assert_eq!(
        root,
        vec![
            ("a.txt".to_string(), false),
            ("dir".to_string(), true),
            ("empty".to_string(), true),
        ]
    );

    let mut nested: Vec<String> = sftp
        .read_dir("/dir")
        .await
        .unwrap()
        .map(|entry| entry.file_name())
        .collect();
    nested.sort();
    assert_eq!(nested, vec!["b.txt".to_string(), "sub".to_string()]);

    assert!(sftp.metadata("/").await.unwrap().is_dir());
    assert!(sftp.metadata("/dir").await.unwrap().is_dir());
    assert!(sftp.metadata("/empty").await.unwrap().is_dir());
    assert_eq!(sftp.metadata("/a.txt").await.unwrap().len(), 5);
    assert!(!sftp.try_exists("/missing").await.unwrap());
}

#[tokio::test]
async fn test_mkdir_creates_marker() {
    let gateway = start_gateway(MemoryStore::new()).await;
    let (_session, sftp) = login(&gateway).await;

    sftp.create_dir("/photos").await.unwrap();
    assert_eq!(gateway.store.get("photos/"), Some(Bytes::new()));
    assert!(sftp.metadata("/photos").await.unwrap().is_dir());

    let names: Vec<String> = sftp
        .read_dir("/")
        .await
        .unwrap()
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(names, vec!["photos".to_string()]);
}

#[tokio::test]
async fn test_unsupported_commands_leave_bucket_untouched() {
    let store = MemoryStore::new();
    store.insert("keep.txt", Bytes::from_static(b"keep"));
    let gateway = start_gateway(store).await;
    let (_session, sftp) = login(&gateway).await;

    let err = sftp.remove_file("/keep.txt").await.unwrap_err();
    assert_eq!(status_code(err), StatusCode::OpUnsupported);

    let err = sftp.rename("/keep.txt", "/moved.txt").await.unwrap_err();
    assert_eq!(status_code(err), StatusCode::OpUnsupported);

    let err = sftp.symlink("/keep.txt", "/link").await.unwrap_err();
    assert_eq!(status_code(err), StatusCode::OpUnsupported);

    assert_eq!(gateway.store.keys(), vec!["keep.txt".to_string()]);
    assert_eq!(sftp.read("/keep.txt").await.unwrap(), b"keep");
}

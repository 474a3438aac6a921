//! End-to-end tests against a containerised OpenSSH server.
//!
//! These need Docker and are ignored by default:
//! `cargo test --test ssh_integration -- --ignored`

use std::sync::Arc;
use std::time::{Duration, Instant};

use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use vps_gateway::audit::{AuditAction, AuditEntry, AuditLog};
use vps_gateway::error::GatewayError;
use vps_gateway::ssh::{CommandPolicy, SessionManager, SessionStatus, SshConfig};

const SSH_PORT: ContainerPort = ContainerPort::Tcp(2222);
const USER: &str = "gateway";
const PASSWORD: &str = "gateway-pw";

async fn start_sshd() -> (ContainerAsync<GenericImage>, u16) {
    let container = GenericImage::new("linuxserver/openssh-server", "latest")
        .with_exposed_port(SSH_PORT)
        .with_wait_for(WaitFor::message_on_stdout("[ls.io-init] done."))
        .with_env_var("PUID", "1000")
        .with_env_var("PGID", "1000")
        .with_env_var("USER_NAME", USER)
        .with_env_var("USER_PASSWORD", PASSWORD)
        .with_env_var("PASSWORD_ACCESS", "true")
        .start()
        .await
        .unwrap();
    let port = container.get_host_port_ipv4(2222).await.unwrap();
    (container, port)
}

fn manager(port: u16, policy: CommandPolicy) -> SessionManager {
    audited_manager(port, policy, Arc::new(AuditLog::tracing_only()))
}

fn audited_manager(port: u16, policy: CommandPolicy, audit: Arc<AuditLog>) -> SessionManager {
    SessionManager::new(
        SshConfig::new("127.0.0.1", USER)
            .with_port(port)
            .with_password(PASSWORD),
        policy,
        audit,
    )
}

fn read_audit(path: &std::path::Path) -> Vec<AuditEntry> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn entries_for(entries: &[AuditEntry], action: AuditAction) -> Vec<&AuditEntry> {
    entries.iter().filter(|e| e.action == action).collect()
}

#[tokio::test]
#[ignore]
async fn connect_is_idempotent() {
    let (_container, port) = start_sshd().await;
    let session = manager(port, CommandPolicy::default());

    session.connect().await.unwrap();
    session.connect().await.unwrap();
    assert_eq!(session.status().await, SessionStatus::Connected);

    session.disconnect().await;
    session.disconnect().await;
    assert_eq!(session.status().await, SessionStatus::Disconnected);
}

#[tokio::test]
#[ignore]
async fn wrong_password_is_authentication_error() {
    let (_container, port) = start_sshd().await;
    let session = SessionManager::new(
        SshConfig::new("127.0.0.1", USER)
            .with_port(port)
            .with_password("not-the-password"),
        CommandPolicy::default(),
        Arc::new(AuditLog::tracing_only()),
    );

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, GatewayError::Authentication(_)), "{err}");
    assert!(!session.is_connected().await);
}

#[tokio::test]
#[ignore]
async fn reports_exit_code_and_trimmed_output() {
    let (_container, port) = start_sshd().await;
    let session = manager(port, CommandPolicy::default());
    session.connect().await.unwrap();

    let result = session
        .execute_command("echo '  hello  '; echo oops >&2; exit 3", None)
        .await
        .unwrap();
    assert_eq!(result.stdout, "hello");
    assert_eq!(result.stderr, "oops");
    assert_eq!(result.exit_code, Some(3));
    assert!(!result.success());

    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn whitelist_allows_listed_commands_only() {
    let (_container, port) = start_sshd().await;
    let policy = CommandPolicy::new(true, vec!["uptime".into(), "df".into()]);
    let session = manager(port, policy);
    session.connect().await.unwrap();

    let result = session.execute_command("uptime", None).await.unwrap();
    assert_eq!(result.exit_code, Some(0));

    let err = session.execute_command("rm -rf /tmp", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::PolicyViolation(_)));

    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn slow_command_times_out() {
    let (_container, port) = start_sshd().await;
    let session = manager(port, CommandPolicy::default());
    session.connect().await.unwrap();

    let started = Instant::now();
    let err = session
        .execute_command("sleep 5", Some(50))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(50)));
    assert!(started.elapsed() < Duration::from_secs(2));

    // The session stays usable after a timeout
    let result = session.execute_command("echo ok", None).await.unwrap();
    assert_eq!(result.stdout, "ok");

    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn system_info_has_every_field() {
    let (_container, port) = start_sshd().await;
    let session = manager(port, CommandPolicy::default());
    session.connect().await.unwrap();

    let info = session.get_system_info().await;
    let value = serde_json::to_value(&info).unwrap();
    for key in ["hostname", "uptime", "loadAverage", "memoryUsage", "diskUsage"] {
        assert!(value[key].is_string(), "missing {key}");
    }
    assert!(!info.hostname.starts_with("Error:"));

    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn upload_then_download_round_trips() {
    let (_container, port) = start_sshd().await;
    let session = manager(port, CommandPolicy::default());
    session.connect().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("payload.bin");
    let back = dir.path().join("payload.copy");
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&local, &payload).unwrap();

    let remote = "/tmp/payload.bin";
    session
        .upload_file(local.to_str().unwrap(), remote)
        .await
        .unwrap();
    session
        .download_file(remote, back.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&back).unwrap(), payload);

    let entries = session.list_directory("/tmp").await.unwrap();
    let entry = entries.iter().find(|e| e.name == "payload.bin").unwrap();
    assert_eq!(entry.size, payload.len() as u64);
    assert!(entries.iter().all(|e| e.name != "." && e.name != ".."));

    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn policy_rejection_is_audited_without_running() {
    let (_container, port) = start_sshd().await;
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let audit = Arc::new(AuditLog::with_file(&audit_path).await.unwrap());
    let policy = CommandPolicy::new(true, vec!["uptime".into(), "df".into()]);
    let session = audited_manager(port, policy, audit);
    session.connect().await.unwrap();

    let err = session
        .execute_command("touch /tmp/should-not-exist", None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::PolicyViolation(_)));

    let entries = read_audit(&audit_path);
    let executed = entries_for(&entries, AuditAction::ExecuteCommand);
    assert_eq!(executed.len(), 1);
    assert!(!executed[0].success);
    assert!(executed[0].details.get("exitCode").is_none());
    assert!(executed[0].error.as_deref().unwrap().contains("whitelist"));

    // Nothing ran on the host
    let checker = manager(port, CommandPolicy::default());
    checker.connect().await.unwrap();
    let result = checker
        .execute_command("test -e /tmp/should-not-exist", None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(1));

    checker.disconnect().await;
    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn concurrent_connect_opens_one_session() {
    let (_container, port) = start_sshd().await;
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let audit = Arc::new(AuditLog::with_file(&audit_path).await.unwrap());
    let session = audited_manager(port, CommandPolicy::default(), audit);

    let (first, second) = tokio::join!(session.connect(), session.connect());
    first.unwrap();
    second.unwrap();
    assert_eq!(session.status().await, SessionStatus::Connected);

    let entries = read_audit(&audit_path);
    let connects = entries_for(&entries, AuditAction::Connect);
    assert_eq!(connects.len(), 1);
    assert!(connects[0].success);

    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn concurrent_first_transfers_share_one_channel() {
    let (_container, port) = start_sshd().await;
    let session = manager(port, CommandPolicy::default());
    session.connect().await.unwrap();

    let (a, b, c) = tokio::join!(
        session.list_directory("/tmp"),
        session.list_directory("/etc"),
        session.list_directory("/tmp"),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let servers = session
        .execute_command("pgrep -u gateway -c sftp-server", None)
        .await
        .unwrap();
    assert_eq!(servers.stdout, "1");

    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn transfer_channel_reopens_after_loss() {
    let (_container, port) = start_sshd().await;
    let session = manager(port, CommandPolicy::default());
    session.connect().await.unwrap();
    session.list_directory("/tmp").await.unwrap();

    // Kill the SFTP server behind the cached channel
    session
        .execute_command("pkill -u gateway sftp-server", None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // At most one call observes the dead channel; the next one reopens it
    if let Err(e) = session.list_directory("/tmp").await {
        assert!(matches!(e, GatewayError::Transfer(_)), "{e}");
    }
    session.list_directory("/tmp").await.unwrap();

    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn transfer_channel_follows_new_session() {
    let (_container, port) = start_sshd().await;
    let session = manager(port, CommandPolicy::default());

    session.connect().await.unwrap();
    session.list_directory("/tmp").await.unwrap();
    session.disconnect().await;

    assert!(matches!(
        session.list_directory("/tmp").await,
        Err(GatewayError::NotConnected)
    ));

    session.connect().await.unwrap();
    session.list_directory("/tmp").await.unwrap();
    session.disconnect().await;
}

#[tokio::test]
#[ignore]
async fn failed_transfer_is_audited() {
    let (_container, port) = start_sshd().await;
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let audit = Arc::new(AuditLog::with_file(&audit_path).await.unwrap());
    let session = audited_manager(port, CommandPolicy::default(), audit);
    session.connect().await.unwrap();

    let local = dir.path().join("missing.txt");
    let err = session
        .download_file("/no/such/file", local.to_str().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transfer(_)));

    // A status error leaves the channel usable
    session.list_directory("/tmp").await.unwrap();

    let entries = read_audit(&audit_path);
    let downloads = entries_for(&entries, AuditAction::DownloadFile);
    assert_eq!(downloads.len(), 1);
    assert!(!downloads[0].success);
    assert_eq!(downloads[0].details["remotePath"], "/no/such/file");

    session.disconnect().await;
}

#![cfg(unix)]

use std::sync::{Arc, Mutex};

use admin_ipc::{send_request, AdminRequest, AdminResponse, AdminStatus};
use anyhow::anyhow;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, Duration};

#[derive(Debug, Default)]
struct FakeService {
    paused: bool,
    refreshes: usize,
}

fn status(service: &FakeService) -> AdminResponse {
    AdminResponse::Status(AdminStatus {
        run_id: "run-123".to_string(),
        fetch_state: "streaming".to_string(),
        refresh_running: !service.paused,
        markets: service.refreshes,
        records: service.refreshes * 2,
        built_at_ms: (service.refreshes > 0).then_some(1_700_000_000_000),
    })
}

async fn expect_status(socket: &std::path::Path) -> AdminStatus {
    match send_request(socket, &AdminRequest::Status)
        .await
        .expect("status")
    {
        AdminResponse::Status(status) => status,
        other => panic!("expected status response, got {other:?}"),
    }
}

#[tokio::test]
async fn status_pause_resume_refresh_flow() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket_path = dir.path().join("admin.sock");

    let service = Arc::new(Mutex::new(FakeService::default()));
    let handler_state = Arc::clone(&service);

    let server_task = tokio::spawn(admin_ipc::run_server(socket_path.clone(), move |req| {
        let state = Arc::clone(&handler_state);
        async move {
            let mut service = state.lock().map_err(|_| anyhow!("state poisoned"))?;
            match req {
                AdminRequest::Status => Ok(status(&service)),
                AdminRequest::Pause => {
                    service.paused = true;
                    Ok(AdminResponse::Ack)
                }
                AdminRequest::Resume => {
                    service.paused = false;
                    Ok(AdminResponse::Ack)
                }
                AdminRequest::Refresh if service.paused => Err(anyhow!("refresh source offline")),
                AdminRequest::Refresh => {
                    service.refreshes += 1;
                    Ok(status(&service))
                }
            }
        }
    }));

    // Allow the server task to start listening.
    sleep(Duration::from_millis(50)).await;

    let initial = expect_status(&socket_path).await;
    assert!(initial.refresh_running);
    assert_eq!(initial.built_at_ms, None);

    let pause = send_request(&socket_path, &AdminRequest::Pause)
        .await
        .expect("pause resp");
    assert_eq!(pause, AdminResponse::Ack);
    assert!(!expect_status(&socket_path).await.refresh_running);

    match send_request(&socket_path, &AdminRequest::Refresh)
        .await
        .expect("refresh resp")
    {
        AdminResponse::Error(message) => assert!(message.contains("offline")),
        other => panic!("handler failure should come back as an error, got {other:?}"),
    }

    let resume = send_request(&socket_path, &AdminRequest::Resume)
        .await
        .expect("resume resp");
    assert_eq!(resume, AdminResponse::Ack);

    match send_request(&socket_path, &AdminRequest::Refresh)
        .await
        .expect("refresh resp")
    {
        AdminResponse::Status(status) => {
            assert_eq!(status.markets, 1);
            assert!(status.built_at_ms.is_some());
        }
        other => panic!("expected status after refresh, got {other:?}"),
    }

    server_task.abort();
}

#[tokio::test]
async fn malformed_request_gets_error_reply() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket_path = dir.path().join("admin.sock");
    let server_task = tokio::spawn(admin_ipc::run_server(socket_path.clone(), |_req| async {
        Ok::<_, anyhow::Error>(AdminResponse::Ack)
    }));
    sleep(Duration::from_millis(50)).await;

    let stream = UnixStream::connect(&socket_path).await.expect("connect");
    let (read_half, mut write_half) = stream.into_split();
    write_half
        .write_all(b"{\"type\":\"Reboot\"}\n")
        .await
        .expect("write");
    let mut line = String::new();
    BufReader::new(read_half)
        .read_line(&mut line)
        .await
        .expect("read");
    let resp: AdminResponse = serde_json::from_str(line.trim()).expect("decode");
    assert!(matches!(resp, AdminResponse::Error(message) if message.contains("malformed")));

    server_task.abort();
}

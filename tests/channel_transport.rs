use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use clisync::error::{ReconcileError, TransportError};
use clisync::model::Value;
use clisync::path::Path;
use clisync::reader::ReadContext;
use clisync::templates;
use clisync::transport::{ChannelTransport, CmdJob, Output};
use clisync::writer::WriteContext;
use tokio::sync::mpsc;

/// Fake session worker: answers reads from `outputs`, accepts every config
/// line except those starting with `reject`, and logs what it ran.
fn spawn_device(outputs: HashMap<&'static str, &'static str>) -> (ChannelTransport, Arc<Mutex<Vec<String>>>) {
    let (tx, mut rx) = mpsc::channel::<CmdJob>(16);
    let log = Arc::new(Mutex::new(Vec::new()));
    let worker_log = log.clone();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            worker_log
                .lock()
                .expect("log lock")
                .push(format!("{}: {}", job.data.mode, job.data.command));
            let reply = if job.data.mode == "Config" {
                Output {
                    success: !job.data.command.starts_with("reject"),
                    content: String::new(),
                }
            } else {
                match outputs.get(job.data.command.as_str()) {
                    Some(content) => Output {
                        success: true,
                        content: content.to_string(),
                    },
                    None => Output {
                        success: false,
                        content: "% Invalid input detected at '^' marker.".to_string(),
                    },
                }
            };
            let _ = job.responder.send(Ok(reply));
        }
    });
    (ChannelTransport::new(tx), log)
}

#[tokio::test]
async fn upstream_round_trip_through_session_worker() {
    let (mut transport, log) = spawn_device(HashMap::from([(
        "show running-config interface upstream 1/0.1",
        "interface Upstream 1/0.1\n cable-mac 7\n shutdown\nend\n",
    )]));
    let registry = templates::by_name("cmts").expect("cmts profile");
    let path = Path::root().child("upstream", "1/0.1");
    let handler = registry.resolve(&path).expect("handler");

    let before = {
        let mut ctx = ReadContext::new(&mut transport);
        handler.read_entity(&path, &mut ctx).await.expect("read")
    };
    assert_eq!(before.field("cable_mac"), Some(&Value::from("7")));
    assert_eq!(before.field("enabled"), Some(&Value::Bool(false)));

    let after = before
        .clone()
        .with_field("cable_mac", "8")
        .with_field("enabled", true);
    let mut ctx = WriteContext::new(&mut transport);
    handler
        .update_entity(&path, &before, &after, &mut ctx)
        .await
        .expect("update");

    let ran = log.lock().expect("log lock").clone();
    assert_eq!(
        ran,
        vec![
            "Enable: show running-config interface upstream 1/0.1",
            "Config: interface upstream 1/0.1",
            "Config: cable-mac 8",
            "Config: no shutdown",
            "Config: exit",
        ]
    );
}

#[tokio::test]
async fn unknown_show_command_surfaces_as_read_failed() {
    let (mut transport, _log) = spawn_device(HashMap::new());
    let registry = templates::by_name("ios").expect("ios profile");
    let path = Path::root().child("interface", "Gi0/1");
    let mut ctx = ReadContext::new(&mut transport);
    let err = registry
        .resolve(&path)
        .expect("handler")
        .read_entity(&path, &mut ctx)
        .await
        .expect_err("device rejects the show");

    assert!(matches!(
        err.transport_error(),
        Some(TransportError::CommandRejected { .. })
    ));
    assert!(matches!(err, ReconcileError::ReadFailed { .. }));
}

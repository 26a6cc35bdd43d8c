use clisync::error::{ReconcileError, TransportError};
use clisync::model::{Entity, Value};
use clisync::path::Path;
use clisync::reader::ReadContext;
use clisync::skeleton::{Bindings, Skeleton};
use clisync::templates;
use clisync::transport::{
    NormalizeOptions, RecordingTransport, ReplayTransport, TransportRecorder,
};
use clisync::writer::{ContextSnapshot, WriteContext, WriteKind};

const IOS_FIXTURE: &str = include_str!("fixtures/ios_interfaces.jsonl");
const CMTS_FIXTURE: &str = include_str!("fixtures/cmts_upstream.jsonl");
const FAILURE_FIXTURE: &str = include_str!("fixtures/ios_failures.jsonl");

fn interface(name: &str) -> Path {
    Path::root().child("interface", name)
}

fn replay(fixture: &str) -> ReplayTransport {
    ReplayTransport::from_jsonl(fixture).expect("load fixture")
}

async fn read_ios(name: &str) -> Entity {
    let registry = templates::by_name("ios").expect("ios profile");
    let path = interface(name);
    let mut transport = replay(IOS_FIXTURE);
    let mut ctx = ReadContext::new(&mut transport);
    registry
        .resolve(&path)
        .expect("interface handler")
        .read_entity(&path, &mut ctx)
        .await
        .expect("read interface")
}

#[tokio::test]
async fn ios_read_extracts_interface_fields() {
    let entity = read_ios("GigabitEthernet0/1").await;

    assert_eq!(entity.field("description"), Some(&Value::from("uplink to core")));
    assert_eq!(entity.field("mtu"), Some(&Value::Int(9000)));
    assert_eq!(entity.field("ospf_cost"), Some(&Value::Int(40)));
    assert_eq!(entity.field("enabled"), Some(&Value::Bool(false)));
}

#[tokio::test]
async fn repeated_reads_yield_equal_entities() {
    let first = read_ios("GigabitEthernet0/1").await;
    let second = read_ios("GigabitEthernet0/1").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn unmatched_patterns_leave_fields_absent() {
    let entity = read_ios("GigabitEthernet0/2").await;
    assert!(entity.is_empty(), "{entity:?}");
}

#[tokio::test]
async fn collection_read_visits_every_listed_interface() {
    let registry = templates::by_name("ios").expect("ios profile");
    let collection = Path::root().container("interface");
    let handler = registry.resolve(&collection).expect("handler");
    let mut transport = replay(IOS_FIXTURE);
    let mut ctx = ReadContext::new(&mut transport);

    let members = handler
        .read_all(&collection, &mut ctx)
        .await
        .expect("read all");
    let keys = members.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
    assert_eq!(
        keys,
        vec!["GigabitEthernet0/1", "GigabitEthernet0/2", "Loopback0"]
    );
    assert_eq!(ctx.issued(), 4);
}

#[tokio::test]
async fn cmts_upstream_reads_cable_mac() {
    let registry = templates::by_name("cmts").expect("cmts profile");
    let path = Path::root().child("upstream", "1/0.0");
    let mut transport = replay(CMTS_FIXTURE);
    let mut ctx = ReadContext::new(&mut transport);
    let entity = registry
        .resolve(&path)
        .expect("upstream handler")
        .read_entity(&path, &mut ctx)
        .await
        .expect("read upstream");

    assert_eq!(entity.field("cable_mac"), Some(&Value::from("7")));
    assert_eq!(entity.field("channel_width"), Some(&Value::Int(6400000)));
    assert_eq!(entity.field("enabled"), None);
}

#[tokio::test]
async fn modulation_entries_are_zipped_by_line_order() {
    let registry = templates::by_name("cmts").expect("cmts profile");
    let path = Path::root().child("modulation-profile", "3");
    let mut transport = replay(CMTS_FIXTURE);
    let mut ctx = ReadContext::new(&mut transport);
    let entity = registry
        .resolve(&path)
        .expect("modulation handler")
        .read_entity(&path, &mut ctx)
        .await
        .expect("read modulation profile");

    let entries = entity.list("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].field("iuc"), Some(&Value::from("request")));
    assert_eq!(entries[0].field("modulation"), Some(&Value::from("qpsk")));
    assert_eq!(entries[1].field("iuc"), Some(&Value::from("short")));
    assert_eq!(entries[1].field("modulation"), Some(&Value::from("64qam")));
}

#[tokio::test]
async fn listed_profile_that_cannot_be_read_is_inconsistent() {
    let registry = templates::by_name("cmts").expect("cmts profile");
    let collection = Path::root().container("modulation-profile");
    let mut transport = replay(CMTS_FIXTURE);
    let mut ctx = ReadContext::new(&mut transport);
    let err = registry
        .resolve(&collection)
        .expect("handler")
        .read_all(&collection, &mut ctx)
        .await
        .expect_err("profile 5 is listed but missing");

    assert!(matches!(
        err,
        ReconcileError::InconsistentKeys { ref key, .. } if key == "5"
    ));
}

#[tokio::test]
async fn disabling_an_interface_plans_shutdown() {
    let registry = templates::by_name("ios").expect("ios profile");
    let before = read_ios("GigabitEthernet0/2").await;
    let after = before.clone().with_field("enabled", false);
    let path = interface("GigabitEthernet0/2");

    let batch = registry
        .resolve(&path)
        .expect("handler")
        .writer()
        .expect("writer")
        .plan_update(&path, &before, &after, &ContextSnapshot::new())
        .expect("plan");
    assert_eq!(
        batch.lines,
        vec!["interface GigabitEthernet0/2", "shutdown", "exit"]
    );
}

#[tokio::test]
async fn enabling_an_interface_sends_no_shutdown() {
    let registry = templates::by_name("ios").expect("ios profile");
    let path = interface("GigabitEthernet0/1");
    let handler = registry.resolve(&path).expect("handler");
    let mut transport = replay(IOS_FIXTURE);

    let before = {
        let mut ctx = ReadContext::new(&mut transport);
        handler.read_entity(&path, &mut ctx).await.expect("read")
    };
    let after = before.clone().with_field("enabled", true);

    let mut ctx = WriteContext::new(&mut transport);
    let batch = handler
        .update_entity(&path, &before, &after, &mut ctx)
        .await
        .expect("update");
    assert_eq!(batch.kind, WriteKind::Update);
    assert_eq!(
        batch.lines,
        vec!["interface GigabitEthernet0/1", "no shutdown", "exit"]
    );
    assert_eq!(transport.remaining(), 0);
}

#[tokio::test]
async fn modulation_entries_are_replaced_as_a_unit() {
    let registry = templates::by_name("cmts").expect("cmts profile");
    let path = Path::root().child("modulation-profile", "3");
    let handler = registry.resolve(&path).expect("handler");
    let mut transport = replay(CMTS_FIXTURE);

    let before = {
        let mut ctx = ReadContext::new(&mut transport);
        handler.read_entity(&path, &mut ctx).await.expect("read")
    };
    let mut entries = before.list("entries").to_vec();
    entries[1] = Entity::new()
        .with_field("iuc", "long")
        .with_field("modulation", "16qam");
    let after = before.clone().with_list("entries", entries);

    let mut ctx = WriteContext::new(&mut transport);
    let batch = handler
        .update_entity(&path, &before, &after, &mut ctx)
        .await
        .expect("update");
    assert_eq!(
        batch.lines,
        vec![
            "cable modulation-profile 3",
            "no request",
            "no short",
            "request qpsk",
            "long 16qam",
            "exit"
        ]
    );
}

#[test]
fn cost_skeleton_renders_only_when_bound() {
    let skeleton = Skeleton::parse("{% if (cost) %}cost {cost}{% endif %}").expect("parse");
    assert_eq!(skeleton.render(&Bindings::new()).expect("absent"), "");
    assert_eq!(
        skeleton
            .render(&Bindings::new().with("cost", 40))
            .expect("bound"),
        "cost 40"
    );
}

#[tokio::test]
async fn unchanged_update_sends_nothing() {
    let registry = templates::by_name("ios").expect("ios profile");
    let path = interface("GigabitEthernet0/1");
    let entity = read_ios("GigabitEthernet0/1").await;

    let mut transport = ReplayTransport::from_recorder(&TransportRecorder::new());
    let mut ctx = WriteContext::new(&mut transport);
    let batch = registry
        .resolve(&path)
        .expect("handler")
        .update_entity(&path, &entity, &entity, &mut ctx)
        .await
        .expect("no-op update");
    assert!(batch.is_empty());
}

#[test]
fn interface_delete_is_a_single_command() {
    let registry = templates::by_name("ios").expect("ios profile");
    let path = interface("Loopback0");
    let batch = registry
        .resolve(&path)
        .expect("handler")
        .writer()
        .expect("writer")
        .plan_delete(&path, &Entity::new(), &ContextSnapshot::new())
        .expect("plan delete");
    assert_eq!(batch.lines, vec!["no interface Loopback0"]);
}

#[tokio::test]
async fn upstream_channels_cannot_be_deleted() {
    let registry = templates::by_name("cmts").expect("cmts profile");
    let path = Path::root().child("upstream", "1/0.0");
    let mut transport = ReplayTransport::from_recorder(&TransportRecorder::new());
    let mut ctx = WriteContext::new(&mut transport);
    let err = registry
        .resolve(&path)
        .expect("handler")
        .delete_entity(&path, &Entity::new(), &mut ctx)
        .await
        .expect_err("no delete form");
    assert!(matches!(err, ReconcileError::UnsupportedOperation { .. }));
}

#[tokio::test]
async fn rejected_show_is_read_failed() {
    let registry = templates::by_name("ios").expect("ios profile");
    let path = interface("GigabitEthernet0/9");
    let mut transport = replay(FAILURE_FIXTURE);
    let mut ctx = ReadContext::new(&mut transport);
    let err = registry
        .resolve(&path)
        .expect("handler")
        .read_entity(&path, &mut ctx)
        .await
        .expect_err("rejected");

    match err {
        ReconcileError::ReadFailed {
            command, reason, ..
        } => {
            assert_eq!(command, "show running-config interface GigabitEthernet0/9");
            assert!(matches!(reason, TransportError::CommandRejected { .. }));
        }
        other => panic!("unexpected error type: {other}"),
    }
}

#[tokio::test]
async fn rejected_batch_is_write_failed_with_attempted_lines() {
    let registry = templates::by_name("ios").expect("ios profile");
    let path = interface("GigabitEthernet0/1");
    let mut transport = replay(FAILURE_FIXTURE);
    let mut ctx = WriteContext::new(&mut transport);
    let err = registry
        .resolve(&path)
        .expect("handler")
        .update_entity(
            &path,
            &Entity::new().with_field("mtu", 9000),
            &Entity::new().with_field("mtu", 99999),
            &mut ctx,
        )
        .await
        .expect_err("rejected");

    assert!(err.transport_error().is_some());
    match err {
        ReconcileError::WriteFailed { commands, .. } => {
            assert_eq!(
                commands,
                vec!["interface GigabitEthernet0/1", "mtu 99999", "exit"]
            );
        }
        other => panic!("unexpected error type: {other}"),
    }
}

#[tokio::test]
async fn recorded_session_replays_to_the_same_entity() {
    let registry = templates::by_name("ios").expect("ios profile");
    let path = interface("GigabitEthernet0/1");
    let handler = registry.resolve(&path).expect("handler");

    let recorder = TransportRecorder::new();
    let mut recording = RecordingTransport::new(replay(IOS_FIXTURE), recorder.clone());
    let live = {
        let mut ctx = ReadContext::new(&mut recording);
        handler.read_entity(&path, &mut ctx).await.expect("live read")
    };

    let jsonl = recorder.to_jsonl().expect("export");
    let normalized = TransportRecorder::normalize_jsonl(&jsonl, NormalizeOptions::default())
        .expect("normalize");
    let mut offline = replay(&normalized);
    let mut ctx = ReadContext::new(&mut offline);
    let replayed = handler
        .read_entity(&path, &mut ctx)
        .await
        .expect("offline read");

    assert_eq!(live, replayed);
}

//! Integration tests for protocol serialization

use chrono::Utc;
use interview_room::error::ErrorKind;
use interview_room::protocol::{
    deserialize, read_message, serialize, write_frame, ClientMessage, ServerMessage,
};
use interview_room::roster::AttributeUpdate;
use interview_room::session::{Identity, NewInterview, RoleLookup, SessionId};
use interview_room::workspace::{Language, WorkspaceEdit};
use interview_room::SessionError;

#[test]
fn test_client_message_roundtrip() {
    let messages = vec![
        ClientMessage::Hello {
            protocol_version: 1,
            identity: Identity::from("alice"),
            display_name: Some("Alice".to_string()),
        },
        ClientMessage::Schedule {
            interview: NewInterview {
                title: "Pairing".to_string(),
                description: None,
                scheduled_start: Utc::now(),
                invited: vec![Identity::from("bob")],
            },
        },
        ClientMessage::ProposeEdit {
            edit: WorkspaceEdit::Language(Language::Java),
            known_revision: 4,
        },
        ClientMessage::UpdateAttributes {
            update: AttributeUpdate::muted(true),
        },
        ClientMessage::GetHistory { after: 12 },
        ClientMessage::RequestTermination {
            session_id: SessionId::new(),
        },
    ];

    for msg in messages {
        let encoded = serialize(&msg).expect("serialize failed");
        let decoded: ClientMessage = deserialize(&encoded).expect("deserialize failed");

        // Compare debug representations since ClientMessage doesn't derive PartialEq
        assert_eq!(format!("{:?}", msg), format!("{:?}", decoded));
    }
}

#[test]
fn test_session_error_keeps_its_kind() {
    let msg = ServerMessage::from(SessionError::StaleRevision {
        known: 2,
        current: 3,
    });

    let decoded: ServerMessage = deserialize(&serialize(&msg).unwrap()).unwrap();
    match decoded {
        ServerMessage::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::StaleRevision);
            assert!(message.contains("known 2, current 3"));
        }
        other => panic!("Expected Error, got {:?}", other),
    }
}

#[test]
fn test_garbage_is_malformed() {
    let err = deserialize::<ClientMessage>(&[0xc1, 0x00, 0xff]).unwrap_err();
    assert!(err.to_string().contains("Malformed message"));
}

#[tokio::test]
async fn test_frames_survive_a_byte_stream() {
    let mut buffer = Vec::new();
    write_frame(
        &mut buffer,
        &ServerMessage::Identified {
            identity: Identity::from("carol"),
            role: RoleLookup::Pending,
        },
    )
    .await
    .unwrap();
    write_frame(&mut buffer, &ServerMessage::ack("Leave"))
        .await
        .unwrap();

    let mut reader: &[u8] = &buffer;
    let first: ServerMessage = read_message(&mut reader).await.unwrap().unwrap();
    let second: ServerMessage = read_message(&mut reader).await.unwrap().unwrap();
    let end: Option<ServerMessage> = read_message(&mut reader).await.unwrap();

    assert!(matches!(
        first,
        ServerMessage::Identified {
            role: RoleLookup::Pending,
            ..
        }
    ));
    assert!(matches!(second, ServerMessage::Ack { for_command } if for_command == "Leave"));
    assert!(end.is_none());
}

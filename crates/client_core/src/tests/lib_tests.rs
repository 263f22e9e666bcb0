use super::*;
use shared::error::{ApiError, ErrorCode};

#[tokio::test]
async fn missing_client_reports_network_errors() {
    let client = MissingResourceClient;

    let err = client
        .list_items(&QueryDescriptor::default())
        .await
        .expect_err("missing client cannot list");
    assert!(matches!(err, SyncError::Network(_)));
    assert!(err.is_retryable());

    let err = client
        .delete_shopping_items(&[ShoppingItemId(1)])
        .await
        .expect_err("missing client cannot delete");
    assert!(matches!(err, SyncError::Network(_)));
}

#[test]
fn only_network_errors_are_retryable() {
    assert!(SyncError::Network("timed out".into()).is_retryable());
    assert!(!SyncError::Validation("name is required".into()).is_retryable());
    assert!(!SyncError::NotFound("item 3".into()).is_retryable());
    assert!(!SyncError::Unknown("boom".into()).is_retryable());
}

#[test]
fn api_errors_map_onto_the_sync_taxonomy() {
    let cases = [
        (400, SyncError::Validation("bad".into())),
        (422, SyncError::Validation("bad".into())),
        (404, SyncError::NotFound("bad".into())),
        (401, SyncError::Unknown("bad".into())),
        (500, SyncError::Unknown("bad".into())),
    ];
    for (status, expected) in cases {
        let err: SyncError = ApiError::new(ErrorCode::from_status(status), "bad").into();
        assert_eq!(err, expected, "status {status}");
    }
}

#[test]
fn invalid_transition_becomes_unknown() {
    let err: SyncError = MutationPhase::Committed
        .transition(MutationEvent::Apply)
        .expect_err("committed is terminal")
        .into();
    assert!(matches!(err, SyncError::Unknown(message) if message.contains("Committed")));
}

//! Tests for the app's query functions driven through a controller.

#![cfg(feature = "memory-backend")]

use query_lifecycle::api::{
    avatar_path, Category, DownloadAvatar, FetchCategories, FetchGoals, GoalPage, UploadAvatar,
    AVATARS_BUCKET, CATEGORIES_TABLE, GOALS_TABLE,
};
use query_lifecycle::backend::memory::MemoryBackend;
use query_lifecycle::backend::{BackendError, Client};
use query_lifecycle::{ControllerBuilder, FetchStatus, QueryController, QueryFn};
use serde_json::json;
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_rows(
        CATEGORIES_TABLE,
        [
            json!({ "id": 2, "name": "Strength", "icon": "dumbbell" }),
            json!({ "id": 1, "name": "Cardio" }),
        ],
    );
    backend.insert_rows(
        GOALS_TABLE,
        (1..=5).map(|i| {
            json!({
                "id": i,
                "title": format!("Goal {i}"),
                "category_id": if i % 2 == 0 { 2 } else { 1 },
                "target": 10.0,
                "progress": i as f64,
                "created_at": format!("2024-01-0{i}T00:00:00Z"),
            })
        }),
    );
    backend
}

fn client_for(backend: &Arc<MemoryBackend>) -> Client {
    Client::new(backend.clone())
}

// =============================================================================
// Categories
// =============================================================================

#[tokio::test]
async fn test_categories_ordered_by_name() {
    let backend = seeded_backend();
    let controller = QueryController::new(FetchCategories::new(client_for(&backend)), ()).unwrap();

    let state = controller.settled().await;
    let categories = state.data.expect("categories should load");
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Cardio", "Strength"]);
    assert_eq!(
        categories[1],
        Category {
            id: 2,
            name: "Strength".to_string(),
            icon: Some("dumbbell".to_string()),
        }
    );
}

#[tokio::test]
async fn test_categories_failure_keeps_stale_list() {
    let backend = seeded_backend();
    let controller = QueryController::new(FetchCategories::new(client_for(&backend)), ()).unwrap();
    controller.settled().await;

    backend.fail_next(CATEGORIES_TABLE, BackendError::rejected("PGRST301", "JWT expired"));
    controller.refetch();
    let state = controller.settled().await;

    assert_eq!(state.status(), FetchStatus::Failed);
    assert_eq!(state.data.map(|c| c.len()), Some(2));
    let error = state.error.unwrap();
    assert_eq!(
        error.downcast_ref::<BackendError>(),
        Some(&BackendError::rejected("PGRST301", "JWT expired"))
    );
}

#[tokio::test]
async fn test_undecodable_rows_are_envelope_errors() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_rows(CATEGORIES_TABLE, [json!({ "id": "one" })]);
    let envelope = FetchCategories::new(client_for(&backend))
        .call(())
        .await
        .unwrap();
    let err = envelope.into_result().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BackendError>(),
        Some(BackendError::Decode(_))
    ));
}

// =============================================================================
// Goals
// =============================================================================

#[tokio::test]
async fn test_goal_pages_follow_args() {
    let backend = seeded_backend();
    let controller = ControllerBuilder::new()
        .name("goals")
        .build(FetchGoals::new(client_for(&backend)), GoalPage::first(2))
        .unwrap();

    let first = controller.settled().await.data.unwrap();
    assert_eq!(first.iter().map(|g| g.id).collect::<Vec<_>>(), vec![5, 4]);

    controller.set_args(GoalPage::first(2).next_page());
    let second = controller.settled().await.data.unwrap();
    assert_eq!(second.iter().map(|g| g.id).collect::<Vec<_>>(), vec![3, 2]);

    controller.set_args(GoalPage::first(2).next_page().next_page().next_page());
    let past_end = controller.settled().await;
    assert!(past_end.error.is_none());
    assert_eq!(past_end.data.map(|g| g.len()), Some(0));
}

#[tokio::test]
async fn test_goals_filtered_by_category() {
    let backend = seeded_backend();
    let page = GoalPage::first(10).in_category(2);
    let goals = FetchGoals::new(client_for(&backend))
        .call(page)
        .await
        .unwrap()
        .into_result()
        .unwrap()
        .unwrap();
    assert_eq!(goals.iter().map(|g| g.id).collect::<Vec<_>>(), vec![4, 2]);
    assert_eq!(goals[0].completion(), 0.4);
}

// =============================================================================
// Avatars
// =============================================================================

#[tokio::test]
async fn test_upload_then_download_avatar() {
    let backend = seeded_backend();
    let client = client_for(&backend);

    let upload = QueryController::new(
        UploadAvatar::new(client.clone()),
        ("user-1".to_string(), vec![0x89, 0x50]),
    )
    .unwrap();
    let stored = upload.settled().await.data.unwrap();
    assert_eq!(stored.as_str(), avatar_path("user-1"));
    assert_eq!(backend.object(AVATARS_BUCKET, "user-1.png"), Some(vec![0x89, 0x50]));

    let download = QueryController::new(DownloadAvatar::new(client), (*stored).clone()).unwrap();
    assert_eq!(download.settled().await.data.as_deref(), Some(&vec![0x89, 0x50]));
}

#[tokio::test]
async fn test_missing_avatar_is_an_error() {
    let backend = seeded_backend();
    let download =
        QueryController::new(DownloadAvatar::new(client_for(&backend)), "nobody.png".to_string())
            .unwrap();
    let state = download.settled().await;
    assert!(state.data.is_none());
    assert!(state.error.unwrap().is::<BackendError>());
}

// =============================================================================
// Process-wide client
// =============================================================================

#[tokio::test]
async fn test_global_client_installs_once() {
    assert_eq!(Client::global().unwrap_err(), BackendError::NotInitialized);

    let backend = seeded_backend();
    Client::install(client_for(&backend)).unwrap();
    assert_eq!(
        Client::install(client_for(&backend)).unwrap_err(),
        BackendError::AlreadyInitialized
    );

    let client = Client::global().unwrap();
    let controller = QueryController::new(FetchCategories::new(client), ()).unwrap();
    assert_eq!(controller.settled().await.data.map(|c| c.len()), Some(2));
}

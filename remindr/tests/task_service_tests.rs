use chrono::{DateTime, Duration, TimeZone, Utc};
use remindr::entities::task;
use remindr::reminder::ReminderKind;
use remindr::task::{NewTask, TaskService, TaskServiceError, TaskStatus};
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection};

mod common;

pub struct TestContext {
    pub db: DatabaseConnection,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let db = common::setup_db().await?;
    Ok(TestContext { db })
}

fn due() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
}

fn new_task(title: &str, due_at: DateTime<Utc>) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: Some("Details".to_string()),
        due_at,
        notify_email: Some("owner@example.com".to_string()),
    }
}

/// Inserts a task row directly, bypassing the service.
async fn insert_task(
    db: &DatabaseConnection,
    title: &str,
    due_at: DateTime<Utc>,
    status: TaskStatus,
    day_sent: bool,
    hour_sent: bool,
) -> task::Model {
    let active_model = task::ActiveModel {
        title: ActiveValue::Set(title.to_string()),
        description: ActiveValue::Set(None),
        due_at: ActiveValue::Set(due_at),
        status: ActiveValue::Set(status),
        notify_email: ActiveValue::Set(None),
        reminder_day_sent: ActiveValue::Set(day_sent),
        reminder_hour_sent: ActiveValue::Set(hour_sent),
        created_at: ActiveValue::Set(due_at - Duration::days(3)),
        ..Default::default()
    };
    active_model.insert(db).await.expect("Failed to insert task")
}

#[tokio::test]
async fn can_create_task() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);

    let created = task_service
        .create_task(new_task("Pay rent", due()))
        .await
        .expect("Failed to create task");

    assert_eq!(created.title(), "Pay rent");
    assert_eq!(created.description(), Some("Details"));
    assert_eq!(created.due_at(), due());
    assert_eq!(created.notify_email(), Some("owner@example.com"));
    assert_eq!(created.status(), TaskStatus::Pending);
    assert!(!created.day_reminder_sent());
    assert!(!created.hour_reminder_sent());

    let fetched = task_service
        .get_task_by_id(created.id())
        .await
        .expect("Failed to fetch task");
    assert_eq!(fetched.id(), created.id());
    assert_eq!(fetched.due_at(), due());
}

#[tokio::test]
async fn can_get_all_tasks_ordered_by_due_time() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);

    task_service
        .create_task(new_task("Later", due() + Duration::days(2)))
        .await
        .unwrap();
    task_service
        .create_task(new_task("Sooner", due()))
        .await
        .unwrap();

    let tasks = task_service.get_all_tasks().await.unwrap();
    let titles: Vec<&str> = tasks.iter().map(|task| task.title()).collect();
    assert_eq!(titles, vec!["Sooner", "Later"]);
}

#[tokio::test]
async fn can_handle_empty_task_list() {
    let state = setup().await.expect("Failed to setup test context");
    let tasks = TaskService::new(&state.db).get_all_tasks().await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn can_handle_missing_task() {
    let state = setup().await.expect("Failed to setup test context");
    let result = TaskService::new(&state.db).get_task_by_id(99).await;

    assert!(matches!(result, Err(TaskServiceError::TaskNotFound(99))));
    if let Err(e) = result {
        assert_eq!(e.to_string(), "Task with ID 99 not found");
    }
}

#[tokio::test]
async fn mark_reminder_sent_flips_flag_once() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task = task_service
        .create_task(new_task("Pay rent", due()))
        .await
        .unwrap();

    let first = task_service
        .mark_reminder_sent(task.id(), ReminderKind::Day)
        .await
        .unwrap();
    let second = task_service
        .mark_reminder_sent(task.id(), ReminderKind::Day)
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
    let stored = task_service.get_task_by_id(task.id()).await.unwrap();
    assert!(stored.day_reminder_sent());
    assert!(!stored.hour_reminder_sent());
}

#[tokio::test]
async fn mark_reminder_sent_reports_missing_task() {
    let state = setup().await.expect("Failed to setup test context");
    let result = TaskService::new(&state.db)
        .mark_reminder_sent(404, ReminderKind::Hour)
        .await;
    assert!(matches!(result, Err(TaskServiceError::TaskNotFound(404))));
}

#[tokio::test]
async fn reminder_candidates_exclude_done_overdue_and_fully_reminded_tasks() {
    let state = setup().await.expect("Failed to setup test context");
    let now = due() - Duration::hours(2);

    let open = insert_task(&state.db, "Open", due(), TaskStatus::Pending, false, false).await;
    let half = insert_task(&state.db, "Half", due(), TaskStatus::Pending, true, false).await;
    insert_task(&state.db, "Reminded", due(), TaskStatus::Pending, true, true).await;
    insert_task(&state.db, "Done", due(), TaskStatus::Done, false, false).await;
    insert_task(
        &state.db,
        "Overdue",
        now - Duration::minutes(1),
        TaskStatus::Pending,
        false,
        false,
    )
    .await;

    let candidates = TaskService::new(&state.db)
        .get_reminder_candidates(now)
        .await
        .unwrap();

    let mut ids: Vec<u32> = candidates.iter().map(|task| task.id()).collect();
    ids.sort();
    assert_eq!(ids, vec![open.id as u32, half.id as u32]);
}

#[tokio::test]
async fn can_complete_task() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task = task_service
        .create_task(new_task("Pay rent", due()))
        .await
        .unwrap();

    let completed = task_service.complete_task_by_id(task.id()).await.unwrap();

    assert_eq!(completed.status(), TaskStatus::Done);
    assert!(!completed.is_pending());
}

#[tokio::test]
async fn can_delete_task() {
    let state = setup().await.expect("Failed to setup test context");
    let task_service = TaskService::new(&state.db);
    let task = task_service
        .create_task(new_task("Pay rent", due()))
        .await
        .unwrap();

    let deleted = task_service.delete_task_by_id(task.id()).await.unwrap();

    assert_eq!(deleted.id(), task.id());
    assert!(matches!(
        task_service.get_task_by_id(task.id()).await,
        Err(TaskServiceError::TaskNotFound(_))
    ));
    assert!(matches!(
        task_service.delete_task_by_id(task.id()).await,
        Err(TaskServiceError::TaskNotFound(_))
    ));
}

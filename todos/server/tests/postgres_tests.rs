use sea_orm::{DatabaseConnection, EntityTrait};
use testcontainers_modules::{postgres, testcontainers};
use todos_server::entities::task;
use todos_server::task::{TaskInput, TaskService, TaskServiceError};
use todos_server::user::UserService;

mod common;

pub struct TestContext {
    #[allow(dead_code)] // container is kept to ensure it's not dropped
    pub container: testcontainers::ContainerAsync<postgres::Postgres>,
    pub db: DatabaseConnection,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let container = common::setup_container().await?;
    let db = common::setup_postgres_db(&container).await?;
    Ok(TestContext { container, db })
}

#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn can_run_task_lifecycle_on_postgres() {
    let state = setup().await.expect("Failed to setup test context");
    let alice_user = common::create_user(&state.db, "alice").await;
    let alice = common::current_user(&alice_user);
    let mallory = common::current_user(&common::create_user(&state.db, "mallory").await);
    let task_service = TaskService::new(&state.db);

    let created = task_service
        .create_task(&alice, TaskInput::with_title("Runs on Postgres"))
        .await
        .expect("Failed to create task");
    assert!(matches!(
        task_service.toggle_task(created.id(), &mallory).await,
        Err(TaskServiceError::Forbidden(_))
    ));
    let toggled = task_service.toggle_task(created.id(), &alice).await.unwrap();
    assert!(toggled.is_completed());

    UserService::new(&state.db)
        .delete_user(alice_user.id())
        .await
        .unwrap();

    let remaining = task::Entity::find().all(&state.db).await.unwrap();
    assert!(remaining.is_empty());
}

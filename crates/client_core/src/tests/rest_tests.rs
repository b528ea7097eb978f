use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode as AxumStatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{TimeZone, Utc};
use shared::domain::{
    EmployeeId, ExpenseSummary, NewTask, ProductId, ProductSummary, SaleSummary, TaskId,
    TaskSummary, UpdateTask,
};
use shared::protocol::{Filter, SortDescriptor, SortDirection};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use super::*;

#[derive(Clone, Default)]
struct Captured {
    query: Arc<Mutex<Option<String>>>,
    bearer: Arc<Mutex<Option<String>>>,
}

fn ts() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn product(id: i64, name: &str) -> ProductSummary {
    ProductSummary {
        id: ProductId(id),
        name: name.to_string(),
        kind: "clothing".to_string(),
        size: None,
        color: None,
        stock: 5,
        price: 30.0,
    }
}

async fn list_products(
    State(captured): State<Captured>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Json<PagedEnvelope<ProductSummary>> {
    *captured.query.lock().await = query;
    *captured.bearer.lock().await = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    Json(PagedEnvelope {
        page_number: 2,
        page_size: 50,
        total_records: 2,
        last_page: 1,
        data: vec![product(1, "jacket"), product(2, "boots")],
    })
}

async fn create_task(Json(body): Json<NewTask>) -> Json<TaskSummary> {
    Json(TaskSummary {
        id: TaskId(10),
        title: body.title,
        description: body.description.unwrap_or_default(),
        completed: false,
        assignee_id: body.assignee_id,
        assignee_name: "Ana".to_string(),
        created_at: ts(),
        updated_at: ts(),
    })
}

async fn update_task(Path(id): Path<i64>, Json(body): Json<UpdateTask>) -> Json<TaskSummary> {
    Json(TaskSummary {
        id: TaskId(id),
        title: body.title.unwrap_or_else(|| "kept".to_string()),
        description: body.description.unwrap_or_default(),
        completed: body.completed.unwrap_or(false),
        assignee_id: body.assignee_id.unwrap_or(EmployeeId(1)),
        assignee_name: "Ana".to_string(),
        created_at: ts(),
        updated_at: ts(),
    })
}

async fn delete_task(Path(_id): Path<i64>) -> AxumStatusCode {
    AxumStatusCode::NO_CONTENT
}

async fn reject_sales() -> (AxumStatusCode, Json<ErrorBody>) {
    (
        AxumStatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: Some("database offline".to_string()),
        }),
    )
}

async fn reject_expenses() -> AxumStatusCode {
    AxumStatusCode::SERVICE_UNAVAILABLE
}

async fn spawn_backend() -> (RestConfig, Captured) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let captured = Captured::default();
    let app = Router::new()
        .route("/api/products", get(list_products))
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/:id", put(update_task).delete(delete_task))
        .route("/api/sales", get(reject_sales))
        .route("/api/expenses", get(reject_expenses))
        .with_state(captured.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let base_url = Url::parse(&format!("http://{addr}")).expect("base url");
    (RestConfig::new(base_url), captured)
}

#[tokio::test]
async fn fetch_sends_flattened_query_parameters_and_decodes_the_envelope() {
    let (config, captured) = spawn_backend().await;
    let collection = RestCollection::<ProductSummary>::new(
        config.with_bearer_token("secret-token"),
        "/api/products",
    );

    let query = CollectionQuery {
        page_index: 2,
        page_size: 50,
        filters: vec![Filter::new("name", "Pérez"), Filter::new("stock", 3)],
        sort: Some(SortDescriptor {
            column_id: "name".to_string(),
            direction: SortDirection::Asc,
        }),
    };
    let page = collection.fetch(&query).await.expect("fetch succeeds");

    assert_eq!(page.total_count, 2);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].name, "jacket");

    assert_eq!(
        captured.query.lock().await.as_deref(),
        Some("page=2&page_size=50&sort_by=name&sort_dir=asc&name=P%C3%A9rez&stock=3")
    );
    assert_eq!(
        captured.bearer.lock().await.as_deref(),
        Some("Bearer secret-token")
    );
}

#[tokio::test]
async fn oversized_envelopes_are_clamped_to_the_requested_page_size() {
    let (config, _captured) = spawn_backend().await;
    let collection = RestCollection::<ProductSummary>::new(config, "/api/products");

    let query = CollectionQuery {
        page_index: 0,
        page_size: 1,
        filters: Vec::new(),
        sort: None,
    };
    let page = collection.fetch(&query).await.expect("fetch succeeds");
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn rejected_requests_surface_the_backend_error_message() {
    let (config, _captured) = spawn_backend().await;
    let collection = RestCollection::<SaleSummary>::new(config, "/api/sales");

    let query = CollectionQuery {
        page_index: 0,
        page_size: 10,
        filters: Vec::new(),
        sort: None,
    };
    let err = collection.fetch(&query).await.expect_err("backend rejects");
    assert_eq!(err, RequestError::rejected(500, "database offline"));
}

#[tokio::test]
async fn rejections_without_a_body_fall_back_to_the_status_reason() {
    let (config, _captured) = spawn_backend().await;
    let collection = RestCollection::<ExpenseSummary>::new(config, "/api/expenses");

    let query = CollectionQuery {
        page_index: 0,
        page_size: 10,
        filters: Vec::new(),
        sort: None,
    };
    let err = collection.fetch(&query).await.expect_err("backend rejects");
    assert_eq!(err, RequestError::rejected(503, "Service Unavailable"));
}

#[tokio::test]
async fn create_update_and_delete_speak_the_collection_verbs() {
    let (config, _captured) = spawn_backend().await;
    let collection = RestCollection::<TaskSummary>::new(config, "/api/tasks");

    let created = collection
        .create(&NewTask {
            title: "call Pérez".to_string(),
            description: None,
            assignee_id: EmployeeId(4),
        })
        .await
        .expect("create succeeds");
    assert_eq!(created.id, TaskId(10));
    assert_eq!(created.title, "call Pérez");
    assert_eq!(created.assignee_id, EmployeeId(4));

    let updated = collection
        .update(
            10,
            &UpdateTask {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("update succeeds");
    assert!(updated.completed);
    assert_eq!(updated.id, TaskId(10));

    collection.delete(10).await.expect("delete succeeds");
}

#[tokio::test]
async fn unreachable_backends_surface_a_transport_failure() {
    let config = RestConfig::new(Url::parse("http://127.0.0.1:9").expect("base url"));
    let collection = RestCollection::<TaskSummary>::new(config, "/api/tasks");

    let err = collection.delete(1).await.expect_err("nothing is listening");
    assert!(matches!(err, RequestError::Transport(_)));
}

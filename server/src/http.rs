use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use platform_db::DbPool;
use platform_docstore::{DocStoreError, OrderCountStore};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    report::{self, DashboardReport, ReportError},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orders: Arc<dyn OrderCountStore>,
    pub config: Arc<AppConfig>,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "reportes server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/", get(home_handler))
        .route("/reportes/dashboard", get(dashboard_handler))
        .route("/debug/collections", get(collections_handler))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

async fn home_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Microservicio de Reportes Online",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
}

async fn dashboard_handler(State(state): State<AppState>) -> HttpResult<Json<DashboardReport>> {
    let employees = report::fetch_employees(&state.pool).await?;
    let report = report::enrich(
        state.orders.as_ref(),
        employees,
        &state.config.report_title,
    )
    .await?;
    debug!(
        empleados = report.metrics.total_employees,
        pedidos = report.metrics.total_orders_processed,
        "dashboard assembled"
    );
    Ok(Json(report))
}

async fn collections_handler(
    State(state): State<AppState>,
) -> HttpResult<Json<CollectionsResponse>> {
    let collections = state.orders.collection_names().await?;
    Ok(Json(CollectionsResponse { collections }))
}

#[derive(Serialize)]
struct CollectionsResponse {
    #[serde(rename = "colecciones_en_mongo")]
    collections: Vec<String>,
}

type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    detalle: String,
}

#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    body: ErrorBody,
}

impl HttpError {
    fn bad_gateway(error: impl Into<String>, detalle: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            body: ErrorBody {
                error: error.into(),
                detalle: detalle.into(),
            },
        }
    }
}

impl From<ReportError> for HttpError {
    fn from(err: ReportError) -> Self {
        warn!(error = %err, "report pipeline failed");
        match &err {
            ReportError::UpstreamUnavailable(source) => Self::bad_gateway(
                "Fallo conectando a SQL. ¿Está disponible la base de usuarios?",
                source.to_string(),
            ),
            ReportError::EnrichmentLookupFailed { username, source } => Self::bad_gateway(
                format!("Fallo consultando pedidos del vendedor {username}"),
                source.to_string(),
            ),
        }
    }
}

impl From<DocStoreError> for HttpError {
    fn from(err: DocStoreError) -> Self {
        warn!(error = %err, "document store call failed");
        Self::bad_gateway("Fallo consultando MongoDB", err.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use platform_docstore::DocStoreResult;
    use sea_orm::{ConnectionTrait, Database, DatabaseBackend, Statement};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    struct MapOrderStore {
        counts: HashMap<String, u64>,
        fail_on: Option<String>,
    }

    impl MapOrderStore {
        fn new(counts: &[(&str, u64)]) -> Self {
            Self {
                counts: counts.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                fail_on: None,
            }
        }

        fn failing_for(mut self, username: &str) -> Self {
            self.fail_on = Some(username.to_string());
            self
        }
    }

    #[async_trait]
    impl OrderCountStore for MapOrderStore {
        async fn count_orders_by_seller(&self, username: &str) -> DocStoreResult<u64> {
            if self.fail_on.as_deref() == Some(username) {
                let err = mongodb::error::Error::custom("connection timed out".to_string());
                return Err(err.into());
            }
            Ok(self.counts.get(username).copied().unwrap_or(0))
        }

        async fn collection_names(&self) -> DocStoreResult<Vec<String>> {
            Ok(vec!["pedidos".to_string(), "clientes".to_string()])
        }
    }

    async fn sqlite_pool(rows: &[(&str, &str)]) -> DbPool {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "CREATE TABLE usuario (username TEXT PRIMARY KEY, rol TEXT NOT NULL)",
        ))
        .await
        .unwrap();
        for (username, rol) in rows {
            db.execute(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                "INSERT INTO usuario (username, rol) VALUES (?, ?)",
                vec![(*username).into(), (*rol).into()],
            ))
            .await
            .unwrap();
        }
        db
    }

    /// Pool pointed at an empty database: the `usuario` table is missing, so
    /// the relational read fails the way an unreachable store does.
    async fn broken_pool() -> DbPool {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    fn test_state(pool: DbPool, orders: MapOrderStore) -> AppState {
        AppState {
            pool,
            orders: Arc::new(orders),
            config: Arc::new(AppConfig {
                report_title: "Dashboard Operativo - Sprint 4".into(),
            }),
        }
    }

    async fn get_response(router: Router, path: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn get_json(router: Router, path: &str) -> (StatusCode, Value) {
        let (status, bytes) = get_response(router, path).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn dashboard_joins_sql_and_mongo() {
        let pool = sqlite_pool(&[("alice", "sales"), ("bob", "manager")]).await;
        let router = build_router(test_state(pool, MapOrderStore::new(&[("alice", 3)])));

        let (status, body) = get_json(router, "/reportes/dashboard").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "titulo": "Dashboard Operativo - Sprint 4",
                "metricas_globales": {
                    "total_empleados": 2,
                    "total_pedidos_procesados": 3
                },
                "detalle_por_vendedor": [
                    {
                        "empleado": "alice",
                        "rol": "sales",
                        "pedidos_realizados": 3,
                        "estado": "Activo"
                    },
                    {
                        "empleado": "bob",
                        "rol": "manager",
                        "pedidos_realizados": 0,
                        "estado": "Sin ventas"
                    }
                ]
            })
        );
    }

    #[tokio::test]
    async fn dashboard_with_no_employees_is_empty() {
        let pool = sqlite_pool(&[]).await;
        let router = build_router(test_state(pool, MapOrderStore::new(&[])));

        let (status, body) = get_json(router, "/reportes/dashboard").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metricas_globales"]["total_empleados"], 0);
        assert_eq!(body["metricas_globales"]["total_pedidos_procesados"], 0);
        assert_eq!(body["detalle_por_vendedor"], json!([]));
    }

    #[tokio::test]
    async fn dashboard_preserves_store_order() {
        let pool = sqlite_pool(&[("zoe", "ventas"), ("ana", "ventas"), ("mia", "gerente")]).await;
        let router = build_router(test_state(pool, MapOrderStore::new(&[("ana", 2)])));

        let (status, body) = get_json(router, "/reportes/dashboard").await;

        assert_eq!(status, StatusCode::OK);
        let sellers: Vec<&str> = body["detalle_por_vendedor"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["empleado"].as_str().unwrap())
            .collect();
        assert_eq!(sellers, ["zoe", "ana", "mia"]);
    }

    #[tokio::test]
    async fn dashboard_is_deterministic_across_calls() {
        let pool = sqlite_pool(&[("alice", "sales"), ("bob", "manager")]).await;
        let router = build_router(test_state(
            pool,
            MapOrderStore::new(&[("alice", 3), ("bob", 1)]),
        ));

        let (_, first) = get_response(router.clone(), "/reportes/dashboard").await;
        let (_, second) = get_response(router, "/reportes/dashboard").await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn sql_failure_returns_structured_error() {
        let router = build_router(test_state(broken_pool().await, MapOrderStore::new(&[])));

        let (status, body) = get_json(router, "/reportes/dashboard").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("SQL"));
        assert!(!body["detalle"].as_str().unwrap().is_empty());
        assert!(body.get("detalle_por_vendedor").is_none());
    }

    #[tokio::test]
    async fn lookup_failure_yields_no_report() {
        let pool = sqlite_pool(&[("alice", "sales"), ("bob", "manager")]).await;
        let store = MapOrderStore::new(&[("alice", 3)]).failing_for("bob");
        let router = build_router(test_state(pool, store));

        let (status, body) = get_json(router, "/reportes/dashboard").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("bob"));
        assert!(body.get("detalle_por_vendedor").is_none());
        assert!(body.get("metricas_globales").is_none());
    }

    #[tokio::test]
    async fn home_reports_service_status() {
        let pool = sqlite_pool(&[]).await;
        let router = build_router(test_state(pool, MapOrderStore::new(&[])));

        let (status, body) = get_json(router, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Microservicio de Reportes Online");
        assert!(body["version"].as_str().is_some());
    }

    #[tokio::test]
    async fn debug_collections_lists_store_collections() {
        let pool = sqlite_pool(&[]).await;
        let router = build_router(test_state(pool, MapOrderStore::new(&[])));

        let (status, body) = get_json(router, "/debug/collections").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["colecciones_en_mongo"], json!(["pedidos", "clientes"]));
    }
}

//! The report pipeline: one relational read, then a keyed fan-out against
//! the document store, folded into the dashboard payload.

use entity::usuarios;
use futures::future::try_join_all;
use platform_db::DbPool;
use platform_docstore::{DocStoreError, OrderCountStore};
use sea_orm::{DbErr, EntityTrait};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// The relational read failed; no report can start.
    #[error("relational store unavailable")]
    UpstreamUnavailable(#[source] DbErr),
    /// A keyed order lookup failed mid-aggregation. The report is abandoned
    /// rather than defaulting the count to zero.
    #[error("order lookup failed for seller {username}")]
    EnrichmentLookupFailed {
        username: String,
        #[source]
        source: DocStoreError,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SellerStatus {
    #[serde(rename = "Activo")]
    Active,
    #[serde(rename = "Sin ventas")]
    NoSales,
}

impl SellerStatus {
    fn from_count(order_count: u64) -> Self {
        if order_count > 0 {
            Self::Active
        } else {
            Self::NoSales
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SellerReport {
    #[serde(rename = "empleado")]
    pub username: String,
    #[serde(rename = "rol")]
    pub role: String,
    #[serde(rename = "pedidos_realizados")]
    pub order_count: u64,
    #[serde(rename = "estado")]
    pub status: SellerStatus,
}

#[derive(Debug, Serialize)]
pub struct GlobalMetrics {
    #[serde(rename = "total_empleados")]
    pub total_employees: u64,
    #[serde(rename = "total_pedidos_procesados")]
    pub total_orders_processed: u64,
}

#[derive(Debug, Serialize)]
pub struct DashboardReport {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "metricas_globales")]
    pub metrics: GlobalMetrics,
    #[serde(rename = "detalle_por_vendedor")]
    pub details: Vec<SellerReport>,
}

/// Fixed relational read: every row of `usuario`, in the order the store
/// yields them. That order carries through to the final report.
pub async fn fetch_employees(db: &DbPool) -> Result<Vec<usuarios::Model>, ReportError> {
    usuarios::Entity::find()
        .all(db)
        .await
        .map_err(ReportError::UpstreamUnavailable)
}

/// Enrich each employee with their order count and fold the totals.
///
/// Lookups fan out concurrently; results come back in input order, so the
/// payload is byte-identical to a sequential pass. The first failed lookup
/// aborts the whole batch.
pub async fn enrich(
    orders: &dyn OrderCountStore,
    employees: Vec<usuarios::Model>,
    title: &str,
) -> Result<DashboardReport, ReportError> {
    let lookups = employees.iter().map(|employee| async move {
        orders
            .count_orders_by_seller(&employee.username)
            .await
            .map_err(|source| ReportError::EnrichmentLookupFailed {
                username: employee.username.clone(),
                source,
            })
    });
    let counts = try_join_all(lookups).await?;

    let mut total_orders_processed = 0u64;
    let details: Vec<SellerReport> = employees
        .into_iter()
        .zip(counts)
        .map(|(employee, order_count)| {
            total_orders_processed += order_count;
            SellerReport {
                username: employee.username,
                role: employee.rol,
                order_count,
                status: SellerStatus::from_count(order_count),
            }
        })
        .collect();

    Ok(DashboardReport {
        title: title.to_string(),
        metrics: GlobalMetrics {
            total_employees: details.len() as u64,
            total_orders_processed,
        },
        details,
    })
}

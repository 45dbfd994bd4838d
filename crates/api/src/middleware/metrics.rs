//! In-process request counters exposed at `GET /api/v1/metrics`.
//!
//! Requests are bucketed by method, matched route template and status
//! class (`2xx`, `4xx`, ...), so path parameters do not explode the key
//! space.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MetricKey {
    route: String,
    method: String,
    status_class: &'static str,
}

#[derive(Debug, Default, Clone, Copy)]
struct RouteStats {
    count: u64,
    total_ms: u64,
    max_ms: u64,
}

#[derive(Debug, Default)]
pub struct RequestMetrics {
    started_at: Option<Instant>,
    buckets: Mutex<BTreeMap<MetricKey, RouteStats>>,
}

#[derive(Debug, Serialize)]
pub struct RouteMetric {
    pub method: String,
    pub route: String,
    pub status_class: &'static str,
    pub count: u64,
    pub total_ms: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub routes: Vec<RouteMetric>,
}

fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Some(Instant::now()),
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn record(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let key = MetricKey {
            route: route.to_string(),
            method: method.to_string(),
            status_class: status_class(status),
        };
        let ms = elapsed.as_millis() as u64;
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let stats = buckets.entry(key).or_default();
        stats.count += 1;
        stats.total_ms += ms;
        stats.max_ms = stats.max_ms.max(ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let routes: Vec<RouteMetric> = buckets
            .iter()
            .map(|(key, stats)| RouteMetric {
                method: key.method.clone(),
                route: key.route.clone(),
                status_class: key.status_class,
                count: stats.count,
                total_ms: stats.total_ms,
                avg_ms: if stats.count == 0 {
                    0.0
                } else {
                    stats.total_ms as f64 / stats.count as f64
                },
                max_ms: stats.max_ms,
            })
            .collect();
        MetricsSnapshot {
            uptime_secs: self.started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0),
            total_requests: routes.iter().map(|r| r.count).sum(),
            routes,
        }
    }
}

/// Middleware recording one sample per request.
pub async fn track_metrics(
    State(metrics): State<Arc<RequestMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    metrics.record(&method, &route, response.status().as_u16(), started.elapsed());
    response
}

//! Prometheus metrics HTTP endpoint
//!
//! Exposes service metrics in Prometheus text format at /metrics and a
//! liveness check at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSnapshot, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with service label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    service: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{service=\"{service}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    service: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{service=\"{service}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{service=\"{service}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{service=\"{service}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{service=\"{service}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
///
/// Reads cumulative values only; the periodic log report keeps its own window.
pub fn format_prometheus_metrics(metrics: &Metrics, service_id: &str) -> String {
    let snapshot = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_ingest_metrics(&mut output, service_id, &snapshot);
    write_outcome_metrics(&mut output, service_id, &snapshot);
    write_side_effect_metrics(&mut output, service_id, &snapshot);
    write_latency_metrics(&mut output, service_id, &snapshot);

    output
}

fn write_ingest_metrics(output: &mut String, service: &str, snapshot: &MetricsSnapshot) {
    write_metric(
        output,
        "geofence_events_received_total",
        "Events accepted from ingest",
        MetricType::Counter,
        service,
        snapshot.events_received,
    );
    write_metric(
        output,
        "geofence_events_dropped_total",
        "Events dropped because the pipeline queue was full",
        MetricType::Counter,
        service,
        snapshot.events_dropped,
    );
    write_metric(
        output,
        "geofence_invalid_payloads_total",
        "Ingest payloads that could not be parsed",
        MetricType::Counter,
        service,
        snapshot.invalid_payloads,
    );
    write_metric(
        output,
        "geofence_events_in_flight",
        "Events currently being processed",
        MetricType::Gauge,
        service,
        snapshot.in_flight,
    );
}

fn write_outcome_metrics(output: &mut String, service: &str, snapshot: &MetricsSnapshot) {
    write_metric(
        output,
        "geofence_events_total",
        "Events processed to a terminal outcome",
        MetricType::Counter,
        service,
        snapshot.events_total,
    );
    let _ = writeln!(output, "# HELP geofence_events_outcome_total Events by terminal outcome");
    let _ = writeln!(output, "# TYPE geofence_events_outcome_total counter");
    for (outcome, val) in [
        ("applied", snapshot.events_applied),
        ("stale", snapshot.events_stale),
        ("failed", snapshot.events_failed),
    ] {
        let _ = writeln!(
            output,
            "geofence_events_outcome_total{{service=\"{service}\",outcome=\"{outcome}\"}} {val}"
        );
    }
}

fn write_side_effect_metrics(output: &mut String, service: &str, snapshot: &MetricsSnapshot) {
    write_metric(
        output,
        "geofence_triggers_published_total",
        "Trigger notifications published",
        MetricType::Counter,
        service,
        snapshot.triggers_published,
    );
    write_metric(
        output,
        "geofence_trigger_publish_failures_total",
        "Trigger notifications that failed to publish",
        MetricType::Counter,
        service,
        snapshot.publish_failures,
    );
    write_metric(
        output,
        "geofence_event_audit_failures_total",
        "Raw event audit writes that failed",
        MetricType::Counter,
        service,
        snapshot.audit_failures,
    );
    write_metric(
        output,
        "geofence_order_write_conflicts_total",
        "Order compare-and-save attempts that lost a race",
        MetricType::Counter,
        service,
        snapshot.write_conflicts,
    );
}

fn write_latency_metrics(output: &mut String, service: &str, snapshot: &MetricsSnapshot) {
    write_histogram(
        output,
        "geofence_event_latency_us",
        "Event processing latency in microseconds",
        service,
        &snapshot.lat_buckets,
        snapshot.lat_sum_us,
    );
    write_metric(
        output,
        "geofence_event_latency_p99_us",
        "99th percentile event latency since start",
        MetricType::Gauge,
        service,
        snapshot.lat_p99_us,
    );
}

fn text_response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    service_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => text_response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &service_id),
        ),
        (&Method::GET, "/health") => {
            text_response(StatusCode::OK, "text/plain", "ok".to_string())
        }
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(response)
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    service_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let service_id = Arc::new(service_id);

    info!(port = %port, service = %service_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let service_id = service_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), service_id.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();

        metrics.record_event_received();
        metrics.record_event_processed(150);
        metrics.record_event_processed(250);
        metrics.record_applied();
        metrics.record_stale();
        metrics.record_trigger_published();

        let output = format_prometheus_metrics(&metrics, "geo-1");

        assert!(output.contains("geofence_events_received_total{service=\"geo-1\"} 1"));
        assert!(output.contains("geofence_events_total{service=\"geo-1\"} 2"));
        assert!(output
            .contains("geofence_events_outcome_total{service=\"geo-1\",outcome=\"applied\"} 1"));
        assert!(output
            .contains("geofence_events_outcome_total{service=\"geo-1\",outcome=\"stale\"} 1"));
        assert!(output.contains("geofence_triggers_published_total{service=\"geo-1\"} 1"));
        assert!(output.contains("geofence_event_latency_us_bucket{service=\"geo-1\",le=\"+Inf\"} 2"));
        assert!(output.contains("geofence_event_latency_us_count{service=\"geo-1\"} 2"));
        assert!(output.contains("geofence_event_latency_us_sum{service=\"geo-1\"} 400"));
    }

    #[test]
    fn test_scrape_does_not_reset_histogram() {
        let metrics = Metrics::new();
        metrics.record_event_processed(150);
        metrics.record_event_processed(250);

        // The periodic log reporter drains its own window first
        metrics.report().log();

        let count_line = "geofence_event_latency_us_count{service=\"s\"} 2";
        let first = format_prometheus_metrics(&metrics, "s");
        assert!(first.contains("geofence_events_total{service=\"s\"} 2"));
        assert!(first.contains(count_line));
        let second = format_prometheus_metrics(&metrics, "s");
        assert!(second.contains(count_line));
        assert!(second.contains("geofence_event_latency_us_sum{service=\"s\"} 400"));
    }

    #[test]
    fn test_histogram_is_cumulative() {
        let mut buckets = [0u64; METRICS_NUM_BUCKETS];
        buckets[0] = 2;
        buckets[3] = 1;
        let mut output = String::new();
        write_histogram(&mut output, "h", "help", "svc", &buckets, 30);

        let first = format!("h_bucket{{service=\"svc\",le=\"{}\"}} 2", METRICS_BUCKET_BOUNDS[0]);
        let fourth = format!("h_bucket{{service=\"svc\",le=\"{}\"}} 3", METRICS_BUCKET_BOUNDS[3]);
        assert!(output.contains(&first));
        assert!(output.contains(&fourth));
        assert!(output.contains("h_sum{service=\"svc\"} 30"));
    }
}

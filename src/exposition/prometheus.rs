use crate::metrics::Snapshot;

use std::collections::HashMap;
use std::time::SystemTime;

/// Render a snapshot in the Prometheus text exposition format: a `# TYPE`
/// line per family followed by one line per series, with label sets sorted
/// for stable output.
pub fn render(snapshot: &Snapshot) -> String {
    let timestamp = snapshot
        .systemtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    let mut data = Vec::new();

    let mut family = None;

    for metric in &snapshot.counters {
        if family != Some(&metric.name) {
            data.push(format!("# TYPE {} counter", metric.name));
            family = Some(&metric.name);
        }

        data.push(format!(
            "{}{} {} {timestamp}",
            metric.name,
            format_metadata(&metric.metadata),
            metric.value
        ));
    }

    let mut family = None;

    for metric in &snapshot.gauges {
        if family != Some(&metric.name) {
            data.push(format!("# TYPE {} gauge", metric.name));
            family = Some(&metric.name);
        }

        data.push(format!(
            "{}{} {} {timestamp}",
            metric.name,
            format_metadata(&metric.metadata),
            metric.value
        ));
    }

    data.join("\n") + "\n"
}

fn format_metadata(metadata: &HashMap<String, String>) -> String {
    if metadata.is_empty() {
        return String::new();
    }

    let mut metadata: Vec<String> = metadata
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect();
    metadata.sort();

    format!("{{{}}}", metadata.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricRegistry;

    #[test]
    fn test_render_contains_expected_series() {
        let registry = MetricRegistry::new();

        registry
            .set_gauge(
                "node_network_receive_bytes_total",
                &[("device", "eth0")],
                1000.0,
            )
            .unwrap();
        registry
            .set_gauge(
                "node_network_transmit_bytes_total",
                &[("device", "eth0")],
                2000.0,
            )
            .unwrap();
        registry
            .add_to_counter(
                "node_tcp_connections_total",
                &[("direction", "inbound")],
                3,
            )
            .unwrap();
        registry
            .add_to_counter(
                "node_tcp_connections_total",
                &[("direction", "outbound")],
                5,
            )
            .unwrap();
        registry
            .add_to_counter("node_http_requests_total", &[("method", "GET")], 7)
            .unwrap();

        let body = render(&registry.snapshot());

        for expected in [
            "# TYPE node_tcp_connections_total counter",
            "# TYPE node_http_requests_total counter",
            "# TYPE node_network_receive_bytes_total gauge",
            "# TYPE node_network_transmit_bytes_total gauge",
            "node_network_receive_bytes_total{device=\"eth0\"} 1000",
            "node_network_transmit_bytes_total{device=\"eth0\"} 2000",
            "node_tcp_connections_total{direction=\"inbound\"} 3",
            "node_tcp_connections_total{direction=\"outbound\"} 5",
            "node_http_requests_total{method=\"GET\"} 7",
        ] {
            assert!(body.contains(expected), "missing: {expected}\n{body}");
        }
    }

    #[test]
    fn test_type_line_once_per_family() {
        let registry = MetricRegistry::new();

        registry
            .add_to_counter("test_counter", &[("direction", "inbound")], 1)
            .unwrap();
        registry
            .add_to_counter("test_counter", &[("direction", "outbound")], 1)
            .unwrap();

        let body = render(&registry.snapshot());

        assert_eq!(body.matches("# TYPE test_counter counter").count(), 1);
    }

    #[test]
    fn test_unlabeled_series_render_bare() {
        let registry = MetricRegistry::new();

        registry.add_to_counter("test_counter", &[], 9).unwrap();

        let body = render(&registry.snapshot());

        assert!(body.contains("\ntest_counter 9"));
    }
}

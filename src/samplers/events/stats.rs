/*
 * kernel event counters
 *
 * Cumulative totals derived from the capture tables via reset-aware
 * differencing; published as counters.
 */

pub const TCP_CONNECTIONS: &str = "node_tcp_connections_total";

pub const HTTP_REQUESTS: &str = "node_http_requests_total";

/*
 * per-interface byte counters from the kernel statistics table
 *
 * These mirror the absolute kernel counters, so they are published as
 * gauges: each sample overwrites the previous value for the device.
 */

pub const NETWORK_RECEIVE_BYTES: &str = "node_network_receive_bytes_total";

pub const NETWORK_TRANSMIT_BYTES: &str = "node_network_transmit_bytes_total";

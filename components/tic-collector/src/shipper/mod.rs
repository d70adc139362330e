/// InfluxDB v2 HTTP client.
pub mod influx;
/// Line protocol points.
pub mod point;
/// Remote sink wrapper that never fails the cycle.
pub mod shipper;

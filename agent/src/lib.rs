pub mod bmc;
pub mod bridge;
pub mod connection;
pub mod server_map;

mod failover;

pub use failover::{DataSource, DataSourceRouter};

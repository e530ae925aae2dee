pub mod node_watcher;
pub mod service_watcher;

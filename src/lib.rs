pub mod config;
pub mod error;
pub mod grpc;
pub mod job;
pub mod registry;
pub mod shutdown;
pub mod streamer;
pub mod tls;
pub mod watcher;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("jobmanager");
}

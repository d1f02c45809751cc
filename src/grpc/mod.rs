pub mod auth;
pub mod server;
pub mod service;

pub use server::GrpcServer;

pub mod rpc;
pub mod service;

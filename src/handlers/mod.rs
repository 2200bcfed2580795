//! HTTP handlers. Storage concerns are delegated to `StoreHandle`.

pub mod health_handlers;
pub mod object_handlers;

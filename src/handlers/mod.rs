//! handlers/mod.rs
//! Módulo que agrupa los handlers HTTP (dispatch, analytics, sesión).

pub mod analytics_handler;
pub mod dispatch_handler;
pub mod session;

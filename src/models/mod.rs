//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod analytics_model;
pub mod audit_model;
pub mod campaign_model;
pub mod dispatch_model;

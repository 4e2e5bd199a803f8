//! Entities for the tables this service reads. The schema is owned by the
//! user-management service; only the columns we select are mapped.

pub mod usuarios;

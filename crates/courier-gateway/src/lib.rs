pub mod auth;
pub mod connection;
pub mod presence;
pub mod receipts;
pub mod registry;
pub mod router;
pub mod typing;

use std::sync::Arc;

use courier_db::Database;

use crate::registry::Registry;

/// Shared handle injected into every connection handler: the live
/// connection registry plus the persistence port and token secret.
#[derive(Clone)]
pub struct Gateway {
    pub registry: Registry,
    pub db: Arc<Database>,
    pub jwt_secret: String,
}

impl Gateway {
    pub fn new(db: Arc<Database>, jwt_secret: String) -> Self {
        Self {
            registry: Registry::new(),
            db,
            jwt_secret,
        }
    }
}

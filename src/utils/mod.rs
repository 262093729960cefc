pub mod logging;

use uuid::Uuid;

/// Generates a unique ID for entities
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}

/// Masks an identifier for use in logs (keeps just enough to correlate)
pub fn mask_identifier(identifier: &str) -> String {
    match identifier.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{}***@{}", visible, domain)
        }
        None => {
            let visible: String = identifier.chars().take(4).collect();
            format!("{}***", visible)
        }
    }
}

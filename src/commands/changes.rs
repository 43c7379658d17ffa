use clap::{Args, Subcommand};
use fhir_sync_core::{LocalChange, LocalChangeStore, LocalChangeType, ResourceType};
use uuid::Uuid;

use crate::db::SqliteStore;

/// Manage pending local changes
#[derive(Debug, Args)]
pub struct ChangesCommand {
    #[command(subcommand)]
    command: ChangesSubcommand,
}

#[derive(Debug, Subcommand)]
enum ChangesSubcommand {
    /// Queue a local change for the next sync
    Add {
        /// FHIR resource type (e.g., Patient)
        resource_type: ResourceType,

        /// Resource id (generated for inserts when omitted)
        id: Option<String>,

        /// Kind of change: insert, update, delete
        #[arg(long, short, default_value = "insert")]
        kind: LocalChangeType,

        /// Resource JSON for inserts, JSON patch for updates
        #[arg(long, short)]
        payload: Option<String>,
    },

    /// List pending local changes
    List,
}

impl ChangesCommand {
    pub async fn run(&self, store: &SqliteStore) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ChangesSubcommand::Add {
                resource_type,
                id,
                kind,
                payload,
            } => {
                let change = build_change(resource_type, id.as_deref(), *kind, payload.as_deref())?;
                let token = store.add_local_change(&change).await?;
                println!("Queued #{}: {}", token.0, change);
                Ok(())
            }
            ChangesSubcommand::List => {
                let changes = store.get_all_local_changes().await?;
                if changes.is_empty() {
                    println!("No pending local changes.");
                    return Ok(());
                }
                for (token, change) in changes {
                    println!("#{:<5} {}", token.0, change);
                }
                Ok(())
            }
        }
    }
}

fn build_change(
    resource_type: &ResourceType,
    id: Option<&str>,
    kind: LocalChangeType,
    payload: Option<&str>,
) -> Result<LocalChange, String> {
    let id = match (id, kind) {
        (Some(id), _) => id.to_string(),
        (None, LocalChangeType::Insert) => Uuid::new_v4().to_string(),
        (None, _) => return Err(format!("A resource id is required for {}", kind)),
    };

    let payload = match (payload, kind) {
        (_, LocalChangeType::Delete) => String::new(),
        (Some(p), _) => {
            serde_json::from_str::<serde_json::Value>(p)
                .map_err(|e| format!("Payload is not valid JSON: {}", e))?;
            p.to_string()
        }
        (None, LocalChangeType::Insert) => {
            serde_json::json!({"resourceType": resource_type.as_str(), "id": id}).to_string()
        }
        (None, LocalChangeType::Update) => {
            return Err("A JSON patch payload is required for updates".to_string())
        }
    };

    Ok(LocalChange::new(resource_type.clone(), id, kind).with_payload(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> ResourceType {
        ResourceType::new("Patient").unwrap()
    }

    #[test]
    fn test_insert_without_id_or_payload_generates_both() {
        let change = build_change(&patient(), None, LocalChangeType::Insert, None).unwrap();
        assert!(Uuid::parse_str(&change.resource_id).is_ok());

        let payload: serde_json::Value = serde_json::from_str(&change.payload).unwrap();
        assert_eq!(payload["resourceType"], "Patient");
        assert_eq!(payload["id"], change.resource_id.as_str());
    }

    #[test]
    fn test_delete_drops_payload() {
        let change =
            build_change(&patient(), Some("p1"), LocalChangeType::Delete, Some("{}")).unwrap();
        assert_eq!(change.payload, "");
    }

    #[test]
    fn test_update_requires_id_and_patch() {
        assert!(build_change(&patient(), None, LocalChangeType::Update, Some("[]")).is_err());
        assert!(build_change(&patient(), Some("p1"), LocalChangeType::Update, None).is_err());
        assert!(build_change(&patient(), Some("p1"), LocalChangeType::Update, Some("[]")).is_ok());
    }

    #[test]
    fn test_invalid_json_payload_rejected() {
        let err = build_change(&patient(), Some("p1"), LocalChangeType::Insert, Some("{nope"))
            .unwrap_err();
        assert!(err.contains("not valid JSON"));
    }
}

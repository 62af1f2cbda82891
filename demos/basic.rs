//! Basic coedit Example
//!
//! Two collaborators edit the same document concurrently through an
//! embedded `ConflictResolutionService`.
//!
//! Run with: cargo run --example basic

use std::time::Duration;

use coedit_core::{
    ApplyOutcome, ConflictResolutionService, DocumentEvent, DocumentId, Operation, Selection,
    VectorClock,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("coedit Basic Example\n");

    let service = ConflictResolutionService::new();
    let mut events = service.subscribe();

    let id = DocumentId::new("notes:standup")?;
    service.create_document(id.clone(), "Hello", "alice")?;

    // Presence
    service.join_document(&id, "alice", "Alice")?;
    service.join_document(&id, "bob", "Bob")?;
    service.update_user_state(&id, "bob", 0, Some(Selection::new(0, 5)))?;

    // Both users saw "Hello" and typed at the same time
    let alice = Operation::insert(5, " world", "alice");
    let bob = Operation::insert(0, ">> ", "bob");
    service.apply_operation(&id, alice)?;

    match service.apply_operation(&id, bob)? {
        ApplyOutcome::Applied { version, edits } => {
            println!("bob's insert produced {:?} (version {})", edits, version);
        }
        ApplyOutcome::Duplicate => println!("bob's insert was already applied"),
    }

    // Alice has now seen both edits; her delete is not concurrent with anything
    let vector: VectorClock = [("alice", 1), ("bob", 1)].into_iter().collect();
    let draft = service.create_version(&id, "alice", "before trimming")?;
    service.apply_operation(&id, Operation::delete(0, 3, "alice").with_vector(vector))?;

    let doc = service.get_document(&id)?;
    println!("Content: {:?} (version {})", doc.content, doc.version);
    println!("Vector:  {:?}", doc.vector);

    println!("\nActive users:");
    for user in service.get_active_users(&id)? {
        println!("  - {} cursor={} color={}", user.username, user.cursor, user.color);
    }

    let stats = service.get_document_statistics(&id)?;
    println!("\nOperations by kind: {:?}", stats.operations_by_kind);
    println!("Operations by author: {:?}", stats.operations_by_author);
    println!("Conflicts resolved: {}", stats.conflicts);

    let reverted = service.revert_to_version(&id, &draft.id, "bob")?;
    println!("\nReverted to v{} ({}): {:?}", draft.number, draft.description, reverted.content);

    service.leave_document(&id, "bob")?;
    println!("\nPruned {} idle users", service.prune_inactive_users(Duration::from_secs(30)));

    println!("\nEvents:");
    while let Ok(event) = events.try_recv() {
        match event {
            DocumentEvent::OperationApplied { version, operation, .. } => {
                println!("  - v{} {} by {}", version, operation.kind, operation.author_id);
            }
            DocumentEvent::VersionCreated { version, .. } => {
                println!("  - version {} by {}", version.number, version.created_by)
            }
            DocumentEvent::UserJoined { user_id, .. } => println!("  - {} joined", user_id),
            DocumentEvent::UserLeft { user_id, .. } => println!("  - {} left", user_id),
        }
    }

    let export = service.export_document(&id)?;
    println!("\nExport:\n{}", serde_json::to_string_pretty(&export)?);

    Ok(())
}

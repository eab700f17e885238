//! Database Tests
//!
//! Service-level CRUD against a migrated SQLite file: entities, intents,
//! conversation logs and playbooks, plus ownership and auth checks.

use super::create_test_db;
use crate::error::AppError;
use crate::models::{
    EntityType, EntityUpdate, Intent, IntentParameter, NewConversationLog, NewEntity, NewPlaybook,
    PlaybookInstruction, PlaybookStep, TrainingPhrase,
};
use crate::services::{conversation_logs, entities, intents, playbooks};

fn sample_intent() -> Intent {
    let mut intent = Intent::new("Book Flight");
    intent.description = "Books a flight".to_string();
    intent.training_phrases = vec![
        TrainingPhrase::new("Book a flight to Paris tomorrow")
            .with_entity("location", "Paris")
            .with_entity("date", "tomorrow"),
        TrainingPhrase::new("I need a plane ticket"),
    ];
    intent.responses = vec!["Where would you like to go?".to_string()];
    intent.parameters = vec![IntentParameter {
        name: "destination".to_string(),
        entity_type: "location".to_string(),
        required: true,
        prompt: Some("Which city?".to_string()),
    }];
    intent.contexts = Some(vec!["travel".to_string()]);
    intent
}

fn city_entity() -> NewEntity {
    NewEntity {
        name: "city".to_string(),
        display_name: "City".to_string(),
        description: Some("Cities we fly to".to_string()),
        category: Some("travel".to_string()),
        synonyms: vec!["NYC".to_string(), " nyc ".to_string(), "Big Apple".to_string()],
    }
}

#[cfg(test)]
mod entity_tests {
    use super::*;

    #[tokio::test]
    async fn test_system_entities_are_seeded() {
        let db = create_test_db().await;
        let listed = entities::list_entities(&db.ctx("user-1")).await.unwrap();

        let system: Vec<&str> = listed
            .iter()
            .filter(|e| e.entity_type == EntityType::System)
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(system.len(), 7);
        assert!(system.contains(&"email"));
        assert!(system.contains(&"phone_number"));
    }

    #[tokio::test]
    async fn test_create_and_get_entity() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let created = entities::create_entity(&ctx, city_entity()).await.unwrap();
        assert_eq!(created.entity_type, EntityType::Custom);
        assert_eq!(created.user_id.as_deref(), Some("user-1"));
        assert_eq!(created.synonyms, vec!["NYC", "Big Apple"]);

        let fetched = entities::get_entity(&ctx, &created.id).await.unwrap();
        assert_eq!(fetched.display_name, "City");
        assert_eq!(fetched.synonyms, vec!["NYC", "Big Apple"]);
    }

    #[tokio::test]
    async fn test_create_entity_rejects_empty_name() {
        let db = create_test_db().await;
        let result = entities::create_entity(
            &db.ctx("user-1"),
            NewEntity {
                name: String::new(),
                display_name: "Nameless".to_string(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(db.count("entities").await, 7);
    }

    #[tokio::test]
    async fn test_blank_entity_names_are_rejected() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let result = entities::create_entity(
            &ctx,
            NewEntity {
                name: "  ".to_string(),
                display_name: " ".to_string(),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(db.count("entities").await, 7);

        let created = entities::create_entity(&ctx, city_entity()).await.unwrap();
        for display_name in ["   ".to_string(), "x".repeat(201)] {
            let result = entities::update_entity(
                &ctx,
                &created.id,
                EntityUpdate {
                    display_name: Some(display_name),
                    ..Default::default()
                },
            )
            .await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
        let unchanged = entities::get_entity(&ctx, &created.id).await.unwrap();
        assert_eq!(unchanged.display_name, "City");
    }

    #[tokio::test]
    async fn test_update_entity_clears_optional_fields() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");
        let created = entities::create_entity(&ctx, city_entity()).await.unwrap();

        let updated = entities::update_entity(
            &ctx,
            &created.id,
            EntityUpdate {
                description: Some(String::new()),
                category: Some("  ".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(updated.description.is_none());
        assert!(updated.category.is_none());
        assert_eq!(updated.display_name, "City");
    }

    #[tokio::test]
    async fn test_update_entity_replaces_synonyms() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");
        let created = entities::create_entity(&ctx, city_entity()).await.unwrap();

        let updated = entities::update_entity(
            &ctx,
            &created.id,
            EntityUpdate {
                display_name: Some("Destination City".to_string()),
                synonyms: Some(vec!["LA".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.display_name, "Destination City");
        assert_eq!(updated.category.as_deref(), Some("travel"));
        assert_eq!(updated.synonyms, vec!["LA"]);
    }

    #[tokio::test]
    async fn test_synonym_add_and_remove() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");
        let created = entities::create_entity(&ctx, city_entity()).await.unwrap();

        let after_add = entities::add_synonym(&ctx, &created.id, "Gotham").await.unwrap();
        assert_eq!(after_add, vec!["NYC", "Big Apple", "Gotham"]);

        let duplicate = entities::add_synonym(&ctx, &created.id, "gotham").await.unwrap();
        assert_eq!(duplicate.len(), 3);

        let after_remove = entities::remove_synonym(&ctx, &created.id, "NYC").await.unwrap();
        assert_eq!(after_remove, vec!["Big Apple", "Gotham"]);
    }

    #[tokio::test]
    async fn test_synonym_case_folding_is_unicode_aware() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let created = entities::create_entity(
            &ctx,
            NewEntity {
                name: "season".to_string(),
                display_name: "Season".to_string(),
                synonyms: vec!["été".to_string(), "ÉTÉ".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(created.synonyms, vec!["été"]);

        let after_add = entities::add_synonym(&ctx, &created.id, "ÉTÉ").await.unwrap();
        assert_eq!(after_add, vec!["été"]);
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_entity() {
        let db = create_test_db().await;
        let owner = db.ctx("owner");
        let intruder = db.ctx("intruder");
        let created = entities::create_entity(&owner, city_entity()).await.unwrap();

        assert!(matches!(
            entities::get_entity(&intruder, &created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            entities::update_entity(&intruder, &created.id, EntityUpdate::default()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            entities::delete_entity(&intruder, &created.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            entities::add_synonym(&intruder, &created.id, "Metropolis").await,
            Err(AppError::NotFound(_))
        ));

        let still_there = entities::get_entity(&owner, &created.id).await.unwrap();
        assert_eq!(still_there.synonyms.len(), 2);

        let intruder_view = entities::list_entities(&intruder).await.unwrap();
        assert!(intruder_view.iter().all(|e| e.id != created.id));
    }

    #[tokio::test]
    async fn test_system_entities_are_read_only() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let email = entities::get_entity(&ctx, "sys-email").await.unwrap();
        assert_eq!(email.entity_type, EntityType::System);
        assert!(email.user_id.is_none());

        assert!(matches!(
            entities::update_entity(
                &ctx,
                "sys-email",
                EntityUpdate {
                    display_name: Some("Mail".to_string()),
                    ..Default::default()
                }
            )
            .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            entities::delete_entity(&ctx, "sys-email").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_entity_cascades_synonyms() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");
        let created = entities::create_entity(&ctx, city_entity()).await.unwrap();
        assert_eq!(db.count("entity_synonyms").await, 2);

        entities::delete_entity(&ctx, &created.id).await.unwrap();
        assert_eq!(db.count("entity_synonyms").await, 0);
        assert!(matches!(
            entities::get_entity(&ctx, &created.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}

#[cfg(test)]
mod intent_tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_get_intent() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let saved = intents::save_intent(&ctx, sample_intent()).await.unwrap();
        assert!(!saved.id.is_empty());
        assert_eq!(saved.user_id.as_deref(), Some("user-1"));
        assert!(saved.created_at > 0);

        let loaded = intents::get_intent(&ctx, &saved.id).await.unwrap();
        assert_eq!(loaded.display_name, "Book Flight");
        assert_eq!(loaded.training_phrases.len(), 2);
        assert_eq!(loaded.training_phrases[0].text, "Book a flight to Paris tomorrow");
        assert_eq!(loaded.training_phrases[1].text, "I need a plane ticket");
        assert_eq!(loaded.entity_span_count(), 2);

        let paris = &loaded.training_phrases[0].entities[0];
        assert_eq!(paris.value, "Paris");
        assert_eq!((paris.start_index, paris.end_index), (17, 22));

        assert_eq!(loaded.parameters, sample_intent().parameters);
        assert_eq!(loaded.contexts, Some(vec!["travel".to_string()]));
        assert_eq!(loaded.events, None);
        assert_eq!(loaded.priority, 500_000);
    }

    #[tokio::test]
    async fn test_list_intents_counts_phrases() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");
        intents::save_intent(&ctx, sample_intent()).await.unwrap();
        intents::save_intent(&ctx, Intent::new("Greeting")).await.unwrap();

        let listed = intents::list_intents(&ctx).await.unwrap();
        assert_eq!(listed.len(), 2);
        let flight = listed.iter().find(|i| i.display_name == "Book Flight").unwrap();
        assert_eq!(flight.phrase_count, 2);

        assert!(intents::list_intents(&db.ctx("user-2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resave_replaces_phrases() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");
        let saved = intents::save_intent(&ctx, sample_intent()).await.unwrap();

        let mut edited = saved.clone();
        edited.description = "Changed".to_string();
        edited.training_phrases = vec![TrainingPhrase::new("Fly me to Rome").with_entity("location", "Rome")];

        let resaved = intents::save_intent(&ctx, edited).await.unwrap();
        assert_eq!(resaved.id, saved.id);
        assert_eq!(resaved.created_at, saved.created_at);
        assert_eq!(resaved.description, "Changed");
        assert_eq!(resaved.training_phrases.len(), 1);

        assert_eq!(db.count("intents").await, 1);
        assert_eq!(db.count("training_phrases").await, 1);
        assert_eq!(db.count("phrase_entities").await, 1);
    }

    #[tokio::test]
    async fn test_save_rejects_bad_span() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let mut intent = sample_intent();
        intent.training_phrases[0].entities[0].end_index = 400;

        assert!(matches!(
            intents::save_intent(&ctx, intent).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(db.count("intents").await, 0);
    }

    #[tokio::test]
    async fn test_save_rejects_blank_display_name() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        assert!(matches!(
            intents::save_intent(&ctx, Intent::new("   ")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            intents::import_intents(&ctx, vec![Intent::new("\t")]).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(db.count("intents").await, 0);
    }

    #[tokio::test]
    async fn test_save_is_atomic() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        sqlx::query(
            r#"
            CREATE TRIGGER reject_boom BEFORE INSERT ON phrase_entities
            WHEN NEW.value = 'boom'
            BEGIN
                SELECT RAISE(ABORT, 'boom rejected');
            END;
            "#,
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let mut intent = sample_intent();
        intent
            .training_phrases
            .push(TrainingPhrase::new("it went boom").with_entity("sound", "boom"));

        assert!(matches!(
            intents::save_intent(&ctx, intent).await,
            Err(AppError::Database(_))
        ));
        assert_eq!(db.count("intents").await, 0);
        assert_eq!(db.count("training_phrases").await, 0);
        assert_eq!(db.count("phrase_entities").await, 0);
    }

    #[tokio::test]
    async fn test_foreign_intent_is_invisible() {
        let db = create_test_db().await;
        let saved = intents::save_intent(&db.ctx("owner"), sample_intent()).await.unwrap();
        let intruder = db.ctx("intruder");

        assert!(matches!(
            intents::get_intent(&intruder, &saved.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            intents::delete_intent(&intruder, &saved.id).await,
            Err(AppError::NotFound(_))
        ));

        let mut hijack = saved.clone();
        hijack.display_name = "Hijacked".to_string();
        assert!(matches!(
            intents::save_intent(&intruder, hijack).await,
            Err(AppError::NotFound(_))
        ));

        let untouched = intents::get_intent(&db.ctx("owner"), &saved.id).await.unwrap();
        assert_eq!(untouched.display_name, "Book Flight");
    }

    #[tokio::test]
    async fn test_delete_intent_cascades() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");
        let saved = intents::save_intent(&ctx, sample_intent()).await.unwrap();

        intents::delete_intent(&ctx, &saved.id).await.unwrap();

        assert_eq!(db.count("intents").await, 0);
        assert_eq!(db.count("training_phrases").await, 0);
        assert_eq!(db.count("phrase_entities").await, 0);
        assert!(matches!(
            intents::delete_intent(&ctx, &saved.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_import_assigns_new_ids() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");
        let original = intents::save_intent(&ctx, sample_intent()).await.unwrap();

        let imported = intents::import_intents(&ctx, vec![original.clone(), Intent::new("Goodbye")])
            .await
            .unwrap();

        assert_eq!(imported.len(), 2);
        assert_ne!(imported[0].id, original.id);
        assert_eq!(imported[0].training_phrases.len(), 2);
        assert_eq!(db.count("intents").await, 3);
    }
}

#[cfg(test)]
mod log_tests {
    use super::*;
    use std::collections::BTreeMap;

    fn new_log(input: &str) -> NewConversationLog {
        NewConversationLog {
            user_input: input.to_string(),
            detected_entities: Vec::new(),
            missing_entities: vec!["location".to_string()],
            confidence_scores: BTreeMap::from([("email".to_string(), 0.9)]),
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_log_lifecycle() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let created = conversation_logs::create_conversation_log(&ctx, new_log("first"))
            .await
            .unwrap();
        conversation_logs::create_conversation_log(&ctx, new_log("second"))
            .await
            .unwrap();

        let listed = conversation_logs::list_conversation_logs(&ctx, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].user_input, "second");

        let limited = conversation_logs::list_conversation_logs(&ctx, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        conversation_logs::mark_processed(&ctx, &created.id).await.unwrap();
        let fetched = conversation_logs::get_conversation_log(&ctx, &created.id)
            .await
            .unwrap();
        assert!(fetched.processed);
        assert_eq!(fetched.missing_entities.0, vec!["location".to_string()]);
        assert_eq!(fetched.confidence_scores.0.get("email"), Some(&0.9));

        conversation_logs::delete_conversation_log(&ctx, &created.id)
            .await
            .unwrap();
        assert_eq!(db.count("conversation_logs").await, 1);
    }

    #[tokio::test]
    async fn test_log_rejects_empty_input() {
        let db = create_test_db().await;
        let result = conversation_logs::create_conversation_log(&db.ctx("user-1"), new_log("")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_logs_are_private() {
        let db = create_test_db().await;
        let created = conversation_logs::create_conversation_log(&db.ctx("owner"), new_log("hi"))
            .await
            .unwrap();
        let intruder = db.ctx("intruder");

        assert!(conversation_logs::list_conversation_logs(&intruder, 10)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            conversation_logs::mark_processed(&intruder, &created.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}

#[cfg(test)]
mod playbook_tests {
    use super::*;

    fn new_playbook(name: &str) -> NewPlaybook {
        NewPlaybook {
            name: name.to_string(),
            description: Some("Guides a booking".to_string()),
            instruction: PlaybookInstruction {
                steps: vec![
                    PlaybookStep {
                        order: 1,
                        instruction: "Ask for the destination".to_string(),
                        expected_outcome: None,
                    },
                    PlaybookStep {
                        order: 2,
                        instruction: "Confirm dates".to_string(),
                        expected_outcome: Some("dates known".to_string()),
                    },
                ],
                goals: vec!["Complete a booking".to_string()],
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_playbook_crud() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let created = playbooks::create_playbook(&ctx, new_playbook("Booking")).await.unwrap();
        assert_eq!(created.body.steps.len(), 2);

        let mut replacement = new_playbook("Booking v2");
        replacement.instruction.steps.pop();
        let updated = playbooks::update_playbook(&ctx, &created.id, replacement)
            .await
            .unwrap();
        assert_eq!(updated.name, "Booking v2");
        assert_eq!(updated.body.steps.len(), 1);

        let listed = playbooks::list_playbooks(&ctx).await.unwrap();
        assert_eq!(listed.len(), 1);

        playbooks::delete_playbook(&ctx, &created.id).await.unwrap();
        assert!(matches!(
            playbooks::get_playbook(&ctx, &created.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_playbook_rejects_duplicate_steps() {
        let db = create_test_db().await;
        let mut playbook = new_playbook("Broken");
        playbook.instruction.steps[1].order = 1;

        let result = playbooks::create_playbook(&db.ctx("user-1"), playbook).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(db.count("playbooks").await, 0);
    }

    #[tokio::test]
    async fn test_playbook_rejects_blank_name() {
        let db = create_test_db().await;
        let ctx = db.ctx("user-1");

        let result = playbooks::create_playbook(&ctx, new_playbook("  ")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let created = playbooks::create_playbook(&ctx, new_playbook("Booking")).await.unwrap();
        let result = playbooks::update_playbook(&ctx, &created.id, new_playbook(" ")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(playbooks::get_playbook(&ctx, &created.id).await.unwrap().name, "Booking");
    }

    #[tokio::test]
    async fn test_update_foreign_playbook_fails() {
        let db = create_test_db().await;
        let created = playbooks::create_playbook(&db.ctx("owner"), new_playbook("Mine"))
            .await
            .unwrap();

        let result =
            playbooks::update_playbook(&db.ctx("intruder"), &created.id, new_playbook("Theirs")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}

#[cfg(test)]
mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_unauthenticated_calls_write_nothing() {
        let db = create_test_db().await;
        let anon = db.anonymous();

        assert!(matches!(
            entities::create_entity(&anon, city_entity()).await,
            Err(AppError::NotAuthenticated)
        ));
        assert!(matches!(
            entities::list_entities(&anon).await,
            Err(AppError::NotAuthenticated)
        ));
        assert!(matches!(
            intents::save_intent(&anon, sample_intent()).await,
            Err(AppError::NotAuthenticated)
        ));
        assert!(matches!(
            intents::import_intents(&anon, vec![sample_intent()]).await,
            Err(AppError::NotAuthenticated)
        ));
        assert!(matches!(
            playbooks::list_playbooks(&anon).await,
            Err(AppError::NotAuthenticated)
        ));

        assert_eq!(db.count("entities").await, 7);
        assert_eq!(db.count("intents").await, 0);
        assert_eq!(db.count("training_phrases").await, 0);
    }
}

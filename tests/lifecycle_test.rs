#[cfg(test)]
mod lifecycle_integration_tests {
    use ticketcore::core::config::LifecycleConfig;
    use ticketcore::core::shared::enums::{HistoryType, StateType};
    use ticketcore::tickets::{
        Actor, CancelFlag, InMemoryTicketStore, LifecycleError, Mutation, Ticket, TicketLifecycle,
        TicketState, TicketStore, ValidationError,
    };

    const NEW: i32 = 1;
    const CLOSED: i32 = 2;
    const OPEN: i32 = 4;
    const PENDING_REMINDER: i32 = 6;
    const MERGED: i32 = 9;
    const RESOLVED: i32 = 10;

    async fn setup(tickets: &[(i64, i32)]) -> (InMemoryTicketStore, TicketLifecycle<InMemoryTicketStore>) {
        let store = InMemoryTicketStore::with_default_catalog().await;
        store.add_user(2, "Jane Agent").await;
        store.add_user(3, "Ravi Agent").await;
        for (id, state_id) in tickets {
            store
                .insert_ticket(Ticket::new(*id, format!("10{id:02}"), *state_id))
                .await;
        }
        let lifecycle = TicketLifecycle::new(store.clone(), LifecycleConfig::default())
            .await
            .expect("lifecycle");
        (store, lifecycle)
    }

    fn set_state(state: &str) -> Mutation {
        Mutation::StateChange {
            state: state.to_string(),
            pending_until: None,
            reason: None,
            resolution: None,
        }
    }

    async fn messages(store: &InMemoryTicketStore, id: i64) -> Vec<String> {
        store
            .list_history(id)
            .await
            .expect("history")
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[tokio::test]
    async fn test_open_new_ticket_records_state_change() {
        let (store, lifecycle) = setup(&[(1, NEW)]).await;

        let outcome = lifecycle
            .mutate(1, set_state("open"), &Actor::agent(2))
            .await
            .expect("open");

        assert_eq!(outcome.ticket.state_id, OPEN);
        assert_eq!(outcome.ticket.changed_by, 2);
        assert!(outcome.audit_complete);
        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.history[0].history_type, HistoryType::StateChanged);
        assert_eq!(messages(&store, 1).await, vec!["State changed from new to open"]);
    }

    #[tokio::test]
    async fn test_new_to_resolved_is_rejected_without_write() {
        let (store, lifecycle) = setup(&[(1, NEW)]).await;
        let mutation = Mutation::StateChange {
            state: "resolved".to_string(),
            pending_until: None,
            reason: None,
            resolution: Some("fixed".to_string()),
        };

        let err = lifecycle.mutate(1, mutation, &Actor::agent(2)).await.unwrap_err();

        assert_eq!(err.code(), "illegal_transition");
        let ticket = store.get_ticket(1).await.expect("get").expect("exists");
        assert_eq!(ticket.state_id, NEW);
        assert!(messages(&store, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_requires_reason_and_parsable_deadline() {
        let (store, lifecycle) = setup(&[(1, OPEN)]).await;
        let agent = Actor::agent(2);

        let no_reason = Mutation::StateChange {
            state: "pending reminder".to_string(),
            pending_until: Some("2026-11-01 09:00".to_string()),
            reason: None,
            resolution: None,
        };
        let err = lifecycle.mutate(1, no_reason, &agent).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(ValidationError::ReasonRequired)));

        let bad_deadline = Mutation::StateChange {
            state: "pending reminder".to_string(),
            pending_until: Some("soonish".to_string()),
            reason: Some("waiting on vendor".to_string()),
            resolution: None,
        };
        let err = lifecycle.mutate(1, bad_deadline, &agent).await.unwrap_err();
        assert_eq!(err.code(), "invalid_pending_time");

        let no_deadline = Mutation::StateChange {
            state: "pending reminder".to_string(),
            pending_until: None,
            reason: Some("waiting on vendor".to_string()),
            resolution: None,
        };
        let err = lifecycle.mutate(1, no_deadline, &agent).await.unwrap_err();
        assert_eq!(err.code(), "pending_time_required");

        let ticket = store.get_ticket(1).await.expect("get").expect("exists");
        assert_eq!(ticket.state_id, OPEN);
        assert!(ticket.pending_until.is_none());
        assert!(messages(&store, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_round_trip_sets_and_clears_deadline() {
        let (store, lifecycle) = setup(&[(1, OPEN)]).await;
        let agent = Actor::agent(2);

        let pending = Mutation::StateChange {
            state: "Pending-Reminder".to_string(),
            pending_until: Some("2026-11-01 09:00".to_string()),
            reason: Some("waiting on vendor".to_string()),
            resolution: None,
        };
        let outcome = lifecycle.mutate(1, pending, &agent).await.expect("pending");
        assert_eq!(outcome.ticket.state_id, PENDING_REMINDER);
        assert!(outcome.ticket.pending_until.is_some());

        let outcome = lifecycle
            .mutator()
            .apply_state_change(1, "open", None, None, None, &agent)
            .await
            .expect("reopen");
        assert!(outcome.ticket.pending_until.is_none());

        assert_eq!(
            messages(&store, 1).await,
            vec![
                "State changed from open to pending reminder",
                "Pending until 01 Nov 2026 09:00",
                "Pending reason — waiting on vendor",
                "State changed from pending reminder to open",
                "Pending time cleared",
            ]
        );
    }

    #[tokio::test]
    async fn test_resolution_notes_and_customer_permission() {
        let (store, lifecycle) = setup(&[(1, OPEN)]).await;

        let err = lifecycle
            .mutate(1, set_state("resolved"), &Actor::agent(2))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "resolution_required");

        let resolve = Mutation::StateChange {
            state: "resolved".to_string(),
            pending_until: None,
            reason: None,
            resolution: Some("Replaced the failing power supply".to_string()),
        };
        let err = lifecycle
            .mutate(1, resolve.clone(), &Actor::customer(40))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "permission_denied");

        let outcome = lifecycle.mutate(1, resolve, &Actor::agent(2)).await.expect("resolve");
        assert_eq!(outcome.ticket.state_id, RESOLVED);
        assert_eq!(
            messages(&store, 1).await,
            vec![
                "State changed from open to resolved",
                "Resolution — Replaced the failing power supply",
            ]
        );
    }

    #[tokio::test]
    async fn test_customer_reopen_request_keeps_state() {
        let (store, lifecycle) = setup(&[(1, CLOSED)]).await;
        let customer = Actor::customer(40);

        let err = lifecycle.mutate(1, set_state("open"), &customer).await.unwrap_err();
        assert_eq!(err.code(), "permission_denied");

        let outcome = lifecycle
            .request_reopen(1, "The printer jammed again", &customer)
            .await
            .expect("reopen request");
        assert_eq!(outcome.ticket.state_id, CLOSED);
        assert_eq!(outcome.history[0].history_type, HistoryType::ReopenRequested);
        assert_eq!(outcome.history[0].created_by, 40);
        assert_eq!(
            messages(&store, 1).await,
            vec!["Reopen requested — The printer jammed again"]
        );

        let err = lifecycle.request_reopen(1, "  ", &customer).await.unwrap_err();
        assert_eq!(err.code(), "reason_required");
    }

    #[tokio::test]
    async fn test_unknown_ticket_is_not_found_without_audit() {
        let (store, lifecycle) = setup(&[]).await;
        let err = lifecycle
            .mutate(404, Mutation::LockChange { locked: true }, &Actor::agent(2))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Ticket 404: not found");
        assert!(messages(&store, 404).await.is_empty());
    }

    #[tokio::test]
    async fn test_retired_state_is_not_a_target() {
        let store = InMemoryTicketStore::with_default_catalog().await;
        let mut on_hold = TicketState::new(20, "on hold", StateType::Closed);
        on_hold.is_valid = false;
        store.add_state(on_hold).await;
        store.insert_ticket(Ticket::new(1, "1001", RESOLVED)).await;
        let lifecycle = TicketLifecycle::new(store.clone(), LifecycleConfig::default())
            .await
            .expect("lifecycle");

        for target in ["on hold", "20"] {
            let err = lifecycle
                .mutate(1, set_state(target), &Actor::agent(2))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "not_found", "target {target}");
        }

        let ticket = store.get_ticket(1).await.expect("get").expect("exists");
        assert_eq!(ticket.state_id, RESOLVED);
        assert!(messages(&store, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_retired_reference_rows_are_rejected() {
        let (store, lifecycle) = setup(&[(1, OPEN), (2, OPEN)]).await;
        let agent = Actor::agent(2);
        store.retire_priority(5).await;
        store.retire_queue(3).await;
        store.retire_user(3).await;

        for mutation in [
            Mutation::PriorityChange { priority_id: 5 },
            Mutation::QueueMove { queue_id: 3 },
            Mutation::OwnerChange {
                owner_id: 3,
                set_responsible: false,
            },
        ] {
            let err = lifecycle.mutate(1, mutation, &agent).await.unwrap_err();
            assert_eq!(err.code(), "not_found");
        }
        let err = lifecycle
            .apply_to_many(&[1, 2], Mutation::QueueMove { queue_id: 3 }, &agent, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let ticket = store.get_ticket(1).await.expect("get").expect("exists");
        assert_eq!(ticket.priority_id, 3);
        assert!(messages(&store, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_retired_old_value_still_named_in_history() {
        let (store, lifecycle) = setup(&[(1, OPEN)]).await;
        store.retire_priority(3).await;

        lifecycle
            .mutate(1, Mutation::PriorityChange { priority_id: 4 }, &Actor::agent(2))
            .await
            .expect("priority");

        assert_eq!(
            messages(&store, 1).await,
            vec!["Priority changed from 3 normal to 4 high"]
        );
    }

    #[tokio::test]
    async fn test_lock_and_owner_messages() {
        let (store, lifecycle) = setup(&[(1, OPEN)]).await;
        let agent = Actor::agent(2);

        let mutator = lifecycle.mutator();
        mutator.apply_lock_change(1, true, &agent).await.expect("lock");
        let outcome = mutator
            .apply_owner_change(1, 3, true, &agent)
            .await
            .expect("assign");

        assert_eq!(outcome.ticket.owner_id, 3);
        assert_eq!(outcome.ticket.responsible_id, Some(3));
        assert_eq!(
            messages(&store, 1).await,
            vec![
                "Lock changed from unlocked to locked",
                "Owner changed from Admin System to Ravi Agent",
                "Responsible set to Ravi Agent",
            ]
        );
    }

    #[tokio::test]
    async fn test_noop_change_is_not_recorded() {
        let (store, lifecycle) = setup(&[(1, OPEN)]).await;
        let outcome = lifecycle
            .mutate(1, Mutation::PriorityChange { priority_id: 3 }, &Actor::agent(2))
            .await
            .expect("same priority");
        assert!(outcome.history.is_empty());
        assert!(messages(&store, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_label_read_degrades_message() {
        let (store, lifecycle) = setup(&[(1, NEW)]).await;
        store.fail_label_lookups(true).await;

        let outcome = lifecycle
            .mutate(1, set_state("open"), &Actor::agent(2))
            .await
            .expect("open");

        assert_eq!(outcome.ticket.state_id, OPEN);
        assert_eq!(messages(&store, 1).await, vec!["State set to open"]);
    }

    #[tokio::test]
    async fn test_failed_history_append_keeps_mutation() {
        let (store, lifecycle) = setup(&[(1, OPEN)]).await;
        store.fail_history_appends(true).await;

        let outcome = lifecycle
            .mutate(1, Mutation::PriorityChange { priority_id: 5 }, &Actor::agent(2))
            .await
            .expect("priority");

        assert!(!outcome.audit_complete);
        assert!(outcome.history.is_empty());
        let ticket = store.get_ticket(1).await.expect("get").expect("exists");
        assert_eq!(ticket.priority_id, 5);
    }

    #[tokio::test]
    async fn test_bulk_counts_missing_ticket() {
        let (store, lifecycle) = setup(&[(1, OPEN), (3, OPEN)]).await;

        let result = lifecycle
            .apply_to_many(
                &[1, 404, 3],
                Mutation::PriorityChange { priority_id: 5 },
                &Actor::agent(2),
                None,
            )
            .await
            .expect("bulk");

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert!(!result.success);
        assert_eq!(result.errors, vec!["Ticket 404: not found"]);
        assert_eq!(
            messages(&store, 3).await,
            vec!["Priority changed from 3 normal to 5 very high"]
        );
    }

    #[tokio::test]
    async fn test_bulk_item_failures_do_not_abort() {
        let (store, lifecycle) = setup(&[(1, NEW), (2, OPEN), (3, NEW)]).await;
        store.fail_updates_for(3).await;

        let result = lifecycle
            .apply_to_many(&[1, 2, 3, 1], set_state("open"), &Actor::agent(2), None)
            .await
            .expect("bulk");

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.succeeded + result.failed, result.total);
        assert_eq!(
            result.errors,
            vec![
                "Ticket 2: illegal transition from open to open",
                "Ticket 3: update failed",
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_request_level_rejections() {
        let (store, lifecycle) = setup(&[(1, OPEN)]).await;

        let err = lifecycle
            .apply_to_many(&[1], Mutation::QueueMove { queue_id: 99 }, &Actor::agent(2), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = lifecycle
            .apply_to_many(&[], Mutation::LockChange { locked: true }, &Actor::agent(2), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_tickets_selected");

        let err = lifecycle
            .apply_to_many(&[1], Mutation::LockChange { locked: true }, &Actor::customer(40), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "permission_denied");

        assert!(messages(&store, 1).await.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_cancellation_marks_remaining_items() {
        let (_store, lifecycle) = setup(&[(1, OPEN), (2, OPEN)]).await;
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = lifecycle
            .apply_to_many(
                &[1, 2],
                Mutation::LockChange { locked: true },
                &Actor::agent(2),
                Some(&cancel),
            )
            .await
            .expect("bulk");

        assert_eq!(result.failed, 2);
        assert_eq!(result.errors, vec!["Ticket 1: cancelled", "Ticket 2: cancelled"]);
    }

    #[tokio::test]
    async fn test_bulk_cancelled_between_items() {
        let (store, lifecycle) = setup(&[(1, OPEN), (2, OPEN), (3, OPEN)]).await;
        let cancel = CancelFlag::new();
        let trip = cancel.clone();
        store.on_commit(move |_| trip.cancel()).await;

        let result = lifecycle
            .apply_to_many(
                &[1, 2, 3],
                Mutation::LockChange { locked: true },
                &Actor::agent(2),
                Some(&cancel),
            )
            .await
            .expect("bulk");

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 2);
        assert_eq!(result.succeeded + result.failed, result.total);
        assert_eq!(result.errors, vec!["Ticket 2: cancelled", "Ticket 3: cancelled"]);
        assert!(store.get_ticket(1).await.expect("get").expect("exists").locked);
        for id in [2, 3] {
            let ticket = store.get_ticket(id).await.expect("get").expect("exists");
            assert!(!ticket.locked);
        }
    }

    #[tokio::test]
    async fn test_merge_cancelled_between_sources() {
        let (store, lifecycle) = setup(&[(10, OPEN), (11, OPEN), (12, OPEN), (13, OPEN)]).await;
        let cancel = CancelFlag::new();
        let trip = cancel.clone();
        store.on_commit(move |_| trip.cancel()).await;

        let result = lifecycle
            .merge(10, &[11, 12, 13], None, &Actor::agent(2), Some(&cancel))
            .await
            .expect("merge");

        let summary = &result.summary;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded + summary.failed, summary.total);
        assert_eq!(summary.errors, vec!["Ticket 12: cancelled", "Ticket 13: cancelled"]);
        assert_eq!(result.merged_tickets, vec!["1011"]);
        for id in [12, 13] {
            let ticket = store.get_ticket(id).await.expect("get").expect("exists");
            assert_eq!(ticket.state_id, OPEN);
        }
        assert_eq!(
            messages(&store, 10).await,
            vec!["Merged ticket #1011 into this ticket"]
        );
    }

    #[tokio::test]
    async fn test_merge_drops_target_from_sources() {
        let (store, lifecycle) = setup(&[(10, OPEN), (11, OPEN), (12, NEW)]).await;
        store.add_article(11).await;
        store.add_article(12).await;

        let result = lifecycle
            .merge(10, &[10, 11, 12], None, &Actor::agent(2), None)
            .await
            .expect("merge");

        assert_eq!(result.summary.total, 2);
        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(result.target_ticket, "1010");
        assert_eq!(result.merged_tickets, vec!["1011", "1012"]);
        assert_eq!(store.articles_of(10).await.len(), 2);
        for id in [11, 12] {
            let ticket = store.get_ticket(id).await.expect("get").expect("exists");
            assert_eq!(ticket.state_id, MERGED);
            assert_eq!(messages(&store, id).await, vec!["Merged into ticket #1010"]);
        }
        assert_eq!(
            messages(&store, 10).await,
            vec!["Merged tickets #1011, #1012 into this ticket"]
        );
    }

    #[tokio::test]
    async fn test_merge_partial_failure_keeps_earlier_sources() {
        let (store, lifecycle) = setup(&[(10, OPEN), (11, OPEN), (12, OPEN)]).await;
        store.add_article(12).await;
        store.fail_article_moves_for(12).await;

        let result = lifecycle
            .merge(10, &[11, 12], Some("duplicate outage report"), &Actor::agent(2), None)
            .await
            .expect("merge");

        assert_eq!(result.summary.succeeded, 1);
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.summary.errors, vec!["Ticket 12: article move failed"]);

        let merged = store.get_ticket(11).await.expect("get").expect("exists");
        assert_eq!(merged.state_id, MERGED);
        let untouched = store.get_ticket(12).await.expect("get").expect("exists");
        assert_eq!(untouched.state_id, OPEN);
        assert_eq!(store.articles_of(12).await.len(), 1);
        assert_eq!(
            messages(&store, 10).await,
            vec!["Merged ticket #1011 into this ticket — duplicate outage report"]
        );
    }

    #[tokio::test]
    async fn test_merge_rejections() {
        let (_store, lifecycle) = setup(&[(10, OPEN), (11, MERGED), (20, MERGED)]).await;
        let agent = Actor::agent(2);

        let err = lifecycle.merge(10, &[10], None, &agent, None).await.unwrap_err();
        assert_eq!(err.to_string(), "no source tickets to merge");

        let err = lifecycle.merge(404, &[11], None, &agent, None).await.unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = lifecycle.merge(20, &[10], None, &agent, None).await.unwrap_err();
        assert_eq!(err.code(), "invalid_merge_target");

        let err = lifecycle
            .merge(10, &[11], None, &Actor::customer(40), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "permission_denied");

        let result = lifecycle.merge(10, &[11, 99], None, &agent, None).await.expect("merge");
        assert_eq!(
            result.summary.errors,
            vec!["Ticket 11: ticket #1011 is already merged", "Ticket 99: not found"]
        );
    }

    #[tokio::test]
    async fn test_history_follows_mutation_order() {
        let (_store, lifecycle) = setup(&[(1, NEW)]).await;
        let agent = Actor::agent(2);

        lifecycle.mutate(1, set_state("open"), &agent).await.expect("open");
        lifecycle
            .mutator()
            .apply_queue_change(1, 4, &agent)
            .await
            .expect("queue");
        lifecycle
            .mutator()
            .apply_priority_change(1, 4, &agent)
            .await
            .expect("priority");

        let history = lifecycle.history(1).await.expect("history");
        let types: Vec<_> = history.iter().map(|e| e.history_type).collect();
        assert_eq!(
            types,
            vec![
                HistoryType::StateChanged,
                HistoryType::QueueMoved,
                HistoryType::PriorityChanged
            ]
        );
        assert!(history.windows(2).all(|w| (w[0].created_at, w[0].id) < (w[1].created_at, w[1].id)));
        assert_eq!(history[1].message, "Queue changed from Postmaster to Misc");

        assert_eq!(lifecycle.history(77).await.unwrap_err().code(), "not_found");
    }
}

mod common;

use common::{dec, Harness};
use pix_donations::payments::{PixAmount, PixError};
use pix_donations::error::AppError;
use pix_donations::services::notification::{
    LiveEvent, LiveHandle, NotificationChannel, NotificationError, SubscribeOutcome,
};
use pix_donations::services::transaction_lifecycle::CreateTransactionRequest;
use pix_donations::services::webhook_processor::{
    ConfirmationOutcome, PixConfirmation, WebhookProcessorError,
};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

fn confirmation(txid: &str, e2e: &str, amount: &str) -> PixConfirmation {
    PixConfirmation {
        txid: txid.to_string(),
        end_to_end_id: e2e.to_string(),
        amount: PixAmount::parse(amount).unwrap(),
    }
}

async fn create_pending(harness: &Harness, donation_id: Uuid, amount: &str) -> String {
    let request: CreateTransactionRequest = serde_json::from_value(json!({
        "amount": amount,
        "alias": "Ana",
        "email": "ana@example.com",
        "message": "Boa sorte!",
        "donation_id": donation_id.to_string(),
    }))
    .unwrap();

    harness
        .lifecycle
        .create_transaction(request.validate().unwrap())
        .await
        .unwrap()
        .txid
}

#[tokio::test]
async fn confirmed_payment_credits_the_campaign_and_notifies_the_payer() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let txid = create_pending(&harness, donation.id, "100.00").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    harness
        .registry
        .subscribe(&txid, LiveHandle::new("socket-1", tx))
        .await
        .unwrap();

    let outcome = harness
        .processor
        .process_confirmation(&confirmation(&txid, "E1", "100.00"))
        .await
        .unwrap();

    match outcome {
        ConfirmationOutcome::Settled { transaction } => {
            assert!(transaction.is_paid());
            assert_eq!(transaction.end_to_end_id.as_deref(), Some("E1"));
            assert!(transaction.paid_at.is_some());
        }
        other => panic!("expected settlement, got {:?}", other),
    }

    assert_eq!(harness.db.amount_raised(donation.id), dec("100.00"));
    assert_eq!(
        rx.recv().await.unwrap(),
        LiveEvent::Payment {
            txid: txid.clone(),
            message: "Pagamento realizado".to_string(),
        }
    );
    assert_eq!(harness.registry.subscriber_count(&txid).await, 0);
}

#[tokio::test]
async fn redelivered_confirmation_does_not_credit_twice() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let txid = create_pending(&harness, donation.id, "100.00").await;
    let event = confirmation(&txid, "E1", "100.00");

    harness.processor.process_confirmation(&event).await.unwrap();
    let second = harness.processor.process_confirmation(&event).await.unwrap();

    assert!(matches!(second, ConfirmationOutcome::Duplicate { .. }));
    assert_eq!(harness.db.amount_raised(donation.id), dec("100.00"));
}

#[tokio::test]
async fn unknown_txid_is_a_correlation_error_without_mutation() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let txid = create_pending(&harness, donation.id, "100.00").await;

    let err = harness
        .processor
        .process_confirmation(&confirmation("doesnotexist", "E9", "100.00"))
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookProcessorError::Correlation { .. }));
    assert_eq!(harness.db.amount_raised(donation.id), dec("0"));
    assert!(!harness.db.transaction_by_txid(&txid).unwrap().is_paid());
}

#[tokio::test]
async fn concurrent_confirmations_on_one_campaign_are_summed() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let first = create_pending(&harness, donation.id, "100.00").await;
    let second = create_pending(&harness, donation.id, "50.00").await;

    let a = confirmation(&first, "E1", "100.00");
    let b = confirmation(&second, "E2", "50.00");
    let (ra, rb) = tokio::join!(
        harness.processor.process_confirmation(&a),
        harness.processor.process_confirmation(&b),
    );

    assert!(matches!(ra.unwrap(), ConfirmationOutcome::Settled { .. }));
    assert!(matches!(rb.unwrap(), ConfirmationOutcome::Settled { .. }));
    assert_eq!(harness.db.amount_raised(donation.id), dec("150.00"));
}

#[tokio::test]
async fn racing_deliveries_of_one_txid_settle_once() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let txid = create_pending(&harness, donation.id, "100.00").await;
    let event = confirmation(&txid, "E1", "100.00");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let processor = harness.processor.clone();
            let event = event.clone();
            tokio::spawn(async move { processor.process_confirmation(&event).await })
        })
        .collect();

    let mut settled = 0;
    for handle in handles {
        if let ConfirmationOutcome::Settled { .. } = handle.await.unwrap().unwrap() {
            settled += 1;
        }
    }

    assert_eq!(settled, 1);
    assert_eq!(harness.db.amount_raised(donation.id), dec("100.00"));
}

#[tokio::test]
async fn confirmed_amount_is_credited_when_it_differs() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let txid = create_pending(&harness, donation.id, "100.00").await;

    harness
        .processor
        .process_confirmation(&confirmation(&txid, "E1", "90.00"))
        .await
        .unwrap();

    assert_eq!(harness.db.amount_raised(donation.id), dec("90.00"));
}

#[tokio::test]
async fn batch_reports_processed_and_duplicates() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let first = create_pending(&harness, donation.id, "10.00").await;
    let second = create_pending(&harness, donation.id, "20.00").await;

    let batch = vec![
        confirmation(&first, "E1", "10.00"),
        confirmation(&second, "E2", "20.00"),
        confirmation(&first, "E1", "10.00"),
    ];
    let summary = harness.processor.process_batch(&batch).await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(harness.db.amount_raised(donation.id), dec("30.00"));
}

#[tokio::test]
async fn batch_keeps_going_after_a_failed_element() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let txid = create_pending(&harness, donation.id, "10.00").await;

    let batch = vec![
        confirmation("unknown", "E0", "10.00"),
        confirmation(&txid, "E1", "10.00"),
    ];
    let err = harness.processor.process_batch(&batch).await.unwrap_err();

    assert!(matches!(err, WebhookProcessorError::Correlation { .. }));
    assert_eq!(harness.db.amount_raised(donation.id), dec("10.00"));
}

#[tokio::test]
async fn failed_payout_refunds_the_donor_and_keeps_the_settlement() {
    let harness = Harness::with_payout();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let txid = create_pending(&harness, donation.id, "100.00").await;
    harness.gateway.fail(
        "send_pix",
        PixError::Rejected {
            status: 400,
            reason: "Chave Pix do favorecido inválida".to_string(),
        },
    );

    let err = harness
        .processor
        .process_confirmation(&confirmation(&txid, "E1", "100.00"))
        .await
        .unwrap_err();

    match err {
        WebhookProcessorError::Payout { source, .. } => assert!(source.refunded()),
        other => panic!("expected payout failure, got {:?}", other),
    }
    assert!(harness.gateway.calls().contains(&"refund_pix".to_string()));
    assert_eq!(harness.db.amount_raised(donation.id), dec("100.00"));
    assert!(harness.db.transaction_by_txid(&txid).unwrap().is_paid());
}

#[tokio::test]
async fn successful_payout_forwards_without_refund() {
    let harness = Harness::with_payout();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    let txid = create_pending(&harness, donation.id, "25.00").await;

    harness
        .processor
        .process_confirmation(&confirmation(&txid, "E1", "25.00"))
        .await
        .unwrap();

    let calls = harness.gateway.calls();
    assert!(calls.contains(&"send_pix".to_string()));
    assert!(!calls.contains(&"refund_pix".to_string()));
}

#[tokio::test]
async fn database_failure_outranks_an_unknown_txid_in_one_batch() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    harness.db.insert_pending(donation.id, "flaky", "40.00");
    harness.faults.fail_lookup("flaky");

    let batch = vec![
        confirmation("ghost", "E1", "10.00"),
        confirmation("flaky", "E2", "40.00"),
    ];
    let err = harness.processor.process_batch(&batch).await.unwrap_err();

    assert!(matches!(err, WebhookProcessorError::Database(_)), "{:?}", err);
    let app: AppError = err.into();
    assert_eq!(app.status_code(), 500);
    assert_eq!(harness.db.amount_raised(donation.id), dec("0"));

    // The redelivery after recovery credits the payment
    harness.faults.recover();
    let summary = harness
        .processor
        .process_batch(&batch[1..])
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(harness.db.amount_raised(donation.id), dec("40.00"));
}

#[tokio::test]
async fn payer_subscribing_after_settlement_still_hears_of_it() {
    let harness = Harness::new();
    let (donation, _) = harness.db.seed_campaign("Reforma da creche");
    harness.db.insert_pending(donation.id, "late", "25.00");

    harness
        .processor
        .process_confirmation(&confirmation("late", "E1", "25.00"))
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = harness
        .registry
        .subscribe("late", LiveHandle::new("socket-late", tx))
        .await
        .unwrap();

    assert_eq!(outcome, SubscribeOutcome::AlreadyPaid);
    assert_eq!(
        rx.try_recv().unwrap(),
        LiveEvent::Payment {
            txid: "late".to_string(),
            message: "Pagamento realizado".to_string(),
        }
    );
    assert_eq!(harness.registry.subscriber_count("late").await, 0);
}

#[tokio::test]
async fn subscribing_to_an_unknown_txid_is_refused() {
    let harness = Harness::new();
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = harness
        .registry
        .subscribe("ghost", LiveHandle::new("socket-1", tx))
        .await
        .unwrap_err();

    assert!(matches!(err, NotificationError::UnknownTxid(_)));
    assert_eq!(harness.registry.subscriber_count("ghost").await, 0);
}


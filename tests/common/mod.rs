//! In-memory stores and a scripted gateway for driving the settlement pipeline
#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chrono::{Duration as ChronoDuration, Utc};
use pix_donations::api::{build_router, AppState};
use pix_donations::config::WebhookConfig;
use pix_donations::database::donation_repository::Donation;
use pix_donations::database::error::{DatabaseError, DatabaseErrorKind};
use pix_donations::database::repository::{DonationStore, TransactionStore, UserStore};
use pix_donations::database::transaction_repository::{
    NewTransaction, SettlementOutcome, Transaction, TransactionStatus,
};
use pix_donations::database::user_repository::User;
use pix_donations::health::HealthChecker;
use pix_donations::payments::{
    Charge, PixAmount, PixError, PixGateway, PixRefund, PixResult, PixTransfer, QrCode,
};
use pix_donations::services::notification::{NotificationChannel, SocketRegistry};
use pix_donations::services::payout::PayoutService;
use pix_donations::services::transaction_lifecycle::TransactionLifecycle;
use pix_donations::services::webhook_processor::WebhookProcessor;
use sqlx::types::BigDecimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const WEBHOOK_IDENTITY: &str = "efi-webhook";
pub const CERT_HEADER: &str = "x-ssl-client-verify";

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

#[derive(Default)]
struct Tables {
    donations: HashMap<Uuid, Donation>,
    users: HashMap<Uuid, User>,
    transactions: HashMap<Uuid, Transaction>,
}

/// Every table behind one lock, so `settle` is a single unit of work
#[derive(Default)]
pub struct MemoryDb {
    tables: Mutex<Tables>,
}

impl MemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Owner plus an active campaign with nothing raised yet
    pub fn seed_campaign(&self, name: &str) -> (Donation, User) {
        let user = User {
            id: Uuid::new_v4(),
            name: "Maria Souza".to_string(),
            email: "maria@example.com".to_string(),
            password: "hash".to_string(),
            pix_key: "maria@example.com".to_string(),
            pix_key_type: "email".to_string(),
            created_at: Utc::now(),
        };
        let donation = Donation {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: "Ajuda para a reforma".to_string(),
            goal: dec("5000.00"),
            amount_raised: dec("0"),
            deadline: Utc::now() + ChronoDuration::days(30),
            state: "SP".to_string(),
            category: "Saúde".to_string(),
            url_image: None,
            created_at: Utc::now(),
            deleted_at: None,
            user_id: user.id,
        };

        let mut tables = self.tables.lock().unwrap();
        tables.users.insert(user.id, user.clone());
        tables.donations.insert(donation.id, donation.clone());
        (donation, user)
    }

    pub fn amount_raised(&self, donation_id: Uuid) -> BigDecimal {
        self.tables.lock().unwrap().donations[&donation_id]
            .amount_raised
            .clone()
    }

    pub fn transaction_count(&self) -> usize {
        self.tables.lock().unwrap().transactions.len()
    }

    pub fn transaction_by_txid(&self, txid: &str) -> Option<Transaction> {
        self.tables
            .lock()
            .unwrap()
            .transactions
            .values()
            .find(|t| t.txid == txid)
            .cloned()
    }

    pub fn remove_donation(&self, donation_id: Uuid) {
        self.tables.lock().unwrap().donations.remove(&donation_id);
    }

    /// Pending transaction stored directly, bypassing the gateway
    pub fn insert_pending(&self, donation_id: Uuid, txid: &str, amount: &str) -> Transaction {
        let transaction = Transaction {
            id: Uuid::new_v4(),
            txid: txid.to_string(),
            loc_id: 7,
            location: format!("pix.example.com/qr/v2/{}", txid),
            qr_code: "data:image/png;base64,AAAA".to_string(),
            pix_copy_paste: "00020101021226".to_string(),
            amount: dec(amount),
            alias: Some("Ana".to_string()),
            email: "ana@example.com".to_string(),
            message: Some("Força!".to_string()),
            status: TransactionStatus::Pending.as_str().to_string(),
            end_to_end_id: None,
            paid_at: None,
            created_at: Utc::now(),
            donation_id,
        };
        self.tables
            .lock()
            .unwrap()
            .transactions
            .insert(transaction.id, transaction.clone());
        transaction
    }
}

#[async_trait]
impl DonationStore for MemoryDb {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Donation>, DatabaseError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .donations
            .get(&id)
            .filter(|d| d.deleted_at.is_none())
            .cloned())
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.tables.lock().unwrap().users.get(&id).cloned())
    }
}

#[async_trait]
impl TransactionStore for MemoryDb {
    async fn create(&self, new: NewTransaction) -> Result<Transaction, DatabaseError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.donations.contains_key(&new.donation_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::ForeignKeyViolation {
                constraint: "transactions_donation_id_fkey".to_string(),
            }));
        }
        if tables.transactions.values().any(|t| t.txid == new.txid) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "transactions_txid_key".to_string(),
            }));
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            txid: new.txid,
            loc_id: new.loc_id,
            location: new.location,
            qr_code: new.qr_code,
            pix_copy_paste: new.pix_copy_paste,
            amount: new.amount,
            alias: new.alias,
            email: new.email,
            message: new.message,
            status: TransactionStatus::Pending.as_str().to_string(),
            end_to_end_id: None,
            paid_at: None,
            created_at: Utc::now(),
            donation_id: new.donation_id,
        };
        tables
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
        Ok(self.tables.lock().unwrap().transactions.get(&id).cloned())
    }

    async fn find_by_txid(&self, txid: &str) -> Result<Option<Transaction>, DatabaseError> {
        Ok(self.transaction_by_txid(txid))
    }

    async fn find_by_donation(
        &self,
        donation_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.donation_id == donation_id && t.status == status.as_str())
            .cloned()
            .collect())
    }

    async fn settle(
        &self,
        id: Uuid,
        confirmed_amount: &BigDecimal,
        end_to_end_id: &str,
    ) -> Result<SettlementOutcome, DatabaseError> {
        let mut tables = self.tables.lock().unwrap();

        let donation_id = match tables.transactions.get(&id) {
            Some(t) if !t.is_paid() => t.donation_id,
            _ => return Ok(SettlementOutcome::AlreadyPaid),
        };
        if !tables.donations.contains_key(&donation_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "Donation".to_string(),
                id: donation_id.to_string(),
            }));
        }

        let transaction = tables
            .transactions
            .get_mut(&id)
            .map(|t| {
                t.status = TransactionStatus::Paid.as_str().to_string();
                t.end_to_end_id = Some(end_to_end_id.to_string());
                t.paid_at = Some(Utc::now());
                t.clone()
            })
            .unwrap();
        let donation = tables
            .donations
            .get_mut(&donation_id)
            .map(|d| {
                d.amount_raised = &d.amount_raised + confirmed_amount;
                d.clone()
            })
            .unwrap();

        Ok(SettlementOutcome::Settled {
            transaction,
            donation,
        })
    }
}

/// Transaction store that can be told to fail like an unreachable database.
///
/// A failed call leaves the tables untouched, which is what a rolled-back settlement
/// looks like from the outside.
pub struct FlakyTransactions {
    db: Arc<MemoryDb>,
    failing_lookups: Mutex<HashSet<String>>,
    failing_settlements: AtomicBool,
}

impl FlakyTransactions {
    pub fn new(db: Arc<MemoryDb>) -> Arc<Self> {
        Arc::new(Self {
            db,
            failing_lookups: Mutex::new(HashSet::new()),
            failing_settlements: AtomicBool::new(false),
        })
    }

    pub fn fail_lookup(&self, txid: &str) {
        self.failing_lookups.lock().unwrap().insert(txid.to_string());
    }

    pub fn fail_settlements(&self) {
        self.failing_settlements.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.failing_lookups.lock().unwrap().clear();
        self.failing_settlements.store(false, Ordering::SeqCst);
    }
}

fn outage() -> DatabaseError {
    DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl TransactionStore for FlakyTransactions {
    async fn create(&self, new: NewTransaction) -> Result<Transaction, DatabaseError> {
        TransactionStore::create(self.db.as_ref(), new).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
        TransactionStore::find_by_id(self.db.as_ref(), id).await
    }

    async fn find_by_txid(&self, txid: &str) -> Result<Option<Transaction>, DatabaseError> {
        if self.failing_lookups.lock().unwrap().contains(txid) {
            return Err(outage());
        }
        self.db.find_by_txid(txid).await
    }

    async fn find_by_donation(
        &self,
        donation_id: Uuid,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        self.db.find_by_donation(donation_id, status).await
    }

    async fn settle(
        &self,
        id: Uuid,
        confirmed_amount: &BigDecimal,
        end_to_end_id: &str,
    ) -> Result<SettlementOutcome, DatabaseError> {
        if self.failing_settlements.load(Ordering::SeqCst) {
            return Err(outage());
        }
        self.db.settle(id, confirmed_amount, end_to_end_id).await
    }
}

/// Gateway whose every step succeeds unless a failure was scripted for it
#[derive(Default)]
pub struct ScriptedGateway {
    next_loc: AtomicI64,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, PixError>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, operation: &'static str, error: PixError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn step(&self, operation: &'static str) -> PixResult<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        match self.failures.lock().unwrap().get(operation) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PixGateway for ScriptedGateway {
    async fn create_charge(&self, _amount: &PixAmount, _description: &str) -> PixResult<Charge> {
        self.step("create_charge")?;
        let loc_id = self.next_loc.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Charge {
            txid: format!("txid{:030}", loc_id),
            loc_id,
            location: format!("pix.example.com/qr/v2/{}", loc_id),
            pix_copy_paste: "00020101021226".to_string(),
        })
    }

    async fn link_split(&self, _txid: &str, _split_config_id: &str) -> PixResult<()> {
        self.step("link_split")
    }

    async fn generate_qr_code(&self, _loc_id: i64) -> PixResult<QrCode> {
        self.step("generate_qr_code")?;
        Ok(QrCode {
            image_base64: "data:image/png;base64,AAAA".to_string(),
            copy_paste: "00020101021226".to_string(),
        })
    }

    async fn send_pix(
        &self,
        _amount: &PixAmount,
        _payer_key: &str,
        _payee_key: &str,
        shipping_id: &str,
    ) -> PixResult<PixTransfer> {
        self.step("send_pix")?;
        Ok(PixTransfer {
            shipping_id: shipping_id.to_string(),
            end_to_end_id: Some("E0000000020240101000000000000001".to_string()),
            status: "EM_PROCESSAMENTO".to_string(),
        })
    }

    async fn refund_pix(
        &self,
        _end_to_end_id: &str,
        refund_id: &str,
        _amount: &PixAmount,
    ) -> PixResult<PixRefund> {
        self.step("refund_pix")?;
        Ok(PixRefund {
            refund_id: refund_id.to_string(),
            rtr_id: Some("D0000000020240101000000000000001".to_string()),
            status: "EM_PROCESSAMENTO".to_string(),
        })
    }

    async fn configure_webhook(&self, _webhook_url: &str) -> PixResult<()> {
        self.step("configure_webhook")
    }
}

pub struct Harness {
    pub db: Arc<MemoryDb>,
    /// Store the webhook processor and live registry read transactions through
    pub faults: Arc<FlakyTransactions>,
    pub gateway: Arc<ScriptedGateway>,
    pub registry: Arc<SocketRegistry>,
    pub lifecycle: Arc<TransactionLifecycle>,
    pub processor: Arc<WebhookProcessor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn with_payout() -> Self {
        Self::build(true)
    }

    fn build(payout: bool) -> Self {
        let db = MemoryDb::new();
        let faults = FlakyTransactions::new(db.clone());
        let gateway = ScriptedGateway::new();
        let registry = Arc::new(SocketRegistry::new().with_transactions(faults.clone()));

        let lifecycle = Arc::new(TransactionLifecycle::new(
            db.clone(),
            db.clone(),
            gateway.clone(),
            "split-config-1",
        ));

        let mut processor =
            WebhookProcessor::new(faults.clone(), db.clone(), db.clone(), registry.clone());
        if payout {
            processor = processor.with_payout(Arc::new(PayoutService::new(
                gateway.clone(),
                "platform@example.com",
            )));
        }

        Self {
            db,
            faults,
            gateway,
            registry,
            lifecycle,
            processor: Arc::new(processor),
        }
    }

    pub fn router(&self) -> Router {
        self.router_with_notifier(self.registry.clone())
    }

    pub fn router_with_notifier(&self, notifier: Arc<dyn NotificationChannel>) -> Router {
        build_router(
            AppState {
                lifecycle: self.lifecycle.clone(),
                processor: self.processor.clone(),
                notifier,
                health_checker: HealthChecker::new(None),
            },
            Arc::new(WebhookConfig {
                identity: WEBHOOK_IDENTITY.to_string(),
                client_cert_header: CERT_HEADER.to_string(),
                client_cert_verified_value: "SUCCESS".to_string(),
            }),
        )
    }
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
